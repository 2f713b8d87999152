//! Messenger engine: a client for an AMQP-style messaging protocol.
//! Host-driven: no I/O; host pushes inbound bytes and drains outbound bytes.

pub mod address;
pub mod config;
pub mod delivery;
pub mod error;
pub mod link;
pub mod log;
pub mod message;
pub mod messenger;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod wire;

pub use address::{Route, ServiceAddress};
pub use config::SessionConfig;
pub use delivery::{Status, Tracker};
pub use error::{ErrorName, MessengerError, Result};
pub use log::{Logger, MemoryLogger, TraceLevel, TracingLogger};
pub use message::{AnnotationValue, Body, DeliveryAnnotation, Message, Value};
pub use messenger::{ByteSink, Messenger, SslOptions};
pub use protocol::{Frame, PROTOCOL_HEADER};
pub use session::{ConnectionId, Session, SessionError};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
