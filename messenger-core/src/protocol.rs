//! Messenger wire protocol: frame (performative) types and the protocol header.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Sent by each side before its first frame.
pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x01\x00\x00";

/// Which end of a link a frame describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SenderSettleMode {
    /// Sender leaves deliveries unsettled until the receiver's outcome (at-least-once).
    Unsettled,
    /// Deliveries are sent pre-settled (at-most-once).
    Settled,
    #[default]
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReceiverSettleMode {
    /// Receiver settles spontaneously.
    #[default]
    First,
    /// Receiver settles only after the sender settles.
    Second,
}

/// When a terminus expires after its link goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpiryPolicy {
    /// Expires with the link ("with-link").
    LinkDetach,
    #[default]
    SessionEnd,
    ConnectionClose,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Terminus {
    pub address: String,
    pub expiry_policy: ExpiryPolicy,
    /// Seconds the terminus survives after expiry triggers.
    pub timeout: u32,
}

impl Terminus {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }
}

/// Error carried on Detach, Close and Rejected outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCondition {
    /// Symbolic condition, e.g. `amqp:link:stolen`.
    pub condition: String,
    pub description: String,
}

impl ErrorCondition {
    pub fn new(condition: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            description: description.into(),
        }
    }

    /// `"<condition> <description>"`, the text the error classifier sees.
    pub fn text(&self) -> String {
        format!("{} {}", self.condition, self.description)
    }
}

/// Delivery outcome carried by Disposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryState {
    Accepted,
    Rejected { error: Option<ErrorCondition> },
    Released,
    Modified { delivery_failed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaslCode {
    Ok,
    Auth,
    Sys,
    SysPerm,
    SysTemp,
}

/// All frame types. Encoding is bincode; framing is length-prefix (see wire module).
///
/// Links are addressed by `name` plus the role of the frame's sender, so a
/// sender and a receiver on the same address never collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    SaslInit {
        mechanism: String,
        initial_response: Vec<u8>,
        hostname: String,
    },
    SaslOutcome {
        code: SaslCode,
    },
    Open {
        container_id: String,
        hostname: String,
        /// Milliseconds; 0 means no idle timeout.
        idle_timeout: u32,
        max_frame_size: u32,
    },
    Attach {
        name: String,
        role: Role,
        snd_settle_mode: SenderSettleMode,
        rcv_settle_mode: ReceiverSettleMode,
        source: Terminus,
        target: Terminus,
    },
    /// Sent by a receiver to grant credit.
    Flow {
        name: String,
        delivery_count: u32,
        link_credit: u32,
    },
    Transfer {
        name: String,
        delivery_id: u32,
        settled: bool,
        message: Message,
    },
    /// Outcome for deliveries `first..=last`, sent by the end named in `role`.
    Disposition {
        role: Role,
        first: u32,
        last: u32,
        settled: bool,
        state: Option<DeliveryState>,
    },
    Detach {
        name: String,
        role: Role,
        closed: bool,
        error: Option<ErrorCondition>,
    },
    Close {
        error: Option<ErrorCondition>,
    },
    /// Keep-alive.
    Empty,
}

impl Frame {
    /// Short label for the frame tracer.
    pub fn label(&self) -> &'static str {
        match self {
            Frame::SaslInit { .. } => "sasl-init",
            Frame::SaslOutcome { .. } => "sasl-outcome",
            Frame::Open { .. } => "open",
            Frame::Attach { .. } => "attach",
            Frame::Flow { .. } => "flow",
            Frame::Transfer { .. } => "transfer",
            Frame::Disposition { .. } => "disposition",
            Frame::Detach { .. } => "detach",
            Frame::Close { .. } => "close",
            Frame::Empty => "empty",
        }
    }
}
