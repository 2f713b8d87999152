//! The `Messenger` façade: one logical client connection driven by the host.
//!
//! Host-driven: no I/O. Operations that produce protocol output finish by
//! draining pending bytes into the caller's [`ByteSink`]; inbound bytes come
//! back through [`Messenger::push`].

mod bridge;
mod connection;
mod flow;
mod links;
mod tracker;

use std::sync::Arc;

pub use bridge::ByteSink;
pub use connection::SslOptions;

use crate::config::SessionConfig;
use crate::error::{MessengerError, Result};
use crate::log::{masked_password, Logger, TraceLevel, TracingLogger, NO_CLIENT_ID};
use crate::session::{ConnectionId, Session, SessionError};

pub struct Messenger {
    name: String,
    username: String,
    password: String,
    config: SessionConfig,
    logger: Arc<dyn Logger>,
    /// Underlying session; `None` until connect and after a completed stop.
    session: Option<Session>,
    /// Resolved connection. Only set while `session` is.
    connection: Option<ConnectionId>,
}

impl Messenger {
    /// Messenger with default session settings, tracing through `tracing`.
    pub fn new(name: &str, username: &str, password: &str) -> Self {
        Self::with_config(
            name,
            username,
            password,
            SessionConfig::default(),
            Arc::new(TracingLogger),
        )
    }

    pub fn with_config(
        name: &str,
        username: &str,
        password: &str,
        config: SessionConfig,
        logger: Arc<dyn Logger>,
    ) -> Self {
        const FN: &str = "Messenger::new";
        let id = client_id(name);
        logger.entry(TraceLevel::Entry, FN, id);
        logger.log(TraceLevel::Parms, id, "name:", name);
        logger.log(TraceLevel::Parms, id, "username:", username);
        logger.log(TraceLevel::Parms, id, "password:", masked_password(password));
        logger.exit(TraceLevel::Exit, FN, id, "");
        Self {
            name: name.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            config,
            logger,
            session: None,
            connection: None,
        }
    }

    /// Client id; replaced by the session's container id on connect when empty.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Session and resolved connection both exist.
    pub fn connected(&self) -> bool {
        self.session.is_some() && self.connection.is_some()
    }

    /// Underlying session, for inspection.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Transport ticks on the current connection; 0 when disconnected.
    pub fn ticks(&self) -> u64 {
        match (&self.session, self.connection) {
            (Some(s), Some(c)) => s.ticks(c),
            _ => 0,
        }
    }

    fn id(&self) -> &str {
        client_id(&self.name)
    }

    /// Trace `err` as thrown by `function` and return it.
    fn fail<T>(&self, level: TraceLevel, function: &str, err: MessengerError) -> Result<T> {
        self.logger.throw(level, function, self.id(), &err);
        Err(err)
    }

    fn ensure_connected(&self, level: TraceLevel, function: &str) -> Result<()> {
        if self.connected() {
            Ok(())
        } else {
            self.fail(level, function, MessengerError::not_connected())
        }
    }

    /// Surface any error the session recorded since the last check.
    fn check_errno(&mut self, function: &str) -> Result<()> {
        let text = self.session.as_mut().and_then(Session::take_error);
        match text {
            Some(text) => self.fail(TraceLevel::Exit, function, MessengerError::classified(text)),
            None => Ok(()),
        }
    }

    /// Hand pending bytes to `sink` (and tick when `force`). Returns the bytes
    /// written, or -1 when there is no usable connection.
    pub(crate) fn write(&mut self, sink: &mut dyn ByteSink, force: bool) -> isize {
        const FN: &str = "Messenger::write";
        self.logger.entry(TraceLevel::EntryOften, FN, client_id(&self.name));
        let conn = match (self.session.as_mut(), self.connection) {
            (Some(session), Some(conn)) => Some((session, conn)),
            _ => None,
        };
        let Some((session, conn)) = conn else {
            self.logger
                .exit(TraceLevel::ExitOften, FN, client_id(&self.name), "-1");
            return -1;
        };
        let mut n = session.transport_pending(conn);
        if force && session.connection_pop(conn, 0) {
            self.connection = None;
        }
        if self.connection.is_some() && n > 0 {
            let bytes = session
                .transport_head(conn)
                .map(|head| head[..(n as usize).min(head.len())].to_vec())
                .unwrap_or_default();
            let drained = sink.write(&bytes);
            self.logger.log(
                TraceLevel::DataOften,
                client_id(&self.name),
                "drained:",
                if drained { "true" } else { "false" },
            );
            if session.connection_pop(conn, bytes.len()) {
                self.connection = None;
            }
            n = bytes.len() as isize;
        } else {
            n = 0;
        }
        self.logger
            .exit(TraceLevel::ExitOften, FN, client_id(&self.name), &n.to_string());
        n
    }
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &masked_password(&self.password))
            .field("connected", &self.connected())
            .finish()
    }
}

fn client_id(name: &str) -> &str {
    if name.is_empty() {
        NO_CLIENT_ID
    } else {
        name
    }
}

/// Map a session failure onto the public error taxonomy.
fn session_error(err: SessionError) -> MessengerError {
    match err {
        SessionError::Argument(text) => MessengerError::Type(text),
        SessionError::State(text) => MessengerError::Network(text),
        SessionError::Transport(text) => MessengerError::classified(text),
    }
}
