//! Byte bridge between the session and the host's socket.

use super::{client_id, session_error, Messenger};
use crate::error::Result;
use crate::log::TraceLevel;

/// Destination for outbound bytes, usually a socket write.
pub trait ByteSink {
    /// Take all of `bytes`. Returns false when the destination wants the
    /// caller to back off before writing more.
    fn write(&mut self, bytes: &[u8]) -> bool;
}

impl ByteSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> bool {
        self.extend_from_slice(bytes);
        true
    }
}

impl<F> ByteSink for F
where
    F: FnMut(&[u8]) -> bool,
{
    fn write(&mut self, bytes: &[u8]) -> bool {
        self(bytes)
    }
}

impl Messenger {
    /// Feed bytes read from the socket. Returns how many were consumed; with
    /// no connection every byte is reported consumed and dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Result<usize> {
        const FN: &str = "Messenger::push";
        self.logger.entry(TraceLevel::EntryOften, FN, self.id());
        let (Some(session), Some(conn)) = (self.session.as_mut(), self.connection) else {
            self.logger.log(
                TraceLevel::Data,
                client_id(&self.name),
                "connection already closed:",
                "discarding data",
            );
            self.logger.exit(
                TraceLevel::ExitOften,
                FN,
                client_id(&self.name),
                &bytes.len().to_string(),
            );
            return Ok(bytes.len());
        };
        let result = session.connection_push(conn, bytes);
        let n = match result {
            Ok(n) => n,
            Err(e) => {
                if let Some(session) = self.session.as_mut() {
                    session.take_error();
                }
                return self.fail(TraceLevel::ExitOften, FN, session_error(e));
            }
        };
        self.logger
            .exit(TraceLevel::ExitOften, FN, self.id(), &n.to_string());
        Ok(n)
    }

    /// Hand pending outbound bytes to `sink`. `force` also ticks the
    /// transport so heartbeats go out. Returns bytes written, -1 if not connected.
    pub fn pop(&mut self, sink: &mut dyn ByteSink, force: bool) -> isize {
        self.write(sink, force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::SslOptions;

    #[test]
    fn push_disconnected_discards() {
        let mut m = Messenger::new("c1", "", "");
        assert_eq!(m.push(&[]).unwrap(), 0);
        assert_eq!(m.push(&[1, 2, 3, 4, 5]).unwrap(), 5);
    }

    #[test]
    fn pop_disconnected_is_minus_one() {
        let mut m = Messenger::new("c1", "", "");
        let mut out = Vec::new();
        assert_eq!(m.pop(&mut out, true), -1);
    }

    #[test]
    fn pop_after_local_close_is_zero_while_connected() {
        let mut m = Messenger::new("c1", "", "");
        m.connect("amqp://host:5672", &SslOptions::default()).unwrap();
        let mut out = Vec::new();
        assert!(!m.stop(&mut out));
        assert!(m.connected());
        out.clear();
        assert_eq!(m.pop(&mut out, false), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn closure_sink() {
        let mut m = Messenger::new("c1", "", "");
        m.connect("amqp://host:5672", &SslOptions::default()).unwrap();
        let mut seen = 0usize;
        let mut sink = |bytes: &[u8]| {
            seen += bytes.len();
            true
        };
        let n = m.pop(&mut sink, false);
        assert!(n > 0);
        assert_eq!(seen, n as usize);
    }

    #[test]
    fn forced_pop_ticks_with_nothing_pending() {
        let mut m = Messenger::new("c1", "", "");
        m.connect("amqp://host:5672", &SslOptions::default()).unwrap();
        let mut out = Vec::new();
        m.pop(&mut out, false);
        let before = out.len();
        assert_eq!(m.ticks(), 0);
        assert_eq!(m.pop(&mut out, true), 0);
        assert_eq!(m.ticks(), 1);
        assert_eq!(out.len(), before);
    }
}
