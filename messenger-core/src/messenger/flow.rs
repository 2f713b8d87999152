//! Credit and backlog queries.

use super::{ByteSink, Messenger};
use crate::error::{MessengerError, Result};
use crate::log::TraceLevel;

impl Messenger {
    /// Grant `credit` more messages on the subscription for `address`.
    /// Credit is clamped to `0..=u32::MAX`. No subscription means no-op.
    pub fn flow(&mut self, address: &str, credit: i64, sink: &mut dyn ByteSink) -> Result<()> {
        const FN: &str = "Messenger::flow";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        let credit = credit.clamp(0, u32::MAX as i64) as u32;
        self.logger.log(TraceLevel::Parms, self.id(), "address:", address);
        self.logger
            .log(TraceLevel::Parms, self.id(), "credit:", &credit.to_string());

        let link = self
            .session
            .as_mut()
            .and_then(|s| s.link(address, false, false));
        match link {
            Some(link) => {
                if let Some(session) = self.session.as_mut() {
                    session.flow(link, credit);
                }
                self.write(sink, false);
            }
            None => self.logger.log(TraceLevel::Data, self.id(), "link:", "null"),
        }
        self.logger.exit(TraceLevel::Exit, FN, self.id(), "");
        Ok(())
    }

    /// Whether anything is still queued to go out for `address`.
    pub fn pending_outbound(&mut self, address: &str) -> Result<bool> {
        const FN: &str = "Messenger::pending_outbound";
        self.logger.entry(TraceLevel::EntryOften, FN, self.id());
        self.ensure_connected(TraceLevel::ExitOften, FN)?;
        let n = self
            .session
            .as_mut()
            .map_or(-1, |s| s.pending_outbound(address));
        if n < 0 {
            let err = MessengerError::Network(format!("unable to resolve {}", address));
            return self.fail(TraceLevel::ExitOften, FN, err);
        }
        let pending = n > 0;
        self.logger.exit(
            TraceLevel::ExitOften,
            FN,
            self.id(),
            if pending { "true" } else { "false" },
        );
        Ok(pending)
    }

    /// Idle timeout in milliseconds the remote advertised for `address`'s connection.
    pub fn remote_idle_timeout(&mut self, address: &str) -> Result<i32> {
        const FN: &str = "Messenger::remote_idle_timeout";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        let timeout = self
            .session
            .as_mut()
            .map_or(-1, |s| s.remote_idle_timeout(address));
        self.logger
            .exit(TraceLevel::Exit, FN, self.id(), &timeout.to_string());
        Ok(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::SslOptions;

    #[test]
    fn flow_without_link_is_noop() {
        let mut m = Messenger::new("c1", "", "");
        m.connect("amqp://host:5672", &SslOptions::default()).unwrap();
        let mut out = Vec::new();
        m.flow("amqp://host:5672/none", 10, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn pending_outbound_counts_unsent() {
        let mut m = Messenger::new("c1", "", "");
        m.connect("amqp://host:5672", &SslOptions::default()).unwrap();
        // Open frame is still queued on the transport.
        assert!(m.pending_outbound("amqp://host:5672/a").unwrap());
        let mut out = Vec::new();
        m.pop(&mut out, false);
        assert!(!m.pending_outbound("amqp://host:5672/a").unwrap());
        assert!(m.pending_outbound("amqp://elsewhere:1/a").is_err());
    }

    #[test]
    fn remote_idle_timeout_zero_before_open() {
        let mut m = Messenger::new("c1", "", "");
        m.connect("amqp://host:5672", &SslOptions::default()).unwrap();
        assert_eq!(m.remote_idle_timeout("amqp://host:5672/a").unwrap(), 0);
    }
}
