//! Put/send/receive and per-message delivery state.

use super::{session_error, ByteSink, Messenger};
use crate::delivery::{Status, Tracker};
use crate::error::{MessengerError, Result};
use crate::log::TraceLevel;
use crate::message::Message;

impl Messenger {
    /// Queue `message` for sending and store its tracker on it. With `qos` 0
    /// the delivery is settled immediately.
    pub fn put(&mut self, message: &mut Message, qos: i32) -> Result<bool> {
        const FN: &str = "Messenger::put";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        if qos != 0 && qos != 1 {
            return self.fail(TraceLevel::Exit, FN, MessengerError::invalid_qos());
        }
        self.logger
            .log(TraceLevel::Parms, self.id(), "address:", message.address());
        self.logger
            .log(TraceLevel::Parms, self.id(), "qos:", &qos.to_string());

        let Some(session) = self.session.as_mut() else {
            return self.fail(TraceLevel::Exit, FN, MessengerError::not_connected());
        };
        let result = session.put(message.clone()).and_then(|tracker| {
            if qos == 0 {
                session.settle(tracker)?;
            }
            Ok(tracker)
        });
        let tracker = match result {
            Ok(t) => t,
            Err(e) => return self.fail(TraceLevel::Exit, FN, session_error(e)),
        };
        message.set_tracker(tracker);
        self.check_errno(FN)?;
        self.logger.exit(TraceLevel::Exit, FN, self.id(), "true");
        Ok(true)
    }

    /// Release everything put so far and drain the resulting bytes.
    pub fn send(&mut self, sink: &mut dyn ByteSink) -> Result<bool> {
        const FN: &str = "Messenger::send";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        let Some(session) = self.session.as_mut() else {
            return self.fail(TraceLevel::Exit, FN, MessengerError::not_connected());
        };
        if let Err(e) = session.send() {
            return self.fail(TraceLevel::Exit, FN, session_error(e));
        }
        self.check_errno(FN)?;
        self.write(sink, false);
        self.logger.exit(TraceLevel::Exit, FN, self.id(), "true");
        Ok(true)
    }

    /// Every message received so far, in arrival order. Messages on links
    /// this side already closed are consumed and dropped.
    pub fn receive(&mut self, sink: &mut dyn ByteSink) -> Result<Vec<Message>> {
        const FN: &str = "Messenger::receive";
        self.logger.entry(TraceLevel::EntryOften, FN, self.id());
        self.ensure_connected(TraceLevel::ExitOften, FN)?;
        let Some(session) = self.session.as_mut() else {
            return self.fail(TraceLevel::ExitOften, FN, MessengerError::not_connected());
        };
        if let Err(e) = session.recv(-2) {
            return self.fail(TraceLevel::ExitOften, FN, session_error(e));
        }
        self.check_errno(FN)?;

        let mut messages = Vec::new();
        if let Some(session) = self.session.as_mut() {
            while session.incoming() > 0 {
                let Some(mut message) = session.get() else {
                    break;
                };
                let link = session
                    .incoming_tracker()
                    .and_then(|t| session.tracker_link(t))
                    .and_then(|id| session.link_info(id));
                match link {
                    Some(link) if link.locally_closed() => {
                        self.logger.log(
                            TraceLevel::DataOften,
                            &self.name,
                            "link closed, discarding message for:",
                            message.address(),
                        );
                        continue;
                    }
                    Some(link) => {
                        message.set_link_address(link.remote_source_address().map(str::to_string))
                    }
                    None => {}
                }
                messages.push(message);
            }
        }

        self.write(sink, false);
        self.logger
            .exit(TraceLevel::ExitOften, FN, self.id(), &messages.len().to_string());
        Ok(messages)
    }

    fn tracker_of(&self, function: &str, message: &Message) -> Result<Tracker> {
        match message.tracker() {
            Some(t) => Ok(t),
            None => self.fail(
                TraceLevel::Exit,
                function,
                MessengerError::Type("message has no tracker".into()),
            ),
        }
    }

    /// Delivery status of the message's tracker.
    pub fn status(&mut self, message: &Message) -> Result<Status> {
        const FN: &str = "Messenger::status";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        let status = match (message.tracker(), self.session.as_ref()) {
            (Some(t), Some(session)) => session.status(t),
            _ => Status::Unknown,
        };
        self.logger
            .exit(TraceLevel::Exit, FN, self.id(), &status.code().to_string());
        Ok(status)
    }

    /// Description of the error the remote attached to its outcome, or empty.
    pub fn status_error(&mut self, message: &Message) -> Result<String> {
        const FN: &str = "Messenger::status_error";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        let text = match (message.tracker(), self.session.as_ref()) {
            (Some(t), Some(session)) => session.status_error(t).unwrap_or_default(),
            _ => String::new(),
        };
        self.logger.exit(TraceLevel::Exit, FN, self.id(), &text);
        Ok(text)
    }

    /// Accept a received message.
    pub fn accept(&mut self, message: &Message) -> Result<bool> {
        const FN: &str = "Messenger::accept";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        let tracker = self.tracker_of(FN, message)?;
        let result = match self.session.as_mut() {
            Some(session) => session.accept(tracker),
            None => return self.fail(TraceLevel::Exit, FN, MessengerError::not_connected()),
        };
        self.check_errno(FN)?;
        if result.is_err() {
            return self.fail(
                TraceLevel::Exit,
                FN,
                MessengerError::Network("Failed to accept".into()),
            );
        }
        self.logger.exit(TraceLevel::Exit, FN, self.id(), "true");
        Ok(true)
    }

    /// Settle the message's delivery locally and drain the resulting bytes.
    pub fn settle(&mut self, message: &Message, sink: &mut dyn ByteSink) -> Result<bool> {
        const FN: &str = "Messenger::settle";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        let tracker = self.tracker_of(FN, message)?;
        let result = match self.session.as_mut() {
            Some(session) => session.settle(tracker),
            None => return self.fail(TraceLevel::Exit, FN, MessengerError::not_connected()),
        };
        self.check_errno(FN)?;
        if result.is_err() {
            return self.fail(
                TraceLevel::Exit,
                FN,
                MessengerError::Network("Failed to settle".into()),
            );
        }
        self.write(sink, false);
        self.logger.exit(TraceLevel::Exit, FN, self.id(), "true");
        Ok(true)
    }

    /// For a received message: true once the transport has flushed all
    /// output. True for anything else. Poll until true.
    pub fn settled(&mut self, message: &Message) -> Result<bool> {
        const FN: &str = "Messenger::settled";
        self.logger.entry(TraceLevel::EntryOften, FN, self.id());
        self.ensure_connected(TraceLevel::ExitOften, FN)?;
        let settled = match (message.tracker(), self.session.as_ref()) {
            (Some(t), Some(session)) if session.delivery_is_receiver(t) == Some(true) => {
                session.transport_quiesced(t)
            }
            _ => true,
        };
        self.logger.exit(
            TraceLevel::ExitOften,
            FN,
            self.id(),
            if settled { "true" } else { "false" },
        );
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorName;
    use crate::message::Body;
    use crate::messenger::SslOptions;

    fn connected() -> Messenger {
        let mut m = Messenger::new("c1", "", "");
        m.connect("amqp://host:5672", &SslOptions::default()).unwrap();
        m
    }

    #[test]
    fn put_qos0_is_settled_without_settle_call() {
        let mut m = connected();
        let mut msg = Message::new("amqp://host:5672/a", Body::Text("x".into()));
        assert!(m.put(&mut msg, 0).unwrap());
        assert!(msg.tracker().is_some());
        assert_eq!(m.status(&msg).unwrap(), Status::Settled);
    }

    #[test]
    fn put_qos1_stays_pending() {
        let mut m = connected();
        let mut msg = Message::new("amqp://host:5672/a", Body::Text("x".into()));
        m.put(&mut msg, 1).unwrap();
        assert_eq!(m.status(&msg).unwrap(), Status::Pending);
        let mut out = Vec::new();
        m.settle(&msg, &mut out).unwrap();
        assert_eq!(m.status(&msg).unwrap(), Status::Settled);
    }

    #[test]
    fn put_rejects_bad_qos_and_missing_address() {
        let mut m = connected();
        let mut msg = Message::new("amqp://host:5672/a", Body::Empty);
        assert_eq!(m.put(&mut msg, 5).unwrap_err().name(), ErrorName::Range);
        let mut bare = Message::default();
        assert_eq!(m.put(&mut bare, 1).unwrap_err().name(), ErrorName::Type);
    }

    #[test]
    fn receive_with_nothing_pending_is_empty() {
        let mut m = connected();
        let mut out = Vec::new();
        assert!(m.receive(&mut out).unwrap().is_empty());
    }

    #[test]
    fn receive_not_connected() {
        let mut m = Messenger::new("c1", "", "");
        let mut out = Vec::new();
        let err = m.receive(&mut out).unwrap_err();
        assert_eq!(err.name(), ErrorName::Network);
    }

    #[test]
    fn accept_needs_received_message() {
        let mut m = connected();
        let mut msg = Message::new("amqp://host:5672/a", Body::Empty);
        m.put(&mut msg, 1).unwrap();
        let err = m.accept(&msg).unwrap_err();
        assert_eq!(err.to_string(), "Failed to accept");
        assert!(m.accept(&Message::default()).is_err());
    }

    #[test]
    fn settled_is_true_for_sender_side() {
        let mut m = connected();
        let mut msg = Message::new("amqp://host:5672/a", Body::Empty);
        m.put(&mut msg, 1).unwrap();
        assert!(m.settled(&msg).unwrap());
        assert_eq!(m.status_error(&msg).unwrap(), "");
    }
}
