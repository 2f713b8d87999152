//! Subscriptions: open, query and tear down links by address.

use super::{session_error, ByteSink, Messenger};
use crate::error::{MessengerError, Result};
use crate::log::TraceLevel;
use crate::protocol::{ExpiryPolicy, ReceiverSettleMode, SenderSettleMode};

fn settle_mode(qos: i32) -> Option<SenderSettleMode> {
    match qos {
        0 => Some(SenderSettleMode::Settled),
        1 => Some(SenderSettleMode::Unsettled),
        _ => None,
    }
}

impl Messenger {
    /// Open a receiver link on `address`. `qos` 0 is at-most-once, 1 at-least-once;
    /// `ttl` (seconds) is how long the subscription outlives its link.
    pub fn subscribe(
        &mut self,
        address: &str,
        qos: i32,
        ttl: u32,
        sink: &mut dyn ByteSink,
    ) -> Result<bool> {
        const FN: &str = "Messenger::subscribe";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        self.logger.log(TraceLevel::Parms, self.id(), "address:", address);
        self.logger
            .log(TraceLevel::Parms, self.id(), "qos:", &qos.to_string());
        self.logger
            .log(TraceLevel::Parms, self.id(), "ttl:", &ttl.to_string());

        let Some(session) = self.session.as_mut() else {
            return self.fail(TraceLevel::Exit, FN, MessengerError::not_connected());
        };
        if session.link(address, false, false).is_some() {
            let err =
                MessengerError::Subscribed("client is already subscribed to this address".into());
            return self.fail(TraceLevel::Exit, FN, err);
        }
        let Some(mode) = settle_mode(qos) else {
            return self.fail(TraceLevel::Exit, FN, MessengerError::invalid_qos());
        };
        session.set_snd_settle_mode(mode);
        session.set_rcv_settle_mode(ReceiverSettleMode::First);
        let result = session
            .subscribe_ttl(address, ttl)
            .and_then(|_| session.recv(-2));
        if let Err(e) = result {
            return self.fail(TraceLevel::Exit, FN, session_error(e));
        }
        self.check_errno(FN)?;
        self.write(sink, false);
        self.logger.exit(TraceLevel::Exit, FN, self.id(), "true");
        Ok(true)
    }

    /// Whether the remote has attached the receiver link for `address`.
    pub fn subscribed(&mut self, address: &str) -> Result<bool> {
        self.link_active("Messenger::subscribed", address, false)
    }

    /// Whether the remote has attached the sender link for `address`,
    /// opening the link first if there is none.
    pub fn sending(&mut self, address: &str) -> Result<bool> {
        self.link_active("Messenger::sending", address, true)
    }

    fn link_active(&mut self, function: &str, address: &str, sender: bool) -> Result<bool> {
        self.logger.entry(TraceLevel::Entry, function, self.id());
        self.ensure_connected(TraceLevel::Exit, function)?;
        let Some(session) = self.session.as_mut() else {
            return self.fail(TraceLevel::Exit, function, MessengerError::not_connected());
        };
        let active = session
            .link(address, sender, sender)
            .and_then(|id| session.link_info(id))
            .map(|link| link.remote_active());
        let Some(active) = active else {
            return self.fail(
                TraceLevel::Exit,
                function,
                MessengerError::Locate(address.to_string()),
            );
        };
        self.logger.exit(
            TraceLevel::Exit,
            function,
            self.id(),
            if active { "true" } else { "false" },
        );
        Ok(active)
    }

    /// End the subscription on `address`. `ttl == Some(0)` makes the remote
    /// discard it with the link; otherwise the subscription's own expiry
    /// decides between close and detach.
    pub fn unsubscribe(
        &mut self,
        address: &str,
        ttl: Option<u32>,
        sink: &mut dyn ByteSink,
    ) -> Result<bool> {
        const FN: &str = "Messenger::unsubscribe";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        self.logger.log(TraceLevel::Parms, self.id(), "address:", address);

        let Some(session) = self.session.as_mut() else {
            return self.fail(TraceLevel::Exit, FN, MessengerError::not_connected());
        };
        let Some(link) = session.link(address, false, false) else {
            let err = if session.stated_link(address, false).is_some() {
                MessengerError::Unsubscribed("client is not subscribed to this address".into())
            } else {
                MessengerError::Locate(address.to_string())
            };
            return self.fail(TraceLevel::Exit, FN, err);
        };
        if ttl == Some(0) {
            session.set_link_expiry(link, ExpiryPolicy::LinkDetach, 0);
        }
        let closing = session.link_info(link).map_or(true, |l| l.closes_on_end());
        if closing {
            session.close_link(link);
        } else {
            session.detach_link(link);
        }
        self.logger.log(
            TraceLevel::Data,
            self.id(),
            "link:",
            if closing { "close" } else { "detach" },
        );
        self.write(sink, false);
        self.logger.exit(TraceLevel::Exit, FN, self.id(), "true");
        Ok(true)
    }

    /// Whether the remote has confirmed the end of the subscription on
    /// `address`. Once confirmed the link is released.
    pub fn unsubscribed(&mut self, address: &str) -> Result<bool> {
        const FN: &str = "Messenger::unsubscribed";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        self.ensure_connected(TraceLevel::Exit, FN)?;
        let Some(session) = self.session.as_mut() else {
            return self.fail(TraceLevel::Exit, FN, MessengerError::not_connected());
        };
        let found = session.stated_link(address, false).and_then(|id| {
            session
                .link_info(id)
                .map(|l| (id, l.closes_on_end(), l.remote_closed(), l.remote_detached()))
        });
        let Some((link, closing, remote_closed, remote_detached)) = found else {
            return self.fail(
                TraceLevel::Exit,
                FN,
                MessengerError::Locate(address.to_string()),
            );
        };
        let done = if closing { remote_closed } else { remote_detached };
        if done {
            session.reclaim_link(link);
        }
        self.logger
            .exit(TraceLevel::Exit, FN, self.id(), if done { "true" } else { "false" });
        Ok(done)
    }
}
