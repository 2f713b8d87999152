//! Connect, stop and lifecycle queries.

use std::fs::File;
use std::path::PathBuf;

use super::{session_error, ByteSink, Messenger};
use crate::address::ServiceAddress;
use crate::error::{MessengerError, Result};
use crate::log::{redact_credentials, TraceLevel};
use crate::session::{Session, SslPeerAuth, FLAG_ALLOW_INSECURE_MECHS, FLAG_CHECK_ROUTES};

/// TLS settings for [`Messenger::connect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SslOptions {
    /// PEM file of trusted certificates; must be readable.
    pub trust_certificate: Option<PathBuf>,
    /// Also check the peer's certificate name against the host.
    pub verify_peer_name: bool,
}

impl Messenger {
    /// Connect to `service` (`amqp[s]://[user:pass@]host[:port]`).
    ///
    /// A previous session that has already stopped is discarded; one that is
    /// still running makes this fail with "Already connected". Every failure
    /// after the session is built drops it before returning.
    pub fn connect(&mut self, service: &str, ssl: &SslOptions) -> Result<()> {
        const FN: &str = "Messenger::connect";
        self.logger.entry(TraceLevel::Entry, FN, self.id());

        let address = match ServiceAddress::parse(service) {
            Ok(a) => a,
            Err(e) => return self.fail(TraceLevel::Exit, FN, MessengerError::Type(e.to_string())),
        };
        self.logger
            .log(TraceLevel::Parms, self.id(), "service:", &address.trace_href());

        if let Some(existing) = &self.session {
            if !existing.stopped() {
                return self.fail(
                    TraceLevel::Exit,
                    FN,
                    MessengerError::Network("Already connected".into()),
                );
            }
            self.session = None;
            self.connection = None;
        }

        if let Some(path) = &ssl.trust_certificate {
            if File::open(path).is_err() {
                let err = MessengerError::Security(format!(
                    "The file specified for sslTrustCertificate '{}' does not exist or is not accessible",
                    path.display()
                ));
                return self.fail(TraceLevel::Exit, FN, err);
            }
        }

        let mut session = Session::new(&self.name, self.config.clone(), self.logger.clone());
        self.name = session.name().to_string();
        session.set_blocking(false);
        session.set_incoming_window(i32::MAX);
        session.set_outgoing_window(i32::MAX);

        if let Some(path) = &ssl.trust_certificate {
            if session.set_trusted_certificates(path).is_err() {
                let err = MessengerError::Type("Failed to set trusted certificates".into());
                return self.fail(TraceLevel::Exit, FN, err);
            }
        }
        session.set_ssl_peer_authentication(match ssl {
            SslOptions {
                verify_peer_name: true,
                ..
            } => SslPeerAuth::VerifyPeerName,
            SslOptions {
                trust_certificate: Some(_),
                ..
            } => SslPeerAuth::VerifyPeer,
            _ => SslPeerAuth::AnonymousPeer,
        });

        let target = address.with_credentials(&self.username, &self.password);
        let pattern = target.route_pattern();
        let substitution = target.route_substitution();
        self.logger.log(TraceLevel::Parms, self.id(), "pattern:", &pattern);
        self.logger.log(
            TraceLevel::Parms,
            self.id(),
            "substitution:",
            &redact_credentials(&substitution),
        );

        if session.route(&pattern, &substitution).is_err() {
            let err = MessengerError::Type("Failed to set messenger route".into());
            return self.fail(TraceLevel::Exit, FN, err);
        }
        if session
            .set_flags(FLAG_CHECK_ROUTES | FLAG_ALLOW_INSECURE_MECHS)
            .is_err()
        {
            let err = MessengerError::Type("Invalid set flags call".into());
            return self.fail(TraceLevel::Exit, FN, err);
        }
        if session.set_external_socket(true).is_err() {
            let err = MessengerError::Type("Failed to set external socket".into());
            return self.fail(TraceLevel::Exit, FN, err);
        }

        if let Err(e) = session.start() {
            return self.fail(TraceLevel::Exit, FN, session_error(e));
        }

        let Some(connection) = session.resolve(&pattern) else {
            let err = MessengerError::Network("Unable to resolve connection".into());
            return self.fail(TraceLevel::Exit, FN, err);
        };

        self.session = Some(session);
        self.connection = Some(connection);
        self.logger.exit(TraceLevel::Exit, FN, self.id(), "");
        Ok(())
    }

    /// Request a stop and drain what it produced. Returns whether the stop
    /// completed; if not, poll [`Messenger::stopped`] and call again.
    pub fn stop(&mut self, sink: &mut dyn ByteSink) -> bool {
        const FN: &str = "Messenger::stop";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        let Some(session) = self.session.as_mut() else {
            self.logger.exit(TraceLevel::Exit, FN, self.id(), "true");
            return true;
        };
        session.stop();
        self.write(sink, false);
        let stopped = self.session.as_ref().map_or(true, Session::stopped);
        if stopped {
            self.connection = None;
            self.session = None;
        }
        self.logger
            .exit(TraceLevel::Exit, FN, self.id(), if stopped { "true" } else { "false" });
        stopped
    }

    pub fn stopped(&self) -> bool {
        self.session.as_ref().map_or(true, Session::stopped)
    }

    /// Whether the remote end has completed the open handshake.
    pub fn started(&mut self) -> Result<bool> {
        const FN: &str = "Messenger::started";
        self.logger.entry(TraceLevel::EntryOften, FN, self.id());
        let Some(session) = self.session.as_ref() else {
            self.logger.exit(TraceLevel::ExitOften, FN, self.id(), "false");
            return Ok(false);
        };
        let started = session.started();
        self.check_errno(FN)?;
        self.logger.exit(
            TraceLevel::ExitOften,
            FN,
            self.id(),
            if started { "true" } else { "false" },
        );
        Ok(started)
    }

    /// Tell the session the host saw the socket close.
    pub fn closed(&mut self) -> Result<()> {
        const FN: &str = "Messenger::closed";
        self.logger.entry(TraceLevel::Entry, FN, self.id());
        if let (Some(session), Some(conn)) = (self.session.as_mut(), self.connection) {
            let result = session.connection_was_closed(conn);
            self.connection = None;
            if let Err(e) = result {
                // Consume the copy the session also recorded.
                if let Some(s) = self.session.as_mut() {
                    s.take_error();
                }
                return self.fail(TraceLevel::Exit, FN, session_error(e));
            }
        }
        self.check_errno(FN)?;
        self.logger.exit(TraceLevel::Exit, FN, self.id(), "");
        Ok(())
    }

    /// Force a transport tick so keep-alives go out with no application traffic.
    pub fn heartbeat(&mut self, sink: &mut dyn ByteSink) {
        const FN: &str = "Messenger::heartbeat";
        self.logger.entry(TraceLevel::EntryOften, FN, self.id());
        let n = self.write(sink, true);
        self.logger
            .exit(TraceLevel::ExitOften, FN, self.id(), &n.to_string());
    }
}
