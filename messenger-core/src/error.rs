//! Named error categories surfaced to callers, and the classifier that maps
//! raw transport error text onto them.

use std::fmt;

/// Stable category name carried by every [`MessengerError`], distinct from its message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorName {
    Network,
    Security,
    Replaced,
    NotPermitted,
    Subscribed,
    Unsubscribed,
    Locate,
    Range,
    Type,
}

impl ErrorName {
    /// Classify a raw error string reported by the session or transport.
    ///
    /// Substring match, first hit wins: SASL/SSL failures are security
    /// errors, `_Takeover` means another client with the same identity took
    /// the session, `_InvalidSourceTimeout` is a policy violation. Anything
    /// else is a network error.
    pub fn classify(text: &str) -> Self {
        if text.contains("sasl ") || text.contains("SSL ") {
            return ErrorName::Security;
        }
        if text.contains("_Takeover") {
            return ErrorName::Replaced;
        }
        if text.contains("_InvalidSourceTimeout") {
            return ErrorName::NotPermitted;
        }
        ErrorName::Network
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorName::Network => "NetworkError",
            ErrorName::Security => "SecurityError",
            ErrorName::Replaced => "ReplacedError",
            ErrorName::NotPermitted => "NotPermittedError",
            ErrorName::Subscribed => "SubscribedError",
            ErrorName::Unsubscribed => "UnsubscribedError",
            ErrorName::Locate => "Error",
            ErrorName::Range => "RangeError",
            ErrorName::Type => "TypeError",
        }
    }
}

impl fmt::Display for ErrorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by every [`crate::Messenger`] operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessengerError {
    /// Transport failure, including "Not connected" and failed resolve/accept/settle.
    #[error("{0}")]
    Network(String),
    /// SASL/SSL negotiation failure or unreadable trust certificate.
    #[error("{0}")]
    Security(String),
    /// The session or link was taken over by another client with the same id.
    #[error("{0}")]
    Replaced(String),
    /// The remote rejected a terminus setting (e.g. source timeout).
    #[error("{0}")]
    NotPermitted(String),
    /// A link to the address is already open or pending.
    #[error("{0}")]
    Subscribed(String),
    /// Only an inactive link exists for the address.
    #[error("{0}")]
    Unsubscribed(String),
    /// No link in any state exists for the address.
    #[error("unable to locate link for {0}")]
    Locate(String),
    /// Argument out of range, e.g. QoS other than 0 or 1.
    #[error("{0}")]
    Range(String),
    /// Missing or malformed argument, or a session configuration call failed.
    #[error("{0}")]
    Type(String),
}

impl MessengerError {
    /// Build an error of the category the classifier picks for `text`.
    pub fn classified(text: impl Into<String>) -> Self {
        let text = text.into();
        match ErrorName::classify(&text) {
            ErrorName::Security => MessengerError::Security(text),
            ErrorName::Replaced => MessengerError::Replaced(text),
            ErrorName::NotPermitted => MessengerError::NotPermitted(text),
            _ => MessengerError::Network(text),
        }
    }

    pub fn not_connected() -> Self {
        MessengerError::Network("Not connected".to_string())
    }

    pub fn invalid_qos() -> Self {
        MessengerError::Range("qos argument is invalid must evaluate to 0 or 1".to_string())
    }

    pub fn name(&self) -> ErrorName {
        match self {
            MessengerError::Network(_) => ErrorName::Network,
            MessengerError::Security(_) => ErrorName::Security,
            MessengerError::Replaced(_) => ErrorName::Replaced,
            MessengerError::NotPermitted(_) => ErrorName::NotPermitted,
            MessengerError::Subscribed(_) => ErrorName::Subscribed,
            MessengerError::Unsubscribed(_) => ErrorName::Unsubscribed,
            MessengerError::Locate(_) => ErrorName::Locate,
            MessengerError::Range(_) => ErrorName::Range,
            MessengerError::Type(_) => ErrorName::Type,
        }
    }

    /// True for failures of a local precondition rather than of the remote or transport.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            MessengerError::Subscribed(_)
                | MessengerError::Unsubscribed(_)
                | MessengerError::Locate(_)
                | MessengerError::Range(_)
                | MessengerError::Type(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MessengerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_security() {
        assert_eq!(
            ErrorName::classify("sasl authentication failed"),
            ErrorName::Security
        );
        assert_eq!(
            ErrorName::classify("SSL handshake failure"),
            ErrorName::Security
        );
        // "sasl" without the trailing space is not a match.
        assert_eq!(ErrorName::classify("sasl"), ErrorName::Network);
    }

    #[test]
    fn classify_takeover_and_policy() {
        assert_eq!(
            ErrorName::classify("amqp:link:stolen _Takeover by client"),
            ErrorName::Replaced
        );
        assert_eq!(
            ErrorName::classify("amqp:precondition _InvalidSourceTimeout"),
            ErrorName::NotPermitted
        );
    }

    #[test]
    fn classify_defaults_to_network() {
        assert_eq!(ErrorName::classify("connection aborted"), ErrorName::Network);
        assert_eq!(ErrorName::classify(""), ErrorName::Network);
    }

    #[test]
    fn classified_builds_matching_variant() {
        let err = MessengerError::classified("SSL certificate rejected");
        assert!(matches!(err, MessengerError::Security(_)));
        assert_eq!(err.name().as_str(), "SecurityError");
        assert_eq!(err.to_string(), "SSL certificate rejected");
        assert!(!err.is_local());
    }

    #[test]
    fn locate_is_local_and_distinct_from_unsubscribed() {
        let locate = MessengerError::Locate("amqp://host/q".into());
        let unsub = MessengerError::Unsubscribed("client is not subscribed".into());
        assert!(locate.is_local());
        assert!(unsub.is_local());
        assert_ne!(locate.name(), unsub.name());
        assert_eq!(locate.to_string(), "unable to locate link for amqp://host/q");
    }
}
