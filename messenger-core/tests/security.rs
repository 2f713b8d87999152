mod common;

use std::io::Write;
use std::path::PathBuf;

use common::frames;
use messenger_core::{ErrorName, Frame, Messenger, SslOptions};

#[test]
fn missing_trust_file_fails_before_session() {
    let mut m = Messenger::new("tls-1", "", "");
    let ssl = SslOptions {
        trust_certificate: Some(PathBuf::from("/nonexistent/trust.pem")),
        verify_peer_name: false,
    };
    let err = m.connect("amqps://host:5671", &ssl).unwrap_err();
    assert_eq!(err.name(), ErrorName::Security);
    assert!(err.to_string().contains("/nonexistent/trust.pem"));
    assert!(m.session().is_none());
    assert!(!m.connected());
}

#[test]
fn readable_trust_file_connects() {
    let mut pem = tempfile::NamedTempFile::new().unwrap();
    writeln!(pem, "-----BEGIN CERTIFICATE-----").unwrap();
    writeln!(pem, "-----END CERTIFICATE-----").unwrap();

    let mut m = Messenger::new("tls-2", "user", "pw");
    let ssl = SslOptions {
        trust_certificate: Some(pem.path().to_path_buf()),
        verify_peer_name: true,
    };
    m.connect("amqps://host:5671", &ssl).unwrap();
    assert!(m.connected());
    let session = m.session().unwrap();
    assert_eq!(session.trusted_certificates(), Some(pem.path()));

    let mut out = Vec::new();
    m.pop(&mut out, false);
    let sent = frames(&out);
    assert!(matches!(
        &sent[0],
        Frame::SaslInit { mechanism, initial_response, .. }
            if mechanism == "PLAIN" && initial_response == b"\0user\0pw"
    ));
}

#[test]
fn service_credentials_win_over_messenger_credentials() {
    let mut m = Messenger::new("tls-3", "other", "secret");
    m.connect("amqp://svc:pw@host:5672", &SslOptions::default())
        .unwrap();
    let mut out = Vec::new();
    m.pop(&mut out, false);
    assert!(matches!(
        &frames(&out)[0],
        Frame::SaslInit { initial_response, .. } if initial_response == b"\0svc\0pw"
    ));
}

#[test]
fn anonymous_connection_skips_sasl() {
    let mut m = Messenger::new("plain", "", "");
    m.connect("amqp://host:5672", &SslOptions::default()).unwrap();
    let mut out = Vec::new();
    m.pop(&mut out, false);
    assert!(matches!(frames(&out)[..], [Frame::Open { .. }]));
}

#[test]
fn sasl_response_carries_unescaped_credentials() {
    let mut m = Messenger::new("c", "us er", "p@ss:w/rd");
    m.connect("amqp://host:5672", &SslOptions::default()).unwrap();
    let mut out = Vec::new();
    m.pop(&mut out, false);
    assert!(matches!(
        &frames(&out)[0],
        Frame::SaslInit { initial_response, .. } if initial_response == b"\0us er\0p@ss:w/rd"
    ));
}
