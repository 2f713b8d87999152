//! Helpers shared by the integration tests: byte exchange between two
//! messengers and a scripted remote peer.

#![allow(dead_code)]

use messenger_core::protocol::{ReceiverSettleMode, Role, SenderSettleMode, Terminus};
use messenger_core::{decode_frame, encode_frame, Frame, Messenger, SslOptions, PROTOCOL_HEADER};

pub const SERVICE: &str = "amqp://peer:5672";

pub fn connected(name: &str) -> Messenger {
    let mut m = Messenger::new(name, "", "");
    m.connect(SERVICE, &SslOptions::default())
        .expect("connect");
    m
}

/// Shuttle bytes both ways until neither side has anything left to send.
pub fn exchange(a: &mut Messenger, b: &mut Messenger) {
    for _ in 0..16 {
        let mut ab = Vec::new();
        a.pop(&mut ab, false);
        let mut ba = Vec::new();
        b.pop(&mut ba, false);
        if ab.is_empty() && ba.is_empty() {
            return;
        }
        if !ab.is_empty() {
            assert_eq!(b.push(&ab).expect("push to b"), ab.len());
        }
        if !ba.is_empty() {
            assert_eq!(a.push(&ba).expect("push to a"), ba.len());
        }
    }
    panic!("peers did not settle");
}

/// Bytes a remote peer would send: protocol header followed by `frames`.
pub fn script(frames: &[Frame]) -> Vec<u8> {
    let mut out = PROTOCOL_HEADER.to_vec();
    for frame in frames {
        out.extend(encode_frame(frame).expect("encode"));
    }
    out
}

/// Frames in `bytes`, which must start at the protocol header.
pub fn frames(bytes: &[u8]) -> Vec<Frame> {
    assert!(bytes.starts_with(&PROTOCOL_HEADER), "missing protocol header");
    let mut rest = &bytes[PROTOCOL_HEADER.len()..];
    let mut out = Vec::new();
    while !rest.is_empty() {
        let (frame, n) = decode_frame(rest).expect("decode");
        out.push(frame);
        rest = &rest[n..];
    }
    out
}

pub fn open() -> Frame {
    Frame::Open {
        container_id: "broker".into(),
        hostname: "peer".into(),
        idle_timeout: 0,
        max_frame_size: 65536,
    }
}

/// The remote's answer to a local receiver link named `name`.
pub fn sender_attach(name: &str) -> Frame {
    Frame::Attach {
        name: name.into(),
        role: Role::Sender,
        snd_settle_mode: SenderSettleMode::Unsettled,
        rcv_settle_mode: ReceiverSettleMode::First,
        source: Terminus::new(name),
        target: Terminus::new(name),
    }
}

pub fn sender_detach(name: &str, closed: bool) -> Frame {
    Frame::Detach {
        name: name.into(),
        role: Role::Sender,
        closed,
        error: None,
    }
}
