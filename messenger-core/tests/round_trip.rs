mod common;

use common::{connected, exchange, SERVICE};
use messenger_core::{Body, Message, Status, Value};

fn address(path: &str) -> String {
    format!("{}/{}", SERVICE, path)
}

#[test]
fn message_survives_peer_round_trip() {
    let mut a = connected("sender");
    let mut b = connected("receiver");

    let mut msg = Message::new(address("A"), Body::Binary(vec![0, 1, 2, 255]));
    msg.set_content_type("application/octet-stream");
    msg.set_ttl(60_000);
    msg.properties_mut().insert("seq".into(), Value::Long(1));
    assert!(a.put(&mut msg, 1).unwrap());
    let mut out = Vec::new();
    assert!(a.send(&mut out).unwrap());
    assert!(b.push(&out).is_ok());

    exchange(&mut a, &mut b);
    assert!(a.started().unwrap());
    assert!(b.started().unwrap());
    assert!(a.sending(&address("A")).unwrap());

    let mut sink = Vec::new();
    let got = b.receive(&mut sink).unwrap();
    assert_eq!(got.len(), 1);
    let r = &got[0];
    assert_eq!(r.address(), msg.address());
    assert_eq!(r.content_type(), msg.content_type());
    assert_eq!(r.body().as_bytes(), msg.body().as_bytes());
    assert_eq!(r.ttl(), 60_000);
    assert_eq!(r.properties().get("seq"), Some(&Value::Long(1)));
    assert_eq!(r.link_address(), Some("A"));
    assert!(r.tracker().is_some());

    assert_eq!(a.status(&msg).unwrap(), Status::Pending);
    assert_eq!(b.status(r).unwrap(), Status::Pending);
    assert!(b.accept(r).unwrap());
    assert_eq!(b.status(r).unwrap(), Status::Accepted);
    let mut out = Vec::new();
    assert!(b.settle(r, &mut out).unwrap());
    a.push(&out).unwrap();
    exchange(&mut a, &mut b);

    assert_eq!(a.status(&msg).unwrap(), Status::Accepted);
    assert!(b.settled(r).unwrap());
}

#[test]
fn text_messages_arrive_in_order() {
    let mut a = connected("sender");
    let mut b = connected("receiver");
    for i in 0..3 {
        let mut msg = Message::new(address("topic"), Body::Empty);
        msg.set_body(Body::Text(format!("m{}", i)));
        a.put(&mut msg, 0).unwrap();
        assert_eq!(a.status(&msg).unwrap(), Status::Settled);
    }
    let mut out = Vec::new();
    a.send(&mut out).unwrap();
    b.push(&out).unwrap();
    exchange(&mut a, &mut b);

    let mut sink = Vec::new();
    let got = b.receive(&mut sink).unwrap();
    let bodies: Vec<_> = got.iter().map(|m| m.body().clone()).collect();
    assert_eq!(
        bodies,
        vec![
            Body::Text("m0".into()),
            Body::Text("m1".into()),
            Body::Text("m2".into())
        ]
    );
    assert!(got.iter().all(|m| m.content_type() == "text/plain"));
    // Pre-settled transfers are already final on the receiving side.
    assert_eq!(b.status(&got[0]).unwrap(), Status::Settled);
    assert!(b.receive(&mut sink).unwrap().is_empty());
}

#[test]
fn messages_wait_for_send() {
    let mut a = connected("sender");
    let mut b = connected("receiver");
    let mut msg = Message::new(address("q"), Body::Text("later".into()));
    a.put(&mut msg, 1).unwrap();
    exchange(&mut a, &mut b);
    let mut sink = Vec::new();
    assert!(b.receive(&mut sink).unwrap().is_empty());
    assert!(a.pending_outbound(&address("q")).unwrap());

    let mut out = Vec::new();
    a.send(&mut out).unwrap();
    b.push(&out).unwrap();
    exchange(&mut a, &mut b);
    assert_eq!(b.receive(&mut sink).unwrap().len(), 1);
    assert!(!a.pending_outbound(&address("q")).unwrap());
}

#[test]
fn orderly_stop_between_peers() {
    let mut a = connected("a");
    let mut b = connected("b");
    exchange(&mut a, &mut b);

    let mut out = Vec::new();
    assert!(!a.stop(&mut out));
    assert!(!a.stopped());
    b.push(&out).unwrap();
    exchange(&mut a, &mut b);

    assert!(a.stopped());
    let mut out = Vec::new();
    assert!(a.stop(&mut out));
    assert!(!a.connected());
    assert!(a.session().is_none());

    // A stopped messenger can connect again.
    a.connect(SERVICE, &Default::default()).unwrap();
    assert!(a.connected());
}
