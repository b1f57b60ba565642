//! Several domains joined by loopback tunnels

mod common;

use cell_runtime::{Domain, LoopbackTunnel, Route};
use cell_types::{Address, Envelope, Message, RemoteError, RemoteErrorKind};
use common::{collect, init_tracing, stays_quiet, Complaints, Echo, Idle, Recorder, WAIT};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn connected() -> (Domain, Domain) {
    let d1 = Domain::new("d1");
    let d2 = Domain::new("d2");
    LoopbackTunnel::connect(&d1, &d2).await.unwrap();
    (d1, d2)
}

#[tokio::test]
async fn test_request_across_tunnel() {
    init_tracing();
    let (d1, d2) = connected().await;
    d2.spawn_cell("echo", Arc::new(Echo)).await.unwrap();
    let client = d1.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    let request = Envelope::to(Address::new("echo", "d2"), Message::text("over there"));
    let reply = client.request(request, WAIT).await.unwrap();

    assert_eq!(reply.message(), Some(&Message::text("over there")));
    assert_eq!(reply.source_path().source(), Some(&Address::new("echo", "d2")));
    assert_eq!(
        reply.source_path().destination(),
        Some(&Address::new("tunnel-d2", "d1"))
    );

    let tunnel = d1.cell_info("tunnel-d2").unwrap();
    assert_eq!(tunnel.cell_type, "LoopbackTunnel");
    assert!(tunnel.short_info.contains("(1 sent)"));
}

#[tokio::test]
async fn test_unknown_domain_reports_no_route() {
    init_tracing();
    let (d1, _d2) = connected().await;
    let client = d1.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    let err = client
        .request(Envelope::to(Address::new("ghost", "d2"), Message::Empty), WAIT)
        .await
        .unwrap_err();
    assert!(err.is_no_route());
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn test_default_route_loop_is_refused() {
    init_tracing();
    let (d1, d2) = connected().await;
    d1.route_add(Route::default_route(Address::new("tunnel-d2", "d1")))
        .unwrap();
    d2.route_add(Route::default_route(Address::new("tunnel-d1", "d2")))
        .unwrap();
    let client = d1.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    // d2 would hand it straight back to the tunnel it came from
    let err = client
        .request(Envelope::to(Address::new("ghost", "d3"), Message::Empty), WAIT)
        .await
        .unwrap_err();
    assert!(err.is_no_route());
    assert!(err.to_string().contains("refusing to send back"));
}

#[tokio::test]
async fn test_topic_reaches_remote_subscribers() {
    init_tracing();
    let (d1, d2) = connected().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    d2.spawn_cell("listener", Arc::new(Recorder::new(tx))).await.unwrap();
    d2.subscribe("alerts", Address::local("listener")).unwrap();
    d1.subscribe("alerts", Address::for_domain("d2")).unwrap();
    let client = d1.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    client.send(Envelope::to(Address::local("alerts"), Message::text("disk full"))).unwrap();

    let (cell, envelope) = collect(&mut rx, 1).await.remove(0);
    assert_eq!(cell, "listener");
    assert_eq!(envelope.message(), Some(&Message::text("disk full")));
    assert_eq!(envelope.source_path().source(), Some(&Address::new("client", "d1")));
}

#[tokio::test]
async fn test_topic_copies_follow_remote_flag() {
    init_tracing();
    let (d1, d2) = connected().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    for name in ["r1", "r2"] {
        d1.spawn_cell(name, Arc::new(Recorder::new(tx.clone()))).await.unwrap();
        d1.subscribe("alerts", Address::local(name)).unwrap();
    }
    d2.spawn_cell("r3", Arc::new(Recorder::new(tx))).await.unwrap();
    d2.subscribe("alerts", Address::local("r3")).unwrap();
    d1.subscribe("alerts", Address::for_domain("d2")).unwrap();
    let client = d1.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    client
        .send_with(Envelope::to(Address::local("alerts"), Message::text("local only")), true, false)
        .unwrap();
    let mut got: Vec<String> = collect(&mut rx, 2).await.into_iter().map(|(cell, _)| cell).collect();
    got.sort();
    assert_eq!(got, vec!["r1", "r2"]);
    assert!(stays_quiet(&mut rx, Duration::from_millis(50)).await);

    client
        .send_with(Envelope::to(Address::local("alerts"), Message::text("everywhere")), true, true)
        .unwrap();
    let mut got: Vec<String> = collect(&mut rx, 3).await.into_iter().map(|(cell, _)| cell).collect();
    got.sort();
    assert_eq!(got, vec!["r1", "r2", "r3"]);
}

#[tokio::test]
async fn test_undeliverable_error_reply_is_not_bounced() {
    init_tracing();
    let (d1, _d2) = connected().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sender = d1.spawn_cell("sender", Arc::new(Complaints::new(tx))).await.unwrap();

    // a plain reply that dies in d2 comes back as a no-route notice
    let mut reply = Envelope::to(Address::new("ghost", "d2"), Message::text("answer"));
    reply.set_reply(true);
    sender.send(reply).unwrap();
    let notice = collect(&mut rx, 1).await.remove(0);
    assert_eq!(notice.kind, RemoteErrorKind::NoRoute);
    assert!(notice.message.contains("ghost"));

    // an error reply that dies in d2 is only logged there
    let mut failure = Envelope::to(
        Address::new("ghost", "d2"),
        Message::Error(RemoteError::application("request failed")),
    );
    failure.set_reply(true);
    sender.send(failure).unwrap();
    assert!(stays_quiet(&mut rx, Duration::from_millis(200)).await);
}
