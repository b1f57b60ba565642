//! Request/reply correlation inside one domain

mod common;

use async_trait::async_trait;
use cell_config::CellSettings;
use cell_runtime::{Answer, CallbackExecutor, Cell, CellError, CellNucleus, Domain};
use cell_types::{Address, CellPath, Envelope, Message, Payload, RemoteErrorKind};
use common::{init_tracing, Echo, Idle, Slow, WAIT};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Failing;

#[async_trait]
impl Cell for Failing {
    async fn message_arrived(&self, _nucleus: &CellNucleus, _envelope: &Envelope) -> anyhow::Result<Option<Message>> {
        anyhow::bail!("bad input")
    }
}

struct Panicking;

#[async_trait]
impl Cell for Panicking {
    async fn message_arrived(&self, _nucleus: &CellNucleus, _envelope: &Envelope) -> anyhow::Result<Option<Message>> {
        panic!("handler exploded")
    }
}

fn to(cell: &str, message: Message) -> Envelope {
    Envelope::to(Address::local(cell), message)
}

#[tokio::test]
async fn test_request_reply() {
    init_tracing();
    let domain = Domain::new("req");
    domain.spawn_cell("echo", Arc::new(Echo)).await.unwrap();
    let client = domain.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    let request = to("echo", Message::text("hello"));
    let uoid = request.uoid();
    let reply = client.request(request, WAIT).await.unwrap();

    assert!(reply.is_reply());
    assert_eq!(reply.last_uoid(), Some(uoid));
    assert_eq!(reply.message(), Some(&Message::text("hello")));
    assert_eq!(reply.source_path().source(), Some(&Address::new("echo", "req")));
    assert!(client.pending_requests().is_empty());
}

#[tokio::test]
async fn test_timeout_returns_none_and_clears_entry() {
    init_tracing();
    let domain = Domain::new("timeouts");
    domain.spawn_cell("sink", Arc::new(Idle)).await.unwrap();
    let client = domain.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    let answer = client
        .send_and_wait(to("sink", Message::Empty), Duration::from_millis(50))
        .await
        .unwrap();
    assert!(answer.is_none());
    assert!(client.pending_requests().is_empty());

    let err = client
        .request(to("sink", Message::Empty), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, CellError::Timeout { timeout_ms: 50, .. }));
}

#[tokio::test]
async fn test_unknown_destination_fails_on_send() {
    init_tracing();
    let domain = Domain::new("noroute");
    let client = domain.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    let err = client.send(to("nowhere", Message::Empty)).unwrap_err();
    assert!(matches!(err, CellError::NoRoute { .. }));

    let err = client
        .send_and_wait(to("nowhere", Message::Empty), WAIT)
        .await
        .unwrap_err();
    assert!(err.is_no_route());
    assert!(client.pending_requests().is_empty());
}

#[tokio::test]
async fn test_handler_error_is_returned_to_sender() {
    init_tracing();
    let domain = Domain::new("errors");
    domain.spawn_cell("failing", Arc::new(Failing)).await.unwrap();
    domain.spawn_cell("panicking", Arc::new(Panicking)).await.unwrap();
    let client = domain.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    let err = client
        .request(to("failing", Message::text("x")), WAIT)
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Application));
    assert!(err.to_string().contains("bad input"));

    let err = client
        .request(to("panicking", Message::text("x")), WAIT)
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::ActorPanic));
    assert!(err.to_string().contains("Cell panicking failed: handler exploded"));

    // the panicking cell keeps serving
    let info = domain.cell_info("panicking").unwrap();
    assert_eq!(info.state.to_string(), "active");
}

#[tokio::test]
async fn test_concurrent_requests_get_their_own_replies() {
    init_tracing();
    let domain = Domain::new("concurrent");
    domain.spawn_cell("echo", Arc::new(Echo)).await.unwrap();
    let client = domain.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let reply = client
                    .request(to("echo", Message::text(format!("req-{i}"))), WAIT)
                    .await
                    .unwrap();
                (i, reply.message().and_then(Message::as_text).map(str::to_string))
            })
        })
        .collect();

    for task in tasks {
        let (i, text) = task.await.unwrap();
        assert_eq!(text, Some(format!("req-{i}")));
    }
    assert!(client.pending_requests().is_empty());
}

#[tokio::test]
async fn test_multi_hop_path_through_forwarding_cell() {
    init_tracing();
    let domain = Domain::new("hops");
    domain.spawn_cell("echo", Arc::new(Echo)).await.unwrap();
    domain.spawn_cell("relay", Arc::new(Idle)).await.unwrap();
    let client = domain.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    let path = CellPath::parse("relay:echo").unwrap();
    let reply = client
        .request(Envelope::new(path, Message::text("via relay")), WAIT)
        .await
        .unwrap();

    assert_eq!(reply.message(), Some(&Message::text("via relay")));
    // echo answered, the relay carried it back
    let hops: Vec<String> = reply
        .source_path()
        .addresses()
        .iter()
        .map(|a| a.to_string())
        .collect();
    assert_eq!(hops, vec!["echo@hops", "relay@hops"]);
}

#[tokio::test]
async fn test_callback_receives_reply() {
    init_tracing();
    let domain = Domain::new("callbacks");
    domain.spawn_cell("echo", Arc::new(Echo)).await.unwrap();
    let client = domain.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = Arc::new(move |_: &Envelope, answer: Answer| {
        let _ = tx.send(answer);
    });

    client
        .send_with_callback(to("echo", Message::text("async")), handler.clone(), WAIT)
        .unwrap();
    match tokio::time::timeout(WAIT, rx.recv()).await {
        Ok(Some(Answer::Reply(reply))) => assert_eq!(reply.message(), Some(&Message::text("async"))),
        other => panic!("expected reply, got {other:?}"),
    }

    client
        .send_with_callback_on(
            to("echo", Message::text("inline")),
            true,
            true,
            handler,
            CallbackExecutor::Inline,
            WAIT,
        )
        .unwrap();
    match tokio::time::timeout(WAIT, rx.recv()).await {
        Ok(Some(Answer::Reply(reply))) => assert_eq!(reply.message(), Some(&Message::text("inline"))),
        other => panic!("expected reply, got {other:?}"),
    }
}

#[tokio::test]
async fn test_callback_timeout_and_routing_failure() {
    init_tracing();
    let domain = Domain::new("callback-failures");
    domain.spawn_cell("sink", Arc::new(Idle)).await.unwrap();
    let settings = CellSettings {
        sweep_interval_ms: 10,
        ..CellSettings::default()
    };
    let client = domain
        .spawn_cell_with_settings("client", Arc::new(Idle), settings)
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = Arc::new(move |_: &Envelope, answer: Answer| {
        let _ = tx.send(answer);
    });

    client
        .send_with_callback(to("sink", Message::Empty), handler.clone(), Duration::from_millis(30))
        .unwrap();
    assert!(matches!(
        tokio::time::timeout(WAIT, rx.recv()).await,
        Ok(Some(Answer::TimedOut))
    ));
    assert!(client.pending_requests().is_empty());

    // routing failures go to the handler, not the caller
    client
        .send_with_callback(to("nowhere", Message::Empty), handler, WAIT)
        .unwrap();
    match tokio::time::timeout(WAIT, rx.recv()).await {
        Ok(Some(Answer::Error(err))) => assert!(err.is_no_route()),
        other => panic!("expected routing error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_busy_cell_fails_fast() {
    init_tracing();
    let domain = Domain::new("busy");
    domain
        .spawn_cell(
            "slow",
            Arc::new(Slow {
                delay: Duration::from_millis(300),
            }),
        )
        .await
        .unwrap();
    let client = domain.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    for i in 0..3 {
        client.send(to("slow", Message::text(format!("m{i}")))).unwrap();
    }
    // m1 has now waited ~300ms for a worker and m2 is still queued
    tokio::time::sleep(Duration::from_millis(400)).await;
    let info = domain.cell_info("slow").unwrap();
    assert!(info.queue_size >= 1);
    assert!(info.expected_queue_time_ms >= 200);

    let err = client
        .request(to("slow", Message::text("urgent")), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_no_route());
    assert!(err.to_string().contains("busy"));
}

#[tokio::test]
async fn test_undecodable_payload_returns_deserialization_error() {
    init_tracing();
    let domain = Domain::new("garbage");
    domain.spawn_cell("echo", Arc::new(Echo)).await.unwrap();
    let client = domain.spawn_cell("client", Arc::new(Idle)).await.unwrap();

    // already encoded, so the sender's address has to be recorded by hand
    let mut request = to("echo", Message::Empty);
    request.set_payload(Payload::Encoded(b"XXXXnot a message".to_vec().into()));
    request.add_source_address(client.address().clone());

    let err = client.request(request, WAIT).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Deserialization));
    assert!(err.to_string().contains("deserialize"));
    assert!(client.pending_requests().is_empty());
}
