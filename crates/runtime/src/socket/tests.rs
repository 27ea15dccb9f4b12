use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lv_protocol::{ReplyStatus, events};
use serde_json::json;
use tokio::sync::mpsc;

use super::*;
use crate::transport::{FakeConnector, FakeTransportController};

fn fake_socket(opts: SocketOptions) -> (Arc<Socket>, FakeTransportController) {
	let (connector, server) = FakeConnector::pair();
	let socket = Socket::with_connector("ws://localhost:4000/live", opts, connector);
	(socket, server)
}

fn no_params() -> ParamsFn {
	Arc::new(|| json!({}))
}

async fn eventually(check: impl Fn() -> bool) -> bool {
	for _ in 0..400 {
		if check() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	false
}

#[test]
fn test_endpoint_url_resolution() {
	let socket = Socket::new("ws://localhost:4000/live", SocketOptions::default());
	assert_eq!(
		socket.endpoint_url().unwrap(),
		"ws://localhost:4000/live/websocket?vsn=2.0.0"
	);

	let socket = Socket::new("https://example.com/live/", SocketOptions::default());
	assert_eq!(
		socket.endpoint_url().unwrap(),
		"wss://example.com/live/websocket?vsn=2.0.0"
	);

	let opts = SocketOptions::new().origin("https://example.com");
	let socket = Socket::new("//cdn.example.com/live", opts);
	assert_eq!(
		socket.endpoint_url().unwrap(),
		"wss://cdn.example.com/live/websocket?vsn=2.0.0"
	);

	let opts = SocketOptions::new()
		.origin("http://localhost:4000")
		.param("_csrf_token", "abc");
	let socket = Socket::new("/live", opts);
	assert_eq!(
		socket.endpoint_url().unwrap(),
		"ws://localhost:4000/live/websocket?_csrf_token=abc&vsn=2.0.0"
	);
}

#[test]
fn test_relative_endpoint_without_origin_is_invalid() {
	let socket = Socket::new("/live", SocketOptions::default());
	let err = socket.endpoint_url().unwrap_err();
	assert!(matches!(err, Error::InvalidEndpoint { .. }));

	let socket = Socket::new("ftp://example.com/live", SocketOptions::default());
	assert!(socket.endpoint_url().is_err());
}

#[test]
fn test_open_requires_runtime() {
	let (socket, _server) = fake_socket(SocketOptions::default());
	assert!(matches!(socket.open(), Err(Error::NoRuntime)));
	assert_eq!(socket.state(), SocketState::Closed);
}

#[test]
fn test_make_ref_increments() {
	let (socket, _server) = fake_socket(SocketOptions::default());
	assert_eq!(socket.make_ref(), "1");
	assert_eq!(socket.make_ref(), "2");
}

#[tokio::test]
async fn test_open_is_idempotent_and_fires_on_open() {
	let (socket, server) = fake_socket(SocketOptions::default());
	let opened = Arc::new(AtomicUsize::new(0));
	let o = Arc::clone(&opened);
	socket.on_open(move || {
		o.fetch_add(1, Ordering::SeqCst);
	});

	socket.open().unwrap();
	socket.open().unwrap();

	assert!(server.wait_for_connects(1).await);
	assert!(eventually(|| socket.is_connected()).await);
	assert_eq!(opened.load(Ordering::SeqCst), 1);
	assert_eq!(server.connects(), 1);
}

#[tokio::test]
async fn test_pushes_before_open_are_flushed_in_order() {
	let (socket, server) = fake_socket(SocketOptions::default());
	let first = socket.channel("lv:first", no_params());
	let second = socket.channel("lv:second", no_params());
	first.join().unwrap();
	second.join().unwrap();
	assert!(server.sent().is_empty());

	socket.open().unwrap();

	let a = server.next_sent().await.unwrap();
	let b = server.next_sent().await.unwrap();
	assert_eq!((a.topic.as_str(), a.event.as_str()), ("lv:first", events::JOIN));
	assert_eq!((b.topic.as_str(), b.event.as_str()), ("lv:second", events::JOIN));
}

#[tokio::test]
async fn test_join_params_are_evaluated_at_join_time() {
	let (socket, server) = fake_socket(SocketOptions::default());
	let calls = Arc::new(AtomicUsize::new(0));
	let c = Arc::clone(&calls);
	let channel = socket.channel(
		"lv:container",
		Arc::new(move || json!({ "mounts": c.fetch_add(1, Ordering::SeqCst) })),
	);
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	socket.open().unwrap();
	channel.join().unwrap();

	let join = server.expect_event("lv:container", events::JOIN).await.unwrap();
	assert_eq!(join.payload["mounts"], 0);
	assert_eq!(join.join_ref, join.msg_ref);
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_join_ok_and_push_reply() {
	let (socket, server) = fake_socket(SocketOptions::default());
	socket.open().unwrap();

	let channel = socket.channel("lv:container", no_params());
	let (tx, mut rx) = mpsc::unbounded_channel();
	channel.on_join(move |resp| { let _ = tx.send(resp.clone()); }, |_| {});
	channel.join().unwrap();
	assert!(matches!(channel.join(), Err(Error::AlreadyJoined(_))));

	let join = server.expect_event("lv:container", events::JOIN).await.unwrap();
	server.reply(&join, ReplyStatus::Ok, json!({"rendered": {"0": "hi"}}));

	let rendered = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
	assert_eq!(rendered["rendered"]["0"], "hi");
	assert!(channel.is_joined());

	let pushing = Arc::clone(&channel);
	let push = tokio::spawn(async move { pushing.push(events::EVENT, json!({"event": "inc"})).await });

	let sent = server.expect_event("lv:container", events::EVENT).await.unwrap();
	assert_eq!(sent.join_ref, join.join_ref);
	server.reply(&sent, ReplyStatus::Ok, json!({"diff": {"0": "1"}}));

	let response = push.await.unwrap().unwrap();
	assert_eq!(response["diff"]["0"], "1");
}

#[tokio::test]
async fn test_push_requires_join() {
	let (socket, _server) = fake_socket(SocketOptions::default());
	let channel = socket.channel("lv:container", no_params());
	let err = channel.push(events::EVENT, json!({})).await.unwrap_err();
	assert!(matches!(err, Error::NotJoined(_)));
}

#[tokio::test]
async fn test_join_rejected() {
	let (socket, server) = fake_socket(SocketOptions::default());
	socket.open().unwrap();

	let channel = socket.channel("lv:container", no_params());
	let (tx, mut rx) = mpsc::unbounded_channel();
	channel.on_join(|_| {}, move |err| { let _ = tx.send(err.reason().map(str::to_string)); });
	channel.join().unwrap();

	let join = server.expect_event("lv:container", events::JOIN).await.unwrap();
	server.reply(&join, ReplyStatus::Error, json!({"reason": "stale"}));

	let reason = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
	assert_eq!(reason.as_deref(), Some("stale"));
	assert_eq!(channel.state(), ChannelState::Errored);
}

#[tokio::test]
async fn test_join_timeout() {
	let opts = SocketOptions::new().timeout(Duration::from_millis(30));
	let (socket, server) = fake_socket(opts);
	socket.open().unwrap();

	let channel = socket.channel("lv:container", no_params());
	let (tx, mut rx) = mpsc::unbounded_channel();
	channel.on_join(|_| {}, move |err| { let _ = tx.send(err.is_timeout()); });
	channel.join().unwrap();

	assert!(tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap());
	assert_eq!(channel.state(), ChannelState::Errored);
	assert!(server.expect_event("lv:container", events::LEAVE).await.is_some());
}

#[tokio::test]
async fn test_stale_frames_are_dropped() {
	let (socket, server) = fake_socket(SocketOptions::default());
	socket.open().unwrap();

	let channel = socket.channel("lv:container", no_params());
	let hits = Arc::new(AtomicUsize::new(0));
	let h = Arc::clone(&hits);
	channel.on(events::DIFF, move |_| {
		h.fetch_add(1, Ordering::SeqCst);
	});
	channel.join().unwrap();

	let join = server.expect_event("lv:container", events::JOIN).await.unwrap();
	server.reply(&join, ReplyStatus::Ok, json!({}));
	assert!(eventually(|| channel.is_joined()).await);

	server.push("lv:container", events::DIFF, json!({}), Some("stale-ref"));
	server.push("lv:other", events::DIFF, json!({}), join.join_ref.as_deref());
	server.push("lv:container", events::DIFF, json!({}), join.join_ref.as_deref());

	assert!(eventually(|| hits.load(Ordering::SeqCst) == 1).await);
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reconnect_rejoins_errored_channels() {
	let (socket, server) = fake_socket(SocketOptions::default());
	socket.open().unwrap();

	let channel = socket.channel("lv:container", no_params());
	let errors = Arc::new(AtomicUsize::new(0));
	let e = Arc::clone(&errors);
	channel.on_error(move |_| {
		e.fetch_add(1, Ordering::SeqCst);
	});
	channel.join().unwrap();

	let join = server.expect_event("lv:container", events::JOIN).await.unwrap();
	server.reply(&join, ReplyStatus::Ok, json!({}));
	assert!(eventually(|| channel.is_joined()).await);

	server.drop_connection();
	assert!(eventually(|| errors.load(Ordering::SeqCst) == 1).await);

	assert!(server.wait_for_connects(2).await);
	let rejoin = server.expect_event("lv:container", events::JOIN).await.unwrap();
	assert_ne!(rejoin.join_ref, join.join_ref);
	server.reply(&rejoin, ReplyStatus::Ok, json!({}));
	assert!(eventually(|| channel.is_joined()).await);
}

#[tokio::test]
async fn test_close_stops_reconnecting() {
	let (socket, server) = fake_socket(SocketOptions::default());
	let closed = Arc::new(AtomicUsize::new(0));
	let c = Arc::clone(&closed);
	socket.on_close(move || {
		c.fetch_add(1, Ordering::SeqCst);
	});

	socket.open().unwrap();
	assert!(eventually(|| socket.is_connected()).await);

	socket.close();
	assert_eq!(socket.state(), SocketState::Closed);
	assert_eq!(closed.load(Ordering::SeqCst), 1);

	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(server.connects(), 1);
}

#[tokio::test]
async fn test_unanswered_heartbeat_drops_connection() {
	let opts = SocketOptions::new().heartbeat_interval(Duration::from_millis(30));
	let (socket, server) = fake_socket(opts);
	socket.open().unwrap();

	let heartbeat = server.expect_event(PHOENIX_TOPIC, events::HEARTBEAT).await.unwrap();
	assert!(heartbeat.msg_ref.is_some());

	assert!(server.wait_for_connects(2).await);
	socket.close();
}

#[tokio::test]
async fn test_invalid_endpoint_reports_error_without_retry() {
	let (connector, server) = FakeConnector::pair();
	let socket = Socket::with_connector("/live", SocketOptions::default(), connector);
	let (tx, mut rx) = mpsc::unbounded_channel();
	socket.on_error(move |err| { let _ = tx.send(matches!(err, Error::InvalidEndpoint { .. })); });

	socket.open().unwrap();
	assert!(tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap());
	assert!(eventually(|| socket.state() == SocketState::Closed).await);
	assert_eq!(server.connects(), 0);
}

#[tokio::test]
async fn test_leave_is_idempotent() {
	let (socket, server) = fake_socket(SocketOptions::default());
	socket.open().unwrap();

	let channel = socket.channel("lv:container", no_params());
	let closes = Arc::new(AtomicUsize::new(0));
	let c = Arc::clone(&closes);
	channel.on_close(move || {
		c.fetch_add(1, Ordering::SeqCst);
	});
	channel.join().unwrap();
	let join = server.expect_event("lv:container", events::JOIN).await.unwrap();
	server.reply(&join, ReplyStatus::Ok, json!({}));
	assert!(eventually(|| channel.is_joined()).await);

	channel.leave();
	channel.leave();

	let leave = server.expect_event("lv:container", events::LEAVE).await.unwrap();
	assert_eq!(leave.join_ref, join.join_ref);
	assert_eq!(channel.state(), ChannelState::Closed);
	assert_eq!(closes.load(Ordering::SeqCst), 1);
	assert!(socket.channels().is_empty());
	assert!(matches!(channel.join(), Err(Error::ChannelClosed)));
}

#[tokio::test]
async fn test_server_error_fires_error_hooks() {
	let (socket, server) = fake_socket(SocketOptions::default());
	socket.open().unwrap();

	let channel = socket.channel("lv:container", no_params());
	let (tx, mut rx) = mpsc::unbounded_channel();
	channel.on_error(move |err| { let _ = tx.send(err.to_string()); });
	channel.join().unwrap();
	let join = server.expect_event("lv:container", events::JOIN).await.unwrap();
	server.reply(&join, ReplyStatus::Ok, json!({}));
	assert!(eventually(|| channel.is_joined()).await);

	server.push("lv:container", events::ERROR, json!({}), join.join_ref.as_deref());

	let message = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
	assert!(message.contains("lv:container"));
	assert_eq!(channel.state(), ChannelState::Errored);
}

#[tokio::test]
async fn test_lifecycle_events_never_reach_bindings() {
	let (socket, server) = fake_socket(SocketOptions::default());
	socket.open().unwrap();

	let channel = socket.channel("lv:container", no_params());
	let leaves = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&leaves);
	channel.on(events::LEAVE, move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
	});
	let (tx, mut rx) = mpsc::unbounded_channel();
	channel.on(events::DIFF, move |diff| { let _ = tx.send(diff.clone()); });

	channel.join().unwrap();
	let join = server.expect_event("lv:container", events::JOIN).await.unwrap();
	server.reply(&join, ReplyStatus::Ok, json!({}));
	assert!(eventually(|| channel.is_joined()).await);

	server.push("lv:container", events::LEAVE, json!({}), join.join_ref.as_deref());
	server.push("lv:container", events::DIFF, json!({"0": "1"}), join.join_ref.as_deref());

	let diff = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
	assert_eq!(diff["0"], "1");
	assert_eq!(leaves.load(Ordering::SeqCst), 0);
	assert!(channel.is_joined());
}
