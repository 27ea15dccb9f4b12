use futures_util::{SinkExt, StreamExt};
use lv_protocol::{Message, events};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::*;
use crate::error::Error;

#[tokio::test]
async fn test_fake_transport_records_sent_frames() {
	let (connector, server) = FakeConnector::pair();
	let parts = connector.connect("ws://fake/live").await.unwrap();
	let mut sender = parts.sender;

	let frame = Message::new("lv:container", events::JOIN, json!({"session": "abc123"}))
		.with_join_ref("1")
		.with_ref("1");
	sender.send(frame.encode().unwrap()).await.unwrap();

	let sent = server.next_sent().await.expect("frame should be recorded");
	assert_eq!(sent, frame);
	assert_eq!(server.sent().len(), 1);
	assert_eq!(server.connects(), 1);
}

#[tokio::test]
async fn test_fake_transport_rejects_malformed_frames() {
	let (connector, _server) = FakeConnector::pair();
	let mut parts = connector.connect("ws://fake/live").await.unwrap();

	let err = parts.sender.send("{not json".to_string()).await;
	assert!(matches!(err, Err(Error::ProtocolError(_))));
}

#[tokio::test]
async fn test_fake_transport_injects_and_drops() {
	let (connector, server) = FakeConnector::pair();
	let parts = connector.connect("ws://fake/live").await.unwrap();
	let mut rx = parts.message_rx;
	let recv_task = tokio::spawn(parts.receiver.run());

	assert!(server.is_connected());
	assert!(server.push("lv:container", events::DIFF, json!({"0": "1"}), None));

	let text = rx.recv().await.expect("injected frame");
	let message = Message::decode(&text).unwrap();
	assert_eq!(message.event, events::DIFF);

	server.drop_connection();
	assert!(!server.is_connected());
	assert!(rx.recv().await.is_none(), "dropping ends the inbound stream");
	recv_task.await.unwrap().unwrap();

	assert!(!server.push("lv:container", events::DIFF, json!({}), None));
}

#[tokio::test]
async fn test_fake_transport_refuses_connections() {
	let (connector, server) = FakeConnector::pair();
	server.refuse_connections(true);

	let result = connector.connect("ws://fake/live").await;
	assert!(matches!(result, Err(Error::ConnectionFailed(_))));
	assert_eq!(server.connects(), 0);

	server.refuse_connections(false);
	assert!(connector.connect("ws://fake/live").await.is_ok());
	assert!(server.wait_for_connects(1).await);
}

#[tokio::test]
async fn test_websocket_transport_round_trip() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
		let (mut ws_tx, mut ws_rx) = ws.split();

		let incoming = ws_rx.next().await.unwrap().unwrap();
		let text = incoming.into_text().unwrap().to_string();
		let message = Message::decode(&text).unwrap();
		assert_eq!(message.event, events::HEARTBEAT);

		let reply = Message::new("phoenix", events::REPLY, json!({"status": "ok"}))
			.with_ref(message.msg_ref.unwrap_or_default());
		ws_tx
			.send(WsMessage::Text(reply.encode().unwrap().into()))
			.await
			.unwrap();
	});

	let url = format!("ws://{addr}/live/websocket");
	let parts = WebSocketConnector.connect(&url).await.unwrap();
	let mut sender = parts.sender;
	let mut rx = parts.message_rx;
	let recv_task = tokio::spawn(parts.receiver.run());

	let heartbeat = Message::new("phoenix", events::HEARTBEAT, json!({})).with_ref("7");
	sender.send(heartbeat.encode().unwrap()).await.unwrap();

	let text = rx.recv().await.expect("should receive reply");
	let reply = Message::decode(&text).unwrap();
	assert!(reply.is_reply());
	assert_eq!(reply.msg_ref.as_deref(), Some("7"));

	// Receiver may exit with an error after the server hangs up; that's OK.
	recv_task.abort();
	let _ = recv_task.await;
	server.await.unwrap();
}

#[tokio::test]
async fn test_websocket_connect_failure() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	drop(listener);

	let result = WebSocketConnector.connect(&format!("ws://{addr}/live")).await;
	assert!(matches!(result, Err(Error::ConnectionFailed(_))));
}
