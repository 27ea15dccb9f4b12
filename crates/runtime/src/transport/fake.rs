//! In-memory transport for exercising sockets, channels and views without a server.
//!
//! # Example
//!
//! ```ignore
//! let (connector, server) = FakeConnector::pair();
//! let socket = Socket::with_connector("ws://test/live", SocketOptions::default(), connector);
//! socket.open()?;
//!
//! let channel = socket.channel("lv:container", Arc::new(|| json!({})));
//! channel.join()?;
//!
//! let join = server.expect_event("lv:container", "phx_join").await.unwrap();
//! server.reply(&join, ReplyStatus::Ok, json!({"rendered": {}}));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lv_protocol::{Message, Reply, ReplyStatus, events};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use super::{Connector, Transport, TransportFuture, TransportParts, TransportReceiver};
use crate::error::Error;

/// How long controller `wait_*`/`expect_*` helpers wait before giving up.
const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

struct FakeShared {
	inbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
	history: Mutex<Vec<Message>>,
	sent_tx: mpsc::UnboundedSender<Message>,
	sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
	refuse: AtomicBool,
	connects: watch::Sender<usize>,
}

/// [`Connector`] handing out in-memory connections.
pub struct FakeConnector {
	shared: Arc<FakeShared>,
}

impl FakeConnector {
	/// Creates a connector and the controller that plays the server side.
	pub fn pair() -> (Arc<Self>, FakeTransportController) {
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();
		let (connects, _) = watch::channel(0);
		let shared = Arc::new(FakeShared {
			inbound: Mutex::new(None),
			history: Mutex::new(Vec::new()),
			sent_tx,
			sent_rx: tokio::sync::Mutex::new(sent_rx),
			refuse: AtomicBool::new(false),
			connects,
		});

		let connector = Arc::new(Self {
			shared: Arc::clone(&shared),
		});
		(connector, FakeTransportController { shared })
	}
}

impl Connector for FakeConnector {
	fn connect<'a>(&'a self, url: &'a str) -> TransportFuture<'a, TransportParts> {
		Box::pin(async move {
			if self.shared.refuse.load(Ordering::SeqCst) {
				return Err(Error::ConnectionFailed(format!("{url}: refused")));
			}

			let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
			let (message_tx, message_rx) = mpsc::unbounded_channel();
			*self.shared.inbound.lock() = Some(inbound_tx);
			self.shared.connects.send_modify(|n| *n += 1);

			Ok(TransportParts {
				sender: Box::new(FakeSender {
					shared: Arc::clone(&self.shared),
				}),
				receiver: Box::new(FakeReceiver {
					inbound_rx,
					message_tx,
				}),
				message_rx,
			})
		})
	}
}

/// Server side of a [`FakeConnector`]: inspects outbound frames and injects inbound ones.
#[derive(Clone)]
pub struct FakeTransportController {
	shared: Arc<FakeShared>,
}

impl FakeTransportController {
	/// Injects a frame into the live connection. Returns false when disconnected.
	pub fn inject(&self, message: Message) -> bool {
		let Ok(text) = message.encode() else {
			return false;
		};
		self.inject_raw(text)
	}

	/// Injects a raw text frame, bypassing encoding.
	pub fn inject_raw(&self, text: impl Into<String>) -> bool {
		match self.shared.inbound.lock().as_ref() {
			Some(tx) => tx.send(text.into()).is_ok(),
			None => false,
		}
	}

	/// Answers `request` with a `phx_reply` carrying the same refs.
	pub fn reply(&self, request: &Message, status: ReplyStatus, response: Value) -> bool {
		let reply = Reply { status, response };
		let payload = serde_json::to_value(reply).unwrap_or_default();
		self.inject(Message {
			join_ref: request.join_ref.clone(),
			msg_ref: request.msg_ref.clone(),
			topic: request.topic.clone(),
			event: events::REPLY.to_string(),
			payload,
		})
	}

	/// Pushes a server event on `topic` for the join identified by `join_ref`.
	pub fn push(&self, topic: &str, event: &str, payload: Value, join_ref: Option<&str>) -> bool {
		let mut message = Message::new(topic, event, payload);
		message.join_ref = join_ref.map(str::to_string);
		self.inject(message)
	}

	/// Snapshot of every frame the client has sent so far.
	pub fn sent(&self) -> Vec<Message> {
		self.shared.history.lock().clone()
	}

	/// Waits for the next frame the client sends.
	pub async fn next_sent(&self) -> Option<Message> {
		let mut rx = self.shared.sent_rx.lock().await;
		tokio::time::timeout(WAIT_TIMEOUT, rx.recv())
			.await
			.ok()
			.flatten()
	}

	/// Waits for the next sent frame matching `predicate`, skipping others.
	pub async fn wait_for_sent(&self, predicate: impl Fn(&Message) -> bool) -> Option<Message> {
		loop {
			let message = self.next_sent().await?;
			if predicate(&message) {
				return Some(message);
			}
		}
	}

	/// Waits for the client to send `event` on `topic`.
	pub async fn expect_event(&self, topic: &str, event: &str) -> Option<Message> {
		self.wait_for_sent(|m| m.topic == topic && m.event == event)
			.await
	}

	/// Drops the live connection as if the server went away.
	pub fn drop_connection(&self) {
		self.shared.inbound.lock().take();
	}

	/// Makes subsequent connects fail.
	pub fn refuse_connections(&self, refuse: bool) {
		self.shared.refuse.store(refuse, Ordering::SeqCst);
	}

	/// Number of successful connects so far.
	pub fn connects(&self) -> usize {
		*self.shared.connects.borrow()
	}

	/// Waits until at least `count` connects have happened.
	pub async fn wait_for_connects(&self, count: usize) -> bool {
		let mut rx = self.shared.connects.subscribe();
		tokio::time::timeout(WAIT_TIMEOUT, rx.wait_for(|n| *n >= count))
			.await
			.is_ok_and(|r| r.is_ok())
	}

	/// Returns true while a connection is live.
	pub fn is_connected(&self) -> bool {
		self.shared.inbound.lock().is_some()
	}
}

struct FakeSender {
	shared: Arc<FakeShared>,
}

impl Transport for FakeSender {
	fn send(&mut self, text: String) -> TransportFuture<'_, ()> {
		let shared = Arc::clone(&self.shared);
		Box::pin(async move {
			let message =
				Message::decode(&text).map_err(|e| Error::ProtocolError(e.to_string()))?;
			shared.history.lock().push(message.clone());
			let _ = shared.sent_tx.send(message);
			Ok(())
		})
	}

	fn close(&mut self) -> TransportFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}
}

struct FakeReceiver {
	inbound_rx: mpsc::UnboundedReceiver<String>,
	message_tx: mpsc::UnboundedSender<String>,
}

impl TransportReceiver for FakeReceiver {
	fn run(mut self: Box<Self>) -> TransportFuture<'static, ()> {
		Box::pin(async move {
			while let Some(text) = self.inbound_rx.recv().await {
				if self.message_tx.send(text).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}
