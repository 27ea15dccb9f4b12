//! Socket - the single persistent connection all channels are multiplexed over.
//!
//! The socket owns:
//! - a background connection task that connects, pumps frames, sends
//!   heartbeats and reconnects with backoff
//! - the list of [`Channel`]s, to which inbound frames are routed by topic
//!   and join ref
//! - a send buffer holding pushes made while no connection is up
//!
//! # Message Flow
//!
//! 1. A channel calls [`Socket::push`] with a fully addressed [`Message`]
//! 2. The message is queued on the outbound mpsc (or buffered while offline)
//! 3. The connection task encodes it and writes it through the transport
//! 4. Inbound frames are decoded and handed to every member channel, in
//!    transport order

mod options;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use lv_protocol::{Message, PHOENIX_TOPIC, events};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use url::Url;

pub use self::options::{
	DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_TIMEOUT, MAX_RECONNECT_DELAY, SocketOptions,
};
use crate::bindings::{BindingRef, Bindings, ErrorFn, NotifyFn};
use crate::channel::{Channel, ChannelState, ParamsFn};
use crate::error::{Error, Result};
use crate::transport::{Connector, TransportParts, WebSocketConnector};

/// Connection state of a [`Socket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
	/// Not connected and not trying to.
	Closed,
	/// Connecting or waiting to reconnect.
	Connecting,
	/// Connected; pushes go straight to the transport.
	Open,
}

#[derive(Default)]
struct Outbound {
	tx: Option<mpsc::UnboundedSender<Message>>,
	buffer: Vec<Message>,
}

/// Persistent connection multiplexing every channel of a page.
pub struct Socket {
	endpoint: String,
	opts: SocketOptions,
	connector: Arc<dyn Connector>,
	ref_counter: AtomicU64,
	state: Mutex<SocketState>,
	outbound: Mutex<Outbound>,
	channels: Mutex<Vec<Arc<Channel>>>,
	open_callbacks: Bindings<NotifyFn>,
	close_callbacks: Bindings<NotifyFn>,
	error_callbacks: Bindings<ErrorFn>,
	task: Mutex<Option<JoinHandle<()>>>,
	receiver_task: Mutex<Option<AbortHandle>>,
	closed_by_user: AtomicBool,
	pending_heartbeat: Mutex<Option<String>>,
}

impl Socket {
	/// Creates a socket that connects over WebSocket.
	pub fn new(endpoint: impl Into<String>, opts: SocketOptions) -> Arc<Self> {
		Self::with_connector(endpoint, opts, Arc::new(WebSocketConnector))
	}

	/// Creates a socket that connects through `connector`.
	pub fn with_connector(
		endpoint: impl Into<String>,
		opts: SocketOptions,
		connector: Arc<dyn Connector>,
	) -> Arc<Self> {
		Arc::new(Self {
			endpoint: endpoint.into(),
			opts,
			connector,
			ref_counter: AtomicU64::new(0),
			state: Mutex::new(SocketState::Closed),
			outbound: Mutex::new(Outbound::default()),
			channels: Mutex::new(Vec::new()),
			open_callbacks: Bindings::new(),
			close_callbacks: Bindings::new(),
			error_callbacks: Bindings::new(),
			task: Mutex::new(None),
			receiver_task: Mutex::new(None),
			closed_by_user: AtomicBool::new(false),
			pending_heartbeat: Mutex::new(None),
		})
	}

	/// Endpoint as given at construction.
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// Options this socket was built with.
	pub fn options(&self) -> &SocketOptions {
		&self.opts
	}

	/// Current connection state.
	pub fn state(&self) -> SocketState {
		*self.state.lock()
	}

	/// Returns true while a connection is up.
	pub fn is_connected(&self) -> bool {
		self.state() == SocketState::Open
	}

	/// Resolves the endpoint into the URL the connector dials.
	///
	/// `http(s)` schemes become `ws(s)`, protocol-relative endpoints borrow the
	/// origin's scheme, and path-only endpoints require [`SocketOptions::origin`].
	/// Connect params and `vsn` are appended to the query string.
	pub fn endpoint_url(&self) -> Result<String> {
		let invalid = |reason: String| Error::InvalidEndpoint {
			endpoint: self.endpoint.clone(),
			reason,
		};

		let endpoint = self.endpoint.trim_end_matches('/');
		let absolute = if endpoint.starts_with("//") {
			format!("{}:{endpoint}", self.origin_scheme())
		} else if endpoint.starts_with('/') {
			let origin = self
				.opts
				.origin
				.as_deref()
				.ok_or_else(|| invalid("relative endpoint requires an origin".to_string()))?;
			format!("{}{endpoint}", origin.trim_end_matches('/'))
		} else {
			endpoint.to_string()
		};

		let base = if let Some(rest) = absolute.strip_prefix("http://") {
			format!("ws://{rest}")
		} else if let Some(rest) = absolute.strip_prefix("https://") {
			format!("wss://{rest}")
		} else if absolute.starts_with("ws://") || absolute.starts_with("wss://") {
			absolute
		} else {
			return Err(invalid("expected a ws(s) or http(s) URL, or a path".to_string()));
		};

		let mut url = Url::parse(&base).map_err(|e| invalid(e.to_string()))?;
		url.path_segments_mut()
			.map_err(|()| invalid("URL cannot carry a path".to_string()))?
			.pop_if_empty()
			.push("websocket");
		{
			let mut query = url.query_pairs_mut();
			for (key, value) in &self.opts.params {
				match value {
					Value::String(s) => query.append_pair(key, s),
					other => query.append_pair(key, &other.to_string()),
				};
			}
			query.append_pair("vsn", &self.opts.vsn);
		}
		Ok(url.to_string())
	}

	fn origin_scheme(&self) -> &'static str {
		let scheme = self
			.opts
			.origin
			.as_deref()
			.and_then(|o| o.split_once("://"))
			.map(|(scheme, _)| scheme);
		match scheme {
			Some("https") | Some("wss") => "wss",
			_ => "ws",
		}
	}

	/// Returns the next message ref.
	pub fn make_ref(&self) -> String {
		(self.ref_counter.fetch_add(1, Ordering::SeqCst) + 1).to_string()
	}

	/// Registers a callback fired each time a connection opens.
	pub fn on_open(&self, callback: impl Fn() + Send + Sync + 'static) -> BindingRef {
		self.open_callbacks.add(Arc::new(callback))
	}

	/// Registers a callback fired each time an open connection closes.
	pub fn on_close(&self, callback: impl Fn() + Send + Sync + 'static) -> BindingRef {
		self.close_callbacks.add(Arc::new(callback))
	}

	/// Registers a callback fired on connect failures and invalid endpoints.
	pub fn on_error(&self, callback: impl Fn(&Error) + Send + Sync + 'static) -> BindingRef {
		self.error_callbacks.add(Arc::new(callback))
	}

	/// Removes a callback registered with any `on_*` method.
	pub fn off(&self, id: BindingRef) {
		self.open_callbacks.remove(id);
		self.close_callbacks.remove(id);
		self.error_callbacks.remove(id);
	}

	/// Starts the connection task. Calling it while already running is a no-op.
	///
	/// # Errors
	///
	/// Returns [`Error::NoRuntime`] when called outside a tokio runtime.
	pub fn open(self: &Arc<Self>) -> Result<()> {
		let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;

		let mut task = self.task.lock();
		if task.as_ref().is_some_and(|t| !t.is_finished()) {
			return Ok(());
		}

		self.closed_by_user.store(false, Ordering::SeqCst);
		*self.state.lock() = SocketState::Connecting;
		*task = Some(handle.spawn(Arc::clone(self).run()));
		Ok(())
	}

	/// Closes the connection and stops reconnecting.
	///
	/// Joined channels are moved to `Errored` so they rejoin on the next
	/// [`open`](Self::open).
	pub fn close(&self) {
		self.closed_by_user.store(true, Ordering::SeqCst);
		if let Some(task) = self.task.lock().take() {
			task.abort();
		}
		if let Some(receiver) = self.receiver_task.lock().take() {
			receiver.abort();
		}
		self.outbound.lock().buffer.clear();
		self.mark_closed();
		tracing::debug!(endpoint = %self.endpoint, "Socket closed");
	}

	/// Creates a channel for `topic`. `params` is evaluated on every join.
	pub fn channel(self: &Arc<Self>, topic: impl Into<String>, params: ParamsFn) -> Arc<Channel> {
		let channel = Arc::new(Channel::new(
			topic.into(),
			params,
			Arc::downgrade(self),
			self.opts.timeout,
		));
		self.channels.lock().push(Arc::clone(&channel));
		channel
	}

	/// Snapshot of the registered channels.
	pub fn channels(&self) -> Vec<Arc<Channel>> {
		self.channels.lock().clone()
	}

	pub(crate) fn remove_channel(&self, channel: &Channel) {
		self.channels
			.lock()
			.retain(|c| !std::ptr::eq(Arc::as_ptr(c), channel));
	}

	/// Queues a message for the transport, buffering while offline.
	pub(crate) fn push(&self, message: Message) {
		tracing::trace!(topic = %message.topic, event = %message.event, "Push");
		let mut outbound = self.outbound.lock();
		let unsent = match outbound.tx.as_ref() {
			Some(tx) => tx.send(message).err().map(|e| e.0),
			None => Some(message),
		};
		if let Some(message) = unsent {
			outbound.buffer.push(message);
		}
	}

	async fn run(self: Arc<Self>) {
		let mut tries = 0usize;
		loop {
			let url = match self.endpoint_url() {
				Ok(url) => url,
				Err(err) => {
					tracing::error!(endpoint = %self.endpoint, error = %err, "Not connecting");
					*self.state.lock() = SocketState::Closed;
					self.fire_error(&err);
					return;
				}
			};

			*self.state.lock() = SocketState::Connecting;
			tracing::debug!(url, "Connecting");
			match self.connector.connect(&url).await {
				Ok(parts) => {
					tries = 0;
					self.run_connection(parts).await;
				}
				Err(err) => {
					tracing::warn!(url, error = %err, "Connection failed");
					self.fire_error(&err);
				}
			}

			if self.closed_by_user.load(Ordering::SeqCst) {
				return;
			}
			let delay = self.opts.reconnect_delay(tries);
			tries += 1;
			tracing::debug!(?delay, tries, "Reconnecting");
			tokio::time::sleep(delay).await;
		}
	}

	async fn run_connection(&self, parts: TransportParts) {
		let TransportParts {
			mut sender,
			receiver,
			mut message_rx,
		} = parts;

		let receiver_task = tokio::spawn(async move {
			if let Err(err) = receiver.run().await {
				tracing::debug!(error = %err, "Transport receiver stopped");
			}
		});
		*self.receiver_task.lock() = Some(receiver_task.abort_handle());

		let (out_tx, mut out_rx) = mpsc::unbounded_channel();
		{
			let mut outbound = self.outbound.lock();
			for message in outbound.buffer.drain(..) {
				let _ = out_tx.send(message);
			}
			outbound.tx = Some(out_tx);
		}

		*self.state.lock() = SocketState::Open;
		tracing::debug!(endpoint = %self.endpoint, "Socket open");
		for callback in self.open_callbacks.all() {
			callback();
		}
		self.rejoin_errored_channels();

		let interval = self.opts.heartbeat_interval;
		let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

		loop {
			tokio::select! {
				inbound = message_rx.recv() => match inbound {
					Some(text) => self.handle_frame(&text),
					None => {
						tracing::debug!("Transport closed by peer");
						break;
					}
				},
				outbound = out_rx.recv() => match outbound {
					Some(message) => match message.encode() {
						Ok(text) => {
							if let Err(err) = sender.send(text).await {
								tracing::warn!(error = %err, "Send failed, dropping connection");
								break;
							}
						}
						Err(err) => tracing::warn!(error = %err, "Dropping unencodable message"),
					},
					None => break,
				},
				_ = heartbeat.tick() => {
					if !self.send_heartbeat() {
						tracing::warn!("Heartbeat timeout, dropping connection");
						break;
					}
				}
			}
		}

		receiver_task.abort();
		self.receiver_task.lock().take();
		let _ = sender.close().await;
		self.mark_closed();
	}

	fn handle_frame(&self, text: &str) {
		let message = match Message::decode(text) {
			Ok(message) => message,
			Err(err) => {
				tracing::warn!(error = %err, "Dropping undecodable frame");
				return;
			}
		};
		tracing::trace!(topic = %message.topic, event = %message.event, "Received frame");

		if message.topic == PHOENIX_TOPIC {
			if message.is_reply() {
				let mut pending = self.pending_heartbeat.lock();
				if pending.is_some() && *pending == message.msg_ref {
					*pending = None;
				}
			}
			return;
		}

		let members: Vec<Arc<Channel>> = self
			.channels
			.lock()
			.iter()
			.filter(|c| c.is_member(&message))
			.cloned()
			.collect();
		for channel in members {
			channel.trigger(&message);
		}
	}

	fn send_heartbeat(&self) -> bool {
		let msg_ref = {
			let mut pending = self.pending_heartbeat.lock();
			if pending.take().is_some() {
				return false;
			}
			let msg_ref = self.make_ref();
			*pending = Some(msg_ref.clone());
			msg_ref
		};
		self.push(Message::new(PHOENIX_TOPIC, events::HEARTBEAT, Value::Object(Default::default())).with_ref(msg_ref));
		true
	}

	fn rejoin_errored_channels(&self) {
		for channel in self.channels() {
			if channel.state() == ChannelState::Errored {
				if let Err(err) = channel.rejoin() {
					tracing::warn!(topic = %channel.topic(), error = %err, "Rejoin failed");
				}
			}
		}
	}

	fn mark_closed(&self) {
		self.outbound.lock().tx = None;
		*self.pending_heartbeat.lock() = None;
		let was = std::mem::replace(&mut *self.state.lock(), SocketState::Closed);

		for channel in self.channels() {
			channel.socket_errored();
		}
		if was == SocketState::Open {
			for callback in self.close_callbacks.all() {
				callback();
			}
		}
	}

	fn fire_error(&self, err: &Error) {
		for callback in self.error_callbacks.all() {
			callback(err);
		}
	}
}

impl std::fmt::Debug for Socket {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Socket")
			.field("endpoint", &self.endpoint)
			.field("state", &self.state())
			.field("channels", &self.channels.lock().len())
			.finish()
	}
}
