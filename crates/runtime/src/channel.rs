//! Channel - a topic multiplexed over a [`Socket`].
//!
//! A channel joins its topic with `phx_join`, routes inbound frames for that
//! topic to event bindings, and correlates `phx_reply` frames with pushes by
//! message ref. Replies for pushes are delivered over oneshot channels so
//! [`Channel::push`] can be awaited; join replies go to the `on_join` hooks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use lv_protocol::{Message, Reply, events};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::bindings::{BindingRef, Bindings, ErrorFn, EventFn, NotifyFn};
use crate::error::{Error, Result};
use crate::socket::Socket;

/// Join params thunk, evaluated on every (re)join.
pub type ParamsFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Lifecycle state of a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
	/// Not joined.
	Closed,
	/// Join failed or the connection dropped; rejoins when the socket reopens.
	Errored,
	/// Join acknowledged.
	Joined,
	/// `phx_join` sent, awaiting reply.
	Joining,
	/// `leave()` in progress.
	Leaving,
}

enum JoinOutcome {
	Reply(Reply),
	Canceled,
	TimedOut,
}

type JoinOkFn = dyn Fn(&Value) + Send + Sync;

/// A joined (or joinable) topic on a socket.
pub struct Channel {
	topic: String,
	params: ParamsFn,
	socket: Weak<Socket>,
	timeout: Duration,
	state: Mutex<ChannelState>,
	join_ref: Mutex<Option<String>>,
	left: AtomicBool,
	bindings: Bindings<EventFn>,
	join_ok: Bindings<JoinOkFn>,
	join_err: Bindings<ErrorFn>,
	error_hooks: Bindings<ErrorFn>,
	close_hooks: Bindings<NotifyFn>,
	pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
	join_task: Mutex<Option<AbortHandle>>,
}

impl Channel {
	pub(crate) fn new(
		topic: String,
		params: ParamsFn,
		socket: Weak<Socket>,
		timeout: Duration,
	) -> Self {
		Self {
			topic,
			params,
			socket,
			timeout,
			state: Mutex::new(ChannelState::Closed),
			join_ref: Mutex::new(None),
			left: AtomicBool::new(false),
			bindings: Bindings::new(),
			join_ok: Bindings::new(),
			join_err: Bindings::new(),
			error_hooks: Bindings::new(),
			close_hooks: Bindings::new(),
			pending: Mutex::new(HashMap::new()),
			join_task: Mutex::new(None),
		}
	}

	/// Topic this channel is bound to.
	pub fn topic(&self) -> &str {
		&self.topic
	}

	/// Current lifecycle state.
	pub fn state(&self) -> ChannelState {
		*self.state.lock()
	}

	/// Returns true once the server acknowledged the join.
	pub fn is_joined(&self) -> bool {
		self.state() == ChannelState::Joined
	}

	/// Ref of the current join attempt.
	pub fn join_ref(&self) -> Option<String> {
		self.join_ref.lock().clone()
	}

	/// Sends `phx_join` without waiting; the outcome goes to [`on_join`](Self::on_join).
	///
	/// # Errors
	///
	/// - [`Error::AlreadyJoined`] while joining or joined
	/// - [`Error::ChannelClosed`] after [`leave`](Self::leave) or once the socket is gone
	/// - [`Error::NoRuntime`] outside a tokio runtime
	pub fn join(self: &Arc<Self>) -> Result<()> {
		if matches!(self.state(), ChannelState::Joining | ChannelState::Joined) {
			return Err(Error::AlreadyJoined(self.topic.clone()));
		}
		self.rejoin()
	}

	pub(crate) fn rejoin(self: &Arc<Self>) -> Result<()> {
		if self.left.load(Ordering::SeqCst) {
			return Err(Error::ChannelClosed);
		}
		let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
		let socket = self.socket.upgrade().ok_or(Error::ChannelClosed)?;

		let join_ref = socket.make_ref();
		let payload = (self.params)();
		let (tx, rx) = oneshot::channel();

		*self.state.lock() = ChannelState::Joining;
		*self.join_ref.lock() = Some(join_ref.clone());
		self.pending.lock().insert(join_ref.clone(), tx);

		tracing::debug!(topic = %self.topic, join_ref, "Joining");
		socket.push(
			Message::new(&self.topic, events::JOIN, payload)
				.with_join_ref(&join_ref)
				.with_ref(&join_ref),
		);

		let channel = Arc::downgrade(self);
		let timeout = self.timeout;
		let task = handle.spawn(async move {
			let outcome = match tokio::time::timeout(timeout, rx).await {
				Ok(Ok(reply)) => JoinOutcome::Reply(reply),
				Ok(Err(_)) => JoinOutcome::Canceled,
				Err(_) => JoinOutcome::TimedOut,
			};
			if let Some(channel) = channel.upgrade() {
				channel.finish_join(&join_ref, outcome);
			}
		});
		if let Some(previous) = self.join_task.lock().replace(task.abort_handle()) {
			previous.abort();
		}
		Ok(())
	}

	fn finish_join(&self, join_ref: &str, outcome: JoinOutcome) {
		{
			let state = self.state.lock();
			if *state != ChannelState::Joining || self.join_ref.lock().as_deref() != Some(join_ref) {
				tracing::trace!(topic = %self.topic, join_ref, "Ignoring superseded join outcome");
				return;
			}
		}

		match outcome {
			JoinOutcome::Reply(reply) if reply.is_ok() => {
				*self.state.lock() = ChannelState::Joined;
				tracing::debug!(topic = %self.topic, "Joined");
				for callback in self.join_ok.all() {
					callback(&reply.response);
				}
			}
			JoinOutcome::Reply(reply) => {
				*self.state.lock() = ChannelState::Errored;
				let err = Error::JoinRejected {
					topic: self.topic.clone(),
					reason: reply.reason().unwrap_or("error").to_string(),
					response: reply.response,
				};
				tracing::warn!(topic = %self.topic, error = %err, "Join rejected");
				self.fire_join_err(&err);
			}
			JoinOutcome::Canceled => {}
			JoinOutcome::TimedOut => {
				*self.state.lock() = ChannelState::Errored;
				self.pending.lock().remove(join_ref);
				if let Some(socket) = self.socket.upgrade().filter(|s| s.is_connected()) {
					socket.push(
						Message::new(&self.topic, events::LEAVE, Value::Object(Default::default()))
							.with_join_ref(join_ref)
							.with_ref(socket.make_ref()),
					);
				}
				let err = Error::Timeout(format!("joining {}", self.topic));
				tracing::warn!(topic = %self.topic, "Join timed out");
				self.fire_join_err(&err);
			}
		}
	}

	fn fire_join_err(&self, err: &Error) {
		for callback in self.join_err.all() {
			callback(err);
		}
	}

	/// Binds `callback` to inbound `event` frames on this topic.
	pub fn on(&self, event: &str, callback: impl Fn(&Value) + Send + Sync + 'static) -> BindingRef {
		self.bindings.add_for(event, Arc::new(callback))
	}

	/// Removes a binding or hook.
	pub fn off(&self, id: BindingRef) -> bool {
		self.bindings.remove(id)
			| self.join_ok.remove(id)
			| self.join_err.remove(id)
			| self.error_hooks.remove(id)
			| self.close_hooks.remove(id)
	}

	/// Registers join outcome hooks. They fire for every (re)join attempt.
	pub fn on_join(
		&self,
		ok: impl Fn(&Value) + Send + Sync + 'static,
		err: impl Fn(&Error) + Send + Sync + 'static,
	) {
		self.join_ok.add(Arc::new(ok));
		self.join_err.add(Arc::new(err));
	}

	/// Registers a hook fired when the channel errors after joining.
	pub fn on_error(&self, callback: impl Fn(&Error) + Send + Sync + 'static) -> BindingRef {
		self.error_hooks.add(Arc::new(callback))
	}

	/// Registers a hook fired when the channel closes.
	pub fn on_close(&self, callback: impl Fn() + Send + Sync + 'static) -> BindingRef {
		self.close_hooks.add(Arc::new(callback))
	}

	/// Pushes `event` and waits for the server's reply body.
	///
	/// # Errors
	///
	/// - [`Error::NotJoined`] unless joined
	/// - [`Error::PushRejected`] when the reply has `status: "error"`
	/// - [`Error::ChannelClosed`] if the channel errors or closes first
	/// - [`Error::Timeout`] when no reply arrives in time
	pub async fn push(&self, event: &str, payload: Value) -> Result<Value> {
		if !self.is_joined() {
			return Err(Error::NotJoined(self.topic.clone()));
		}
		let socket = self.socket.upgrade().ok_or(Error::ChannelClosed)?;

		let msg_ref = socket.make_ref();
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(msg_ref.clone(), tx);

		let mut message = Message::new(&self.topic, event, payload).with_ref(&msg_ref);
		message.join_ref = self.join_ref();
		socket.push(message);
		drop(socket);

		match tokio::time::timeout(self.timeout, rx).await {
			Ok(Ok(reply)) if reply.is_ok() => Ok(reply.response),
			Ok(Ok(reply)) => Err(Error::PushRejected {
				topic: self.topic.clone(),
				event: event.to_string(),
				response: reply.response,
			}),
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => {
				self.pending.lock().remove(&msg_ref);
				Err(Error::Timeout(format!("{event} on {}", self.topic)))
			}
		}
	}

	/// Leaves the topic. Drops bindings and pending replies, then fires close hooks.
	pub fn leave(&self) {
		if self.left.swap(true, Ordering::SeqCst) {
			return;
		}
		let previous = std::mem::replace(&mut *self.state.lock(), ChannelState::Leaving);
		if let Some(task) = self.join_task.lock().take() {
			task.abort();
		}

		if let Some(socket) = self.socket.upgrade() {
			if matches!(previous, ChannelState::Joined | ChannelState::Joining) && socket.is_connected() {
				let mut message =
					Message::new(&self.topic, events::LEAVE, Value::Object(Default::default()))
						.with_ref(socket.make_ref());
				message.join_ref = self.join_ref();
				socket.push(message);
			}
			socket.remove_channel(self);
		}

		self.pending.lock().clear();
		self.bindings.clear();
		self.join_ok.clear();
		self.join_err.clear();
		self.error_hooks.clear();
		*self.state.lock() = ChannelState::Closed;
		tracing::debug!(topic = %self.topic, "Left");

		let hooks = self.close_hooks.all();
		self.close_hooks.clear();
		for callback in hooks {
			callback();
		}
	}

	/// Returns true if `message` belongs to this channel's current join.
	pub(crate) fn is_member(&self, message: &Message) -> bool {
		if message.topic != self.topic {
			return false;
		}
		match message.join_ref.as_deref() {
			Some(join_ref) if self.join_ref.lock().as_deref() != Some(join_ref) => {
				tracing::trace!(topic = %self.topic, join_ref, event = %message.event, "Dropping stale frame");
				false
			}
			_ => true,
		}
	}

	/// Dispatches an inbound frame.
	pub(crate) fn trigger(&self, message: &Message) {
		match message.event.as_str() {
			events::REPLY => {
				let Some(msg_ref) = message.msg_ref.as_deref() else {
					return;
				};
				let Some(tx) = self.pending.lock().remove(msg_ref) else {
					return;
				};
				let reply = match serde_json::from_value::<Reply>(message.payload.clone()) {
					Ok(reply) => reply,
					Err(err) => {
						tracing::warn!(topic = %self.topic, error = %err, "Malformed reply");
						Reply::error(serde_json::json!({ "reason": "malformed reply" }))
					}
				};
				let _ = tx.send(reply);
			}
			events::ERROR => self.errored("server error"),
			events::CLOSE => {
				*self.state.lock() = ChannelState::Closed;
				self.pending.lock().clear();
				if let Some(socket) = self.socket.upgrade() {
					socket.remove_channel(self);
				}
				tracing::debug!(topic = %self.topic, "Closed by server");
				for callback in self.close_hooks.all() {
					callback();
				}
			}
			event if !events::is_lifecycle(event) => {
				for callback in self.bindings.matching(event) {
					callback(&message.payload);
				}
			}
			event => {
				tracing::trace!(topic = %self.topic, event, "Ignoring inbound lifecycle event");
			}
		}
	}

	/// Called by the socket when its connection goes away.
	pub(crate) fn socket_errored(&self) {
		self.errored("connection lost");
	}

	fn errored(&self, reason: &str) {
		{
			let mut state = self.state.lock();
			if !matches!(*state, ChannelState::Joined | ChannelState::Joining) {
				return;
			}
			*state = ChannelState::Errored;
		}
		if let Some(task) = self.join_task.lock().take() {
			task.abort();
		}
		self.pending.lock().clear();

		let err = Error::ChannelError {
			topic: self.topic.clone(),
			reason: reason.to_string(),
		};
		tracing::debug!(topic = %self.topic, reason, "Channel errored");
		for callback in self.error_hooks.all() {
			callback(&err);
		}
	}
}

impl std::fmt::Debug for Channel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Channel")
			.field("topic", &self.topic)
			.field("state", &self.state())
			.field("join_ref", &self.join_ref())
			.finish()
	}
}
