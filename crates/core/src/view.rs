//! [`View`] - one DOM root bound to a server-side live process.
//!
//! A view owns its channel (`lv:<id>`) on the session's shared socket. It
//! applies the initial render from the join reply and every later `diff`
//! push, wrapping each patch in the session's focus protocol. Once
//! [`destroy`](View::destroy) returns, no callback of the view touches the
//! document or the session again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use lv_protocol::{
	EventPayload, ID_ATTR, JoinPayload, PHX_CONNECTED_CLASS, PHX_DISCONNECTED_CLASS,
	PHX_ERROR_CLASS, PHX_LOADING_CLASS, PHX_STATIC, PHX_STATUS_CLASSES, PHX_VIEW, events,
	view_topic,
};
use lv_runtime::{Channel, Error, ParamsFn, Result};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::dom::{Document, ElementRef};
use crate::live_socket::LiveSocket;

/// Lifecycle status of a [`View`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
	/// Created, join not yet acknowledged.
	Loading,
	/// Joined and rendering server patches.
	Joined,
	/// Join rejected or the channel errored.
	Errored,
	/// Channel closed by the server.
	Disconnected,
	/// Torn down; inert.
	Destroyed,
}

/// A live view bound to one DOM root.
pub struct View {
	id: Arc<str>,
	el: ElementRef,
	session: String,
	static_token: Option<String>,
	live_socket: Weak<LiveSocket>,
	document: Arc<dyn Document>,
	channel: Mutex<Option<Arc<Channel>>>,
	destroyed: AtomicBool,
	rendered: Mutex<Option<Value>>,
	status: watch::Sender<ViewStatus>,
	join_count: AtomicU64,
}

impl View {
	/// Binds a view to root `el`. Does not join.
	///
	/// # Errors
	///
	/// Returns [`Error::MissingAttribute`] if `el` has no `id`.
	pub fn new(
		el: ElementRef,
		live_socket: &Arc<LiveSocket>,
		session: impl Into<String>,
	) -> Result<Arc<Self>> {
		let document = Arc::clone(live_socket.document());
		let id = document
			.attribute(el, ID_ATTR)
			.ok_or_else(|| Error::MissingAttribute(ID_ATTR.to_string()))?;
		let static_token = document.attribute(el, PHX_STATIC);

		document.add_class(el, PHX_LOADING_CLASS);
		let (status, _) = watch::channel(ViewStatus::Loading);

		Ok(Arc::new(Self {
			id: Arc::from(id),
			el,
			session: session.into(),
			static_token,
			live_socket: Arc::downgrade(live_socket),
			document,
			channel: Mutex::new(None),
			destroyed: AtomicBool::new(false),
			rendered: Mutex::new(None),
			status,
			join_count: AtomicU64::new(0),
		}))
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	/// Root element.
	pub fn el(&self) -> ElementRef {
		self.el
	}

	/// Session token sent on join.
	pub fn session(&self) -> &str {
		&self.session
	}

	pub fn status(&self) -> ViewStatus {
		*self.status.borrow()
	}

	/// Receiver observing every status change.
	pub fn subscribe_status(&self) -> watch::Receiver<ViewStatus> {
		self.status.subscribe()
	}

	pub fn is_destroyed(&self) -> bool {
		self.destroyed.load(Ordering::SeqCst)
	}

	/// Last full render merged with subsequent diffs.
	pub fn rendered(&self) -> Option<Value> {
		self.rendered.lock().clone()
	}

	/// Channel of the current join, if any.
	pub fn channel(&self) -> Option<Arc<Channel>> {
		self.channel.lock().clone()
	}

	/// Returns true if `el` belongs to this view and not to a nested one.
	pub fn owns_element(&self, el: ElementRef) -> bool {
		self.document.closest_with_attribute(el, PHX_VIEW) == Some(self.el)
	}

	/// Joins `lv:<id>` over the session's socket.
	///
	/// The outcome arrives asynchronously: success applies the initial render,
	/// failure goes through [`LiveSocket::on_view_error`].
	///
	/// # Errors
	///
	/// - [`Error::NotConnected`] if the session has no socket yet
	/// - [`Error::NoRuntime`] outside a tokio runtime
	pub fn join(self: &Arc<Self>) -> Result<()> {
		if self.is_destroyed() {
			return Ok(());
		}
		let live_socket = self.live_socket.upgrade().ok_or(Error::ChannelClosed)?;
		let channel = live_socket.channel(view_topic(&self.id), self.join_params())?;

		let view = Arc::downgrade(self);
		channel.on(events::DIFF, move |diff| {
			if let Some(view) = view.upgrade() {
				view.update(diff);
			}
		});

		let view = Arc::downgrade(self);
		channel.on_error(move |err| {
			if let Some(view) = view.upgrade() {
				view.channel_errored(err);
			}
		});

		let view = Arc::downgrade(self);
		channel.on_close(move || {
			if let Some(view) = view.upgrade() {
				view.channel_closed();
			}
		});

		let (ok_view, err_view) = (Arc::downgrade(self), Arc::downgrade(self));
		channel.on_join(
			move |response| {
				if let Some(view) = ok_view.upgrade() {
					view.joined(response);
				}
			},
			move |err| {
				if let Some(view) = err_view.upgrade() {
					view.join_failed(err);
				}
			},
		);

		let previous = self.channel.lock().replace(Arc::clone(&channel));
		if let Some(previous) = previous {
			previous.leave();
		}
		tracing::debug!(view = %self.id, topic = %channel.topic(), "Joining view");
		channel.join()
	}

	fn join_params(self: &Arc<Self>) -> ParamsFn {
		let view = Arc::downgrade(self);
		Arc::new(move || {
			let Some(view) = view.upgrade() else {
				return Value::Object(Map::new());
			};
			let mut params = Map::new();
			params.insert(
				"_mounts".to_string(),
				view.join_count.load(Ordering::SeqCst).into(),
			);

			let mut payload = JoinPayload::new(view.session.clone())
				.static_token(view.static_token.clone())
				.params(params);
			if let Some(url) = view.document.location() {
				payload = payload.url(url);
			}
			serde_json::to_value(payload).unwrap_or_default()
		})
	}

	fn joined(&self, response: &Value) {
		if self.is_destroyed() {
			return;
		}
		let rendered = response
			.get("rendered")
			.cloned()
			.unwrap_or_else(|| response.clone());
		*self.rendered.lock() = Some(rendered.clone());
		self.join_count.fetch_add(1, Ordering::SeqCst);

		self.set_status_class(PHX_CONNECTED_CLASS);
		self.status.send_replace(ViewStatus::Joined);
		tracing::debug!(view = %self.id, "View joined");

		if let Some(live_socket) = self.live_socket.upgrade() {
			live_socket.log(self, "mount", || (String::new(), rendered.clone()));
		}
		self.apply_patch(&rendered);
	}

	fn join_failed(&self, err: &Error) {
		if self.is_destroyed() {
			return;
		}
		tracing::warn!(view = %self.id, error = %err, "View join failed");
		self.set_status_class(PHX_ERROR_CLASS);
		self.status.send_replace(ViewStatus::Errored);

		let Some(live_socket) = self.live_socket.upgrade() else {
			return;
		};
		live_socket.log(self, "error", || {
			(format!("unable to join: {err}"), Value::Null)
		});
		live_socket.on_view_error(self);
		if err.is_join_rejected() {
			live_socket.destroy_view_by_id(&self.id);
		}
	}

	fn channel_errored(&self, err: &Error) {
		if self.is_destroyed() {
			return;
		}
		let Some(live_socket) = self.live_socket.upgrade() else {
			return;
		};
		if live_socket.is_unloaded() {
			return;
		}
		tracing::debug!(view = %self.id, error = %err, "View channel errored");
		self.set_status_class(PHX_ERROR_CLASS);
		self.status.send_replace(ViewStatus::Errored);
		live_socket.on_view_error(self);
	}

	fn channel_closed(&self) {
		if self.is_destroyed() {
			return;
		}
		self.set_status_class(PHX_DISCONNECTED_CLASS);
		self.status.send_replace(ViewStatus::Disconnected);
	}

	fn set_status_class(&self, class: &str) {
		for status in PHX_STATUS_CLASSES {
			self.document.remove_class(self.el, status);
		}
		self.document.add_class(self.el, class);
	}

	/// Applies a server diff, merging it into [`rendered`](Self::rendered).
	pub fn update(&self, diff: &Value) {
		if self.is_destroyed() {
			return;
		}
		if let Some(live_socket) = self.live_socket.upgrade() {
			live_socket.log(self, "update", || (String::new(), diff.clone()));
		}

		{
			let mut rendered = self.rendered.lock();
			match (rendered.as_mut(), diff) {
				(Some(Value::Object(current)), Value::Object(changes)) => {
					for (key, value) in changes {
						current.insert(key.clone(), value.clone());
					}
				}
				_ => *rendered = Some(diff.clone()),
			}
		}
		self.apply_patch(diff);
	}

	fn apply_patch(&self, diff: &Value) {
		let Some(live_socket) = self.live_socket.upgrade() else {
			return;
		};
		let holds_focus = live_socket
			.get_active_element()
			.is_some_and(|el| self.document.is_within(el, self.el));

		if holds_focus {
			live_socket.blur_active_element();
		}
		self.document.patch(self.el, diff);
		if holds_focus {
			live_socket.restore_previously_active_focus();
			live_socket.drop_active_element(self);
		}
	}

	/// Sends a user event to the server without waiting.
	///
	/// A `diff` in the reply is applied like a pushed diff.
	///
	/// # Errors
	///
	/// - [`Error::NotJoined`] before the view has a channel
	/// - [`Error::NoRuntime`] outside a tokio runtime
	pub fn push_event(self: &Arc<Self>, kind: &str, event: &str, value: Value) -> Result<()> {
		if self.is_destroyed() {
			return Err(Error::ChannelClosed);
		}
		let channel = self
			.channel()
			.ok_or_else(|| Error::NotJoined(view_topic(&self.id)))?;
		let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;

		let payload = serde_json::to_value(EventPayload {
			kind: kind.to_string(),
			event: event.to_string(),
			value,
		})?;
		let view = Arc::downgrade(self);
		let event = event.to_string();
		handle.spawn(async move {
			match channel.push(events::EVENT, payload).await {
				Ok(reply) => {
					if let (Some(view), Some(diff)) = (view.upgrade(), reply.get("diff")) {
						view.update(diff);
					}
				}
				Err(err) => tracing::warn!(event = %event, error = %err, "Event push failed"),
			}
		});
		Ok(())
	}

	/// Leaves the channel and marks the view inert. Idempotent.
	pub fn destroy(&self) {
		if self.destroyed.swap(true, Ordering::SeqCst) {
			return;
		}
		let channel = self.channel.lock().take();
		if let Some(channel) = channel {
			channel.leave();
		}
		self.status.send_replace(ViewStatus::Destroyed);
		tracing::debug!(view = %self.id, "View destroyed");
	}
}

impl std::fmt::Debug for View {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("View")
			.field("id", &self.id)
			.field("el", &self.el)
			.field("status", &self.status())
			.finish()
	}
}
