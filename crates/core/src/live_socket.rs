//! [`LiveSocket`] - the session registry of a page.
//!
//! Owns the socket every view's channel is multiplexed over, the `views`
//! registry keyed by root id, and the focus state that has to survive
//! server-driven patches.
//!
//! # Construction
//!
//! - [`LiveSocket::from_endpoint`] builds its socket lazily on first
//!   [`connect`](LiveSocket::connect)
//! - [`LiveSocket::from_socket`] adopts a socket built by the caller

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use lv_protocol::{DEFAULT_BINDING_PREFIX, ID_ATTR, PHX_SESSION, PHX_VIEW};
use lv_runtime::{Channel, Error, ParamsFn, Result, Socket, SocketOptions};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::dom::{Document, ElementRef};
use crate::focus::FocusTracker;
use crate::options::{LiveSocketOptions, ViewLogger};
use crate::view::View;

/// Client session: one socket, many views.
pub struct LiveSocket {
	endpoint: String,
	socket_opts: SocketOptions,
	socket: Mutex<Option<Arc<Socket>>>,
	document: Arc<dyn Document>,
	binding_prefix: String,
	view_logger: RwLock<Option<ViewLogger>>,
	extra: Map<String, Value>,
	views: DashMap<Arc<str>, Arc<View>>,
	focus: Mutex<FocusTracker>,
	unloaded: AtomicBool,
}

impl LiveSocket {
	/// Session that connects to `endpoint` once [`connect`](Self::connect) is called.
	pub fn from_endpoint(
		endpoint: impl Into<String>,
		document: Arc<dyn Document>,
		options: LiveSocketOptions,
	) -> Arc<Self> {
		Arc::new(Self::build(endpoint.into(), None, document, options))
	}

	/// Session adopting an existing socket.
	pub fn from_socket(
		socket: Arc<Socket>,
		document: Arc<dyn Document>,
		options: LiveSocketOptions,
	) -> Arc<Self> {
		let endpoint = socket.endpoint().to_string();
		Arc::new(Self::build(endpoint, Some(socket), document, options))
	}

	fn build(
		endpoint: String,
		socket: Option<Arc<Socket>>,
		document: Arc<dyn Document>,
		options: LiveSocketOptions,
	) -> Self {
		let LiveSocketOptions {
			binding_prefix,
			view_logger,
			socket: socket_opts,
			extra,
		} = options;

		Self {
			endpoint,
			socket_opts,
			socket: Mutex::new(socket),
			document,
			binding_prefix: binding_prefix.unwrap_or_else(|| DEFAULT_BINDING_PREFIX.to_string()),
			view_logger: RwLock::new(view_logger),
			extra,
			views: DashMap::new(),
			focus: Mutex::new(FocusTracker::new()),
			unloaded: AtomicBool::new(false),
		}
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// The socket, once created or adopted.
	pub fn socket(&self) -> Option<Arc<Socket>> {
		self.socket.lock().clone()
	}

	pub fn document(&self) -> &Arc<dyn Document> {
		&self.document
	}

	/// Options the session stored without interpreting.
	pub fn extra_options(&self) -> &Map<String, Value> {
		&self.extra
	}

	/// Opens the socket and joins every unregistered view root in the document.
	///
	/// Safe to call repeatedly: the socket is opened once and already
	/// registered roots are skipped.
	///
	/// # Errors
	///
	/// Returns [`Error::NoRuntime`] outside a tokio runtime.
	pub fn connect(self: &Arc<Self>) -> Result<Arc<Socket>> {
		let socket = {
			let mut slot = self.socket.lock();
			let socket = slot.get_or_insert_with(|| {
				tracing::debug!(endpoint = %self.endpoint, "Creating socket");
				Socket::new(self.endpoint.clone(), self.socket_opts.clone())
			});
			Arc::clone(socket)
		};
		socket.open()?;

		for root in self.document.query_all_with_attribute(PHX_VIEW) {
			let Some(id) = self.document.attribute(root, ID_ATTR) else {
				tracing::warn!(element = root.raw(), "Skipping view root without id");
				continue;
			};
			if self.views.contains_key(id.as_str()) {
				continue;
			}
			let session = self.document.attribute(root, PHX_SESSION).unwrap_or_default();

			let view = View::new(root, self, session)?;
			self.views.insert(Arc::from(view.id()), Arc::clone(&view));
			if let Err(err) = view.join() {
				tracing::warn!(view = %id, error = %err, "View join failed to start");
				self.on_view_error(&view);
			}
		}

		tracing::debug!(views = self.views.len(), "Connected");
		Ok(socket)
	}

	/// Destroys every view and closes the socket.
	pub fn disconnect(&self) {
		let views: Vec<Arc<View>> = self.views.iter().map(|v| Arc::clone(v.value())).collect();
		self.views.clear();
		for view in views {
			view.destroy();
		}
		if let Some(socket) = self.socket() {
			socket.close();
		}
		tracing::debug!(endpoint = %self.endpoint, "Disconnected");
	}

	/// Opens a channel on the session's socket.
	///
	/// # Errors
	///
	/// Returns [`Error::NotConnected`] before a socket exists.
	pub fn channel(&self, topic: impl Into<String>, params: ParamsFn) -> Result<Arc<Channel>> {
		let socket = self.socket().ok_or(Error::NotConnected)?;
		Ok(socket.channel(topic, params))
	}

	pub fn get_view_by_id(&self, id: &str) -> Option<Arc<View>> {
		self.views.get(id).map(|v| Arc::clone(v.value()))
	}

	/// Destroys and unregisters a view. Unknown ids are ignored.
	pub fn destroy_view_by_id(&self, id: &str) {
		if let Some((_, view)) = self.views.remove(id) {
			view.destroy();
		}
	}

	pub fn views_len(&self) -> usize {
		self.views.len()
	}

	pub fn view_ids(&self) -> Vec<String> {
		self.views.iter().map(|v| v.key().to_string()).collect()
	}

	/// Registered view whose root encloses `el`.
	pub fn owner_view(&self, el: ElementRef) -> Option<Arc<View>> {
		let root = self.document.closest_with_attribute(el, PHX_VIEW)?;
		let id = self.document.attribute(root, ID_ATTR)?;
		self.get_view_by_id(&id).filter(|view| view.el() == root)
	}

	pub fn binding_prefix(&self) -> &str {
		&self.binding_prefix
	}

	/// Attribute name for binding `kind`, e.g. `phx-click`.
	pub fn binding(&self, kind: &str) -> String {
		format!("{}{kind}", self.binding_prefix)
	}

	/// Sends a view log line to the configured logger.
	///
	/// `detail` runs at most once, and only when a logger is set; its
	/// `(message, detail)` pair is passed through untouched.
	pub fn log(&self, view: &View, kind: &str, detail: impl FnOnce() -> (String, Value)) {
		let logger = self.view_logger.read().clone();
		if let Some(logger) = logger {
			let (message, detail) = detail();
			logger(view, kind, &message, &detail);
		}
	}

	/// Routes view log lines to `tracing` at debug level.
	pub fn enable_debug(&self) {
		*self.view_logger.write() = Some(Arc::new(|view: &View, kind: &str, message: &str, detail: &Value| {
			tracing::debug!(view = view.id(), kind, detail = %detail, "{message}");
		}));
	}

	pub fn disable_debug(&self) {
		*self.view_logger.write() = None;
	}

	pub fn is_debug_enabled(&self) -> bool {
		self.view_logger.read().is_some()
	}

	/// Records `el` as the active element without moving focus.
	pub fn set_active_element(&self, el: ElementRef) {
		self.focus.lock().set(el);
	}

	/// Forgets the tracked element if it is still `el`, e.g. on pointer release.
	pub fn release_active_element(&self, el: ElementRef) {
		self.focus.lock().release(el);
	}

	/// Element recorded by [`set_active_element`](Self::set_active_element).
	pub fn active_element(&self) -> Option<ElementRef> {
		self.focus.lock().active_element()
	}

	/// Document's focused element, else the tracked one. `None` is the body.
	pub fn get_active_element(&self) -> Option<ElementRef> {
		self.focus.lock().current(self.document.as_ref())
	}

	/// Element recorded by the last effective blur.
	pub fn prev_active(&self) -> Option<ElementRef> {
		self.focus.lock().prev_active()
	}

	/// Records the active element in `prev_active` and blurs it.
	pub fn blur_active_element(&self) {
		self.focus.lock().blur(self.document.as_ref());
	}

	/// Refocuses `prev_active` if it is still attached. Keeps the record.
	pub fn restore_previously_active_focus(&self) {
		self.focus.lock().restore(self.document.as_ref());
	}

	/// Clears `prev_active` once `view` has finished patching.
	///
	/// The tracked element is left alone, so [`get_active_element`](Self::get_active_element)
	/// may still report it afterwards.
	pub fn drop_active_element(&self, view: &View) {
		tracing::trace!(view = view.id(), "Dropping previously active element");
		self.focus.lock().drop_previous();
	}

	/// Clears focus state that could point into the failing view.
	pub fn on_view_error(&self, view: &View) {
		tracing::debug!(view = view.id(), "View error");
		self.focus.lock().clear_within(self.document.as_ref(), view.el());
	}

	/// Marks the page as unloading; views stop reporting channel errors.
	pub fn unload(&self) {
		self.unloaded.store(true, Ordering::SeqCst);
	}

	pub fn is_unloaded(&self) -> bool {
		self.unloaded.load(Ordering::SeqCst)
	}

	/// Pushes the `{prefix}{kind}` binding nearest to `target` to its view.
	///
	/// The event value is built from `{prefix}value-*` attributes of the
	/// bound element, falling back to its `value` attribute. Returns false when
	/// no binding or owning view is found.
	///
	/// # Errors
	///
	/// Propagates [`View::push_event`] errors.
	pub fn handle_event(&self, kind: &str, target: ElementRef) -> Result<bool> {
		let attr = self.binding(kind);
		let Some(bound) = self.document.closest_with_attribute(target, &attr) else {
			return Ok(false);
		};
		let Some(event) = self.document.attribute(bound, &attr) else {
			return Ok(false);
		};
		let Some(view) = self.owner_view(bound) else {
			tracing::debug!(event = %event, "No view owns the bound element");
			return Ok(false);
		};

		view.push_event(kind, &event, self.event_value(bound))?;
		Ok(true)
	}

	fn event_value(&self, el: ElementRef) -> Value {
		let prefix = format!("{}value-", self.binding_prefix);
		let mut value = Map::new();
		let mut fallback = None;
		for (name, attr) in self.document.attributes(el) {
			if let Some(key) = name.strip_prefix(&prefix) {
				value.insert(key.to_string(), Value::String(attr));
			} else if name == "value" {
				fallback = Some(attr);
			}
		}
		if value.is_empty() {
			if let Some(attr) = fallback {
				value.insert("value".to_string(), Value::String(attr));
			}
		}
		Value::Object(value)
	}
}

impl std::fmt::Debug for LiveSocket {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LiveSocket")
			.field("endpoint", &self.endpoint)
			.field("binding_prefix", &self.binding_prefix)
			.field("views", &self.view_ids())
			.field("unloaded", &self.is_unloaded())
			.finish()
	}
}
