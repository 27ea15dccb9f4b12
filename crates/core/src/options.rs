//! Session configuration.

use std::sync::Arc;
use std::time::Duration;

use lv_runtime::{Error, Result, SocketOptions};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::view::View;

/// Per-view debug hook: `(view, kind, message, detail)`.
pub type ViewLogger = Arc<dyn Fn(&View, &str, &str, &Value) + Send + Sync>;

/// Options for a [`LiveSocket`](crate::LiveSocket).
#[derive(Clone, Default)]
pub struct LiveSocketOptions {
	/// Prefix of event binding attributes; `phx-` when unset.
	pub binding_prefix: Option<String>,
	/// Receives view log lines. Logging is skipped entirely when unset.
	pub view_logger: Option<ViewLogger>,
	/// Options for a socket the session builds itself.
	pub socket: SocketOptions,
	/// Unrecognized keys, stored but never interpreted.
	pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOptions {
	binding_prefix: Option<String>,
	timeout: Option<u64>,
	heartbeat_interval_ms: Option<u64>,
	reconnect_after_ms: Option<Vec<u64>>,
	#[serde(default)]
	params: Map<String, Value>,
	origin: Option<String>,
	#[serde(flatten)]
	extra: Map<String, Value>,
}

impl LiveSocketOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn binding_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.binding_prefix = Some(prefix.into());
		self
	}

	pub fn view_logger(
		mut self,
		logger: impl Fn(&View, &str, &str, &Value) + Send + Sync + 'static,
	) -> Self {
		self.view_logger = Some(Arc::new(logger));
		self
	}

	pub fn socket(mut self, socket: SocketOptions) -> Self {
		self.socket = socket;
		self
	}

	/// Stores an opaque option.
	pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.extra.insert(key.into(), value.into());
		self
	}

	/// Reads options from a camelCase JSON object.
	///
	/// Recognized keys: `bindingPrefix`, `timeout` and `heartbeatIntervalMs`
	/// (milliseconds), `reconnectAfterMs`, `params`, `origin`. Everything else,
	/// including a non-callable `viewLogger`, lands in `extra`.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidOption`] if `value` is not an object, or
	/// [`Error::Json`] if a recognized key has the wrong type.
	pub fn from_json(value: Value) -> Result<Self> {
		if !value.is_object() {
			return Err(Error::InvalidOption(format!("expected an object, got {value}")));
		}
		let raw: RawOptions = serde_json::from_value(value)?;

		let mut socket = SocketOptions::default();
		socket.params = raw.params;
		socket.origin = raw.origin;
		if let Some(ms) = raw.timeout {
			socket.timeout = Duration::from_millis(ms);
		}
		if let Some(ms) = raw.heartbeat_interval_ms {
			socket.heartbeat_interval = Duration::from_millis(ms);
		}
		if let Some(schedule) = raw.reconnect_after_ms {
			socket.reconnect_after = schedule.into_iter().map(Duration::from_millis).collect();
		}

		Ok(Self {
			binding_prefix: raw.binding_prefix,
			view_logger: None,
			socket,
			extra: raw.extra,
		})
	}
}

impl std::fmt::Debug for LiveSocketOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LiveSocketOptions")
			.field("binding_prefix", &self.binding_prefix)
			.field("view_logger", &self.view_logger.is_some())
			.field("socket", &self.socket)
			.field("extra", &self.extra)
			.finish()
	}
}
