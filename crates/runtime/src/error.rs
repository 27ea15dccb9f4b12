//! Error types for the LiveView runtime.

use serde_json::Value;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the LiveView runtime.
#[derive(Debug, Error)]
pub enum Error {
	/// Endpoint could not be turned into a socket URL.
	#[error("Invalid endpoint '{endpoint}': {reason}")]
	InvalidEndpoint { endpoint: String, reason: String },

	/// Failed to establish a connection with the server.
	#[error("Failed to connect: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (frame send/receive).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Frame could not be decoded or had an unexpected shape.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// A channel was requested before any transport existed.
	#[error("No transport: call connect() before opening channels")]
	NotConnected,

	/// A DOM element lacks an attribute the client requires.
	#[error("Element is missing required attribute '{0}'")]
	MissingAttribute(String),

	/// Option value had the wrong shape.
	#[error("Invalid option: {0}")]
	InvalidOption(String),

	/// Socket work was started outside of a tokio runtime.
	#[error("No tokio runtime available to drive the socket")]
	NoRuntime,

	/// Server refused a channel join.
	#[error("Join rejected for {topic}: {reason}")]
	JoinRejected {
		/// Topic that failed to join.
		topic: String,
		/// `reason` from the reply, or `"error"` when absent.
		reason: String,
		/// Full reply body.
		response: Value,
	},

	/// Server replied to a push with `status: "error"`.
	#[error("Push '{event}' rejected on {topic}")]
	PushRejected {
		topic: String,
		event: String,
		response: Value,
	},

	/// Join or push was attempted on a channel that is already joining or joined.
	#[error("Channel {0} is already joined")]
	AlreadyJoined(String),

	/// Push attempted on a channel that has not joined.
	#[error("Channel {0} is not joined")]
	NotJoined(String),

	/// Timeout waiting for a reply.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Server reported the channel process crashed, or the connection dropped.
	#[error("Channel {topic} errored: {reason}")]
	ChannelError { topic: String, reason: String },

	/// Channel closed while a reply was pending.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if the server rejected a join.
	pub fn is_join_rejected(&self) -> bool {
		matches!(self, Error::JoinRejected { .. })
	}

	/// Returns the reason carried by a join rejection or channel error.
	pub fn reason(&self) -> Option<&str> {
		match self {
			Error::JoinRejected { reason, .. } | Error::ChannelError { reason, .. } => Some(reason),
			_ => None,
		}
	}
}
