//! Payload shapes carried inside [`Message`](crate::Message) frames.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome reported by the server in a `phx_reply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
	/// Push accepted.
	Ok,
	/// Push rejected by the server.
	Error,
}

/// Payload of a `phx_reply` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
	/// Whether the push succeeded.
	pub status: ReplyStatus,
	/// Reply body; the initial render for joins, reason map for errors.
	#[serde(default)]
	pub response: Value,
}

impl Reply {
	/// Creates a successful reply.
	pub fn ok(response: Value) -> Self {
		Self {
			status: ReplyStatus::Ok,
			response,
		}
	}

	/// Creates an error reply.
	pub fn error(response: Value) -> Self {
		Self {
			status: ReplyStatus::Error,
			response,
		}
	}

	/// Returns true for `status: "ok"`.
	pub fn is_ok(&self) -> bool {
		self.status == ReplyStatus::Ok
	}

	/// Returns the `reason` field of an error response, if present.
	pub fn reason(&self) -> Option<&str> {
		self.response.get("reason").and_then(Value::as_str)
	}
}

/// Join parameters sent by a live view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinPayload {
	/// Signed session token read from the root element.
	pub session: String,
	/// Static token read from the root element.
	#[serde(rename = "static", skip_serializing_if = "Option::is_none")]
	pub static_token: Option<String>,
	/// Page URL the view was rendered for.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	/// Connect params merged in by the session.
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub params: Map<String, Value>,
}

impl JoinPayload {
	/// Creates a join payload for the given session token.
	pub fn new(session: impl Into<String>) -> Self {
		Self {
			session: session.into(),
			..Self::default()
		}
	}

	/// Sets the static token.
	pub fn static_token(mut self, token: Option<String>) -> Self {
		self.static_token = token;
		self
	}

	/// Sets the page URL.
	pub fn url(mut self, url: impl Into<String>) -> Self {
		self.url = Some(url.into());
		self
	}

	/// Sets the params map.
	pub fn params(mut self, params: Map<String, Value>) -> Self {
		self.params = params;
		self
	}
}

/// User interaction pushed from a view to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
	/// Interaction kind (`click`, `change`, ...).
	#[serde(rename = "type")]
	pub kind: String,
	/// Server-side event name taken from the binding attribute.
	pub event: String,
	/// Event value.
	pub value: Value,
}
