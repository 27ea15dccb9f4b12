//! Channel message envelope.
//!
//! Every frame on the socket is a JSON array in the V2 serializer layout:
//!
//! ```text
//! [join_ref, ref, topic, event, payload]
//! ```
//!
//! `join_ref` ties a frame to one specific join of a channel so that replies
//! addressed to an earlier, abandoned join can be discarded. `ref` correlates
//! a push with its `phx_reply`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version advertised in the socket URL.
pub const VSN: &str = "2.0.0";

/// Topic used for socket-level heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Reserved channel lifecycle events.
pub mod events {
	/// Client asks to join a topic.
	pub const JOIN: &str = "phx_join";
	/// Client leaves a topic.
	pub const LEAVE: &str = "phx_leave";
	/// Server reply to a push, correlated by `ref`.
	pub const REPLY: &str = "phx_reply";
	/// Server-side channel process crashed.
	pub const ERROR: &str = "phx_error";
	/// Server closed the channel.
	pub const CLOSE: &str = "phx_close";
	/// Socket keep-alive on the `phoenix` topic.
	pub const HEARTBEAT: &str = "heartbeat";
	/// Rendered diff pushed to a live view.
	pub const DIFF: &str = "diff";
	/// User interaction pushed from a live view.
	pub const EVENT: &str = "event";

	/// Returns true for events handled by the channel itself rather than bindings.
	pub fn is_lifecycle(event: &str) -> bool {
		matches!(event, JOIN | LEAVE | REPLY | ERROR | CLOSE)
	}
}

/// A single frame on the channel socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireMessage", into = "WireMessage")]
pub struct Message {
	/// Ref of the join this frame belongs to.
	pub join_ref: Option<String>,
	/// Ref used to correlate a push with its reply.
	pub msg_ref: Option<String>,
	/// Channel topic, e.g. `lv:container`.
	pub topic: String,
	/// Event name.
	pub event: String,
	/// Event payload.
	pub payload: Value,
}

#[derive(Serialize, Deserialize)]
struct WireMessage(Option<String>, Option<String>, String, String, Value);

impl From<WireMessage> for Message {
	fn from(WireMessage(join_ref, msg_ref, topic, event, payload): WireMessage) -> Self {
		Self {
			join_ref,
			msg_ref,
			topic,
			event,
			payload,
		}
	}
}

impl From<Message> for WireMessage {
	fn from(m: Message) -> Self {
		WireMessage(m.join_ref, m.msg_ref, m.topic, m.event, m.payload)
	}
}

impl Message {
	/// Creates a message with no refs attached.
	pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
		Self {
			join_ref: None,
			msg_ref: None,
			topic: topic.into(),
			event: event.into(),
			payload,
		}
	}

	/// Sets the join ref.
	pub fn with_join_ref(mut self, join_ref: impl Into<String>) -> Self {
		self.join_ref = Some(join_ref.into());
		self
	}

	/// Sets the message ref.
	pub fn with_ref(mut self, msg_ref: impl Into<String>) -> Self {
		self.msg_ref = Some(msg_ref.into());
		self
	}

	/// Serializes to the text frame sent over the transport.
	pub fn encode(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}

	/// Parses a text frame received from the transport.
	pub fn decode(text: &str) -> serde_json::Result<Self> {
		serde_json::from_str(text)
	}

	/// Returns true if this frame is a reply to a push.
	pub fn is_reply(&self) -> bool {
		self.event == events::REPLY
	}
}
