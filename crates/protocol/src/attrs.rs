//! DOM conventions shared between server-rendered markup and the client.

/// Attribute marking an element as the root of a live view.
pub const PHX_VIEW: &str = "data-phx-view";

/// Attribute carrying the signed session token for a live view root.
pub const PHX_SESSION: &str = "data-phx-session";

/// Attribute carrying the static token rendered alongside the session.
pub const PHX_STATIC: &str = "data-phx-static";

/// Attribute every live view root must carry to be registered.
pub const ID_ATTR: &str = "id";

/// Default prefix for event bindings such as `phx-click`.
pub const DEFAULT_BINDING_PREFIX: &str = "phx-";

/// Class applied to a root while its channel is joining.
pub const PHX_LOADING_CLASS: &str = "phx-loading";

/// Class applied to a root once its channel has joined.
pub const PHX_CONNECTED_CLASS: &str = "phx-connected";

/// Class applied to a root after its channel closed.
pub const PHX_DISCONNECTED_CLASS: &str = "phx-disconnected";

/// Class applied to a root after a join failure or channel error.
pub const PHX_ERROR_CLASS: &str = "phx-error";

/// All status classes, removed in bulk before a new one is applied.
pub const PHX_STATUS_CLASSES: [&str; 4] = [
	PHX_LOADING_CLASS,
	PHX_CONNECTED_CLASS,
	PHX_DISCONNECTED_CLASS,
	PHX_ERROR_CLASS,
];

/// Topic prefix used by live view channels (`lv:<view id>`).
pub const VIEW_TOPIC_PREFIX: &str = "lv:";

/// Builds the channel topic for a view id.
pub fn view_topic(view_id: &str) -> String {
	format!("{VIEW_TOPIC_PREFIX}{view_id}")
}
