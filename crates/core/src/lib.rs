//! LiveView client session core.
//!
//! A [`LiveSocket`] discovers live-view roots in a [`Document`], binds a
//! [`View`] to each, and joins them over one shared [`Socket`]. Server patches
//! are applied through the document while the session keeps the user's focus
//! where it was.
//!
//! # Example
//!
//! ```ignore
//! let doc = Arc::new(MemoryDocument::new());
//! doc.element(doc.body(), "div", &[
//!     ("id", "container"),
//!     ("data-phx-view", ""),
//!     ("data-phx-session", "abc123"),
//! ]);
//!
//! let live_socket = LiveSocket::from_endpoint("ws://localhost:4000/live", doc, LiveSocketOptions::default());
//! live_socket.connect()?;
//! let view = live_socket.get_view_by_id("container");
//! ```

pub mod dom;
pub mod focus;
pub mod live_socket;
pub mod options;
pub mod view;

pub use dom::{Document, ElementRef, MemoryDocument, PatchHook};
pub use focus::FocusTracker;
pub use live_socket::LiveSocket;
pub use lv_protocol as protocol;
pub use lv_runtime::{
	Channel, ChannelState, Error, FakeConnector, FakeTransportController, ParamsFn, Result,
	Socket, SocketOptions, SocketState,
};
pub use options::{LiveSocketOptions, ViewLogger};
pub use view::{View, ViewStatus};
