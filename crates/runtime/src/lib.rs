//! LiveView Runtime - socket lifecycle, channels, and transports
//!
//! This crate provides the connection layer a LiveView client session runs on:
//!
//! - **Transport**: text frames over WebSocket, or in memory for tests
//! - **Socket**: one persistent connection with heartbeat, send buffering and
//!   reconnect backoff
//! - **Channel**: per-topic join/leave, event bindings and push/reply correlation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │    lv-rs    │  LiveSocket, View (one channel per view)
//! └──────┬──────┘
//!        │ Socket::channel("lv:<id>", params)
//! ┌──────▼──────┐
//! │ lv-runtime  │  This crate
//! │  ┌────────┐ │
//! │  │Channel │ │  join refs, replies, bindings
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Socket │ │  heartbeat, buffer, reconnect
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Trans  │ │  WebSocket / fake
//! │  └────────┘ │
//! └─────────────┘
//! ```

pub mod bindings;
pub mod channel;
pub mod error;
pub mod socket;
pub mod transport;

// Re-export key types at crate root
pub use bindings::BindingRef;
pub use channel::{Channel, ChannelState, ParamsFn};
pub use error::{Error, Result};
pub use socket::{
	DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_TIMEOUT, MAX_RECONNECT_DELAY, Socket, SocketOptions,
	SocketState,
};
pub use transport::{
	Connector, FakeConnector, FakeTransportController, Transport, TransportParts,
	TransportReceiver, WebSocketConnector,
};
