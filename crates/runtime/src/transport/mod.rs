//! Byte-level transports underneath the [`Socket`](crate::Socket).
//!
//! A transport moves text frames and knows nothing about topics or refs.
//! The socket asks a [`Connector`] for a fresh [`TransportParts`] bundle on
//! every (re)connect, then:
//!
//! - writes outbound frames through [`Transport::send`]
//! - spawns [`TransportReceiver::run`], which pumps inbound frames into
//!   `message_rx` until the peer goes away
//!
//! `message_rx` yielding `None` is how the socket learns the connection dropped.

mod fake;
mod websocket;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::Result;

pub use fake::{FakeConnector, FakeTransportController};
pub use websocket::WebSocketConnector;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Sending half of a connection.
pub trait Transport: Send {
	/// Sends one text frame.
	fn send(&mut self, text: String) -> TransportFuture<'_, ()>;

	/// Closes the connection gracefully.
	fn close(&mut self) -> TransportFuture<'_, ()>;
}

/// Receiving half of a connection.
pub trait TransportReceiver: Send {
	/// Forwards inbound frames until the connection ends.
	fn run(self: Box<Self>) -> TransportFuture<'static, ()>;
}

/// Everything the socket needs to drive one connection.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<String>,
}

/// Opens connections for a socket URL.
pub trait Connector: Send + Sync {
	/// Connects to `url`, returning the transport halves.
	fn connect<'a>(&'a self, url: &'a str) -> TransportFuture<'a, TransportParts>;
}
