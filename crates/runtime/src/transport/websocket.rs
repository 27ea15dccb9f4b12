//! WebSocket transport over `tokio-tungstenite`.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Connector, Transport, TransportFuture, TransportParts, TransportReceiver};
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to `ws://` / `wss://` socket URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
	fn connect<'a>(&'a self, url: &'a str) -> TransportFuture<'a, TransportParts> {
		Box::pin(async move {
			let (stream, _response) = tokio_tungstenite::connect_async(url)
				.await
				.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;

			tracing::debug!(url, "WebSocket connected");

			let (sink, stream) = stream.split();
			let (message_tx, message_rx) = mpsc::unbounded_channel();

			Ok(TransportParts {
				sender: Box::new(WebSocketSender { sink }),
				receiver: Box::new(WebSocketReceiver { stream, message_tx }),
				message_rx,
			})
		})
	}
}

struct WebSocketSender {
	sink: SplitSink<WsStream, WsMessage>,
}

impl Transport for WebSocketSender {
	fn send(&mut self, text: String) -> TransportFuture<'_, ()> {
		Box::pin(async move {
			self.sink
				.send(WsMessage::Text(text.into()))
				.await
				.map_err(|e| Error::TransportError(e.to_string()))
		})
	}

	fn close(&mut self) -> TransportFuture<'_, ()> {
		Box::pin(async move {
			self.sink
				.close()
				.await
				.map_err(|e| Error::TransportError(e.to_string()))
		})
	}
}

struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<String>,
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> TransportFuture<'static, ()> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				match frame.map_err(|e| Error::TransportError(e.to_string()))? {
					WsMessage::Text(text) => {
						if self.message_tx.send(text.to_string()).is_err() {
							break;
						}
					}
					WsMessage::Close(_) => break,
					WsMessage::Binary(_) => {
						tracing::warn!("Ignoring binary frame on text protocol");
					}
					_ => {}
				}
			}
			Ok(())
		})
	}
}
