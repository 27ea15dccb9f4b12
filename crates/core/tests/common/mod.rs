// Shared fixtures for session tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use lv::{
	ElementRef, FakeConnector, FakeTransportController, LiveSocket, LiveSocketOptions,
	MemoryDocument, Socket, SocketOptions, View, ViewStatus,
};

pub const WAIT: Duration = Duration::from_secs(2);

/// Elements of the page built by [`prepare_live_view_dom`].
pub struct Page {
	pub doc: Arc<MemoryDocument>,
	pub root: ElementRef,
	pub input: ElementRef,
	pub button: ElementRef,
}

/// A `#container` live view holding a label, an input and a bound button,
/// followed by a non-live loader element.
pub fn prepare_live_view_dom() -> Page {
	let doc = Arc::new(MemoryDocument::new());
	let root = doc.element(
		doc.body(),
		"div",
		&[
			("data-phx-view", ""),
			("data-phx-session", "abc123"),
			("id", "container"),
		],
	);
	doc.element(root, "label", &[("for", "plus")]);
	let input = doc.element(root, "input", &[("id", "plus"), ("value", "1")]);
	let button = doc.element(
		root,
		"button",
		&[("phx-click", "inc_temperature"), ("phx-value-amount", "1")],
	);
	doc.element(doc.body(), "div", &[("class", "phx-loader")]);

	Page {
		doc,
		root,
		input,
		button,
	}
}

/// Session over an in-memory transport.
pub fn fake_live_socket(
	doc: Arc<MemoryDocument>,
	options: LiveSocketOptions,
) -> (Arc<LiveSocket>, FakeTransportController) {
	let (connector, server) = FakeConnector::pair();
	let socket = Socket::with_connector("ws://localhost:4000/live", SocketOptions::default(), connector);
	(LiveSocket::from_socket(socket, doc, options), server)
}

pub async fn wait_for_status(view: &View, status: ViewStatus) -> bool {
	let mut rx = view.subscribe_status();
	tokio::time::timeout(WAIT, rx.wait_for(|s| *s == status))
		.await
		.is_ok_and(|r| r.is_ok())
}

pub async fn eventually(check: impl Fn() -> bool) -> bool {
	let deadline = tokio::time::Instant::now() + WAIT;
	while tokio::time::Instant::now() < deadline {
		if check() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	check()
}

/// Routes `tracing` output through the test harness writer.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}
