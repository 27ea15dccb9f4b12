//! Socket configuration.

use std::time::Duration;

use lv_protocol::VSN;
use serde_json::{Map, Value};

/// Delay used once the reconnect schedule is exhausted.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Default timeout for join and push replies.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

const DEFAULT_RECONNECT_MS: [u64; 9] = [10, 50, 100, 150, 200, 250, 500, 1000, 2000];

/// Options controlling a [`Socket`](super::Socket).
#[derive(Debug, Clone)]
pub struct SocketOptions {
	/// Params appended to the socket URL query string on connect.
	pub params: Map<String, Value>,
	/// How long to wait for a join or push reply.
	pub timeout: Duration,
	/// Interval between heartbeats; an unanswered heartbeat drops the connection.
	pub heartbeat_interval: Duration,
	/// Reconnect delays by attempt; [`MAX_RECONNECT_DELAY`] afterwards.
	pub reconnect_after: Vec<Duration>,
	/// Origin used to resolve relative endpoints such as `/live`.
	pub origin: Option<String>,
	/// Protocol version sent as `vsn`.
	pub vsn: String,
}

impl Default for SocketOptions {
	fn default() -> Self {
		Self {
			params: Map::new(),
			timeout: DEFAULT_TIMEOUT,
			heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
			reconnect_after: DEFAULT_RECONNECT_MS
				.iter()
				.copied()
				.map(Duration::from_millis)
				.collect(),
			origin: None,
			vsn: VSN.to_string(),
		}
	}
}

impl SocketOptions {
	/// Creates default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a connect param.
	pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.params.insert(key.into(), value.into());
		self
	}

	/// Sets the reply timeout.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	/// Sets the heartbeat interval.
	pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
		self.heartbeat_interval = interval;
		self
	}

	/// Replaces the reconnect schedule.
	pub fn reconnect_after(mut self, schedule: Vec<Duration>) -> Self {
		self.reconnect_after = schedule;
		self
	}

	/// Sets the origin for relative endpoints.
	pub fn origin(mut self, origin: impl Into<String>) -> Self {
		self.origin = Some(origin.into());
		self
	}

	/// Delay before reconnect attempt number `tries` (0-based).
	pub fn reconnect_delay(&self, tries: usize) -> Duration {
		self.reconnect_after
			.get(tries)
			.copied()
			.unwrap_or(MAX_RECONNECT_DELAY)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_reconnect_schedule() {
		let opts = SocketOptions::default();
		assert_eq!(opts.reconnect_delay(0), Duration::from_millis(10));
		assert_eq!(opts.reconnect_delay(8), Duration::from_millis(2000));
		assert_eq!(opts.reconnect_delay(9), MAX_RECONNECT_DELAY);
		assert_eq!(opts.reconnect_delay(100), MAX_RECONNECT_DELAY);
	}

	#[test]
	fn test_builder() {
		let opts = SocketOptions::new()
			.param("token", "t1")
			.timeout(Duration::from_millis(50))
			.origin("http://localhost:4000");

		assert_eq!(opts.params["token"], "t1");
		assert_eq!(opts.timeout, Duration::from_millis(50));
		assert_eq!(opts.origin.as_deref(), Some("http://localhost:4000"));
		assert_eq!(opts.vsn, "2.0.0");
	}
}
