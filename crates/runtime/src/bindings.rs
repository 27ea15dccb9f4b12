//! Callback registries for socket and channel events.
//!
//! [`Bindings<F>`] stores callbacks keyed by a [`BindingRef`] in an
//! [`IndexMap`] for O(1) removal and stable insertion order. Callbacks are
//! cloned out of the lock before they run, so a callback may register or
//! remove bindings on the same registry without deadlocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Unique identifier for a registered callback.
pub type BindingRef = u64;

static NEXT_BINDING_REF: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique binding ref.
pub fn next_binding_ref() -> BindingRef {
	NEXT_BINDING_REF.fetch_add(1, Ordering::SeqCst)
}

/// Callback for an inbound channel event; receives the frame payload.
pub type EventFn = dyn Fn(&serde_json::Value) + Send + Sync;

/// Callback with no arguments (socket open/close, channel close).
pub type NotifyFn = dyn Fn() + Send + Sync;

/// Callback receiving a runtime error.
pub type ErrorFn = dyn Fn(&crate::Error) + Send + Sync;

struct Binding<F: ?Sized> {
	event: Option<String>,
	callback: Arc<F>,
}

/// Ordered callback registry, optionally filtered by event name.
pub struct Bindings<F: ?Sized> {
	entries: Mutex<IndexMap<BindingRef, Binding<F>>>,
}

impl<F: ?Sized> Default for Bindings<F> {
	fn default() -> Self {
		Self {
			entries: Mutex::new(IndexMap::new()),
		}
	}
}

impl<F: ?Sized> Bindings<F> {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a callback that fires for every trigger.
	pub fn add(&self, callback: Arc<F>) -> BindingRef {
		self.insert(None, callback)
	}

	/// Registers a callback that fires only for `event`.
	pub fn add_for(&self, event: &str, callback: Arc<F>) -> BindingRef {
		self.insert(Some(event.to_string()), callback)
	}

	fn insert(&self, event: Option<String>, callback: Arc<F>) -> BindingRef {
		let id = next_binding_ref();
		self.entries.lock().insert(id, Binding { event, callback });
		id
	}

	/// Removes a callback. Returns false if it was not registered.
	pub fn remove(&self, id: BindingRef) -> bool {
		self.entries.lock().shift_remove(&id).is_some()
	}

	/// Snapshot of all callbacks in registration order.
	pub fn all(&self) -> Vec<Arc<F>> {
		self.entries
			.lock()
			.values()
			.map(|b| Arc::clone(&b.callback))
			.collect()
	}

	/// Snapshot of callbacks bound to `event` in registration order.
	pub fn matching(&self, event: &str) -> Vec<Arc<F>> {
		self.entries
			.lock()
			.values()
			.filter(|b| b.event.as_deref() == Some(event))
			.map(|b| Arc::clone(&b.callback))
			.collect()
	}

	/// Removes every callback.
	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	/// Number of registered callbacks.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns true if nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}
