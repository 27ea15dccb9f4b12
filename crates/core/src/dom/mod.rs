//! DOM query surface the session runs against.
//!
//! The session never owns DOM nodes. It holds [`ElementRef`] ids and asks the
//! [`Document`] about them, so a subtree replaced by a patch simply stops
//! being [`contains`](Document::contains)-ed instead of dangling.

mod memory;

use serde_json::Value;

pub use self::memory::{MemoryDocument, PatchHook};

/// Non-owning handle to an element of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementRef(u64);

impl ElementRef {
	/// Wraps a host-specific element id.
	pub fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	/// Host-specific element id.
	pub fn raw(self) -> u64 {
		self.0
	}
}

/// Host document the session discovers views in and tracks focus against.
///
/// Implementations use interior mutability; every method takes `&self`.
pub trait Document: Send + Sync {
	/// Attached elements carrying `name`, in document order.
	fn query_all_with_attribute(&self, name: &str) -> Vec<ElementRef>;

	/// Value of attribute `name`, if present.
	fn attribute(&self, el: ElementRef, name: &str) -> Option<String>;

	/// All attributes of `el` in source order.
	fn attributes(&self, el: ElementRef) -> Vec<(String, String)>;

	fn set_attribute(&self, el: ElementRef, name: &str, value: &str);

	fn add_class(&self, el: ElementRef, class: &str);

	fn remove_class(&self, el: ElementRef, class: &str);

	/// Returns true while `el` is attached to the document.
	fn contains(&self, el: ElementRef) -> bool;

	/// Parent of `el`, or `None` for the root or a detached element.
	fn parent(&self, el: ElementRef) -> Option<ElementRef>;

	/// Returns true if `el` is `ancestor` or one of its descendants.
	fn is_within(&self, el: ElementRef, ancestor: ElementRef) -> bool {
		let mut current = Some(el);
		while let Some(node) = current {
			if node == ancestor {
				return true;
			}
			current = self.parent(node);
		}
		false
	}

	/// Nearest element, starting at `el` itself, that carries `name`.
	fn closest_with_attribute(&self, el: ElementRef, name: &str) -> Option<ElementRef> {
		let mut current = Some(el);
		while let Some(node) = current {
			if self.attribute(node, name).is_some() {
				return Some(node);
			}
			current = self.parent(node);
		}
		None
	}

	/// Element holding focus; `None` means the body (nothing focused).
	fn active_element(&self) -> Option<ElementRef>;

	/// Focuses `el`. Returns false if it cannot take focus.
	fn focus(&self, el: ElementRef) -> bool;

	fn blur(&self, el: ElementRef);

	/// Applies a server diff to the subtree rooted at `root`.
	fn patch(&self, root: ElementRef, diff: &Value);

	/// Current page URL, sent with view joins.
	fn location(&self) -> Option<String> {
		None
	}
}
