//! Focus bookkeeping that survives server-driven patches.
//!
//! Before a patch touches the subtree holding focus the session blurs the
//! focused element and records it in `prev_active`; after the patch it
//! refocuses that element if it is still attached, then drops the record.

use crate::dom::{Document, ElementRef};

/// Tracked and previously-focused elements of a session.
///
/// Both fields are plain [`ElementRef`] back-references; an element removed
/// from the document is simply skipped when looked up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FocusTracker {
	active_element: Option<ElementRef>,
	prev_active: Option<ElementRef>,
}

impl FocusTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Element recorded by [`set`](Self::set), without consulting the document.
	pub fn active_element(&self) -> Option<ElementRef> {
		self.active_element
	}

	/// Element recorded by the last effective [`blur`](Self::blur).
	pub fn prev_active(&self) -> Option<ElementRef> {
		self.prev_active
	}

	/// Records `el` as the active element without moving focus.
	pub fn set(&mut self, el: ElementRef) {
		self.active_element = Some(el);
	}

	/// Forgets the tracked element if it is still `el`.
	pub fn release(&mut self, el: ElementRef) {
		if self.active_element == Some(el) {
			self.active_element = None;
		}
	}

	/// Element the document has focused, else the tracked element if still attached.
	pub fn current(&self, doc: &dyn Document) -> Option<ElementRef> {
		doc.active_element()
			.or_else(|| self.active_element.filter(|el| doc.contains(*el)))
	}

	/// Records the current element in `prev_active` and blurs it.
	///
	/// With nothing focused this is a no-op, so a second call keeps the
	/// element recorded by the first.
	pub fn blur(&mut self, doc: &dyn Document) {
		let Some(el) = self.current(doc) else {
			return;
		};
		tracing::trace!(element = el.raw(), "Blurring active element");
		self.prev_active = Some(el);
		doc.blur(el);
	}

	/// Refocuses `prev_active` if it is still attached. Keeps the record.
	pub fn restore(&self, doc: &dyn Document) -> bool {
		match self.prev_active {
			Some(el) if doc.contains(el) => {
				tracing::trace!(element = el.raw(), "Restoring focus");
				doc.focus(el)
			}
			_ => false,
		}
	}

	/// Clears `prev_active`.
	pub fn drop_previous(&mut self) {
		self.prev_active = None;
	}

	/// Clears `prev_active`, and the tracked element when it lies inside `root`.
	pub fn clear_within(&mut self, doc: &dyn Document, root: ElementRef) {
		self.prev_active = None;
		if self.active_element.is_some_and(|el| doc.is_within(el, root)) {
			self.active_element = None;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::MemoryDocument;

	fn doc_with_input() -> (MemoryDocument, ElementRef, ElementRef) {
		let doc = MemoryDocument::new();
		let root = doc.element(doc.body(), "div", &[("id", "container")]);
		let input = doc.element(root, "input", &[("id", "plus")]);
		(doc, root, input)
	}

	#[test]
	fn test_current_falls_back_to_document() {
		let (doc, _, input) = doc_with_input();
		let tracker = FocusTracker::new();
		assert_eq!(tracker.current(&doc), None);

		doc.focus(input);
		assert_eq!(tracker.current(&doc), Some(input));
	}

	#[test]
	fn test_document_focus_wins_over_tracked_element() {
		let (doc, root, input) = doc_with_input();
		let other = doc.element(root, "button", &[]);
		doc.focus(other);

		let mut tracker = FocusTracker::new();
		tracker.set(input);
		assert_eq!(tracker.current(&doc), Some(other));

		doc.blur(other);
		assert_eq!(tracker.current(&doc), Some(input));

		doc.remove(input);
		assert_eq!(tracker.current(&doc), None);
	}

	#[test]
	fn test_blur_records_focused_element_not_stale_tracking() {
		let (doc, root, input) = doc_with_input();
		let button = doc.element(root, "button", &[]);

		let mut tracker = FocusTracker::new();
		tracker.set(input);
		doc.focus(button);

		tracker.blur(&doc);
		assert_eq!(tracker.prev_active(), Some(button));
		assert_eq!(doc.active_element(), None);

		assert!(tracker.restore(&doc));
		assert_eq!(doc.active_element(), Some(button));
	}

	#[test]
	fn test_blur_restore_round_trip() {
		let (doc, _, input) = doc_with_input();
		doc.focus(input);

		let mut tracker = FocusTracker::new();
		tracker.blur(&doc);
		assert_eq!(tracker.prev_active(), Some(input));
		assert_eq!(doc.active_element(), None);

		tracker.blur(&doc);
		assert_eq!(tracker.prev_active(), Some(input), "second blur keeps the record");

		assert!(tracker.restore(&doc));
		assert_eq!(doc.active_element(), Some(input));
		assert_eq!(tracker.prev_active(), Some(input));
	}

	#[test]
	fn test_restore_skips_removed_element() {
		let (doc, _, input) = doc_with_input();
		doc.focus(input);

		let mut tracker = FocusTracker::new();
		tracker.blur(&doc);
		doc.remove(input);

		assert!(!tracker.restore(&doc));
		assert_eq!(doc.active_element(), None);
	}

	#[test]
	fn test_clear_within_only_touches_inner_tracking() {
		let (doc, root, input) = doc_with_input();
		let outside = doc.element(doc.body(), "input", &[]);

		let mut tracker = FocusTracker::new();
		tracker.set(outside);
		doc.focus(input);
		tracker.blur(&doc);
		assert_eq!(tracker.prev_active(), Some(input));

		tracker.clear_within(&doc, root);
		assert_eq!(tracker.prev_active(), None);
		assert_eq!(tracker.active_element(), Some(outside));

		tracker.set(input);
		tracker.clear_within(&doc, root);
		assert_eq!(tracker.active_element(), None);
	}

	#[test]
	fn test_release_only_matching() {
		let (_, root, input) = doc_with_input();
		let mut tracker = FocusTracker::new();
		tracker.set(input);
		tracker.release(root);
		assert_eq!(tracker.active_element(), Some(input));
		tracker.release(input);
		assert_eq!(tracker.active_element(), None);
	}
}
