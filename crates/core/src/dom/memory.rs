//! In-memory [`Document`] for headless sessions and tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{Document, ElementRef};

/// Called after each [`Document::patch`], outside the document lock.
pub type PatchHook = Arc<dyn Fn(&MemoryDocument, ElementRef, &Value) + Send + Sync>;

const BODY: ElementRef = ElementRef(0);

struct Node {
	tag: String,
	attrs: Vec<(String, String)>,
	classes: Vec<String>,
	parent: Option<ElementRef>,
	children: Vec<ElementRef>,
}

impl Node {
	fn new(tag: &str) -> Self {
		Self {
			tag: tag.to_string(),
			attrs: Vec::new(),
			classes: Vec::new(),
			parent: None,
			children: Vec::new(),
		}
	}
}

struct Inner {
	nodes: HashMap<ElementRef, Node>,
	next_id: u64,
	focused: Option<ElementRef>,
	location: Option<String>,
	patches: Vec<(ElementRef, Value)>,
}

impl Inner {
	fn is_attached(&self, el: ElementRef) -> bool {
		let mut current = Some(el);
		while let Some(node) = current {
			if node == BODY {
				return true;
			}
			current = self.nodes.get(&node).and_then(|n| n.parent);
		}
		false
	}

	fn is_within(&self, el: ElementRef, ancestor: ElementRef) -> bool {
		let mut current = Some(el);
		while let Some(node) = current {
			if node == ancestor {
				return true;
			}
			current = self.nodes.get(&node).and_then(|n| n.parent);
		}
		false
	}

	fn collect_with_attribute(&self, el: ElementRef, name: &str, out: &mut Vec<ElementRef>) {
		let Some(node) = self.nodes.get(&el) else {
			return;
		};
		if node.attrs.iter().any(|(k, _)| k == name) {
			out.push(el);
		}
		for child in &node.children {
			self.collect_with_attribute(*child, name, out);
		}
	}
}

/// Arena-backed DOM tree rooted at a `body` element.
///
/// Elements are never freed; [`remove`](Self::remove) detaches them so
/// stale [`ElementRef`]s report `contains() == false`.
pub struct MemoryDocument {
	inner: Mutex<Inner>,
	patch_hook: Mutex<Option<PatchHook>>,
}

impl Default for MemoryDocument {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryDocument {
	pub fn new() -> Self {
		let mut nodes = HashMap::new();
		nodes.insert(BODY, Node::new("body"));
		Self {
			inner: Mutex::new(Inner {
				nodes,
				next_id: 1,
				focused: None,
				location: None,
				patches: Vec::new(),
			}),
			patch_hook: Mutex::new(None),
		}
	}

	/// The `body` element.
	pub fn body(&self) -> ElementRef {
		BODY
	}

	/// Sets the URL reported by [`Document::location`].
	pub fn set_location(&self, url: impl Into<String>) {
		self.inner.lock().location = Some(url.into());
	}

	/// Creates a detached element.
	pub fn create_element(&self, tag: &str) -> ElementRef {
		let mut inner = self.inner.lock();
		let el = ElementRef(inner.next_id);
		inner.next_id += 1;
		inner.nodes.insert(el, Node::new(tag));
		el
	}

	/// Appends `child` to `parent`, detaching it from any previous parent.
	pub fn append_child(&self, parent: ElementRef, child: ElementRef) {
		let mut inner = self.inner.lock();
		if !inner.nodes.contains_key(&parent) || inner.is_within(parent, child) {
			return;
		}
		let previous = inner.nodes.get(&child).and_then(|n| n.parent);
		if let Some(previous) = previous.and_then(|p| inner.nodes.get_mut(&p)) {
			previous.children.retain(|c| *c != child);
		}
		if let Some(node) = inner.nodes.get_mut(&child) {
			node.parent = Some(parent);
		} else {
			return;
		}
		if let Some(node) = inner.nodes.get_mut(&parent) {
			node.children.push(child);
		}
	}

	/// Creates `<tag attrs..>` and appends it to `parent`.
	///
	/// A `class` attribute is split into the class list.
	pub fn element(&self, parent: ElementRef, tag: &str, attrs: &[(&str, &str)]) -> ElementRef {
		let el = self.create_element(tag);
		for (name, value) in attrs {
			self.set_attribute(el, name, value);
		}
		self.append_child(parent, el);
		el
	}

	/// Detaches `el` and its subtree. Focus inside the subtree is lost.
	pub fn remove(&self, el: ElementRef) {
		if el == BODY {
			return;
		}
		let mut inner = self.inner.lock();
		if inner.focused.is_some_and(|f| inner.is_within(f, el)) {
			inner.focused = None;
		}
		let parent = inner.nodes.get_mut(&el).and_then(|n| n.parent.take());
		if let Some(parent) = parent.and_then(|p| inner.nodes.get_mut(&p)) {
			parent.children.retain(|c| *c != el);
		}
	}

	/// First attached element whose `id` attribute equals `id`.
	pub fn element_by_id(&self, id: &str) -> Option<ElementRef> {
		self.query_all_with_attribute("id")
			.into_iter()
			.find(|el| self.attribute(*el, "id").as_deref() == Some(id))
	}

	pub fn has_class(&self, el: ElementRef, class: &str) -> bool {
		self.inner
			.lock()
			.nodes
			.get(&el)
			.is_some_and(|n| n.classes.iter().any(|c| c == class))
	}

	pub fn classes(&self, el: ElementRef) -> Vec<String> {
		self.inner
			.lock()
			.nodes
			.get(&el)
			.map(|n| n.classes.clone())
			.unwrap_or_default()
	}

	pub fn tag(&self, el: ElementRef) -> Option<String> {
		self.inner.lock().nodes.get(&el).map(|n| n.tag.clone())
	}

	/// Every patch applied so far, in order.
	pub fn patches(&self) -> Vec<(ElementRef, Value)> {
		self.inner.lock().patches.clone()
	}

	/// Installs a hook run after each patch, e.g. to simulate subtree replacement.
	pub fn set_patch_hook(&self, hook: PatchHook) {
		*self.patch_hook.lock() = Some(hook);
	}
}

impl Document for MemoryDocument {
	fn query_all_with_attribute(&self, name: &str) -> Vec<ElementRef> {
		let inner = self.inner.lock();
		let mut out = Vec::new();
		inner.collect_with_attribute(BODY, name, &mut out);
		out
	}

	fn attribute(&self, el: ElementRef, name: &str) -> Option<String> {
		let inner = self.inner.lock();
		let node = inner.nodes.get(&el)?;
		if name == "class" {
			return (!node.classes.is_empty()).then(|| node.classes.join(" "));
		}
		node.attrs
			.iter()
			.find(|(k, _)| k == name)
			.map(|(_, v)| v.clone())
	}

	fn attributes(&self, el: ElementRef) -> Vec<(String, String)> {
		self.inner
			.lock()
			.nodes
			.get(&el)
			.map(|n| n.attrs.clone())
			.unwrap_or_default()
	}

	fn set_attribute(&self, el: ElementRef, name: &str, value: &str) {
		let mut inner = self.inner.lock();
		let Some(node) = inner.nodes.get_mut(&el) else {
			return;
		};
		if name == "class" {
			node.classes = value.split_whitespace().map(str::to_string).collect();
			return;
		}
		match node.attrs.iter_mut().find(|(k, _)| k == name) {
			Some((_, v)) => *v = value.to_string(),
			None => node.attrs.push((name.to_string(), value.to_string())),
		}
	}

	fn add_class(&self, el: ElementRef, class: &str) {
		if let Some(node) = self.inner.lock().nodes.get_mut(&el) {
			if !node.classes.iter().any(|c| c == class) {
				node.classes.push(class.to_string());
			}
		}
	}

	fn remove_class(&self, el: ElementRef, class: &str) {
		if let Some(node) = self.inner.lock().nodes.get_mut(&el) {
			node.classes.retain(|c| c != class);
		}
	}

	fn contains(&self, el: ElementRef) -> bool {
		self.inner.lock().is_attached(el)
	}

	fn parent(&self, el: ElementRef) -> Option<ElementRef> {
		self.inner.lock().nodes.get(&el).and_then(|n| n.parent)
	}

	fn active_element(&self) -> Option<ElementRef> {
		let inner = self.inner.lock();
		inner.focused.filter(|el| inner.is_attached(*el))
	}

	fn focus(&self, el: ElementRef) -> bool {
		let mut inner = self.inner.lock();
		if el == BODY || !inner.is_attached(el) {
			return false;
		}
		inner.focused = Some(el);
		true
	}

	fn blur(&self, el: ElementRef) {
		let mut inner = self.inner.lock();
		if inner.focused == Some(el) {
			inner.focused = None;
		}
	}

	fn patch(&self, root: ElementRef, diff: &Value) {
		self.inner.lock().patches.push((root, diff.clone()));
		let hook = self.patch_hook.lock().clone();
		if let Some(hook) = hook {
			hook(self, root, diff);
		}
	}

	fn location(&self) -> Option<String> {
		self.inner.lock().location.clone()
	}
}
