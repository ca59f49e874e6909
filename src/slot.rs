//! Content slots and `when` guards.

use crate::{
	dom::{self, DomNode, Path},
	error::DomError,
	instance::Instance,
	path_note,
	predicate::Predicate,
	value::Value,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use indexmap::IndexMap;
use tracing::{error, trace, trace_span, warn};

/// What a content slot shows for one key.
pub(crate) enum Rendered<N: DomNode> {
	Instance(Instance<N>),
	Node(N),
	Text(N),
	/// The value was written into the slot node itself (an input-like element).
	Input,
}

impl<N: DomNode> Rendered<N> {
	/// The last top level DOM node this entry placed into the slot.
	fn last_node(&self) -> Option<N> {
		match self {
			Rendered::Instance(instance) => instance.visible_nodes().pop(),
			Rendered::Node(node) | Rendered::Text(node) => Some(node.clone()),
			Rendered::Input => None,
		}
	}

	fn tear_down(self) {
		match self {
			Rendered::Instance(instance) => {
				instance.unmount();
			}
			Rendered::Node(node) | Rendered::Text(node) => {
				if let Err(error) = node.detach() {
					error!("Failed to detach stale node: {}", error);
				}
			}
			Rendered::Input => (),
		}
	}
}

/// A live content slot: reconciles keyed data into the children of one node.
pub struct Slot<N: DomNode> {
	node: N,
	path: Path,
	/// The node's authored children, shown while the rendered collection is empty.
	placeholder: Vec<N>,
	mapping: RefCell<IndexMap<String, Rendered<N>>>,
}

impl<N: DomNode> Debug for Slot<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let keys = self.mapping.try_borrow().map(|mapping| mapping.keys().cloned().collect::<Vec<_>>());
		f.debug_struct("Slot").field("node", &self.node).field("path", &self.path).field("keys", &keys).finish()
	}
}

/// Splits a value into keyed items: list indices, dict keys or `"_"` for anything else.
fn normalize<N: DomNode>(value: &Value<N>) -> Vec<(String, Value<N>)> {
	match value {
		Value::Reactive(reactive) => normalize(&reactive.get()),
		Value::List(items) => items.iter().enumerate().map(|(i, item)| (i.to_string(), current(item))).collect(),
		Value::Dict(entries) => entries.iter().map(|(k, v)| (k.clone(), current(v))).collect(),
		other => vec![("_".to_owned(), other.clone())],
	}
}

fn current<N: DomNode>(value: &Value<N>) -> Value<N> {
	match value {
		Value::Reactive(reactive) => reactive.get(),
		other => other.clone(),
	}
}

impl<N: DomNode> Slot<N> {
	pub(crate) fn new(node: N, path: Path) -> Self {
		Self {
			placeholder: node.child_nodes(),
			node,
			path,
			mapping: RefCell::new(IndexMap::new()),
		}
	}

	#[must_use]
	pub fn node(&self) -> &N {
		&self.node
	}

	/// The keys currently rendered, in mapping order.
	#[must_use]
	pub fn keys(&self) -> Vec<String> {
		match self.mapping.try_borrow() {
			Ok(mapping) => mapping.keys().cloned().collect(),
			Err(_) => {
				error!("Slot{} is being rendered; its keys are unavailable.", path_note(&self.path));
				Vec::new()
			}
		}
	}

	/// The child instance rendered for `key`, if any.
	#[must_use]
	pub fn instance(&self, key: &str) -> Option<Instance<N>> {
		let mapping = match self.mapping.try_borrow() {
			Ok(mapping) => mapping,
			Err(_) => {
				error!("Slot{} is being rendered; its instances are unavailable.", path_note(&self.path));
				return None;
			}
		};
		match mapping.get(key) {
			Some(Rendered::Instance(instance)) => Some(instance.clone()),
			_ => None,
		}
	}

	pub(crate) fn dispose(&self) {
		let children: Vec<Instance<N>> = match self.mapping.try_borrow() {
			Ok(mapping) => mapping
				.values()
				.filter_map(|rendered| match rendered {
					Rendered::Instance(instance) => Some(instance.clone()),
					_ => None,
				})
				.collect(),
			Err(_) => return error!("Slot{} is being rendered; its children were not disposed.", path_note(&self.path)),
		};
		for child in children {
			child.dispose();
		}
	}

	fn insert_after(&self, node: &N, previous: Option<&N>) -> Result<(), DomError> {
		let reference = match previous {
			Some(previous) => previous.next_sibling(),
			None => self.node.first_child(),
		};
		self.node.insert_before(node, reference.as_ref())
	}

	fn show_placeholder(&self, show: bool) {
		for node in &self.placeholder {
			let attached = node.parent_node().is_some();
			let result = match (show, attached) {
				(true, false) => self.node.append_child(node),
				(false, true) => node.detach().map(|_| ()),
				_ => Ok(()),
			};
			if let Err(error) = result {
				error!("Failed to toggle slot placeholder{}: {}", path_note(&self.path), error);
			}
		}
	}

	/// Reconciles `value` into this slot.
	///
	/// Entries are reused by key. New entries are placed after the entry before them,
	/// stale entries are torn down. Existing entries are not reordered.
	pub fn render(&self, parent: &Instance<N>, value: &Value<N>) {
		let span = trace_span!("Rendering slot", path = ?self.path);
		let _enter = span.enter();

		let mut mapping = match self.mapping.try_borrow_mut() {
			Ok(mapping) => mapping,
			Err(_) => return error!("Re-entrant slot render{}; skipped.", path_note(&self.path)),
		};

		let items = normalize(value);
		self.show_placeholder(items.is_empty());

		let mut previous: Option<N> = None;
		for (key, item) in &items {
			if let Some(rendered) = mapping.get_mut(key) {
				self.update(rendered, key, item);
			} else if let Some(rendered) = self.create(parent, key, item, previous.as_ref()) {
				trace!(%key, "Created entry.");
				mapping.insert(key.clone(), rendered);
			}
			if let Some(last) = mapping.get(key).and_then(Rendered::last_node) {
				previous = Some(last);
			}
		}

		let stale: Vec<String> = mapping.keys().filter(|key| !items.iter().any(|(k, _)| k == *key)).cloned().collect();
		for key in stale {
			if let Some(rendered) = mapping.shift_remove(&key) {
				trace!(%key, "Tearing down entry.");
				rendered.tear_down();
			}
		}
	}

	fn create(&self, parent: &Instance<N>, key: &str, item: &Value<N>, previous: Option<&N>) -> Option<Rendered<N>> {
		let result = match item {
			Value::Applied(applied) => {
				let child = match applied.template().new_instance(Some(parent)) {
					Ok(child) => child,
					Err(error) => {
						error!("Failed to instantiate child template{}: {}", path_note(&self.path), error);
						return None;
					}
				};
				child.set(applied.data().clone(), Some(key.to_owned()));
				child.mount(&self.node, previous);
				return Some(Rendered::Instance(child));
			}
			_ if dom::is_input_like(&self.node) => {
				dom::set_node_text(&self.node, &item.as_text());
				return Some(Rendered::Input);
			}
			Value::Node(node) => self.insert_after(node, previous).map(|()| Rendered::Node(node.clone())),
			_ => self
				.node
				.create_text(&item.as_text())
				.and_then(|text| self.insert_after(&text, previous).map(|()| Rendered::Text(text))),
		};
		match result {
			Ok(rendered) => Some(rendered),
			Err(error) => {
				error!("Failed to insert slot content{}: {}", path_note(&self.path), error);
				None
			}
		}
	}

	fn update(&self, rendered: &mut Rendered<N>, key: &str, item: &Value<N>) {
		match (&*rendered, item) {
			(Rendered::Instance(child), Value::Applied(applied)) if std::rc::Rc::ptr_eq(child.template(), applied.template()) => {
				child.set(applied.data().clone(), Some(key.to_owned()))
			}
			(Rendered::Instance(_), Value::Applied(_)) => error!("Not implemented: template change of slot entry {:?}{}.", key, path_note(&self.path)),
			(Rendered::Instance(child), _) => child.set(item.clone(), Some(key.to_owned())),
			(Rendered::Node(_) | Rendered::Text(_), Value::Applied(_)) => {
				error!("Not implemented: value to instance change of slot entry {:?}{}.", key, path_note(&self.path))
			}
			(Rendered::Node(old) | Rendered::Text(old), Value::Node(new)) => {
				if old != new {
					match self.node.replace_child(new, old) {
						Ok(()) => *rendered = Rendered::Node(new.clone()),
						Err(error) => error!("Failed to replace slot node{}: {}", path_note(&self.path), error),
					}
				}
			}
			(Rendered::Text(text), _) => {
				let value = item.as_text();
				if text.text_content() != value {
					text.set_character_data(&value)
				}
			}
			(Rendered::Node(old), _) => match self.node.create_text(&item.as_text()) {
				Ok(text) => match self.node.replace_child(&text, old) {
					Ok(()) => *rendered = Rendered::Text(text),
					Err(error) => error!("Failed to replace slot node{}: {}", path_note(&self.path), error),
				},
				Err(error) => error!("Failed to create text node{}: {}", path_note(&self.path), error),
			},
			(Rendered::Input, _) => dom::set_node_text(&self.node, &item.as_text()),
		}
	}
}

/// A live `when` guard: swaps a node with a placeholder comment.
pub struct WhenSlot<N: DomNode> {
	node: N,
	placeholder: N,
	predicate: Predicate,
	/// The root index if the guarded node is a template root.
	root: Option<usize>,
	shown: Cell<bool>,
}

impl<N: DomNode> Debug for WhenSlot<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("WhenSlot")
			.field("predicate", &self.predicate)
			.field("root", &self.root)
			.field("shown", &self.shown.get())
			.finish()
	}
}

impl<N: DomNode> WhenSlot<N> {
	pub(crate) fn new(node: N, path: &[usize], predicate: Predicate) -> Result<Self, DomError> {
		Ok(Self {
			placeholder: node.create_comment(&format!(" when: {} ", predicate.source()))?,
			node,
			predicate,
			root: if path.len() == 1 { path.first().copied() } else { None },
			shown: Cell::new(true),
		})
	}

	pub(crate) fn predicate(&self) -> &Predicate {
		&self.predicate
	}

	pub(crate) fn root(&self) -> Option<usize> {
		self.root
	}

	#[must_use]
	pub fn is_shown(&self) -> bool {
		self.shown.get()
	}

	/// The node that currently stands in the guarded position.
	#[must_use]
	pub fn visible(&self) -> &N {
		if self.shown.get() {
			&self.node
		} else {
			&self.placeholder
		}
	}

	pub(crate) fn placeholder(&self) -> &N {
		&self.placeholder
	}


	pub(crate) fn toggle(&self, show: bool) {
		if show == self.shown.get() {
			return;
		}
		let (incoming, outgoing) = if show { (&self.node, &self.placeholder) } else { (&self.placeholder, &self.node) };
		if let Some(parent) = outgoing.parent_node() {
			if let Err(error) = parent.replace_child(incoming, outgoing) {
				return error!("Failed to toggle `when {}`: {}", self.predicate.source(), error);
			}
		} else if self.root.is_none() {
			warn!("Guarded node of `when {}` is detached.", self.predicate.source());
		}
		self.shown.set(show);
	}
}
