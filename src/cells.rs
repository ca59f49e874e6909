//! Minimal reactive cells.
//!
//! A [`Reactive`] holds a value and a revision counter (`-1` until it has a value) and notifies its
//! subscribers synchronously on every change. There are three kinds:
//!
//! - cells, created with [`cell`] or [`empty`], are written directly,
//! - selections, created with [`Reactive::select`], are read/write views into a path of another reactive,
//! - derivations, created with [`derived`], recompute from a template structure whenever a reactive
//!   nested anywhere inside it publishes.
//!
//! Values are any [`Structure`], i.e. trees addressable by [`Key`] paths.

use crate::value::Key;
use core::{
	cell::{Cell as StdCell, RefCell},
	fmt::{self, Debug, Formatter},
	mem,
};
use indexmap::IndexMap;
use std::rc::{Rc, Weak};
use tracing::{trace, trace_span, warn};

/// A path-addressable value tree that may contain reactives.
pub trait Structure: Clone + 'static {
	fn null() -> Self;
	fn is_container(&self) -> bool;
	fn is_list(&self) -> bool;
	/// An empty container suitable for `key`: a list for indices, a dict for names.
	fn container_for(key: &Key) -> Self;
	fn child(&self, key: &Key) -> Option<&Self>;
	/// The entry at `key`, created (as null) if missing.
	///
	/// Non-containers are replaced with [`Structure::container_for`] first, lists are extended as needed.
	fn child_mut(&mut self, key: &Key) -> &mut Self;
	/// The direct children of a container, in enumeration order.
	fn children(&self) -> Vec<(Key, &Self)>;
	/// Rebuilds a container from its mapped children. [`None`] for non-containers.
	fn map_children(&self, f: &mut dyn FnMut(&Self) -> Self) -> Option<Self>;
	fn as_reactive(&self) -> Option<&Reactive<Self>>;
	/// `0` for null, the item count for containers, `1` otherwise.
	fn len(&self) -> usize;
}

/// Reads the value at `path` below `context`.
///
/// Returns [`None`] as soon as a segment is missing.
pub fn access<'a, V: Structure>(context: &'a V, path: &[Key]) -> Option<&'a V> {
	path.iter().try_fold(context, |context, key| context.child(key))
}

/// Writes `value` at `path` into `root`, creating missing intermediate containers.
///
/// Whether a missing container becomes a list or a dict depends on the key that indexes into it.
/// An empty path replaces the root.
#[must_use]
pub fn assign<V: Structure>(mut root: V, path: &[Key], value: V) -> V {
	if path.is_empty() {
		return value;
	}
	{
		let mut scope = &mut root;
		for key in path {
			scope = scope.child_mut(key);
		}
		*scope = value;
	}
	root
}

/// Every reactive reachable in `value` together with its path, depth first.
///
/// Does not descend into reactives.
pub fn walk<V: Structure>(value: &V) -> Vec<(Reactive<V>, Vec<Key>)> {
	fn walk_into<V: Structure>(value: &V, path: &mut Vec<Key>, found: &mut Vec<(Reactive<V>, Vec<Key>)>) {
		if let Some(reactive) = value.as_reactive() {
			found.push((reactive.clone(), path.clone()));
			return;
		}
		for (key, child) in value.children() {
			path.push(key);
			walk_into(child, path, found);
			path.pop();
		}
	}

	let mut found = Vec::new();
	walk_into(value, &mut Vec::new(), &mut found);
	found
}

/// Replaces every reactive inside `value` with its current value.
pub fn expand<V: Structure>(value: &V) -> V {
	if let Some(reactive) = value.as_reactive() {
		return reactive.get();
	}
	value.map_children(&mut |child| expand(child)).unwrap_or_else(|| value.clone())
}

pub type Handler<V> = Rc<dyn Fn(&V, Option<&[Key]>, &Reactive<V>)>;
pub type Processor<V> = Rc<dyn Fn(&V) -> V>;

/// Undoes a subscription when disposed or dropped.
#[must_use = "dropping a `Subscription` unsubscribes immediately"]
pub struct Subscription {
	dispose: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
	pub fn new(dispose: impl FnOnce() + 'static) -> Self {
		Self { dispose: Some(Box::new(dispose)) }
	}

	pub fn dispose(mut self) {
		self.run();
	}

	fn run(&mut self) {
		if let Some(dispose) = self.dispose.take() {
			dispose()
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.run();
	}
}

impl Debug for Subscription {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription").field("active", &self.dispose.is_some()).finish()
	}
}

/// Selections registered on a reactive, indexed by their path.
struct Selections<V: Structure> {
	entries: Vec<Weak<Inner<V>>>,
	children: IndexMap<Key, Selections<V>>,
}

impl<V: Structure> Default for Selections<V> {
	fn default() -> Self {
		Self {
			entries: Vec::new(),
			children: IndexMap::new(),
		}
	}
}

impl<V: Structure> Selections<V> {
	fn add(&mut self, path: &[Key], selected: &Reactive<V>) {
		let mut scope = self;
		for key in path {
			scope = scope.children.entry(key.clone()).or_default();
		}
		scope.entries.retain(|entry| entry.strong_count() > 0);
		scope.entries.push(Rc::downgrade(&selected.0));
	}

	/// Selections affected by a change at `path`: those on its ancestors, then everything below it
	/// (depth first, children before the node's own entries).
	fn affected(&self, path: &[Key], found: &mut Vec<Reactive<V>>) {
		match path.split_first() {
			None => self.all(found),
			Some((first, rest)) => {
				found.extend(self.entries.iter().filter_map(Weak::upgrade).map(Reactive));
				if let Some(child) = self.children.get(first) {
					child.affected(rest, found)
				}
			}
		}
	}

	fn all(&self, found: &mut Vec<Reactive<V>>) {
		for child in self.children.values() {
			child.all(found)
		}
		found.extend(self.entries.iter().filter_map(Weak::upgrade).map(Reactive));
	}
}

struct DerivationState<V: Structure> {
	expanded: V,
	processor: Option<Processor<V>>,
	reactors: Vec<Subscription>,
}

enum Kind<V: Structure> {
	Cell,
	Selected { parent: Reactive<V>, path: Vec<Key> },
	Derivation { template: V, state: RefCell<DerivationState<V>> },
}

struct Inner<V: Structure> {
	value: RefCell<V>,
	revision: StdCell<i64>,
	subs: RefCell<Vec<Handler<V>>>,
	selections: RefCell<Selections<V>>,
	kind: Kind<V>,
}

/// A shared handle to a reactive value. Clones refer to the same reactive.
pub struct Reactive<V: Structure>(Rc<Inner<V>>);

impl<V: Structure> Clone for Reactive<V> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<V: Structure> PartialEq for Reactive<V> {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

impl<V: Structure> Debug for Reactive<V> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let kind = match self.0.kind {
			Kind::Cell => "Cell",
			Kind::Selected { .. } => "Selected",
			Kind::Derivation { .. } => "Derivation",
		};
		f.debug_struct("Reactive")
			.field("kind", &kind)
			.field("revision", &self.0.revision.get())
			.field("subs", &self.0.subs.borrow().len())
			.finish()
	}
}

/// A cell holding `value`, at revision `0`.
pub fn cell<V: Structure>(value: V) -> Reactive<V> {
	Reactive::new(value, 0, Kind::Cell)
}

/// A cell without a value yet, at revision `-1`.
pub fn empty<V: Structure>() -> Reactive<V> {
	Reactive::new(V::null(), -1, Kind::Cell)
}

/// A reactive computed from `template`, a structure with reactives nested anywhere inside it.
///
/// The template is expanded (each reactive replaced by its value) and passed to `processor`,
/// or used as is without one. It is recomputed whenever any of the nested reactives publishes.
/// With `initial` set to `false`, the derivation stays at revision `-1` until the first such change.
pub fn derived<V: Structure>(template: V, processor: Option<Processor<V>>, initial: bool) -> Reactive<V> {
	let expanded = expand(&template);
	let (value, revision) = if initial {
		let value = match &processor {
			Some(processor) => processor(&expanded),
			None => expanded.clone(),
		};
		(value, 0)
	} else {
		(V::null(), -1)
	};
	let derivation = Reactive::new(
		value,
		revision,
		Kind::Derivation {
			template,
			state: RefCell::new(DerivationState {
				expanded,
				processor,
				reactors: Vec::new(),
			}),
		},
	);
	derivation.bind();
	derivation
}

impl<V: Structure> Reactive<V> {
	fn new(value: V, revision: i64, kind: Kind<V>) -> Self {
		Self(Rc::new(Inner {
			value: RefCell::new(value),
			revision: StdCell::new(revision),
			subs: RefCell::new(Vec::new()),
			selections: RefCell::new(Selections::default()),
			kind,
		}))
	}

	/// A clone of the current value.
	#[must_use]
	pub fn get(&self) -> V {
		self.0.value.borrow().clone()
	}

	/// Runs `f` with the current value without cloning it.
	pub fn with<R>(&self, f: impl FnOnce(&V) -> R) -> R {
		f(&self.0.value.borrow())
	}

	#[must_use]
	pub fn revision(&self) -> i64 {
		self.0.revision.get()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		if self.revision() == -1 {
			0
		} else {
			self.0.value.borrow().len()
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Maps `functor` over the items of a container value, or over the value itself otherwise.
	///
	/// [`None`] while there is no value.
	pub fn map<U>(&self, mut functor: impl FnMut(&V) -> U) -> Option<Vec<U>> {
		if self.revision() == -1 {
			return None;
		}
		let value = self.0.value.borrow();
		if value.is_container() {
			Some(value.children().into_iter().map(|(_, child)| functor(child)).collect())
		} else if value.len() == 0 {
			None
		} else {
			Some(vec![functor(&value)])
		}
	}

	#[must_use]
	pub fn is_same(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	/// Adds `handler`. The same handler may be added more than once and is then called more than once.
	pub fn sub(&self, handler: Handler<V>) -> &Self {
		self.0.subs.borrow_mut().push(handler);
		self
	}

	/// Removes the first registration of this exact handler (compared by identity).
	pub fn unsub(&self, handler: &Handler<V>) -> &Self {
		let mut subs = self.0.subs.borrow_mut();
		if let Some(index) = subs.iter().position(|h| same_handler(h, handler)) {
			subs.remove(index);
		}
		self
	}

	/// Like [`Reactive::sub`], but returns a [`Subscription`] that unsubscribes again.
	pub fn subscribe(&self, handler: impl Fn(&V, Option<&[Key]>, &Reactive<V>) + 'static) -> Subscription {
		let handler: Handler<V> = Rc::new(handler);
		self.sub(handler.clone());
		let weak = Rc::downgrade(&self.0);
		Subscription::new(move || {
			if let Some(inner) = weak.upgrade() {
				Reactive(inner).unsub(&handler);
			}
		})
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.0.subs.borrow().len()
	}

	/// Notifies all subscribers, in subscription order.
	///
	/// Subscribers added or removed by a handler take effect from the next publication on.
	pub fn publish(&self, value: &V, path: Option<&[Key]>, origin: &Reactive<V>) {
		let subs = self.0.subs.borrow().clone();
		trace!("Publishing to {} subscriber(s).", subs.len());
		for handler in subs {
			handler(value, path, origin);
		}
	}

	/// Replaces the whole value.
	pub fn set(&self, value: V) {
		self.update(value, None)
	}

	/// Assigns `value` at `path` inside the current value.
	pub fn set_at(&self, path: &[Key], value: V) {
		self.update(value, Some(path))
	}

	fn update(&self, value: V, path: Option<&[Key]>) {
		match &self.0.kind {
			Kind::Cell => self.update_cell(value, path),
			Kind::Selected { parent, path: prefix } => {
				let mut full = prefix.clone();
				full.extend(path.into_iter().flatten().cloned());
				parent.update(value, Some(&full))
			}
			Kind::Derivation { .. } => warn!("Ignoring write to a derivation."),
		}
	}

	fn update_cell(&self, value: V, path: Option<&[Key]>) {
		let span = trace_span!("Updating cell", path = ?path, revision = self.revision());
		let _enter = span.enter();
		{
			let mut current = self.0.value.borrow_mut();
			let updated = match path {
				Some(path) => assign(mem::replace(&mut *current, V::null()), path, value.clone()),
				None => value.clone(),
			};
			*current = updated;
		}
		self.0.revision.set(self.revision() + 1);

		let mut affected = Vec::new();
		self.0.selections.borrow().affected(path.unwrap_or(&[]), &mut affected);
		for selected in affected {
			trace!("Refreshing selection.");
			selected.refresh();
		}
		self.publish(&value, path, self);
	}

	/// Appends to a list value, turning a non-list value into a list first.
	pub fn push(&self, value: V) {
		match &self.0.kind {
			Kind::Cell => (),
			Kind::Selected { .. } | Kind::Derivation { .. } => return warn!("Ignoring push to a non-cell reactive."),
		}
		let index = {
			let mut current = self.0.value.borrow_mut();
			if self.revision() == -1 || (current.len() == 0 && !current.is_container()) {
				*current = V::container_for(&Key::Index(0));
			} else if !current.is_list() {
				let previous = mem::replace(&mut *current, V::container_for(&Key::Index(0)));
				*current.child_mut(&Key::Index(0)) = previous;
			}
			let index = current.len();
			*current.child_mut(&Key::Index(index)) = value.clone();
			index
		};
		self.0.revision.set(self.revision() + 1);
		let path = [Key::Index(index)];
		let mut affected = Vec::new();
		self.0.selections.borrow().affected(&path, &mut affected);
		for selected in affected {
			selected.refresh();
		}
		self.publish(&value, Some(&path), self);
	}

	/// A read/write view of the value at `path`.
	///
	/// It is refreshed whenever this reactive changes at, above or below `path`.
	#[must_use]
	pub fn select(&self, path: &[Key]) -> Reactive<V> {
		if let Kind::Selected { parent, path: prefix } = &self.0.kind {
			let mut full = prefix.clone();
			full.extend(path.iter().cloned());
			return parent.select(&full);
		}
		let value = access(&*self.0.value.borrow(), path).cloned().unwrap_or_else(V::null);
		let selected = Reactive::new(
			value,
			0,
			Kind::Selected {
				parent: self.clone(),
				path: path.to_vec(),
			},
		);
		self.0.selections.borrow_mut().add(path, &selected);
		selected
	}

	/// Re-reads a selection's slice of its parent's value and republishes it.
	pub fn refresh(&self) {
		let (parent, path) = match &self.0.kind {
			Kind::Selected { parent, path } => (parent, path),
			Kind::Cell | Kind::Derivation { .. } => return warn!("Only selections can be refreshed."),
		};
		let value = parent.with(|parent_value| access(parent_value, path).cloned()).unwrap_or_else(V::null);
		*self.0.value.borrow_mut() = value.clone();
		self.0.revision.set(self.revision() + 1);
		self.publish(&value, Some(path), parent);
	}

	fn bind(&self) {
		let template = match &self.0.kind {
			Kind::Derivation { template, .. } => template,
			Kind::Cell | Kind::Selected { .. } => return,
		};
		let mut reactors = Vec::new();
		for (source, path) in walk(template) {
			let weak = Rc::downgrade(&self.0);
			let subscribed = Rc::downgrade(&source.0);
			reactors.push(source.subscribe(move |value, published_path, origin| {
				if let Some(inner) = weak.upgrade() {
					let mut full = path.clone();
					// Selections publish their position in their parent, not a path inside themselves.
					if Rc::as_ptr(&origin.0) == subscribed.as_ptr() {
						full.extend(published_path.into_iter().flatten().cloned());
					}
					Reactive(inner).recompute(&full, value);
				}
			}));
		}
		if let Kind::Derivation { state, .. } = &self.0.kind {
			state.borrow_mut().reactors = reactors;
		}
	}

	/// Drops a derivation's subscriptions to the reactives in its template.
	pub fn unbind(&self) {
		if let Kind::Derivation { state, .. } = &self.0.kind {
			let reactors = mem::take(&mut state.borrow_mut().reactors);
			trace!("Unbinding {} reactor(s).", reactors.len());
			drop(reactors);
		}
	}

	fn recompute(&self, path: &[Key], value: &V) {
		let state = match &self.0.kind {
			Kind::Derivation { state, .. } => state,
			Kind::Cell | Kind::Selected { .. } => return,
		};
		let (expanded, processor) = {
			let mut state = state.borrow_mut();
			let expanded = assign(mem::replace(&mut state.expanded, V::null()), path, value.clone());
			state.expanded = expanded.clone();
			(expanded, state.processor.clone())
		};
		let derived = match processor {
			Some(processor) => processor(&expanded),
			None => expanded,
		};
		*self.0.value.borrow_mut() = derived.clone();
		self.0.revision.set(self.revision() + 1);
		self.publish(&derived, None, self);
	}
}

fn same_handler<V: Structure>(a: &Handler<V>, b: &Handler<V>) -> bool {
	Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{mem::Node, value::Value};
	use serde_json::json;

	type V = Value<Node>;

	fn v(json: serde_json::Value) -> V {
		json.into()
	}

	fn recorder(reactive: &Reactive<V>) -> (Rc<RefCell<Vec<(V, Option<Vec<Key>>)>>>, Subscription) {
		let log = Rc::new(RefCell::new(Vec::new()));
		let subscription = reactive.subscribe({
			let log = log.clone();
			move |value, path, _| log.borrow_mut().push((value.clone(), path.map(<[Key]>::to_vec)))
		});
		(log, subscription)
	}

	#[test]
	fn revisions() {
		let c = empty::<V>();
		assert_eq!(c.revision(), -1);
		assert_eq!(c.len(), 0);
		c.set(v(json!(1)));
		assert_eq!(c.revision(), 0);
		c.set(v(json!(1)));
		assert_eq!(c.revision(), 1);
		assert_eq!(cell(v(json!([1, 2]))).revision(), 0);
	}

	#[test]
	fn set_at_creates_containers() {
		let c = cell(V::Null);
		let (log, _subscription) = recorder(&c);
		c.set_at(&[Key::from("a"), Key::Index(1)], v(json!("x")));
		assert_eq!(c.get(), v(json!({"a": [null, "x"]})));
		assert_eq!(*log.borrow(), vec![(v(json!("x")), Some(vec![Key::from("a"), Key::Index(1)]))]);
	}

	#[test]
	fn subscription_drop_unsubscribes() {
		let c = cell(V::Null);
		let (log, subscription) = recorder(&c);
		c.set(v(json!(1)));
		drop(subscription);
		assert_eq!(c.subscriber_count(), 0);
		c.set(v(json!(2)));
		assert_eq!(log.borrow().len(), 1);
	}

	#[test]
	fn push() {
		let c = empty::<V>();
		c.push(v(json!("a")));
		c.push(v(json!("b")));
		assert_eq!(c.get(), v(json!(["a", "b"])));

		let scalar = cell(v(json!(1)));
		let (log, _subscription) = recorder(&scalar);
		scalar.push(v(json!(2)));
		assert_eq!(scalar.get(), v(json!([1, 2])));
		assert_eq!(log.borrow()[0].1, Some(vec![Key::Index(1)]));
	}

	#[test]
	fn selections_follow_changes_around_their_path() {
		let c = cell(v(json!({"a": {"b": 1}, "c": 2})));
		let selected = c.select(&[Key::from("a"), Key::from("b")]);
		assert_eq!(selected.get(), v(json!(1)));

		c.set_at(&[Key::from("a"), Key::from("b")], v(json!(5)));
		assert_eq!(selected.get(), v(json!(5)));
		c.set_at(&[Key::from("a")], v(json!({"b": 6})));
		assert_eq!(selected.get(), v(json!(6)));

		let revision = selected.revision();
		c.set_at(&[Key::from("c")], v(json!(3)));
		assert_eq!(selected.revision(), revision);

		selected.set(v(json!(7)));
		assert_eq!(c.get(), v(json!({"a": {"b": 7}, "c": 3})));
	}

	#[test]
	fn derivation_recomputes() {
		let a = cell(v(json!(1)));
		let b = cell(v(json!({"x": 2})));
		let template = V::dict([("a", V::Reactive(a.clone())), ("b", V::Reactive(b.clone()))]);
		let sum: Processor<V> = Rc::new(|value: &V| {
			let a = value.get("a").and_then(Value::as_f64).unwrap_or_default();
			let x = value.get("b").and_then(|b| b.get("x")).and_then(Value::as_f64).unwrap_or_default();
			V::Number(a + x)
		});
		let derivation = derived(template, Some(sum), true);
		assert_eq!(derivation.get(), v(json!(3)));
		assert_eq!(derivation.revision(), 0);

		let (log, _subscription) = recorder(&derivation);
		b.set_at(&[Key::from("x")], v(json!(10)));
		assert_eq!(derivation.get(), v(json!(11)));
		a.set(v(json!(0)));
		assert_eq!(*log.borrow(), vec![(v(json!(11)), None), (v(json!(10)), None)]);

		derivation.unbind();
		a.set(v(json!(100)));
		assert_eq!(derivation.get(), v(json!(10)));
		assert_eq!(a.subscriber_count(), 0);
	}

	#[test]
	fn lazy_derivation() {
		let a = cell(v(json!("x")));
		let derivation = derived(V::List(vec![V::Reactive(a.clone())]), None, false);
		assert_eq!(derivation.revision(), -1);
		assert_eq!(derivation.len(), 0);
		a.set(v(json!("y")));
		assert_eq!(derivation.revision(), 0);
		assert_eq!(derivation.get(), v(json!(["y"])));
	}

	#[test]
	fn dropped_derivation_unsubscribes() {
		let a = cell(v(json!(1)));
		let derivation = derived(V::List(vec![V::Reactive(a.clone())]), None, true);
		assert_eq!(a.subscriber_count(), 1);
		drop(derivation);
		assert_eq!(a.subscriber_count(), 0);
	}

	#[test]
	fn derivation_over_a_selection() {
		let c = cell(v(json!({"a": 1, "b": {"c": 2}})));
		let a = c.select(&[Key::from("a")]);
		let b = c.select(&[Key::from("b")]);
		let derivation = derived(V::List(vec![V::Reactive(a.clone()), V::Reactive(b.clone())]), None, true);
		assert_eq!(derivation.get(), v(json!([1, {"c": 2}])));

		c.set_at(&[Key::from("a")], v(json!(5)));
		assert_eq!(derivation.get(), v(json!([5, {"c": 2}])));
		c.set_at(&[Key::from("b"), Key::from("c")], v(json!(3)));
		assert_eq!(derivation.get(), v(json!([5, {"c": 3}])));
		b.set_at(&[Key::from("c")], v(json!(4)));
		assert_eq!(derivation.get(), v(json!([5, {"c": 4}])));
	}
}
