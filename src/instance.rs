//! Live template instances.

use crate::{
	attribute_slot::AttributeSlot,
	cells::{Reactive, Subscription},
	dom::{self, Document, DomNode, NodeKind, Path},
	error::Error,
	event::{Propagation, UiEvent},
	loggable, path_note,
	slot::{Slot, WhenSlot},
	template::{Behavior, SlotMap, Template, TemplateSlot},
	value::{Value, ValueType},
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	mem,
};
use hashbrown::HashMap;
use indexmap::IndexMap;
use std::rc::{Rc, Weak};
use tracing::{error, instrument, trace, trace_span, warn};

struct State<N: DomNode> {
	data: Value<N>,
	key: Option<String>,
	data_type: ValueType,
}

struct Inner<N: DomNode> {
	template: Rc<Template<N>>,
	nodes: Vec<N>,
	out: IndexMap<String, Vec<Slot<N>>>,
	inout: IndexMap<String, Vec<Slot<N>>>,
	in_: IndexMap<String, Vec<Slot<N>>>,
	when: Vec<WhenSlot<N>>,
	out_attr: IndexMap<String, Vec<AttributeSlot<N>>>,
	refs: IndexMap<String, Vec<N>>,
	parent: Option<Weak<Inner<N>>>,
	state: RefCell<State<N>>,
	initial: RefCell<Value<N>>,
	/// Behaviour results of the current render pass.
	memo: RefCell<HashMap<String, Value<N>>>,
	/// Render subscriptions to reactive data entries, by entry name.
	subscriptions: RefCell<HashMap<String, Subscription>>,
	listeners: RefCell<Vec<N::Listener>>,
	rendering: Cell<bool>,
}

/// A live clone of a [`Template`]'s nodes with resolved slots.
///
/// Handles are cheap to clone and compare by identity.
pub struct Instance<N: DomNode>(Rc<Inner<N>>);

impl<N: DomNode> Clone for Instance<N> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<N: DomNode> PartialEq for Instance<N> {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

impl<N: DomNode> Debug for Instance<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Instance");
		debug.field("nodes", &self.0.nodes);
		if let Ok(state) = self.0.state.try_borrow() {
			debug.field("key", &state.key).field("data", &loggable(&state.data));
		}
		debug.finish_non_exhaustive()
	}
}

/// Resolves every slot of `map` against `roots`, skipping (and logging) paths that don't resolve.
fn resolve_map<N: DomNode, S, T>(roots: &[N], map: Option<&SlotMap<S>>, path: impl Fn(&S) -> &Path, mut make: impl FnMut(N, &S) -> Option<T>) -> IndexMap<String, Vec<T>> {
	let mut resolved = IndexMap::new();
	for (name, slots) in map.into_iter().flatten() {
		let mut live = Vec::with_capacity(slots.len());
		for slot in slots {
			match dom::resolve(roots, path(slot)) {
				Some(node) => live.extend(make(node, slot)),
				None => error!("Slot {:?} did not resolve in the template clone{}.", name, path_note(path(slot))),
			}
		}
		resolved.insert(name.clone(), live);
	}
	resolved
}

impl<N: DomNode> Instance<N> {
	/// Clones `template`'s nodes, resolves its slots against the clone and binds event handlers.
	///
	/// If the template has an initializer, its result becomes the first data.
	///
	/// # Errors
	///
	/// Iff the template nodes can't be cloned.
	#[instrument(skip_all)]
	pub fn new(template: &Rc<Template<N>>, parent: Option<&Instance<N>>) -> Result<Self, Error> {
		let nodes = template.nodes.iter().map(DomNode::clone_deep).collect::<Result<Vec<_>, _>>()?;
		let content = |map: &Option<SlotMap<TemplateSlot<N>>>| resolve_map(&nodes, map.as_ref(), |slot| &slot.path, |node, slot| Some(Slot::new(node, slot.path.clone())));

		let out = content(&template.out);
		let inout = content(&template.inout);
		let in_ = content(&template.in_);
		let refs = resolve_map(&nodes, template.refs.as_ref(), |slot| &slot.path, |node, _| Some(node));
		let when = resolve_map(&nodes, template.when.as_ref(), |slot| &slot.path, |node, slot| {
			let predicate = slot.predicate.clone()?;
			WhenSlot::new(node, &slot.path, predicate)
				.map_err(|error| error!("Failed to create `when` placeholder{}: {}", path_note(&slot.path), error))
				.ok()
		})
		.into_values()
		.flatten()
		.collect();
		let out_attr = resolve_map(&nodes, template.out_attr.as_ref(), |slot| &slot.path, |node, slot| {
			Some(AttributeSlot::new(node, slot.path.clone(), slot.attribute.clone(), slot.original.clone()))
		});

		let instance = Self(Rc::new(Inner {
			template: template.clone(),
			out,
			inout,
			in_,
			when,
			out_attr,
			refs,
			parent: parent.map(|parent| Rc::downgrade(&parent.0)),
			state: RefCell::new(State {
				data: Value::Null,
				key: None,
				data_type: ValueType::Null,
			}),
			initial: RefCell::new(Value::Null),
			memo: RefCell::new(HashMap::new()),
			subscriptions: RefCell::new(HashMap::new()),
			listeners: RefCell::new(Vec::new()),
			rendering: Cell::new(false),
			nodes,
		}));
		instance.bind_events();

		if let Some(initializer) = &template.initializer {
			let initial = initializer();
			if let Value::Dict(entries) = &initial {
				for (name, value) in entries {
					if let Value::Reactive(reactive) = value {
						instance.track(name, reactive);
					}
				}
			}
			*instance.0.initial.borrow_mut() = initial.clone();
			instance.set(initial, None);
		}
		Ok(instance)
	}

	fn bind_events(&self) {
		let template = &self.0.template;
		let mut listeners = Vec::new();
		for slots in template.event_slots() {
			for (name, slots) in slots {
				let behavior = match template.behavior.get(name) {
					Some(behavior) => behavior,
					None => {
						trace!(%name, "No behaviour for event slot.");
						continue;
					}
				};
				for slot in slots {
					let node = match dom::resolve(&self.0.nodes, &slot.path) {
						Some(node) => node,
						None => continue,
					};
					let bindings = match behavior {
						Behavior::Action(action) => vec![(dom::default_event_for(&node).to_owned(), action.clone())],
						Behavior::Events(events) => events.clone(),
						Behavior::Attribute(_) => {
							warn!("Attribute behaviour {:?} can't handle events.", name);
							continue;
						}
					};
					for (event, action) in bindings {
						let weak = Rc::downgrade(&self.0);
						let handler: Rc<dyn Fn(&N::Event)> = Rc::new(move |dom_event: &N::Event| {
							if let Some(inner) = weak.upgrade() {
								let instance = Instance(inner);
								let data = instance.handler_data();
								action(&instance, &data, Some(dom_event));
							}
						});
						match node.add_event_listener(&event, handler) {
							Ok(listener) => listeners.push(listener),
							Err(error) => error!("Failed to bind {:?} on slot {:?}: {}", event, name, error),
						}
					}
				}
			}
		}
		trace!("Bound {} event listener(s).", listeners.len());
		self.0.listeners.borrow_mut().extend(listeners);
	}

	/// The data passed to event handlers: the current data, or an empty dict instead of null.
	fn handler_data(&self) -> Value<N> {
		match self.data() {
			Value::Null => Value::Dict(IndexMap::new()),
			data => data,
		}
	}

	/// Re-renders the instance whenever `reactive` changes, replacing any previous subscription under `name`.
	fn track(&self, name: &str, reactive: &Reactive<Value<N>>) {
		let weak = Rc::downgrade(&self.0);
		let subscription = reactive.subscribe(move |_, _, _| {
			if let Some(inner) = weak.upgrade() {
				Instance(inner).render()
			}
		});
		let previous = self.0.subscriptions.borrow_mut().insert(name.to_owned(), subscription);
		drop(previous);
	}

	#[must_use]
	pub fn template(&self) -> &Rc<Template<N>> {
		&self.0.template
	}

	/// This instance's root nodes (including hidden `when` roots).
	#[must_use]
	pub fn nodes(&self) -> &[N] {
		&self.0.nodes
	}

	/// The root nodes as they should be in the DOM, with hidden `when` roots replaced by their placeholders.
	#[must_use]
	pub fn visible_nodes(&self) -> Vec<N> {
		self.0
			.nodes
			.iter()
			.enumerate()
			.map(|(i, node)| match self.0.when.iter().find(|when| when.root() == Some(i)) {
				Some(when) => when.visible().clone(),
				None => node.clone(),
			})
			.collect()
	}

	#[must_use]
	pub fn data(&self) -> Value<N> {
		self.0.state.borrow().data.clone()
	}

	#[must_use]
	pub fn key(&self) -> Option<String> {
		self.0.state.borrow().key.clone()
	}

	#[must_use]
	pub fn data_type(&self) -> ValueType {
		self.0.state.borrow().data_type
	}

	/// The state initializer's result, or null.
	#[must_use]
	pub fn initial(&self) -> Value<N> {
		self.0.initial.borrow().clone()
	}

	/// The first node marked `ref="name"`.
	#[must_use]
	pub fn ref_node(&self, name: &str) -> Option<N> {
		self.0.refs.get(name).and_then(|nodes| nodes.first()).cloned()
	}

	/// All nodes marked `ref="name"`, in document order.
	#[must_use]
	pub fn ref_nodes(&self, name: &str) -> Vec<N> {
		self.0.refs.get(name).cloned().unwrap_or_default()
	}

	/// The content slots named `name` (`out`, then `inout`, then `in`).
	#[must_use]
	pub fn slots(&self, name: &str) -> Vec<&Slot<N>> {
		[&self.0.out, &self.0.inout, &self.0.in_].into_iter().filter_map(|slots| slots.get(name)).flatten().collect()
	}

	#[must_use]
	pub fn attribute_slots(&self, name: &str) -> &[AttributeSlot<N>] {
		self.0.out_attr.get(name).map_or(&[][..], Vec::as_slice)
	}

	#[must_use]
	pub fn when_slots(&self) -> &[WhenSlot<N>] {
		&self.0.when
	}

	#[must_use]
	pub fn parent(&self) -> Option<Instance<N>> {
		self.0.parent.as_ref().and_then(Weak::upgrade).map(Instance)
	}

	/// Renders `data`, replacing the key if one is given.
	#[instrument(skip(self, data))]
	pub fn set(&self, data: Value<N>, key: Option<String>) {
		if let Some(key) = key {
			self.0.state.borrow_mut().key = Some(key);
		}
		self.render_with(data)
	}

	/// Merges the entries of the dict `partial` into the current data and re-renders if any entry changed
	/// (or `force` is set).
	///
	/// Reactive entries are tracked: the instance re-renders when they change.
	///
	/// Returns whether a render happened.
	#[instrument(skip(self, partial))]
	pub fn update(&self, partial: Value<N>, force: bool) -> bool {
		let entries = match partial {
			Value::Dict(entries) => entries,
			other => {
				warn!("Ignoring update with non-dict {:?}.", other.value_type());
				return false;
			}
		};
		let mut data = match self.data() {
			Value::Dict(data) => data,
			Value::Null => IndexMap::new(),
			other => {
				warn!("Replacing {:?} data with a dict on update.", other.value_type());
				IndexMap::new()
			}
		};

		let mut changed = force;
		for (name, value) in entries {
			let previous = data.get(&name);
			if !force && previous == Some(&value) {
				continue;
			}
			changed = true;
			if matches!(previous, Some(Value::Reactive(_))) {
				let subscription = self.0.subscriptions.borrow_mut().remove(&name);
				drop(subscription);
			}
			if let Value::Reactive(reactive) = &value {
				self.track(&name, reactive);
			}
			data.insert(name, value);
		}

		if changed {
			self.render_with(Value::Dict(data));
		} else {
			trace!("No changes.");
		}
		changed
	}

	/// Re-renders the current data.
	pub fn render(&self) {
		self.render_with(self.data())
	}

	fn render_with(&self, data: Value<N>) {
		if self.0.rendering.replace(true) {
			return error!("Re-entrant render of instance {:?}; skipped.", self.key());
		}
		let span = trace_span!("Rendering instance", key = ?self.key(), data = %loggable(&data));
		let _enter = span.enter();

		if self.0.template.is_leaf() {
			if let Some(first) = self.0.nodes.iter().find(|node| node.kind() == NodeKind::Element) {
				dom::set_node_text(first, &data.as_text());
			}
		} else {
			for slots in [&self.0.out, &self.0.inout, &self.0.in_] {
				for (name, slots) in slots {
					let value = match slots.first() {
						Some(first) => self.compute(name, &data, None, first.node()),
						None => continue,
					};
					for slot in slots {
						slot.render(self, &value);
					}
				}
			}
			self.0.memo.borrow_mut().clear();

			for when in &self.0.when {
				when.toggle(when.predicate().evaluate(&data, None));
			}

			for (name, slots) in &self.0.out_attr {
				let value = match slots.first() {
					Some(first) => self.compute(name, &data, first.current(), first.node()),
					None => continue,
				};
				for slot in slots {
					slot.render(&value);
				}
			}
			self.0.memo.borrow_mut().clear();
		}

		{
			let mut state = self.0.state.borrow_mut();
			state.data_type = data.value_type();
			state.data = data;
		}
		self.0.rendering.set(false);
	}

	/// The value projected into slots named `name`: the behaviour's result (memoized for this render pass) or `data`.
	fn compute(&self, name: &str, data: &Value<N>, attribute: Option<String>, node: &N) -> Value<N> {
		if let Some(value) = self.0.memo.borrow().get(name) {
			return value.clone();
		}
		let value = match self.0.template.behavior.get(name) {
			Some(Behavior::Action(action)) => action(self, data, None),
			Some(Behavior::Attribute(action)) => action(self, data, attribute.as_deref(), node),
			Some(Behavior::Events(_)) | None => return data.clone(),
		};
		self.0.memo.borrow_mut().insert(name.to_owned(), value.clone());
		value
	}

	/// Inserts the visible root nodes into `parent`, after `previous` or at the start.
	#[instrument(skip(self))]
	pub fn mount(&self, parent: &N, previous: Option<&N>) -> &Self {
		let nodes = self.visible_nodes();
		if let Some(first) = nodes.first() {
			if first.parent_node().as_ref() == Some(parent) {
				warn!("Instance is already mounted here.");
				return self;
			}
		}
		let reference = match previous {
			Some(previous) => previous.next_sibling(),
			None => parent.first_child(),
		};
		for node in &nodes {
			if let Err(error) = parent.insert_before(node, reference.as_ref()) {
				error!("Failed to mount node: {}", error);
			}
		}
		self
	}

	/// Appends the visible root nodes to the first element matching `selector`.
	///
	/// Logs an error and does nothing if there is none.
	#[instrument(skip(self, document))]
	pub fn mount_to<D: Document<Node = N>>(&self, document: &D, selector: &str) -> &Self {
		match document.query_selector(selector) {
			Ok(Some(parent)) => {
				let last = parent.child_nodes().pop();
				self.mount(&parent, last.as_ref())
			}
			Ok(None) => {
				error!("Mount target {:?} not found.", selector);
				self
			}
			Err(error) => {
				error!("Failed to query mount target {:?}: {}", selector, error);
				self
			}
		}
	}

	/// Detaches the root nodes (and root `when` placeholders) and [disposes](`Instance::dispose`) the instance.
	#[instrument(skip(self))]
	pub fn unmount(&self) -> &Self {
		let placeholders = self.0.when.iter().filter(|when| when.root().is_some()).map(WhenSlot::placeholder);
		for node in self.0.nodes.iter().chain(placeholders) {
			if let Err(error) = node.detach() {
				error!("Failed to unmount node: {}", error);
			}
		}
		self.dispose();
		self
	}

	/// Drops this instance's reactive subscriptions and those of its child instances.
	pub fn dispose(&self) {
		let subscriptions = mem::take(&mut *self.0.subscriptions.borrow_mut());
		trace!("Disposing {} subscription(s).", subscriptions.len());
		drop(subscriptions);
		for slots in [&self.0.out, &self.0.inout, &self.0.in_] {
			for slot in slots.values().flatten() {
				slot.dispose();
			}
		}
	}

	/// The number of reactive subscriptions currently held.
	#[must_use]
	pub fn subscription_count(&self) -> usize {
		self.0.subscriptions.borrow().len()
	}

	/// Publishes an event named `name` to this instance's ancestors.
	///
	/// Returns the event after propagation.
	pub fn send(&self, name: &str, data: impl Into<Value<N>>, dom_event: Option<&N::Event>) -> UiEvent<N> {
		self.publish(UiEvent::new(name, data.into(), self, dom_event))
	}

	/// Hands `event` to the parent, if there is one.
	pub fn publish(&self, event: UiEvent<N>) -> UiEvent<N> {
		match self.parent() {
			Some(parent) => parent.on_pub(event),
			None => event,
		}
	}

	/// Runs this template's subscribers for `event` and passes it on to the parent unless stopped.
	///
	/// A [`Propagation::Stop`] result ends the dispatch at once. [`Propagation::Local`] lets the remaining
	/// handlers here run, but keeps the event from the parent.
	#[instrument(skip(self, event), fields(event = %event.name))]
	pub fn on_pub(&self, mut event: UiEvent<N>) -> UiEvent<N> {
		event.current = Some(self.clone());
		let handlers = self.0.template.subs.get(&event.name).cloned().unwrap_or_default();
		let data = self.data();
		let mut propagate = true;
		for handler in handlers {
			match handler(self, &data, &event) {
				Propagation::Continue => (),
				Propagation::Local => propagate = false,
				Propagation::Stop => {
					trace!("Propagation stopped.");
					return event;
				}
			}
		}
		if propagate {
			self.publish(event)
		} else {
			event
		}
	}
}
