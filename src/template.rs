//! Template compilation.
//!
//! A template is compiled once from a list of root nodes. Marker attributes are collected into slot maps
//! (name → structural paths) and removed from the nodes, which then only serve as the source for clones.

use crate::{
	dom::{self, Document, DomNode, Path},
	error::Error,
	event::{Propagation, UiEvent},
	instance::Instance,
	predicate::Predicate,
	value::Value,
};
use core::fmt::{self, Debug, Formatter};
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::{instrument, trace, warn};

/// Slot name → slots in document order.
pub type SlotMap<S> = IndexMap<String, Vec<S>>;

pub type Action<N> = Rc<dyn Fn(&Instance<N>, &Value<N>, Option<&<N as DomNode>::Event>) -> Value<N>>;
pub type AttributeAction<N> = Rc<dyn Fn(&Instance<N>, &Value<N>, Option<&str>, &N) -> Value<N>>;
pub type SubHandler<N> = Rc<dyn Fn(&Instance<N>, &Value<N>, &UiEvent<N>) -> Propagation>;
pub type Initializer<N> = Rc<dyn Fn() -> Value<N>>;

/// A marked element, located by its path from the template roots.
pub struct TemplateSlot<N: DomNode> {
	/// The marked template node. Only used for diagnostics, instances resolve [`TemplateSlot::path`].
	pub node: N,
	pub path: Path,
	/// The compiled expression of a `when` slot.
	pub predicate: Option<Predicate>,
}

impl<N: DomNode> Debug for TemplateSlot<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("TemplateSlot").field("path", &self.path).field("predicate", &self.predicate).finish()
	}
}

/// An `out:<attribute>` marker.
pub struct AttributeTemplateSlot<N: DomNode> {
	pub node: N,
	pub path: Path,
	/// The managed attribute.
	pub attribute: String,
	/// The attribute's authored value, which reconciliation builds on.
	pub original: Option<String>,
}

impl<N: DomNode> Debug for AttributeTemplateSlot<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("AttributeTemplateSlot")
			.field("path", &self.path)
			.field("attribute", &self.attribute)
			.field("original", &self.original)
			.finish()
	}
}

/// Collects every element under `roots` (roots included) that carries the attribute `name`,
/// keyed by that attribute's value, and removes the attribute.
///
/// `when` values are compiled as [`Predicate`]s.
///
/// Returns [`None`] if nothing matched.
///
/// # Errors
///
/// Iff a `when` expression fails to compile or an attribute can't be removed.
pub fn find_slots<N: DomNode>(name: &str, roots: &[N]) -> Result<Option<SlotMap<TemplateSlot<N>>>, Error> {
	let mut slots = SlotMap::new();
	for (root_index, root) in roots.iter().enumerate() {
		for element in dom::elements_in_order(root) {
			let key = match element.get_attribute(name) {
				Some(key) => key,
				None => continue,
			};
			element.remove_attribute(name)?;
			let path = match dom::path_to(&element, root, root_index) {
				Some(path) => path,
				None => continue,
			};
			let predicate = if name == "when" { Some(Predicate::compile(&key)?) } else { None };
			trace!(name, ?path, "Found slot.");
			slots.entry(key).or_insert_with(Vec::new).push(TemplateSlot {
				node: element,
				path,
				predicate,
			});
		}
	}
	Ok(if slots.is_empty() { None } else { Some(slots) })
}

/// Collects every attribute starting with `prefix` (like `out:`) on elements under `roots`.
///
/// The rest of the attribute name is the managed attribute. The slot name is the marker's value,
/// or the managed attribute's name if the value is empty.
///
/// Returns [`None`] if nothing matched.
///
/// # Errors
///
/// Iff a marker attribute can't be removed.
pub fn find_attribute_slots<N: DomNode>(prefix: &str, roots: &[N]) -> Result<Option<SlotMap<AttributeTemplateSlot<N>>>, Error> {
	let mut slots = SlotMap::new();
	for (root_index, root) in roots.iter().enumerate() {
		for element in dom::elements_in_order(root) {
			for marker in element.attribute_names() {
				let attribute = match marker.strip_prefix(prefix) {
					Some(attribute) if !attribute.is_empty() => attribute.to_owned(),
					_ => continue,
				};
				let name = element.get_attribute(&marker).filter(|name| !name.is_empty()).unwrap_or_else(|| attribute.clone());
				element.remove_attribute(&marker)?;
				let path = match dom::path_to(&element, root, root_index) {
					Some(path) => path,
					None => continue,
				};
				trace!(%marker, %name, ?path, "Found attribute slot.");
				slots.entry(name).or_insert_with(Vec::new).push(AttributeTemplateSlot {
					original: element.get_attribute(&attribute),
					node: element.clone(),
					path,
					attribute,
				});
			}
		}
	}
	Ok(if slots.is_empty() { None } else { Some(slots) })
}

/// A named behaviour.
pub enum Behavior<N: DomNode> {
	/// Computes the value projected into slots of the same name during render (called without event),
	/// and handles the default DOM event of `on`, `in` and `inout` targets of the same name.
	Action(Action<N>),
	/// Handlers for explicitly named DOM events on `on`, `in` and `inout` targets.
	Events(Vec<(String, Action<N>)>),
	/// Computes the value of `out:` attribute slots from the data, the current attribute value and the node.
	Attribute(AttributeAction<N>),
}

impl<N: DomNode> Clone for Behavior<N> {
	fn clone(&self) -> Self {
		match self {
			Behavior::Action(action) => Behavior::Action(action.clone()),
			Behavior::Events(events) => Behavior::Events(events.clone()),
			Behavior::Attribute(action) => Behavior::Attribute(action.clone()),
		}
	}
}

impl<N: DomNode> Debug for Behavior<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Behavior::Action(_) => f.write_str("Action"),
			Behavior::Events(events) => f.debug_tuple("Events").field(&events.iter().map(|(name, _)| name).collect::<Vec<_>>()).finish(),
			Behavior::Attribute(_) => f.write_str("Attribute"),
		}
	}
}

impl<N: DomNode> Behavior<N> {
	pub fn action(action: impl Fn(&Instance<N>, &Value<N>, Option<&N::Event>) -> Value<N> + 'static) -> Self {
		Behavior::Action(Rc::new(action))
	}

	/// An empty event handler map, to be filled with [`Behavior::event`].
	#[must_use]
	pub fn events() -> Self {
		Behavior::Events(Vec::new())
	}

	/// Adds a handler for DOM events named `name`.
	///
	/// An action or attribute behaviour is replaced.
	#[must_use]
	pub fn event(self, name: &str, handler: impl Fn(&Instance<N>, &Value<N>, &N::Event) + 'static) -> Self {
		let mut events = match self {
			Behavior::Events(events) => events,
			Behavior::Action(_) | Behavior::Attribute(_) => {
				warn!("Replacing a value behaviour with event handlers.");
				Vec::new()
			}
		};
		let action: Action<N> = Rc::new(move |instance: &Instance<N>, data: &Value<N>, event: Option<&N::Event>| {
			if let Some(event) = event {
				handler(instance, data, event);
			}
			Value::Null
		});
		events.push((name.to_owned(), action));
		Behavior::Events(events)
	}

	pub fn attribute(action: impl Fn(&Instance<N>, &Value<N>, Option<&str>, &N) -> Value<N> + 'static) -> Self {
		Behavior::Attribute(Rc::new(action))
	}
}

/// A compiled template. Immutable once built.
pub struct Template<N: DomNode> {
	pub(crate) nodes: Vec<N>,
	pub(crate) on: Option<SlotMap<TemplateSlot<N>>>,
	pub(crate) in_: Option<SlotMap<TemplateSlot<N>>>,
	pub(crate) out: Option<SlotMap<TemplateSlot<N>>>,
	pub(crate) inout: Option<SlotMap<TemplateSlot<N>>>,
	pub(crate) refs: Option<SlotMap<TemplateSlot<N>>>,
	pub(crate) when: Option<SlotMap<TemplateSlot<N>>>,
	pub(crate) out_attr: Option<SlotMap<AttributeTemplateSlot<N>>>,
	pub(crate) behavior: IndexMap<String, Behavior<N>>,
	pub(crate) initializer: Option<Initializer<N>>,
	pub(crate) subs: IndexMap<String, Vec<SubHandler<N>>>,
}

impl<N: DomNode> Debug for Template<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Template")
			.field("nodes", &self.nodes.len())
			.field("on", &self.on)
			.field("in", &self.in_)
			.field("out", &self.out)
			.field("inout", &self.inout)
			.field("ref", &self.refs)
			.field("when", &self.when)
			.field("out_attr", &self.out_attr)
			.field("behavior", &self.behavior)
			.field("subs", &self.subs.keys().collect::<Vec<_>>())
			.finish()
	}
}

impl<N: DomNode> Template<N> {
	pub fn builder(nodes: Vec<N>) -> TemplateBuilder<N> {
		TemplateBuilder::new(nodes)
	}

	/// The template's root nodes, with marker attributes removed.
	#[must_use]
	pub fn nodes(&self) -> &[N] {
		&self.nodes
	}

	/// Whether the template has no content or attribute slots and so renders data as text of its first element.
	#[must_use]
	pub fn is_leaf(&self) -> bool {
		self.out.is_none() && self.inout.is_none() && self.in_.is_none() && self.out_attr.is_none()
	}

	/// The slot maps whose targets get event bindings.
	pub(crate) fn event_slots(&self) -> impl Iterator<Item = &SlotMap<TemplateSlot<N>>> {
		[&self.on, &self.in_, &self.inout].into_iter().flatten()
	}

	/// Creates a new [`Instance`] of this template.
	///
	/// # Errors
	///
	/// Iff the template nodes can't be cloned.
	pub fn new_instance(self: &Rc<Self>, parent: Option<&Instance<N>>) -> Result<Instance<N>, Error> {
		Instance::new(self, parent)
	}
}

/// Assembles a [`Template`]'s configuration before compiling it.
pub struct TemplateBuilder<N: DomNode> {
	nodes: Vec<N>,
	behavior: IndexMap<String, Behavior<N>>,
	initializer: Option<Initializer<N>>,
	subs: IndexMap<String, Vec<SubHandler<N>>>,
}

impl<N: DomNode> TemplateBuilder<N> {
	#[must_use]
	pub fn new(nodes: Vec<N>) -> Self {
		Self {
			nodes,
			behavior: IndexMap::new(),
			initializer: None,
			subs: IndexMap::new(),
		}
	}

	/// Merges `behavior` into the behaviour map. Later entries override earlier ones of the same name.
	#[must_use]
	pub fn does<S: Into<String>>(mut self, behavior: impl IntoIterator<Item = (S, Behavior<N>)>) -> Self {
		self.behavior.extend(behavior.into_iter().map(|(name, behavior)| (name.into(), behavior)));
		self
	}

	#[must_use]
	pub fn behavior(mut self, name: &str, behavior: Behavior<N>) -> Self {
		self.behavior.insert(name.to_owned(), behavior);
		self
	}

	/// Shorthand for [`Behavior::action`].
	#[must_use]
	pub fn action(self, name: &str, action: impl Fn(&Instance<N>, &Value<N>, Option<&N::Event>) -> Value<N> + 'static) -> Self {
		self.behavior(name, Behavior::action(action))
	}

	/// Subscribes `handler` to events named `event` that reach instances of this template.
	#[must_use]
	pub fn sub<R: Into<Propagation>>(mut self, event: &str, handler: impl Fn(&Instance<N>, &Value<N>, &UiEvent<N>) -> R + 'static) -> Self {
		let handler: SubHandler<N> = Rc::new(move |instance: &Instance<N>, data: &Value<N>, event: &UiEvent<N>| handler(instance, data, event).into());
		self.subs.entry(event.to_owned()).or_default().push(handler);
		self
	}

	/// Alias of [`TemplateBuilder::sub`].
	#[must_use]
	pub fn on<R: Into<Propagation>>(self, event: &str, handler: impl Fn(&Instance<N>, &Value<N>, &UiEvent<N>) -> R + 'static) -> Self {
		self.sub(event, handler)
	}

	#[must_use]
	pub fn sub_all<S: Into<String>>(mut self, handlers: impl IntoIterator<Item = (S, SubHandler<N>)>) -> Self {
		for (event, handler) in handlers {
			self.subs.entry(event.into()).or_default().push(handler);
		}
		self
	}

	/// Sets the state initializer, called once per instance.
	///
	/// Reactives among the entries of a returned dict re-render the instance when they change.
	#[must_use]
	pub fn init(mut self, initializer: impl Fn() -> Value<N> + 'static) -> Self {
		self.initializer = Some(Rc::new(initializer));
		self
	}

	/// Compiles the template, removing marker attributes from its nodes.
	///
	/// # Errors
	///
	/// Iff a `when` expression is malformed or the DOM rejects attribute removal.
	#[instrument(skip(self), fields(nodes = self.nodes.len()))]
	pub fn build(self) -> Result<Component<N>, Error> {
		let roots = &self.nodes;
		let template = Template {
			on: find_slots("on", roots)?,
			in_: find_slots("in", roots)?,
			out: find_slots("out", roots)?,
			inout: find_slots("inout", roots)?,
			refs: find_slots("ref", roots)?,
			when: find_slots("when", roots)?,
			out_attr: find_attribute_slots("out:", roots)?,
			nodes: self.nodes,
			behavior: self.behavior,
			initializer: self.initializer,
			subs: self.subs,
		};
		for name in template.behavior.keys() {
			let known = [&template.on, &template.in_, &template.out, &template.inout]
				.into_iter()
				.flatten()
				.any(|slots| slots.contains_key(name))
				|| template.out_attr.as_ref().map_or(false, |slots| slots.contains_key(name));
			if !known {
				warn!("Behaviour {:?} has no matching slot.", name);
			}
		}
		Ok(Component(Rc::new(template)))
	}
}

/// A template paired with the data it should render, for placement in a content slot.
pub struct Applied<N: DomNode> {
	template: Rc<Template<N>>,
	data: Box<Value<N>>,
}

impl<N: DomNode> Applied<N> {
	#[must_use]
	pub fn new(template: Rc<Template<N>>, data: Value<N>) -> Self {
		Self { template, data: Box::new(data) }
	}

	#[must_use]
	pub fn template(&self) -> &Rc<Template<N>> {
		&self.template
	}

	#[must_use]
	pub fn data(&self) -> &Value<N> {
		&self.data
	}
}

impl<N: DomNode> Clone for Applied<N> {
	fn clone(&self) -> Self {
		Self {
			template: self.template.clone(),
			data: self.data.clone(),
		}
	}
}

impl<N: DomNode> PartialEq for Applied<N> {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.template, &other.template) && self.data == other.data
	}
}

impl<N: DomNode> Debug for Applied<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Applied")
			.field("template", &Rc::as_ptr(&self.template))
			.field("data", &self.data)
			.finish()
	}
}

/// A compiled template, ready to be instantiated or applied to data.
pub struct Component<N: DomNode>(Rc<Template<N>>);

impl<N: DomNode> Clone for Component<N> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<N: DomNode> Debug for Component<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Component").field(&self.0).finish()
	}
}

impl<N: DomNode> Component<N> {
	#[must_use]
	pub fn template(&self) -> &Rc<Template<N>> {
		&self.0
	}

	/// Creates a new [`Instance`] with an optional parent for event propagation.
	///
	/// # Errors
	///
	/// Iff the template nodes can't be cloned.
	pub fn new(&self, parent: Option<&Instance<N>>) -> Result<Instance<N>, Error> {
		Instance::new(&self.0, parent)
	}

	/// Marks `data` to be rendered with this template wherever it is placed into a content slot.
	#[must_use]
	pub fn apply(&self, data: impl Into<Value<N>>) -> Value<N> {
		Value::Applied(Applied::new(self.0.clone(), data.into()))
	}

	/// Like [`Component::apply`], but for each item of a list or dict.
	#[must_use]
	pub fn map(&self, data: &Value<N>) -> Value<N> {
		data.remap(|item, _| self.apply(item.clone()))
	}
}

/// Where template nodes come from.
#[derive(Debug, Clone)]
pub enum Source<N: DomNode> {
	Selector(String),
	Html(String),
	Node(N),
	Nodes(Vec<N>),
}

impl<N: DomNode> From<&str> for Source<N> {
	/// Markup if the text starts with `<` (after whitespace), otherwise a selector.
	fn from(text: &str) -> Self {
		if text.trim_start().starts_with('<') {
			Source::Html(text.to_owned())
		} else {
			Source::Selector(text.to_owned())
		}
	}
}

impl<N: DomNode> From<Vec<N>> for Source<N> {
	fn from(nodes: Vec<N>) -> Self {
		Source::Nodes(nodes)
	}
}

/// `<template>` elements stand for their content.
fn unwrap_templates<N: DomNode>(nodes: impl IntoIterator<Item = N>) -> Vec<N> {
	nodes.into_iter().flat_map(|node| node.template_content().unwrap_or_else(|| vec![node])).collect()
}

/// Starts a template from `source`.
///
/// # Errors
///
/// [`Error::EmptySelection`] iff a selector matches nothing, [`Error::Dom`] iff querying or parsing fails.
pub fn ui<D: Document>(document: &D, source: impl Into<Source<D::Node>>) -> Result<TemplateBuilder<D::Node>, Error> {
	let nodes = match source.into() {
		Source::Selector(selector) => {
			let nodes = document.query_selector_all(&selector)?;
			if nodes.is_empty() {
				return Err(Error::EmptySelection(selector));
			}
			unwrap_templates(nodes)
		}
		Source::Html(html) => unwrap_templates(document.parse_html(&html)?),
		Source::Node(node) => unwrap_templates([node]),
		Source::Nodes(nodes) => unwrap_templates(nodes),
	};
	Ok(TemplateBuilder::new(nodes))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mem::{self, Node};

	fn roots(html: &str) -> Vec<Node> {
		mem::parse_fragment(html).unwrap()
	}

	#[test]
	fn finds_slots_in_document_order_and_strips_markers() {
		let roots = roots(r#"<div out="a"><span out="b"></span><p out="a"></p></div><i out="b"></i>"#);
		let slots = find_slots("out", &roots).unwrap().unwrap();
		assert_eq!(slots.keys().collect::<Vec<_>>(), ["a", "b"]);
		assert_eq!(slots["a"].iter().map(|s| s.path.clone()).collect::<Vec<_>>(), [vec![0_usize], vec![0, 1]]);
		assert_eq!(slots["b"].iter().map(|s| s.path.clone()).collect::<Vec<_>>(), [vec![0_usize, 0], vec![1]]);
		assert_eq!(roots[0].outer_html(), "<div><span></span><p></p></div>");
	}

	#[test]
	fn no_match_is_none() {
		assert!(find_slots("in", &roots("<div></div>")).unwrap().is_none());
		assert!(find_attribute_slots("out:", &roots("<div out='x'></div>")).unwrap().is_none());
	}

	#[test]
	fn attribute_slots_keep_original_values() {
		let roots = roots(r#"<div class="foo" out:class="state" out:title></div>"#);
		let slots = find_attribute_slots("out:", &roots).unwrap().unwrap();
		assert_eq!(slots["state"][0].attribute, "class");
		assert_eq!(slots["state"][0].original.as_deref(), Some("foo"));
		assert_eq!(slots["title"][0].attribute, "title");
		assert_eq!(slots["title"][0].original, None);
		assert_eq!(roots[0].outer_html(), r#"<div class="foo"></div>"#);
	}

	#[test]
	fn malformed_when_fails_to_build() {
		let result = Template::builder(roots("<p when='data.x &&'></p>")).build();
		assert!(matches!(result, Err(Error::Predicate { .. })));
	}

	#[test]
	fn sources() {
		let document = mem::Document::from_html(r#"<template id="t"><li out="x"></li></template><p class="c"></p>"#).unwrap();
		assert_eq!(ui(&document, "#t").unwrap().build().unwrap().template().nodes()[0].node_name(), "LI");
		let nodes = ui(&document, "  <b></b><i></i>").unwrap().build().unwrap().template().nodes().to_vec();
		assert_eq!(nodes.iter().map(DomNode::node_name).collect::<Vec<_>>(), ["#text", "B", "I"]);
		assert!(matches!(ui(&document, ".missing"), Err(Error::EmptySelection(_))));
	}
}
