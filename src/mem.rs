//! An in-memory DOM.
//!
//! Nodes are reference-counted and compare by identity, like browser nodes.
//! Events are synthetic: [`Node::dispatch`] bubbles from the target up through its ancestors.

mod html;
mod select;

use crate::{
	dom::{self, DomNode, NodeKind},
	error::DomError,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use std::rc::{Rc, Weak};
use tracing::trace;

pub use html::parse_fragment;
use select::Selectors;

const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr"];

enum Data {
	Element {
		name: String,
		attributes: Vec<(String, String)>,
		/// The `value` property of input-like elements, once set.
		value: Option<String>,
		/// The content fragment of `<template>` elements.
		content: Option<Node>,
	},
	Text(String),
	Comment(String),
	Fragment,
}

type Handler = Rc<dyn Fn(&Event)>;

struct Inner {
	data: Data,
	parent: Weak<RefCell<Inner>>,
	children: Vec<Node>,
	listeners: Vec<(u64, String, Handler)>,
	next_listener: u64,
}

#[derive(Clone)]
pub struct Node(Rc<RefCell<Inner>>);

impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for Node {}

impl Debug for Node {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let inner = match self.0.try_borrow() {
			Ok(inner) => inner,
			Err(_) => return f.write_str("<node (borrowed)>"),
		};
		match &inner.data {
			Data::Element { name, .. } => write!(f, "<{}>", name),
			Data::Text(text) => write!(f, "#text {:?}", text),
			Data::Comment(comment) => write!(f, "<!--{}-->", comment),
			Data::Fragment => f.write_str("#document-fragment"),
		}
	}
}

/// A synthetic event.
#[derive(Debug, Clone)]
pub struct Event {
	pub kind: String,
	pub target: Node,
	pub current_target: Node,
}

/// Removes its listener when dropped.
pub struct Listener {
	node: Weak<RefCell<Inner>>,
	id: u64,
}

impl Drop for Listener {
	fn drop(&mut self) {
		if let Some(node) = self.node.upgrade() {
			node.borrow_mut().listeners.retain(|(id, _, _)| *id != self.id);
		}
	}
}

impl Debug for Listener {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Listener").field("id", &self.id).finish()
	}
}

impl Node {
	fn new(data: Data) -> Self {
		Self(Rc::new(RefCell::new(Inner {
			data,
			parent: Weak::new(),
			children: Vec::new(),
			listeners: Vec::new(),
			next_listener: 0,
		})))
	}

	#[must_use]
	pub fn element(name: &str) -> Self {
		let name = name.to_ascii_lowercase();
		let content = if name == "template" { Some(Node::fragment()) } else { None };
		Self::new(Data::Element {
			name,
			attributes: Vec::new(),
			value: None,
			content,
		})
	}

	#[must_use]
	pub fn text(text: &str) -> Self {
		Self::new(Data::Text(text.to_owned()))
	}

	#[must_use]
	pub fn comment(comment: &str) -> Self {
		Self::new(Data::Comment(comment.to_owned()))
	}

	#[must_use]
	pub fn fragment() -> Self {
		Self::new(Data::Fragment)
	}

	/// Where parsed children of this node go: the content fragment for `<template>`, else the node itself.
	fn child_container(&self) -> Node {
		match &self.0.borrow().data {
			Data::Element { content: Some(content), .. } => content.clone(),
			_ => self.clone(),
		}
	}

	fn is_inclusive_ancestor_of(&self, other: &Node) -> bool {
		let mut current = Some(other.clone());
		while let Some(node) = current {
			if &node == self {
				return true;
			}
			current = node.parent_node();
		}
		false
	}

	fn index_of(&self, child: &Node) -> Option<usize> {
		self.0.borrow().children.iter().position(|c| c == child)
	}

	fn unlink(&self) {
		if let Some(parent) = self.parent_node() {
			parent.0.borrow_mut().children.retain(|c| c != self);
		}
		self.0.borrow_mut().parent = Weak::new();
	}

	/// Dispatches a bubbling event of type `kind` at this node.
	///
	/// Returns the number of listeners that ran.
	pub fn dispatch(&self, kind: &str) -> usize {
		let mut count = 0;
		let mut current = Some(self.clone());
		while let Some(node) = current {
			let handlers: Vec<Handler> = node.0.borrow().listeners.iter().filter(|(_, k, _)| k == kind).map(|(_, _, h)| h.clone()).collect();
			for handler in handlers {
				handler(&Event {
					kind: kind.to_owned(),
					target: self.clone(),
					current_target: node.clone(),
				});
				count += 1;
			}
			current = node.parent_node();
		}
		trace!("Dispatched {:?} to {} listener(s).", kind, count);
		count
	}

	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.0.borrow().listeners.len()
	}

	/// Serializes this node and its descendants.
	#[must_use]
	pub fn outer_html(&self) -> String {
		let mut out = String::new();
		self.write_html(&mut out);
		out
	}

	#[must_use]
	pub fn inner_html(&self) -> String {
		let mut out = String::new();
		for child in self.child_container().child_nodes() {
			child.write_html(&mut out);
		}
		out
	}

	fn write_html(&self, out: &mut String) {
		let inner = self.0.borrow();
		match &inner.data {
			Data::Element { name, attributes, content, .. } => {
				out.push('<');
				out.push_str(name);
				for (attribute, value) in attributes {
					out.push(' ');
					out.push_str(attribute);
					if !value.is_empty() {
						out.push_str("=\"");
						out.push_str(&escape(value, true));
						out.push('"');
					}
				}
				out.push('>');
				if VOID_ELEMENTS.contains(&name.as_str()) {
					return;
				}
				let children = match content {
					Some(content) => content.child_nodes(),
					None => inner.children.clone(),
				};
				for child in children {
					child.write_html(out);
				}
				out.push_str("</");
				out.push_str(name);
				out.push('>');
			}
			Data::Text(text) => out.push_str(&escape(text, false)),
			Data::Comment(comment) => {
				out.push_str("<!--");
				out.push_str(comment);
				out.push_str("-->");
			}
			Data::Fragment => {
				for child in &inner.children {
					child.write_html(out);
				}
			}
		}
	}
}

fn escape(text: &str, attribute: bool) -> String {
	let mut result = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => result.push_str("&amp;"),
			'<' => result.push_str("&lt;"),
			'>' => result.push_str("&gt;"),
			'"' if attribute => result.push_str("&quot;"),
			c => result.push(c),
		}
	}
	result
}

impl DomNode for Node {
	type Event = Event;
	type Listener = Listener;

	fn kind(&self) -> NodeKind {
		match self.0.borrow().data {
			Data::Element { .. } => NodeKind::Element,
			Data::Text(_) => NodeKind::Text,
			Data::Comment(_) => NodeKind::Comment,
			Data::Fragment => NodeKind::Other,
		}
	}

	fn node_name(&self) -> String {
		match &self.0.borrow().data {
			Data::Element { name, .. } => name.to_ascii_uppercase(),
			Data::Text(_) => "#text".to_owned(),
			Data::Comment(_) => "#comment".to_owned(),
			Data::Fragment => "#document-fragment".to_owned(),
		}
	}

	fn child_nodes(&self) -> Vec<Self> {
		self.0.borrow().children.clone()
	}

	fn parent_node(&self) -> Option<Self> {
		self.0.borrow().parent.upgrade().map(Node)
	}

	fn next_sibling(&self) -> Option<Self> {
		let parent = self.parent_node()?;
		let index = parent.index_of(self)?;
		let sibling = parent.0.borrow().children.get(index + 1).cloned();
		sibling
	}

	fn clone_deep(&self) -> Result<Self, DomError> {
		let inner = self.0.borrow();
		let data = match &inner.data {
			Data::Element { name, attributes, value, content } => Data::Element {
				name: name.clone(),
				attributes: attributes.clone(),
				value: value.clone(),
				content: match content {
					Some(content) => Some(content.clone_deep()?),
					None => None,
				},
			},
			Data::Text(text) => Data::Text(text.clone()),
			Data::Comment(comment) => Data::Comment(comment.clone()),
			Data::Fragment => Data::Fragment,
		};
		let clone = Node::new(data);
		for child in &inner.children {
			let child = child.clone_deep()?;
			child.0.borrow_mut().parent = Rc::downgrade(&clone.0);
			clone.0.borrow_mut().children.push(child);
		}
		Ok(clone)
	}

	fn insert_before(&self, child: &Self, reference: Option<&Self>) -> Result<(), DomError> {
		if child.is_inclusive_ancestor_of(self) {
			return Err(DomError("HierarchyRequestError: the new child is an ancestor of the parent".to_owned()));
		}
		if let Some(reference) = reference {
			if reference.parent_node().as_ref() != Some(self) {
				return Err(DomError("NotFoundError: the reference node is not a child of this node".to_owned()));
			}
			if reference == child {
				return Ok(());
			}
		}
		child.unlink();
		let index = match reference {
			Some(reference) => self.index_of(reference).ok_or_else(|| DomError("NotFoundError: reference node vanished".to_owned()))?,
			None => self.0.borrow().children.len(),
		};
		self.0.borrow_mut().children.insert(index, child.clone());
		child.0.borrow_mut().parent = Rc::downgrade(&self.0);
		Ok(())
	}

	fn remove_child(&self, child: &Self) -> Result<(), DomError> {
		if child.parent_node().as_ref() != Some(self) {
			return Err(DomError("NotFoundError: the node to be removed is not a child of this node".to_owned()));
		}
		child.unlink();
		Ok(())
	}

	fn replace_child(&self, new_child: &Self, old_child: &Self) -> Result<(), DomError> {
		if old_child.parent_node().as_ref() != Some(self) {
			return Err(DomError("NotFoundError: the node to be replaced is not a child of this node".to_owned()));
		}
		if new_child == old_child {
			return Ok(());
		}
		self.insert_before(new_child, Some(old_child))?;
		old_child.unlink();
		Ok(())
	}

	fn attribute_names(&self) -> Vec<String> {
		match &self.0.borrow().data {
			Data::Element { attributes, .. } => attributes.iter().map(|(name, _)| name.clone()).collect(),
			_ => Vec::new(),
		}
	}

	fn get_attribute(&self, name: &str) -> Option<String> {
		match &self.0.borrow().data {
			Data::Element { attributes, .. } => attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()),
			_ => None,
		}
	}

	fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
		match &mut self.0.borrow_mut().data {
			Data::Element { attributes, .. } => {
				match attributes.iter_mut().find(|(n, _)| n == name) {
					Some((_, v)) => *v = value.to_owned(),
					None => attributes.push((name.to_owned(), value.to_owned())),
				}
				Ok(())
			}
			_ => Err(DomError(format!("Cannot set attribute {:?} on a non-element node", name))),
		}
	}

	fn remove_attribute(&self, name: &str) -> Result<(), DomError> {
		if let Data::Element { attributes, .. } = &mut self.0.borrow_mut().data {
			attributes.retain(|(n, _)| n != name);
		}
		Ok(())
	}

	fn text_content(&self) -> String {
		match &self.0.borrow().data {
			Data::Text(text) | Data::Comment(text) => text.clone(),
			Data::Element { .. } | Data::Fragment => self.0.borrow().children.iter().filter(|c| c.kind() != NodeKind::Comment).map(DomNode::text_content).collect(),
		}
	}

	fn set_text_content(&self, text: &str) {
		match self.kind() {
			NodeKind::Text | NodeKind::Comment => self.set_character_data(text),
			NodeKind::Element | NodeKind::Other => {
				for child in self.child_nodes() {
					child.unlink();
				}
				if !text.is_empty() {
					let node = Node::text(text);
					node.0.borrow_mut().parent = Rc::downgrade(&self.0);
					self.0.borrow_mut().children.push(node);
				}
			}
		}
	}

	fn set_character_data(&self, text: &str) {
		match &mut self.0.borrow_mut().data {
			Data::Text(data) | Data::Comment(data) => *data = text.to_owned(),
			_ => (),
		}
	}

	fn input_value(&self) -> Option<String> {
		if !dom::is_input_like(self) {
			return None;
		}
		let property = match &self.0.borrow().data {
			Data::Element { value, .. } => value.clone(),
			_ => None,
		};
		property.or_else(|| {
			if self.node_name() == "TEXTAREA" {
				Some(self.text_content())
			} else {
				Some(self.get_attribute("value").unwrap_or_default())
			}
		})
	}

	fn set_input_value(&self, text: &str) {
		if let Data::Element { value, .. } = &mut self.0.borrow_mut().data {
			*value = Some(text.to_owned());
		}
	}

	fn create_text(&self, text: &str) -> Result<Self, DomError> {
		Ok(Node::text(text))
	}

	fn create_comment(&self, text: &str) -> Result<Self, DomError> {
		Ok(Node::comment(text))
	}

	fn add_event_listener(&self, event: &str, handler: Rc<dyn Fn(&Self::Event)>) -> Result<Self::Listener, DomError> {
		let mut inner = self.0.borrow_mut();
		let id = inner.next_listener;
		inner.next_listener += 1;
		inner.listeners.push((id, event.to_owned(), handler));
		Ok(Listener { node: Rc::downgrade(&self.0), id })
	}

	fn template_content(&self) -> Option<Vec<Self>> {
		match &self.0.borrow().data {
			Data::Element { content: Some(content), .. } => Some(content.child_nodes()),
			_ => None,
		}
	}
}

/// A detached document root for the in-memory backend.
#[derive(Debug, Clone)]
pub struct Document {
	root: Node,
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}

impl Document {
	#[must_use]
	pub fn new() -> Self {
		Self { root: Node::fragment() }
	}

	/// Creates a document whose root holds the parsed `html`.
	pub fn from_html(html: &str) -> Result<Self, DomError> {
		let document = Self::new();
		for node in parse_fragment(html)? {
			document.root.append_child(&node)?;
		}
		Ok(document)
	}

	#[must_use]
	pub fn root(&self) -> &Node {
		&self.root
	}
}

impl dom::Document for Document {
	type Node = Node;

	fn query_selector_all(&self, selector: &str) -> Result<Vec<Node>, DomError> {
		let selectors = Selectors::parse(selector)?;
		let mut found = Vec::new();
		for child in self.root.child_nodes() {
			for element in dom::elements_in_order(&child) {
				if selectors.matches(&element) {
					found.push(element);
				}
			}
		}
		Ok(found)
	}

	fn parse_html(&self, html: &str) -> Result<Vec<Node>, DomError> {
		parse_fragment(html)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::Document as _;

	#[test]
	fn insert_moves_node() {
		let a = Node::element("div");
		let b = Node::element("div");
		let child = Node::text("x");
		a.append_child(&child).unwrap();
		b.append_child(&child).unwrap();
		assert!(a.child_nodes().is_empty());
		assert_eq!(child.parent_node(), Some(b.clone()));
		assert!(b.append_child(&b).is_err());
	}

	#[test]
	fn listener_is_removed_on_drop() {
		let button = Node::element("button");
		let listener = button.add_event_listener("click", Rc::new(|_: &Event| ())).unwrap();
		assert_eq!(button.dispatch("click"), 1);
		drop(listener);
		assert_eq!(button.dispatch("click"), 0);
	}

	#[test]
	fn events_bubble() {
		let document = Document::from_html("<ul><li><b>x</b></li></ul>").unwrap();
		let ul = document.query_selector("ul").unwrap().unwrap();
		let b = document.query_selector("b").unwrap().unwrap();
		let _listener = ul.add_event_listener("click", Rc::new(|event: &Event| assert_eq!(event.target.node_name(), "B"))).unwrap();
		assert_eq!(b.dispatch("click"), 1);
	}

	#[test]
	fn selectors() {
		let document = Document::from_html(r#"<div id="a" class="x y"><p class="y" data-k="1"></p></div><p></p>"#).unwrap();
		assert_eq!(document.query_selector_all("p").unwrap().len(), 2);
		assert_eq!(document.query_selector_all(".y").unwrap().len(), 2);
		assert_eq!(document.query_selector_all("div#a.x").unwrap().len(), 1);
		assert_eq!(document.query_selector_all(r#"[data-k="1"]"#).unwrap().len(), 1);
		assert_eq!(document.query_selector_all("div > p, #a").unwrap().len(), 2);
		assert_eq!(document.query_selector_all("div + p").unwrap().len(), 1);
		assert!(document.query_selector_all("p:hover").is_err());
		assert!(document.query_selector_all("div[").is_err());
	}
}
