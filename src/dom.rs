//! The DOM backend seam.
//!
//! Everything above this module only talks to nodes through [`DomNode`] and [`Document`],
//! so templates can be compiled and rendered against the browser ([`crate::web`])
//! as well as against the in-memory tree in [`crate::mem`].

use crate::error::DomError;
use core::fmt::Debug;
use std::rc::Rc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
	Element,
	Text,
	Comment,
	Other,
}

/// Child indices leading from a template root to a node.
///
/// The first index selects the root within the root list, the rest walk [`DomNode::child_nodes`].
pub type Path = Vec<usize>;

/// A handle to a live DOM node.
///
/// Handles are cheap to clone and compare by identity.
pub trait DomNode: Clone + PartialEq + Debug + 'static {
	/// The event value passed to listeners.
	type Event: Clone + Debug + 'static;
	/// Keeps a listener registered. Dropping it removes the listener again.
	type Listener: 'static;

	fn kind(&self) -> NodeKind;
	/// The node name as reported by the DOM, i.e. upper case for HTML elements.
	fn node_name(&self) -> String;
	fn child_nodes(&self) -> Vec<Self>;
	fn parent_node(&self) -> Option<Self>;
	fn next_sibling(&self) -> Option<Self>;

	fn first_child(&self) -> Option<Self> {
		self.child_nodes().into_iter().next()
	}

	/// Deep clone. Listeners are not cloned.
	fn clone_deep(&self) -> Result<Self, DomError>;
	fn insert_before(&self, child: &Self, reference: Option<&Self>) -> Result<(), DomError>;

	fn append_child(&self, child: &Self) -> Result<(), DomError> {
		self.insert_before(child, None)
	}

	fn remove_child(&self, child: &Self) -> Result<(), DomError>;
	fn replace_child(&self, new_child: &Self, old_child: &Self) -> Result<(), DomError>;

	fn attribute_names(&self) -> Vec<String>;
	fn get_attribute(&self, name: &str) -> Option<String>;
	fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError>;
	fn remove_attribute(&self, name: &str) -> Result<(), DomError>;

	fn has_attribute(&self, name: &str) -> bool {
		self.get_attribute(name).is_some()
	}

	fn text_content(&self) -> String;
	fn set_text_content(&self, text: &str);
	/// Sets the data of a text or comment node.
	fn set_character_data(&self, text: &str);
	/// The current value of `<input>`, `<textarea>` and `<select>` elements.
	fn input_value(&self) -> Option<String>;
	fn set_input_value(&self, value: &str);

	/// Creates a detached text node in this node's document.
	fn create_text(&self, text: &str) -> Result<Self, DomError>;
	/// Creates a detached comment node in this node's document.
	fn create_comment(&self, text: &str) -> Result<Self, DomError>;

	fn add_event_listener(&self, event: &str, handler: Rc<dyn Fn(&Self::Event)>) -> Result<Self::Listener, DomError>;

	/// For `<template>` elements, the child nodes of their content fragment.
	fn template_content(&self) -> Option<Vec<Self>>;

	/// Removes the node from its parent, if it has one.
	///
	/// Returns whether the node was attached.
	fn detach(&self) -> Result<bool, DomError> {
		match self.parent_node() {
			Some(parent) => parent.remove_child(self).map(|()| true),
			None => Ok(false),
		}
	}
}

/// Where template markup and mount targets come from.
pub trait Document {
	type Node: DomNode;

	fn query_selector_all(&self, selector: &str) -> Result<Vec<Self::Node>, DomError>;

	fn query_selector(&self, selector: &str) -> Result<Option<Self::Node>, DomError> {
		Ok(self.query_selector_all(selector)?.into_iter().next())
	}

	/// Parses an HTML fragment into detached top level nodes.
	fn parse_html(&self, html: &str) -> Result<Vec<Self::Node>, DomError>;
}

/// Walks `path` from `roots`.
///
/// This is a pure function of the tree shape, so a path computed on template nodes resolves
/// to the structurally corresponding node in any deep clone of them.
#[must_use]
pub fn resolve<N: DomNode>(roots: &[N], path: &[usize]) -> Option<N> {
	let (&first, rest) = path.split_first()?;
	let mut node = roots.get(first)?.clone();
	for &i in rest {
		node = node.child_nodes().into_iter().nth(i)?;
	}
	Some(node)
}

/// Computes the child index path from `root` (at `root_index` in its root list) down to `node`.
///
/// Returns [`None`] if `node` is not `root` or one of its descendants.
#[must_use]
pub fn path_to<N: DomNode>(node: &N, root: &N, root_index: usize) -> Option<Path> {
	let mut reversed = Vec::new();
	let mut current = node.clone();
	while &current != root {
		let parent = current.parent_node()?;
		let index = parent.child_nodes().iter().position(|child| child == &current)?;
		reversed.push(index);
		current = parent;
	}
	reversed.push(root_index);
	reversed.reverse();
	Some(reversed)
}

/// All element nodes under and including `root`, in document order.
#[must_use]
pub fn elements_in_order<N: DomNode>(root: &N) -> Vec<N> {
	let mut result = Vec::new();
	let mut stack = vec![root.clone()];
	while let Some(node) = stack.pop() {
		if node.kind() == NodeKind::Element {
			let mut children = node.child_nodes();
			children.reverse();
			stack.extend(children);
			result.push(node);
		}
	}
	result
}

#[must_use]
pub fn is_input_like<N: DomNode>(node: &N) -> bool {
	let name = node.node_name();
	["INPUT", "TEXTAREA", "SELECT"].iter().any(|input| name.eq_ignore_ascii_case(input))
}

/// The DOM event a bare behaviour function is bound to.
#[must_use]
pub fn default_event_for<N: DomNode>(node: &N) -> &'static str {
	let name = node.node_name();
	if is_input_like(node) {
		"input"
	} else if name.eq_ignore_ascii_case("FORM") {
		"submit"
	} else {
		"click"
	}
}

/// Sets the visible text of a node: character data for text nodes, the value of input-like elements
/// (only if it differs, to not disturb the caret) and the text content of other elements.
pub fn set_node_text<N: DomNode>(node: &N, text: &str) {
	match node.kind() {
		NodeKind::Text => node.set_character_data(text),
		NodeKind::Element => {
			if is_input_like(node) {
				if node.input_value().as_deref() != Some(text) {
					node.set_input_value(text)
				}
			} else {
				node.set_text_content(text)
			}
		}
		NodeKind::Comment | NodeKind::Other => warn!("Cannot set text of {:?} node.", node.kind()),
	}
}

/// The class names currently on `node`, in attribute order.
#[must_use]
pub fn classes<N: DomNode>(node: &N) -> Vec<String> {
	node.get_attribute("class").map(|classes| split_classes(&classes)).unwrap_or_default()
}

#[must_use]
pub fn split_classes(classes: &str) -> Vec<String> {
	classes.split_ascii_whitespace().map(str::to_owned).collect()
}

pub fn add_class<N: DomNode>(node: &N, class: &str) -> Result<(), DomError> {
	let mut current = classes(node);
	if current.iter().any(|c| c == class) {
		return Ok(());
	}
	current.push(class.to_owned());
	node.set_attribute("class", &current.join(" "))
}

pub fn remove_class<N: DomNode>(node: &N, class: &str) -> Result<(), DomError> {
	let current = classes(node);
	if !current.iter().any(|c| c == class) {
		return Ok(());
	}
	let remaining: Vec<_> = current.into_iter().filter(|c| c != class).collect();
	node.set_attribute("class", &remaining.join(" "))
}

/// Parses a CSS declaration list such as `color: red; margin-top: 1px`.
///
/// Property names are lower-cased. Empty and malformed declarations are skipped.
#[must_use]
pub fn parse_style(style: &str) -> Vec<(String, String)> {
	style
		.split(';')
		.filter_map(|declaration| {
			let (property, value) = declaration.split_once(':')?;
			let property = property.trim();
			let value = value.trim();
			if property.is_empty() || value.is_empty() {
				None
			} else {
				Some((property.to_ascii_lowercase(), value.to_owned()))
			}
		})
		.collect()
}

#[must_use]
pub fn serialize_style(declarations: &[(String, String)]) -> String {
	declarations.iter().map(|(property, value)| format!("{}: {};", property, value)).collect::<Vec<_>>().join(" ")
}

/// `backgroundColor` → `background-color`. Custom properties (`--x`) are kept as is.
#[must_use]
pub fn kebab_case(property: &str) -> String {
	if property.starts_with("--") {
		return property.to_owned();
	}
	let mut result = String::with_capacity(property.len() + 4);
	for c in property.chars() {
		if c.is_ascii_uppercase() {
			result.push('-');
			result.push(c.to_ascii_lowercase());
		} else {
			result.push(c);
		}
	}
	result
}

pub fn set_style_property<N: DomNode>(node: &N, property: &str, value: &str) -> Result<(), DomError> {
	let mut declarations = parse_style(&node.get_attribute("style").unwrap_or_default());
	match declarations.iter_mut().find(|(p, _)| p == property) {
		Some((_, v)) => *v = value.to_owned(),
		None => declarations.push((property.to_owned(), value.to_owned())),
	}
	node.set_attribute("style", &serialize_style(&declarations))
}

pub fn remove_style_property<N: DomNode>(node: &N, property: &str) -> Result<(), DomError> {
	let style = match node.get_attribute("style") {
		Some(style) => style,
		None => return Ok(()),
	};
	let mut declarations = parse_style(&style);
	let before = declarations.len();
	declarations.retain(|(p, _)| p != property);
	if declarations.len() == before {
		Ok(())
	} else if declarations.is_empty() {
		node.remove_attribute("style")
	} else {
		node.set_attribute("style", &serialize_style(&declarations))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn style_round_trip_keeps_order() {
		let declarations = parse_style(" color : red;; Margin-Top: 1px ;broken");
		assert_eq!(declarations, vec![("color".to_owned(), "red".to_owned()), ("margin-top".to_owned(), "1px".to_owned())]);
		assert_eq!(serialize_style(&declarations), "color: red; margin-top: 1px;");
	}

	#[test]
	fn kebab() {
		assert_eq!(kebab_case("backgroundColor"), "background-color");
		assert_eq!(kebab_case("color"), "color");
		assert_eq!(kebab_case("--mainColor"), "--mainColor");
	}
}
