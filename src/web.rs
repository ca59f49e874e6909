//! The browser backend.

use crate::{
	dom::{self, DomNode, NodeKind},
	error::DomError,
};
use core::fmt::{self, Debug, Formatter};
use std::rc::Rc;
use tracing::{error, trace};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{CharacterData, Element, EventTarget, HtmlInputElement, HtmlSelectElement, HtmlTemplateElement, HtmlTextAreaElement, Node, NodeList};

fn js_error(error: JsValue) -> DomError {
	DomError(error.as_string().unwrap_or_else(|| format!("{:?}", error)))
}

fn not_an_element(node: &Node) -> DomError {
	DomError(format!("{} is not an element", node.node_name()))
}

fn nodes(list: &NodeList) -> Vec<Node> {
	(0..list.length()).filter_map(|i| list.item(i)).collect()
}

fn owner_document(node: &Node) -> Result<web_sys::Document, DomError> {
	node.owner_document()
		.or_else(|| node.dyn_ref::<web_sys::Document>().cloned())
		.ok_or_else(|| DomError("node has no owner document".to_owned()))
}

/// An event listener registration. Dropping it removes the listener.
pub struct Listener {
	target: EventTarget,
	event: String,
	closure: Closure<dyn Fn(web_sys::Event)>,
}

impl Drop for Listener {
	fn drop(&mut self) {
		if let Err(error) = self.target.remove_event_listener_with_callback(&self.event, self.closure.as_ref().unchecked_ref()) {
			error!("Failed to remove {:?} listener: {:?}", self.event, error);
		} else {
			trace!("Removed {:?} listener.", self.event);
		}
	}
}

impl Debug for Listener {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Listener").field("event", &self.event).finish_non_exhaustive()
	}
}

impl DomNode for Node {
	type Event = web_sys::Event;
	type Listener = Listener;

	fn kind(&self) -> NodeKind {
		match self.node_type() {
			Node::ELEMENT_NODE => NodeKind::Element,
			Node::TEXT_NODE => NodeKind::Text,
			Node::COMMENT_NODE => NodeKind::Comment,
			_ => NodeKind::Other,
		}
	}

	fn node_name(&self) -> String {
		Node::node_name(self)
	}

	fn child_nodes(&self) -> Vec<Self> {
		nodes(&Node::child_nodes(self))
	}

	fn parent_node(&self) -> Option<Self> {
		Node::parent_node(self)
	}

	fn next_sibling(&self) -> Option<Self> {
		Node::next_sibling(self)
	}

	fn first_child(&self) -> Option<Self> {
		Node::first_child(self)
	}

	fn clone_deep(&self) -> Result<Self, DomError> {
		self.clone_node_with_deep(true).map_err(js_error)
	}

	fn insert_before(&self, child: &Self, reference: Option<&Self>) -> Result<(), DomError> {
		Node::insert_before(self, child, reference).map(drop).map_err(js_error)
	}

	fn remove_child(&self, child: &Self) -> Result<(), DomError> {
		Node::remove_child(self, child).map(drop).map_err(js_error)
	}

	fn replace_child(&self, new_child: &Self, old_child: &Self) -> Result<(), DomError> {
		Node::replace_child(self, new_child, old_child).map(drop).map_err(js_error)
	}

	fn attribute_names(&self) -> Vec<String> {
		let names: js_sys::Array = match self.dyn_ref::<Element>() {
			Some(element) => element.get_attribute_names(),
			None => return Vec::new(),
		};
		names.iter().filter_map(|name| name.as_string()).collect()
	}

	fn get_attribute(&self, name: &str) -> Option<String> {
		self.dyn_ref::<Element>()?.get_attribute(name)
	}

	fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
		self.dyn_ref::<Element>().ok_or_else(|| not_an_element(self))?.set_attribute(name, value).map_err(js_error)
	}

	fn remove_attribute(&self, name: &str) -> Result<(), DomError> {
		self.dyn_ref::<Element>().ok_or_else(|| not_an_element(self))?.remove_attribute(name).map_err(js_error)
	}

	fn has_attribute(&self, name: &str) -> bool {
		self.dyn_ref::<Element>().map_or(false, |element| element.has_attribute(name))
	}

	fn text_content(&self) -> String {
		Node::text_content(self).unwrap_or_default()
	}

	fn set_text_content(&self, text: &str) {
		Node::set_text_content(self, Some(text))
	}

	fn set_character_data(&self, text: &str) {
		match self.dyn_ref::<CharacterData>() {
			Some(data) => data.set_data(text),
			None => error!("Cannot set character data of {}.", Node::node_name(self)),
		}
	}

	fn input_value(&self) -> Option<String> {
		if let Some(input) = self.dyn_ref::<HtmlInputElement>() {
			Some(input.value())
		} else if let Some(text_area) = self.dyn_ref::<HtmlTextAreaElement>() {
			Some(text_area.value())
		} else {
			self.dyn_ref::<HtmlSelectElement>().map(HtmlSelectElement::value)
		}
	}

	fn set_input_value(&self, value: &str) {
		if let Some(input) = self.dyn_ref::<HtmlInputElement>() {
			input.set_value(value)
		} else if let Some(text_area) = self.dyn_ref::<HtmlTextAreaElement>() {
			text_area.set_value(value)
		} else if let Some(select) = self.dyn_ref::<HtmlSelectElement>() {
			select.set_value(value)
		} else {
			error!("{} has no value.", Node::node_name(self))
		}
	}

	fn create_text(&self, text: &str) -> Result<Self, DomError> {
		Ok(owner_document(self)?.create_text_node(text).into())
	}

	fn create_comment(&self, text: &str) -> Result<Self, DomError> {
		Ok(owner_document(self)?.create_comment(text).into())
	}

	fn add_event_listener(&self, event: &str, handler: Rc<dyn Fn(&Self::Event)>) -> Result<Self::Listener, DomError> {
		let closure = Closure::wrap(Box::new(move |event: web_sys::Event| handler(&event)) as Box<dyn Fn(web_sys::Event)>);
		let target: &EventTarget = self.as_ref();
		target
			.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
			.map_err(js_error)?;
		Ok(Listener {
			target: target.clone(),
			event: event.to_owned(),
			closure,
		})
	}

	fn template_content(&self) -> Option<Vec<Self>> {
		let template = self.dyn_ref::<HtmlTemplateElement>()?;
		let content: Node = template.content().into();
		Some(nodes(&Node::child_nodes(&content)))
	}
}

impl dom::Document for web_sys::Document {
	type Node = Node;

	fn query_selector_all(&self, selector: &str) -> Result<Vec<Node>, DomError> {
		web_sys::Document::query_selector_all(self, selector).map(|list| nodes(&list)).map_err(js_error)
	}

	fn query_selector(&self, selector: &str) -> Result<Option<Node>, DomError> {
		web_sys::Document::query_selector(self, selector).map(|element| element.map(Into::into)).map_err(js_error)
	}

	/// Parses `html` as the content of a `<template>` element, so the nodes are inert and detached.
	fn parse_html(&self, html: &str) -> Result<Vec<Node>, DomError> {
		let template = self.create_element("template").map_err(js_error)?.dyn_into::<HtmlTemplateElement>().map_err(|element| js_error(element.into()))?;
		template.set_inner_html(html);
		let content: Node = template.content().into();
		let parsed = nodes(&Node::child_nodes(&content));
		for node in &parsed {
			Node::remove_child(&content, node).map_err(js_error)?;
		}
		Ok(parsed)
	}
}
