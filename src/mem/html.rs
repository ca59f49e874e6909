use super::Node;
use crate::{dom::DomNode, error::DomError};
use html5ever::{parse_document, tendril::TendrilSink, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use tracing::{trace, warn};

/// Parses an HTML fragment into detached top level nodes.
///
/// The markup is parsed as the content of a `<template>` element, the way browsers parse `template.innerHTML`,
/// so table parts and other context sensitive elements keep their structure.
/// `<template>` children are placed into the template's content fragment.
pub fn parse_fragment(html: &str) -> Result<Vec<Node>, DomError> {
	let dom = parse_document(RcDom::default(), ParseOpts::default()).one(format!("<template>{}</template>", html));
	let wrapper = find_template(&dom.document).ok_or_else(|| DomError("Failed to parse HTML fragment".to_owned()))?;
	if body_has_content(&dom.document) {
		warn!("Markup after an unmatched </template> was dropped.");
	}

	let content = match &wrapper.data {
		NodeData::Element { template_contents, .. } => template_contents.borrow().clone(),
		_ => None,
	};
	let mut roots = Vec::new();
	if let Some(content) = content {
		for child in content.children.borrow().iter() {
			if let Some(node) = convert(child)? {
				roots.push(node);
			}
		}
	}
	trace!("Parsed {} top level node(s).", roots.len());
	Ok(roots)
}

fn is_element(handle: &Handle, local: &str) -> bool {
	matches!(&handle.data, NodeData::Element { name, .. } if &*name.local == local)
}

/// The wrapping `<template>` is the first one in document order. It always lands in `<head>`.
fn find_template(handle: &Handle) -> Option<Handle> {
	if is_element(handle, "template") {
		return Some(handle.clone());
	}
	handle.children.borrow().iter().find_map(find_template)
}

fn body_has_content(document: &Handle) -> bool {
	document.children.borrow().iter().filter(|child| is_element(child, "html")).any(|html| {
		html.children.borrow().iter().filter(|child| is_element(child, "body")).any(|body| !body.children.borrow().is_empty())
	})
}

fn convert(handle: &Handle) -> Result<Option<Node>, DomError> {
	let node = match &handle.data {
		NodeData::Element { name, attrs, template_contents, .. } => {
			let element = Node::element(&name.local);
			for attribute in attrs.borrow().iter() {
				let local = &attribute.name.local;
				match &attribute.name.prefix {
					Some(prefix) => element.set_attribute(&format!("{}:{}", prefix, local), &attribute.value)?,
					None => element.set_attribute(local, &attribute.value)?,
				}
			}
			let children = match template_contents.borrow().as_ref() {
				Some(content) => content.children.borrow().clone(),
				None => handle.children.borrow().clone(),
			};
			let container = element.child_container();
			for child in &children {
				if let Some(child) = convert(child)? {
					container.append_child(&child)?;
				}
			}
			element
		}
		NodeData::Text { contents } => Node::text(&contents.borrow()),
		NodeData::Comment { contents } => Node::comment(contents),
		NodeData::Document | NodeData::Doctype { .. } | NodeData::ProcessingInstruction { .. } => return Ok(None),
	};
	Ok(Some(node))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nested_elements_and_attributes() {
		let nodes = parse_fragment(r#"<ul class="list"><li out="item" disabled>a &amp; b</li><br><li data-x=1 /></ul>"#).unwrap();
		assert_eq!(nodes.len(), 1);
		let ul = &nodes[0];
		assert_eq!(ul.node_name(), "UL");
		let children = ul.child_nodes();
		assert_eq!(children.len(), 3);
		assert_eq!(children[0].get_attribute("out").as_deref(), Some("item"));
		assert_eq!(children[0].get_attribute("disabled").as_deref(), Some(""));
		assert_eq!(children[0].text_content(), "a & b");
		assert_eq!(children[2].get_attribute("data-x").as_deref(), Some("1"));
		assert_eq!(ul.outer_html(), r#"<ul class="list"><li out="item" disabled>a &amp; b</li><br><li data-x="1"></li></ul>"#);
	}

	#[test]
	fn prefixed_attributes_and_comments() {
		let nodes = parse_fragment("<!-- c --><div out:class=\"state\" class='a b'>x</div> tail").unwrap();
		assert_eq!(nodes.len(), 3);
		assert_eq!(nodes[0].text_content(), " c ");
		assert_eq!(nodes[1].attribute_names(), vec!["out:class".to_owned(), "class".to_owned()]);
		assert_eq!(nodes[2].text_content(), " tail");
	}

	#[test]
	fn template_content() {
		let nodes = parse_fragment("<template><li>x</li><li>y</li></template>").unwrap();
		assert!(nodes[0].child_nodes().is_empty());
		assert_eq!(nodes[0].template_content().map(|c| c.len()), Some(2));
	}

	#[test]
	fn table_parts_stand_alone() {
		let nodes = parse_fragment(r#"<tr out="row"><td>a</td></tr>"#).unwrap();
		assert_eq!(nodes.len(), 1);
		assert_eq!(nodes[0].outer_html(), r#"<tr out="row"><td>a</td></tr>"#);
	}
}
