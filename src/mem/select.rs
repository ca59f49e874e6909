//! CSS selector matching for the in-memory DOM, on top of the `selectors` crate.
//!
//! Pseudo-classes and pseudo-elements aren't supported and fail to parse.

use super::{Data, Node};
use crate::{
	dom::{self, DomNode, NodeKind},
	error::DomError,
};
use core::fmt::{self, Write};
use cssparser::{serialize_identifier, serialize_string, ParserInput, ToCss};
use html5ever::{LocalName, Namespace};
use precomputed_hash::PrecomputedHash;
use selectors::{
	attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint},
	matching::{self, ElementSelectorFlags, IgnoreNthChildForInvalidation, MatchingContext, MatchingMode, NeedsSelectorFlags, QuirksMode},
	parser::{self, ParseRelative, SelectorParseErrorKind},
	OpaqueElement, SelectorList,
};

/// A parsed selector list.
pub(super) struct Selectors(SelectorList<Simple>);

impl Selectors {
	pub(super) fn parse(selector: &str) -> Result<Self, DomError> {
		let mut input = ParserInput::new(selector);
		let mut parser = cssparser::Parser::new(&mut input);
		SelectorList::parse(&SelectorParser, &mut parser, ParseRelative::No)
			.map(Self)
			.map_err(|error| DomError(format!("SyntaxError: {:?} is not a valid selector ({:?})", selector, error.kind)))
	}

	pub(super) fn matches(&self, node: &Node) -> bool {
		let element = match Subject::wrap(node.clone()) {
			Some(element) => element,
			None => return false,
		};
		let mut nth_index_cache = Default::default();
		let mut context = MatchingContext::new(
			MatchingMode::Normal,
			None,
			&mut nth_index_cache,
			QuirksMode::NoQuirks,
			NeedsSelectorFlags::No,
			IgnoreNthChildForInvalidation::No,
		);
		self.0 .0.iter().any(|selector| matching::matches_selector(selector, 0, None, &element, &mut context))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Simple;

impl selectors::SelectorImpl for Simple {
	type ExtraMatchingData<'a> = ();
	type AttrValue = CssString;
	type Identifier = CssName;
	type LocalName = CssName;
	type NamespacePrefix = CssName;
	type NamespaceUrl = Namespace;
	type BorrowedNamespaceUrl = Namespace;
	type BorrowedLocalName = CssName;
	type NonTSPseudoClass = PseudoClass;
	type PseudoElement = PseudoElement;
}

struct SelectorParser;

impl<'i> parser::Parser<'i> for SelectorParser {
	type Impl = Simple;
	type Error = SelectorParseErrorKind<'i>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub(super) struct CssName(LocalName);

impl<'a> From<&'a str> for CssName {
	fn from(name: &'a str) -> Self {
		Self(LocalName::from(name))
	}
}

impl ToCss for CssName {
	fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
		serialize_identifier(&self.0, dest)
	}
}

impl PrecomputedHash for CssName {
	fn precomputed_hash(&self) -> u32 {
		self.0.precomputed_hash()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub(super) struct CssString(String);

impl<'a> From<&'a str> for CssString {
	fn from(value: &'a str) -> Self {
		Self(value.to_owned())
	}
}

impl AsRef<str> for CssString {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl ToCss for CssString {
	fn to_css<W: Write>(&self, dest: &mut W) -> fmt::Result {
		serialize_string(&self.0, dest)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum PseudoClass {}

impl parser::NonTSPseudoClass for PseudoClass {
	type Impl = Simple;

	fn is_active_or_hover(&self) -> bool {
		match *self {}
	}

	fn is_user_action_state(&self) -> bool {
		match *self {}
	}
}

impl ToCss for PseudoClass {
	fn to_css<W: Write>(&self, _dest: &mut W) -> fmt::Result {
		match *self {}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum PseudoElement {}

impl parser::PseudoElement for PseudoElement {
	type Impl = Simple;
}

impl ToCss for PseudoElement {
	fn to_css<W: Write>(&self, _dest: &mut W) -> fmt::Result {
		match *self {}
	}
}

/// An element node, as seen by the matcher.
#[derive(Debug, Clone)]
struct Subject(Node);

impl Subject {
	fn wrap(node: Node) -> Option<Self> {
		(node.kind() == NodeKind::Element).then(|| Self(node))
	}

	fn name(&self) -> String {
		match &self.0 .0.borrow().data {
			Data::Element { name, .. } => name.clone(),
			_ => String::new(),
		}
	}

	fn siblings(&self) -> Vec<Node> {
		self.0.parent_node().map(|parent| parent.child_nodes()).unwrap_or_default()
	}
}

impl selectors::Element for Subject {
	type Impl = Simple;

	fn opaque(&self) -> OpaqueElement {
		OpaqueElement::new(&*self.0 .0)
	}

	fn parent_element(&self) -> Option<Self> {
		self.0.parent_node().and_then(Self::wrap)
	}

	fn parent_node_is_shadow_root(&self) -> bool {
		false
	}

	fn containing_shadow_host(&self) -> Option<Self> {
		None
	}

	fn is_pseudo_element(&self) -> bool {
		false
	}

	fn prev_sibling_element(&self) -> Option<Self> {
		let siblings = self.siblings();
		let index = siblings.iter().position(|sibling| sibling == &self.0)?;
		siblings[..index].iter().rev().find_map(|sibling| Self::wrap(sibling.clone()))
	}

	fn next_sibling_element(&self) -> Option<Self> {
		let mut current = self.0.next_sibling();
		while let Some(sibling) = current {
			if sibling.kind() == NodeKind::Element {
				return Some(Self(sibling));
			}
			current = sibling.next_sibling();
		}
		None
	}

	fn first_element_child(&self) -> Option<Self> {
		self.0.child_nodes().into_iter().find_map(Self::wrap)
	}

	fn is_html_element_in_html_document(&self) -> bool {
		true
	}

	fn has_local_name(&self, local_name: &CssName) -> bool {
		self.name() == *local_name.0
	}

	fn has_namespace(&self, namespace: &Namespace) -> bool {
		&**namespace == "http://www.w3.org/1999/xhtml"
	}

	fn is_same_type(&self, other: &Self) -> bool {
		self.name() == other.name()
	}

	fn attr_matches(&self, namespace: &NamespaceConstraint<&Namespace>, local_name: &CssName, operation: &AttrSelectorOperation<&CssString>) -> bool {
		if let NamespaceConstraint::Specific(url) = namespace {
			if !url.is_empty() {
				return false;
			}
		}
		self.0.get_attribute(&local_name.0).map_or(false, |value| operation.eval_str(&value))
	}

	fn match_non_ts_pseudo_class(&self, pseudo_class: &PseudoClass, _context: &mut MatchingContext<Simple>) -> bool {
		match *pseudo_class {}
	}

	fn match_pseudo_element(&self, pseudo_element: &PseudoElement, _context: &mut MatchingContext<Simple>) -> bool {
		match *pseudo_element {}
	}

	fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

	fn is_link(&self) -> bool {
		matches!(self.name().as_str(), "a" | "area") && self.0.get_attribute("href").is_some()
	}

	fn is_html_slot_element(&self) -> bool {
		self.name() == "slot"
	}

	fn has_id(&self, id: &CssName, case_sensitivity: CaseSensitivity) -> bool {
		self.0.get_attribute("id").map_or(false, |value| case_sensitivity.eq(value.as_bytes(), id.0.as_bytes()))
	}

	fn has_class(&self, name: &CssName, case_sensitivity: CaseSensitivity) -> bool {
		let classes = self.0.get_attribute("class").map(|classes| dom::split_classes(&classes)).unwrap_or_default();
		classes.iter().any(|class| case_sensitivity.eq(class.as_bytes(), name.0.as_bytes()))
	}

	fn imported_part(&self, _name: &CssName) -> Option<CssName> {
		None
	}

	fn is_part(&self, _name: &CssName) -> bool {
		false
	}

	fn is_empty(&self) -> bool {
		self.0.child_nodes().iter().all(|child| match child.kind() {
			NodeKind::Element => false,
			NodeKind::Text => child.text_content().is_empty(),
			NodeKind::Comment | NodeKind::Other => true,
		})
	}

	fn is_root(&self) -> bool {
		self.parent_element().is_none()
	}
}
