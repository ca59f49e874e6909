use crate::{
	dom::{self, DomNode, Path},
	error::DomError,
	path_note,
	value::Value,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use tracing::{error, trace_span};

/// A live `out:<attribute>` slot.
///
/// `class` and `style` are reconciled on top of their authored values, which are never removed.
/// Any other attribute is replaced outright.
pub struct AttributeSlot<N: DomNode> {
	node: N,
	path: Path,
	attribute: String,
	original: Option<String>,
	/// Class names or style properties set by the previous render.
	applied: RefCell<Vec<String>>,
}

impl<N: DomNode> Debug for AttributeSlot<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("AttributeSlot")
			.field("node", &self.node)
			.field("path", &self.path)
			.field("attribute", &self.attribute)
			.field("original", &self.original)
			.field("applied", &self.applied)
			.finish()
	}
}

fn current<N: DomNode>(value: &Value<N>) -> Value<N> {
	match value {
		Value::Reactive(reactive) => reactive.get(),
		other => other.clone(),
	}
}

/// Class names requested by a space-delimited string, a list of names or a dict of name → flag.
fn desired_classes<N: DomNode>(value: &Value<N>) -> Vec<String> {
	let mut classes: Vec<String> = match current(value) {
		Value::Null | Value::Bool(false) => Vec::new(),
		Value::List(items) => items.iter().flat_map(|item| dom::split_classes(&current(item).as_text())).collect(),
		Value::Dict(entries) => entries.iter().filter(|(_, flag)| flag.is_truthy()).flat_map(|(names, _)| dom::split_classes(names)).collect(),
		other => dom::split_classes(&other.as_text()),
	};
	let mut seen = Vec::with_capacity(classes.len());
	classes.retain(|class| {
		let new = !seen.contains(class);
		if new {
			seen.push(class.clone());
		}
		new
	});
	classes
}

/// Style declarations requested by a dict (camelCase keys allowed) or a CSS declaration list.
fn desired_style<N: DomNode>(value: &Value<N>) -> Vec<(String, String)> {
	match current(value) {
		Value::Null | Value::Bool(false) => Vec::new(),
		Value::Dict(entries) => entries
			.iter()
			.map(|(property, value)| (dom::kebab_case(property), current(value)))
			.filter(|(_, value)| !matches!(value, Value::Null | Value::Bool(false)))
			.map(|(property, value)| (property, value.as_text()))
			.filter(|(_, value)| !value.is_empty())
			.collect(),
		other => dom::parse_style(&other.as_text()),
	}
}

impl<N: DomNode> AttributeSlot<N> {
	pub(crate) fn new(node: N, path: Path, attribute: String, original: Option<String>) -> Self {
		Self {
			node,
			path,
			attribute,
			original,
			applied: RefCell::new(Vec::new()),
		}
	}

	#[must_use]
	pub fn node(&self) -> &N {
		&self.node
	}

	#[must_use]
	pub fn attribute(&self) -> &str {
		&self.attribute
	}

	/// The attribute's current value on the node.
	#[must_use]
	pub fn current(&self) -> Option<String> {
		self.node.get_attribute(&self.attribute)
	}

	pub fn render(&self, value: &Value<N>) {
		let span = trace_span!("Rendering attribute slot", attribute = %self.attribute, path = ?self.path);
		let _enter = span.enter();

		let result = match self.attribute.as_str() {
			"class" => self.render_class(value),
			"style" => self.render_style(value),
			_ => self.render_plain(value),
		};
		if let Err(error) = result {
			error!("Failed to render attribute {:?}{}: {}", self.attribute, path_note(&self.path), error);
		}
	}

	fn render_class(&self, value: &Value<N>) -> Result<(), DomError> {
		let original = self.original.as_deref().map(dom::split_classes).unwrap_or_default();
		let desired = desired_classes(value);
		let mut applied = self.applied.borrow_mut();
		for class in applied.iter() {
			if !desired.contains(class) && !original.contains(class) {
				dom::remove_class(&self.node, class)?;
			}
		}
		for class in &desired {
			dom::add_class(&self.node, class)?;
		}
		*applied = desired;
		Ok(())
	}

	fn render_style(&self, value: &Value<N>) -> Result<(), DomError> {
		let original = self.original.as_deref().map(dom::parse_style).unwrap_or_default();
		let desired = desired_style(value);
		let mut applied = self.applied.borrow_mut();
		for property in applied.iter() {
			if desired.iter().any(|(p, _)| p == property) {
				continue;
			}
			match original.iter().find(|(p, _)| p == property) {
				Some((_, authored)) => dom::set_style_property(&self.node, property, authored)?,
				None => dom::remove_style_property(&self.node, property)?,
			}
		}
		for (property, value) in &desired {
			dom::set_style_property(&self.node, property, value)?;
		}
		*applied = desired.into_iter().map(|(property, _)| property).collect();
		Ok(())
	}

	fn render_plain(&self, value: &Value<N>) -> Result<(), DomError> {
		match current(value) {
			Value::Null | Value::Bool(false) => {
				if self.node.has_attribute(&self.attribute) {
					self.node.remove_attribute(&self.attribute)?;
				}
			}
			Value::Bool(true) => self.node.set_attribute(&self.attribute, "")?,
			other => {
				let text = other.as_text();
				if self.attribute == "value" && dom::is_input_like(&self.node) {
					self.node.set_input_value(&text);
				}
				self.node.set_attribute(&self.attribute, &text)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mem::Node;
	use serde_json::json;

	fn slot(attribute: &str, original: Option<&str>) -> AttributeSlot<Node> {
		let node = Node::element("div");
		if let Some(original) = original {
			node.set_attribute(attribute, original).unwrap();
		}
		AttributeSlot::new(node, vec![0], attribute.to_owned(), original.map(str::to_owned))
	}

	#[test]
	fn classes_keep_authored_names() {
		let slot = slot("class", Some("foo"));
		slot.render(&json!({"bar": true, "foo": true}).into());
		assert_eq!(slot.current().as_deref(), Some("foo bar"));
		slot.render(&json!({"bar": false}).into());
		assert_eq!(slot.current().as_deref(), Some("foo"));
		slot.render(&json!(["a", "b c"]).into());
		assert_eq!(slot.current().as_deref(), Some("foo a b c"));
		slot.render(&json!("c").into());
		assert_eq!(slot.current().as_deref(), Some("foo c"));
	}

	#[test]
	fn styles_restore_authored_properties() {
		let slot = slot("style", Some("color: red; margin: 0"));
		slot.render(&json!({"color": "blue", "paddingTop": "1px"}).into());
		assert_eq!(slot.current().as_deref(), Some("color: blue; margin: 0; padding-top: 1px;"));
		slot.render(&json!("margin: 2px").into());
		assert_eq!(slot.current().as_deref(), Some("color: red; margin: 2px;"));
		slot.render(&Value::Null);
		assert_eq!(slot.current().as_deref(), Some("color: red; margin: 0;"));
	}

	#[test]
	fn plain_attributes() {
		let slot = slot("title", None);
		slot.render(&json!("hi").into());
		assert_eq!(slot.current().as_deref(), Some("hi"));
		slot.render(&json!(true).into());
		assert_eq!(slot.current().as_deref(), Some(""));
		slot.render(&json!(false).into());
		assert_eq!(slot.current(), None);
		slot.render(&json!(3).into());
		assert_eq!(slot.current().as_deref(), Some("3"));
	}
}
