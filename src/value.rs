//! The data model flowing through templates and cells.

use crate::{
	cells::{Reactive, Structure},
	dom::DomNode,
	template::Applied,
};
use core::{
	fmt::{self, Debug, Display, Formatter},
	mem,
};
use indexmap::IndexMap;

/// One segment of a path into a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	Index(usize),
	Name(String),
}

impl Key {
	/// The key as used for slot mappings: indices are stringified.
	#[must_use]
	pub fn to_name(&self) -> String {
		match self {
			Key::Index(index) => index.to_string(),
			Key::Name(name) => name.clone(),
		}
	}
}

impl Display for Key {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Key::Index(index) => Display::fmt(index, f),
			Key::Name(name) => f.write_str(name),
		}
	}
}

impl From<usize> for Key {
	fn from(index: usize) -> Self {
		Key::Index(index)
	}
}

impl From<&str> for Key {
	fn from(name: &str) -> Self {
		Key::Name(name.to_owned())
	}
}

impl From<String> for Key {
	fn from(name: String) -> Self {
		Key::Name(name)
	}
}

/// A coarse type tag, used to detect when a slot's rendered content changes shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
	Null,
	Number,
	Text,
	List,
	Dict,
	/// Booleans, nodes, applied templates and reactives.
	Object,
}

/// Template data.
///
/// Data values compare structurally. Reactives and the templates of [`Applied`] values compare by identity.
pub enum Value<N: DomNode> {
	Null,
	Bool(bool),
	Number(f64),
	Text(String),
	List(Vec<Value<N>>),
	Dict(IndexMap<String, Value<N>>),
	/// A DOM node to be inserted as is.
	Node(N),
	/// A template paired with the data it should render.
	Applied(Applied<N>),
	Reactive(Reactive<Value<N>>),
}

impl<N: DomNode> Default for Value<N> {
	fn default() -> Self {
		Value::Null
	}
}

impl<N: DomNode> Clone for Value<N> {
	fn clone(&self) -> Self {
		match self {
			Value::Null => Value::Null,
			Value::Bool(b) => Value::Bool(*b),
			Value::Number(n) => Value::Number(*n),
			Value::Text(text) => Value::Text(text.clone()),
			Value::List(items) => Value::List(items.clone()),
			Value::Dict(entries) => Value::Dict(entries.clone()),
			Value::Node(node) => Value::Node(node.clone()),
			Value::Applied(applied) => Value::Applied(applied.clone()),
			Value::Reactive(reactive) => Value::Reactive(reactive.clone()),
		}
	}
}

impl<N: DomNode> PartialEq for Value<N> {
	#[allow(clippy::float_cmp)]
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Number(a), Value::Number(b)) => a == b,
			(Value::Text(a), Value::Text(b)) => a == b,
			(Value::List(a), Value::List(b)) => a == b,
			(Value::Dict(a), Value::Dict(b)) => a.len() == b.len() && a.iter().zip(b).all(|((ka, va), (kb, vb))| ka == kb && va == vb),
			(Value::Node(a), Value::Node(b)) => a == b,
			(Value::Applied(a), Value::Applied(b)) => a == b,
			(Value::Reactive(a), Value::Reactive(b)) => a.is_same(b),
			_ => false,
		}
	}
}

impl<N: DomNode> Debug for Value<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => f.write_str("Null"),
			Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
			Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
			Value::Text(text) => f.debug_tuple("Text").field(text).finish(),
			Value::List(items) => f.debug_list().entries(items).finish(),
			Value::Dict(entries) => f.debug_map().entries(entries).finish(),
			Value::Node(node) => f.debug_tuple("Node").field(node).finish(),
			Value::Applied(applied) => Debug::fmt(applied, f),
			Value::Reactive(reactive) => Debug::fmt(reactive, f),
		}
	}
}

impl<N: DomNode> Value<N> {
	/// A dict from key-value pairs, in order.
	pub fn dict<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value<N>)>) -> Self {
		Value::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}

	#[must_use]
	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	#[must_use]
	pub fn value_type(&self) -> ValueType {
		match self {
			Value::Null => ValueType::Null,
			Value::Number(_) => ValueType::Number,
			Value::Text(_) => ValueType::Text,
			Value::List(_) => ValueType::List,
			Value::Dict(_) => ValueType::Dict,
			Value::Bool(_) | Value::Node(_) | Value::Applied(_) | Value::Reactive(_) => ValueType::Object,
		}
	}

	/// JavaScript-style truthiness. Reactives are judged by their current value.
	#[must_use]
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Null => false,
			Value::Bool(b) => *b,
			Value::Number(n) => *n != 0.0 && !n.is_nan(),
			Value::Text(text) => !text.is_empty(),
			Value::List(_) | Value::Dict(_) | Value::Node(_) | Value::Applied(_) => true,
			Value::Reactive(reactive) => reactive.with(Value::is_truthy),
		}
	}

	/// `0` for null, the item count of lists and dicts (or of a reactive's value), `1` otherwise.
	#[must_use]
	pub fn len(&self) -> usize {
		match self {
			Value::Null => 0,
			Value::List(items) => items.len(),
			Value::Dict(entries) => entries.len(),
			Value::Reactive(reactive) => reactive.len(),
			Value::Bool(_) | Value::Number(_) | Value::Text(_) | Value::Node(_) | Value::Applied(_) => 1,
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// The entry named `key` in a dict, or at index `key` in a list.
	#[must_use]
	pub fn get(&self, key: &str) -> Option<&Value<N>> {
		match self {
			Value::Dict(entries) => entries.get(key),
			Value::List(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Text(text) => Some(text),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Number(n) => Some(*n),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_reactive(&self) -> Option<&Reactive<Value<N>>> {
		match self {
			Value::Reactive(reactive) => Some(reactive),
			_ => None,
		}
	}

	/// The display text of a value: empty for null, numbers as in JavaScript, text as is
	/// and everything else as JSON.
	#[must_use]
	pub fn as_text(&self) -> String {
		match self {
			Value::Null => String::new(),
			Value::Number(n) => number_text(*n),
			Value::Text(text) => text.clone(),
			Value::Reactive(reactive) => reactive.with(Value::as_text),
			_ => self.to_json().to_string(),
		}
	}

	/// A JSON rendition. Nodes become empty objects, applied templates their data and reactives their value.
	#[must_use]
	pub fn to_json(&self) -> serde_json::Value {
		use serde_json::Value as Json;
		match self {
			Value::Null => Json::Null,
			Value::Bool(b) => Json::Bool(*b),
			#[allow(clippy::cast_possible_truncation)]
			Value::Number(n) => {
				if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
					Json::from(*n as i64)
				} else {
					serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number)
				}
			}
			Value::Text(text) => Json::String(text.clone()),
			Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
			Value::Dict(entries) => Json::Object(entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
			Value::Node(_) => Json::Object(serde_json::Map::new()),
			Value::Applied(applied) => applied.data().to_json(),
			Value::Reactive(reactive) => reactive.with(Value::to_json),
		}
	}

	/// Applies `functor` to each item of a list or dict, keeping keys. Other values are returned unchanged.
	#[must_use]
	pub fn remap(&self, mut functor: impl FnMut(&Value<N>, &Key) -> Value<N>) -> Value<N> {
		match self {
			Value::List(items) => Value::List(items.iter().enumerate().map(|(i, item)| functor(item, &Key::Index(i))).collect()),
			Value::Dict(entries) => Value::Dict(
				entries
					.iter()
					.map(|(k, v)| {
						let mapped = functor(v, &Key::Name(k.clone()));
						(k.clone(), mapped)
					})
					.collect(),
			),
			_ => self.clone(),
		}
	}

	/// Replaces every nested reactive with its current value.
	#[must_use]
	pub fn expand(&self) -> Value<N> {
		crate::cells::expand(self)
	}
}

/// Formats a number the way JavaScript's `String(number)` does for common values.
#[must_use]
pub fn number_text(n: f64) -> String {
	if n.is_nan() {
		"NaN".to_owned()
	} else if n.is_infinite() {
		if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
	} else if n == 0.0 {
		"0".to_owned()
	} else {
		n.to_string()
	}
}

impl<N: DomNode> Structure for Value<N> {
	fn null() -> Self {
		Value::Null
	}

	fn is_container(&self) -> bool {
		matches!(self, Value::List(_) | Value::Dict(_))
	}

	fn is_list(&self) -> bool {
		matches!(self, Value::List(_))
	}

	fn container_for(key: &Key) -> Self {
		match key {
			Key::Index(_) => Value::List(Vec::new()),
			Key::Name(_) => Value::Dict(IndexMap::new()),
		}
	}

	fn child(&self, key: &Key) -> Option<&Self> {
		match (self, key) {
			(Value::List(items), Key::Index(index)) => items.get(*index),
			(Value::Dict(entries), Key::Index(index)) => entries.get(&index.to_string()),
			(_, Key::Name(name)) => self.get(name),
			_ => None,
		}
	}

	fn child_mut(&mut self, key: &Key) -> &mut Self {
		if !self.is_container() {
			*self = Self::container_for(key);
		}
		let index = match (&*self, key) {
			(Value::List(_), Key::Index(index)) => Some(*index),
			(Value::List(_), Key::Name(name)) => name.parse::<usize>().ok(),
			_ => None,
		};
		if index.is_none() {
			if let Value::List(items) = self {
				let entries = mem::take(items).into_iter().enumerate().map(|(i, item)| (i.to_string(), item)).collect();
				*self = Value::Dict(entries);
			}
		}
		match self {
			Value::List(items) => {
				let index = index.unwrap_or(items.len());
				if items.len() <= index {
					items.resize_with(index + 1, Value::default);
				}
				&mut items[index]
			}
			Value::Dict(entries) => entries.entry(key.to_name()).or_default(),
			_ => unreachable!("converted to a container above"),
		}
	}

	fn children(&self) -> Vec<(Key, &Self)> {
		match self {
			Value::List(items) => items.iter().enumerate().map(|(i, item)| (Key::Index(i), item)).collect(),
			Value::Dict(entries) => entries.iter().map(|(k, v)| (Key::Name(k.clone()), v)).collect(),
			_ => Vec::new(),
		}
	}

	fn map_children(&self, f: &mut dyn FnMut(&Self) -> Self) -> Option<Self> {
		match self {
			Value::List(items) => Some(Value::List(items.iter().map(|item| f(item)).collect())),
			Value::Dict(entries) => Some(Value::Dict(entries.iter().map(|(k, v)| (k.clone(), f(v))).collect())),
			_ => None,
		}
	}

	fn as_reactive(&self) -> Option<&Reactive<Self>> {
		Value::as_reactive(self)
	}

	fn len(&self) -> usize {
		Value::len(self)
	}
}

impl<N: DomNode> From<bool> for Value<N> {
	fn from(b: bool) -> Self {
		Value::Bool(b)
	}
}

impl<N: DomNode> From<f64> for Value<N> {
	fn from(n: f64) -> Self {
		Value::Number(n)
	}
}

impl<N: DomNode> From<i32> for Value<N> {
	fn from(n: i32) -> Self {
		Value::Number(n.into())
	}
}

impl<N: DomNode> From<u32> for Value<N> {
	fn from(n: u32) -> Self {
		Value::Number(n.into())
	}
}

impl<N: DomNode> From<&str> for Value<N> {
	fn from(text: &str) -> Self {
		Value::Text(text.to_owned())
	}
}

impl<N: DomNode> From<String> for Value<N> {
	fn from(text: String) -> Self {
		Value::Text(text)
	}
}

impl<N: DomNode> From<Vec<Value<N>>> for Value<N> {
	fn from(items: Vec<Value<N>>) -> Self {
		Value::List(items)
	}
}

impl<N: DomNode> From<IndexMap<String, Value<N>>> for Value<N> {
	fn from(entries: IndexMap<String, Value<N>>) -> Self {
		Value::Dict(entries)
	}
}

impl<N: DomNode> From<Reactive<Value<N>>> for Value<N> {
	fn from(reactive: Reactive<Value<N>>) -> Self {
		Value::Reactive(reactive)
	}
}

impl<N: DomNode> From<Applied<N>> for Value<N> {
	fn from(applied: Applied<N>) -> Self {
		Value::Applied(applied)
	}
}

impl<N: DomNode, T: Into<Value<N>>> From<Option<T>> for Value<N> {
	fn from(value: Option<T>) -> Self {
		value.map_or(Value::Null, Into::into)
	}
}

impl<N: DomNode> From<serde_json::Value> for Value<N> {
	fn from(json: serde_json::Value) -> Self {
		use serde_json::Value as Json;
		match json {
			Json::Null => Value::Null,
			Json::Bool(b) => Value::Bool(b),
			Json::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
			Json::String(text) => Value::Text(text),
			Json::Array(items) => Value::List(items.into_iter().map(Into::into).collect()),
			Json::Object(entries) => Value::Dict(entries.into_iter().map(|(k, v)| (k, v.into())).collect()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mem::Node;
	use serde_json::json;

	type V = Value<Node>;

	#[test]
	fn text() {
		assert_eq!(V::Null.as_text(), "");
		assert_eq!(V::from(42).as_text(), "42");
		assert_eq!(V::from(1.5).as_text(), "1.5");
		assert_eq!(V::from(f64::NAN).as_text(), "NaN");
		assert_eq!(V::from(-f64::INFINITY).as_text(), "-Infinity");
		assert_eq!(V::from(true).as_text(), "true");
		assert_eq!(V::from(json!({"a": [1, "b"]})).as_text(), r#"{"a":[1,"b"]}"#);
	}

	#[test]
	fn equality_is_structural() {
		assert_eq!(V::from(json!({"a": 1, "b": [true]})), V::from(json!({"a": 1, "b": [true]})));
		assert_ne!(V::from(json!({"a": 1, "b": 2})), V::from(json!({"b": 2, "a": 1})));
		assert_ne!(V::from(1), V::from("1"));
	}

	#[test]
	fn remap_keeps_keys() {
		let doubled = V::from(json!({"x": 1, "y": 2})).remap(|v, _| V::from(v.as_f64().unwrap_or_default() * 2.0));
		assert_eq!(doubled, V::from(json!({"x": 2, "y": 4})));
		assert_eq!(V::from(3).remap(|_, _| V::Null), V::from(3));
	}

	#[test]
	fn list_with_name_key_becomes_dict() {
		let mut list = V::from(json!(["a"]));
		*list.child_mut(&Key::from("x")) = V::from(1);
		assert_eq!(list, V::from(json!({"0": "a", "x": 1})));
	}
}
