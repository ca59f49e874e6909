use crate::{dom::DomNode, instance::Instance, value::Value};
use core::fmt::{self, Debug, Formatter};

/// An event published by an [`Instance`] to its ancestors.
pub struct UiEvent<N: DomNode> {
	pub name: String,
	pub data: Value<N>,
	/// The instance that sent the event.
	pub source: Instance<N>,
	/// The instance currently handling the event.
	pub current: Option<Instance<N>>,
	/// The DOM event that caused this one, if any.
	pub dom_event: Option<N::Event>,
}

impl<N: DomNode> UiEvent<N> {
	#[must_use]
	pub fn new(name: &str, data: Value<N>, source: &Instance<N>, dom_event: Option<&N::Event>) -> Self {
		Self {
			name: name.to_owned(),
			data,
			source: source.clone(),
			current: None,
			dom_event: dom_event.cloned(),
		}
	}
}

impl<N: DomNode> Debug for UiEvent<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("UiEvent")
			.field("name", &self.name)
			.field("data", &crate::loggable(&self.data))
			.field("dom_event", &self.dom_event)
			.finish_non_exhaustive()
	}
}

/// What an event handler wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
	/// Run the remaining handlers and pass the event on to the parent.
	Continue,
	/// Run the remaining handlers on this instance, but do not pass the event on.
	Local,
	/// Stop immediately.
	Stop,
}

impl Default for Propagation {
	fn default() -> Self {
		Propagation::Continue
	}
}

impl From<()> for Propagation {
	fn from((): ()) -> Self {
		Propagation::Continue
	}
}
