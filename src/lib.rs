//! Declarative DOM templates with keyed slot reconciliation.
//!
//! Markup is annotated with marker attributes:
//!
//! - `out="name"`, `inout="name"` and `in="name"` mark content slots that render data (or the result of
//!   the behaviour `name`) as text, nodes or nested template instances,
//! - `out:attribute="name"` manages a single attribute (`class` and `style` on top of their authored values),
//! - `when="expression"` shows or hides an element,
//! - `on="name"` (as well as `in` and `inout`) binds DOM events to the behaviour `name`,
//! - `ref="name"` makes an element available through [`Instance::ref_node`].
//!
//! A [`Template`] is compiled once, with [`ui`] or [`Template::builder`], and instantiated any number of times.
//! [`Instance`]s reconcile their slots against new data on [`Instance::set`] and [`Instance::update`],
//! reusing nested instances by key.
//!
//! [`cells`] provides minimal reactive values that can drive re-rendering.
//!
//! Rendering works against any [`DomNode`] backend: [`web_sys::Node`] in the browser, or [`mem::Node`].

#![doc(html_root_url = "https://docs.rs/select-ui/0.0.3")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attribute_slot;
pub mod cells;
pub mod dom;
pub mod error;
pub mod event;
pub mod instance;
pub mod mem;
pub mod predicate;
pub mod slot;
pub mod template;
pub mod value;
pub mod web;

pub use cells::{cell, derived, empty, Reactive, Subscription};
pub use dom::{Document, DomNode};
pub use error::{DomError, Error};
pub use event::{Propagation, UiEvent};
pub use instance::Instance;
pub use template::{ui, Applied, Behavior, Component, Source, Template, TemplateBuilder};
pub use value::{Key, Value, ValueType};

/// A log rendition of `value`: the value itself with the `"dangerous-logging"` feature, otherwise only its type.
pub(crate) fn loggable<N: DomNode>(value: &Value<N>) -> String {
	if cfg!(feature = "dangerous-logging") {
		format!("{:?}", value)
	} else {
		format!("<{:?}>", value.value_type())
	}
}

/// `" at [path]"` with the `"log-paths"` feature, otherwise empty.
pub(crate) fn path_note(path: &[usize]) -> String {
	if cfg!(feature = "log-paths") {
		format!(" at {:?}", path)
	} else {
		String::new()
	}
}
