use core::fmt::{self, Display, Formatter};

/// A failed DOM operation reported by a [`DomNode`](`crate::dom::DomNode`) backend.
///
/// These are never fatal during rendering. Callers log them and leave the affected part of the DOM as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomError(pub String);

impl Display for DomError {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl std::error::Error for DomError {}

/// Errors raised while compiling a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	/// A `when` expression could not be compiled.
	Predicate {
		expression: String,
		offset: usize,
		message: String,
	},
	/// A template selector matched no nodes.
	EmptySelection(String),
	/// The backend failed while preparing template nodes.
	Dom(DomError),
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Error::Predicate { expression, offset, message } => write!(f, "invalid `when` expression {:?} at offset {}: {}", expression, offset, message),
			Error::EmptySelection(selector) => write!(f, "template selector {:?} matched no nodes", selector),
			Error::Dom(error) => write!(f, "DOM operation failed: {}", error),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Dom(error) => Some(error),
			_ => None,
		}
	}
}

impl From<DomError> for Error {
	fn from(error: DomError) -> Self {
		Error::Dom(error)
	}
}
