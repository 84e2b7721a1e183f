use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier (or alias) of a note; the primary key of a hub.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct NoteId(pub String);

impl NoteId {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for NoteId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<String> for NoteId {
	fn from(value: String) -> Self {
		NoteId(value)
	}
}

impl From<&str> for NoteId {
	fn from(value: &str) -> Self {
		NoteId(value.to_string())
	}
}

// vim: ts=4
