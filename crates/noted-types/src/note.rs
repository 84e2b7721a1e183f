use crate::ids::NoteId;
use serde::{Deserialize, Serialize};

/// A note as resolved from the notes collaborator, identified by id or alias.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Note {
	pub id: NoteId,
	pub alias: Option<String>,
	pub owner_id: String,
}

/// The latest saved revision of a note's content, used to seed a hub's
/// document when it is created.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Revision {
	pub content: String,
}

// vim: ts=4
