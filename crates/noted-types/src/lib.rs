//! Shared identifier and domain types used across the realtime note-editing
//! crates. Kept dependency-light so adapters and the core hub crate can
//! compile against it without pulling in transport or CRDT libraries.

pub mod ids;
pub mod note;
pub mod user;

pub use ids::NoteId;
pub use note::{Note, Revision};
pub use user::User;

// vim: ts=4
