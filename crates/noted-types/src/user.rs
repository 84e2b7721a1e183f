use serde::{Deserialize, Serialize};

/// An authenticated user, as resolved from a session by the session/user
/// collaborators. Carried read-only by a connection for its lifetime.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct User {
	pub id: String,
	pub username: String,
}

// vim: ts=4
