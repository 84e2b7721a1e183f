//! In-memory stand-ins for the session/user/note/permission/storage
//! collaborators. A real deployment would back these with the session
//! store, user table, and note repository; these hold just enough state to
//! exercise admission end-to-end.

use std::collections::HashMap;

use async_trait::async_trait;
use noted_crdt::{ClResult, Error, NotesService, PermissionsService, SessionService, Storage, UsersService};
use noted_types::{Note, NoteId, Revision, User};
use tokio::sync::RwLock;

pub struct InMemorySessions {
	by_session_id: RwLock<HashMap<String, String>>,
}

impl InMemorySessions {
	pub fn new(seed: impl IntoIterator<Item = (String, String)>) -> Self {
		Self { by_session_id: RwLock::new(seed.into_iter().collect()) }
	}
}

#[async_trait]
impl SessionService for InMemorySessions {
	async fn username_from_session_id(&self, session_id: &str) -> ClResult<String> {
		self.by_session_id
			.read()
			.await
			.get(session_id)
			.cloned()
			.ok_or_else(|| Error::AdmissionDenied(format!("no such session: {session_id}")))
	}
}

pub struct InMemoryUsers {
	by_username: RwLock<HashMap<String, User>>,
}

impl InMemoryUsers {
	pub fn new(seed: impl IntoIterator<Item = User>) -> Self {
		Self { by_username: RwLock::new(seed.into_iter().map(|u| (u.username.clone(), u)).collect()) }
	}
}

#[async_trait]
impl UsersService for InMemoryUsers {
	async fn by_username(&self, username: &str) -> ClResult<User> {
		self.by_username
			.read()
			.await
			.get(username)
			.cloned()
			.ok_or_else(|| Error::AdmissionDenied(format!("no such user: {username}")))
	}
}

pub struct InMemoryNotes {
	by_key: RwLock<HashMap<String, Note>>,
}

impl InMemoryNotes {
	pub fn new(seed: impl IntoIterator<Item = Note>) -> Self {
		let mut by_key = HashMap::new();
		for note in seed {
			by_key.insert(note.id.as_str().to_string(), note.clone());
			if let Some(alias) = &note.alias {
				by_key.insert(alias.clone(), note);
			}
		}
		Self { by_key: RwLock::new(by_key) }
	}
}

#[async_trait]
impl NotesService for InMemoryNotes {
	async fn by_id_or_alias(&self, id_or_alias: &str) -> ClResult<Note> {
		self.by_key
			.read()
			.await
			.get(id_or_alias)
			.cloned()
			.ok_or_else(|| Error::AdmissionDenied(format!("no such note: {id_or_alias}")))
	}
}

/// Grants read access to everyone; a real permissions service would check
/// note visibility and explicit shares.
pub struct OpenPermissions;

#[async_trait]
impl PermissionsService for OpenPermissions {
	async fn may_read(&self, _user: &User, _note: &Note) -> bool {
		true
	}
}

pub struct InMemoryStorage {
	by_note: RwLock<HashMap<NoteId, String>>,
}

impl InMemoryStorage {
	pub fn new(seed: impl IntoIterator<Item = (NoteId, String)>) -> Self {
		Self { by_note: RwLock::new(seed.into_iter().collect()) }
	}
}

#[async_trait]
impl Storage for InMemoryStorage {
	async fn latest_content(&self, note: &Note) -> ClResult<Revision> {
		Ok(Revision { content: self.by_note.read().await.get(&note.id).cloned().unwrap_or_default() })
	}
}

// vim: ts=4
