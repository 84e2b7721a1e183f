//! Bridges an already-upgraded transport into a live connection: parses the
//! session cookie, resolves user/note/permission through the injected
//! collaborators, obtains the note's hub, and wires up the connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use noted_types::{Note, NoteId, Revision, User};
use sha2::Sha256;
use tracing::warn;

use crate::connection::Connection;
use crate::error::{ClResult, Error};
use crate::registry::HubRegistry;
use crate::transport::{TransportSink, TransportStream};

const SESSION_COOKIE_NAME: &str = "HEDGEDOC_SESSION";

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait SessionService: Send + Sync {
	async fn username_from_session_id(&self, session_id: &str) -> ClResult<String>;
}

#[async_trait]
pub trait UsersService: Send + Sync {
	async fn by_username(&self, username: &str) -> ClResult<User>;
}

#[async_trait]
pub trait NotesService: Send + Sync {
	async fn by_id_or_alias(&self, id_or_alias: &str) -> ClResult<Note>;
}

#[async_trait]
pub trait PermissionsService: Send + Sync {
	async fn may_read(&self, user: &User, note: &Note) -> bool;
}

#[async_trait]
pub trait Storage: Send + Sync {
	async fn latest_content(&self, note: &Note) -> ClResult<Revision>;
}

/// The external collaborators the admitter depends on, plus the registry it
/// admits connections into.
pub struct Collaborators {
	pub sessions: Arc<dyn SessionService>,
	pub users: Arc<dyn UsersService>,
	pub notes: Arc<dyn NotesService>,
	pub permissions: Arc<dyn PermissionsService>,
	pub storage: Arc<dyn Storage>,
	pub registry: Arc<HubRegistry>,
	/// Secret backing the `cookie-signature`-style HMAC over the session id.
	pub session_secret: Vec<u8>,
	/// Ping cadence applied to every connection admitted through this set of
	/// collaborators.
	pub keepalive_period: Duration,
}

/// Admits one upgraded transport. Any failure closes `sink`/drops `stream`
/// without leaving a half-registered connection.
pub async fn admit(
	collaborators: &Collaborators,
	request_path: &str,
	cookie_header: Option<&str>,
	sink: Arc<dyn TransportSink>,
	stream: Box<dyn TransportStream>,
) -> ClResult<()> {
	let note_ref = extract_note_ref(request_path)?;

	let cookie_header = cookie_header.ok_or_else(|| Error::AdmissionDenied("missing cookie header".into()))?;
	let session_id = verify_session_cookie(cookie_header, &collaborators.session_secret)?;

	let username = collaborators
		.sessions
		.username_from_session_id(&session_id)
		.await
		.map_err(|_| Error::AdmissionDenied("unknown session".into()))?;
	let user = collaborators
		.users
		.by_username(&username)
		.await
		.map_err(|_| Error::AdmissionDenied("unknown user".into()))?;
	let note = collaborators
		.notes
		.by_id_or_alias(note_ref.as_str())
		.await
		.map_err(|_| Error::AdmissionDenied("unknown note".into()))?;

	if !collaborators.permissions.may_read(&user, &note).await {
		warn!(user = %user.username, note = %note.id, "admission denied: read access refused");
		sink.close().await;
		return Err(Error::AdmissionDenied("access denied".into()));
	}

	let storage = collaborators.storage.clone();
	let note_for_loader = note.clone();
	let hub = collaborators
		.registry
		.get_or_create(note.id.clone(), move || async move {
			storage.latest_content(&note_for_loader).await.map(|revision| revision.content)
		})
		.await?;

	// The content load above can take a while; re-check the transport is
	// still there before handing it a connection id and wiring it in.
	if !sink.is_open().await {
		if hub.connection_count().await == 0 {
			hub.destroy().await;
		}
		return Err(Error::AdmissionDenied("transport closed before admission completed".into()));
	}

	let connection_id = hub.next_connection_id();
	let (connection, monitor) =
		Connection::new(connection_id, user, Arc::downgrade(&hub), sink, collaborators.keepalive_period);
	hub.connect(connection.clone()).await?;
	tokio::spawn(connection.run(stream, monitor));
	Ok(())
}

/// Extracts the note id/alias from `/realtime/?noteId={id}` (boundary B1).
fn extract_note_ref(request_path: &str) -> ClResult<NoteId> {
	let (path, query) = request_path.split_once('?').unwrap_or((request_path, ""));
	if path != "/realtime/" && path != "/realtime" {
		return Err(Error::AdmissionDenied(format!("unexpected upgrade path: {path}")));
	}
	for pair in query.split('&') {
		if let Some(value) = pair.strip_prefix("noteId=") {
			if !value.is_empty() {
				return Ok(NoteId::from(value));
			}
		}
	}
	Err(Error::AdmissionDenied("missing noteId query parameter".into()))
}

fn parse_cookie(header: &str, name: &str) -> Option<String> {
	header.split(';').map(str::trim).find_map(|kv| {
		let (key, value) = kv.split_once('=')?;
		(key == name).then(|| value.to_string())
	})
}

/// Verifies the `s:<sessionId>.<signature>` cookie produced by the
/// `cookie-signature` convention this deployment inherited, returning the
/// session id on success. A missing cookie, malformed value, or signature
/// mismatch are all treated identically (AdmissionDenied) before the
/// session id ever reaches `SessionService`.
fn verify_session_cookie(cookie_header: &str, secret: &[u8]) -> ClResult<String> {
	let raw = parse_cookie(cookie_header, SESSION_COOKIE_NAME)
		.ok_or_else(|| Error::AdmissionDenied("missing session cookie".into()))?;
	let unsigned = raw.strip_prefix("s:").ok_or_else(|| Error::AdmissionDenied("malformed session cookie".into()))?;
	let (session_id, signature_b64) =
		unsigned.rsplit_once('.').ok_or_else(|| Error::AdmissionDenied("malformed session cookie".into()))?;

	let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| Error::Internal("invalid session secret".into()))?;
	mac.update(format!("s:{session_id}").as_bytes());
	let expected = mac.finalize().into_bytes();

	let provided = STANDARD
		.decode(signature_b64)
		.map_err(|_| Error::AdmissionDenied("malformed session signature".into()))?;

	if !constant_time_eq(&expected, &provided) {
		return Err(Error::AdmissionDenied("session signature mismatch".into()));
	}
	Ok(session_id.to_string())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}
	a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
	use super::*;

	#[test]
	fn extracts_note_id_from_valid_path() {
		assert_eq!(extract_note_ref("/realtime/?noteId=abc").unwrap(), NoteId::from("abc"));
	}

	#[test]
	fn rejects_path_without_query() {
		assert!(extract_note_ref("/realtime/").is_err());
	}

	#[test]
	fn rejects_unrelated_path() {
		assert!(extract_note_ref("/other?noteId=abc").is_err());
	}

	#[test]
	fn verifies_matching_signature() {
		let secret = b"test-secret";
		let session_id = "abc123";
		let mut mac = HmacSha256::new_from_slice(secret).unwrap();
		mac.update(format!("s:{session_id}").as_bytes());
		let sig = STANDARD.encode(mac.finalize().into_bytes());
		let cookie = format!("HEDGEDOC_SESSION=s:{session_id}.{sig}");
		assert_eq!(verify_session_cookie(&cookie, secret).unwrap(), session_id);
	}

	#[test]
	fn rejects_tampered_signature() {
		let secret = b"test-secret";
		let cookie = "HEDGEDOC_SESSION=s:abc123.not-a-real-signature";
		assert!(verify_session_cookie(cookie, secret).is_err());
	}

	#[test]
	fn rejects_missing_cookie() {
		assert!(verify_session_cookie("other=value", b"secret").is_err());
	}
}

// vim: ts=4
