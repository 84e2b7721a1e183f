//! Thin wrapper over a convergent replicated document and its associated
//! presence ("awareness") register. Binds to `yrs`, the Rust port of Yjs, so
//! the bytes produced here are understood by real Yjs clients unmodified.

use std::sync::Arc;

use yrs::sync::awareness::{Awareness, AwarenessUpdate};
use yrs::sync::protocol::{MSG_SYNC, MSG_SYNC_UPDATE};
use yrs::sync::{Message, SyncMessage};
use yrs::encoding::write::Write as _;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::{Encode, Encoder, EncoderV1};
use yrs::{Doc, GetString, ReadTxn, StateVector, Subscription, Text, Transact};

use crate::error::{ClResult, Error};
use crate::frame::TEXT_CHANNEL;

/// A raw CRDT update together with the origin that produced it, as observed
/// by the document's update subscription. `origin` is `None` when the
/// mutation came from a transaction opened without one (never true for
/// anything this crate applies, but the field stays optional to mirror the
/// underlying API).
#[derive(Clone)]
pub struct LocalUpdate {
	pub bytes: Vec<u8>,
	pub origin: Option<u64>,
}

/// Added/updated/removed client ids from an awareness change, plus the
/// origin connection that produced it.
#[derive(Clone)]
pub struct AwarenessChange {
	pub added: Vec<u64>,
	pub updated: Vec<u64>,
	pub removed: Vec<u64>,
	pub origin: Option<u64>,
}

pub struct CrdtAdapter {
	awareness: Arc<Awareness>,
	_update_sub: Subscription,
}

impl CrdtAdapter {
	/// Builds a fresh document seeded with `initial_content` at position 0 of
	/// the shared-text field, and installs the update subscription that
	/// feeds `on_update`.
	pub fn new(initial_content: &str, on_update: impl Fn(LocalUpdate) + Send + Sync + 'static) -> ClResult<Self> {
		let doc = Doc::new();
		{
			let text = doc.get_or_insert_text(TEXT_CHANNEL);
			let mut txn = doc.transact_mut();
			if !initial_content.is_empty() {
				text.push(&mut txn, initial_content);
			}
		}

		// yrs emits the update event synchronously from inside the
		// triggering transaction; the hub defers its broadcast to after
		// that transaction's guard drops, so this closure only has to hand
		// the bytes and origin onward.
		let update_sub = doc
			.observe_update_v1(move |txn, event| {
				let origin = txn.origin().and_then(origin_as_connection_id);
				on_update(LocalUpdate { bytes: event.update.clone(), origin });
			})
			.map_err(|_| Error::Internal("document already has an update subscriber".into()))?;

		Ok(Self { awareness: Arc::new(Awareness::new(doc)), _update_sub: update_sub })
	}

	pub fn doc(&self) -> Doc {
		self.awareness.doc().clone()
	}

	pub fn state_vector(&self) -> StateVector {
		self.doc().transact().state_vector()
	}

	/// Applies a decoded SYNC sub-message under the given origin. Returns the
	/// response to send back to the originating connection only, if any
	/// (true exclusively for STEP1, per the sync handshake contract).
	pub fn apply_sync(&self, message: SyncMessage, origin: u64) -> ClResult<Option<Vec<u8>>> {
		match message {
			SyncMessage::SyncStep1(remote_sv) => {
				let doc = self.doc();
				let txn = doc.transact();
				let update = txn.encode_state_as_update_v1(&remote_sv);
				Ok(Some(Message::Sync(SyncMessage::SyncStep2(update)).encode_v1()))
			}
			SyncMessage::SyncStep2(update) | SyncMessage::Update(update) => {
				let decoded = yrs::Update::decode_v1(&update)
					.map_err(|e| Error::MalformedFrame(format!("invalid CRDT update: {e}")))?;
				let doc = self.doc();
				let origin_bytes = connection_id_as_origin(origin);
				let mut txn = doc.transact_mut_with(origin_bytes.as_slice());
				txn.apply_update(decoded)
					.map_err(|e| Error::HandlerFault(format!("failed to apply update: {e}")))?;
				Ok(None)
			}
		}
	}

	/// Applies a decoded AWARENESS message, returning the summary of ids it
	/// touched so the hub can re-encode and fan it out.
	pub fn apply_awareness(&self, update: AwarenessUpdate, origin: u64) -> ClResult<Option<AwarenessChange>> {
		let summary = self
			.awareness
			.apply_update_summary(update)
			.map_err(|e| Error::HandlerFault(format!("failed to apply awareness update: {e}")))?;
		Ok(summary.map(|s| AwarenessChange {
			added: s.added,
			updated: s.updated,
			removed: s.removed,
			origin: Some(origin),
		}))
	}

	pub fn encode_initial_sync_request(&self) -> Vec<u8> {
		Message::Sync(SyncMessage::SyncStep1(self.state_vector())).encode_v1()
	}

	pub fn encode_update(raw_update: &[u8]) -> Vec<u8> {
		let mut encoder = EncoderV1::new();
		encoder.write_var(MSG_SYNC);
		encoder.write_var(MSG_SYNC_UPDATE);
		encoder.write_buf(raw_update);
		encoder.to_vec()
	}

	/// Encodes the full awareness snapshot (every known client).
	pub fn encode_awareness_snapshot(&self) -> ClResult<Option<Vec<u8>>> {
		let update = self
			.awareness
			.update()
			.map_err(|e| Error::HandlerFault(format!("failed to encode awareness: {e}")))?;
		if update.clients.is_empty() {
			Ok(None)
		} else {
			Ok(Some(Message::Awareness(update).encode_v1()))
		}
	}

	/// Encodes an awareness update restricted to the given client ids.
	pub fn encode_awareness_for(&self, client_ids: &[u64]) -> ClResult<Option<Vec<u8>>> {
		let update = self
			.awareness
			.update_with_clients(client_ids.iter().copied())
			.map_err(|e| Error::HandlerFault(format!("failed to encode awareness: {e}")))?;
		if update.clients.is_empty() {
			Ok(None)
		} else {
			Ok(Some(Message::Awareness(update).encode_v1()))
		}
	}

	pub fn snapshot_text(&self) -> String {
		let doc = self.doc();
		let text = doc.get_or_insert_text(TEXT_CHANNEL);
		let txn = doc.transact();
		text.get_string(&txn)
	}

	/// Removes a client's awareness entry, used when a connection leaves so
	/// its cursor/presence does not linger for other clients. Returns the
	/// change so the caller can broadcast it the same way a live awareness
	/// update is broadcast.
	pub fn remove_client_state(&self, client_id: u64) -> Option<AwarenessChange> {
		self.awareness.remove_state(client_id);
		Some(AwarenessChange { added: vec![], updated: vec![], removed: vec![client_id], origin: None })
	}
}

/// Encodes a connection id as a transaction origin. The CRDT treats origins
/// as opaque bytes; this is the only place that assigns them meaning.
fn connection_id_as_origin(id: u64) -> Vec<u8> {
	id.to_be_bytes().to_vec()
}

fn origin_as_connection_id(origin: &yrs::Origin) -> Option<u64> {
	let bytes: [u8; 8] = origin.as_ref().try_into().ok()?;
	Some(u64::from_be_bytes(bytes))
}

// vim: ts=4
