//! One instance per live note: owns the CRDT document and awareness, tracks
//! the set of connected clients, and fans out deltas between them.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use noted_types::NoteId;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use yrs::sync::Message;

use crate::adapter::{AwarenessChange, CrdtAdapter, LocalUpdate};
use crate::connection::Connection;
use crate::error::{ClResult, Error};

/// Invoked exactly once, when a hub tears itself down, so the registry can
/// remove its entry.
pub type OnDestroy = Box<dyn Fn(&NoteId) + Send + Sync>;

pub struct NoteHub {
	note_id: NoteId,
	adapter: CrdtAdapter,
	connections: Mutex<HashMap<u64, Arc<Connection>>>,
	closing: AtomicBool,
	on_destroy: OnDestroy,
	next_connection_id: AtomicU64,
}

impl NoteHub {
	/// Builds a hub seeded with `initial_content` and spawns the task that
	/// pumps locally-produced CRDT updates out to the connection set.
	///
	/// The CRDT library emits update events synchronously from inside the
	/// transaction that produced them; broadcasting directly from that
	/// callback would mean re-entering the hub while its own handler is
	/// still on the stack. Routing updates through this channel defers the
	/// broadcast to after the transaction commits, without reordering
	/// updates from a single origin.
	pub fn new(note_id: NoteId, initial_content: &str, on_destroy: OnDestroy) -> ClResult<Arc<Self>> {
		let (tx, mut rx) = mpsc::unbounded_channel::<LocalUpdate>();
		let adapter = CrdtAdapter::new(initial_content, move |update| {
			let _ = tx.send(update);
		})?;

		Ok(Arc::new_cyclic(|weak: &Weak<NoteHub>| {
			let pump_hub = weak.clone();
			tokio::spawn(async move {
				while let Some(update) = rx.recv().await {
					let Some(hub) = pump_hub.upgrade() else { break };
					hub.broadcast_update(update).await;
				}
			});

			NoteHub {
				note_id,
				adapter,
				connections: Mutex::new(HashMap::new()),
				closing: AtomicBool::new(false),
				on_destroy,
				next_connection_id: AtomicU64::new(0),
			}
		}))
	}

	pub fn note_id(&self) -> &NoteId {
		&self.note_id
	}

	pub fn next_connection_id(&self) -> u64 {
		self.next_connection_id.fetch_add(1, Ordering::SeqCst)
	}

	pub(crate) fn is_closing(&self) -> bool {
		self.closing.load(Ordering::SeqCst)
	}

	/// Adds an already-constructed connection to the set. Fails if the hub
	/// is already tearing down.
	pub async fn connect(&self, connection: Arc<Connection>) -> ClResult<()> {
		if self.is_closing() {
			return Err(Error::AdmissionDenied("hub is closing".into()));
		}
		self.connections.lock().await.insert(connection.id, connection);
		Ok(())
	}

	/// Removes a connection. Triggers teardown if it was the last one and
	/// the hub is not already closing (invariant I5).
	pub fn remove(&self, connection_id: u64) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
		Box::pin(async move {
			let change = self.adapter.remove_client_state(connection_id);
			let now_empty = {
				let mut connections = self.connections.lock().await;
				connections.remove(&connection_id);
				connections.is_empty()
			};
			if let Some(change) = change {
				self.broadcast_awareness(change).await;
			}
			if now_empty && !self.is_closing() {
				self.destroy().await;
			}
		})
	}

	/// Idempotent: only the first caller to observe `closing` flip actually
	/// tears anything down (invariant I3).
	pub fn destroy(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
		Box::pin(async move {
			if self.closing.swap(true, Ordering::SeqCst) {
				return;
			}
			info!(note = %self.note_id, "destroying note hub");
			let connections: Vec<Arc<Connection>> = {
				let mut map = self.connections.lock().await;
				map.drain().map(|(_, c)| c).collect()
			};
			for connection in connections {
				connection.disconnect().await;
			}
			(self.on_destroy)(&self.note_id);
		})
	}

	/// Routes one decoded SYNC or AWARENESS message from `origin`.
	pub async fn handle_incoming(&self, message: Message, origin: &Connection) -> ClResult<()> {
		match message {
			Message::Sync(sync_message) => {
				if let Some(response) = self.adapter.apply_sync(sync_message, origin.id)? {
					origin.send(response).await;
				}
			}
			Message::Awareness(update) => {
				if let Some(change) = self.adapter.apply_awareness(update, origin.id)? {
					self.broadcast_awareness(change).await;
				}
			}
			other => {
				debug!(note = %self.note_id, message = ?std::mem::discriminant(&other), "ignoring unsupported message kind");
			}
		}
		Ok(())
	}

	async fn broadcast_update(&self, update: LocalUpdate) {
		let frame = CrdtAdapter::encode_update(&update.bytes);
		let recipients: Vec<Arc<Connection>> = self.connections.lock().await.values().cloned().collect();
		for connection in recipients {
			if update.origin == Some(connection.id) {
				continue;
			}
			if !connection.is_synced() {
				continue;
			}
			connection.send(frame.clone()).await;
		}
	}

	fn broadcast_awareness(&self, change: AwarenessChange) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
		Box::pin(async move {
			let touched: Vec<u64> = change.added.into_iter().chain(change.updated).chain(change.removed).collect();
			if touched.is_empty() {
				return;
			}
			let frame = match self.adapter.encode_awareness_for(&touched) {
				Ok(Some(frame)) => frame,
				Ok(None) => return,
				Err(err) => {
					warn!(note = %self.note_id, error = %err, "failed to encode awareness update");
					return;
				}
			};
			let recipients: Vec<Arc<Connection>> = self.connections.lock().await.values().cloned().collect();
			for connection in recipients {
				connection.send(frame.clone()).await;
			}
		})
	}

	pub fn initial_sync_frame(&self) -> Vec<u8> {
		self.adapter.encode_initial_sync_request()
	}

	pub fn initial_awareness_frame(&self) -> Option<Vec<u8>> {
		self.adapter.encode_awareness_snapshot().ok().flatten()
	}

	/// Current flattened text, primarily for tests and diagnostics.
	pub fn snapshot_text(&self) -> String {
		self.adapter.snapshot_text()
	}

	pub async fn connection_count(&self) -> usize {
		self.connections.lock().await.len()
	}
}

// vim: ts=4
