//! Process-wide mapping from note id to note hub. Creates hubs lazily,
//! coalescing concurrent creators of the same note onto a single initial-
//! content load (invariant P5).

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use noted_types::NoteId;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ClResult, Error};
use crate::hub::{NoteHub, OnDestroy};

type CreateFuture = Shared<BoxFuture<'static, Result<Arc<NoteHub>, Error>>>;

pub struct HubRegistry {
	hubs: Mutex<HashMap<NoteId, Arc<NoteHub>>>,
	in_flight: Mutex<HashMap<NoteId, CreateFuture>>,
}

impl HubRegistry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self { hubs: Mutex::new(HashMap::new()), in_flight: Mutex::new(HashMap::new()) })
	}

	/// Non-creating lookup. A hub that is already tearing down is treated
	/// as absent: `on_destroy` deregisters it asynchronously, so there is a
	/// window where a closing hub still sits in the map and must not be
	/// handed to a new connection.
	pub async fn get(&self, note_id: &NoteId) -> Option<Arc<NoteHub>> {
		self.hubs.lock().await.get(note_id).filter(|hub| !hub.is_closing()).cloned()
	}

	/// Returns the hub for `note_id`, creating it via `loader` if it does
	/// not exist yet. `loader` runs at most once per hub lifetime even
	/// under concurrent callers: the first caller installs a shared future
	/// that the rest await instead of racing their own creation.
	pub async fn get_or_create<F, Fut>(self: &Arc<Self>, note_id: NoteId, loader: F) -> ClResult<Arc<NoteHub>>
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = ClResult<String>> + Send + 'static,
	{
		if let Some(hub) = self.get(&note_id).await {
			return Ok(hub);
		}

		let shared = {
			let mut in_flight = self.in_flight.lock().await;
			if let Some(existing) = in_flight.get(&note_id) {
				existing.clone()
			} else {
				let future = self.clone().create(note_id.clone(), loader).boxed().shared();
				in_flight.insert(note_id.clone(), future.clone());
				future
			}
		};

		let result = shared.await;
		self.in_flight.lock().await.remove(&note_id);
		result
	}

	async fn create<F, Fut>(self: Arc<Self>, note_id: NoteId, loader: F) -> Result<Arc<NoteHub>, Error>
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = ClResult<String>> + Send + 'static,
	{
		let content = loader().await.map_err(|err| Error::LoaderFault(err.to_string()))?;

		let registry = self.clone();
		let on_destroy: OnDestroy = Box::new(move |id: &NoteId| {
			let registry = registry.clone();
			let id = id.clone();
			tokio::spawn(async move { registry.remove(&id).await });
		});

		let hub = NoteHub::new(note_id.clone(), &content, on_destroy)?;
		self.hubs.lock().await.insert(note_id, hub.clone());
		Ok(hub)
	}

	async fn remove(&self, note_id: &NoteId) {
		if self.hubs.lock().await.remove(note_id).is_some() {
			debug!(note = %note_id, "hub deregistered");
		}
	}
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[tokio::test]
	async fn concurrent_get_or_create_loads_exactly_once() {
		let registry = HubRegistry::new();
		let note_id = NoteId::from("note-1");
		let load_count = Arc::new(AtomicUsize::new(0));

		let mut handles = Vec::new();
		for _ in 0..8 {
			let registry = registry.clone();
			let note_id = note_id.clone();
			let load_count = load_count.clone();
			handles.push(tokio::spawn(async move {
				registry
					.get_or_create(note_id, move || async move {
						load_count.fetch_add(1, Ordering::SeqCst);
						tokio::task::yield_now().await;
						Ok("seed".to_string())
					})
					.await
			}));
		}

		let mut hubs = Vec::new();
		for handle in handles {
			hubs.push(handle.await.expect("task panicked").expect("hub creation failed"));
		}

		assert_eq!(load_count.load(Ordering::SeqCst), 1);
		let first = Arc::as_ptr(&hubs[0]);
		assert!(hubs.iter().all(|hub| Arc::as_ptr(hub) == first));
	}

	#[tokio::test]
	async fn get_returns_none_for_unknown_note() {
		let registry = HubRegistry::new();
		assert!(registry.get(&NoteId::from("missing")).await.is_none());
	}
}

// vim: ts=4
