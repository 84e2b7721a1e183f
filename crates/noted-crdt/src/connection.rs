//! Owns one transport endpoint: runs the sync handshake, serializes outbound
//! writes through a shared sink, and routes inbound frames to the parent
//! hub.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use noted_types::User;
use tracing::{debug, warn};

use yrs::sync::{Message, SyncMessage};

use std::time::Duration;

use crate::frame::{self, Frame};
use crate::hub::NoteHub;
use crate::keepalive::{KeepAliveMonitor, PongTracker, Tick};
use crate::transport::{Inbound, TransportSink, TransportStream};

pub struct Connection {
	pub id: u64,
	pub user: User,
	hub: std::sync::Weak<NoteHub>,
	sink: Arc<dyn TransportSink>,
	synced: AtomicBool,
	alive: AtomicBool,
	pong: PongTracker,
}

impl Connection {
	pub fn new(
		id: u64,
		user: User,
		hub: std::sync::Weak<NoteHub>,
		sink: Arc<dyn TransportSink>,
		keepalive_period: Duration,
	) -> (Arc<Self>, KeepAliveMonitor) {
		let (monitor, pong) = KeepAliveMonitor::new(keepalive_period);
		let connection = Arc::new(Self { id, user, hub, sink, synced: AtomicBool::new(false), alive: AtomicBool::new(true), pong });
		(connection, monitor)
	}

	pub fn is_synced(&self) -> bool {
		self.synced.load(Ordering::SeqCst)
	}

	pub fn is_alive(&self) -> bool {
		self.alive.load(Ordering::SeqCst)
	}

	fn mark_synced(&self) {
		self.synced.store(true, Ordering::SeqCst);
	}

	/// Sends a pre-encoded frame. A no-op once the connection is no longer
	/// alive; write errors close the connection but never propagate.
	pub fn send(&self, bytes: Vec<u8>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
		Box::pin(async move {
			if !self.is_alive() {
				return;
			}
			if let Err(err) = self.sink.send_binary(bytes).await {
				warn!(connection = self.id, error = %err, "write failed, closing connection");
				self.disconnect().await;
			}
		})
	}

	/// Idempotently tears the connection down and removes it from its hub.
	pub fn disconnect(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
		Box::pin(async move {
			if self.alive.swap(false, Ordering::SeqCst) {
				self.sink.close().await;
				if let Some(hub) = self.hub.upgrade() {
					hub.remove(self.id).await;
				}
			}
		})
	}

	/// Drives this connection for its entire lifetime: initial handshake,
	/// inbound frame dispatch, and keep-alive, until the transport closes or
	/// the peer stops responding.
	pub async fn run(self: Arc<Self>, mut stream: Box<dyn TransportStream>, mut monitor: KeepAliveMonitor) {
		let Some(hub) = self.hub.upgrade() else {
			self.disconnect().await;
			return;
		};
		self.send(hub.initial_sync_frame()).await;
		if let Some(awareness) = hub.initial_awareness_frame() {
			self.send(awareness).await;
		}
		drop(hub);

		loop {
			tokio::select! {
				inbound = stream.recv() => {
					match inbound {
						Some(Inbound::Binary(bytes)) => self.handle_inbound(&bytes).await,
						Some(Inbound::Pong) => self.pong.record_pong(),
						Some(Inbound::Ping) => {}
						Some(Inbound::Close) | None => {
							self.disconnect().await;
							break;
						}
					}
				}
				tick = monitor.tick() => {
					match tick {
						Tick::SendPing => {
							if self.sink.send_ping().await.is_err() {
								self.disconnect().await;
								break;
							}
						}
						Tick::Timeout => {
							debug!(connection = self.id, "keep-alive timeout, closing connection");
							self.disconnect().await;
							break;
						}
					}
				}
			}
			if !self.is_alive() {
				break;
			}
		}
	}

	async fn handle_inbound(&self, bytes: &[u8]) {
		let Some(hub) = self.hub.upgrade() else {
			return;
		};
		let frame = match frame::decode(bytes) {
			Ok(frame) => frame,
			Err(err) => {
				warn!(connection = self.id, error = %err, "dropping malformed frame");
				return;
			}
		};
		match frame {
			Frame::Hedgedoc(payload) => {
				debug!(connection = self.id, bytes = payload.len(), "ignoring reserved hedgedoc frame");
			}
			Frame::Message(message) => {
				// Completing the handshake (a STEP2 reply to our offered state
				// vector, or any update once caught up) is what makes this
				// connection eligible for incremental broadcasts.
				let completes_handshake =
					matches!(&message, Message::Sync(SyncMessage::SyncStep2(_) | SyncMessage::Update(_)));
				if let Err(err) = hub.handle_incoming(message, self).await {
					warn!(connection = self.id, error = %err, "handler fault processing frame");
				} else if completes_handshake {
					self.mark_synced();
				}
			}
		}
	}
}

// vim: ts=4
