//! The narrow interface a Connection needs from its upgraded transport. The
//! HTTP upgrade itself is an external collaborator (see the admitter); this
//! split-sink/stream seam keeps the hub/connection machinery independent of
//! any particular websocket library, and lets tests drive connections over
//! an in-memory channel instead of a real socket.

use async_trait::async_trait;

use crate::error::ClResult;

/// One inbound event a transport can produce.
pub enum Inbound {
	Binary(Vec<u8>),
	Ping,
	Pong,
	Close,
}

/// The write half. Shared (via `Arc`) between the connection's own keep-alive
/// pings and the hub's broadcast fan-out, mirroring how a split websocket
/// sink is shared across the tasks that write to one connection.
#[async_trait]
pub trait TransportSink: Send + Sync {
	/// Sends a binary frame. Implementations should treat "not open" as a
	/// silent no-op per the Connection contract, not an error.
	async fn send_binary(&self, bytes: Vec<u8>) -> ClResult<()>;

	/// Sends a transport-level ping.
	async fn send_ping(&self) -> ClResult<()>;

	/// Closes the transport. Idempotent.
	async fn close(&self);

	/// Whether the transport is still open. Checked once admission has
	/// loaded the target hub, to avoid finalizing a connection whose
	/// socket went away during the (possibly slow) initial content load.
	async fn is_open(&self) -> bool;
}

/// The read half. Owned exclusively by the connection's receive loop.
#[async_trait]
pub trait TransportStream: Send {
	/// Receives the next inbound event, or `None` once the transport is
	/// exhausted (equivalent to a close with no further events).
	async fn recv(&mut self) -> Option<Inbound>;
}

// vim: ts=4
