//! Per-connection liveness tracking: periodic ping, pong bookkeeping, forced
//! close on a missed interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

/// Default ping period. HedgeDoc-compatible clients expect roughly this
/// cadence; one missed pong closes the connection (§ boundary B3).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Shared liveness flag a connection's read loop flips on every inbound pong.
/// The monitor clears it after each tick so a miss is detected on the next.
#[derive(Clone)]
pub struct PongTracker(Arc<AtomicBool>);

impl PongTracker {
	pub fn new() -> Self {
		Self(Arc::new(AtomicBool::new(true)))
	}

	pub fn record_pong(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	fn take_and_reset(&self) -> bool {
		self.0.swap(false, Ordering::SeqCst)
	}
}

impl Default for PongTracker {
	fn default() -> Self {
		Self::new()
	}
}

/// Outcome of one keep-alive tick, reported to the connection driving the
/// transport (the monitor itself has no transport handle).
pub enum Tick {
	/// Pong observed since the last tick; caller should send a fresh ping.
	SendPing,
	/// No pong observed; caller must close the transport.
	Timeout,
}

/// Runs the periodic liveness check, yielding one [`Tick`] per interval,
/// until the caller drops the returned stream handle.
pub struct KeepAliveMonitor {
	tracker: PongTracker,
	period: Duration,
}

impl KeepAliveMonitor {
	pub fn new(period: Duration) -> (Self, PongTracker) {
		let tracker = PongTracker::new();
		(Self { tracker: tracker.clone(), period }, tracker)
	}

	/// Awaits the next tick. Intended to be raced against the connection's
	/// other event sources via `tokio::select!`.
	pub async fn tick(&mut self) -> Tick {
		let mut ticker = interval(self.period);
		ticker.tick().await; // first tick fires immediately; consume it
		ticker.tick().await;
		if self.tracker.take_and_reset() {
			Tick::SendPing
		} else {
			Tick::Timeout
		}
	}
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn reports_timeout_when_no_pong_recorded() {
		let (mut monitor, _tracker) = KeepAliveMonitor::new(Duration::from_millis(10));
		match monitor.tick().await {
			Tick::Timeout => {}
			Tick::SendPing => panic!("expected timeout with no recorded pong"),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn reports_send_ping_when_pong_recorded() {
		let (mut monitor, tracker) = KeepAliveMonitor::new(Duration::from_millis(10));
		tracker.record_pong();
		match monitor.tick().await {
			Tick::SendPing => {}
			Tick::Timeout => panic!("expected healthy tick after recorded pong"),
		}
	}
}

// vim: ts=4
