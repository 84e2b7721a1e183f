//! Adapts an axum websocket into the `noted_crdt::transport` seam: a shared,
//! mutex-guarded sink (mirroring how the bus/rtdb handlers split a socket
//! and hand the write half to multiple tasks) and an exclusively-owned
//! stream for the connection's own receive loop.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use noted_crdt::{ClResult, Error, Inbound, TransportSink, TransportStream};

pub struct AxumSink {
	inner: Mutex<SplitSink<WebSocket, WsMessage>>,
	open: AtomicBool,
}

impl AxumSink {
	pub fn new(sink: SplitSink<WebSocket, WsMessage>) -> Self {
		Self { inner: Mutex::new(sink), open: AtomicBool::new(true) }
	}
}

#[async_trait]
impl TransportSink for AxumSink {
	async fn send_binary(&self, bytes: Vec<u8>) -> ClResult<()> {
		let result = self.inner.lock().await.send(WsMessage::Binary(bytes.into())).await;
		if result.is_err() {
			self.open.store(false, Ordering::SeqCst);
		}
		result.map_err(|e| Error::TransportFault(e.to_string()))
	}

	async fn send_ping(&self) -> ClResult<()> {
		let result = self.inner.lock().await.send(WsMessage::Ping(Vec::new().into())).await;
		if result.is_err() {
			self.open.store(false, Ordering::SeqCst);
		}
		result.map_err(|e| Error::TransportFault(e.to_string()))
	}

	async fn close(&self) {
		self.open.store(false, Ordering::SeqCst);
		let mut sink = self.inner.lock().await;
		let _ = sink
			.send(WsMessage::Close(Some(CloseFrame { code: 1000, reason: "closed".into() })))
			.await;
		let _ = sink.close().await;
	}

	async fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst)
	}
}

pub struct AxumStream {
	inner: SplitStream<WebSocket>,
}

impl AxumStream {
	pub fn new(stream: SplitStream<WebSocket>) -> Self {
		Self { inner: stream }
	}
}

#[async_trait]
impl TransportStream for AxumStream {
	async fn recv(&mut self) -> Option<Inbound> {
		loop {
			return match self.inner.next().await {
				Some(Ok(WsMessage::Binary(bytes))) => Some(Inbound::Binary(bytes.into())),
				Some(Ok(WsMessage::Ping(_))) => Some(Inbound::Ping),
				Some(Ok(WsMessage::Pong(_))) => Some(Inbound::Pong),
				Some(Ok(WsMessage::Close(_))) => Some(Inbound::Close),
				Some(Ok(WsMessage::Text(_))) => continue, // no text subprotocol; drop and keep reading
				Some(Err(_)) | None => None,
			};
		}
	}
}

// vim: ts=4
