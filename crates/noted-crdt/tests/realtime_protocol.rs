//! End-to-end wire-protocol tests driven entirely through the public
//! Connection/NoteHub surface over an in-memory transport, exchanging the
//! same bytes a real Yjs client would send and receive.
#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use noted_crdt::{ClResult, Connection, Inbound, NoteHub, TransportSink, TransportStream, TEXT_CHANNEL};
use noted_types::{NoteId, User};

use yrs::encoding::read::Cursor;
use yrs::sync::{Message, MessageReader, SyncMessage};
use yrs::updates::decoder::{Decode, DecoderV1};
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, Text, Transact};

struct MockSink(mpsc::UnboundedSender<Vec<u8>>);

#[async_trait]
impl TransportSink for MockSink {
	async fn send_binary(&self, bytes: Vec<u8>) -> ClResult<()> {
		let _ = self.0.send(bytes);
		Ok(())
	}

	async fn send_ping(&self) -> ClResult<()> {
		Ok(())
	}

	async fn close(&self) {}

	async fn is_open(&self) -> bool {
		true
	}
}

struct MockStream(mpsc::UnboundedReceiver<Inbound>);

#[async_trait]
impl TransportStream for MockStream {
	async fn recv(&mut self) -> Option<Inbound> {
		self.0.recv().await
	}
}

/// A minimal standalone Yjs-protocol peer, driving a server-side connection
/// over channels instead of a socket.
struct Client {
	doc: Doc,
	inbound: mpsc::UnboundedSender<Inbound>,
	outbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Client {
	async fn admit(hub: &Arc<NoteHub>, id: u64, username: &str) -> Self {
		let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
		let (from_server_tx, from_server_rx) = mpsc::unbounded_channel();
		let sink: Arc<dyn TransportSink> = Arc::new(MockSink(from_server_tx));
		let stream: Box<dyn TransportStream> = Box::new(MockStream(to_server_rx));
		let user = User { id: username.to_string(), username: username.to_string() };

		let (connection, monitor) = Connection::new(id, user, Arc::downgrade(hub), sink, Duration::from_secs(30));
		hub.connect(connection.clone()).await.expect("hub accepts connection while open");
		tokio::spawn(connection.run(stream, monitor));

		Self { doc: Doc::new(), inbound: to_server_tx, outbound: from_server_rx }
	}

	async fn recv_message(&mut self) -> Message {
		let bytes = self.outbound.recv().await.expect("server closed before sending expected frame");
		decode_message(&bytes)
	}

	fn send_message(&self, message: Message) {
		let _ = self.inbound.send(Inbound::Binary(message.encode_v1()));
	}

	async fn complete_initial_handshake(&mut self) {
		let Message::Sync(SyncMessage::SyncStep1(server_sv)) = self.recv_message().await else {
			panic!("expected initial STEP1 from server");
		};
		let diff = {
			let txn = self.doc.transact();
			txn.encode_state_as_update_v1(&server_sv)
		};
		self.send_message(Message::Sync(SyncMessage::SyncStep2(diff)));
	}

	fn apply(&self, update: &[u8]) {
		let decoded = yrs::Update::decode_v1(update).expect("update decodes");
		let mut txn = self.doc.transact_mut();
		txn.apply_update(decoded).expect("update applies");
	}

	fn text(&self) -> String {
		let text = self.doc.get_or_insert_text(TEXT_CHANNEL);
		let txn = self.doc.transact();
		text.get_string(&txn)
	}

	fn insert(&self, at: u32, value: &str) -> Vec<u8> {
		let text = self.doc.get_or_insert_text(TEXT_CHANNEL);
		let mut txn = self.doc.transact_mut();
		text.insert(&mut txn, at, value);
		txn.encode_update_v1()
	}
}

fn decode_message(bytes: &[u8]) -> Message {
	let mut reader = MessageReader::new(DecoderV1::new(Cursor::new(bytes)));
	reader.next().expect("a frame is present").expect("frame decodes")
}

fn new_hub(content: &str) -> Arc<NoteHub> {
	NoteHub::new(NoteId::from("note-1"), content, Box::new(|_| {})).expect("hub constructs")
}

#[tokio::test]
async fn solo_edit_applies_locally_without_self_broadcast() {
	let hub = new_hub("");
	let mut a = Client::admit(&hub, 0, "alice").await;
	a.complete_initial_handshake().await;

	let update = a.insert(0, "hi");
	a.send_message(Message::Sync(SyncMessage::Update(update)));

	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(hub.snapshot_text(), "hi");
	assert!(a.outbound.try_recv().is_err(), "origin must not receive its own update back");
}

#[tokio::test]
async fn two_clients_fan_out_updates_but_not_to_origin() {
	let hub = new_hub("");
	let mut a = Client::admit(&hub, 0, "alice").await;
	let mut b = Client::admit(&hub, 1, "bob").await;
	a.complete_initial_handshake().await;
	b.complete_initial_handshake().await;

	let update = a.insert(0, "x");
	a.send_message(Message::Sync(SyncMessage::Update(update.clone())));

	let Message::Sync(SyncMessage::Update(received)) = b.recv_message().await else {
		panic!("expected an UPDATE frame at B");
	};
	assert_eq!(received, update);
	b.apply(&received);
	assert_eq!(b.text(), "x");
	assert!(a.outbound.try_recv().is_err(), "A must not see its own update echoed back");
}

#[tokio::test]
async fn late_joiner_converges_before_being_marked_synced() {
	let hub = new_hub("");
	let mut a = Client::admit(&hub, 0, "alice").await;
	a.complete_initial_handshake().await;
	let update = a.insert(0, "abc");
	a.send_message(Message::Sync(SyncMessage::Update(update)));
	tokio::time::sleep(Duration::from_millis(20)).await;

	let mut b = Client::admit(&hub, 1, "bob").await;
	let Message::Sync(SyncMessage::SyncStep1(server_sv)) = b.recv_message().await else {
		panic!("expected initial STEP1 at B");
	};
	let diff = {
		let txn = b.doc.transact();
		txn.encode_state_as_update_v1(&server_sv)
	};
	b.send_message(Message::Sync(SyncMessage::SyncStep2(diff)));

	let Message::Sync(SyncMessage::SyncStep2(reply)) = b.recv_message().await else {
		panic!("expected STEP2 response to B's offered state vector");
	};
	b.apply(&reply);
	assert_eq!(b.text(), "abc");
}

#[tokio::test]
async fn last_leaver_tears_down_the_hub_exactly_once() {
	let (destroyed_tx, mut destroyed_rx) = mpsc::unbounded_channel::<NoteId>();
	let on_destroy: noted_crdt::OnDestroy = Box::new(move |id: &NoteId| {
		let _ = destroyed_tx.send(id.clone());
	});
	let hub = NoteHub::new(NoteId::from("note-1"), "", on_destroy).expect("hub constructs");

	let a = Client::admit(&hub, 0, "alice").await;
	let b = Client::admit(&hub, 1, "bob").await;
	assert_eq!(hub.connection_count().await, 2);

	drop(a);
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(hub.connection_count().await, 1);

	drop(b);
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(hub.connection_count().await, 0);

	let destroyed_id = destroyed_rx.recv().await.expect("on_destroy fired");
	assert_eq!(destroyed_id, NoteId::from("note-1"));
	assert!(destroyed_rx.try_recv().is_err(), "destroy must fire exactly once");
}

// vim: ts=4
