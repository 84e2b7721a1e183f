//! Binary frame encoding/decoding: the leading variable-length message-type
//! tag and the sub-frames it introduces. Stateless.
//!
//! The SYNC and AWARENESS tags line up with the wire format the underlying
//! CRDT library already speaks (its own leading tag byte is tag 0 for sync,
//! tag 1 for awareness), so decoding those two delegates straight to it. Tag
//! 2 is a reserved, HedgeDoc-specific extension this implementation does not
//! interpret; its payload is kept as opaque bytes for logging.

use yrs::encoding::read::Cursor;
use yrs::sync::{Message, MessageReader};
use yrs::updates::decoder::DecoderV1;

use crate::error::{ClResult, Error};

/// The channel name of the single shared-text field every hub's document
/// exposes.
pub const TEXT_CHANNEL: &str = "codemirror";

pub const TAG_SYNC: u64 = 0;
pub const TAG_AWARENESS: u64 = 1;
pub const TAG_HEDGEDOC: u64 = 2;

/// A decoded inbound frame.
pub enum Frame {
	/// A SYNC or AWARENESS message, already decoded by the CRDT library.
	Message(Message),
	/// The reserved HEDGEDOC tag, kept opaque.
	Hedgedoc(Vec<u8>),
}

/// Reads a LEB128-style variable-length unsigned integer from the front of
/// `buf`. Returns the value and the number of bytes it occupied.
fn read_var_u64(buf: &[u8]) -> Option<(u64, usize)> {
	let mut num: u64 = 0;
	let mut shift = 0;
	for (i, &byte) in buf.iter().enumerate() {
		num |= u64::from(byte & 0x7f) << shift;
		if byte & 0x80 == 0 {
			return Some((num, i + 1));
		}
		shift += 7;
		if shift > 63 {
			return None;
		}
	}
	None
}

/// Decodes a single frame's leading tag and routes the remainder.
pub fn decode(bytes: &[u8]) -> ClResult<Frame> {
	let (tag, consumed) =
		read_var_u64(bytes).ok_or_else(|| Error::MalformedFrame("truncated message tag".into()))?;
	match tag {
		TAG_SYNC | TAG_AWARENESS => {
			let mut decoder = DecoderV1::new(Cursor::new(bytes));
			let mut reader = MessageReader::new(&mut decoder);
			let message = reader
				.next()
				.ok_or_else(|| Error::MalformedFrame("empty sync/awareness frame".into()))?
				.map_err(|e| Error::MalformedFrame(e.to_string()))?;
			Ok(Frame::Message(message))
		}
		TAG_HEDGEDOC => Ok(Frame::Hedgedoc(bytes[consumed..].to_vec())),
		other => Err(Error::MalformedFrame(format!("unknown frame tag {other}"))),
	}
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
	use super::*;

	#[test]
	fn decodes_unknown_tag_as_malformed() {
		let bytes = [9u8];
		let err = decode(&bytes).err().expect("expected malformed frame error");
		assert!(matches!(err, Error::MalformedFrame(_)));
	}

	#[test]
	fn decodes_hedgedoc_tag_as_opaque_payload() {
		let bytes = [TAG_HEDGEDOC as u8, 1, 2, 3];
		match decode(&bytes).expect("decode") {
			Frame::Hedgedoc(payload) => assert_eq!(payload, vec![1, 2, 3]),
			Frame::Message(_) => panic!("expected hedgedoc frame"),
		}
	}

	#[test]
	fn rejects_truncated_tag() {
		let bytes: [u8; 1] = [0x80];
		assert!(decode(&bytes).is_err());
	}
}

// vim: ts=4
