//! On-disk wire format: segment headers, key/value/tombstone records, and
//! the CRC-chained commit records that terminate a batch of writes.
//!
//! All multi-byte integers are big-endian. Every record is padded to an
//! 8-byte boundary. Layouts mirror `zeroskip-priv.h`'s `zs_header`,
//! `zs_key_base`, `zs_val_base`, `zs_short_commit` and `zs_long_commit`.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder};

pub const SIGNATURE: u64 = 0x5A45524F534B4950; // "ZEROSKIP"
pub const VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 40;

pub const MAX_SHORT_KEY_LEN: usize = 65535;
pub const MAX_SHORT_VAL_LEN: usize = 16_777_215;

/// Record type tags, as written to disk. `LONG` is OR'd onto `KEY`,
/// `VALUE`, `COMMIT`, `FINAL` and `DELETED` when the short-field variant
/// can't hold the length/offset.
pub mod rt {
	pub const UNUSED: u8 = 0;
	pub const KEY: u8 = 1;
	pub const VALUE: u8 = 2;
	pub const COMMIT: u8 = 4;
	pub const SECOND_HALF_COMMIT: u8 = 8;
	pub const FINAL: u8 = 16;
	pub const LONG: u8 = 32;
	pub const DELETED: u8 = 64;

	pub const LONG_KEY: u8 = KEY | LONG;
	pub const LONG_VALUE: u8 = VALUE | LONG;
	pub const LONG_COMMIT: u8 = COMMIT | LONG;
	pub const LONG_FINAL: u8 = FINAL | LONG;
	pub const LONG_DELETED: u8 = DELETED | LONG;
	pub const LONG_SECOND_HALF: u8 = SECOND_HALF_COMMIT | LONG;
}

pub fn round_up8(n: usize) -> usize {
	(n + 7) & !7
}

/// The 40-byte segment file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	pub uuid: uuid::Uuid,
	pub start_idx: u32,
	pub end_idx: u32,
}

impl Header {
	pub fn encode(&self) -> [u8; HEADER_SIZE] {
		let mut buf = [0u8; HEADER_SIZE];
		BigEndian::write_u64(&mut buf[0..8], SIGNATURE);
		BigEndian::write_u32(&mut buf[8..12], VERSION);
		buf[12..28].copy_from_slice(self.uuid.as_bytes());
		BigEndian::write_u32(&mut buf[28..32], self.start_idx);
		BigEndian::write_u32(&mut buf[32..36], self.end_idx);
		let crc = crc32fast::hash(&buf[0..36]);
		BigEndian::write_u32(&mut buf[36..40], crc);
		buf
	}

	pub fn decode(buf: &[u8]) -> Result<Header> {
		if buf.len() < HEADER_SIZE {
			return Err(Error::Corrupted("segment header truncated".into()));
		}
		let sig = BigEndian::read_u64(&buf[0..8]);
		if sig != SIGNATURE {
			return Err(Error::Corrupted("bad segment signature".into()));
		}
		let version = BigEndian::read_u32(&buf[8..12]);
		if version != VERSION {
			return Err(Error::Corrupted(format!("unsupported segment version {version}")));
		}
		let uuid = uuid::Uuid::from_slice(&buf[12..28])
			.map_err(|e| Error::Corrupted(format!("bad uuid in header: {e}")))?;
		let start_idx = BigEndian::read_u32(&buf[28..32]);
		let end_idx = BigEndian::read_u32(&buf[32..36]);
		let stored_crc = BigEndian::read_u32(&buf[36..40]);
		let crc = crc32fast::hash(&buf[0..36]);
		if crc != stored_crc {
			return Err(Error::Corrupted("segment header crc mismatch".into()));
		}
		Ok(Header { uuid, start_idx, end_idx })
	}
}

/// A decoded record, along with how many bytes (including padding) it
/// occupied on disk.
#[derive(Debug, Clone)]
pub enum Record {
	Key { key: Vec<u8>, value_offset: u64, len: usize },
	Value { value: Vec<u8>, len: usize },
	Deleted { key: Vec<u8>, len: usize },
	Commit { payload_len: u64, crc: u32, len: usize },
	Final { payload_len: u64, crc: u32, len: usize },
}

impl Record {
	pub fn on_disk_len(&self) -> usize {
		match self {
			Record::Key { len, .. }
			| Record::Value { len, .. }
			| Record::Deleted { len, .. }
			| Record::Commit { len, .. }
			| Record::Final { len, .. } => *len,
		}
	}
}

fn encode_key_like(tag_short: u8, tag_long: u8, key: &[u8], value_offset: u64) -> Vec<u8> {
	let mut out = Vec::with_capacity(24 + round_up8(key.len()));
	if key.len() <= MAX_SHORT_KEY_LEN && value_offset < (1u64 << 40) {
		let word0 = ((tag_short as u64) << 56) | ((key.len() as u64) << 40) | (value_offset & 0xFF_FFFF_FFFF);
		let mut buf = [0u8; 8];
		BigEndian::write_u64(&mut buf, word0);
		out.extend_from_slice(&buf);
		out.extend_from_slice(&[0u8; 16]); // reserved llen/lval_offset
	} else {
		let word0 = (tag_long as u64) << 56;
		let mut buf = [0u8; 24];
		BigEndian::write_u64(&mut buf[0..8], word0);
		BigEndian::write_u64(&mut buf[8..16], key.len() as u64);
		BigEndian::write_u64(&mut buf[16..24], value_offset);
		out.extend_from_slice(&buf);
	}
	out.extend_from_slice(key);
	let padded = round_up8(key.len());
	out.resize(out.len() + (padded - key.len()), 0);
	out
}

pub fn encode_key_record(key: &[u8], value_offset: u64) -> Vec<u8> {
	encode_key_like(rt::KEY, rt::LONG_KEY, key, value_offset)
}

pub fn encode_deleted_record(key: &[u8]) -> Vec<u8> {
	encode_key_like(rt::DELETED, rt::LONG_DELETED, key, 0)
}

pub fn encode_value_record(value: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(16 + round_up8(value.len()));
	if value.len() <= MAX_SHORT_VAL_LEN {
		let word0 = ((rt::VALUE as u64) << 56) | ((value.len() as u64) << 32);
		let mut buf = [0u8; 8];
		BigEndian::write_u64(&mut buf, word0);
		out.extend_from_slice(&buf);
		out.extend_from_slice(&[0u8; 8]); // reserved llen
	} else {
		let word0 = (rt::LONG_VALUE as u64) << 56;
		let mut buf = [0u8; 16];
		BigEndian::write_u64(&mut buf[0..8], word0);
		BigEndian::write_u64(&mut buf[8..16], value.len() as u64);
		out.extend_from_slice(&buf);
	}
	out.extend_from_slice(value);
	let padded = round_up8(value.len());
	out.resize(out.len() + (padded - value.len()), 0);
	out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
	Commit,
	Final,
}

/// Builds the commit word(s) for a batch of `payload_len` bytes, given the
/// already-computed CRC32 for that payload folded together with this very
/// word's own bytes (crc field zeroed). See `Segment::close_commit` for how
/// the crc value passed in here is produced.
pub fn encode_commit_word(kind: CommitKind, payload_len: u64, crc: u32) -> Vec<u8> {
	if payload_len < (1u64 << 24) {
		let ty = match kind {
			CommitKind::Commit => rt::COMMIT,
			CommitKind::Final => rt::FINAL,
		};
		let word = ((ty as u64) << 56) | (payload_len << 32) | (crc as u64);
		let mut buf = [0u8; 8];
		BigEndian::write_u64(&mut buf, word);
		buf.to_vec()
	} else {
		let ty1 = match kind {
			CommitKind::Commit => rt::LONG_COMMIT,
			CommitKind::Final => rt::LONG_FINAL,
		};
		let mut buf = [0u8; 24];
		BigEndian::write_u64(&mut buf[0..8], (ty1 as u64) << 56);
		BigEndian::write_u64(&mut buf[8..16], payload_len);
		let word2 = ((rt::LONG_SECOND_HALF as u64) << 56) | (crc as u64);
		BigEndian::write_u64(&mut buf[16..24], word2);
		buf.to_vec()
	}
}

/// Same bytes as [`encode_commit_word`] but with the trailing crc32 field
/// zeroed, used to fold the word's own bytes into the running payload crc.
pub fn commit_word_crc_placeholder(kind: CommitKind, payload_len: u64) -> Vec<u8> {
	encode_commit_word(kind, payload_len, 0)
}

/// Attempts to parse a commit record (short or long) whose last byte is at
/// `end` (exclusive) within `buf`. Returns the decoded commit plus its
/// total on-disk length, trying short (8 bytes) first and long (24 bytes)
/// second, matching the original's "read backwards" probing order used to
/// locate a packed file's index footer.
pub fn decode_commit_before(buf: &[u8], end: usize) -> Option<Record> {
	if end >= 8 {
		let word = BigEndian::read_u64(&buf[end - 8..end]);
		let ty = (word >> 56) as u8;
		if ty == rt::COMMIT || ty == rt::FINAL {
			let payload_len = (word >> 32) & 0xFF_FFFF;
			let crc = (word & 0xFFFF_FFFF) as u32;
			let kind = if ty == rt::FINAL { CommitKind::Final } else { CommitKind::Commit };
			return Some(mk_commit_record(kind, payload_len, crc, 8));
		}
	}
	if end >= 24 {
		let word0 = BigEndian::read_u64(&buf[end - 24..end - 16]);
		let ty1 = (word0 >> 56) as u8;
		if ty1 == rt::LONG_COMMIT || ty1 == rt::LONG_FINAL {
			let payload_len = BigEndian::read_u64(&buf[end - 16..end - 8]);
			let word2 = BigEndian::read_u64(&buf[end - 8..end]);
			let crc = (word2 & 0xFFFF_FFFF) as u32;
			let kind = if ty1 == rt::LONG_FINAL { CommitKind::Final } else { CommitKind::Commit };
			return Some(mk_commit_record(kind, payload_len, crc, 24));
		}
	}
	None
}

fn mk_commit_record(kind: CommitKind, payload_len: u64, crc: u32, len: usize) -> Record {
	match kind {
		CommitKind::Commit => Record::Commit { payload_len, crc, len },
		CommitKind::Final => Record::Final { payload_len, crc, len },
	}
}

/// Decodes one record starting at `pos` in `buf`. Returns `None` at an
/// unused/zero byte (end of written data within a mapped region).
pub fn decode_record_at(buf: &[u8], pos: usize) -> Result<Option<Record>> {
	if pos >= buf.len() {
		return Ok(None);
	}
	let ty = buf[pos];
	if ty == rt::UNUSED {
		return Ok(None);
	}
	match ty {
		rt::KEY | rt::LONG_KEY | rt::DELETED | rt::LONG_DELETED => {
			decode_key_like(buf, pos, ty)
		}
		rt::VALUE | rt::LONG_VALUE => decode_value(buf, pos, ty),
		rt::COMMIT | rt::FINAL => {
			if pos + 8 > buf.len() {
				return Err(Error::Corrupted("truncated commit".into()));
			}
			let word = BigEndian::read_u64(&buf[pos..pos + 8]);
			let payload_len = (word >> 32) & 0xFF_FFFF;
			let crc = (word & 0xFFFF_FFFF) as u32;
			let kind = if ty == rt::FINAL { CommitKind::Final } else { CommitKind::Commit };
			Ok(Some(mk_commit_record(kind, payload_len, crc, 8)))
		}
		rt::LONG_COMMIT | rt::LONG_FINAL => {
			if pos + 24 > buf.len() {
				return Err(Error::Corrupted("truncated long commit".into()));
			}
			let payload_len = BigEndian::read_u64(&buf[pos + 8..pos + 16]);
			let word2 = BigEndian::read_u64(&buf[pos + 16..pos + 24]);
			let crc = (word2 & 0xFFFF_FFFF) as u32;
			let kind = if ty == rt::LONG_FINAL { CommitKind::Final } else { CommitKind::Commit };
			Ok(Some(mk_commit_record(kind, payload_len, crc, 24)))
		}
		other => Err(Error::Corrupted(format!("unknown record type byte {other}"))),
	}
}

fn decode_key_like(buf: &[u8], pos: usize, ty: u8) -> Result<Option<Record>> {
	let is_long = ty & rt::LONG != 0;
	let is_deleted = ty & rt::DELETED != 0;
	if !is_long {
		if pos + 24 > buf.len() {
			return Err(Error::Corrupted("truncated key record".into()));
		}
		let word0 = BigEndian::read_u64(&buf[pos..pos + 8]);
		let keylen = ((word0 >> 40) & 0xFFFF) as usize;
		let value_offset = word0 & 0xFF_FFFF_FFFF;
		let data_start = pos + 24;
		if data_start + keylen > buf.len() {
			return Err(Error::Corrupted("truncated key payload".into()));
		}
		let key = buf[data_start..data_start + keylen].to_vec();
		let total = 24 + round_up8(keylen);
		Ok(Some(if is_deleted {
			Record::Deleted { key, len: total }
		} else {
			Record::Key { key, value_offset, len: total }
		}))
	} else {
		if pos + 24 > buf.len() {
			return Err(Error::Corrupted("truncated long key record".into()));
		}
		let keylen = BigEndian::read_u64(&buf[pos + 8..pos + 16]) as usize;
		let value_offset = BigEndian::read_u64(&buf[pos + 16..pos + 24]);
		let data_start = pos + 24;
		if data_start + keylen > buf.len() {
			return Err(Error::Corrupted("truncated long key payload".into()));
		}
		let key = buf[data_start..data_start + keylen].to_vec();
		let total = 24 + round_up8(keylen);
		Ok(Some(if is_deleted {
			Record::Deleted { key, len: total }
		} else {
			Record::Key { key, value_offset, len: total }
		}))
	}
}

fn decode_value(buf: &[u8], pos: usize, ty: u8) -> Result<Option<Record>> {
	let is_long = ty & rt::LONG != 0;
	if !is_long {
		if pos + 16 > buf.len() {
			return Err(Error::Corrupted("truncated value record".into()));
		}
		let word0 = BigEndian::read_u64(&buf[pos..pos + 8]);
		let vallen = ((word0 >> 32) & 0xFF_FFFF) as usize;
		let data_start = pos + 16;
		if data_start + vallen > buf.len() {
			return Err(Error::Corrupted("truncated value payload".into()));
		}
		let value = buf[data_start..data_start + vallen].to_vec();
		let total = 16 + round_up8(vallen);
		Ok(Some(Record::Value { value, len: total }))
	} else {
		if pos + 16 > buf.len() {
			return Err(Error::Corrupted("truncated long value record".into()));
		}
		let vallen = BigEndian::read_u64(&buf[pos + 8..pos + 16]) as usize;
		let data_start = pos + 16;
		if data_start + vallen > buf.len() {
			return Err(Error::Corrupted("truncated long value payload".into()));
		}
		let value = buf[data_start..data_start + vallen].to_vec();
		let total = 16 + round_up8(vallen);
		Ok(Some(Record::Value { value, len: total }))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_round_trip() {
		let h = Header { uuid: uuid::Uuid::new_v4(), start_idx: 0, end_idx: 0 };
		let buf = h.encode();
		let back = Header::decode(&buf).unwrap();
		assert_eq!(h, back);
	}

	#[test]
	fn header_crc_mismatch_detected() {
		let h = Header { uuid: uuid::Uuid::new_v4(), start_idx: 1, end_idx: 2 };
		let mut buf = h.encode();
		buf[5] ^= 0xFF;
		assert!(Header::decode(&buf).is_err());
	}

	#[test]
	fn short_key_round_trip() {
		let rec = encode_key_record(b"hello", 128);
		let decoded = decode_record_at(&rec, 0).unwrap().unwrap();
		match decoded {
			Record::Key { key, value_offset, len } => {
				assert_eq!(key, b"hello");
				assert_eq!(value_offset, 128);
				assert_eq!(len, rec.len());
			}
			_ => panic!("wrong variant"),
		}
	}

	#[test]
	fn long_key_round_trip() {
		let key = vec![b'x'; MAX_SHORT_KEY_LEN + 10];
		let rec = encode_key_record(&key, 99);
		let decoded = decode_record_at(&rec, 0).unwrap().unwrap();
		match decoded {
			Record::Key { key: k, value_offset, .. } => {
				assert_eq!(k, key);
				assert_eq!(value_offset, 99);
			}
			_ => panic!("wrong variant"),
		}
	}

	#[test]
	fn deleted_record_round_trip() {
		let rec = encode_deleted_record(b"tombstone-key");
		let decoded = decode_record_at(&rec, 0).unwrap().unwrap();
		match decoded {
			Record::Deleted { key, .. } => assert_eq!(key, b"tombstone-key"),
			_ => panic!("wrong variant"),
		}
	}

	#[test]
	fn value_round_trip_short_and_long() {
		let rec = encode_value_record(b"a value");
		match decode_record_at(&rec, 0).unwrap().unwrap() {
			Record::Value { value, .. } => assert_eq!(value, b"a value"),
			_ => panic!("wrong variant"),
		}

		let big = vec![7u8; MAX_SHORT_VAL_LEN + 1];
		let rec = encode_value_record(&big);
		match decode_record_at(&rec, 0).unwrap().unwrap() {
			Record::Value { value, .. } => assert_eq!(value, big),
			_ => panic!("wrong variant"),
		}
	}

	#[test]
	fn commit_word_short_and_long() {
		let w = encode_commit_word(CommitKind::Commit, 42, 0xDEADBEEF);
		assert_eq!(w.len(), 8);
		let decoded = decode_commit_before(&w, w.len()).unwrap();
		match decoded {
			Record::Commit { payload_len, crc, len } => {
				assert_eq!(payload_len, 42);
				assert_eq!(crc, 0xDEADBEEF);
				assert_eq!(len, 8);
			}
			_ => panic!("wrong variant"),
		}

		let big_len = 1u64 << 30;
		let w = encode_commit_word(CommitKind::Final, big_len, 0x1234);
		assert_eq!(w.len(), 24);
		match decode_commit_before(&w, w.len()).unwrap() {
			Record::Final { payload_len, crc, len } => {
				assert_eq!(payload_len, big_len);
				assert_eq!(crc, 0x1234);
				assert_eq!(len, 24);
			}
			_ => panic!("wrong variant"),
		}
	}
}
