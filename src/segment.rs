//! Shared record-scanning helpers used by both the active segment writer
//! (`write.rs`) and packed-segment reader (`segment_reader.rs`).
//!
//! Every writer in this crate (the active-segment appender and the packer)
//! places a value record immediately after its key record, and a deleted
//! key stands alone -- so unlike the original's offset-dereferencing
//! design (which tolerated non-adjacent key/value placement), a forward
//! scan here never needs to jump around: it just walks the buffer
//! record-by-record. The `value_offset` field is still written faithfully
//! (it equals "right after this key record") for wire-format fidelity.

use crate::codec::{self, Record};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub enum Entry {
	Live { key: Vec<u8>, value: Vec<u8> },
	Tombstone { key: Vec<u8> },
}

impl Entry {
	pub fn key(&self) -> &[u8] {
		match self {
			Entry::Live { key, .. } => key,
			Entry::Tombstone { key } => key,
		}
	}
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
	Entry { offset: usize, entry: Entry, len: usize },
	Commit { offset: usize, payload_len: u64, crc: u32, is_final: bool, len: usize },
}

/// Walks `buf[start..end]` record by record. Stops (without error) at the
/// first all-zero byte, which marks the unwritten tail of a growable
/// active-segment mapping.
pub struct ForwardScanner<'a> {
	buf: &'a [u8],
	pos: usize,
	end: usize,
}

impl<'a> ForwardScanner<'a> {
	pub fn new(buf: &'a [u8], start: usize, end: usize) -> ForwardScanner<'a> {
		ForwardScanner { buf, pos: start, end }
	}

	pub fn offset(&self) -> usize {
		self.pos
	}
}

impl<'a> Iterator for ForwardScanner<'a> {
	type Item = Result<ScanEvent>;

	fn next(&mut self) -> Option<Result<ScanEvent>> {
		if self.pos >= self.end {
			return None;
		}
		let rec = match codec::decode_record_at(self.buf, self.pos) {
			Ok(Some(r)) => r,
			Ok(None) => return None,
			Err(e) => return Some(Err(e)),
		};
		let offset = self.pos;
		match rec {
			Record::Key { key, len, .. } => {
				let value_pos = offset + len;
				let value_rec = match codec::decode_record_at(self.buf, value_pos) {
					Ok(Some(r)) => r,
					Ok(None) => {
						return Some(Err(Error::Corrupted(format!(
							"key at offset {offset} has no following value record"
						))))
					}
					Err(e) => return Some(Err(e)),
				};
				let (value, value_len) = match value_rec {
					Record::Value { value, len } => (value, len),
					_ => {
						return Some(Err(Error::Corrupted(format!(
							"expected value record after key at offset {offset}"
						))))
					}
				};
				self.pos = value_pos + value_len;
				Some(Ok(ScanEvent::Entry {
					offset,
					entry: Entry::Live { key, value },
					len: (value_pos + value_len) - offset,
				}))
			}
			Record::Deleted { key, len } => {
				self.pos = offset + len;
				Some(Ok(ScanEvent::Entry { offset, entry: Entry::Tombstone { key }, len }))
			}
			Record::Value { len, .. } => {
				// A value with no preceding key in this scan window; skip.
				self.pos = offset + len;
				self.next()
			}
			Record::Commit { payload_len, crc, len } => {
				self.pos = offset + len;
				Some(Ok(ScanEvent::Commit { offset, payload_len, crc, is_final: false, len }))
			}
			Record::Final { payload_len, crc, len } => {
				self.pos = offset + len;
				Some(Ok(ScanEvent::Commit { offset, payload_len, crc, is_final: true, len }))
			}
		}
	}
}

/// Reads the key at `offset` and, if it's a live key (not a tombstone),
/// its paired value immediately following. Used for packed-segment
/// point lookups via the index footer.
pub fn read_entry_at(buf: &[u8], offset: usize) -> Result<Entry> {
	let rec = codec::decode_record_at(buf, offset)?
		.ok_or_else(|| Error::Corrupted(format!("no record at offset {offset}")))?;
	match rec {
		Record::Key { key, len, .. } => {
			let value_pos = offset + len;
			match codec::decode_record_at(buf, value_pos)? {
				Some(Record::Value { value, .. }) => Ok(Entry::Live { key, value }),
				_ => Err(Error::Corrupted(format!("key at {offset} missing paired value"))),
			}
		}
		Record::Deleted { key, .. } => Ok(Entry::Tombstone { key }),
		_ => Err(Error::Corrupted(format!("offset {offset} does not point at a key record"))),
	}
}

/// An open CRC accumulation window spanning a run of appended record
/// bytes, closed by folding in the commit record's own prefix word(s)
/// (with the crc field zeroed) and turned into an encoded commit record.
///
/// This realizes the on-disk CRC-chain identity without reimplementing
/// the original's `crc32_combine` (a GF(2) exponentiation
/// trick for joining two CRCs computed over disjoint ranges): since the
/// writer holds the payload bytes in hand as they're appended, folding the
/// commit word's placeholder bytes into the same running hasher produces
/// the identical final value. See [`verify_commit`] for the read-side
/// equivalent used when the payload is already contiguous in a mapped
/// file.
pub struct CrcWindow {
	hasher: crc32fast::Hasher,
}

impl CrcWindow {
	pub fn new() -> CrcWindow {
		CrcWindow { hasher: crc32fast::Hasher::new() }
	}

	pub fn update(&mut self, bytes: &[u8]) {
		self.hasher.update(bytes);
	}

	/// Folds in the commit word's own placeholder bytes and returns the
	/// fully encoded commit record (real CRC filled in).
	pub fn close(self, kind: codec::CommitKind, payload_len: u64) -> Vec<u8> {
		let mut hasher = self.hasher;
		hasher.update(&codec::commit_word_crc_placeholder(kind, payload_len));
		let crc = hasher.finalize();
		codec::encode_commit_word(kind, payload_len, crc)
	}
}

impl Default for CrcWindow {
	fn default() -> CrcWindow {
		CrcWindow::new()
	}
}

/// Verifies a CRC-chained commit: the payload bytes `[payload_start,
/// commit_offset)` followed by the commit word with its crc32 field
/// zeroed must hash to the commit's stored crc.
pub fn verify_commit(buf: &[u8], payload_start: usize, commit_offset: usize, commit: &ScanEvent) -> bool {
	let (crc, len, is_final) = match commit {
		ScanEvent::Commit { crc, len, is_final, .. } => (*crc, *len, *is_final),
		_ => return false,
	};
	let kind = if is_final { codec::CommitKind::Final } else { codec::CommitKind::Commit };
	let payload_len = (commit_offset - payload_start) as u64;
	let placeholder = codec::commit_word_crc_placeholder(kind, payload_len);
	let mut hasher = crc32fast::Hasher::new();
	hasher.update(&buf[payload_start..commit_offset]);
	hasher.update(&placeholder);
	let computed = hasher.finalize();
	computed == crc && len == placeholder.len()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::{encode_commit_word, encode_deleted_record, encode_key_record, encode_value_record, CommitKind};

	#[test]
	fn scans_live_and_tombstone_entries() {
		let mut buf = Vec::new();
		let key_rec = encode_key_record(b"alpha", 0);
		let key_len = key_rec.len();
		buf.extend_from_slice(&key_rec);
		buf.extend_from_slice(&encode_value_record(b"1"));
		buf.extend_from_slice(&encode_deleted_record(b"beta"));
		let payload_len = buf.len() as u64;
		let mut hasher = crc32fast::Hasher::new();
		hasher.update(&buf);
		let placeholder = codec::commit_word_crc_placeholder(CommitKind::Commit, payload_len);
		hasher.update(&placeholder);
		let crc = hasher.finalize();
		buf.extend_from_slice(&encode_commit_word(CommitKind::Commit, payload_len, crc));

		let events: Vec<_> = ForwardScanner::new(&buf, 0, buf.len())
			.collect::<Result<Vec<_>>>()
			.unwrap();
		assert_eq!(events.len(), 3);
		match &events[0] {
			ScanEvent::Entry { entry: Entry::Live { key, value }, offset, .. } => {
				assert_eq!(key, b"alpha");
				assert_eq!(value, b"1");
				assert_eq!(*offset, 0);
			}
			_ => panic!(),
		}
		match &events[1] {
			ScanEvent::Entry { entry: Entry::Tombstone { key }, .. } => assert_eq!(key, b"beta"),
			_ => panic!(),
		}
		let commit_offset = key_len + encode_value_record(b"1").len() + encode_deleted_record(b"beta").len();
		match &events[2] {
			ScanEvent::Commit { offset, is_final, .. } => {
				assert_eq!(*offset, commit_offset);
				assert!(!is_final);
			}
			_ => panic!(),
		}
		assert!(verify_commit(&buf, 0, commit_offset, &events[2]));
	}

	#[test]
	fn crc_window_matches_read_side_verify() {
		let mut buf = Vec::new();
		let mut window = CrcWindow::new();
		let key_rec = encode_key_record(b"gamma", 24 + codec::round_up8(5));
		window.update(&key_rec);
		buf.extend_from_slice(&key_rec);
		let val_rec = encode_value_record(b"v");
		window.update(&val_rec);
		buf.extend_from_slice(&val_rec);

		let payload_len = buf.len() as u64;
		let commit = window.close(CommitKind::Commit, payload_len);
		let commit_offset = buf.len();
		buf.extend_from_slice(&commit);

		let event = crate::segment::ScanEvent::Commit {
			offset: commit_offset,
			payload_len,
			crc: match codec::decode_commit_before(&buf, buf.len()).unwrap() {
				codec::Record::Commit { crc, .. } => crc,
				_ => panic!(),
			},
			is_final: false,
			len: commit.len(),
		};
		assert!(verify_commit(&buf, 0, commit_offset, &event));
	}
}
