//! Read-only, mmap-backed access to a packed (compacted) segment file: its
//! header, its index footer, and binary search over that footer.
//!
//! Grounded on `zeroskip-packed.c`'s `zs_packed_file_open` (probe for a
//! short then long commit record at EOF, verify its CRC, recover the
//! index's start offset from the commit's payload length, then read the
//! sorted array of absolute record offsets) and on `segment_reader.rs`'s
//! mmap-open plus binary search over a sorted on-disk structure.

use crate::codec::{self, Header};
use crate::error::{Error, Result};
use crate::memtable::Comparator;
use crate::segment::{self, Entry};
use byteorder::{BigEndian, ByteOrder};
use std::path::{Path, PathBuf};

pub struct PackedSegment {
	mmap: memmap::Mmap,
	pub header: Header,
	/// Absolute file offsets of each key record, sorted by key.
	index: Vec<u64>,
	pub path: PathBuf,
}

impl PackedSegment {
	pub fn open(path: &Path) -> Result<PackedSegment> {
		let file = std::fs::File::open(path)?;
		let mmap = unsafe { memmap::Mmap::map(&file)? };
		if mmap.len() <= codec::HEADER_SIZE {
			return Err(Error::InvalidFile(path.to_owned(), "file too small".into()));
		}
		let header = Header::decode(&mmap[0..codec::HEADER_SIZE])
			.map_err(|e| Error::InvalidFile(path.to_owned(), e.to_string()))?;

		let index = read_index_footer(&mmap, path)?;

		Ok(PackedSegment { mmap, header, index, path: path.to_owned() })
	}

	pub fn len(&self) -> usize {
		self.index.len()
	}

	pub fn is_empty(&self) -> bool {
		self.index.is_empty()
	}

	fn entry_at(&self, pos: usize) -> Result<Entry> {
		segment::read_entry_at(&self.mmap, self.index[pos] as usize)
	}

	pub fn first_key(&self) -> Option<Vec<u8>> {
		self.entry_at(0).ok().map(|e| e.key().to_vec())
	}

	pub fn last_key(&self) -> Option<Vec<u8>> {
		if self.index.is_empty() {
			return None;
		}
		self.entry_at(self.index.len() - 1).ok().map(|e| e.key().to_vec())
	}

	/// Binary search by key; returns the index-position of the entry
	/// whose key equals `key`, if any.
	pub fn find(&self, key: &[u8], cmp: &dyn Comparator) -> Result<Option<usize>> {
		let mut lo = 0usize;
		let mut hi = self.index.len();
		while lo < hi {
			let mid = lo + (hi - lo) / 2;
			let entry = self.entry_at(mid)?;
			match cmp.compare(entry.key(), key) {
				std::cmp::Ordering::Equal => return Ok(Some(mid)),
				std::cmp::Ordering::Less => lo = mid + 1,
				std::cmp::Ordering::Greater => hi = mid,
			}
		}
		Ok(None)
	}

	/// Binary search for the smallest index-position whose key is `>= key`.
	pub fn lower_bound(&self, key: &[u8], cmp: &dyn Comparator) -> Result<usize> {
		let mut lo = 0usize;
		let mut hi = self.index.len();
		while lo < hi {
			let mid = lo + (hi - lo) / 2;
			let entry = self.entry_at(mid)?;
			if cmp.compare(entry.key(), key) == std::cmp::Ordering::Less {
				lo = mid + 1;
			} else {
				hi = mid;
			}
		}
		Ok(lo)
	}

	pub fn entry_at_pos(&self, pos: usize) -> Result<Option<Entry>> {
		if pos >= self.index.len() {
			return Ok(None);
		}
		self.entry_at(pos).map(Some)
	}

	pub fn iter(&self) -> impl Iterator<Item = Result<Entry>> + '_ {
		(0..self.index.len()).map(move |i| self.entry_at(i))
	}
}

/// Recovers the sorted offset array written at the tail of a packed file:
/// probe for a commit record at EOF (short 8 bytes, then long 24), verify
/// its CRC over the index payload, then read the `count` word followed by
/// `count` big-endian u64 offsets.
fn read_index_footer(mmap: &[u8], path: &Path) -> Result<Vec<u64>> {
	let len = mmap.len();
	let commit = codec::decode_commit_before(mmap, len)
		.ok_or_else(|| Error::InvalidFile(path.to_owned(), "no commit record at end of file".into()))?;
	let (payload_len, commit_len) = match &commit {
		codec::Record::Final { payload_len, len, .. } => (*payload_len, *len),
		codec::Record::Commit { payload_len, len, .. } => (*payload_len, *len),
		_ => unreachable!(),
	};
	let commit_offset = len - commit_len;
	let payload_start = commit_offset
		.checked_sub(payload_len as usize)
		.ok_or_else(|| Error::InvalidFile(path.to_owned(), "index payload length overruns file".into()))?;

	let event = crate::segment::ScanEvent::Commit {
		offset: commit_offset,
		payload_len,
		crc: match &commit {
			codec::Record::Final { crc, .. } | codec::Record::Commit { crc, .. } => *crc,
			_ => unreachable!(),
		},
		is_final: matches!(commit, codec::Record::Final { .. }),
		len: commit_len,
	};
	if !segment::verify_commit(mmap, payload_start, commit_offset, &event) {
		return Err(Error::InvalidFile(path.to_owned(), "index footer crc mismatch".into()));
	}

	if payload_start + 8 > commit_offset {
		return Err(Error::InvalidFile(path.to_owned(), "index footer too small for count".into()));
	}
	let count = BigEndian::read_u64(&mmap[payload_start..payload_start + 8]) as usize;
	let mut offsets = Vec::with_capacity(count);
	let mut pos = payload_start + 8;
	for _ in 0..count {
		if pos + 8 > commit_offset {
			return Err(Error::InvalidFile(path.to_owned(), "index footer truncated".into()));
		}
		offsets.push(BigEndian::read_u64(&mmap[pos..pos + 8]));
		pos += 8;
	}
	Ok(offsets)
}
