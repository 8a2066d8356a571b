//! The active segment: the single mutable, growable-mmap file that every
//! `add`/`remove`/`commit` appends to, plus the replay logic that rebuilds
//! an in-memory map from a segment's bytes on open (and stops at the first
//! torn/uncommitted tail).
//!
//! Grounded on `write.rs`'s append/flush-on-commit discipline and typed
//! state tracking, and on `zeroskip.c`'s
//! `zsdb_add`/`zsdb_remove`/`zsdb_commit`/`zsdb_finalise` plus
//! `zeroskip-file.c`'s `zs_file_write_commit_ext`/mmap-growth pattern for
//! the wire-level mechanics.

use crate::codec::{self, CommitKind, Header};
use crate::error::{Error, Result};
use crate::memtable::Memtable;
use crate::segment::{self, CrcWindow, Entry, ScanEvent};
use memmap::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Once an active segment's file size reaches this many bytes, the next
/// write rolls it over into a freshly created active segment (the old one
/// becomes "finalised" simply by the `.zsdb` current index moving past
/// it -- no rename is needed).
pub const FINALISE_THRESHOLD: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
	/// Just the header has been written; no records yet.
	Fresh,
	/// An open CRC window with appended-but-uncommitted records.
	Dirty,
	/// The last record written is a (non-final) commit.
	Clean,
	/// Finalised; no further writes are permitted to this file.
	Sealed,
}

pub struct ActiveSegment {
	file: File,
	mmap: MmapMut,
	mapped_len: u64,
	pub header: Header,
	cursor: u64,
	crc_window: Option<CrcWindow>,
	crc_window_start: u64,
	state: SegmentState,
	path: PathBuf,
}

impl ActiveSegment {
	/// Creates a brand new active segment file: writes the 40-byte header
	/// and positions the append cursor right after it.
	pub fn create(path: &Path, header: Header) -> Result<ActiveSegment> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create_new(true)
			.open(path)?;
		file.set_len(codec::HEADER_SIZE as u64)?;
		let mut mmap = unsafe { MmapMut::map_mut(&file)? };
		mmap[0..codec::HEADER_SIZE].copy_from_slice(&header.encode());
		mmap.flush()?;
		Ok(ActiveSegment {
			file,
			mmap,
			mapped_len: codec::HEADER_SIZE as u64,
			header,
			cursor: codec::HEADER_SIZE as u64,
			crc_window: None,
			crc_window_start: codec::HEADER_SIZE as u64,
			state: SegmentState::Fresh,
			path: path.to_owned(),
		})
	}

	/// Opens an existing active segment file, validating its header and
	/// positioning the cursor at the current end of file. Callers must
	/// follow this with [`replay_active`] and [`ActiveSegment::truncate_to`]
	/// to discard any torn tail before trusting the cursor.
	pub fn open_existing(path: &Path) -> Result<ActiveSegment> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		let len = file.metadata()?.len();
		if len < codec::HEADER_SIZE as u64 {
			return Err(Error::InvalidFile(path.to_owned(), "file shorter than header".into()));
		}
		let mmap = unsafe { MmapMut::map_mut(&file)? };
		let header = Header::decode(&mmap[0..codec::HEADER_SIZE])
			.map_err(|e| Error::InvalidFile(path.to_owned(), e.to_string()))?;
		Ok(ActiveSegment {
			file,
			mmap,
			mapped_len: len,
			header,
			cursor: len,
			crc_window: None,
			crc_window_start: len,
			state: SegmentState::Clean,
			path: path.to_owned(),
		})
	}

	/// The bytes actually written so far (`[0, cursor)`), for replay and
	/// scanning. Never includes the unmapped/grown-but-unused tail.
	pub fn mapped_slice(&self) -> &[u8] {
		&self.mmap[0..self.cursor as usize]
	}

	pub fn len(&self) -> u64 {
		self.cursor
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn state(&self) -> SegmentState {
		self.state
	}

	fn ensure_capacity(&mut self, min_len: u64) -> Result<()> {
		if min_len <= self.mapped_len {
			return Ok(());
		}
		self.file.set_len(min_len)?;
		self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
		self.mapped_len = min_len;
		Ok(())
	}

	/// Opens a fresh CRC accumulation window if one isn't already open.
	/// Idempotent: a `commit` with no intervening writes closes an empty
	/// window, which is harmless.
	pub fn begin_crc_window(&mut self) {
		if self.crc_window.is_none() {
			self.crc_window = Some(CrcWindow::new());
			self.crc_window_start = self.cursor;
		}
	}

	/// Appends `bytes` at the current cursor, growing the mapping
	/// (truncate-then-remap) if needed, and folds them into the open CRC
	/// window if there is one.
	pub fn append(&mut self, bytes: &[u8]) -> Result<u64> {
		let start = self.cursor;
		let needed = start + bytes.len() as u64;
		self.ensure_capacity(needed)?;
		self.mmap[start as usize..needed as usize].copy_from_slice(bytes);
		if let Some(w) = self.crc_window.as_mut() {
			w.update(bytes);
		}
		self.cursor = needed;
		self.state = SegmentState::Dirty;
		Ok(start)
	}

	/// Appends bytes without folding them into the CRC window -- used
	/// only for the commit record itself, whose own placeholder bytes are
	/// already folded in by [`CrcWindow::close`].
	fn append_raw(&mut self, bytes: &[u8]) -> Result<u64> {
		let start = self.cursor;
		let needed = start + bytes.len() as u64;
		self.ensure_capacity(needed)?;
		self.mmap[start as usize..needed as usize].copy_from_slice(bytes);
		self.cursor = needed;
		Ok(start)
	}

	/// Closes the open CRC window (if any) with a short or long commit
	/// record, flushes, and marks the file `Sealed` if `final_` or
	/// `Clean` otherwise.
	pub fn write_commit(&mut self, final_: bool) -> Result<()> {
		let window = self.crc_window.take().unwrap_or_default();
		let payload_len = self.cursor - self.crc_window_start;
		let kind = if final_ { CommitKind::Final } else { CommitKind::Commit };
		let commit_bytes = window.close(kind, payload_len);
		self.append_raw(&commit_bytes)?;
		self.flush()?;
		self.crc_window_start = self.cursor;
		self.state = if final_ { SegmentState::Sealed } else { SegmentState::Clean };
		Ok(())
	}

	pub fn flush(&self) -> Result<()> {
		self.mmap.flush()?;
		Ok(())
	}

	/// Rolls the file back to `off`, used by `abort` and by clean-reload
	/// truncating a torn tail. `off` must be `<= self.len()`.
	pub fn truncate_to(&mut self, off: u64) -> Result<()> {
		self.file.set_len(off)?;
		self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
		self.mapped_len = off;
		self.cursor = off;
		self.crc_window = None;
		self.crc_window_start = off;
		self.state = if off <= codec::HEADER_SIZE as u64 {
			SegmentState::Fresh
		} else {
			SegmentState::Clean
		};
		Ok(())
	}
}

/// Scans `buf` (an active or finalised segment's full mapped bytes,
/// header included) from just past the header, applying each committed
/// batch of key/value/tombstone records to `mt` in order. Stops at the
/// first commit whose CRC doesn't chain correctly, or at any decode
/// error, or at running off the end without a closing commit -- in every
/// case treating what follows as a torn, uncommitted tail. Returns the
/// byte offset of the end of the last successfully verified commit, i.e.
/// the offset the caller should truncate a writable file to.
pub fn replay_active(buf: &[u8], mt: &mut Memtable) -> u64 {
	let mut committed_end = codec::HEADER_SIZE as u64;
	let mut payload_start = codec::HEADER_SIZE;
	let mut pending: Vec<Entry> = Vec::new();
	let scanner = segment::ForwardScanner::new(buf, codec::HEADER_SIZE, buf.len());

	for event in scanner {
		match event {
			Err(_) => break,
			Ok(ScanEvent::Entry { entry, .. }) => pending.push(entry),
			Ok(ev @ ScanEvent::Commit { offset, len, .. }) => {
				if segment::verify_commit(buf, payload_start, offset, &ev) {
					for e in pending.drain(..) {
						match e {
							Entry::Live { key, value } => {
								mt.insert(&key, Arc::from(value.into_boxed_slice()));
							}
							Entry::Tombstone { key } => mt.insert_tombstone(&key),
						}
					}
					committed_end = (offset + len) as u64;
					payload_start = offset + len;
				} else {
					break;
				}
			}
		}
	}
	if committed_end < buf.len() as u64 {
		crate::diag::zs_warn!(
			"discarding {} uncommitted trailing byte(s) while replaying active segment",
			buf.len() as u64 - committed_end
		);
	}
	committed_end
}

/// Replays every finalised segment into one shared map. `paths` must
/// already be sorted newest-first (descending segment index): each file
/// is replayed into its own scratch map first (so that, within one file,
/// a later record for a key naturally wins over an earlier one), then
/// merged into the shared map with "first file to claim a key wins",
/// which -- since we visit newest first -- makes the newest file's value
/// win overall.
pub fn replay_finalised(
	paths: &[PathBuf],
	cmp: Arc<dyn crate::memtable::Comparator>,
) -> Result<Memtable> {
	let mut shared = Memtable::new(cmp.clone());
	for path in paths {
		let file = OpenOptions::new().read(true).open(path)?;
		let mmap = unsafe { memmap::Mmap::map(&file)? };
		if mmap.len() < codec::HEADER_SIZE {
			return Err(Error::InvalidFile(path.clone(), "file shorter than header".into()));
		}
		Header::decode(&mmap[0..codec::HEADER_SIZE])
			.map_err(|e| Error::InvalidFile(path.clone(), e.to_string()))?;

		let mut local = Memtable::new(cmp.clone());
		replay_active(&mmap, &mut local);
		for (k, v) in local.iter() {
			if shared.get(k).is_none() {
				shared.insert_value(k, v.clone());
			}
		}
	}
	Ok(shared)
}
