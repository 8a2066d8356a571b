//! The top-level `Database`: directory scan and classification on open,
//! cross-process reload, the write/pack locks, and every public
//! operation (`add`/`remove`/`commit`/`abort`/`fetch`/`fetchnext`/
//! `foreach`/`forone`/`finalise`/`repack`/`info`).
//!
//! Grounded on `zeroskip.c` (`zsdb_open`/`zsdb_add`/`zsdb_remove`/
//! `zsdb_commit`/`zsdb_fetch`/`zsdb_fetchnext`/`zsdb_foreach`/
//! `zsdb_forone`/`zsdb_repack`/`zsdb_info`) for the operation shapes and
//! on `database_reader.rs`'s directory-scan/open pattern.

use crate::codec::{self, Header};
use crate::diag::zs_debug;
use crate::error::{Error, Result};
use crate::filename::{self, FileKind};
use crate::lock;
use crate::lock::LockGuard;
use crate::memtable::{Comparator, LexicographicComparator, MemValue, Memtable};
use crate::merge::{self, DbSource, Value};
use crate::metadata::DotZsdb;
use crate::packer;
use crate::segment::Entry;
use crate::segment_reader::PackedSegment;
use crate::write::{self, ActiveSegment, SegmentState};
use std::cmp::Ordering;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How [`Database::open`] should treat a directory that doesn't look like
/// a database yet, and which key comparator to install.
pub enum OpenMode {
	/// The directory must already contain a valid `.zsdb`; fails otherwise.
	ReadWrite,
	/// Creates a fresh database (with a new UUID) if `.zsdb` is absent;
	/// opens normally if it's already there.
	Create,
	/// Like `ReadWrite`, but installs `cmp` in place of the default
	/// byte-lexicographic comparator. Supplying a comparator that differs
	/// from the one records were originally written under is undefined
	/// behavior this type cannot detect.
	CustomSearch(Arc<dyn Comparator>),
}

/// Summary statistics exposed by `Database::info`, corresponding to the
/// original's `zsdb_info`.
#[derive(Debug, Clone)]
pub struct Info {
	pub uuid: uuid::Uuid,
	pub current_index: u32,
	pub active_segment_len: u64,
	pub finalised_count: usize,
	pub packed_count: usize,
	pub record_count_estimate: usize,
}

/// A capability token proving the write lock is held, returned by
/// [`Database::transaction_begin`] and required by every mutating
/// operation. Dropping it (or passing it to [`Database::transaction_end`])
/// does not itself release the lock -- that happens on `commit`/`abort`
/// or an explicit `write_lock_release`; `transaction_end` merely releases
/// the iterator/stashed key.
///
/// Diverges from the original in one respect: the original lets a
/// `foreach` callback mutate the same transaction mid-iteration and
/// reseeks its internal cursor to stay consistent. This crate's
/// `foreach`/`forone` snapshot a merge iterator up front and do not
/// support a callback that calls back into `add`/`remove` on the same
/// transaction; such a callback would alias `Database` mutably while the
/// iteration borrows it, which Rust's ownership rules reject outright. A
/// caller that needs read-then-write should collect keys first and then
/// mutate.
pub struct Transaction {
	_private: (),
}

struct Loaded {
	uuid: uuid::Uuid,
	meta: DotZsdb,
	dotzsdb_ino: u64,
	active: ActiveSegment,
	active_map: Memtable,
	finalised_map: Memtable,
	finalised_paths: Vec<PathBuf>,
	packed: Vec<PackedSegment>,
}

pub struct Database {
	dir: PathBuf,
	cmp: Arc<dyn Comparator>,
	uuid: uuid::Uuid,
	meta: DotZsdb,
	dotzsdb_ino: u64,
	active: ActiveSegment,
	active_map: Memtable,
	finalised_map: Memtable,
	/// Sorted newest-first, matching the replay order used at load time.
	finalised_paths: Vec<PathBuf>,
	/// Sorted oldest-first (ascending start index) -- this is also merge
	/// priority order, lowest first.
	packed: Vec<PackedSegment>,
	write_lock: Option<LockGuard>,
	pack_lock: Option<LockGuard>,
}

impl Database {
	pub fn open(dir: &Path, mode: OpenMode) -> Result<Database> {
		let (cmp, create): (Arc<dyn Comparator>, bool) = match &mode {
			OpenMode::ReadWrite => (Arc::new(LexicographicComparator), false),
			OpenMode::Create => (Arc::new(LexicographicComparator), true),
			OpenMode::CustomSearch(cmp) => (cmp.clone(), false),
		};
		let loaded = Self::load(dir, cmp.clone(), create)?;
		Ok(Database {
			dir: dir.to_owned(),
			cmp,
			uuid: loaded.uuid,
			meta: loaded.meta,
			dotzsdb_ino: loaded.dotzsdb_ino,
			active: loaded.active,
			active_map: loaded.active_map,
			finalised_map: loaded.finalised_map,
			finalised_paths: loaded.finalised_paths,
			packed: loaded.packed,
			write_lock: None,
			pack_lock: None,
		})
	}

	fn load(dir: &Path, cmp: Arc<dyn Comparator>, create_if_missing: bool) -> Result<Loaded> {
		let zsdb_path = dir.join(crate::metadata::FILE_NAME);
		let meta = if zsdb_path.exists() {
			DotZsdb::read(dir)?
		} else if create_if_missing {
			std::fs::create_dir_all(dir)?;
			let uuid = uuid::Uuid::new_v4();
			DotZsdb::create(dir, uuid)?
		} else {
			return Err(Error::InvalidDb(dir.to_owned(), "no .zsdb metadata file".into()));
		};
		let uuid = meta.uuid;
		let dotzsdb_ino = DotZsdb::inode(dir)?;

		let mut finalised_entries: Vec<(u32, PathBuf)> = Vec::new();
		let mut packed_entries: Vec<(u32, u32, PathBuf)> = Vec::new();
		let mut active_path = None;
		for entry in std::fs::read_dir(dir)? {
			let entry = entry?;
			let path = entry.path();
			let parsed = match filename::parse_path(&path) {
				Some(p) => p,
				None => continue,
			};
			let (file_uuid, kind) = parsed;
			if file_uuid != uuid {
				continue;
			}
			match kind {
				FileKind::Active(_) => active_path = Some(path),
				FileKind::Finalised(idx) => finalised_entries.push((idx, path)),
				FileKind::Packed(s, e) => packed_entries.push((s, e, path)),
			}
		}

		let active_path =
			active_path.unwrap_or_else(|| dir.join(filename::active_name(&uuid, meta.current_index)));
		let mut active = if active_path.exists() {
			ActiveSegment::open_existing(&active_path)?
		} else {
			ActiveSegment::create(
				&active_path,
				Header { uuid, start_idx: meta.current_index, end_idx: meta.current_index },
			)?
		};

		let mut active_map = Memtable::new(cmp.clone());
		let good_end = write::replay_active(active.mapped_slice(), &mut active_map);
		let truncate_to = good_end.min(meta.offset.max(codec::HEADER_SIZE as u64));
		if truncate_to < active.len() {
			active.truncate_to(truncate_to)?;
			active_map = Memtable::new(cmp.clone());
			write::replay_active(active.mapped_slice(), &mut active_map);
		}

		// Newest first: replay_finalised relies on this order for its
		// "first writer wins" dedup to mean "newest file wins".
		finalised_entries.sort_by(|a, b| b.0.cmp(&a.0));
		let finalised_paths: Vec<PathBuf> = finalised_entries.into_iter().map(|(_, p)| p).collect();
		let finalised_map = write::replay_finalised(&finalised_paths, cmp.clone())?;

		packed_entries.sort_by(|a, b| a.0.cmp(&b.0));
		let mut packed = Vec::with_capacity(packed_entries.len());
		for (_, _, path) in packed_entries {
			packed.push(PackedSegment::open(&path)?);
		}

		Ok(Loaded { uuid, meta, dotzsdb_ino, active, active_map, finalised_map, finalised_paths, packed })
	}

	fn reload(&mut self) -> Result<()> {
		zs_debug!("reloading database at {:?}", self.dir);
		let loaded = Self::load(&self.dir, self.cmp.clone(), false)?;
		self.uuid = loaded.uuid;
		self.meta = loaded.meta;
		self.dotzsdb_ino = loaded.dotzsdb_ino;
		self.active = loaded.active;
		self.active_map = loaded.active_map;
		self.finalised_map = loaded.finalised_map;
		self.finalised_paths = loaded.finalised_paths;
		self.packed = loaded.packed;
		// write_lock / pack_lock deliberately untouched: reload can run
		// mid-transaction (a held write lock means another process can't
		// have raced a conflicting write anyway) and dropping a held
		// guard here would silently release a lock its owner still
		// thinks it holds.
		Ok(())
	}

	fn reload_if_needed(&mut self) -> Result<()> {
		let ino = DotZsdb::inode(&self.dir)?;
		if ino != self.dotzsdb_ino {
			self.reload()?;
		}
		Ok(())
	}

	// -- locks --------------------------------------------------------

	pub fn write_lock_acquire(&mut self, timeout_ms: i64) -> Result<()> {
		if self.write_lock.is_some() {
			return Err(Error::Internal("write lock already held by this handle".into()));
		}
		self.write_lock = Some(LockGuard::acquire_timeout(&lock::write_lock_path(&self.dir), timeout_ms)?);
		Ok(())
	}

	pub fn write_lock_release(&mut self) {
		self.write_lock = None;
	}

	pub fn write_lock_held(&self) -> bool {
		self.write_lock.is_some()
	}

	pub fn pack_lock_acquire(&mut self, timeout_ms: i64) -> Result<()> {
		if self.pack_lock.is_some() {
			return Err(Error::Internal("pack lock already held by this handle".into()));
		}
		self.pack_lock = Some(LockGuard::acquire_timeout(&lock::pack_lock_path(&self.dir), timeout_ms)?);
		Ok(())
	}

	pub fn pack_lock_release(&mut self) {
		self.pack_lock = None;
	}

	pub fn pack_lock_held(&self) -> bool {
		self.pack_lock.is_some()
	}

	fn require_write_lock(&self) -> Result<()> {
		if self.write_lock_held() {
			Ok(())
		} else {
			Err(Error::Conflict("add/remove/commit/abort require the write lock".into()))
		}
	}

	pub fn transaction_begin(&mut self, timeout_ms: i64) -> Result<Transaction> {
		self.reload_if_needed()?;
		self.write_lock_acquire(timeout_ms)?;
		Ok(Transaction { _private: () })
	}

	pub fn transaction_end(&mut self, txn: Transaction) {
		drop(txn);
		self.write_lock_release();
	}

	// -- write path -----------------------------------------------------

	fn maybe_rollover(&mut self) -> Result<()> {
		if self.active.len() >= write::FINALISE_THRESHOLD {
			self.finalise_locked()?;
		}
		Ok(())
	}

	fn finalise_locked(&mut self) -> Result<()> {
		if self.active.state() != SegmentState::Sealed {
			self.active.write_commit(true)?;
		}
		let old_path = self.active.path().to_owned();
		let old_index = self.meta.current_index;
		let sealed_path = self.dir.join(filename::finalised_name(&self.uuid, old_index));
		std::fs::rename(&old_path, &sealed_path)?;

		let new_index = old_index + 1;
		let new_path = self.dir.join(filename::active_name(&self.uuid, new_index));
		let new_header = Header { uuid: self.uuid, start_idx: new_index, end_idx: new_index };
		let new_active = ActiveSegment::create(&new_path, new_header)?;

		// The segment just sealed becomes the newest finalised file, so
		// its records must win over whatever's already in finalised_map.
		let mut fresh_finalised = Memtable::new(self.cmp.clone());
		for (k, v) in self.active_map.iter() {
			fresh_finalised.insert_value(k, v.clone());
		}
		for (k, v) in self.finalised_map.iter() {
			if fresh_finalised.get(k).is_none() {
				fresh_finalised.insert_value(k, v.clone());
			}
		}
		self.finalised_map = fresh_finalised;
		self.finalised_paths.insert(0, sealed_path);
		self.active = new_active;
		self.active_map = Memtable::new(self.cmp.clone());

		let updated = DotZsdb::update(&self.dir, codec::HEADER_SIZE as u64, new_index)?;
		self.meta = updated;
		self.dotzsdb_ino = DotZsdb::inode(&self.dir)?;
		Ok(())
	}

	pub fn finalise(&mut self, timeout_ms: i64) -> Result<()> {
		self.reload_if_needed()?;
		let already_held = self.write_lock_held();
		if !already_held {
			self.write_lock_acquire(timeout_ms)?;
		}
		let result = self.finalise_locked();
		if !already_held {
			self.write_lock_release();
		}
		result
	}

	pub fn add(&mut self, key: &[u8], value: &[u8], _txn: &mut Transaction) -> Result<()> {
		self.require_write_lock()?;
		self.reload_if_needed()?;
		self.maybe_rollover()?;
		self.active.begin_crc_window();
		let value_offset = 24 + codec::round_up8(key.len());
		self.active.append(&codec::encode_key_record(key, value_offset as u64))?;
		self.active.append(&codec::encode_value_record(value))?;
		self.active_map.insert(key, Arc::from(value));
		Ok(())
	}

	pub fn remove(&mut self, key: &[u8], _txn: &mut Transaction) -> Result<()> {
		self.require_write_lock()?;
		self.reload_if_needed()?;
		self.maybe_rollover()?;
		self.active.begin_crc_window();
		self.active.append(&codec::encode_deleted_record(key))?;
		self.active_map.insert_tombstone(key);
		Ok(())
	}

	pub fn commit(&mut self, _txn: &mut Transaction) -> Result<()> {
		self.require_write_lock()?;
		if self.active.state() == SegmentState::Dirty {
			self.active.write_commit(false)?;
			let updated = DotZsdb::update(&self.dir, self.active.len(), self.meta.current_index)?;
			self.meta = updated;
			self.dotzsdb_ino = DotZsdb::inode(&self.dir)?;
		}
		Ok(())
	}

	pub fn abort(&mut self, _txn: &mut Transaction) -> Result<()> {
		self.require_write_lock()?;
		self.active.truncate_to(self.meta.offset)?;
		self.active_map = Memtable::new(self.cmp.clone());
		write::replay_active(self.active.mapped_slice(), &mut self.active_map);
		Ok(())
	}

	// -- read path --------------------------------------------------------

	pub fn fetch(&mut self, key: &[u8]) -> Result<Vec<u8>> {
		self.reload_if_needed()?;
		if let Some(v) = self.active_map.get(key) {
			return live_or_not_found(v);
		}
		if let Some(v) = self.finalised_map.get(key) {
			return live_or_not_found(v);
		}
		for seg in self.packed.iter().rev() {
			if let (Some(first), Some(last)) = (seg.first_key(), seg.last_key()) {
				if self.cmp.compare(key, &first) == Ordering::Less
					|| self.cmp.compare(key, &last) == Ordering::Greater
				{
					continue;
				}
			}
			if let Some(pos) = seg.find(key, &*self.cmp)? {
				return match seg.entry_at_pos(pos)?.expect("position from find() is in range") {
					Entry::Live { value, .. } => Ok(value),
					Entry::Tombstone { .. } => Err(Error::NotFound),
				};
			}
		}
		Err(Error::NotFound)
	}

	fn merge_sources_from(&self, key: &[u8]) -> Result<Vec<DbSource<'_>>> {
		let mut sources = Vec::with_capacity(self.packed.len() + 2);
		for seg in &self.packed {
			sources.push(merge::packed_source_from(seg, key, &*self.cmp)?);
		}
		sources.push(merge::memtable_source_from(&self.finalised_map, key));
		sources.push(merge::memtable_source_from(&self.active_map, key));
		Ok(sources)
	}

	pub fn fetchnext(&mut self, key: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
		self.reload_if_needed()?;
		let sources = self.merge_sources_from(key)?;
		let it = merge::build(sources, self.cmp.clone());
		for rec in it {
			if self.cmp.compare(&rec.key, key) == Ordering::Equal {
				continue;
			}
			if let Value::Live(v) = rec.value {
				return Ok((rec.key, v.to_vec()));
			}
		}
		Err(Error::NotFound)
	}

	/// Streams every live record whose key starts with `prefix`, in
	/// ascending key order, calling `predicate` and then `callback` for
	/// each. See [`Transaction`] for the one respect in which this
	/// diverges from the original's callback contract.
	pub fn foreach<P, C>(&mut self, prefix: &[u8], mut predicate: P, mut callback: C) -> Result<()>
	where
		P: FnMut(&[u8], &[u8]) -> bool,
		C: FnMut(&[u8], &[u8]) -> Result<()>,
	{
		self.reload_if_needed()?;
		let sources = self.merge_sources_from(prefix)?;
		let it = merge::build(sources, self.cmp.clone());
		for rec in it {
			if !rec.key.starts_with(prefix) {
				break;
			}
			if let Value::Live(v) = rec.value {
				if predicate(&rec.key, &v) {
					callback(&rec.key, &v)?;
				}
			}
		}
		Ok(())
	}

	/// Applies `predicate`/`callback` to `key` alone, if it currently
	/// holds a live value.
	pub fn forone<P, C>(&mut self, key: &[u8], mut predicate: P, mut callback: C) -> Result<()>
	where
		P: FnMut(&[u8], &[u8]) -> bool,
		C: FnMut(&[u8], &[u8]) -> Result<()>,
	{
		self.reload_if_needed()?;
		if let Ok(value) = self.fetch(key) {
			if predicate(key, &value) {
				callback(key, &value)?;
			}
		}
		Ok(())
	}

	// -- packing ----------------------------------------------------------

	pub fn repack(&mut self, timeout_ms: i64) -> Result<()> {
		self.reload_if_needed()?;
		let already_held = self.pack_lock_held();
		if !already_held {
			self.pack_lock_acquire(timeout_ms)?;
		}
		let result = self.repack_locked();
		if !already_held {
			self.pack_lock_release();
		}
		result
	}

	fn repack_locked(&mut self) -> Result<()> {
		// A single finalised segment has start == end; packing it alone
		// would write a `<N>-<N>` name indistinguishable from a plain
		// finalised file, so it's left for the next finalise to merge in
		// rather than packed on its own.
		if self.finalised_paths.len() > 1 {
			self.repack_finalised()
		} else if self.packed.len() > 1 {
			self.repack_two_oldest_packed()
		} else {
			Ok(())
		}
	}

	fn repack_finalised(&mut self) -> Result<()> {
		let mut min_start = u32::MAX;
		let mut max_end = 0u32;
		for path in &self.finalised_paths {
			if let Some((_, FileKind::Finalised(idx))) = filename::parse_path(path) {
				min_start = min_start.min(idx);
				max_end = max_end.max(idx);
			}
		}
		// A tombstone in the combined finalised map might still be
		// masking a live record in an already-packed segment, so it can
		// only be dropped when there are none of those left.
		let drop_tombstones = self.packed.is_empty();
		let records: Vec<_> = self
			.finalised_map
			.full_range()
			.map(|(k, v)| merge::Record { key: k.to_vec(), value: v.clone().into() })
			.collect();
		let new_path =
			packer::pack(&self.dir, self.uuid, min_start, max_end, records.into_iter(), drop_tombstones)?;

		packer::unlink_inputs(&self.finalised_paths)?;
		self.finalised_paths.clear();
		self.finalised_map = Memtable::new(self.cmp.clone());
		self.packed.push(PackedSegment::open(&new_path)?);
		self.packed.sort_by_key(|s| s.header.start_idx);
		self.touch_zsdb_for_reload()
	}

	fn repack_two_oldest_packed(&mut self) -> Result<()> {
		let a = self.packed.remove(0);
		let b = self.packed.remove(0);
		let min_start = a.header.start_idx.min(b.header.start_idx);
		let max_end = a.header.end_idx.max(b.header.end_idx);
		let sources = vec![merge::packed_source(&a), merge::packed_source(&b)];
		let records: Vec<_> = merge::build(sources, self.cmp.clone()).collect();
		let new_path = packer::pack(&self.dir, self.uuid, min_start, max_end, records.into_iter(), false)?;

		let a_path = a.path.clone();
		let b_path = b.path.clone();
		drop(a);
		drop(b);
		packer::unlink_inputs(&[a_path, b_path])?;
		self.packed.push(PackedSegment::open(&new_path)?);
		self.packed.sort_by_key(|s| s.header.start_idx);
		self.touch_zsdb_for_reload()
	}

	fn touch_zsdb_for_reload(&mut self) -> Result<()> {
		let updated = DotZsdb::update(&self.dir, self.meta.offset, self.meta.current_index)?;
		self.meta = updated;
		self.dotzsdb_ino = DotZsdb::inode(&self.dir)?;
		Ok(())
	}

	// -- diagnostics --------------------------------------------------------

	pub fn info(&self) -> Info {
		Info {
			uuid: self.uuid,
			current_index: self.meta.current_index,
			active_segment_len: self.active.len(),
			finalised_count: self.finalised_paths.len(),
			packed_count: self.packed.len(),
			record_count_estimate: self.active_map.len()
				+ self.finalised_map.len()
				+ self.packed.iter().map(|p| p.len()).sum::<usize>(),
		}
	}

	pub fn dump(&self, w: &mut dyn std::io::Write) -> Result<()> {
		let info = self.info();
		writeln!(w, "uuid: {}", info.uuid)?;
		writeln!(w, "current index: {}", info.current_index)?;
		writeln!(w, "active segment: {} bytes, {} live keys", info.active_segment_len, self.active_map.len())?;
		writeln!(w, "finalised segments: {}", info.finalised_count)?;
		writeln!(w, "packed segments: {}", info.packed_count)?;
		for seg in &self.packed {
			writeln!(
				w,
				"  {:?}: {} records, first={:?} last={:?}",
				seg.path.file_name().unwrap_or_default(),
				seg.len(),
				seg.first_key(),
				seg.last_key(),
			)?;
		}
		Ok(())
	}
}

impl Drop for Database {
	fn drop(&mut self) {
		let _ = self.active.flush();
	}
}

fn live_or_not_found(v: &MemValue) -> Result<Vec<u8>> {
	match v {
		MemValue::Value(v) => Ok(v.to_vec()),
		MemValue::Tombstone => Err(Error::NotFound),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn create_add_commit_fetch_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();
		let mut txn = db.transaction_begin(1000).unwrap();
		db.add(b"foo", b"bar", &mut txn).unwrap();
		db.commit(&mut txn).unwrap();
		db.transaction_end(txn);

		assert_eq!(db.fetch(b"foo").unwrap(), b"bar");
		assert!(matches!(db.fetch(b"missing"), Err(Error::NotFound)));
	}

	#[test]
	fn abort_discards_uncommitted_writes() {
		let dir = tempfile::tempdir().unwrap();
		let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();
		let mut txn = db.transaction_begin(1000).unwrap();
		db.add(b"a", b"1", &mut txn).unwrap();
		db.commit(&mut txn).unwrap();
		db.add(b"b", b"2", &mut txn).unwrap();
		db.abort(&mut txn).unwrap();
		db.transaction_end(txn);

		assert_eq!(db.fetch(b"a").unwrap(), b"1");
		assert!(matches!(db.fetch(b"b"), Err(Error::NotFound)));
	}

	#[test]
	fn remove_then_commit_hides_key() {
		let dir = tempfile::tempdir().unwrap();
		let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();
		let mut txn = db.transaction_begin(1000).unwrap();
		db.add(b"galas", b"v1", &mut txn).unwrap();
		db.commit(&mut txn).unwrap();
		db.remove(b"galas", &mut txn).unwrap();
		assert!(matches!(db.fetch(b"galas"), Err(Error::NotFound)));
		db.commit(&mut txn).unwrap();
		db.transaction_end(txn);
		assert!(matches!(db.fetch(b"galas"), Err(Error::NotFound)));
	}

	#[test]
	fn reopen_sees_committed_data() {
		let dir = tempfile::tempdir().unwrap();
		{
			let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();
			let mut txn = db.transaction_begin(1000).unwrap();
			db.add(b"mustache", b"blog lomo", &mut txn).unwrap();
			db.commit(&mut txn).unwrap();
			db.transaction_end(txn);
		}
		let mut db = Database::open(dir.path(), OpenMode::ReadWrite).unwrap();
		assert_eq!(db.fetch(b"mustache").unwrap(), b"blog lomo");
	}

	#[test]
	fn foreach_yields_ascending_order() {
		let dir = tempfile::tempdir().unwrap();
		let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();
		let mut txn = db.transaction_begin(1000).unwrap();
		for (k, v) in [("c", "3"), ("a", "1"), ("b", "2")] {
			db.add(k.as_bytes(), v.as_bytes(), &mut txn).unwrap();
		}
		db.commit(&mut txn).unwrap();
		db.transaction_end(txn);

		let mut seen = Vec::new();
		db.foreach(b"", |_, _| true, |k, v| {
			seen.push((k.to_vec(), v.to_vec()));
			Ok(())
		})
		.unwrap();
		assert_eq!(seen, vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())]);
	}

	#[test]
	fn fetchnext_finds_smallest_greater_key() {
		let dir = tempfile::tempdir().unwrap();
		let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();
		let mut txn = db.transaction_begin(1000).unwrap();
		db.add(b"abc", b"1", &mut txn).unwrap();
		db.add(b"nokia", b"meego", &mut txn).unwrap();
		db.commit(&mut txn).unwrap();
		db.transaction_end(txn);

		let (k, v) = db.fetchnext(b"key").unwrap();
		assert_eq!(k, b"nokia");
		assert_eq!(v, b"meego");
	}

	#[test]
	fn rollover_creates_additional_segment_files() {
		let dir = tempfile::tempdir().unwrap();
		let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();
		let mut txn = db.transaction_begin(1000).unwrap();
		for i in 0..4096u32 {
			let k = format!("key{i}");
			let v = format!("val{i}");
			db.add(k.as_bytes(), v.as_bytes(), &mut txn).unwrap();
		}
		db.commit(&mut txn).unwrap();
		db.transaction_end(txn);

		let mut count = 0usize;
		db.foreach(b"", |_, _| true, |_, _| {
			count += 1;
			Ok(())
		})
		.unwrap();
		assert_eq!(count, 4096);
		assert!(db.info().finalised_count >= 1);
	}

	#[test]
	fn repack_merges_finalised_segments_and_preserves_data() {
		let dir = tempfile::tempdir().unwrap();
		let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();
		let mut txn = db.transaction_begin(1000).unwrap();
		db.add(b"a", b"1", &mut txn).unwrap();
		db.commit(&mut txn).unwrap();
		db.finalise(1000).unwrap();
		db.add(b"b", b"2", &mut txn).unwrap();
		db.commit(&mut txn).unwrap();
		db.transaction_end(txn);

		assert_eq!(db.info().finalised_count, 1);
		db.repack(1000).unwrap();
		assert_eq!(db.info().finalised_count, 0);
		assert_eq!(db.info().packed_count, 1);
		assert_eq!(db.fetch(b"a").unwrap(), b"1");
		assert_eq!(db.fetch(b"b").unwrap(), b"2");
	}
}
