//! The in-memory ordered map backing the active segment's not-yet-finalised
//! records.
//!
//! Any balanced ordered map with lower-bound search can stand in for the
//! original's arena-indexed B-tree-with-parent-pointers (`memtree.c`);
//! this uses `std::collections::BTreeMap`, keyed by a comparator-aware
//! wrapper so a caller-supplied [`Comparator`] (see `OpenMode::CustomSearch`)
//! governs ordering uniformly with the merge iterator and packed-segment
//! binary search.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A key-ordering function pluggable at `open()` time. Defaults to plain
/// byte-lexicographic order.
pub trait Comparator: Send + Sync {
	fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

#[derive(Default)]
pub struct LexicographicComparator;

impl Comparator for LexicographicComparator {
	fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
		a.cmp(b)
	}
}

/// A memtable key: the raw bytes plus the comparator that orders them, so
/// `BTreeMap`'s own `Ord` impl defers to the configured comparator instead
/// of always doing byte order.
#[derive(Clone)]
struct MemKey {
	bytes: Box<[u8]>,
	cmp: Arc<dyn Comparator>,
}

impl PartialEq for MemKey {
	fn eq(&self, other: &Self) -> bool {
		self.cmp.compare(&self.bytes, &other.bytes) == Ordering::Equal
	}
}
impl Eq for MemKey {}
impl PartialOrd for MemKey {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for MemKey {
	fn cmp(&self, other: &Self) -> Ordering {
		self.cmp.compare(&self.bytes, &other.bytes)
	}
}

#[derive(Clone, Debug)]
pub enum MemValue {
	Value(Arc<[u8]>),
	Tombstone,
}

pub struct Memtable {
	cmp: Arc<dyn Comparator>,
	map: BTreeMap<MemKey, MemValue>,
}

impl Memtable {
	pub fn new(cmp: Arc<dyn Comparator>) -> Memtable {
		Memtable { cmp, map: BTreeMap::new() }
	}

	fn key(&self, bytes: &[u8]) -> MemKey {
		MemKey { bytes: bytes.into(), cmp: self.cmp.clone() }
	}

	pub fn insert(&mut self, key: &[u8], value: Arc<[u8]>) {
		self.map.insert(self.key(key), MemValue::Value(value));
	}

	pub fn insert_tombstone(&mut self, key: &[u8]) {
		self.map.insert(self.key(key), MemValue::Tombstone);
	}

	/// Inserts an already-classified value (live or tombstone), for
	/// callers replaying entries from another source without caring
	/// which variant they have in hand.
	pub fn insert_value(&mut self, key: &[u8], value: MemValue) {
		self.map.insert(self.key(key), value);
	}

	pub fn get(&self, key: &[u8]) -> Option<&MemValue> {
		self.map.get(&self.key(key))
	}

	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}

	pub fn len(&self) -> usize {
		self.map.len()
	}

	pub fn clear(&mut self) {
		self.map.clear();
	}

	/// The smallest key that is `>= key`, per the configured comparator.
	pub fn lower_bound(&self, key: &[u8]) -> Option<(&[u8], &MemValue)> {
		let probe = self.key(key);
		self.map
			.range(probe..)
			.next()
			.map(|(k, v)| (&*k.bytes, v))
	}

	pub fn iter(&self) -> impl Iterator<Item = (&[u8], &MemValue)> {
		self.map.iter().map(|(k, v)| (&*k.bytes, v))
	}

	/// All entries from `key` (inclusive) onward, per the configured
	/// comparator. Used by the merge iterator to seek a source forward.
	pub fn range_from(&self, key: &[u8]) -> impl Iterator<Item = (&[u8], &MemValue)> {
		let probe = self.key(key);
		self.map.range(probe..).map(|(k, v)| (&*k.bytes, v))
	}

	/// Every entry, in key order. Equivalent to `range_from` with the
	/// smallest possible key, but avoids allocating a probe key.
	pub fn full_range(&self) -> impl Iterator<Item = (&[u8], &MemValue)> {
		self.iter()
	}
}
