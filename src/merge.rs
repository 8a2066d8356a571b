//! k-way merge over every source of truth in a database: the packed
//! segments (oldest to newest), the combined finalised-segment map, and
//! the active segment's in-memory map -- fed to [`build`] in that
//! priority order, lowest first. On a tie the highest-priority source's
//! record wins and the rest are discarded, so a live or tombstone record
//! in a newer source always masks whatever an older source holds for the
//! same key.
//!
//! The generic engine below (`Next`/`NextKey`/`Merge`) is `merge.rs`'s
//! binary-heap k-way merge unchanged: a min-heap of "current record per
//! source" ordered by `compare_record`, with ties broken by
//! `source_index` so the last-registered source wins and
//! `discard_repetitions` drains every other source's copy of a masked
//! key. Only the `Record`/`Value` types and the glue turning segments and
//! memtables into sources are new.

use std::collections::BinaryHeap;
use core::cmp::Ordering;
use std::rc::Rc;
use std::sync::Arc;

struct Next<Source, Record>
{
	source: Source,
	current_record: Option<Rc<Record>>,
}

struct NextKey<Record>
{
	current_record: Rc<Record>,
	source_index: usize,
	compare_record: Box<dyn Fn(&Record, &Record)->Ordering>,
}

impl<Record> Ord for NextKey<Record>
{
	fn cmp(&self, other: &Self) -> Ordering
	{
		(self.compare_record)(&self.current_record, &other.current_record)
			.reverse()
			.then_with( || self.source_index.cmp(&other.source_index))
	}
}

impl<Record> PartialOrd for NextKey<Record>
{
	fn partial_cmp(&self, other: &Self) -> Option<Ordering>
	{
		Some(self.cmp(other))
	}
}

impl<Record> PartialEq for NextKey<Record>
{
	fn eq(&self, other: &Self) -> bool
	{
		(self.compare_record)(&self.current_record, &other.current_record)
			== Ordering::Equal
			&& (other.source_index == self.source_index)
	}
}

impl<Record> Eq for NextKey<Record> {}

/// merge various iterators into the lowest value,
/// choosing the last source as a tie-breaker
pub struct Merge<Source, Record>
where Source: Iterator<Item=Record>,
{
	sources: Vec<Next<Source, Record>>,
	sorter: BinaryHeap<NextKey<Record>>,
}

impl<Source, Record> Merge<Source, Record>
where Source: Iterator<Item=Record>,
{
	pub fn new<CompareRecord>(
		mut sources: Vec<Source>,
		compare_record: CompareRecord,
	) -> Self
	where
		CompareRecord: Fn(&Record, &Record) -> Ordering + Clone + 'static
	{
		let compare_record = Box::new(compare_record);

		let sources: Vec<_> =
			sources.drain(..)
				.filter_map(
					|mut src|
					{
						let current_record = src.next()?;
						Some(Next
						{
							source: src,
							current_record: Some(Rc::new(current_record)),
						})
					}
				)
				.collect();

		let mut sorter = BinaryHeap::with_capacity(sources.len());

		for (idx,src) in sources.iter().enumerate()
		{
			sorter.push(
				NextKey
				{
					source_index: idx,
					current_record: src.current_record.as_ref().unwrap().clone(),
					compare_record: compare_record.clone()
				}
			);
		}

		Self
		{
			sources,
			sorter,
		}
	}

	// continue to read next items until the next item read
	// won't match `current`.
	fn discard_repetitions(&mut self, current: &Record)
	{
		loop
		{
			{
				let next = self.sorter.peek();
				if next.is_none() { break; }
				let next = next.unwrap();

				match (next.compare_record)(current, &next.current_record)
				{
					Ordering::Less =>
					{
						break;
					}, // done
					Ordering::Greater => panic!("ordering violation"),
					Ordering::Equal => {}, // consume `next`
				}
			}

			let mut next = self.sorter.pop().unwrap();

			let source = &mut self.sources[next.source_index];
			let succ_record = source.source.next();
			if let Some(succ_record) = succ_record
			{
				assert!(
					(next.compare_record)(&next.current_record, &succ_record)
						!= Ordering::Greater
				);

				next.current_record = Rc::new(succ_record);
				source.current_record = Some(next.current_record.clone());
				self.sorter.push(next);
			}
		}
	}
}


impl<Source, Record> Iterator for Merge<Source, Record>
where Source: Iterator<Item=Record>,
	Record: std::fmt::Debug
{
	type Item = Record;

	fn next(&mut self) -> Option<Self::Item>
	{
		let mut next = self.sorter.pop()?;
		let source = &mut self.sources[next.source_index];

		let succ_record = source.source.next();
		if let Some(succ_record) = succ_record
		{
			assert!(
				(next.compare_record)(&next.current_record, &succ_record)
					!= Ordering::Greater
			);

			let item = source.current_record.take()
				.expect("current record is null");
			next.current_record = Rc::new(succ_record);
			source.current_record = Some(next.current_record.clone());
			self.sorter.push(next);

			let cur = Rc::try_unwrap(item).unwrap();
			self.discard_repetitions(&cur);

			Some(cur)
		}
		else
		{
			drop(next);
			// we don't push this source_index back onto self.sources
			let cur = source.current_record
				.take()
				.map(|item| Rc::try_unwrap(item).unwrap());
			self.discard_repetitions(&cur.as_ref().unwrap());
			cur
		}
	}
}

/// One key's resolved state as seen through the merge: either the live
/// value that should be returned to a reader, or a tombstone recording
/// that some source deleted this key. The merge iterator surfaces
/// tombstones rather than filtering them, since the packer needs to see
/// them to decide whether they can be dropped (see `crate::packer`).
#[derive(Debug, Clone)]
pub enum Value {
	Live(Arc<[u8]>),
	Tombstone,
}

impl From<crate::memtable::MemValue> for Value {
	fn from(v: crate::memtable::MemValue) -> Value {
		match v {
			crate::memtable::MemValue::Value(v) => Value::Live(v),
			crate::memtable::MemValue::Tombstone => Value::Tombstone,
		}
	}
}

#[derive(Debug, Clone)]
pub struct Record {
	pub key: Vec<u8>,
	pub value: Value,
}

/// A boxed, type-erased source feeding the database merge: a packed
/// segment's entries, a finalised-map's entries, or the active
/// memtable's entries, all turned into the same `Record` shape.
pub type DbSource<'a> = Box<dyn Iterator<Item = Record> + 'a>;

pub type DbMerge<'a> = Merge<DbSource<'a>, Record>;

/// Builds the k-way merge over `sources`, which callers must supply in
/// ascending priority order (oldest/lowest-priority first, the active
/// segment's map last) -- that ordering is what makes the generic
/// engine's "last source wins a tie" rule implement zeroskip's masking
/// rule.
pub fn build<'a>(sources: Vec<DbSource<'a>>, cmp: Arc<dyn crate::memtable::Comparator>) -> DbMerge<'a> {
	Merge::new(sources, move |a: &Record, b: &Record| cmp.compare(&a.key, &b.key))
}

/// Turns a packed segment's on-disk entries into merge records.
/// Individual packed-segment entries aren't separately CRC-protected
/// (only the whole-file index footer is), so a decode failure here
/// indicates a packed file was corrupted after it was written; there is
/// no well-defined "skip and continue" behavior for that; it is treated
/// as a programming/IO bug rather than recoverable input.
pub fn packed_source(seg: &crate::segment_reader::PackedSegment) -> DbSource<'_> {
	Box::new(seg.iter().map(|r| {
		let entry = r.expect("corrupt packed segment entry");
		match entry {
			crate::segment::Entry::Live { key, value } => {
				Record { key, value: Value::Live(Arc::from(value.into_boxed_slice())) }
			}
			crate::segment::Entry::Tombstone { key } => Record { key, value: Value::Tombstone },
		}
	}))
}

/// Turns a packed segment's entries from `lower_bound(key)` onward into
/// merge records, for seeking a `fetchnext` scan into the middle of a
/// segment without building a source for keys strictly before it.
pub fn packed_source_from<'a>(
	seg: &'a crate::segment_reader::PackedSegment,
	key: &[u8],
	cmp: &dyn crate::memtable::Comparator,
) -> crate::error::Result<DbSource<'a>> {
	let start = seg.lower_bound(key, cmp)?;
	Ok(Box::new((start..seg.len()).map(move |i| {
		let entry = seg
			.entry_at_pos(i)
			.expect("corrupt packed segment entry")
			.expect("index position out of range");
		match entry {
			crate::segment::Entry::Live { key, value } => {
				Record { key, value: Value::Live(Arc::from(value.into_boxed_slice())) }
			}
			crate::segment::Entry::Tombstone { key } => Record { key, value: Value::Tombstone },
		}
	})))
}

/// Turns every entry of an in-memory map into merge records.
pub fn memtable_source(mt: &crate::memtable::Memtable) -> DbSource<'_> {
	Box::new(mt.full_range().map(|(k, v)| Record { key: k.to_vec(), value: v.clone().into() }))
}

/// Turns the entries of an in-memory map from `key` onward into merge
/// records.
pub fn memtable_source_from<'a>(mt: &'a crate::memtable::Memtable, key: &[u8]) -> DbSource<'a> {
	Box::new(mt.range_from(key).map(|(k, v)| Record { key: k.to_vec(), value: v.clone().into() }))
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn merge1()
	{
		let a = [1u32,2,3,4,5].iter().cloned();
		let b = [1,3,5,8,10].iter().cloned();
		let merged = Merge::new(vec![a,b], |a: &u32,b: &u32| a.cmp(b));
		let merged: Vec<_> = merged.collect();
		assert_eq!(merged, vec![1u32,2,3,4,5,8,10]);
	}

	#[test]
	fn merge_with_key()
	{
		let a = [1u32,2,3,4,5].iter().rev().cloned();
		let b = [1,3,5,8,10].iter().rev().cloned();
		let merged = Merge::new(vec![a,b], |a: &u32,b: &u32| a.cmp(b).reverse());
		let mut merged: Vec<_> = merged.collect();
		merged.reverse();
		assert_eq!(merged, vec![1u32,2,3,4,5,8,10]);
	}

	#[test] #[should_panic]
	fn merge_check_sorting()
	{
		let a = [1u32,2,3,4,5].iter().cloned();
		let b = [1,3,5,8,10].iter().cloned();
		let merged = Merge::new(vec![a,b], |a: &u32,b: &u32| a.cmp(b).reverse());
		let _: Vec<_> = merged.collect();
	}

	#[test]
	fn merge_str()
	{
		let a = ["a","a"].iter().cloned();
		let b = ["b","b"].iter().cloned();
		let mut merged = Merge::new(vec![a,b], |a: &&str,b: &&str| a.cmp(b));
		assert_eq!(merged.next().unwrap(), "a");
		assert_eq!(merged.next().unwrap(), "b");
		assert_eq!(merged.next(), None);
	}

	#[test]
	fn higher_priority_source_masks_lower_on_tie()
	{
		use crate::memtable::{Comparator, LexicographicComparator, Memtable};

		let cmp: Arc<dyn Comparator> = Arc::new(LexicographicComparator);
		let mut old = Memtable::new(cmp.clone());
		old.insert(b"a", Arc::from(&b"old"[..]));
		old.insert(b"b", Arc::from(&b"only-old"[..]));

		let mut new = Memtable::new(cmp.clone());
		new.insert(b"a", Arc::from(&b"new"[..]));
		new.insert_tombstone(b"b");

		let sources = vec![memtable_source(&old), memtable_source(&new)];
		let merged: Vec<_> = build(sources, cmp).collect();
		assert_eq!(merged.len(), 2);
		match &merged[0].value {
			Value::Live(v) => assert_eq!(&**v, b"new"),
			_ => panic!("expected live value from higher priority source"),
		}
		assert!(matches!(merged[1].value, Value::Tombstone));
	}
}
