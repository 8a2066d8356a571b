//! Builds one packed segment from an already-ordered, already-deduplicated
//! stream of records (the output of [`crate::merge::build`] or of a single
//! already-sorted `Memtable`), then atomically installs it and unlinks the
//! inputs it replaces.
//!
//! Grounded on `zeroskip-packed.c`'s `zs_packed_file_new_from_memtree` (data
//! region, then count + offset footer, then FINAL commit) and on the
//! teacher's `lib.rs::compact`/`_purge_compacted_files` for the
//! write-new-file-then-unlink-old-files shape.

use crate::codec::{self, Header};
use crate::error::Result;
use crate::filename;
use crate::merge::{Record, Value};
use crate::write::ActiveSegment;
use std::path::{Path, PathBuf};

/// Packs `records` (already in ascending key order with duplicates
/// resolved) into a new `zeroskip-<uuid>-<start>-<end>` file in `dir`.
///
/// `drop_tombstones` must be `true` only when the input stream covers
/// every segment that could hold a record this repack's tombstones might
/// mask -- otherwise a tombstone must be carried into the packed output
/// so a later, narrower repack doesn't resurrect the record it was
/// masking.
pub fn pack(
	dir: &Path,
	uuid: uuid::Uuid,
	start: u32,
	end: u32,
	records: impl Iterator<Item = Record>,
	drop_tombstones: bool,
) -> Result<PathBuf> {
	let tmp_name = format!(".zeroskip-pack-tmp-{uuid}-{start}-{end}");
	let tmp_path = dir.join(tmp_name);
	// In case a previous attempt was interrupted before the final rename.
	let _ = std::fs::remove_file(&tmp_path);

	let header = Header { uuid, start_idx: start, end_idx: end };
	let mut seg = ActiveSegment::create(&tmp_path, header)?;

	let mut offsets: Vec<u64> = Vec::new();
	seg.begin_crc_window();
	for record in records {
		if matches!(record.value, Value::Tombstone) && drop_tombstones {
			continue;
		}
		let offset = seg.len();
		match record.value {
			Value::Live(value) => {
				let value_offset = 24 + codec::round_up8(record.key.len());
				seg.append(&codec::encode_key_record(&record.key, value_offset as u64))?;
				seg.append(&codec::encode_value_record(&value))?;
			}
			Value::Tombstone => {
				seg.append(&codec::encode_deleted_record(&record.key))?;
			}
		}
		offsets.push(offset);
	}
	seg.write_commit(false)?;

	seg.begin_crc_window();
	seg.append(&(offsets.len() as u64).to_be_bytes())?;
	for off in &offsets {
		seg.append(&off.to_be_bytes())?;
	}
	seg.write_commit(true)?;

	let final_path = dir.join(filename::packed_name(&uuid, start, end));
	std::fs::rename(&tmp_path, &final_path)?;
	Ok(final_path)
}

/// Removes every input file that was folded into a just-written packed
/// segment. Best-effort past the first file: a failure partway through
/// leaves some stale inputs on disk (harmless -- the packed file already
/// supersedes them logically) rather than aborting with some unlinked and
/// some not for no clear reason.
pub fn unlink_inputs(paths: &[PathBuf]) -> Result<()> {
	let mut first_err = None;
	for path in paths {
		if let Err(e) = std::fs::remove_file(path) {
			if first_err.is_none() {
				first_err = Some(e);
			}
		}
	}
	match first_err {
		Some(e) => Err(e.into()),
		None => Ok(()),
	}
}
