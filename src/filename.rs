//! Parsing and building of `zeroskip-<uuid>-<n>` / `zeroskip-<uuid>-<n>-<n>`
//! / `zeroskip-<uuid>-<s>-<e>` segment file names.
//!
//! The active segment carries a single index. Once sealed it is renamed to
//! the two-equal-index form, so "finalised" is recoverable from the name
//! alone, with no need to consult `.zsdb`'s current index. A packed file
//! carries a `start-end` range with `start < end`. See spec.md §6 and the
//! naming comment atop `zeroskip-priv.h`.

use std::path::Path;

pub const PREFIX: &str = "zeroskip-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
	/// A single index in the file name; this is the currently-open file.
	Active(u32),
	/// Two equal indices in the file name; sealed, no longer active.
	Finalised(u32),
	/// Two distinct indices, `start < end`, a packed file covering that
	/// inclusive range.
	Packed(u32, u32),
}

pub fn active_name(uuid: &uuid::Uuid, idx: u32) -> String {
	format!("{PREFIX}{uuid}-{idx}")
}

pub fn finalised_name(uuid: &uuid::Uuid, idx: u32) -> String {
	format!("{PREFIX}{uuid}-{idx}-{idx}")
}

pub fn packed_name(uuid: &uuid::Uuid, start: u32, end: u32) -> String {
	format!("{PREFIX}{uuid}-{start}-{end}")
}

/// Canonical hyphenated UUID text length (`8-4-4-4-12` hex digits).
const UUID_TEXT_LEN: usize = 36;

/// Parses a file name into its uuid and kind, if it matches the zeroskip
/// naming scheme at all. Active/finalised/packed is recovered directly
/// from whether the name carries one index or two, and whether those two
/// are equal -- no external state needed.
///
/// A canonical UUID's own hyphens make splitting from the right ambiguous
/// (the UUID has four internal dashes, the same separator used before the
/// index fields), so this anchors on the UUID's fixed text length instead
/// of splitting generically.
pub fn parse(name: &str) -> Option<(uuid::Uuid, FileKind)> {
	let rest = name.strip_prefix(PREFIX)?;
	if rest.len() <= UUID_TEXT_LEN || rest.as_bytes()[UUID_TEXT_LEN] != b'-' {
		return None;
	}
	let uuid = uuid::Uuid::parse_str(&rest[..UUID_TEXT_LEN]).ok()?;
	let mut fields = rest[UUID_TEXT_LEN + 1..].split('-');
	let first: u32 = fields.next()?.parse().ok()?;
	match (fields.next(), fields.next()) {
		(None, None) => Some((uuid, FileKind::Active(first))),
		(Some(second), None) => {
			let second: u32 = second.parse().ok()?;
			match second.cmp(&first) {
				std::cmp::Ordering::Equal => Some((uuid, FileKind::Finalised(first))),
				std::cmp::Ordering::Greater => Some((uuid, FileKind::Packed(first, second))),
				std::cmp::Ordering::Less => None,
			}
		}
		_ => None,
	}
}

pub fn parse_path(path: &Path) -> Option<(uuid::Uuid, FileKind)> {
	parse(path.file_name()?.to_str()?)
}
