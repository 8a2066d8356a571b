//! The `.zsdb` directory metadata file: the durable pointer to the
//! last-known-good write offset and the current segment index, updated
//! atomically through a lock file and a rename.
//!
//! Layout (61 bytes, big-endian): 8-byte signature, 8-byte last-known-good
//! offset, 37-byte NUL-terminated UUID text, 4-byte current index, 4-byte
//! CRC32C of everything before it. Grounded on `zeroskip-dotzsdb.c`'s
//! `zs_dotzsdb_create`/`zs_dotzsdb_validate`/`zs_dotzsdb_update_*`.

use crate::error::{Error, Result};
use crate::lock::LockGuard;
use byteorder::{BigEndian, ByteOrder};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

pub const FILE_NAME: &str = ".zsdb";
pub const SIGNATURE: u64 = crate::codec::SIGNATURE;
pub const SIZE: usize = 61;
const UUID_FIELD_LEN: usize = 37; // 36 hyphenated chars + NUL

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotZsdb {
	pub offset: u64,
	pub uuid: uuid::Uuid,
	pub current_index: u32,
}

impl DotZsdb {
	pub fn encode(&self) -> [u8; SIZE] {
		let mut buf = [0u8; SIZE];
		BigEndian::write_u64(&mut buf[0..8], SIGNATURE);
		BigEndian::write_u64(&mut buf[8..16], self.offset);
		let uuid_str = self.uuid.hyphenated().to_string();
		buf[16..16 + uuid_str.len()].copy_from_slice(uuid_str.as_bytes());
		// buf[16+36] stays 0 (NUL terminator)
		BigEndian::write_u32(&mut buf[16 + UUID_FIELD_LEN..16 + UUID_FIELD_LEN + 4], self.current_index);
		let crc = crc32c::crc32c(&buf[0..SIZE - 4]);
		BigEndian::write_u32(&mut buf[SIZE - 4..SIZE], crc);
		buf
	}

	pub fn decode(buf: &[u8]) -> Result<DotZsdb> {
		if buf.len() != SIZE {
			return Err(Error::InvalidDb(
				Path::new(FILE_NAME).to_owned(),
				format!("expected {SIZE} bytes, got {}", buf.len()),
			));
		}
		let sig = BigEndian::read_u64(&buf[0..8]);
		if sig != SIGNATURE {
			return Err(Error::InvalidDb(Path::new(FILE_NAME).to_owned(), "bad signature".into()));
		}
		let stored_crc = BigEndian::read_u32(&buf[SIZE - 4..SIZE]);
		let crc = crc32c::crc32c(&buf[0..SIZE - 4]);
		if crc != stored_crc {
			return Err(Error::InvalidDb(Path::new(FILE_NAME).to_owned(), "crc32c mismatch".into()));
		}
		let offset = BigEndian::read_u64(&buf[8..16]);
		let uuid_bytes = &buf[16..16 + UUID_FIELD_LEN];
		let nul = uuid_bytes.iter().position(|&b| b == 0).unwrap_or(uuid_bytes.len());
		let uuid_str = std::str::from_utf8(&uuid_bytes[..nul])
			.map_err(|_| Error::InvalidDb(Path::new(FILE_NAME).to_owned(), "uuid not utf8".into()))?;
		let uuid = uuid::Uuid::parse_str(uuid_str)
			.map_err(|e| Error::InvalidDb(Path::new(FILE_NAME).to_owned(), format!("bad uuid: {e}")))?;
		let current_index = BigEndian::read_u32(&buf[16 + UUID_FIELD_LEN..16 + UUID_FIELD_LEN + 4]);
		Ok(DotZsdb { offset, uuid, current_index })
	}

	pub fn read(dir: &Path) -> Result<DotZsdb> {
		let buf = fs::read(dir.join(FILE_NAME))?;
		Self::decode(&buf)
	}

	/// Creates `.zsdb` for a brand new database directory. Fails if it
	/// already exists.
	pub fn create(dir: &Path, uuid: uuid::Uuid) -> Result<DotZsdb> {
		let meta = DotZsdb { offset: crate::codec::HEADER_SIZE as u64, uuid, current_index: 0 };
		let path = dir.join(FILE_NAME);
		let mut f = fs::OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(&path)
			.map_err(|e| {
				if e.kind() == std::io::ErrorKind::AlreadyExists {
					Error::Exists(dir.to_owned())
				} else {
					Error::Io(e)
				}
			})?;
		use std::io::Write;
		f.write_all(&meta.encode())?;
		f.sync_all()?;
		Ok(meta)
	}

	/// Atomically updates the offset/current-index fields: lock, write a
	/// fresh `.zsdb` to a temp file, fsync, rename over the original,
	/// release the lock. Mirrors `zs_dotzsdb_update_begin`/`_end`.
	pub fn update(dir: &Path, offset: u64, current_index: u32) -> Result<DotZsdb> {
		let _lock = LockGuard::acquire(&crate::lock::dotzsdb_lock_path(dir))?;
		let existing = Self::read(dir)?;
		let updated = DotZsdb { offset, current_index, ..existing };
		let mut tmp = tempfile_fast::PersistableTempFile::new_in(dir)?;
		use std::io::Write;
		tmp.write_all(&updated.encode())?;
		tmp.flush()?;
		tmp.persist_by_rename(dir.join(FILE_NAME)).map_err(|e| e.error)?;
		Ok(updated)
	}

	/// The inode of `.zsdb` right now, used to detect a concurrent
	/// process's commit (see `reload` in `db.rs`).
	pub fn inode(dir: &Path) -> Result<u64> {
		Ok(fs::metadata(dir.join(FILE_NAME))?.ino())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() {
		let m = DotZsdb { offset: 1234, uuid: uuid::Uuid::new_v4(), current_index: 7 };
		let buf = m.encode();
		assert_eq!(buf.len(), SIZE);
		let back = DotZsdb::decode(&buf).unwrap();
		assert_eq!(m, back);
	}

	#[test]
	fn corrupted_crc_rejected() {
		let m = DotZsdb { offset: 1, uuid: uuid::Uuid::new_v4(), current_index: 0 };
		let mut buf = m.encode();
		buf[10] ^= 0xFF;
		assert!(DotZsdb::decode(&buf).is_err());
	}

	#[test]
	fn create_and_update_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let uuid = uuid::Uuid::new_v4();
		let created = DotZsdb::create(dir.path(), uuid).unwrap();
		assert_eq!(created.current_index, 0);
		let updated = DotZsdb::update(dir.path(), 4096, 1).unwrap();
		assert_eq!(updated.offset, 4096);
		assert_eq!(updated.current_index, 1);
		assert_eq!(updated.uuid, uuid);
		let reread = DotZsdb::read(dir.path()).unwrap();
		assert_eq!(reread, updated);
	}
}
