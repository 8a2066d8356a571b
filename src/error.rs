//! Error types returned by the public API.

use std::path::PathBuf;

/// Everything that can go wrong while operating on a database.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),

	#[error("database is not open")]
	NotOpen,

	#[error("invalid database directory {0:?}: {1}")]
	InvalidDb(PathBuf, String),

	#[error("key not found")]
	NotFound,

	#[error("record corrupted: {0}")]
	Corrupted(String),

	#[error("could not acquire lock: {0}")]
	Contention(String),

	#[error("operation requires the write lock: {0}")]
	Conflict(String),

	#[error("database already exists at {0:?}")]
	Exists(PathBuf),

	#[error("invalid open mode: {0}")]
	InvalidMode(String),

	#[error("invalid or unreadable segment file {0:?}: {1}")]
	InvalidFile(PathBuf, String),

	#[error("internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
