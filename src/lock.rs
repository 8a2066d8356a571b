//! Advisory lock files used to serialize writers, packers, and `.zsdb`
//! metadata updates across processes.
//!
//! Grounded on `file-lock.c`: a lock is just a file created with
//! `O_CREAT|O_EXCL`; contention is resolved with a randomized exponential
//! backoff rather than blocking indefinitely, and the lock is released by
//! deleting the file. There is no kernel-level `flock()` here -- existence
//! of the file *is* the lock, which is what lets the holder also use the
//! same file as a staging location for the atomic rename in
//! [`crate::metadata`].

use crate::error::{Error, Result};
use std::ffi::CString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

const BACKOFF_INITIAL_MS: u64 = 1;
const BACKOFF_MULT_FACTOR_MAX: u64 = 1000;

/// Default deadline used by callers that don't care about the exact
/// timeout (e.g. `.zsdb`'s internal lock-then-rename). Public API callers
/// (`Database::write_lock_acquire`/`pack_lock_acquire`) pick their own.
pub const DEFAULT_TIMEOUT_MS: i64 = 5_000;

/// Every lock file currently held by this process, so the signal handler
/// installed by [`ensure_signal_handler`] knows what to unlink. The
/// original installs a `SIGINT`/`SIGTERM` handler that removes the
/// dotzsdb lock; here that's generalized to every lock file (write, pack,
/// dotzsdb) any live `LockGuard` in this process holds.
fn registered_locks() -> &'static Mutex<Vec<PathBuf>> {
	static LOCKS: OnceLock<Mutex<Vec<PathBuf>>> = OnceLock::new();
	LOCKS.get_or_init(|| Mutex::new(Vec::new()))
}

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Best-effort signal handler: unlinks every currently-registered lock
/// file, then re-raises the signal with the default disposition so the
/// process still dies the way it would have. `try_lock` rather than
/// `lock` because a signal can land while this same thread already holds
/// `registered_locks()` (e.g. inside `LockGuard::drop`); skipping cleanup
/// in that narrow race is preferable to deadlocking in a signal handler.
extern "C" fn cleanup_on_signal(sig: libc::c_int) {
	if let Ok(paths) = registered_locks().try_lock() {
		for path in paths.iter() {
			if let Some(s) = path.to_str() {
				if let Ok(c) = CString::new(s) {
					unsafe {
						libc::unlink(c.as_ptr());
					}
				}
			}
		}
	}
	unsafe {
		libc::signal(sig, libc::SIG_DFL);
		libc::raise(sig);
	}
}

fn ensure_signal_handler() {
	if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
		return;
	}
	unsafe {
		libc::signal(libc::SIGINT, cleanup_on_signal as libc::sighandler_t);
		libc::signal(libc::SIGTERM, cleanup_on_signal as libc::sighandler_t);
	}
}

/// An acquired lock file. Dropping it removes the file, releasing the
/// lock. A process crashing while holding one leaves the file behind;
/// recovery is a human/ops concern, matching the original (there is no
/// liveness check beyond the lock's mere existence) -- except for the
/// ordinary `SIGINT`/`SIGTERM` case, which [`ensure_signal_handler`]
/// cleans up before the process exits.
pub struct LockGuard {
	path: PathBuf,
}

impl LockGuard {
	/// Convenience wrapper using [`DEFAULT_TIMEOUT_MS`].
	pub fn acquire(path: &Path) -> Result<LockGuard> {
		Self::acquire_timeout(path, DEFAULT_TIMEOUT_MS)
	}

	/// Acquires the lock at `path`. `timeout_ms == 0` tries exactly once,
	/// a negative value blocks without a deadline (retrying forever with
	/// capped backoff), and a positive value is a deadline in
	/// milliseconds from now.
	pub fn acquire_timeout(path: &Path, timeout_ms: i64) -> Result<LockGuard> {
		let deadline = if timeout_ms > 0 {
			Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
		} else {
			None
		};
		let mut backoff_ms = BACKOFF_INITIAL_MS;
		loop {
			match std::fs::OpenOptions::new()
				.write(true)
				.create_new(true)
				.open(path)
			{
				Ok(_) => {
					ensure_signal_handler();
					registered_locks().lock().unwrap().push(path.to_owned());
					return Ok(LockGuard { path: path.to_owned() });
				}
				Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
					if timeout_ms == 0 {
						return Err(Error::Contention(format!("lock {path:?} is already held")));
					}
					if let Some(dl) = deadline {
						if Instant::now() >= dl {
							return Err(Error::Contention(format!(
								"timed out acquiring lock {path:?} after {timeout_ms}ms"
							)));
						}
					}
					let jitter = 750 + (pseudo_rand() % 500);
					let wait_ms = (jitter * backoff_ms / 1000).max(1);
					std::thread::sleep(Duration::from_millis(wait_ms));
					backoff_ms = (backoff_ms * 2).min(BACKOFF_MULT_FACTOR_MAX);
				}
				Err(e) => return Err(e.into()),
			}
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl Drop for LockGuard {
	fn drop(&mut self) {
		let _ = std::fs::remove_file(&self.path);
		if let Ok(mut paths) = registered_locks().lock() {
			if let Some(pos) = paths.iter().position(|p| p == &self.path) {
				paths.remove(pos);
			}
		}
	}
}

/// A small non-cryptographic PRNG seed from the current time, just for
/// backoff jitter -- no need to pull in `rand` as a normal dependency for
/// this.
fn pseudo_rand() -> u64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.subsec_nanos())
		.unwrap_or(0);
	let pid = std::process::id();
	(nanos as u64).wrapping_mul(2654435761).wrapping_add(pid as u64)
}

pub fn write_lock_path(dir: &Path) -> PathBuf {
	dir.join("zsdbw.lock")
}

pub fn pack_lock_path(dir: &Path) -> PathBuf {
	dir.join("zsdbp.lock")
}

pub fn dotzsdb_lock_path(dir: &Path) -> PathBuf {
	dir.join(".zsdb.lock")
}
