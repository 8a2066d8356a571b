//! Minimal diagnostic output, in the same spirit as the plain `eprintln!`
//! warnings scattered through the rest of this crate's ancestry: no
//! logging framework, just a level check and a place to redirect it.

use std::io::Write as _;
use std::sync::OnceLock;

#[derive(Clone, Copy, PartialEq, PartialOrd, Debug)]
pub enum Level {
	Error = 0,
	Warn = 1,
	Debug = 2,
}

fn configured_level() -> Level {
	match std::env::var("ZS_LOG_LEVEL").as_deref() {
		Ok("error") => Level::Error,
		Ok("debug") => Level::Debug,
		_ => Level::Warn,
	}
}

fn log_file() -> Option<&'static std::sync::Mutex<std::fs::File>> {
	static FILE: OnceLock<Option<std::sync::Mutex<std::fs::File>>> = OnceLock::new();
	FILE.get_or_init(|| {
		let path = std::env::var_os("ZS_LOG_FILE")?;
		std::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(path)
			.ok()
			.map(std::sync::Mutex::new)
	})
	.as_ref()
}

/// `ZS_LOG_TO_SYSLOG` is accepted for environment-contract parity with the
/// original but there is no syslog crate in this stack, so it's a no-op.
pub fn log(level: Level, msg: std::fmt::Arguments) {
	if level as i32 > configured_level() as i32 {
		return;
	}
	if let Some(f) = log_file() {
		if let Ok(mut f) = f.lock() {
			let _ = writeln!(f, "{msg}");
			return;
		}
	}
	eprintln!("{msg}");
}

macro_rules! zs_warn {
	($($arg:tt)*) => {
		$crate::diag::log($crate::diag::Level::Warn, format_args!($($arg)*))
	};
}

macro_rules! zs_debug {
	($($arg:tt)*) => {
		$crate::diag::log($crate::diag::Level::Debug, format_args!($($arg)*))
	};
}

pub(crate) use zs_debug;
pub(crate) use zs_warn;
