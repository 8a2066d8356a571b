//! `zeroskip` -- a command-line front end over one database directory.
//!
//! Grounded on `src/bin/*.rs`'s clap-derive CLI pattern (one `Database`
//! open per invocation) and on `zeroskipdb`'s own command set
//! (`open|add|get|rm|foreach|info|repack`) from `zsdb.c`'s `main()`.

use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use zeroskip::db::{Database, OpenMode};

#[derive(Parser)]
#[command(name = "zeroskip", about = "An embedded ordered key/value store")]
struct Cli {
	/// Database directory.
	dir: PathBuf,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Creates the database directory if it doesn't already exist.
	Open,
	/// Adds or overwrites a key with a value, committing immediately.
	Add { key: String, value: String },
	/// Prints the value for a key, or exits non-zero if it's absent.
	Get { key: String },
	/// Deletes a key, committing immediately.
	Rm { key: String },
	/// Streams every live key under a prefix as `key\tvalue` lines.
	Foreach {
		#[arg(default_value = "")]
		prefix: String,
	},
	/// Prints summary statistics about the database.
	Info,
	/// Merges finalised segments (or, absent any, the two oldest packed
	/// segments) into a single packed segment.
	Repack,
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	match run(cli) {
		Ok(code) => code,
		Err(e) => {
			eprintln!("zeroskip: {e}");
			ExitCode::FAILURE
		}
	}
}

fn run(cli: Cli) -> zeroskip::error::Result<ExitCode> {
	match cli.command {
		Command::Open => {
			Database::open(&cli.dir, OpenMode::Create)?;
			Ok(ExitCode::SUCCESS)
		}
		Command::Add { key, value } => {
			let mut db = Database::open(&cli.dir, OpenMode::ReadWrite)?;
			let mut txn = db.transaction_begin(-1)?;
			db.add(key.as_bytes(), value.as_bytes(), &mut txn)?;
			db.commit(&mut txn)?;
			db.transaction_end(txn);
			Ok(ExitCode::SUCCESS)
		}
		Command::Get { key } => {
			let mut db = Database::open(&cli.dir, OpenMode::ReadWrite)?;
			match db.fetch(key.as_bytes()) {
				Ok(value) => {
					std::io::stdout().write_all(&value)?;
					println!();
					Ok(ExitCode::SUCCESS)
				}
				Err(zeroskip::error::Error::NotFound) => Ok(ExitCode::FAILURE),
				Err(e) => Err(e),
			}
		}
		Command::Rm { key } => {
			let mut db = Database::open(&cli.dir, OpenMode::ReadWrite)?;
			let mut txn = db.transaction_begin(-1)?;
			db.remove(key.as_bytes(), &mut txn)?;
			db.commit(&mut txn)?;
			db.transaction_end(txn);
			Ok(ExitCode::SUCCESS)
		}
		Command::Foreach { prefix } => {
			let mut db = Database::open(&cli.dir, OpenMode::ReadWrite)?;
			let stdout = std::io::stdout();
			let mut out = stdout.lock();
			db.foreach(
				prefix.as_bytes(),
				|_, _| true,
				|k, v| {
					out.write_all(k)?;
					out.write_all(b"\t")?;
					out.write_all(v)?;
					out.write_all(b"\n")?;
					Ok(())
				},
			)?;
			Ok(ExitCode::SUCCESS)
		}
		Command::Info => {
			let db = Database::open(&cli.dir, OpenMode::ReadWrite)?;
			db.dump(&mut std::io::stdout())?;
			Ok(ExitCode::SUCCESS)
		}
		Command::Repack => {
			let mut db = Database::open(&cli.dir, OpenMode::ReadWrite)?;
			db.repack(-1)?;
			Ok(ExitCode::SUCCESS)
		}
	}
}
