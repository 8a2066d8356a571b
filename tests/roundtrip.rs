//! Round-trip and ordering invariants that must hold for every key/value
//! shape, exercised over a representative sample of keys rather than an
//! exhaustive proptest grid.

use zeroskip::db::{Database, OpenMode};
use zeroskip::error::Error;

const SAMPLE: &[(&[u8], &[u8])] = &[
	(b"", b"empty-key"),
	(b"a", b""),
	(b"\0\0", b"nul-bytes"),
	(b"zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz", b"long key"),
	(b"unicode-\xe2\x9c\x93", b"checkmark"),
];

#[test]
fn add_remove_add_round_trip_for_each_sample_key() {
	for (key, value) in SAMPLE {
		let dir = tempfile::tempdir().unwrap();
		let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();

		let mut txn = db.transaction_begin(1000).unwrap();
		db.add(key, value, &mut txn).unwrap();
		db.commit(&mut txn).unwrap();
		assert_eq!(&db.fetch(key).unwrap(), value);

		db.remove(key, &mut txn).unwrap();
		db.commit(&mut txn).unwrap();
		assert!(matches!(db.fetch(key), Err(Error::NotFound)));

		let value2 = b"second-value";
		db.add(key, value2, &mut txn).unwrap();
		db.commit(&mut txn).unwrap();
		db.transaction_end(txn);
		assert_eq!(&db.fetch(key).unwrap(), value2);
	}
}

#[test]
fn foreach_yields_comparator_ascending_order() {
	let dir = tempfile::tempdir().unwrap();
	let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();
	let mut txn = db.transaction_begin(1000).unwrap();
	let keys = ["delta", "alpha", "charlie", "bravo", "echo"];
	for k in keys {
		db.add(k.as_bytes(), b"v", &mut txn).unwrap();
	}
	db.commit(&mut txn).unwrap();
	db.transaction_end(txn);

	let mut seen = Vec::new();
	db.foreach(b"", |_, _| true, |k, _| {
		seen.push(String::from_utf8(k.to_vec()).unwrap());
		Ok(())
	})
	.unwrap();
	let mut expected: Vec<_> = keys.iter().map(|s| s.to_string()).collect();
	expected.sort();
	assert_eq!(seen, expected);
}

#[test]
fn commit_with_no_new_writes_is_a_no_op() {
	let dir = tempfile::tempdir().unwrap();
	let mut db = Database::open(dir.path(), OpenMode::Create).unwrap();
	let mut txn = db.transaction_begin(1000).unwrap();
	db.add(b"k", b"v", &mut txn).unwrap();
	db.commit(&mut txn).unwrap();
	let len_after_first_commit = db.info().active_segment_len;
	db.commit(&mut txn).unwrap();
	db.transaction_end(txn);
	assert_eq!(db.info().active_segment_len, len_after_first_commit);
}
