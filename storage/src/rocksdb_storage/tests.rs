//! Tests

use assert_matches::assert_matches;

use super::{test_utils::TempStorage, OpenMode};
use crate::{Batch, Error, RawIterator, Storage, WriteMode};

fn collect_keys<S: Storage>(storage: &S, start: &[u8], end: Option<&[u8]>) -> Vec<Vec<u8>> {
    let mut iter = storage.raw_iter(end);
    iter.seek(start);
    let mut keys = Vec::new();
    while iter.valid() {
        keys.push(iter.key().expect("valid iterator has a key").to_vec());
        iter.next();
    }
    keys
}

#[test]
fn test_batch_put_and_delete() {
    let storage = TempStorage::new();

    let mut batch = storage.new_batch();
    batch.put(b"key1", b"value1");
    batch.put(b"key2", b"value2");
    batch.put(b"key3", b"value3");
    batch.delete(b"key2");
    assert_eq!(batch.len(), 4);
    storage
        .commit_batch(batch, WriteMode::Durable)
        .expect("cannot commit batch");

    assert_eq!(storage.get(b"key1").unwrap(), Some(b"value1".to_vec()));
    assert!(!storage.has(b"key2").unwrap());
    assert!(storage.has(b"key3").unwrap());
}

#[test]
fn test_buffered_commit_is_visible() {
    let storage = TempStorage::new();

    let mut batch = storage.new_batch();
    batch.put(b"a", b"1");
    storage
        .commit_batch(batch, WriteMode::Buffered)
        .expect("cannot commit batch");

    assert_eq!(storage.get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_raw_iterator_respects_upper_bound() {
    let storage = TempStorage::new();

    let mut batch = storage.new_batch();
    for key in [&b"vl"[..], &b"vm"[..], &b"vm\x00a"[..], &b"vm\x00b"[..], &b"vn"[..], &b"z"[..]] {
        batch.put(key, b"x");
    }
    storage.commit_batch(batch, WriteMode::Durable).unwrap();

    assert_eq!(
        collect_keys(&*storage, b"vm", Some(&b"vn"[..])),
        vec![b"vm".to_vec(), b"vm\x00a".to_vec(), b"vm\x00b".to_vec()]
    );
    assert_eq!(collect_keys(&*storage, b"vn", None).len(), 2);

    let mut iter = storage.raw_iter(None);
    iter.seek_to_first();
    assert_eq!(iter.key(), Some(&b"vl"[..]));
    assert_eq!(iter.value(), Some(&b"x"[..]));
}

#[test]
fn test_read_only_rejects_writes() {
    let storage = TempStorage::new();
    let mut batch = storage.new_batch();
    batch.put(b"key", b"value");
    storage.commit_batch(batch, WriteMode::Durable).unwrap();

    let storage = storage.reopen(OpenMode::ReadOnly);
    assert_eq!(storage.get(b"key").unwrap(), Some(b"value".to_vec()));

    let mut batch = storage.new_batch();
    batch.delete(b"key");
    assert_matches!(
        storage.commit_batch(batch, WriteMode::Durable),
        Err(Error::ReadOnly(_))
    );
    assert_matches!(storage.compact_range(None, None), Err(Error::ReadOnly(_)));
}

#[test]
fn test_read_only_open_of_missing_store_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("nothing.db");
    assert_matches!(
        super::RocksDbStorage::open(&missing, OpenMode::ReadOnly),
        Err(Error::RocksDBError(_))
    );
    assert!(!missing.exists());
}

#[test]
fn test_compaction_keeps_live_data() {
    let storage = TempStorage::new();

    let mut batch = storage.new_batch();
    for i in 0u32..100 {
        batch.put(i.to_be_bytes(), b"payload");
    }
    storage.commit_batch(batch, WriteMode::Durable).unwrap();

    let mut batch = storage.new_batch();
    for i in 0u32..50 {
        batch.delete(i.to_be_bytes());
    }
    storage.commit_batch(batch, WriteMode::Durable).unwrap();
    storage.compact_range(None, None).unwrap();

    assert!(!storage.has(10u32.to_be_bytes()).unwrap());
    assert!(storage.has(60u32.to_be_bytes()).unwrap());
    assert_eq!(collect_keys(&*storage, &[], None).len(), 50);
}
