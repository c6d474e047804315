//! App store scenarios: clone, value and EVM extraction, totals

use assert_matches::assert_matches;
use clusterkit_storage::{
    rocksdb_storage::{OpenMode, RocksDbStorage},
    Batch, Storage, WriteMode,
};
use clusterkit_tree::{MutableTree, NodeDb};
use tempfile::TempDir;

use super::common::{kv, make_tree, read_all, read_store, FlakyStorage};
use crate::{
    appstore::{
        clone_tree, evm_root_key, extract_evm_aux, extract_evm_state, extract_values, total_data,
        DEFAULT_EVM_ROOT, VALUE_DB_VERSION_KEY,
    },
    batch::BatchedWriter,
    config::{CloneOptions, EvmAuxOptions, ExtractOptions},
    extract::{RangeExtractor, Transformed},
    key_codec::{compose, encode_height_be},
    progress::ProgressEstimator,
    Error,
};

fn history() -> Vec<super::common::Entries> {
    vec![
        vec![kv("alpha", "1"), kv("beta", "1"), kv("gamma", "1")],
        vec![kv("beta", "2"), kv("delta", "2")],
        vec![kv("alpha", "3"), kv("epsilon", "3")],
    ]
}

#[test]
fn clone_copies_the_latest_version() {
    let dir = TempDir::new().unwrap();
    let (src, dest) = (dir.path().join("app"), dir.path().join("clone"));
    assert_eq!(make_tree(&src, &history()), 3);

    let options = CloneOptions {
        saves_per_commit: 2,
        log_level: 2,
        ..Default::default()
    };
    let report = clone_tree(&src, None, &dest, &options).unwrap();
    assert_eq!(report.version, 3);
    assert_eq!(report.keys, 5);
    assert_eq!(report.save.leaves, 5);

    let source = RocksDbStorage::open(&src, OpenMode::ReadOnly).unwrap();
    let mut original = MutableTree::new(NodeDb::new(&source));
    original.load().unwrap();
    let cloned_store = RocksDbStorage::open(&dest, OpenMode::ReadOnly).unwrap();
    let mut cloned = MutableTree::new(NodeDb::new(&cloned_store));
    assert_eq!(cloned.load().unwrap(), 3);
    assert_eq!(cloned.versions().unwrap(), vec![3]);

    let snapshot = cloned.last_saved().unwrap();
    assert_eq!(snapshot.root_hash(), original.last_saved().unwrap().root_hash());
    assert_eq!(snapshot.get(b"alpha").unwrap(), Some(b"3".to_vec()));
    assert_eq!(snapshot.get(b"beta").unwrap(), Some(b"2".to_vec()));
    assert_eq!(snapshot.get(b"epsilon").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn clone_of_an_unsaved_height_takes_the_nearest_older_version() {
    let dir = TempDir::new().unwrap();
    let (src, dest) = (dir.path().join("app"), dir.path().join("clone"));
    make_tree(&src, &history());

    let options = CloneOptions {
        height: 2,
        ..Default::default()
    };
    let report = clone_tree(&src, None, &dest, &options).unwrap();
    assert_eq!(report.version, 2);
    assert_eq!(report.keys, 4);

    let later = dir.path().join("later");
    let options = CloneOptions {
        height: 40,
        ..Default::default()
    };
    assert_eq!(clone_tree(&src, None, &later, &options).unwrap().version, 3);
}

#[test]
fn clone_of_a_missing_store_fails_to_open() {
    let dir = TempDir::new().unwrap();
    assert_matches!(
        clone_tree(
            &dir.path().join("nowhere"),
            None,
            &dir.path().join("clone"),
            &CloneOptions::default()
        ),
        Err(Error::StoreOpenFailure { .. })
    );
}

#[test]
fn clone_with_a_value_store_inlines_values_of_the_latest_version() {
    let dir = TempDir::new().unwrap();
    let (src, values_path, dest) = (
        dir.path().join("app"),
        dir.path().join("values"),
        dir.path().join("clone"),
    );
    {
        let source = RocksDbStorage::open(&src, OpenMode::ReadWrite).unwrap();
        let values = RocksDbStorage::open(&values_path, OpenMode::ReadWrite).unwrap();
        let mut tree = MutableTree::new(NodeDb::with_value_store(&source, &values));
        for (version, changes) in history().into_iter().enumerate() {
            let mut batch = values.new_batch();
            for (key, value) in &changes {
                batch.put(key, value);
            }
            values.commit_batch(batch, WriteMode::Durable).unwrap();
            for (key, value) in changes {
                tree.set(key, value).unwrap();
            }
            assert_eq!(tree.save_version().unwrap().1, version as u64 + 1);
        }
    }

    let historical = CloneOptions {
        height: 2,
        ..Default::default()
    };
    assert_matches!(
        clone_tree(&src, Some(&values_path), &dest, &historical),
        Err(Error::VersionMismatch {
            requested: 2,
            loaded: 3
        })
    );

    let latest = CloneOptions {
        height: 3,
        ..Default::default()
    };
    let report = clone_tree(&src, Some(&values_path), &dest, &latest).unwrap();
    assert_eq!(report.version, 3);

    // the clone no longer needs the value store
    let cloned_store = RocksDbStorage::open(&dest, OpenMode::ReadOnly).unwrap();
    let mut cloned = MutableTree::new(NodeDb::new(&cloned_store));
    cloned.load().unwrap();
    let snapshot = cloned.last_saved().unwrap();
    assert_eq!(snapshot.get(b"gamma").unwrap(), Some(b"1".to_vec()));
    assert_eq!(snapshot.get(b"delta").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn extract_values_records_the_version() {
    let dir = TempDir::new().unwrap();
    let (src, dest) = (dir.path().join("app"), dir.path().join("values"));
    make_tree(&src, &history());

    let options = ExtractOptions {
        version: 2,
        batch_size: 2,
        ..Default::default()
    };
    let stats = extract_values(&src, &dest, &options).unwrap();
    assert_eq!(stats.matched, 4);

    let mut expected = vec![
        kv("alpha", "1"),
        kv("beta", "2"),
        kv(VALUE_DB_VERSION_KEY, encode_height_be(2)),
        kv("delta", "2"),
        kv("gamma", "1"),
    ];
    expected.sort();
    assert_eq!(read_store(&dest), expected);
}

#[test]
fn extract_values_of_the_latest_version_by_default() {
    let dir = TempDir::new().unwrap();
    let (src, dest) = (dir.path().join("app"), dir.path().join("values"));
    make_tree(&src, &history());

    let stats = extract_values(&src, &dest, &ExtractOptions::default()).unwrap();
    assert_eq!(stats.matched, 5);
    let entries = read_store(&dest);
    assert!(entries.contains(&kv(VALUE_DB_VERSION_KEY, encode_height_be(3))));
    assert!(entries.contains(&kv("alpha", "3")));
}

#[test]
fn extract_values_of_an_unknown_version_fails() {
    let dir = TempDir::new().unwrap();
    let (src, dest) = (dir.path().join("app"), dir.path().join("values"));
    make_tree(&src, &history());

    let options = ExtractOptions {
        version: 9,
        ..Default::default()
    };
    assert_matches!(
        extract_values(&src, &dest, &options),
        Err(Error::VersionLoadFailure { version: 9, .. })
    );
}

#[test]
fn evm_state_excludes_keys_without_separator() {
    let dir = TempDir::new().unwrap();
    let (src, dest) = (dir.path().join("app"), dir.path().join("evm"));
    let version = make_tree(
        &src,
        &[vec![
            kv("vm", "a"),
            kv(compose(&[b"vm", b"0"]), "b"),
            kv("vn", "c"),
        ]],
    );

    let stats = extract_evm_state(&src, &dest, &ExtractOptions::default()).unwrap();
    assert_eq!(stats.matched, 1);
    assert_eq!(stats.skipped, 1);

    let mut expected = vec![
        kv(compose(&[b"vm", b"0"]), "b"),
        kv(evm_root_key(version), DEFAULT_EVM_ROOT),
    ];
    expected.sort();
    assert_eq!(read_store(&dest), expected);
}

#[test]
fn empty_evm_state_still_records_a_root() {
    let dir = TempDir::new().unwrap();
    let (src, dest) = (dir.path().join("app"), dir.path().join("evm"));
    let version = make_tree(&src, &[vec![kv("app", "state")], vec![kv("other", "x")]]);

    let stats = extract_evm_state(&src, &dest, &ExtractOptions::default()).unwrap();
    assert_eq!(stats.matched, 0);
    assert_eq!(
        read_store(&dest),
        vec![kv(evm_root_key(version), DEFAULT_EVM_ROOT)]
    );
}

#[test]
fn evm_state_copies_the_patricia_root() {
    let dir = TempDir::new().unwrap();
    let (src, dest) = (dir.path().join("app"), dir.path().join("evm"));
    let vm_root = compose(&[b"vm", b"vmroot"]);
    make_tree(
        &src,
        &[
            vec![kv(vm_root.clone(), "root-1")],
            vec![kv(vm_root.clone(), "root-2"), kv(compose(&[b"vm", b"acct"]), "x")],
        ],
    );

    let options = ExtractOptions {
        version: 1,
        ..Default::default()
    };
    extract_evm_state(&src, &dest, &options).unwrap();
    let mut expected = vec![
        kv(vm_root, "root-1"),
        kv(evm_root_key(1), "root-1"),
    ];
    expected.sort();
    assert_eq!(read_store(&dest), expected);
}

#[test]
fn evm_aux_moves_families_to_big_endian_keys() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("app");
    make_tree(
        &src,
        &[vec![
            kv(compose(&[b"bloomFilter", &5u64.to_le_bytes()]), "bloom-5"),
            kv(compose(&[b"bloomFilter", &300u64.to_le_bytes()]), "bloom-300"),
            kv(compose(&[b"txHash", &7u64.to_le_bytes()]), "hashes-7"),
            kv(compose(&[b"txHash", b"short"]), "broken"),
            kv("unrelated", "x"),
        ]],
    );

    let both = dir.path().join("both");
    let stats =
        extract_evm_aux(&src, &both, &ExtractOptions::default(), EvmAuxOptions::default()).unwrap();
    assert_eq!(stats.matched, 3);
    assert_eq!(stats.skipped, 1);
    let mut expected = vec![
        kv(compose(&[b"bf", &5u64.to_be_bytes()]), "bloom-5"),
        kv(compose(&[b"bf", &300u64.to_be_bytes()]), "bloom-300"),
        kv(compose(&[b"th", &7u64.to_be_bytes()]), "hashes-7"),
    ];
    expected.sort();
    assert_eq!(read_store(&both), expected);

    let blooms = dir.path().join("blooms");
    let only_blooms = EvmAuxOptions {
        bloom_filter: true,
        tx_hash: false,
    };
    extract_evm_aux(&src, &blooms, &ExtractOptions::default(), only_blooms).unwrap();
    assert_eq!(read_store(&blooms).len(), 2);
}

#[test]
fn total_data_counts_a_prefix() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("app");
    make_tree(
        &src,
        &[
            vec![kv("vm\0a", "12"), kv("vm\0b", "345"), kv("vn", "6789")],
            vec![kv("vm\0c", "0")],
        ],
    );

    let vm = total_data(&src, b"vm", 0, 1).unwrap();
    assert_eq!(vm.num_keys, 3);
    assert_eq!(vm.total_key_bytes, 12);
    assert_eq!(vm.total_value_bytes, 6);
    assert_eq!(vm.total_bytes(), 18);

    let first = total_data(&src, b"vm", 1, 0).unwrap();
    assert_eq!(first.num_keys, 2);

    let all = total_data(&src, b"", 0, 0).unwrap();
    assert_eq!(all.num_keys, 4);
    assert_eq!(all.total_value_bytes, 10);
}

#[test]
fn write_failure_reports_entries_already_flushed() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("app");
    let keys: Vec<_> = (0..30u8).map(|i| kv([b'k', i], [i])).collect();
    make_tree(&src, &[keys]);

    let source = RocksDbStorage::open(&src, OpenMode::ReadOnly).unwrap();
    let mut tree = MutableTree::new(NodeDb::new(&source));
    tree.load().unwrap();
    let snapshot = tree.last_saved().unwrap();

    let flaky = FlakyStorage::new(2);
    let mut writer = BatchedWriter::new(&flaky, 5);
    let result = RangeExtractor::whole().run(
        &snapshot,
        &mut writer,
        &mut ProgressEstimator::silent(),
        |k, v| Ok(Transformed::pass(k, v)),
    );
    assert_matches!(result, Err(Error::WriteFailure { written: 12, .. }));
    // earlier flushes stay on disk
    assert_eq!(read_all(&flaky).len(), 12);
}
