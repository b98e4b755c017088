use sectorkv::export::{Snapshot, SnapshotEntry, SNAPSHOT_VERSION};
use sectorkv::{Blob, Config, KvError, ValueType};
use tempfile::TempDir;

use crate::{ready, rw, setup, PART};

// =============================================================================
// Helper Functions
// =============================================================================

fn populated() -> (std::sync::Arc<sectorkv::MemoryFlash>, sectorkv::KvStore) {
    let (device, store) = ready();
    let a = rw(&store, "alpha");
    let b = rw(&store, "beta");
    store.set(a, "n", &17u32).unwrap();
    store.set(a, "s", &"hello".to_string()).unwrap();
    store.set(b, "img", &Blob((0..6000).map(|i| i as u8).collect())).unwrap();
    store.set(b, "gone", &1u8).unwrap();
    store.del_key(b, "gone").unwrap();
    (device, store)
}

// =============================================================================
// Export Tests
// =============================================================================

#[test]
fn test_export_lists_live_values_by_group() {
    let (_device, store) = populated();

    let snapshot = store.export(PART).unwrap();

    assert_eq!(snapshot.version, SNAPSHOT_VERSION);
    let keys: Vec<(&str, &str, ValueType)> = snapshot
        .entries
        .iter()
        .map(|e| (e.group.as_str(), e.key.as_str(), e.value_type))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("alpha", "n", ValueType::U32),
            ("alpha", "s", ValueType::String),
            ("beta", "img", ValueType::Blob),
        ]
    );
    assert_eq!(snapshot.entries[2].data.len(), 6000);
}

#[test]
fn test_import_into_empty_partition() {
    let (_device, source) = populated();
    let snapshot = source.export(PART).unwrap();

    let (_device, target) = setup(4, Config::default());
    target.init(PART).unwrap();
    let imported = target.import(PART, &snapshot).unwrap();

    assert_eq!(imported, 3);
    assert_eq!(target.export(PART).unwrap(), snapshot);
    let b = rw(&target, "beta");
    let img: Blob = target.get(b, "img").unwrap();
    assert_eq!(img.0.len(), 6000);
}

#[test]
fn test_reimport_writes_nothing() {
    let (device, store) = populated();
    let snapshot = store.export(PART).unwrap();
    let before = device.snapshot();

    store.import(PART, &snapshot).unwrap();

    assert_eq!(device.snapshot(), before);
}

#[test]
fn test_import_rejects_bad_entry() {
    let (_device, store) = ready();
    let mut snapshot = Snapshot::new();
    snapshot.push(SnapshotEntry {
        group: "ok".into(),
        key: "far-too-long-key-name".into(),
        value_type: ValueType::U8,
        data: vec![1],
    });

    assert!(matches!(
        store.import(PART, &snapshot),
        Err(KvError::InvalidParam(_))
    ));
}

#[test]
fn test_export_requires_init() {
    let (_device, store) = setup(4, Config::default());

    assert!(matches!(store.export(PART), Err(KvError::NotInitialized)));
}

// =============================================================================
// Snapshot File Tests
// =============================================================================

#[test]
fn test_snapshot_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("backup.bin");
    let (_device, store) = populated();
    let snapshot = store.export(PART).unwrap();

    snapshot.write_to(&path).unwrap();
    let loaded = Snapshot::read_from(&path).unwrap();

    assert_eq!(loaded, snapshot);
}

#[test]
fn test_snapshot_version_checked() {
    let mut snapshot = Snapshot::new();
    snapshot.version = SNAPSHOT_VERSION + 1;
    let bytes = snapshot.to_bytes().unwrap();

    assert!(matches!(Snapshot::from_bytes(&bytes), Err(KvError::Snapshot(_))));
}

#[test]
fn test_snapshot_garbage_rejected() {
    assert!(matches!(
        Snapshot::from_bytes(&[0xFF; 3]),
        Err(KvError::Snapshot(_))
    ));
}

#[test]
fn test_missing_snapshot_file() {
    let dir = TempDir::new().unwrap();

    assert!(matches!(
        Snapshot::read_from(dir.path().join("absent.bin")),
        Err(KvError::Io(_))
    ));
}
