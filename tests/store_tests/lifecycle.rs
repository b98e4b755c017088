use std::sync::Arc;

use sectorkv::{
    Config, FileFlash, FlashDevice, KvError, KvStore, OpenMode, PartitionInfo, PartitionTable,
};
use tempfile::TempDir;

use crate::{ready, rw, setup, PART, SECTOR};

// =============================================================================
// Init / Deinit Tests
// =============================================================================

#[test]
fn test_init_twice() {
    let (_device, store) = ready();

    assert!(matches!(store.init(PART), Err(KvError::AlreadyInitialized)));
    assert!(store.is_initialized(PART));
}

#[test]
fn test_operations_before_init() {
    let (_device, store) = setup(4, Config::default());

    assert!(!store.is_initialized(PART));
    assert!(matches!(
        store.open(PART, "ns", OpenMode::ReadWrite),
        Err(KvError::NotInitialized)
    ));
    assert!(matches!(store.status(PART), Err(KvError::NotInitialized)));
    assert!(matches!(store.deinit(PART), Err(KvError::NotInitialized)));
}

#[test]
fn test_unknown_partition() {
    let (_device, store) = setup(4, Config::default());

    assert!(matches!(store.init("missing"), Err(KvError::NotFound)));
    assert!(matches!(store.erase("missing"), Err(KvError::NotFound)));
}

#[test]
fn test_invalid_config_rejected() {
    let config = Config::builder().sector_size(3000).build();

    assert!(KvStore::new(config, PartitionTable::new()).is_err());
}

#[test]
fn test_deinit_then_init_keeps_data() {
    let (_device, store) = ready();
    let h = rw(&store, "ns");
    store.set(h, "k", &42u32).unwrap();

    store.deinit(PART).unwrap();
    store.init(PART).unwrap();

    let h = rw(&store, "ns");
    assert_eq!(store.get::<u32>(h, "k").unwrap(), 42);
}

// =============================================================================
// Erase Tests
// =============================================================================

#[test]
fn test_erase_while_initialized_is_busy() {
    let (_device, store) = ready();

    assert!(matches!(store.erase(PART), Err(KvError::Busy)));
}

#[test]
fn test_erase_wipes_partition() {
    let (device, store) = ready();
    let h = rw(&store, "ns");
    store.set(h, "k", &1u8).unwrap();
    store.deinit(PART).unwrap();

    store.erase(PART).unwrap();

    assert!(device.snapshot().iter().all(|&b| b == 0xFF));
    store.init(PART).unwrap();
    assert!(matches!(
        store.open(PART, "ns", OpenMode::ReadOnly),
        Err(KvError::NotFound)
    ));
}

// =============================================================================
// Status Tests
// =============================================================================

#[test]
fn test_status_counts_groups_and_handles() {
    let (_device, store) = ready();
    let a = rw(&store, "a");
    let _b = rw(&store, "b");
    let _a2 = rw(&store, "a");
    store.set(a, "k", &"x".repeat(39)).unwrap();

    let status = store.status(PART).unwrap();

    assert_eq!(status.group_count, 2);
    assert_eq!(status.handle_count, 3);
    assert_eq!(status.space.total, 4 * SECTOR);
    assert_eq!(status.space.used, 32 + 2 * 32 + 3 * 32);
    assert_eq!(status.space.free, status.space.total - status.space.used);
}

// =============================================================================
// File Image Tests
// =============================================================================

#[test]
fn test_file_image_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kv.img");
    let size = (SECTOR * 4) as u64;

    let open_store = || {
        let flash: Arc<dyn FlashDevice> = Arc::new(FileFlash::open(&path, size).unwrap());
        let table = PartitionTable::new().with(PART, PartitionInfo::whole(flash));
        let store = KvStore::new(Config::default(), table).unwrap();
        store.init(PART).unwrap();
        store
    };

    {
        let store = open_store();
        let h = rw(&store, "cfg");
        store.set(h, "name", &"sectorkv".to_string()).unwrap();
        store.set(h, "boots", &7u16).unwrap();
        store.deinit(PART).unwrap();
    }

    let store = open_store();
    let h = store.open(PART, "cfg", OpenMode::ReadOnly).unwrap();
    assert_eq!(store.get::<String>(h, "name").unwrap(), "sectorkv");
    assert_eq!(store.get::<u16>(h, "boots").unwrap(), 7);
}

#[test]
fn test_read_only_partition() {
    let (device, store) = ready();
    let h = rw(&store, "ns");
    store.set(h, "k", &1u8).unwrap();
    store.deinit(PART).unwrap();

    let dev: Arc<dyn FlashDevice> = device;
    let table = PartitionTable::new().with(PART, PartitionInfo::whole(dev).read_only(true));
    let ro = KvStore::new(Config::default(), table).unwrap();
    ro.init(PART).unwrap();

    assert!(matches!(
        ro.open(PART, "ns", OpenMode::ReadWrite),
        Err(KvError::ReadOnly)
    ));
    let h = ro.open(PART, "ns", OpenMode::ReadOnly).unwrap();
    assert_eq!(ro.get::<u8>(h, "k").unwrap(), 1);
}
