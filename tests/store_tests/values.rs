use sectorkv::{Binary, Blob, KvError, OpenMode, TypeFilter, ValueType};

use crate::{ready, rw, PART};

// =============================================================================
// Typed Value Tests
// =============================================================================

#[test]
fn test_typed_round_trips() {
    let (_device, store) = ready();
    let h = rw(&store, "ns");

    store.set(h, "i8", &-8i8).unwrap();
    store.set(h, "u16", &65535u16).unwrap();
    store.set(h, "i32", &i32::MIN).unwrap();
    store.set(h, "u64", &(1u64 << 63)).unwrap();
    store.set(h, "pi", &3.25f64).unwrap();
    store.set(h, "name", &"flash".to_string()).unwrap();
    store.set(h, "raw", &Binary(vec![1, 2, 3])).unwrap();
    store.set(h, "big", &Blob(vec![0x5A; 9000])).unwrap();

    assert_eq!(store.get::<i8>(h, "i8").unwrap(), -8);
    assert_eq!(store.get::<u16>(h, "u16").unwrap(), 65535);
    assert_eq!(store.get::<i32>(h, "i32").unwrap(), i32::MIN);
    assert_eq!(store.get::<u64>(h, "u64").unwrap(), 1u64 << 63);
    assert_eq!(store.get::<f64>(h, "pi").unwrap(), 3.25);
    assert_eq!(store.get::<String>(h, "name").unwrap(), "flash");
    assert_eq!(store.get::<Binary>(h, "raw").unwrap(), Binary(vec![1, 2, 3]));
    assert_eq!(store.get::<Blob>(h, "big").unwrap(), Blob(vec![0x5A; 9000]));
}

#[test]
fn test_get_with_other_type_is_not_found() {
    let (_device, store) = ready();
    let h = rw(&store, "ns");
    store.set(h, "k", &1u32).unwrap();

    assert!(matches!(store.get::<i32>(h, "k"), Err(KvError::NotFound)));
    assert!(matches!(store.get::<u32>(h, "missing"), Err(KvError::NotFound)));
}

#[test]
fn test_raw_access_and_info() {
    let (_device, store) = ready();
    let h = rw(&store, "ns");
    store.set_raw(h, "k", ValueType::I16, &(-2i16).to_le_bytes()).unwrap();

    let (ty, bytes) = store.get_raw(h, "k").unwrap();
    let info = store.get_info(h, "k").unwrap();

    assert_eq!(ty, ValueType::I16);
    assert_eq!(bytes, (-2i16).to_le_bytes().to_vec());
    assert_eq!(info.value_type, ValueType::I16);
    assert_eq!(info.size, 2);
}

#[test]
fn test_get_into_reports_required_size() {
    let (_device, store) = ready();
    let h = rw(&store, "ns");
    store.set(h, "s", &"twelve chars".to_string()).unwrap();

    let mut small = [0u8; 4];
    let err = store.get_into(h, "s", &mut small).unwrap_err();
    assert!(matches!(err, KvError::BufferTooSmall { required: 13 }));

    let mut buf = [0u8; 13];
    assert_eq!(store.get_into(h, "s", &mut buf).unwrap(), 13);
    assert_eq!(&buf[..12], b"twelve chars");
}

#[test]
fn test_invalid_key() {
    let (_device, store) = ready();
    let h = rw(&store, "ns");

    assert!(matches!(
        store.set(h, "sixteen-chars-xx", &1u8),
        Err(KvError::InvalidParam(_))
    ));
    assert!(matches!(store.get::<u8>(h, "a\0b"), Err(KvError::InvalidParam(_))));
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_del_key() {
    let (_device, store) = ready();
    let h = rw(&store, "ns");
    store.set(h, "k", &Blob(vec![1; 2000])).unwrap();

    store.del_key(h, "k").unwrap();

    assert!(matches!(store.get_info(h, "k"), Err(KvError::NotFound)));
    assert!(matches!(store.del_key(h, "k"), Err(KvError::NotFound)));
}

#[test]
fn test_del_group_keeps_group() {
    let (_device, store) = ready();
    let h = rw(&store, "ns");
    store.set(h, "a", &1u8).unwrap();
    store.set(h, "b", &2u8).unwrap();

    store.del_group(h).unwrap();

    let mut iter = store.entry_find_by_handle(h, TypeFilter::Any).unwrap();
    assert!(iter.next().unwrap().is_none());
    store.set(h, "c", &3u8).unwrap();
    assert_eq!(store.get::<u8>(h, "c").unwrap(), 3);
}

#[test]
fn test_remove_group_requires_no_handles() {
    let (_device, store) = ready();
    let h = rw(&store, "ns");
    store.set(h, "a", &1u8).unwrap();

    assert!(matches!(store.remove_group(PART, "ns"), Err(KvError::Busy)));

    store.close(h).unwrap();
    store.remove_group(PART, "ns").unwrap();

    assert!(matches!(store.remove_group(PART, "ns"), Err(KvError::NotFound)));
    assert!(matches!(
        store.open(PART, "ns", OpenMode::ReadOnly),
        Err(KvError::NotFound)
    ));
    let h = rw(&store, "ns");
    assert!(matches!(store.get::<u8>(h, "a"), Err(KvError::NotFound)));
}

// =============================================================================
// Engine Access Tests
// =============================================================================

#[test]
fn test_with_engine_and_print() {
    let (_device, store) = ready();
    let h = rw(&store, "ns");
    store.set(h, "a", &1u8).unwrap();
    store.set(h, "b", &"two".to_string()).unwrap();

    let groups = store.with_engine(PART, |e| Ok(e.groups().len())).unwrap();
    let printed = store.print(PART, "ns").unwrap();

    assert_eq!(groups, 1);
    assert_eq!(printed, 2);
}
