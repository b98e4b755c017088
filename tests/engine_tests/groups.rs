use sectorkv::item::{ValueType, MAX_GROUP_ID};
use sectorkv::{Engine, KvError};

use crate::{count_of, group, name, partition, reopen, setup};

// =============================================================================
// Group Table Tests
// =============================================================================

#[test]
fn test_ids_assigned_lowest_first() {
    let (_device, mut engine) = setup(4);

    assert_eq!(group(&mut engine, "a"), 1);
    assert_eq!(group(&mut engine, "b"), 2);
    assert_eq!(group(&mut engine, "c"), 3);
    assert_eq!(group(&mut engine, "b"), 2);

    engine.remove_group(2).unwrap();
    assert_eq!(group(&mut engine, "d"), 2);
    assert_eq!(engine.groups().len(), 3);
}

#[test]
fn test_open_missing_group_without_create() {
    let (_device, mut engine) = setup(4);

    let result = engine.open_group(&name("nope"), false);

    assert!(matches!(result, Err(KvError::NotFound)));
    assert!(engine.groups().is_empty());
}

#[test]
fn test_groups_persist_across_reopen() {
    let (device, mut engine) = setup(4);
    let a = group(&mut engine, "alpha");
    let b = group(&mut engine, "beta");
    engine.remove_group(a).unwrap();
    engine.close();

    let engine = reopen(&device, 4);

    assert_eq!(engine.group_id(&name("alpha")), None);
    assert_eq!(engine.group_id(&name("beta")), Some(b));
    assert_eq!(engine.group_name(b), Some(&name("beta")));
}

#[test]
fn test_group_table_full() {
    let (_device, mut engine) = setup(4);
    for i in 0..MAX_GROUP_ID {
        group(&mut engine, &format!("g{}", i));
    }

    let result = engine.open_group(&name("overflow"), true);

    assert!(matches!(result, Err(KvError::NoSpace)));
    assert_eq!(engine.groups().lowest_free(), None);
}

#[test]
fn test_remove_unknown_group() {
    let (_device, mut engine) = setup(4);

    assert!(matches!(engine.remove_group(9), Err(KvError::NotFound)));
}

#[test]
fn test_read_only_cannot_create_group() {
    let (device, mut engine) = setup(4);
    group(&mut engine, "exists");
    engine.close();

    let mut ro = Engine::open(partition(&device, 4, true)).unwrap();

    assert_eq!(ro.open_group(&name("exists"), true).unwrap(), 1);
    assert!(matches!(ro.open_group(&name("new"), true), Err(KvError::ReadOnly)));
}

// =============================================================================
// Namespace Tests
// =============================================================================

#[test]
fn test_same_key_in_two_groups() {
    let (_device, mut engine) = setup(4);
    let a = group(&mut engine, "a");
    let b = group(&mut engine, "b");

    engine.write_item(a, ValueType::U8, &name("k"), &[1]).unwrap();
    engine.write_item(b, ValueType::U8, &name("k"), &[2]).unwrap();

    assert_eq!(engine.read_value(a, ValueType::U8, &name("k")).unwrap().1, vec![1]);
    assert_eq!(engine.read_value(b, ValueType::U8, &name("k")).unwrap().1, vec![2]);
}

#[test]
fn test_group_name_does_not_collide_with_key() {
    let (_device, mut engine) = setup(4);
    let g = group(&mut engine, "k");

    engine.write_item(g, ValueType::U8, &name("k"), &[42]).unwrap();

    assert_eq!(engine.group_id(&name("k")), Some(g));
    assert_eq!(engine.read_value(g, ValueType::U8, &name("k")).unwrap().1, vec![42]);
}

#[test]
fn test_del_group_clears_records_and_blobs() {
    let (_device, mut engine) = setup(4);
    let a = group(&mut engine, "a");
    let b = group(&mut engine, "b");
    engine.write_item(a, ValueType::U8, &name("x"), &[1]).unwrap();
    engine.write_item(a, ValueType::Blob, &name("img"), &vec![9; 5000]).unwrap();
    engine.write_item(b, ValueType::U8, &name("x"), &[2]).unwrap();

    engine.del_group(a).unwrap();

    assert!(engine.find_key(a, &name("x")).is_err());
    assert!(engine.find_key(a, &name("img")).is_err());
    assert_eq!(count_of(&mut engine, ValueType::BlobSegment), 0);
    assert_eq!(engine.read_value(b, ValueType::U8, &name("x")).unwrap().1, vec![2]);
    assert_eq!(engine.group_id(&name("a")), Some(a));
}
