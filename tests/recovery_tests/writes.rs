use sectorkv::item::ValueType;
use sectorkv::{Checkpoint, KvError};

use crate::{
    assert_power_loss, device, live_count, name, open, open_with_power_loss, reopen_settled,
};

// =============================================================================
// Helper Functions
// =============================================================================

const SECTORS: usize = 4;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(13).wrapping_add(seed)).collect()
}

/// Device holding group "g" (id 1) with `key` set to `old`.
fn seeded(key: &str, ty: ValueType, old: &[u8]) -> std::sync::Arc<sectorkv::MemoryFlash> {
    let dev = device(SECTORS);
    let mut engine = open(&dev, SECTORS);
    let g = engine.open_group(&name("g"), true).unwrap();
    engine.write_item(g, ty, &name(key), old).unwrap();
    engine.close();
    dev
}

// =============================================================================
// Single Record Tests
// =============================================================================

#[test]
fn test_torn_data_keeps_old_value() {
    let dev = seeded("k", ValueType::Binary, &[1; 40]);
    let mut engine = open_with_power_loss(&dev, SECTORS, Checkpoint::BeforeWriteData);
    assert_power_loss(
        engine.write_item(1, ValueType::Binary, &name("k"), &[2; 40]),
        Checkpoint::BeforeWriteData,
    );
    drop(engine);

    let mut engine = reopen_settled(&dev, SECTORS);

    assert_eq!(
        engine.read_value(1, ValueType::Binary, &name("k")).unwrap().1,
        vec![1; 40]
    );
    assert_eq!(live_count(&mut engine, "k", ValueType::Binary), 1);
}

#[test]
fn test_unerased_old_copy_dropped_at_open() {
    let dev = seeded("k", ValueType::Binary, &[1; 40]);
    let mut engine = open_with_power_loss(&dev, SECTORS, Checkpoint::BeforeEraseOld);
    assert_power_loss(
        engine.write_item(1, ValueType::Binary, &name("k"), &[2; 40]),
        Checkpoint::BeforeEraseOld,
    );
    assert_eq!(live_count(&mut engine, "k", ValueType::Binary), 2);
    drop(engine);

    let mut engine = reopen_settled(&dev, SECTORS);

    assert_eq!(
        engine.read_value(1, ValueType::Binary, &name("k")).unwrap().1,
        vec![2; 40]
    );
    assert_eq!(live_count(&mut engine, "k", ValueType::Binary), 1);
}

#[test]
fn test_unerased_inline_copy_dropped_at_open() {
    let dev = seeded("n", ValueType::U32, &7u32.to_le_bytes());
    let mut engine = open_with_power_loss(&dev, SECTORS, Checkpoint::BeforeEraseOld);
    assert_power_loss(
        engine.write_item(1, ValueType::U32, &name("n"), &8u32.to_le_bytes()),
        Checkpoint::BeforeEraseOld,
    );
    drop(engine);

    let mut engine = reopen_settled(&dev, SECTORS);

    assert_eq!(
        engine.read_value(1, ValueType::U32, &name("n")).unwrap().1,
        8u32.to_le_bytes().to_vec()
    );
    assert_eq!(live_count(&mut engine, "n", ValueType::U32), 1);
}

// =============================================================================
// New Blob Tests
// =============================================================================

#[test]
fn test_blob_without_descriptor_is_gone() {
    let dev = device(SECTORS);
    let mut engine = open(&dev, SECTORS);
    let g = engine.open_group(&name("g"), true).unwrap();
    engine.close();

    let mut engine =
        open_with_power_loss(&dev, SECTORS, Checkpoint::AfterWriteAllSegments);
    assert_power_loss(
        engine.write_item(g, ValueType::Blob, &name("img"), &pattern(5000, 1)),
        Checkpoint::AfterWriteAllSegments,
    );
    assert_eq!(live_count(&mut engine, "img", ValueType::BlobSegment), 2);
    drop(engine);

    let mut engine = reopen_settled(&dev, SECTORS);

    assert!(matches!(
        engine.read_value(g, ValueType::Blob, &name("img")),
        Err(KvError::NotFound)
    ));
    assert_eq!(live_count(&mut engine, "img", ValueType::BlobSegment), 0);
}

#[test]
fn test_blob_cut_between_segments_is_gone() {
    let dev = device(SECTORS);
    let mut engine = open(&dev, SECTORS);
    let g = engine.open_group(&name("g"), true).unwrap();
    engine.close();

    let mut engine = open_with_power_loss(&dev, SECTORS, Checkpoint::AfterWriteSegment);
    assert_power_loss(
        engine.write_item(g, ValueType::Blob, &name("img"), &pattern(5000, 1)),
        Checkpoint::AfterWriteSegment,
    );
    drop(engine);

    let mut engine = reopen_settled(&dev, SECTORS);

    assert!(engine.find_key(g, &name("img")).unwrap_err().is_not_found());
    assert_eq!(live_count(&mut engine, "img", ValueType::BlobSegment), 0);
}

// =============================================================================
// Blob Replace Tests
// =============================================================================

fn replace_blob_cut_at(cp: Checkpoint) {
    let old = pattern(5000, 1);
    let new = pattern(5000, 2);
    let dev = seeded("img", ValueType::Blob, &old);

    let mut engine = open_with_power_loss(&dev, SECTORS, cp);
    assert_power_loss(engine.write_item(1, ValueType::Blob, &name("img"), &new), cp);
    drop(engine);

    let mut engine = reopen_settled(&dev, SECTORS);

    let (_, data) = engine.read_value(1, ValueType::Blob, &name("img")).unwrap();
    assert!(data == old || data == new, "blob is neither old nor new after {:?}", cp);
    assert_eq!(live_count(&mut engine, "img", ValueType::Blob), 1);
    assert_eq!(live_count(&mut engine, "img", ValueType::BlobSegment), 2);
}

#[test]
fn test_blob_replace_cut_after_segment() {
    replace_blob_cut_at(Checkpoint::AfterWriteSegment);
}

#[test]
fn test_blob_replace_cut_before_descriptor() {
    replace_blob_cut_at(Checkpoint::AfterWriteAllSegments);
}

#[test]
fn test_blob_replace_cut_after_new_descriptor() {
    replace_blob_cut_at(Checkpoint::AfterWriteNewBlob);
}

#[test]
fn test_blob_replace_cut_after_old_descriptor_dropped() {
    replace_blob_cut_at(Checkpoint::AfterEraseOldDescriptor);
}

#[test]
fn test_blob_replace_cut_mid_segment_write() {
    replace_blob_cut_at(Checkpoint::BeforeWriteData);
}

#[test]
fn test_committed_blob_replace_keeps_new_value() {
    let new = pattern(5000, 2);
    let dev = seeded("img", ValueType::Blob, &pattern(5000, 1));

    let mut engine = open_with_power_loss(&dev, SECTORS, Checkpoint::AfterWriteNewBlob);
    assert_power_loss(
        engine.write_item(1, ValueType::Blob, &name("img"), &new),
        Checkpoint::AfterWriteNewBlob,
    );
    drop(engine);

    let mut engine = reopen_settled(&dev, SECTORS);
    assert_eq!(engine.read_value(1, ValueType::Blob, &name("img")).unwrap().1, new);
}

// =============================================================================
// Sweep
// =============================================================================

#[test]
fn test_every_write_checkpoint_leaves_old_or_new() {
    let write_points = [
        Checkpoint::BeforeWriteData,
        Checkpoint::BeforeEraseOld,
        Checkpoint::AfterWriteSegment,
        Checkpoint::AfterWriteAllSegments,
        Checkpoint::AfterWriteNewBlob,
        Checkpoint::AfterEraseOldDescriptor,
    ];
    let old = vec![1u8; 300];
    let new = vec![2u8; 300];

    for cp in write_points {
        let dev = seeded("k", ValueType::Binary, &old);
        let mut engine = open_with_power_loss(&dev, SECTORS, cp);
        let result = engine.write_item(1, ValueType::Binary, &name("k"), &new);
        if let Err(e) = result {
            assert!(matches!(e, KvError::PowerLoss(hit) if hit == cp), "{:?}", e);
        }
        drop(engine);

        let mut engine = reopen_settled(&dev, SECTORS);
        let (_, data) = engine.read_value(1, ValueType::Binary, &name("k")).unwrap();
        assert!(data == old || data == new, "value lost after {:?}", cp);
        assert_eq!(live_count(&mut engine, "k", ValueType::Binary), 1, "{:?}", cp);
    }
}
