use sectorkv::item::ValueType;
use sectorkv::KvError;

use crate::{count_of, data_offset, group, live_records, name, reopen, setup};

// =============================================================================
// Helper Functions
// =============================================================================

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_small_blob_single_segment() {
    let (_device, mut engine) = setup(4);
    let g = group(&mut engine, "g");
    let data = pattern(100, 1);

    engine.write_item(g, ValueType::Blob, &name("img"), &data).unwrap();

    assert_eq!(count_of(&mut engine, ValueType::BlobSegment), 1);
    let info = engine.find_key(g, &name("img")).unwrap();
    assert_eq!(info.value_type, ValueType::Blob);
    assert_eq!(info.size, 100);
    assert_eq!(engine.read_value(g, ValueType::Blob, &name("img")).unwrap().1, data);
}

#[test]
fn test_tiny_and_empty_blobs() {
    let (_device, mut engine) = setup(4);
    let g = group(&mut engine, "g");

    engine.write_item(g, ValueType::Blob, &name("tiny"), &[1, 2, 3]).unwrap();
    engine.write_item(g, ValueType::Blob, &name("empty"), &[]).unwrap();

    assert_eq!(
        engine.read_value(g, ValueType::Blob, &name("tiny")).unwrap().1,
        vec![1, 2, 3]
    );
    let (ty, empty) = engine.read_value(g, ValueType::Any, &name("empty")).unwrap();
    assert_eq!(ty, ValueType::Blob);
    assert!(empty.is_empty());
}

#[test]
fn test_blob_spans_sectors() {
    let (device, mut engine) = setup(4);
    let g = group(&mut engine, "g");
    let data = pattern(5000, 7);

    engine.write_item(g, ValueType::Blob, &name("img"), &data).unwrap();

    assert_eq!(engine.sector_manager().active().len(), 2);
    assert_eq!(count_of(&mut engine, ValueType::BlobSegment), 2);
    engine.close();

    let mut engine = reopen(&device, 4);
    assert_eq!(engine.read_value(g, ValueType::Blob, &name("img")).unwrap().1, data);
}

#[test]
fn test_blob_into_exact_buffer() {
    let (_device, mut engine) = setup(4);
    let g = group(&mut engine, "g");
    let data = pattern(512, 3);
    engine.write_item(g, ValueType::Blob, &name("img"), &data).unwrap();

    let mut short = vec![0u8; 511];
    assert!(matches!(
        engine.read_item(g, ValueType::Blob, &name("img"), &mut short),
        Err(KvError::BufferTooSmall { required: 512 })
    ));

    let mut buf = vec![0u8; 600];
    let n = engine.read_item(g, ValueType::Blob, &name("img"), &mut buf).unwrap();
    assert_eq!(n, 512);
    assert_eq!(&buf[..n], &data[..]);
}

#[test]
fn test_blob_larger_than_partition() {
    let (_device, mut engine) = setup(4);
    let g = group(&mut engine, "g");

    let result = engine.write_item(g, ValueType::Blob, &name("img"), &vec![0; 3 * 4032 + 1]);

    assert!(matches!(result, Err(KvError::NoSpace)));
    assert_eq!(count_of(&mut engine, ValueType::BlobSegment), 0);
}

// =============================================================================
// Replace Tests
// =============================================================================

#[test]
fn test_replacing_blob_drops_old_generation() {
    let (_device, mut engine) = setup(4);
    let g = group(&mut engine, "g");
    engine.write_item(g, ValueType::Blob, &name("img"), &pattern(5000, 1)).unwrap();

    let next = pattern(5000, 2);
    engine.write_item(g, ValueType::Blob, &name("img"), &next).unwrap();

    assert_eq!(engine.read_value(g, ValueType::Blob, &name("img")).unwrap().1, next);
    assert_eq!(count_of(&mut engine, ValueType::Blob), 1);
    let segments: Vec<u8> = live_records(&mut engine)
        .iter()
        .filter(|r| r.header.value_type == ValueType::BlobSegment)
        .map(|r| r.header.seg_id)
        .collect();
    assert_eq!(segments, vec![0x80, 0x81]);
}

#[test]
fn test_identical_blob_touches_nothing() {
    let (device, mut engine) = setup(4);
    let g = group(&mut engine, "g");
    let data = pattern(3000, 5);
    engine.write_item(g, ValueType::Blob, &name("img"), &data).unwrap();
    let before = device.snapshot();

    engine.write_item(g, ValueType::Blob, &name("img"), &data).unwrap();

    assert_eq!(device.snapshot(), before);
}

#[test]
fn test_binary_replaces_blob() {
    let (_device, mut engine) = setup(4);
    let g = group(&mut engine, "g");
    engine.write_item(g, ValueType::Blob, &name("k"), &pattern(2000, 1)).unwrap();

    engine.write_item(g, ValueType::Binary, &name("k"), &[4; 10]).unwrap();

    assert_eq!(engine.find_key(g, &name("k")).unwrap().value_type, ValueType::Binary);
    assert_eq!(count_of(&mut engine, ValueType::BlobSegment), 0);
    assert_eq!(count_of(&mut engine, ValueType::Blob), 0);
}

// =============================================================================
// Delete and Damage Tests
// =============================================================================

#[test]
fn test_delete_blob_drops_segments() {
    let (_device, mut engine) = setup(4);
    let g = group(&mut engine, "g");
    engine.write_item(g, ValueType::Blob, &name("img"), &pattern(5000, 1)).unwrap();

    engine.del_item(g, ValueType::Blob, &name("img")).unwrap();

    assert_eq!(count_of(&mut engine, ValueType::Blob), 0);
    assert_eq!(count_of(&mut engine, ValueType::BlobSegment), 0);
}

#[test]
fn test_corrupt_only_segment_reads_as_missing() {
    let (device, mut engine) = setup(4);
    let g = group(&mut engine, "g");
    engine.write_item(g, ValueType::Blob, &name("img"), &pattern(100, 1)).unwrap();
    let seg = live_records(&mut engine)
        .into_iter()
        .find(|r| r.header.value_type == ValueType::BlobSegment)
        .unwrap();
    device.corrupt(data_offset(&seg), &[0x00, 0x00]);

    let result = engine.read_value(g, ValueType::Blob, &name("img"));

    assert!(matches!(result, Err(KvError::NotFound)));
    assert!(engine.find_key(g, &name("img")).is_err());
    assert_eq!(count_of(&mut engine, ValueType::BlobSegment), 0);
}

#[test]
fn test_corrupt_later_segment_is_invalid_length() {
    let (device, mut engine) = setup(4);
    let g = group(&mut engine, "g");
    engine.write_item(g, ValueType::Blob, &name("img"), &pattern(5000, 1)).unwrap();
    let second = live_records(&mut engine)
        .into_iter()
        .find(|r| r.header.value_type == ValueType::BlobSegment && r.header.seg_id == 1)
        .unwrap();
    device.corrupt(data_offset(&second) + 10, &[0x00, 0x00]);

    let result = engine.read_value(g, ValueType::Blob, &name("img"));

    assert!(matches!(result, Err(KvError::InvalidLength)));
    assert!(engine.find_key(g, &name("img")).unwrap_err().is_not_found());
}
