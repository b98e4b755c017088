//! Tests for the sector manager
//!
//! These tests verify:
//! - Load ordering of active sectors by serial number
//! - Sector allocation and the GC reserve
//! - Garbage collection victim choice and data preservation
//! - Blob space feasibility checks
//! - Space status accounting


use std::sync::Arc;

use sectorkv::config::Geometry;
use sectorkv::flash::{FlashDevice, MemoryFlash, Partition};
use sectorkv::item::{ItemHeader, ItemName, ValueType, SEG_ID_NONE};
use sectorkv::sector::ItemQuery;
use sectorkv::storage::{Location, SectorManager};

// =============================================================================
// Helper Functions
// =============================================================================

pub const SECTOR: usize = 4096;

pub fn setup(sectors: usize) -> (Arc<MemoryFlash>, Partition) {
    let device = Arc::new(MemoryFlash::new(SECTOR * sectors));
    let part = partition(&device, sectors, false);
    (device, part)
}

pub fn partition(device: &Arc<MemoryFlash>, sectors: usize, read_only: bool) -> Partition {
    let dev: Arc<dyn FlashDevice> = Arc::clone(device) as Arc<dyn FlashDevice>;
    Partition::new(
        "storage",
        dev,
        0,
        (SECTOR * sectors) as u64,
        Geometry::default(),
        read_only,
    )
    .unwrap()
}

pub fn name(s: &str) -> ItemName {
    ItemName::new(s).unwrap()
}

pub fn record(key: &str, data: &[u8]) -> ItemHeader {
    ItemHeader::for_value(name(key), 1, ValueType::Binary, SEG_ID_NONE, data)
}

/// Append to the current sector.
pub fn append(sm: &mut SectorManager, key: &str, data: &[u8]) -> Location {
    let current = sm.current().unwrap();
    sm.write_item(current, &record(key, data), data).unwrap()
}

pub fn read_back(sm: &mut SectorManager, key: &str) -> Option<Vec<u8>> {
    let key = name(key);
    let found = sm
        .find_item(&ItemQuery::key(1, &key))
        .unwrap()?;
    let mut buf = vec![0u8; found.header.length];
    match found.header.inline_data() {
        Some(inline) => buf.copy_from_slice(inline),
        None => sm.read_data(found.location, &mut buf).unwrap(),
    }
    Some(buf)
}

/// Spans of the live records in each active sector, plus its dropped
/// slots, reach exactly its append position.
pub fn assert_live_spans(sm: &mut SectorManager) {
    for idx in sm.active().to_vec() {
        let mut live = 0;
        let mut from = 0;
        while let Some(found) = sm.find_in_sector(idx, &ItemQuery::all(), from).unwrap() {
            live += found.header.span();
            from = found.location.slot + found.header.span();
        }
        let sector = sm.sector(idx);
        assert_eq!(live, sector.live_slice(), "sector {}", idx);
        assert_eq!(live + sector.dropped_slice(), sector.next_free_slice(), "sector {}", idx);
    }
}
