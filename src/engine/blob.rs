//! Blob segmentation
//!
//! A blob is one descriptor record plus up to 127 segment records, possibly
//! spread over several sectors:
//!
//! ```text
//!   sector A                 sector B
//!   ┌─────────────────────┐  ┌───────────────┬──────────────┐
//!   │ ... │ seg gen+0      │  │ seg gen+1     │ descriptor   │
//!   └─────────────────────┘  └───────────────┴──────────────┘
//!           ≥ 512 bytes         last segment    total, count, gen
//! ```
//!
//! Segment ids start at one of two generation markers. A replacement uses
//! the other marker, so old and new segments can coexist until the new
//! descriptor is committed.

use tracing::{debug, warn};

use super::Engine;
use crate::checkpoint::Checkpoint;
use crate::config::SLICE_SIZE;
use crate::error::{KvError, Result};
use crate::item::{
    data_crc, BlobDescriptor, ItemHeader, ItemName, Payload, ValueType, MAX_SEGMENTS,
    MIN_SEGMENT_SIZE,
};
use crate::sector::ItemQuery;
use crate::storage::{Located, Location};

impl Engine {
    /// Lay `data` out as segments of generation `gen`, then write the
    /// descriptor. Returns the descriptor's location.
    pub(super) fn write_blob(
        &mut self,
        group: u8,
        key: &ItemName,
        data: &[u8],
        gen: u8,
    ) -> Result<Location> {
        let single = self.sm.partition().geometry().max_item_size();
        let mut current = self.current_sector()?;
        let mut left = data.len();

        // Start on a clean sector when the current one would split the blob
        // across its dropped space, so free space and GC space agree.
        let sector = self.sm.sector(current);
        if (sector.dropped_slice() > 0 && left + SLICE_SIZE > sector.free_bytes())
            || left > (MAX_SEGMENTS - 1) * single
        {
            match self.sm.request_sector(SLICE_SIZE) {
                Ok(()) => current = self.current_sector()?,
                Err(e @ KvError::PowerLoss(_)) => return Err(e),
                Err(e) => debug!(error = %e, "no fresh sector for blob, using current"),
            }
        }

        let start = current;
        let mut offset = 0;
        let mut seg_id = gen;

        loop {
            let written = seg_id.wrapping_sub(gen) as usize;
            if written >= MAX_SEGMENTS && left > 0 {
                warn!(key = %key, "blob needs more than {} segments", MAX_SEGMENTS);
                break;
            }

            let sector = self.sm.sector(current);
            let free = sector.free_bytes();
            let entry_count = sector.entry_count();

            if left > 0 {
                if left + SLICE_SIZE <= free {
                    self.write_segment(current, group, key, seg_id, &data[offset..])?;
                    seg_id = seg_id.wrapping_add(1);
                    offset = data.len();
                    left = 0;

                    if self.sm.sector(current).next_free_slice() < entry_count {
                        self.sm.partition().checkpoint(Checkpoint::AfterWriteAllSegments)?;
                        return self.write_descriptor(current, group, key, data.len(), seg_id, gen);
                    }
                } else if free >= MIN_SEGMENT_SIZE + SLICE_SIZE {
                    let len = free - SLICE_SIZE;
                    self.write_segment(current, group, key, seg_id, &data[offset..offset + len])?;
                    seg_id = seg_id.wrapping_add(1);
                    offset += len;
                    left -= len;
                    self.sm.partition().checkpoint(Checkpoint::AfterWriteSegment)?;
                } else {
                    debug!(sector = current, free, "sector too small for a segment");
                }
            } else if free >= SLICE_SIZE {
                self.sm.partition().checkpoint(Checkpoint::AfterWriteAllSegments)?;
                return self.write_descriptor(current, group, key, data.len(), seg_id, gen);
            }

            match self.sm.request_sector(SLICE_SIZE) {
                Ok(()) => {}
                Err(e @ KvError::PowerLoss(_)) => return Err(e),
                Err(e) => {
                    debug!(error = %e, "blob write cannot get another sector");
                    return Err(KvError::NoSpace);
                }
            }
            current = self.current_sector()?;
            if current == start {
                debug!("blob write cycled back to its first sector");
                return Err(KvError::NoSpace);
            }
        }

        Err(KvError::NoSpace)
    }

    fn write_segment(
        &mut self,
        sector: usize,
        group: u8,
        key: &ItemName,
        seg_id: u8,
        data: &[u8],
    ) -> Result<Location> {
        let header = ItemHeader::for_value(*key, group, ValueType::BlobSegment, seg_id, data);
        debug!(key = %key, seg_id, len = data.len(), sector, "blob segment");
        self.sm.write_item(sector, &header, data)
    }

    fn write_descriptor(
        &mut self,
        sector: usize,
        group: u8,
        key: &ItemName,
        total: usize,
        end_seg: u8,
        gen: u8,
    ) -> Result<Location> {
        let desc = BlobDescriptor {
            total_size: total as u32,
            seg_count: end_seg.wrapping_sub(gen),
            seg_start: gen,
        };
        debug!(key = %key, total, seg_count = desc.seg_count, gen, "blob descriptor");
        self.sm.write_item(sector, &ItemHeader::for_blob(*key, group, desc), &[])
    }

    /// Reassemble a blob into `buf` (exactly `total_size` bytes).
    ///
    /// A blob whose segments do not add up to its descriptor is dropped.
    pub(super) fn read_blob(
        &mut self,
        found: &Located,
        desc: BlobDescriptor,
        buf: &mut [u8],
    ) -> Result<usize> {
        let total = desc.total_size as usize;
        let mut offset = 0;
        let mut complete = true;

        for seg_id in desc.seg_ids() {
            let Some(seg) = self.find_segment(&found.header, desc, seg_id)? else {
                debug!(key = %found.header.name, seg_id, "blob segment missing");
                complete = false;
                break;
            };
            let len = seg.header.length;
            if offset + len > total {
                complete = false;
                break;
            }
            if !self.read_segment(&seg, &mut buf[offset..offset + len])? {
                complete = false;
                break;
            }
            offset += len;
        }

        if complete && offset == total {
            return Ok(total);
        }

        warn!(
            key = %found.header.name,
            expected = total,
            found = offset,
            "blob incomplete, dropping"
        );
        self.erase_blob(found, desc)?;
        if offset > 0 {
            Err(KvError::InvalidLength)
        } else {
            Err(KvError::NotFound)
        }
    }

    /// Read one segment, verifying its checksum. `false` on mismatch.
    fn read_segment(&mut self, seg: &Located, out: &mut [u8]) -> Result<bool> {
        match seg.header.payload {
            Payload::Inline(bytes) => {
                out.copy_from_slice(&bytes[..out.len()]);
                Ok(true)
            }
            Payload::DataCrc(crc) => {
                self.sm.read_data(seg.location, out)?;
                Ok(data_crc(out) == crc)
            }
            Payload::Blob(_) => Ok(false),
        }
    }

    /// Whether the stored blob equals `data`, segment by segment.
    pub(super) fn blob_equals(
        &mut self,
        owner: &ItemHeader,
        desc: BlobDescriptor,
        data: &[u8],
    ) -> Result<bool> {
        if desc.total_size as usize != data.len() {
            return Ok(false);
        }
        let mut offset = 0;
        let mut buf = Vec::new();
        for seg_id in desc.seg_ids() {
            let Some(seg) = self.find_segment(owner, desc, seg_id)? else {
                return Ok(false);
            };
            let len = seg.header.length;
            if offset + len > data.len() {
                return Ok(false);
            }
            buf.resize(len, 0);
            if !self.read_segment(&seg, &mut buf)? || buf[..] != data[offset..offset + len] {
                return Ok(false);
            }
            offset += len;
        }
        Ok(offset == data.len())
    }

    /// Drop a blob: descriptor first, then its segments.
    pub(super) fn erase_blob(&mut self, found: &Located, desc: BlobDescriptor) -> Result<()> {
        self.sm.erase_item(found)?;
        self.sm.partition().checkpoint(Checkpoint::AfterEraseOldDescriptor)?;

        for seg_id in desc.seg_ids() {
            if let Some(seg) = self.find_segment(&found.header, desc, seg_id)? {
                self.sm.erase_item(&seg)?;
            }
        }
        Ok(())
    }

    /// Drop live segments of generation `gen` left behind for `key`, so a
    /// new blob of that generation cannot pick them up.
    pub(super) fn purge_generation(&mut self, group: u8, key: &ItemName, gen: u8) -> Result<()> {
        let stale = self.sm.find_all(&ItemQuery::generation(group, key, gen))?;
        if !stale.is_empty() {
            warn!(key = %key, gen, count = stale.len(), "dropping stale blob segments");
        }
        for seg in &stale {
            self.sm.erase_item(seg)?;
        }
        Ok(())
    }

    fn find_segment(
        &mut self,
        owner: &ItemHeader,
        desc: BlobDescriptor,
        seg_id: u8,
    ) -> Result<Option<Located>> {
        let mut query = ItemQuery::segment(owner.group, &owner.name, seg_id);
        query.generation = Some(desc.seg_start);
        self.sm.find_item(&query)
    }
}
