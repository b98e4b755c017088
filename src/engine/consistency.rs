//! Open-time blob consistency pass.

use tracing::{info, warn};

use super::Engine;
use crate::error::Result;
use crate::item::{generation_of, BlobDescriptor, ItemHeader, TypeFilter, ValueType, GROUP_ANY};
use crate::sector::ItemQuery;
use crate::storage::Located;

/// Segments found for one descriptor.
struct Tally {
    found: Located,
    desc: BlobDescriptor,
    segments: usize,
    bytes: usize,
}

impl Tally {
    fn owns(&self, seg: &ItemHeader) -> bool {
        self.found.header.name.raw() == seg.name.raw()
            && self.found.header.group == seg.group
            && generation_of(seg.seg_id) == self.desc.seg_start
    }

    fn is_complete(&self) -> bool {
        self.segments == self.desc.seg_count as usize && self.bytes == self.desc.total_size as usize
    }
}

impl Engine {
    /// Drop blobs whose segments do not add up to their descriptor, and
    /// segments that belong to no descriptor.
    pub(super) fn check_blobs(&mut self) -> Result<()> {
        let descriptors = self
            .sm
            .find_all(&ItemQuery::in_group(GROUP_ANY, TypeFilter::Exact(ValueType::Blob)))?;
        let segments = self
            .sm
            .find_all(&ItemQuery::in_group(GROUP_ANY, TypeFilter::Exact(ValueType::BlobSegment)))?;

        let mut tallies: Vec<Tally> = descriptors
            .into_iter()
            .filter_map(|found| {
                let desc = found.header.blob()?;
                Some(Tally {
                    found,
                    desc,
                    segments: 0,
                    bytes: 0,
                })
            })
            .collect();

        for seg in &segments {
            if let Some(tally) = tallies.iter_mut().find(|t| t.owns(&seg.header)) {
                tally.segments += 1;
                tally.bytes += seg.header.length;
            }
        }

        let (tallies, broken): (Vec<Tally>, Vec<Tally>) =
            tallies.into_iter().partition(Tally::is_complete);
        for tally in &broken {
            warn!(
                key = %tally.found.header.name,
                group = tally.found.header.group,
                segments = tally.segments,
                expected = tally.desc.seg_count,
                "blob incomplete at open, dropping descriptor"
            );
            self.sm.erase_item(&tally.found)?;
        }

        let mut orphans = 0;
        for seg in &segments {
            if !tallies.iter().any(|t| t.owns(&seg.header)) {
                self.sm.erase_item(seg)?;
                orphans += 1;
            }
        }

        if !broken.is_empty() || orphans > 0 {
            info!(dropped_blobs = broken.len(), orphans, "blob consistency repaired");
        }
        Ok(())
    }
}
