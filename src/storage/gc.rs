//! Garbage collection
//!
//! ```text
//!   idle ──activate──► new (Using)                     [GcNewSector]
//!   dirtiest ─────────► Deleting                        [GcMarkDeleting]
//!   dirtiest ──copy live records──► new                 [GcCopied]
//!   dirtiest ──erase──► Uninit                          [GcErasedOld]
//!   dirtiest ──────────► idle
//! ```
//!
//! Load-time recovery relies on this order: a `Deleting` sector always has a
//! complete source copy, and the sector after it may be a partial target.

use tracing::{error, info};

use super::manager::SectorManager;
use crate::checkpoint::Checkpoint;
use crate::error::{KvError, Result};
use crate::sector::{Sector, SectorState};

impl SectorManager {
    /// Compact the active sector with the most reclaimable space, if it
    /// frees at least `need` bytes.
    pub(super) fn garbage_collect(&mut self, need: usize) -> Result<()> {
        let mut dirtiest = None;
        let mut most = 0;
        for &idx in &self.active {
            let size = self.sectors[idx].gc_size();
            if size > most {
                most = size;
                dirtiest = Some(idx);
            }
        }

        let victim = match dirtiest {
            Some(idx) if most >= need => idx,
            _ => {
                error!(need, available = most, "GC cannot reclaim enough space");
                return Err(KvError::NoSpace);
            }
        };

        info!(victim, reclaim = most, need, "GC start");

        let target = self.activate_sector()?;
        self.part.checkpoint(Checkpoint::GcNewSector)?;

        self.sectors[victim].set_state(&self.part, SectorState::Deleting)?;
        self.part.checkpoint(Checkpoint::GcMarkDeleting)?;

        self.copy_sector(victim, target)?;
        self.part.checkpoint(Checkpoint::GcCopied)?;

        self.sectors[victim].erase(&self.part)?;
        self.part.checkpoint(Checkpoint::GcErasedOld)?;

        self.active.retain(|&i| i != victim);
        self.idle.push_back(victim);

        info!(victim, target, "GC done");
        Ok(())
    }

    /// Copy live records of `src` into `dst`.
    pub(super) fn copy_sector(&mut self, src: usize, dst: usize) -> Result<()> {
        let (src_sector, dst_sector) = pair_mut(&mut self.sectors, src, dst)?;
        dst_sector.copy_from(&self.part, src_sector)
    }
}

fn pair_mut(sectors: &mut [Sector], a: usize, b: usize) -> Result<(&mut Sector, &mut Sector)> {
    if a == b {
        return Err(KvError::Fail(format!("cannot copy sector {} onto itself", a)));
    }
    if a < b {
        let (lo, hi) = sectors.split_at_mut(b);
        Ok((&mut lo[a], &mut hi[0]))
    } else {
        let (lo, hi) = sectors.split_at_mut(a);
        Ok((&mut hi[0], &mut lo[b]))
    }
}
