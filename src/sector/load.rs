//! Sector load: classify the header, then rebuild counters and index.

use tracing::{debug, warn};

use super::header::{self, HeaderCheck};
use super::{Sector, SectorState};
use crate::config::SLICE_SIZE;
use crate::error::Result;
use crate::flash::{Partition, ERASED};
use crate::item::{raw_span, ItemHeader, ItemState};

impl Sector {
    /// Read the sector from flash.
    ///
    /// Records whose header fails its checksum are torn writes and are
    /// tombstoned in place (skipped silently on a read-only partition).
    pub fn load(&mut self, part: &Partition) -> Result<()> {
        self.state = SectorState::Uninit;
        self.serial = 0;
        self.reset_counters();

        let mut buf = [0u8; SLICE_SIZE];
        if let Err(e) = part.read(self.index, 0, &mut buf) {
            self.state = SectorState::Invalid;
            return Err(e);
        }

        match header::decode(&buf) {
            HeaderCheck::Blank => {
                if !self.is_blank(part)? {
                    warn!(sector = self.index, "blank header over dirty sector");
                    self.state = SectorState::Crashed;
                }
            }
            HeaderCheck::Corrupt => {
                warn!(sector = self.index, "bad sector header");
                self.state = SectorState::Crashed;
            }
            HeaderCheck::WrongVersion(v) => {
                warn!(sector = self.index, version = v, "unsupported sector version");
                self.state = SectorState::Crashed;
            }
            HeaderCheck::Valid { state, serial } => {
                self.serial = serial;
                self.state = match state {
                    SectorState::Uninit => SectorState::Crashed,
                    other => other,
                };
                if self.state.has_data() {
                    if let Err(e) = self.scan(part) {
                        self.state = SectorState::Invalid;
                        return Err(e);
                    }
                }
            }
        }

        debug!(
            sector = self.index,
            state = ?self.state,
            serial = self.serial,
            used = self.used_slice,
            dropped = self.dropped_slice,
            "sector loaded"
        );
        Ok(())
    }

    fn is_blank(&mut self, part: &Partition) -> Result<bool> {
        let mut buf = vec![0u8; self.geometry.sector_size()];
        if let Err(e) = part.read(self.index, 0, &mut buf) {
            self.state = SectorState::Invalid;
            return Err(e);
        }
        Ok(buf.iter().all(|&b| b == ERASED))
    }

    fn scan(&mut self, part: &Partition) -> Result<()> {
        let entry_count = self.entry_count();
        let mut slot = 0;

        while slot < entry_count {
            let raw = self.read_slice(part, slot)?;
            let remaining = entry_count - slot;

            match ItemState::from_byte(raw[0]) {
                Some(ItemState::Unused) => break,
                Some(ItemState::Using) => match ItemHeader::decode(&raw) {
                    Some(item) => {
                        let span = item.span().min(remaining);
                        self.hash.append(item.fingerprint(), slot)?;
                        self.used_slice += span;
                        slot += span;
                    }
                    None => {
                        let span = raw_span(&raw).min(remaining);
                        warn!(sector = self.index, slot, "torn item header, dropping");
                        if !part.is_read_only() {
                            part.write(self.index, Self::header_offset(slot), &[ItemState::Dropped as u8])?;
                        }
                        self.used_slice += span;
                        self.dropped_slice += span;
                        slot += span;
                    }
                },
                // Unknown state bytes are treated as dropped.
                Some(ItemState::Dropped) | None => {
                    let span = raw_span(&raw).min(remaining);
                    self.used_slice += span;
                    self.dropped_slice += span;
                    slot += span;
                }
            }
        }

        self.next_free_slice = slot;
        Ok(())
    }
}
