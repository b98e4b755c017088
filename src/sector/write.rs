//! Append, tombstone and copy.

use tracing::{debug, trace};

use super::{Sector, SectorState};
use crate::checkpoint::Checkpoint;
use crate::config::SLICE_SIZE;
use crate::error::{KvError, Result};
use crate::flash::Partition;
use crate::item::{raw_span, ItemHeader, ItemState};

impl Sector {
    /// Append a record and index it. Returns the slot it starts at.
    ///
    /// A record that does not fit marks the sector `Full`.
    pub fn write_item(
        &mut self,
        part: &Partition,
        header: &ItemHeader,
        data: &[u8],
    ) -> Result<usize> {
        match self.state {
            SectorState::Using => {}
            SectorState::Full => return Err(KvError::SectorFull),
            other => {
                return Err(KvError::Fail(format!(
                    "sector {} not writable in state {:?}",
                    self.index, other
                )))
            }
        }

        let max = self.geometry.max_item_size();
        if header.length > max {
            return Err(KvError::ValueTooLong {
                size: header.length,
                max,
            });
        }

        let span = header.span();
        if self.next_free_slice + span > self.entry_count() {
            debug!(sector = self.index, span, free = self.next_free_slice, "sector full");
            self.set_state(part, SectorState::Full)?;
            return Err(KvError::SectorFull);
        }

        let slot = self.next_free_slice;
        if let Err(e) = part.write(self.index, Self::header_offset(slot), &header.encode()) {
            self.state = SectorState::Invalid;
            return Err(e);
        }
        self.next_free_slice += span;
        self.used_slice += span;
        self.hash.append(header.fingerprint(), slot)?;

        if header.data_len() > 0 {
            part.checkpoint(Checkpoint::BeforeWriteData)?;
            if let Err(e) = part.write(self.index, Self::data_offset(slot), &data[..header.length]) {
                self.state = SectorState::Invalid;
                return Err(e);
            }
        }

        trace!(
            sector = self.index,
            slot,
            span,
            name = %header.name,
            group = header.group,
            ty = ?header.value_type,
            "item written"
        );
        Ok(slot)
    }

    /// Tombstone the record at `slot`.
    pub fn erase_item(&mut self, part: &Partition, slot: usize, header: &ItemHeader) -> Result<()> {
        if let Err(e) = part.write(self.index, Self::header_offset(slot), &[ItemState::Dropped as u8]) {
            self.state = SectorState::Invalid;
            return Err(e);
        }
        let span = header.span().min(self.entry_count() - slot);
        self.dropped_slice = (self.dropped_slice + span).min(self.used_slice);
        self.hash.erase(slot);
        trace!(sector = self.index, slot, name = %header.name, "item dropped");
        Ok(())
    }

    /// Append every live record of `src` to this sector, in order.
    pub fn copy_from(&mut self, part: &Partition, src: &mut Sector) -> Result<()> {
        let entry_count = src.entry_count();
        let mut slot = 0;
        let mut copied = 0;

        while slot < entry_count {
            let raw = src.read_slice(part, slot)?;
            if raw[0] == ItemState::Unused as u8 {
                break;
            }

            let live = if raw[0] == ItemState::Using as u8 {
                ItemHeader::decode(&raw)
            } else {
                None
            };
            let Some(header) = live else {
                slot += raw_span(&raw).min(entry_count - slot);
                continue;
            };

            let span = header.span().min(entry_count - slot);
            if self.next_free_slice + span > self.entry_count() {
                return Err(KvError::Fail(format!(
                    "copy of sector {} overflows sector {}",
                    src.index, self.index
                )));
            }

            let mut record = vec![0u8; span * SLICE_SIZE];
            record[..SLICE_SIZE].copy_from_slice(&raw);
            if span > 1 {
                src.read_data(part, slot, &mut record[SLICE_SIZE..])?;
            }

            let dst_slot = self.next_free_slice;
            if let Err(e) = part.write(self.index, Self::header_offset(dst_slot), &record) {
                self.state = SectorState::Invalid;
                return Err(e);
            }
            self.hash.append(header.fingerprint(), dst_slot)?;
            self.next_free_slice += span;
            copied += span;
            slot += span;
        }

        self.used_slice = self.next_free_slice;
        debug!(from = src.index, to = self.index, slots = copied, "sector copied");
        Ok(())
    }
}
