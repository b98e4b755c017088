//! Engine Module
//!
//! The storage engine for one partition: groups, typed records, blobs, and
//! the read / write / delete contract used by the store.
//!
//! ## Responsibilities
//! - Resolve group names to ids and persist new groups
//! - Skip writes of byte-identical values (no wear, idempotent)
//! - Commit a new value before dropping the one it replaces, so a power
//!   cut leaves either the old or the new value
//! - Split blobs into segments across sectors and reassemble them
//! - Repair half-written blobs at open

mod blob;
mod consistency;
mod group;

use tracing::{debug, info, warn};

use crate::checkpoint::Checkpoint;
use crate::config::SLICE_SIZE;
use crate::error::{KvError, Result};
use crate::flash::Partition;
use crate::item::{
    data_crc, ItemHeader, ItemName, Payload, TypeFilter, ValueType, GROUP_MARKER_ID,
    MAX_GROUP_ID, SEG_GEN_0, SEG_ID_NONE,
};
use crate::sector::ItemQuery;
use crate::storage::{Located, Location, SectorManager, SpaceStatus};

pub use group::GroupTable;

/// Type and size of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemInfo {
    pub value_type: ValueType,
    pub size: usize,
}

/// The storage engine for one partition
///
/// Not internally synchronized: the store serializes every call behind
/// its global lock.
pub struct Engine {
    sm: SectorManager,
    groups: GroupTable,
}

impl Engine {
    /// Load a partition.
    ///
    /// On open:
    /// 1. Load sectors and run sector-level crash recovery
    /// 2. Load the group table
    /// 3. Drop half-written blobs and orphaned segments
    pub fn open(part: Partition) -> Result<Self> {
        let read_only = part.is_read_only();
        let mut sm = SectorManager::load(part)?;
        let groups = GroupTable::load(&mut sm)?;

        let mut engine = Self { sm, groups };
        if !read_only {
            if let Err(e) = engine.check_blobs() {
                warn!(error = %e, "blob consistency check failed");
            }
        }

        info!(
            partition = engine.sm.partition().name(),
            groups = engine.groups.len(),
            "engine opened"
        );
        Ok(engine)
    }

    /// Release in-memory indexes.
    pub fn close(mut self) {
        self.sm.unload();
        debug!(partition = self.sm.partition().name(), "engine closed");
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Id of group `name`, creating it when `create` is set.
    pub fn open_group(&mut self, name: &ItemName, create: bool) -> Result<u8> {
        if let Some(id) = self.groups.id_of(name) {
            return Ok(id);
        }
        if !create {
            return Err(KvError::NotFound);
        }
        self.ensure_writable()?;

        let id = self.groups.lowest_free().ok_or(KvError::NoSpace)?;
        self.write_item(GROUP_MARKER_ID, ValueType::U8, name, &[id])?;
        self.groups.insert(id, *name);
        info!(group = %name, id, "group created");
        Ok(id)
    }

    /// Forget a group: drop its marker so the id can be reused.
    pub fn remove_group(&mut self, id: u8) -> Result<()> {
        self.ensure_writable()?;
        let Some(name) = self.groups.name_of(id).copied() else {
            return Err(KvError::NotFound);
        };
        match self.del_item(GROUP_MARKER_ID, ValueType::U8, &name) {
            Ok(()) | Err(KvError::NotFound) => {}
            Err(e) => return Err(e),
        }
        self.groups.remove(id);
        info!(group = %name, id, "group removed");
        Ok(())
    }

    pub fn group_id(&self, name: &ItemName) -> Option<u8> {
        self.groups.id_of(name)
    }

    pub fn group_name(&self, id: u8) -> Option<&ItemName> {
        self.groups.name_of(id)
    }

    pub fn groups(&self) -> &GroupTable {
        &self.groups
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Store `data` under (`group`, `key`) with type `ty`.
    ///
    /// Steps:
    /// 1. Look up the current value of the key (any type but segments)
    /// 2. Return early if it is byte-identical
    /// 3. Write the new record, or the blob segments then descriptor
    /// 4. Drop the superseded record, wherever GC may have moved it
    pub fn write_item(&mut self, group: u8, ty: ValueType, key: &ItemName, data: &[u8]) -> Result<()> {
        check_group(group)?;
        if matches!(ty, ValueType::Any | ValueType::BlobSegment) {
            return Err(KvError::InvalidParam(format!("cannot write type {:?}", ty)));
        }
        self.ensure_writable()?;

        let max = self.sm.partition().geometry().max_item_size();
        if ty != ValueType::Blob && data.len() > max {
            return Err(KvError::ValueTooLong {
                size: data.len(),
                max,
            });
        }

        let old = self.sm.find_item(&ItemQuery::key(group, key))?;

        let new_loc = if ty == ValueType::Blob {
            let mut gen = SEG_GEN_0;
            if let Some(old) = old.as_ref() {
                if let Some(desc) = old.header.blob() {
                    if self.blob_equals(&old.header, desc, data)? {
                        debug!(key = %key, group, "blob unchanged, skipping write");
                        return Ok(());
                    }
                    gen = desc.next_generation();
                }
            }
            self.purge_generation(group, key, gen)?;
            self.sm.check_write_blob_size(data.len())?;
            self.write_blob(group, key, data, gen)?
        } else {
            if let Some(old) = old.as_ref() {
                if old.header.value_type == ty && self.record_equals(old, data)? {
                    debug!(key = %key, group, "value unchanged, skipping write");
                    return Ok(());
                }
            }
            self.write_single(group, ty, key, data)?
        };

        if let Some(old) = old {
            let cp = if old.header.value_type == ValueType::Blob {
                Checkpoint::AfterWriteNewBlob
            } else {
                Checkpoint::BeforeEraseOld
            };
            self.sm.partition().checkpoint(cp)?;

            if let Some(current) = self.sm.find_item_except(&ItemQuery::key(group, key), new_loc)? {
                self.erase_located(&current)?;
            }
        }
        Ok(())
    }

    /// Append one non-blob record, moving to a new sector once if the
    /// current one is full.
    fn write_single(&mut self, group: u8, ty: ValueType, key: &ItemName, data: &[u8]) -> Result<Location> {
        let header = ItemHeader::for_value(*key, group, ty, SEG_ID_NONE, data);
        self.append(&header, data)
    }

    pub(super) fn append(&mut self, header: &ItemHeader, data: &[u8]) -> Result<Location> {
        let current = self.current_sector()?;
        match self.sm.write_item(current, header, data) {
            Err(KvError::SectorFull) => {
                debug!(sector = current, "current sector full, requesting another");
                self.sm.request_sector(header.span() * SLICE_SIZE)?;
                let current = self.current_sector()?;
                self.sm.write_item(current, header, data)
            }
            other => other,
        }
    }

    fn record_equals(&mut self, old: &Located, data: &[u8]) -> Result<bool> {
        if old.header.length != data.len() {
            return Ok(false);
        }
        if let Some(inline) = old.header.inline_data() {
            return Ok(inline == data);
        }
        let mut stored = vec![0u8; old.header.length];
        self.sm.read_data(old.location, &mut stored)?;
        Ok(stored == data)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Copy the value of (`group`, `key`) into `buf`; returns its size.
    ///
    /// `ty` of [`ValueType::Any`] accepts any stored type. A record whose
    /// data fails its checksum is dropped and reported as not found.
    pub fn read_item(&mut self, group: u8, ty: ValueType, key: &ItemName, buf: &mut [u8]) -> Result<usize> {
        let found = self.find(group, ty, key)?;
        self.read_located(&found, buf)
    }

    /// Like [`Engine::read_item`], allocating the buffer.
    pub fn read_value(&mut self, group: u8, ty: ValueType, key: &ItemName) -> Result<(ValueType, Vec<u8>)> {
        let found = self.find(group, ty, key)?;
        let mut buf = vec![0u8; value_size(&found.header)];
        let n = self.read_located(&found, &mut buf)?;
        buf.truncate(n);
        Ok((found.header.value_type, buf))
    }

    pub(crate) fn read_located(&mut self, found: &Located, buf: &mut [u8]) -> Result<usize> {
        let size = value_size(&found.header);
        if buf.len() < size {
            return Err(KvError::BufferTooSmall { required: size });
        }

        match found.header.payload {
            Payload::Blob(desc) => self.read_blob(found, desc, &mut buf[..size]),
            Payload::Inline(bytes) => {
                buf[..size].copy_from_slice(&bytes[..size]);
                Ok(size)
            }
            Payload::DataCrc(crc) => {
                self.sm.read_data(found.location, &mut buf[..size])?;
                if data_crc(&buf[..size]) != crc {
                    warn!(
                        key = %found.header.name,
                        sector = found.location.sector,
                        slot = found.location.slot,
                        "data checksum mismatch, dropping record"
                    );
                    self.sm.erase_item(found)?;
                    return Err(KvError::NotFound);
                }
                Ok(size)
            }
        }
    }

    /// Type and size of the value under `key`.
    pub fn find_key(&mut self, group: u8, key: &ItemName) -> Result<ItemInfo> {
        let found = self.find(group, ValueType::Any, key)?;
        Ok(ItemInfo {
            value_type: found.header.value_type,
            size: value_size(&found.header),
        })
    }

    fn find(&mut self, group: u8, ty: ValueType, key: &ItemName) -> Result<Located> {
        check_group(group)?;
        let filter = match ty {
            ValueType::Any => TypeFilter::AnyExceptSegment,
            other => TypeFilter::Exact(other),
        };
        self.sm
            .find_item(&ItemQuery::key(group, key).with_filter(filter))?
            .ok_or(KvError::NotFound)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    pub fn del_item(&mut self, group: u8, ty: ValueType, key: &ItemName) -> Result<()> {
        self.ensure_writable()?;
        let found = self.find(group, ty, key)?;
        self.erase_located(&found)
    }

    /// Drop every record of `group`, blob segments included. The group
    /// itself stays registered.
    pub fn del_group(&mut self, group: u8) -> Result<()> {
        check_group(group)?;
        self.ensure_writable()?;

        let records = self
            .sm
            .find_all(&ItemQuery::in_group(group, TypeFilter::AnyExceptSegment))?;
        for record in &records {
            self.erase_located(record)?;
        }

        let segments = self
            .sm
            .find_all(&ItemQuery::in_group(group, TypeFilter::Exact(ValueType::BlobSegment)))?;
        for seg in &segments {
            self.sm.erase_item(seg)?;
        }

        info!(group, records = records.len(), "group cleared");
        Ok(())
    }

    fn erase_located(&mut self, found: &Located) -> Result<()> {
        match found.header.blob() {
            Some(desc) => self.erase_blob(found, desc),
            None => self.sm.erase_item(found),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn status(&self) -> SpaceStatus {
        self.sm.status()
    }

    pub fn partition(&self) -> &Partition {
        self.sm.partition()
    }

    pub fn sector_manager(&self) -> &SectorManager {
        &self.sm
    }

    pub(crate) fn sector_manager_mut(&mut self) -> &mut SectorManager {
        &mut self.sm
    }

    /// Live records of one sector, in slot order.
    pub fn sector_records(&mut self, idx: usize) -> Result<Vec<Located>> {
        if idx >= self.sm.sectors().len() {
            return Err(KvError::InvalidParam(format!("no sector {}", idx)));
        }
        let everything = ItemQuery::all();
        let mut out = Vec::new();
        let mut from = 0;
        while let Some(found) = self.sm.find_in_sector(idx, &everything, from)? {
            from = found.location.slot + found.header.span();
            out.push(found);
        }
        Ok(out)
    }

    pub fn is_read_only(&self) -> bool {
        self.sm.partition().is_read_only()
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_read_only() {
            Err(KvError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn current_sector(&self) -> Result<usize> {
        self.sm
            .current()
            .ok_or_else(|| KvError::Fail("no active sector".into()))
    }
}

/// Logical size of the value a record holds.
pub(crate) fn value_size(header: &ItemHeader) -> usize {
    match header.blob() {
        Some(desc) => desc.total_size as usize,
        None => header.length,
    }
}

fn check_group(group: u8) -> Result<()> {
    if group > MAX_GROUP_ID {
        return Err(KvError::InvalidParam(format!("group id {} out of range", group)));
    }
    Ok(())
}
