//! Iterator Module
//!
//! A cursor over the live records of one group, in generation order.
//!
//! The cursor holds no borrow of the engine: it remembers the sector (index
//! and serial) and slot where the next scan starts, and resumes from there
//! on every call. Writes, deletes and GC between two steps are visible to
//! the next step:
//!
//! ```text
//!   active:  [s3] [s5] [s7]        cursor = (s5, slot 12)
//!                  │
//!                  └─ collected ──► resume at the first sector with a
//!                                   serial greater than 5, slot 0
//! ```

use tracing::debug;

use crate::engine::{value_size, Engine};
use crate::error::{KvError, Result};
use crate::item::{ItemName, TypeFilter, ValueType};
use crate::sector::ItemQuery;
use crate::storage::Located;

/// Metadata of the record a cursor stands on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub group: u8,
    pub key: ItemName,
    pub value_type: ValueType,
    pub size: usize,
}

#[derive(Debug, Clone, Copy)]
struct Position {
    sector: usize,
    serial: u32,
    /// First slot not yet scanned.
    slot: usize,
}

#[derive(Debug, Clone)]
pub struct Cursor {
    group: u8,
    filter: TypeFilter,
    position: Option<Position>,
    current: Option<Located>,
    finished: bool,
}

impl Cursor {
    pub fn new(group: u8, filter: TypeFilter) -> Self {
        Self {
            group,
            filter,
            position: None,
            current: None,
            finished: false,
        }
    }

    /// Move to the next matching record. `None` once the active list is
    /// exhausted; every later call returns `None` too.
    pub fn advance(&mut self, engine: &mut Engine) -> Result<Option<EntryInfo>> {
        if self.finished {
            return Ok(None);
        }
        let sm = engine.sector_manager_mut();
        let query = ItemQuery::in_group(self.group, self.filter);

        let (mut pos, mut slot) = match self.position {
            None => (0, 0),
            Some(p) => match sm.active_position(p.sector, p.serial) {
                Some(pos) => (pos, p.slot),
                None => {
                    debug!(sector = p.sector, serial = p.serial, "cursor sector collected, skipping ahead");
                    (sm.active_after_serial(p.serial), 0)
                }
            },
        };

        while pos < sm.active().len() {
            let idx = sm.active()[pos];
            if let Some(found) = sm.find_in_sector(idx, &query, slot)? {
                self.position = Some(Position {
                    sector: idx,
                    serial: sm.sector(idx).serial(),
                    slot: found.location.slot + found.header.span(),
                });
                let info = EntryInfo {
                    group: found.header.group,
                    key: found.header.name,
                    value_type: found.header.value_type,
                    size: value_size(&found.header),
                };
                self.current = Some(found);
                return Ok(Some(info));
            }
            pos += 1;
            slot = 0;
        }

        self.finish();
        Ok(None)
    }

    /// Metadata of the current record.
    pub fn info(&self) -> Option<EntryInfo> {
        self.current.as_ref().map(|found| EntryInfo {
            group: found.header.group,
            key: found.header.name,
            value_type: found.header.value_type,
            size: value_size(&found.header),
        })
    }

    /// Copy the current record's value into `buf`.
    ///
    /// The record is looked up again first: if it was deleted or moved
    /// since [`Cursor::advance`], this returns `NotFound`.
    pub fn data(&self, engine: &mut Engine, buf: &mut [u8]) -> Result<usize> {
        let found = self.revalidate(engine)?;
        engine.read_located(&found, buf)
    }

    /// Like [`Cursor::data`], allocating the buffer.
    pub fn data_vec(&self, engine: &mut Engine) -> Result<Vec<u8>> {
        let found = self.revalidate(engine)?;
        let mut buf = vec![0u8; value_size(&found.header)];
        let n = engine.read_located(&found, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn revalidate(&self, engine: &mut Engine) -> Result<Located> {
        let current = self.current.as_ref().ok_or(KvError::NotFound)?;
        let position = self.position.ok_or(KvError::NotFound)?;
        let loc = current.location;

        let sm = engine.sector_manager_mut();
        if sm.active_position(loc.sector, position.serial).is_none() {
            return Err(KvError::NotFound);
        }
        let query = ItemQuery::in_group(current.header.group, TypeFilter::Exact(current.header.value_type));
        let query = ItemQuery {
            name: Some(&current.header.name),
            seg_id: current.header.seg_id,
            ..query
        };
        match sm.find_in_sector(loc.sector, &query, loc.slot)? {
            Some(found) if found.location == loc => Ok(found),
            _ => Err(KvError::NotFound),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drop the current record and stop.
    pub fn finish(&mut self) {
        self.finished = true;
        self.current = None;
        self.position = None;
    }
}
