//! Group table
//!
//! Groups are namespaces mapped to ids 1..=62. Each mapping is persisted as
//! a `U8` record in the reserved group 0, named after the group, whose
//! value is the id.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::item::{ItemName, TypeFilter, ValueType, GROUP_MARKER_ID, MAX_GROUP_ID};
use crate::sector::ItemQuery;
use crate::storage::SectorManager;

#[derive(Debug, Default)]
pub struct GroupTable {
    by_id: BTreeMap<u8, ItemName>,
}

impl GroupTable {
    /// Collect every group marker from the active sectors.
    pub(super) fn load(sm: &mut SectorManager) -> Result<Self> {
        let query = ItemQuery::in_group(GROUP_MARKER_ID, TypeFilter::Exact(ValueType::U8));
        let mut table = Self::default();
        for marker in sm.find_all(&query)? {
            let id = match marker.header.inline_data() {
                Some(&[id, ..]) => id,
                _ => continue,
            };
            if (1..=MAX_GROUP_ID).contains(&id) && !table.by_id.contains_key(&id) {
                debug!(group = %marker.header.name, id, "group loaded");
                table.by_id.insert(id, marker.header.name);
            }
        }
        Ok(table)
    }

    pub fn id_of(&self, name: &ItemName) -> Option<u8> {
        self.by_id
            .iter()
            .find(|(_, n)| n.raw() == name.raw())
            .map(|(&id, _)| id)
    }

    pub fn name_of(&self, id: u8) -> Option<&ItemName> {
        self.by_id.get(&id)
    }

    /// Lowest unassigned id.
    pub fn lowest_free(&self) -> Option<u8> {
        (1..=MAX_GROUP_ID).find(|id| !self.by_id.contains_key(id))
    }

    pub(super) fn insert(&mut self, id: u8, name: ItemName) {
        self.by_id.insert(id, name);
    }

    pub(super) fn remove(&mut self, id: u8) -> Option<ItemName> {
        self.by_id.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &ItemName)> {
        self.by_id.iter().map(|(&id, name)| (id, name))
    }
}
