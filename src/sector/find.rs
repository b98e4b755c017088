//! Record lookup inside one sector.

use super::Sector;
use crate::error::Result;
use crate::flash::Partition;
use crate::item::{
    fingerprint, generation_of, raw_span, ItemHeader, ItemName, ItemState, TypeFilter, ValueType,
    GROUP_ANY, SEG_ID_NONE,
};

/// Filters applied to every candidate record.
#[derive(Debug, Clone, Copy)]
pub struct ItemQuery<'a> {
    /// Group id, or [`GROUP_ANY`].
    pub group: u8,
    pub filter: TypeFilter,
    pub name: Option<&'a ItemName>,
    /// Exact segment id, or [`SEG_ID_NONE`] for any.
    pub seg_id: u8,
    /// Only segments of this generation.
    pub generation: Option<u8>,
}

impl<'a> ItemQuery<'a> {
    /// Every live record.
    pub fn all() -> Self {
        Self {
            group: GROUP_ANY,
            filter: TypeFilter::Any,
            name: None,
            seg_id: SEG_ID_NONE,
            generation: None,
        }
    }

    /// Records of `group` passing `filter`.
    pub fn in_group(group: u8, filter: TypeFilter) -> Self {
        Self {
            group,
            filter,
            ..Self::all()
        }
    }

    /// The value stored under `name`, whatever its type.
    pub fn key(group: u8, name: &'a ItemName) -> Self {
        Self {
            group,
            filter: TypeFilter::AnyExceptSegment,
            name: Some(name),
            ..Self::all()
        }
    }

    /// One blob segment.
    pub fn segment(group: u8, name: &'a ItemName, seg_id: u8) -> Self {
        Self {
            group,
            filter: TypeFilter::Exact(ValueType::BlobSegment),
            name: Some(name),
            seg_id,
            generation: None,
        }
    }

    /// Every segment of one blob generation.
    pub fn generation(group: u8, name: &'a ItemName, gen: u8) -> Self {
        Self {
            group,
            filter: TypeFilter::Exact(ValueType::BlobSegment),
            name: Some(name),
            seg_id: SEG_ID_NONE,
            generation: Some(gen),
        }
    }

    pub fn with_filter(mut self, filter: TypeFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn matches(&self, item: &ItemHeader) -> bool {
        if item.state != ItemState::Using as u8 {
            return false;
        }
        if self.group != GROUP_ANY && item.group != self.group {
            return false;
        }
        if !self.filter.matches(item.value_type) {
            return false;
        }
        if let Some(name) = self.name {
            if item.name.raw() != name.raw() {
                return false;
            }
        }
        if self.seg_id != SEG_ID_NONE && item.seg_id != self.seg_id {
            return false;
        }
        if let Some(gen) = self.generation {
            if item.value_type != ValueType::BlobSegment || generation_of(item.seg_id) != gen {
                return false;
            }
        }
        true
    }

    /// Fingerprint usable for an index lookup, when the query pins down
    /// every hashed field.
    fn fingerprint(&self) -> Option<u32> {
        let name = self.name?;
        if self.group == GROUP_ANY {
            return None;
        }
        if self.seg_id != SEG_ID_NONE {
            Some(fingerprint(name, self.group, self.seg_id))
        } else if self.filter.excludes_segments() {
            Some(fingerprint(name, self.group, SEG_ID_NONE))
        } else {
            None
        }
    }
}

/// A matching record and where it starts.
#[derive(Debug, Clone)]
pub struct FoundItem {
    pub slot: usize,
    pub header: ItemHeader,
}

impl FoundItem {
    /// First slot after this record.
    pub fn next_slot(&self) -> usize {
        self.slot + self.header.span()
    }
}

impl Sector {
    /// First record at or after slot `from` that satisfies `query`.
    ///
    /// Keyed queries go through the hash index and re-verify each candidate;
    /// others walk the records linearly until the first unused slot.
    pub fn find_item(
        &mut self,
        part: &Partition,
        query: &ItemQuery<'_>,
        from: usize,
    ) -> Result<Option<FoundItem>> {
        if !self.state.has_data() {
            return Ok(None);
        }
        match query.fingerprint() {
            Some(fp) => self.find_indexed(part, query, fp, from),
            None => self.find_linear(part, query, from),
        }
    }

    fn find_indexed(
        &mut self,
        part: &Partition,
        query: &ItemQuery<'_>,
        fp: u32,
        mut from: usize,
    ) -> Result<Option<FoundItem>> {
        while let Some(slot) = self.hash.find(from, fp) {
            let raw = self.read_slice(part, slot)?;
            if let Some(header) = ItemHeader::decode(&raw) {
                if query.matches(&header) {
                    return Ok(Some(FoundItem { slot, header }));
                }
            }
            from = slot + 1;
        }
        Ok(None)
    }

    fn find_linear(
        &mut self,
        part: &Partition,
        query: &ItemQuery<'_>,
        from: usize,
    ) -> Result<Option<FoundItem>> {
        let entry_count = self.entry_count();
        let mut slot = from;

        while slot < entry_count {
            let raw = self.read_slice(part, slot)?;
            if raw[0] == ItemState::Unused as u8 {
                return Ok(None);
            }
            match ItemHeader::decode(&raw) {
                Some(header) => {
                    if query.matches(&header) {
                        return Ok(Some(FoundItem { slot, header }));
                    }
                    slot += header.span();
                }
                None => slot += raw_span(&raw),
            }
        }
        Ok(None)
    }
}
