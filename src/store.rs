//! Store Module
//!
//! The process-wide context: open partitions, handles and iterators, all
//! behind one lock.
//!
//! ## Concurrency Model
//! - Every public operation takes the store lock for its whole duration
//! - Operations are totally ordered by lock acquisition
//! - An iterator releases the lock between steps, so changes made between
//!   two `next()` calls are visible to the following step
//!
//! ## Handles
//! Handles are slab slots with a generation counter. Closing a handle (or
//! deinitializing its partition) bumps the generation, so a stale
//! [`HandleId`] is rejected with [`KvError::InvalidHandle`].

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, Geometry};
use crate::engine::{Engine, ItemInfo};
use crate::error::{KvError, Result};
use crate::export::{Snapshot, SnapshotEntry};
use crate::flash::PartitionTable;
use crate::item::{ItemName, TypeFilter, ValueType};
use crate::iterator::{Cursor, EntryInfo};
use crate::storage::SpaceStatus;
use crate::value::{format_value, KvValue};

/// Access mode of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Opaque handle to one group of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    index: u32,
    generation: u32,
}

/// Space and bookkeeping of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvStatus {
    pub space: SpaceStatus,
    pub group_count: usize,
    pub handle_count: usize,
}

#[derive(Debug, Clone)]
struct HandleEntry {
    partition: String,
    group: u8,
    mode: OpenMode,
}

#[derive(Debug, Default)]
struct HandleSlot {
    generation: u32,
    entry: Option<HandleEntry>,
}

#[derive(Default)]
struct StoreState {
    engines: HashMap<String, Engine>,
    handles: Vec<HandleSlot>,
}

impl StoreState {
    fn engine(&mut self, partition: &str) -> Result<&mut Engine> {
        self.engines.get_mut(partition).ok_or(KvError::NotInitialized)
    }

    fn handle(&self, id: HandleId) -> Result<HandleEntry> {
        self.handles
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.clone())
            .ok_or(KvError::InvalidHandle)
    }

    /// Engine and group behind a handle, optionally requiring write access.
    fn resolve(&mut self, id: HandleId, write: bool) -> Result<(&mut Engine, u8)> {
        let entry = self.handle(id)?;
        if write && entry.mode != OpenMode::ReadWrite {
            return Err(KvError::ReadOnly);
        }
        let engine = self.engine(&entry.partition)?;
        Ok((engine, entry.group))
    }

    fn open_handles(&self) -> usize {
        self.handles.iter().filter(|s| s.entry.is_some()).count()
    }

    fn handles_on<'a>(&'a self, partition: &'a str) -> impl Iterator<Item = &'a HandleEntry> + 'a {
        self.handles
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .filter(move |e| e.partition == partition)
    }

    fn allocate(&mut self, entry: HandleEntry) -> HandleId {
        let index = match self.handles.iter().position(|s| s.entry.is_none()) {
            Some(index) => index,
            None => {
                self.handles.push(HandleSlot::default());
                self.handles.len() - 1
            }
        };
        let slot = &mut self.handles[index];
        slot.entry = Some(entry);
        HandleId {
            index: index as u32,
            generation: slot.generation,
        }
    }

    fn release(&mut self, index: usize) {
        let slot = &mut self.handles[index];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
    }
}

/// Process-wide key-value store
pub struct KvStore {
    config: Config,
    geometry: Geometry,
    table: PartitionTable,
    state: Mutex<StoreState>,
}

impl KvStore {
    pub fn new(config: Config, table: PartitionTable) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry()?;
        Ok(Self {
            config,
            geometry,
            table,
            state: Mutex::new(StoreState::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Partition Lifecycle
    // =========================================================================

    /// Load a partition and run its recovery.
    pub fn init(&self, partition: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.engines.contains_key(partition) {
            return Err(KvError::AlreadyInitialized);
        }
        let part = self.table.open(partition, self.geometry)?;
        let engine = Engine::open(part)?;
        state.engines.insert(partition.to_string(), engine);
        info!(partition, "partition initialized");
        Ok(())
    }

    /// Close a partition and invalidate its handles.
    pub fn deinit(&self, partition: &str) -> Result<()> {
        let mut state = self.state.lock();
        let engine = state
            .engines
            .remove(partition)
            .ok_or(KvError::NotInitialized)?;

        let stale: Vec<usize> = state
            .handles
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entry.as_ref().is_some_and(|e| e.partition == partition))
            .map(|(i, _)| i)
            .collect();
        for index in &stale {
            state.release(*index);
        }

        engine.close();
        info!(partition, closed_handles = stale.len(), "partition deinitialized");
        Ok(())
    }

    /// Erase a whole partition. It must not be initialized.
    pub fn erase(&self, partition: &str) -> Result<()> {
        let state = self.state.lock();
        if state.engines.contains_key(partition) {
            return Err(KvError::Busy);
        }
        let part = self.table.open(partition, self.geometry)?;
        part.erase_all()?;
        info!(partition, "partition erased");
        Ok(())
    }

    pub fn is_initialized(&self, partition: &str) -> bool {
        self.state.lock().engines.contains_key(partition)
    }

    // =========================================================================
    // Handles
    // =========================================================================

    /// Open a handle on `group`. Read-write handles create the group.
    pub fn open(&self, partition: &str, group: &str, mode: OpenMode) -> Result<HandleId> {
        let name = ItemName::new(group)?;
        let mut state = self.state.lock();

        if state.open_handles() >= self.config.max_handles {
            warn!(max = self.config.max_handles, "handle limit reached");
            return Err(KvError::Fail("too many open handles".into()));
        }

        let engine = state.engine(partition)?;
        if mode == OpenMode::ReadWrite && engine.is_read_only() {
            return Err(KvError::ReadOnly);
        }
        let group_id = engine.open_group(&name, mode == OpenMode::ReadWrite)?;

        let id = state.allocate(HandleEntry {
            partition: partition.to_string(),
            group: group_id,
            mode,
        });
        debug!(partition, group, group_id, ?mode, "handle opened");
        Ok(id)
    }

    /// Open a handle on the configured default partition and group.
    pub fn open_default(&self, mode: OpenMode) -> Result<HandleId> {
        let partition = self.config.default_partition.clone();
        let group = self.config.default_group.clone();
        self.open(&partition, &group, mode)
    }

    pub fn close(&self, id: HandleId) -> Result<()> {
        let mut state = self.state.lock();
        state.handle(id)?;
        state.release(id.index as usize);
        debug!(index = id.index, "handle closed");
        Ok(())
    }

    // =========================================================================
    // Values
    // =========================================================================

    pub fn set<V: KvValue>(&self, id: HandleId, key: &str, value: &V) -> Result<()> {
        self.set_raw(id, key, V::TYPE, &value.encode())
    }

    pub fn get<V: KvValue>(&self, id: HandleId, key: &str) -> Result<V> {
        let key = ItemName::new(key)?;
        let mut state = self.state.lock();
        let (engine, group) = state.resolve(id, false)?;
        let (_, bytes) = engine.read_value(group, V::TYPE, &key)?;
        V::decode(&bytes)
    }

    pub fn set_raw(&self, id: HandleId, key: &str, ty: ValueType, data: &[u8]) -> Result<()> {
        let key = ItemName::new(key)?;
        let mut state = self.state.lock();
        let (engine, group) = state.resolve(id, true)?;
        engine.write_item(group, ty, &key, data)
    }

    /// Stored type and bytes of `key`, whatever the type.
    pub fn get_raw(&self, id: HandleId, key: &str) -> Result<(ValueType, Vec<u8>)> {
        let key = ItemName::new(key)?;
        let mut state = self.state.lock();
        let (engine, group) = state.resolve(id, false)?;
        engine.read_value(group, ValueType::Any, &key)
    }

    /// Copy the value of `key` into `buf`. A short buffer fails with
    /// [`KvError::BufferTooSmall`] carrying the required size.
    pub fn get_into(&self, id: HandleId, key: &str, buf: &mut [u8]) -> Result<usize> {
        let key = ItemName::new(key)?;
        let mut state = self.state.lock();
        let (engine, group) = state.resolve(id, false)?;
        engine.read_item(group, ValueType::Any, &key, buf)
    }

    pub fn get_info(&self, id: HandleId, key: &str) -> Result<ItemInfo> {
        let key = ItemName::new(key)?;
        let mut state = self.state.lock();
        let (engine, group) = state.resolve(id, false)?;
        engine.find_key(group, &key)
    }

    pub fn del_key(&self, id: HandleId, key: &str) -> Result<()> {
        let key = ItemName::new(key)?;
        let mut state = self.state.lock();
        let (engine, group) = state.resolve(id, true)?;
        engine.del_item(group, ValueType::Any, &key)
    }

    /// Delete every key of the handle's group.
    pub fn del_group(&self, id: HandleId) -> Result<()> {
        let mut state = self.state.lock();
        let (engine, group) = state.resolve(id, true)?;
        engine.del_group(group)
    }

    /// Delete every key of `group` and forget the group. No handle may be
    /// open on it.
    pub fn remove_group(&self, partition: &str, group: &str) -> Result<()> {
        let name = ItemName::new(group)?;
        let mut state = self.state.lock();
        let group_id = state
            .engine(partition)?
            .group_id(&name)
            .ok_or(KvError::NotFound)?;
        if state.handles_on(partition).any(|e| e.group == group_id) {
            return Err(KvError::Busy);
        }
        let engine = state.engine(partition)?;
        engine.del_group(group_id)?;
        engine.remove_group(group_id)
    }

    pub fn status(&self, partition: &str) -> Result<KvStatus> {
        let mut state = self.state.lock();
        let handle_count = state.handles_on(partition).count();
        let engine = state.engine(partition)?;
        Ok(KvStatus {
            space: engine.status(),
            group_count: engine.groups().len(),
            handle_count,
        })
    }

    /// Run `f` on the engine of `partition` under the store lock.
    pub fn with_engine<T>(&self, partition: &str, f: impl FnOnce(&mut Engine) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        f(state.engine(partition)?)
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Iterate the records of `group` in `partition`.
    pub fn entry_find(&self, partition: &str, group: &str, filter: TypeFilter) -> Result<EntryIterator<'_>> {
        let name = ItemName::new(group)?;
        let mut state = self.state.lock();
        let group_id = state
            .engine(partition)?
            .group_id(&name)
            .ok_or(KvError::NotFound)?;
        Ok(EntryIterator::new(self, partition, group_id, filter))
    }

    /// Iterate the records of a handle's group.
    pub fn entry_find_by_handle(&self, id: HandleId, filter: TypeFilter) -> Result<EntryIterator<'_>> {
        let state = self.state.lock();
        let entry = state.handle(id)?;
        Ok(EntryIterator::new(self, &entry.partition, entry.group, filter))
    }

    /// Release an iterator, finished or not. `None` is accepted.
    pub fn release_iterator(iter: Option<EntryIterator<'_>>) {
        if let Some(iter) = iter {
            iter.release();
        }
    }

    /// Log every value of `group` at info level.
    pub fn print(&self, partition: &str, group: &str) -> Result<usize> {
        let mut iter = self.entry_find(partition, group, TypeFilter::AnyExceptSegment)?;
        let mut count = 0;
        while let Some(entry) = iter.next()? {
            match iter.data_vec() {
                Ok(bytes) => info!(
                    group,
                    key = %entry.key,
                    ty = entry.value_type.name(),
                    size = entry.size,
                    value = %format_value(entry.value_type, &bytes),
                    "entry"
                ),
                Err(e) => warn!(key = %entry.key, error = %e, "entry vanished while printing"),
            }
            count += 1;
        }
        Ok(count)
    }

    // =========================================================================
    // Export / Import
    // =========================================================================

    /// Every live value of every group, read under one lock.
    pub fn export(&self, partition: &str) -> Result<Snapshot> {
        let mut state = self.state.lock();
        let engine = state.engine(partition)?;
        let groups: Vec<(u8, String)> = engine
            .groups()
            .iter()
            .map(|(id, name)| (id, name.to_string_lossy()))
            .collect();

        let mut snapshot = Snapshot::new();
        for (id, group) in groups {
            let mut cursor = Cursor::new(id, TypeFilter::AnyExceptSegment);
            while let Some(entry) = cursor.advance(engine)? {
                let data = cursor.data_vec(engine)?;
                snapshot.push(SnapshotEntry {
                    group: group.clone(),
                    key: entry.key.to_string_lossy(),
                    value_type: entry.value_type,
                    data,
                });
            }
        }
        info!(partition, entries = snapshot.len(), "partition exported");
        Ok(snapshot)
    }

    /// Write every snapshot entry, creating groups as needed.
    pub fn import(&self, partition: &str, snapshot: &Snapshot) -> Result<usize> {
        let mut state = self.state.lock();
        let engine = state.engine(partition)?;
        for entry in &snapshot.entries {
            let group = engine.open_group(&ItemName::new(&entry.group)?, true)?;
            engine.write_item(group, entry.value_type, &ItemName::new(&entry.key)?, &entry.data)?;
        }
        info!(partition, entries = snapshot.len(), "snapshot imported");
        Ok(snapshot.len())
    }
}

// =============================================================================
// Entry Iterator
// =============================================================================

/// Iterator over one group, taking the store lock for each step.
pub struct EntryIterator<'a> {
    store: &'a KvStore,
    partition: String,
    cursor: Cursor,
}

impl<'a> EntryIterator<'a> {
    fn new(store: &'a KvStore, partition: &str, group: u8, filter: TypeFilter) -> Self {
        let filter = match filter {
            TypeFilter::Any => TypeFilter::AnyExceptSegment,
            other => other,
        };
        Self {
            store,
            partition: partition.to_string(),
            cursor: Cursor::new(group, filter),
        }
    }

    /// Advance to the next entry; `None` at the end.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<EntryInfo>> {
        if self.cursor.is_finished() {
            return Ok(None);
        }
        let mut state = self.store.state.lock();
        let engine = state.engine(&self.partition)?;
        self.cursor.advance(engine)
    }

    pub fn info(&self) -> Option<EntryInfo> {
        self.cursor.info()
    }

    /// Copy the current value into `buf`.
    pub fn data(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.store.state.lock();
        let engine = state.engine(&self.partition)?;
        self.cursor.data(engine, buf)
    }

    pub fn data_vec(&self) -> Result<Vec<u8>> {
        let mut state = self.store.state.lock();
        let engine = state.engine(&self.partition)?;
        self.cursor.data_vec(engine)
    }

    pub fn is_finished(&self) -> bool {
        self.cursor.is_finished()
    }

    pub fn release(mut self) {
        self.cursor.finish();
    }
}
