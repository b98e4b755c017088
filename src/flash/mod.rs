//! Flash Module
//!
//! The I/O boundary between the engine and the raw storage it lives on.
//!
//! ## Layers
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ PartitionTable   name → (device, offset, size)│
//! ├──────────────────────────────────────────────┤
//! │ Partition        sector-addressed, bounds-    │
//! │                  checked, read-only aware     │
//! ├──────────────────────────────────────────────┤
//! │ FlashDevice      byte-addressed read / write /│
//! │                  erase (MemoryFlash, FileFlash)│
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Devices behave like NOR flash: erase sets bytes to `0xFF`, and a write can
//! only clear bits. The on-flash format depends on this: state bytes move
//! forward by clearing bits, so a tombstone is a single byte write.

mod file;
mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::checkpoint::{Checkpoint, CheckpointHook};
use crate::config::Geometry;
use crate::error::{KvError, Result};

pub use file::FileFlash;
pub use memory::MemoryFlash;

/// Value of an erased flash byte.
pub const ERASED: u8 = 0xFF;

// =============================================================================
// Device Trait
// =============================================================================

/// Raw byte-addressed flash.
///
/// All methods take `&self`; implementations use interior mutability so one
/// device can be shared between a store and a test harness.
pub trait FlashDevice: Send + Sync {
    /// Fill `buf` from `offset`.
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Program `data` at `offset` (bits can only go from 1 to 0).
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Reset `len` bytes from `offset` to [`ERASED`].
    fn erase(&self, offset: u64, len: u64) -> Result<()>;

    /// Device capacity in bytes.
    fn size(&self) -> u64;
}

pub(crate) fn check_range(offset: u64, len: u64, size: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(KvError::InvalidParam(format!(
            "range {}+{} outside device of {} bytes",
            offset, len, size
        ))),
    }
}

// =============================================================================
// Partition
// =============================================================================

/// A sector-addressed window onto a device.
#[derive(Clone)]
pub struct Partition {
    name: String,
    device: Arc<dyn FlashDevice>,
    offset: u64,
    sector_count: usize,
    geometry: Geometry,
    read_only: bool,
    hook: CheckpointHook,
}

impl Partition {
    /// Map `size` bytes of `device` starting at `offset`.
    ///
    /// A writable partition needs at least two sectors (one is always held
    /// back for garbage collection).
    pub fn new(
        name: impl Into<String>,
        device: Arc<dyn FlashDevice>,
        offset: u64,
        size: u64,
        geometry: Geometry,
        read_only: bool,
    ) -> Result<Self> {
        let name = name.into();
        let sector_size = geometry.sector_size() as u64;

        check_range(offset, size, device.size())?;
        if size % sector_size != 0 {
            return Err(KvError::InvalidParam(format!(
                "partition '{}' size {} is not a multiple of sector size {}",
                name, size, sector_size
            )));
        }

        let sector_count = (size / sector_size) as usize;
        let min_sectors = if read_only { 1 } else { 2 };
        if sector_count < min_sectors {
            return Err(KvError::InvalidParam(format!(
                "partition '{}' has {} sectors, needs at least {}",
                name, sector_count, min_sectors
            )));
        }

        debug!(partition = %name, offset, sector_count, read_only, "partition mapped");

        Ok(Self {
            name,
            device,
            offset,
            sector_count,
            geometry,
            read_only,
            hook: CheckpointHook::none(),
        })
    }

    /// Attach a fault-injection hook.
    pub fn with_hook(mut self, hook: CheckpointHook) -> Self {
        self.hook = hook;
        self
    }

    pub fn set_hook(&mut self, hook: CheckpointHook) {
        self.hook = hook;
    }

    #[inline]
    pub(crate) fn checkpoint(&self, cp: Checkpoint) -> Result<()> {
        self.hook.hit(cp)
    }

    fn addr(&self, sector: usize, offset: usize, len: usize) -> Result<u64> {
        let sector_size = self.geometry.sector_size();
        if sector >= self.sector_count || offset + len > sector_size {
            return Err(KvError::InvalidParam(format!(
                "access {}+{} in sector {} of partition '{}' out of range",
                offset, len, sector, self.name
            )));
        }
        Ok(self.offset + (sector * sector_size + offset) as u64)
    }

    pub fn read(&self, sector: usize, offset: usize, buf: &mut [u8]) -> Result<()> {
        let addr = self.addr(sector, offset, buf.len())?;
        self.device.read(addr, buf)
    }

    pub fn write(&self, sector: usize, offset: usize, data: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(KvError::ReadOnly);
        }
        let addr = self.addr(sector, offset, data.len())?;
        self.device.write(addr, data)
    }

    pub fn erase_sector(&self, sector: usize) -> Result<()> {
        if self.read_only {
            return Err(KvError::ReadOnly);
        }
        let sector_size = self.geometry.sector_size();
        let addr = self.addr(sector, 0, sector_size)?;
        self.device.erase(addr, sector_size as u64)
    }

    /// Erase every sector of the partition.
    pub fn erase_all(&self) -> Result<()> {
        for sector in 0..self.sector_count {
            self.erase_sector(sector)?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn sector_count(&self) -> usize {
        self.sector_count
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn size(&self) -> u64 {
        (self.sector_count * self.geometry.sector_size()) as u64
    }

    pub fn device(&self) -> &Arc<dyn FlashDevice> {
        &self.device
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("name", &self.name)
            .field("offset", &self.offset)
            .field("sector_count", &self.sector_count)
            .field("geometry", &self.geometry)
            .field("read_only", &self.read_only)
            .field("hook", &self.hook)
            .finish()
    }
}

// =============================================================================
// Partition Table
// =============================================================================

/// Where a named partition lives.
#[derive(Clone)]
pub struct PartitionInfo {
    pub device: Arc<dyn FlashDevice>,
    pub offset: u64,
    pub size: u64,
    pub read_only: bool,
    pub hook: CheckpointHook,
}

impl PartitionInfo {
    pub fn new(device: Arc<dyn FlashDevice>, offset: u64, size: u64) -> Self {
        Self {
            device,
            offset,
            size,
            read_only: false,
            hook: CheckpointHook::none(),
        }
    }

    /// Whole-device partition.
    pub fn whole(device: Arc<dyn FlashDevice>) -> Self {
        let size = device.size();
        Self::new(device, 0, size)
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_hook(mut self, hook: CheckpointHook) -> Self {
        self.hook = hook;
        self
    }
}

/// Name → partition lookup.
#[derive(Clone, Default)]
pub struct PartitionTable {
    entries: HashMap<String, PartitionInfo>,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, info: PartitionInfo) -> &mut Self {
        self.entries.insert(name.into(), info);
        self
    }

    pub fn with(mut self, name: impl Into<String>, info: PartitionInfo) -> Self {
        self.add(name, info);
        self
    }

    pub fn lookup(&self, name: &str) -> Result<&PartitionInfo> {
        self.entries.get(name).ok_or(KvError::NotFound)
    }

    /// Resolve `name` into a mapped [`Partition`].
    pub fn open(&self, name: &str, geometry: Geometry) -> Result<Partition> {
        let info = self.lookup(name)?;
        let partition = Partition::new(
            name,
            Arc::clone(&info.device),
            info.offset,
            info.size,
            geometry,
            info.read_only,
        )?;
        Ok(partition.with_hook(info.hook.clone()))
    }
}
