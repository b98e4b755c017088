//! Configuration for SectorKV
//!
//! Centralized configuration with sensible defaults, plus the derived
//! sector geometry every partition carries.

use crate::error::{KvError, Result};

/// Allocation unit inside a sector. Fixed by the on-flash format.
pub const SLICE_SIZE: usize = 32;

/// Smallest supported sector size.
pub const MIN_SECTOR_SIZE: usize = 1024;

/// Largest supported sector size (the 12-bit length field must hold a
/// single-item payload).
pub const MAX_SECTOR_SIZE: usize = 4096;

/// Main configuration for a SectorKV store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------
    /// Erase unit of the underlying flash, in bytes
    pub sector_size: usize,

    // -------------------------------------------------------------------------
    // Handle Layer
    // -------------------------------------------------------------------------
    /// Max concurrently open handles across all partitions
    pub max_handles: usize,

    /// Partition used by the convenience accessors
    pub default_partition: String,

    /// Group used by the convenience accessors
    pub default_group: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sector_size: 4096,
            max_handles: 64,
            default_partition: "kv".to_string(),
            default_group: "default".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject geometry the on-flash format cannot express.
    pub fn validate(&self) -> Result<()> {
        Geometry::new(self.sector_size)?;
        if self.max_handles == 0 {
            return Err(KvError::InvalidParam("max_handles must be > 0".into()));
        }
        Ok(())
    }

    pub fn geometry(&self) -> Result<Geometry> {
        Geometry::new(self.sector_size)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the sector (erase unit) size in bytes
    pub fn sector_size(mut self, size: usize) -> Self {
        self.config.sector_size = size;
        self
    }

    /// Set the maximum number of open handles
    pub fn max_handles(mut self, count: usize) -> Self {
        self.config.max_handles = count;
        self
    }

    /// Set the default partition name
    pub fn default_partition(mut self, name: impl Into<String>) -> Self {
        self.config.default_partition = name.into();
        self
    }

    /// Set the default group name
    pub fn default_group(mut self, name: impl Into<String>) -> Self {
        self.config.default_group = name.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// Sector layout derived from the sector size.
///
/// ```text
/// ┌────────┬────────┬────────┬─────┬────────┐
/// │ header │ slot 0 │ slot 1 │ ... │ slot N │   N + 1 = entry_count
/// └────────┴────────┴────────┴─────┴────────┘
///   32 B     32 B
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    sector_size: usize,
}

impl Geometry {
    pub fn new(sector_size: usize) -> Result<Self> {
        if !(MIN_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&sector_size)
            || sector_size % SLICE_SIZE != 0
        {
            return Err(KvError::InvalidParam(format!(
                "sector size {} must be a multiple of {} in {}..={}",
                sector_size, SLICE_SIZE, MIN_SECTOR_SIZE, MAX_SECTOR_SIZE
            )));
        }
        Ok(Self { sector_size })
    }

    #[inline]
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// Record slots per sector (the header slice excluded).
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.sector_size / SLICE_SIZE - 1
    }

    /// Largest payload a single record can hold.
    #[inline]
    pub fn max_item_size(&self) -> usize {
        (self.entry_count() - 1) * SLICE_SIZE
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self { sector_size: 4096 }
    }
}
