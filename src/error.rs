//! Error types for SectorKV
//!
//! Provides a unified error type for all operations, from raw flash I/O up to
//! the handle layer.

use thiserror::Error;

use crate::checkpoint::Checkpoint;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Base of the legacy numeric status codes (see [`KvError::code`]).
const CODE_BASE: i32 = -30000;

/// Unified error type for SectorKV operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid handle")]
    InvalidHandle,

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    #[error("No space left in partition")]
    NoSpace,

    #[error("Sector is full")]
    SectorFull,

    #[error("No idle sector available")]
    NoMem,

    // -------------------------------------------------------------------------
    // Size Errors
    // -------------------------------------------------------------------------
    #[error("Value too long: {size} bytes (max {max})")]
    ValueTooLong { size: usize, max: usize },

    #[error("Buffer too small: {required} bytes required")]
    BufferTooSmall { required: usize },

    #[error("Invalid length")]
    InvalidLength,

    // -------------------------------------------------------------------------
    // State Errors
    // -------------------------------------------------------------------------
    #[error("Partition is read-only")]
    ReadOnly,

    #[error("Partition not initialized")]
    NotInitialized,

    #[error("Partition already initialized")]
    AlreadyInitialized,

    #[error("Partition is busy")]
    Busy,

    #[error("Operation failed: {0}")]
    Fail(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Snapshot Errors
    // -------------------------------------------------------------------------
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    // -------------------------------------------------------------------------
    // Fault Injection
    // -------------------------------------------------------------------------
    #[error("Simulated power loss at {0:?}")]
    PowerLoss(Checkpoint),
}

impl KvError {
    /// Numeric status code for callers bridging to integer result codes.
    pub fn code(&self) -> i32 {
        let offset = match self {
            KvError::InvalidParam(_) => 1,
            KvError::NotFound => 2,
            KvError::NoSpace => 3,
            KvError::SectorFull => 4,
            KvError::ValueTooLong { .. } => 5,
            KvError::BufferTooSmall { .. } => 5,
            KvError::InvalidLength => 6,
            KvError::NoMem => 7,
            KvError::ReadOnly => 8,
            KvError::InvalidHandle => 9,
            KvError::NotInitialized => 10,
            KvError::AlreadyInitialized => 11,
            KvError::Busy => 12,
            KvError::Fail(_) | KvError::Io(_) | KvError::Snapshot(_) | KvError::PowerLoss(_) => 0,
        };
        CODE_BASE - offset
    }

    /// True for errors that mean "this key is not there", as opposed to a
    /// failure to look.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound)
    }
}

impl From<bincode::Error> for KvError {
    fn from(err: bincode::Error) -> Self {
        KvError::Snapshot(err.to_string())
    }
}
