//! In-memory flash device for testing.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::{check_range, FlashDevice, ERASED};
use crate::error::{KvError, Result};

/// A RAM-backed device with NOR flash semantics.
///
/// Useful for:
/// - Unit and integration tests
/// - Power-loss simulation (share one device between a crashed and a
///   reloaded store)
/// - Corruption injection via [`MemoryFlash::corrupt`]
#[derive(Debug)]
pub struct MemoryFlash {
    data: RwLock<Vec<u8>>,
    fail_writes: AtomicBool,
}

impl MemoryFlash {
    /// A fully erased device of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::with_data(vec![ERASED; size])
    }

    /// A device with pre-existing contents, e.g. a snapshot taken earlier.
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Copy of the whole device.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrite bytes unconditionally (ignores NOR semantics).
    pub fn corrupt(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.data.write();
        let end = (offset + bytes.len()).min(data.len());
        if offset < end {
            data[offset..end].copy_from_slice(&bytes[..end - offset]);
        }
    }

    /// Make every subsequent write and erase fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KvError::Fail("injected device write failure".into()));
        }
        Ok(())
    }
}

impl FlashDevice for MemoryFlash {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.data.read();
        check_range(offset, buf.len() as u64, data.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        let mut data = self.data.write();
        check_range(offset, bytes.len() as u64, data.len() as u64)?;
        let start = offset as usize;
        for (cell, b) in data[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *b;
        }
        Ok(())
    }

    fn erase(&self, offset: u64, len: u64) -> Result<()> {
        self.check_writable()?;
        let mut data = self.data.write();
        check_range(offset, len, data.len() as u64)?;
        let start = offset as usize;
        data[start..start + len as usize].fill(ERASED);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.read().len() as u64
    }
}

