//! File-backed flash image.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::info;

use super::{check_range, FlashDevice, ERASED};
use crate::error::Result;

/// A flash image stored in a regular file.
///
/// The file is created (or extended) to `size` bytes of [`ERASED`]. Writes
/// read-modify-write so the image keeps NOR semantics.
#[derive(Debug)]
pub struct FileFlash {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileFlash {
    pub fn open(path: &Path, size: u64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let current = file.metadata()?.len();
        if current < size {
            file.seek(SeekFrom::Start(current))?;
            let pad = vec![ERASED; (size - current) as usize];
            file.write_all(&pad)?;
            file.sync_all()?;
            info!(path = %path.display(), size, "flash image created");
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FlashDevice for FileFlash {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len() as u64, self.size)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        check_range(offset, data.len() as u64, self.size)?;
        let mut file = self.file.lock();

        let mut current = vec![0u8; data.len()];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut current)?;
        for (cell, b) in current.iter_mut().zip(data) {
            *cell &= *b;
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&current)?;
        Ok(())
    }

    fn erase(&self, offset: u64, len: u64) -> Result<()> {
        check_range(offset, len, self.size)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&vec![ERASED; len as usize])?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}
