//! Sector header (slice 0)
//!
//! ```text
//!  0       2       3          4        8         12        13          32
//! ┌───────┬───────┬──────────┬────────┬─────────┬─────────┬───────────┐
//! │ magic │ state │ reserved │ crc32  │ serial  │ version │ 0xFF ...  │
//! └───────┴───────┴──────────┴────────┴─────────┴─────────┴───────────┘
//!   u16 LE                     over      u32 LE
//!                              [8..32)
//! ```
//!
//! The state byte sits outside the CRC so it can be advanced in place.

use crate::config::SLICE_SIZE;
use crate::flash::ERASED;

pub(crate) const SECTOR_MAGIC: u16 = 0x4D57;

pub(crate) const FORMAT_VERSION: u8 = 1;

pub(crate) const STATE_OFFSET: usize = 2;

/// Sector lifecycle. Each transition only clears bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SectorState {
    Uninit = 0xFF,
    Using = 0xFE,
    Full = 0xFC,
    Deleting = 0xF8,
    Crashed = 0xF0,
    Invalid = 0x00,
}

impl SectorState {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0xFF => SectorState::Uninit,
            0xFE => SectorState::Using,
            0xFC => SectorState::Full,
            0xF8 => SectorState::Deleting,
            0x00 => SectorState::Invalid,
            _ => SectorState::Crashed,
        }
    }

    /// Holds records that must be scanned on load.
    pub fn has_data(self) -> bool {
        matches!(
            self,
            SectorState::Using | SectorState::Full | SectorState::Deleting
        )
    }

    /// Must be erased before it can be used again.
    pub fn needs_erase(self) -> bool {
        matches!(self, SectorState::Crashed | SectorState::Invalid)
    }
}

/// Outcome of decoding slice 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderCheck {
    Blank,
    Valid { state: SectorState, serial: u32 },
    Corrupt,
    WrongVersion(u8),
}

pub(crate) fn encode(state: SectorState, serial: u32) -> [u8; SLICE_SIZE] {
    let mut buf = [ERASED; SLICE_SIZE];
    buf[0..2].copy_from_slice(&SECTOR_MAGIC.to_le_bytes());
    buf[STATE_OFFSET] = state as u8;
    buf[8..12].copy_from_slice(&serial.to_le_bytes());
    buf[12] = FORMAT_VERSION;
    let crc = crc32fast::hash(&buf[8..32]);
    buf[4..8].copy_from_slice(&crc.to_le_bytes());
    buf
}

pub(crate) fn decode(buf: &[u8; SLICE_SIZE]) -> HeaderCheck {
    if buf.iter().all(|&b| b == ERASED) {
        return HeaderCheck::Blank;
    }
    let magic = u16::from_le_bytes([buf[0], buf[1]]);
    let crc = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if magic != SECTOR_MAGIC || crc != crc32fast::hash(&buf[8..32]) {
        return HeaderCheck::Corrupt;
    }
    if buf[12] != FORMAT_VERSION {
        return HeaderCheck::WrongVersion(buf[12]);
    }
    HeaderCheck::Valid {
        state: SectorState::from_byte(buf[STATE_OFFSET]),
        serial: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
    }
}
