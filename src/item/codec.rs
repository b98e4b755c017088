//! Item header codec
//!
//! Every record starts with one 32-byte slice:
//!
//! ```text
//!  0      1                16      17      18        20      24            32
//! ┌──────┬────────────────┬───────┬───────┬─────────┬───────┬─────────────┐
//! │state │ name (15, pad 0)│ group │seg_id │type|len │ crc32 │ payload (8) │
//! └──────┴────────────────┴───────┴───────┴─────────┴───────┴─────────────┘
//!                          6 bits           u16 LE:
//!                          (top 2 = 0)      bits 0..4  type
//!                                           bits 4..16 length
//! ```
//!
//! The payload field holds one of:
//! - the value itself when `length <= 8` (unused bytes `0xFF`)
//! - CRC-32 of the out-of-line data in the following slices
//! - a blob descriptor: total size (u32), segment count, generation marker
//!
//! The header CRC covers bytes `1..20` followed by `24..32`, so a tombstone
//! (rewrite of byte 0) leaves it valid.

use super::types::{ItemName, ItemState, ValueType, MAX_KEY_LEN};
use crate::config::SLICE_SIZE;
use crate::flash::ERASED;

/// Largest value stored inside the header.
pub const INLINE_MAX: usize = 8;

/// `seg_id` of records that are not blob segments, and the "any segment"
/// wildcard in lookups.
pub const SEG_ID_NONE: u8 = 0xFF;

/// The two alternating blob generation markers.
pub const SEG_GEN_0: u8 = 0x00;
pub const SEG_GEN_1: u8 = 0x80;

/// Most segments one blob may have.
pub const MAX_SEGMENTS: usize = 127;

/// Smallest segment other than a blob's last one.
pub const MIN_SEGMENT_SIZE: usize = 512;

const LEN_MAX: usize = 0x0FFF;

// =============================================================================
// Payload
// =============================================================================

/// Blob descriptor packed into the payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobDescriptor {
    pub total_size: u32,
    pub seg_count: u8,
    pub seg_start: u8,
}

impl BlobDescriptor {
    /// Segment ids owned by this blob.
    pub fn seg_ids(&self) -> impl Iterator<Item = u8> {
        let start = self.seg_start;
        (0..self.seg_count).map(move |i| start.wrapping_add(i))
    }

    /// The other generation marker.
    pub fn next_generation(&self) -> u8 {
        other_generation(self.seg_start)
    }
}

/// Generation marker not equal to `gen`.
pub fn other_generation(gen: u8) -> u8 {
    if gen == SEG_GEN_0 {
        SEG_GEN_1
    } else {
        SEG_GEN_0
    }
}

/// Generation a segment id belongs to.
#[inline]
pub fn generation_of(seg_id: u8) -> u8 {
    seg_id & 0x80
}

/// The 8-byte payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Inline([u8; INLINE_MAX]),
    DataCrc(u32),
    Blob(BlobDescriptor),
}

impl Payload {
    fn encode(&self) -> [u8; INLINE_MAX] {
        let mut out = [ERASED; INLINE_MAX];
        match *self {
            Payload::Inline(bytes) => out = bytes,
            Payload::DataCrc(crc) => out[..4].copy_from_slice(&crc.to_le_bytes()),
            Payload::Blob(desc) => {
                out[..4].copy_from_slice(&desc.total_size.to_le_bytes());
                out[4] = desc.seg_count;
                out[5] = desc.seg_start;
            }
        }
        out
    }

    fn decode(raw: [u8; INLINE_MAX], ty: ValueType, length: usize) -> Self {
        if ty == ValueType::Blob {
            Payload::Blob(BlobDescriptor {
                total_size: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
                seg_count: raw[4],
                seg_start: raw[5],
            })
        } else if length > INLINE_MAX {
            Payload::DataCrc(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        } else {
            Payload::Inline(raw)
        }
    }
}

// =============================================================================
// Item Header
// =============================================================================

/// Decoded first slice of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemHeader {
    pub state: u8,
    pub name: ItemName,
    pub group: u8,
    pub seg_id: u8,
    pub value_type: ValueType,
    pub length: usize,
    pub payload: Payload,
}

impl ItemHeader {
    /// Header for a value. `data` longer than [`INLINE_MAX`] goes out of line.
    pub fn for_value(
        name: ItemName,
        group: u8,
        value_type: ValueType,
        seg_id: u8,
        data: &[u8],
    ) -> Self {
        let payload = if data.len() <= INLINE_MAX {
            let mut inline = [ERASED; INLINE_MAX];
            inline[..data.len()].copy_from_slice(data);
            Payload::Inline(inline)
        } else {
            Payload::DataCrc(data_crc(data))
        };
        Self {
            state: ItemState::Using as u8,
            name,
            group,
            seg_id,
            value_type,
            length: data.len(),
            payload,
        }
    }

    /// Header for a blob descriptor record.
    pub fn for_blob(name: ItemName, group: u8, desc: BlobDescriptor) -> Self {
        Self {
            state: ItemState::Using as u8,
            name,
            group,
            seg_id: SEG_ID_NONE,
            value_type: ValueType::Blob,
            length: INLINE_MAX,
            payload: Payload::Blob(desc),
        }
    }

    pub fn item_state(&self) -> Option<ItemState> {
        ItemState::from_byte(self.state)
    }

    /// Slices this record occupies.
    pub fn span(&self) -> usize {
        span(self.length)
    }

    /// Out-of-line data bytes following the header.
    pub fn data_len(&self) -> usize {
        if self.length > INLINE_MAX {
            self.length
        } else {
            0
        }
    }

    pub fn inline_data(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Inline(bytes) => Some(&bytes[..self.length.min(INLINE_MAX)]),
            _ => None,
        }
    }

    pub fn blob(&self) -> Option<BlobDescriptor> {
        match self.payload {
            Payload::Blob(desc) => Some(desc),
            _ => None,
        }
    }

    pub fn fingerprint(&self) -> u32 {
        fingerprint(&self.name, self.group, self.seg_id)
    }

    pub fn encode(&self) -> [u8; SLICE_SIZE] {
        let mut buf = [0u8; SLICE_SIZE];
        buf[0] = self.state;
        buf[1..16].copy_from_slice(self.name.raw());
        buf[16] = self.group & 0x3F;
        buf[17] = self.seg_id;
        let packed = (self.value_type.tag() as u16 & 0x0F) | (((self.length & LEN_MAX) as u16) << 4);
        buf[18..20].copy_from_slice(&packed.to_le_bytes());
        buf[24..32].copy_from_slice(&self.payload.encode());
        let crc = header_crc(&buf);
        buf[20..24].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode a header slice. `None` if the CRC or type tag is bad.
    pub fn decode(buf: &[u8; SLICE_SIZE]) -> Option<Self> {
        let stored = u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]);
        if stored != header_crc(buf) {
            return None;
        }
        let packed = u16::from_le_bytes([buf[18], buf[19]]);
        let value_type = ValueType::from_tag((packed & 0x0F) as u8)?;
        let length = (packed >> 4) as usize;

        let mut name = [0u8; MAX_KEY_LEN];
        name.copy_from_slice(&buf[1..16]);
        let mut raw = [0u8; INLINE_MAX];
        raw.copy_from_slice(&buf[24..32]);

        Some(Self {
            state: buf[0],
            name: ItemName::from_raw(name),
            group: buf[16] & 0x3F,
            seg_id: buf[17],
            value_type,
            length,
            payload: Payload::decode(raw, value_type, length),
        })
    }
}

// =============================================================================
// Free Functions
// =============================================================================

/// Slices occupied by a record of `length` payload bytes.
#[inline]
pub fn span(length: usize) -> usize {
    if length <= INLINE_MAX {
        1
    } else {
        1 + (length + SLICE_SIZE - 1) / SLICE_SIZE
    }
}

/// Span read straight from a header slice, without CRC validation.
///
/// Used to step over dropped or torn records.
pub fn raw_span(buf: &[u8; SLICE_SIZE]) -> usize {
    let packed = u16::from_le_bytes([buf[18], buf[19]]);
    span((packed >> 4) as usize)
}

/// CRC-32 of out-of-line data.
#[inline]
pub fn data_crc(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

fn header_crc(buf: &[u8; SLICE_SIZE]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[1..20]);
    hasher.update(&buf[24..32]);
    hasher.finalize()
}

/// 24-bit index fingerprint of (name, group, segment id).
pub fn fingerprint(name: &ItemName, group: u8, seg_id: u8) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(name.raw());
    hasher.update(&[group & 0x3F, seg_id]);
    hasher.finalize() & 0x00FF_FFFF
}
