//! Value types, item states and lookup filters.

use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Longest key or group name, in bytes.
pub const MAX_KEY_LEN: usize = 15;

/// Group id under which group markers are stored.
pub const GROUP_MARKER_ID: u8 = 0;

/// Highest assignable group id.
pub const MAX_GROUP_ID: u8 = 62;

/// Wildcard group id.
pub const GROUP_ANY: u8 = 63;

// =============================================================================
// Value Type
// =============================================================================

/// 4-bit value type tag stored in every item header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    Any = 0,
    String = 1,
    I8 = 2,
    U8 = 3,
    I16 = 4,
    U16 = 5,
    I32 = 6,
    U32 = 7,
    I64 = 8,
    U64 = 9,
    Double = 10,
    Binary = 11,
    Blob = 12,
    BlobSegment = 13,
}

impl ValueType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => ValueType::Any,
            1 => ValueType::String,
            2 => ValueType::I8,
            3 => ValueType::U8,
            4 => ValueType::I16,
            5 => ValueType::U16,
            6 => ValueType::I32,
            7 => ValueType::U32,
            8 => ValueType::I64,
            9 => ValueType::U64,
            10 => ValueType::Double,
            11 => ValueType::Binary,
            12 => ValueType::Blob,
            13 => ValueType::BlobSegment,
            _ => return None,
        })
    }

    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Encoded size of fixed-width types.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            ValueType::I8 | ValueType::U8 => Some(1),
            ValueType::I16 | ValueType::U16 => Some(2),
            ValueType::I32 | ValueType::U32 => Some(4),
            ValueType::I64 | ValueType::U64 | ValueType::Double => Some(8),
            _ => None,
        }
    }

    /// Parse the lowercase names used by the CLI.
    pub fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "string" | "str" => ValueType::String,
            "i8" => ValueType::I8,
            "u8" => ValueType::U8,
            "i16" => ValueType::I16,
            "u16" => ValueType::U16,
            "i32" => ValueType::I32,
            "u32" => ValueType::U32,
            "i64" => ValueType::I64,
            "u64" => ValueType::U64,
            "double" | "f64" => ValueType::Double,
            "binary" | "bin" => ValueType::Binary,
            "blob" => ValueType::Blob,
            other => {
                return Err(KvError::InvalidParam(format!("unknown value type '{}'", other)))
            }
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::String => "string",
            ValueType::I8 => "i8",
            ValueType::U8 => "u8",
            ValueType::I16 => "i16",
            ValueType::U16 => "u16",
            ValueType::I32 => "i32",
            ValueType::U32 => "u32",
            ValueType::I64 => "i64",
            ValueType::U64 => "u64",
            ValueType::Double => "double",
            ValueType::Binary => "binary",
            ValueType::Blob => "blob",
            ValueType::BlobSegment => "blob-segment",
        }
    }
}

// =============================================================================
// Type Filter
// =============================================================================

/// Which value types a lookup accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    Any,
    /// Every type but [`ValueType::BlobSegment`]. Used for key lookups,
    /// where segments are internal records that share the blob's key.
    AnyExceptSegment,
    Exact(ValueType),
}

impl TypeFilter {
    pub fn matches(self, ty: ValueType) -> bool {
        match self {
            TypeFilter::Any => true,
            TypeFilter::AnyExceptSegment => ty != ValueType::BlobSegment,
            TypeFilter::Exact(want) => want == ty,
        }
    }

    /// True when no segment record can match.
    pub fn excludes_segments(self) -> bool {
        match self {
            TypeFilter::Any => false,
            TypeFilter::AnyExceptSegment => true,
            TypeFilter::Exact(ty) => ty != ValueType::BlobSegment,
        }
    }
}

impl From<ValueType> for TypeFilter {
    fn from(ty: ValueType) -> Self {
        match ty {
            ValueType::Any => TypeFilter::Any,
            other => TypeFilter::Exact(other),
        }
    }
}

// =============================================================================
// Item State
// =============================================================================

/// Lifecycle byte at offset 0 of every item header.
///
/// Transitions only clear bits: `Unused → Using → Dropped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ItemState {
    Unused = 0xFF,
    Using = 0xFE,
    Dropped = 0xFC,
}

impl ItemState {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0xFF => Some(ItemState::Unused),
            0xFE => Some(ItemState::Using),
            0xFC => Some(ItemState::Dropped),
            _ => None,
        }
    }
}

// =============================================================================
// Item Name
// =============================================================================

/// A key or group name: 1..=15 bytes, no NUL, zero-padded on flash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ItemName {
    bytes: [u8; MAX_KEY_LEN],
}

impl ItemName {
    pub fn new(name: &str) -> Result<Self> {
        Self::from_bytes(name.as_bytes())
    }

    pub fn from_bytes(name: &[u8]) -> Result<Self> {
        if name.is_empty() || name.len() > MAX_KEY_LEN || name.contains(&0) {
            return Err(KvError::InvalidParam(format!(
                "name must be 1..={} bytes without NUL, got {:?}",
                MAX_KEY_LEN,
                String::from_utf8_lossy(name)
            )));
        }
        let mut bytes = [0u8; MAX_KEY_LEN];
        bytes[..name.len()].copy_from_slice(name);
        Ok(Self { bytes })
    }

    /// Decode the on-flash field as-is (no validation).
    pub(crate) fn from_raw(raw: [u8; MAX_KEY_LEN]) -> Self {
        Self { bytes: raw }
    }

    /// Padded 15-byte field.
    pub fn raw(&self) -> &[u8; MAX_KEY_LEN] {
        &self.bytes
    }

    pub fn as_bytes(&self) -> &[u8] {
        let len = self.bytes.iter().position(|&b| b == 0).unwrap_or(MAX_KEY_LEN);
        &self.bytes[..len]
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl std::fmt::Debug for ItemName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl std::fmt::Display for ItemName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}
