//! Item Module
//!
//! The fixed-size on-flash record: header layout, checksums, span, and the
//! enums that describe what a record holds.

mod codec;
mod types;

pub use codec::{
    data_crc, fingerprint, generation_of, other_generation, raw_span, span, BlobDescriptor,
    ItemHeader, Payload, INLINE_MAX, MAX_SEGMENTS, MIN_SEGMENT_SIZE, SEG_GEN_0, SEG_GEN_1,
    SEG_ID_NONE,
};
pub use types::{
    ItemName, ItemState, TypeFilter, ValueType, GROUP_ANY, GROUP_MARKER_ID, MAX_GROUP_ID,
    MAX_KEY_LEN,
};
