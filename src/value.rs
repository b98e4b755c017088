//! Typed values
//!
//! Every value maps to one [`ValueType`] tag and a byte encoding. Numbers are
//! little-endian, strings carry a trailing NUL, binaries and blobs are raw.

use crate::error::{KvError, Result};
use crate::item::ValueType;

/// A value that can be stored under a key.
pub trait KvValue: Sized {
    const TYPE: ValueType;

    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> Result<Self>;
}

macro_rules! impl_number {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl KvValue for $ty {
                const TYPE: ValueType = ValueType::$tag;

                fn encode(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }

                fn decode(bytes: &[u8]) -> Result<Self> {
                    let raw = bytes.try_into().map_err(|_| KvError::InvalidLength)?;
                    Ok(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_number! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f64 => Double,
}

impl KvValue for String {
    const TYPE: ValueType = ValueType::String;

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len() + 1);
        bytes.extend_from_slice(self.as_bytes());
        bytes.push(0);
        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let text = match bytes.iter().position(|&b| b == 0) {
            Some(end) => &bytes[..end],
            None => bytes,
        };
        String::from_utf8(text.to_vec())
            .map_err(|e| KvError::InvalidParam(format!("stored string is not UTF-8: {}", e)))
    }
}

/// Small binary value, stored in a single record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Binary(pub Vec<u8>);

impl KvValue for Binary {
    const TYPE: ValueType = ValueType::Binary;

    fn encode(&self) -> Vec<u8> {
        self.0.clone()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Binary(bytes.to_vec()))
    }
}

/// Large binary value, split across segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob(pub Vec<u8>);

impl KvValue for Blob {
    const TYPE: ValueType = ValueType::Blob;

    fn encode(&self) -> Vec<u8> {
        self.0.clone()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Blob(bytes.to_vec()))
    }
}

/// Render stored bytes of type `ty` for display.
pub fn format_value(ty: ValueType, bytes: &[u8]) -> String {
    fn show<V: KvValue + ToString>(bytes: &[u8]) -> String {
        V::decode(bytes)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| format!("<{} bytes>", bytes.len()))
    }

    match ty {
        ValueType::String => show::<String>(bytes),
        ValueType::I8 => show::<i8>(bytes),
        ValueType::U8 => show::<u8>(bytes),
        ValueType::I16 => show::<i16>(bytes),
        ValueType::U16 => show::<u16>(bytes),
        ValueType::I32 => show::<i32>(bytes),
        ValueType::U32 => show::<u32>(bytes),
        ValueType::I64 => show::<i64>(bytes),
        ValueType::U64 => show::<u64>(bytes),
        ValueType::Double => show::<f64>(bytes),
        _ => hex_preview(bytes),
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    const PREVIEW: usize = 16;
    let mut out: String = bytes
        .iter()
        .take(PREVIEW)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > PREVIEW {
        out.push_str(&format!(" ... ({} bytes)", bytes.len()));
    }
    out
}

/// Encode `text` as a value of type `ty`, as typed on a command line.
pub fn parse_value(ty: ValueType, text: &str) -> Result<Vec<u8>> {
    fn num<V: KvValue + std::str::FromStr>(text: &str) -> Result<Vec<u8>> {
        text.parse::<V>()
            .map(|v| v.encode())
            .map_err(|_| KvError::InvalidParam(format!("'{}' is not a valid number", text)))
    }

    match ty {
        ValueType::String => Ok(text.to_string().encode()),
        ValueType::I8 => num::<i8>(text),
        ValueType::U8 => num::<u8>(text),
        ValueType::I16 => num::<i16>(text),
        ValueType::U16 => num::<u16>(text),
        ValueType::I32 => num::<i32>(text),
        ValueType::U32 => num::<u32>(text),
        ValueType::I64 => num::<i64>(text),
        ValueType::U64 => num::<u64>(text),
        ValueType::Double => num::<f64>(text),
        ValueType::Binary | ValueType::Blob => Ok(text.as_bytes().to_vec()),
        other => Err(KvError::InvalidParam(format!("cannot store type {}", other.name()))),
    }
}
