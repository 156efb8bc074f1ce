// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Values of multi value attributes and the varint framing around them.

use snafu::ensure;
use store_api::metadata::FieldType;

use crate::error::{InvalidRecordSnafu, Result};

/// Native in-memory type of attribute values.
///
/// All attribute values are encoded little endian, so the raw record bytes
/// can be reinterpreted in place on little endian targets.
pub trait NativeValue: bytemuck::Pod + PartialOrd + std::fmt::Display {
    const FIELD_TYPE: FieldType;

    /// Reads one value out of exactly `size_of::<Self>()` bytes.
    fn from_le_bytes(bytes: &[u8]) -> Self;

    /// Appends the little endian encoding of `self`.
    fn write_le_bytes(&self, buf: &mut Vec<u8>);

    /// Writes the little endian encoding of `self` into exactly
    /// `size_of::<Self>()` bytes.
    fn copy_le_bytes(&self, out: &mut [u8]);

    /// Whether a typed accessor over `Self` may read a field declared as
    /// `field_type`.
    fn compatible_with(field_type: FieldType) -> bool {
        field_type == Self::FIELD_TYPE
    }
}

macro_rules! impl_native_value {
    ($($type: ty => $field_type: ident), *) => {
        $(
            impl NativeValue for $type {
                const FIELD_TYPE: FieldType = FieldType::$field_type;

                fn from_le_bytes(bytes: &[u8]) -> $type {
                    let mut raw = [0u8; std::mem::size_of::<$type>()];
                    raw.copy_from_slice(bytes);
                    <$type>::from_le_bytes(raw)
                }

                fn write_le_bytes(&self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(&self.to_le_bytes());
                }

                fn copy_le_bytes(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_native_value!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64
);

impl NativeValue for u8 {
    const FIELD_TYPE: FieldType = FieldType::UInt8;

    fn from_le_bytes(bytes: &[u8]) -> u8 {
        bytes[0]
    }

    fn write_le_bytes(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }

    fn copy_le_bytes(&self, out: &mut [u8]) {
        out[0] = *self;
    }

    // `u8` doubles as the accessor type of char fields.
    fn compatible_with(field_type: FieldType) -> bool {
        matches!(field_type, FieldType::UInt8 | FieldType::Char)
    }
}

/// Values of one multi value field.
///
/// Decoding borrows from the record when the payload is properly aligned
/// for `T` on a little endian target and falls back to an owned copy
/// otherwise, so record buffers need no alignment guarantee.
#[derive(Debug, Clone, PartialEq)]
pub enum MultiValue<'a, T> {
    View(&'a [T]),
    Owned(Vec<T>),
}

impl<T> MultiValue<'_, T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            MultiValue::View(values) => values,
            MultiValue::Owned(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// Decodes `count` values of `T` out of `bytes`.
pub(crate) fn decode_values<'a, T: NativeValue>(
    bytes: &'a [u8],
    count: usize,
) -> Result<MultiValue<'a, T>> {
    let width = std::mem::size_of::<T>();
    ensure!(
        bytes.len() == count * width,
        InvalidRecordSnafu {
            reason: format!(
                "expect {} bytes for {} values, got {}",
                count * width,
                count,
                bytes.len()
            ),
        }
    );

    #[cfg(target_endian = "little")]
    if let Ok(values) = bytemuck::try_cast_slice(bytes) {
        return Ok(MultiValue::View(values));
    }

    let mut values = Vec::with_capacity(count);
    for chunk in bytes.chunks_exact(width) {
        values.push(T::from_le_bytes(chunk));
    }
    Ok(MultiValue::Owned(values))
}

/// Appends `value` with the high bit of each byte flagging continuation.
pub fn encode_varint_u32(value: u32, buf: &mut Vec<u8>) -> usize {
    let mut remaining = value;
    let mut written = 0;
    loop {
        let byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        written += 1;
        if remaining == 0 {
            buf.push(byte);
            return written;
        }
        buf.push(byte | 0x80);
    }
}

/// Decodes a varint from the head of `buf`, returns the value and the
/// number of bytes read.
pub fn decode_varint_u32(buf: &[u8]) -> Result<(u32, usize)> {
    let mut value = 0u32;
    for (index, byte) in buf.iter().enumerate() {
        ensure!(
            index < 5,
            InvalidRecordSnafu {
                reason: "varint is longer than 5 bytes",
            }
        );
        value |= ((byte & 0x7f) as u32) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
    }
    InvalidRecordSnafu {
        reason: "truncated varint",
    }
    .fail()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_round_trip() {
        let mut buf = Vec::new();
        for value in [0u32, 1, 127, 128, 300, 16383, 16384, u32::MAX] {
            buf.clear();
            let written = encode_varint_u32(value, &mut buf);
            assert_eq!(buf.len(), written);
            let (decoded, read) = decode_varint_u32(&buf).unwrap();
            assert_eq!(value, decoded);
            assert_eq!(written, read);
        }
    }

    #[test]
    fn test_varint_sizes() {
        let mut buf = Vec::new();
        assert_eq!(1, encode_varint_u32(0, &mut buf));
        assert_eq!(1, encode_varint_u32(127, &mut buf));
        assert_eq!(2, encode_varint_u32(128, &mut buf));
        assert_eq!(5, encode_varint_u32(u32::MAX, &mut buf));
    }

    #[test]
    fn test_varint_decode_errors() {
        let err = decode_varint_u32(&[]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
        let err = decode_varint_u32(&[0x80, 0x80]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
        let err = decode_varint_u32(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).unwrap_err();
        assert!(err.to_string().contains("longer than"));
    }

    #[test]
    fn test_decode_values_borrows_when_aligned() {
        // A Vec<u8> is at least byte aligned, i32 payloads borrow only when
        // the start happens to be 4 byte aligned, so decode through an
        // aligned buffer explicitly.
        let values: Vec<i32> = vec![1, -2, 3_000_000];
        let bytes: &[u8] = bytemuck::cast_slice(&values);
        let decoded = decode_values::<i32>(bytes, 3).unwrap();
        assert!(matches!(decoded, MultiValue::View(_)));
        assert_eq!(&[1, -2, 3_000_000], decoded.as_slice());
    }

    #[test]
    fn test_decode_values_copies_when_unaligned() {
        let values: Vec<i32> = vec![7, 8];
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(bytemuck::cast_slice(&values));
        let decoded = decode_values::<i32>(&bytes[1..], 2).unwrap();
        assert_eq!(&[7, 8], decoded.as_slice());
    }

    #[test]
    fn test_decode_values_length_mismatch() {
        let err = decode_values::<i64>(&[0u8; 12], 2).unwrap_err();
        assert!(err.to_string().contains("expect 16 bytes"));
    }
}
