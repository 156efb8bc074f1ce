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

//! Readers and writers over the members of a pack record.

use std::marker::PhantomData;

use snafu::{ensure, OptionExt, ResultExt};
use store_api::metadata::{
    AttributeConfig, FieldType, FloatCompressType, PackAttributeConfig, VAR_OFFSET_SLOT_LEN,
};

use crate::error::{
    InvalidMetaSnafu, InvalidRecordSnafu, Result, TypeMismatchSnafu, UnsupportedSnafu, Utf8Snafu,
};
use crate::record::builder::RecordBuffer;
use crate::record::float_compress;
use crate::record::multi_value::{
    decode_values, decode_varint_u32, encode_varint_u32, MultiValue, NativeValue,
};

/// Separator between items when a multi value field is formatted as one
/// string.
pub const MULTI_VALUE_SEPARATOR: char = '\u{1d}';

/// Instantiates `$body` with the native type behind `$field_type`.
///
/// String fields never reach this dispatch, their codecs are handled before.
macro_rules! with_native_type {
    ($field_type: expr, $fn: ident ($($arg: expr),*)) => {
        match $field_type {
            FieldType::Int8 => $fn::<i8>($($arg),*),
            FieldType::Int16 => $fn::<i16>($($arg),*),
            FieldType::Int32 => $fn::<i32>($($arg),*),
            FieldType::Int64 => $fn::<i64>($($arg),*),
            FieldType::UInt8 | FieldType::Char => $fn::<u8>($($arg),*),
            FieldType::UInt16 => $fn::<u16>($($arg),*),
            FieldType::UInt32 => $fn::<u32>($($arg),*),
            FieldType::UInt64 => $fn::<u64>($($arg),*),
            FieldType::Float32 => $fn::<f32>($($arg),*),
            FieldType::Float64 => $fn::<f64>($($arg),*),
            FieldType::String => unreachable!("string fields have their own codecs"),
        }
    };
}

/// Layout of one record member, resolved from its config once at
/// construction so per document access dispatches on a plain enum without
/// looking at the config again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldCodec {
    /// One fixed width value at a fixed offset.
    Scalar { field_type: FieldType },
    /// `count` fixed width values at a fixed offset. The count lives in the
    /// schema and is not encoded with the data.
    CountedMulti { field_type: FieldType, count: u32 },
    /// Fixed width values in the variable region behind a varint count.
    ///
    /// Bit incompatible with [FieldCodec::CountedMulti], the two never mix
    /// for one field.
    InlineMulti { field_type: FieldType },
    /// One string in the variable region, varint byte length then bytes.
    Str,
    /// Strings in the variable region, varint item count then a varint
    /// byte length and bytes per item.
    MultiStr,
    /// Lossy float32 block, at a fixed offset when the value count is
    /// fixed, otherwise in the variable region behind a varint count.
    CompressedFloat {
        compress: FloatCompressType,
        count: Option<u32>,
    },
}

impl FieldCodec {
    /// Resolves the codec of `config`.
    pub fn resolve(config: &AttributeConfig) -> FieldCodec {
        if config.compress_type.has_float_compress() {
            let count = if config.multi_value {
                config.fixed_multi_count
            } else {
                Some(1)
            };
            return FieldCodec::CompressedFloat {
                compress: config.compress_type.float_compress,
                count,
            };
        }
        match (config.field_type, config.multi_value) {
            (FieldType::String, false) => FieldCodec::Str,
            (FieldType::String, true) => FieldCodec::MultiStr,
            (field_type, false) => FieldCodec::Scalar { field_type },
            (field_type, true) => match config.fixed_multi_count {
                Some(count) => FieldCodec::CountedMulti { field_type, count },
                None => FieldCodec::InlineMulti { field_type },
            },
        }
    }
}

/// Untyped accessor over one member of a pack record.
///
/// A reference is immutable after construction, so one instance can serve
/// any number of concurrent readers, each call works on a caller provided
/// record. Writers go through a [RecordBuffer] and serialize per record.
#[derive(Debug, Clone)]
pub struct AttributeReference {
    attr_name: String,
    offset: u32,
    slot_len: u32,
    codec: FieldCodec,
}

impl AttributeReference {
    /// Creates a reference to the `member_index`-th member of `pack`.
    pub fn new(pack: &PackAttributeConfig, member_index: usize) -> Result<AttributeReference> {
        let config = pack
            .sub_attributes
            .get(member_index)
            .context(InvalidMetaSnafu {
                reason: format!(
                    "pack {} has {} members, no member {}",
                    pack.pack_name,
                    pack.member_count(),
                    member_index
                ),
            })?;
        Ok(AttributeReference {
            attr_name: config.attr_name.clone(),
            offset: pack.member_offsets()[member_index],
            slot_len: config.fixed_slot_len().unwrap_or(VAR_OFFSET_SLOT_LEN),
            codec: FieldCodec::resolve(config),
        })
    }

    pub fn attr_name(&self) -> &str {
        &self.attr_name
    }

    /// Offset of this member's slot in the fixed record region.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn codec(&self) -> &FieldCodec {
        &self.codec
    }

    /// This member's slot in the fixed region of `record`.
    fn fixed_span<'a>(&self, record: &'a [u8]) -> Result<&'a [u8]> {
        let offset = self.offset as usize;
        let end = offset + self.slot_len as usize;
        ensure!(
            end <= record.len(),
            InvalidRecordSnafu {
                reason: format!(
                    "record of {} bytes is too short for attribute {} at {}..{}",
                    record.len(),
                    self.attr_name,
                    offset,
                    end
                ),
            }
        );
        Ok(&record[offset..end])
    }

    /// Tail of `record` starting at this member's variable length value.
    fn var_value<'a>(&self, record: &'a [u8]) -> Result<&'a [u8]> {
        let span = self.fixed_span(record)?;
        let displacement = u32::from_le_bytes([span[0], span[1], span[2], span[3]]);
        let value_pos = self.offset as usize + displacement as usize;
        ensure!(
            value_pos <= record.len(),
            InvalidRecordSnafu {
                reason: format!(
                    "attribute {} points {} bytes past the record end",
                    self.attr_name,
                    value_pos - record.len()
                ),
            }
        );
        Ok(&record[value_pos..])
    }

    fn check_buffer(&self, buffer: &RecordBuffer) -> Result<()> {
        let end = (self.offset + self.slot_len) as usize;
        ensure!(
            end <= buffer.fixed_len(),
            InvalidRecordSnafu {
                reason: format!(
                    "record buffer of {} bytes is too small for attribute {} at {}..{}",
                    buffer.fixed_len(),
                    self.attr_name,
                    self.offset,
                    end
                ),
            }
        );
        Ok(())
    }

    /// Raw encoded bytes of this member's value, without length headers.
    pub fn raw_value<'a>(&self, record: &'a [u8]) -> Result<&'a [u8]> {
        match &self.codec {
            FieldCodec::Scalar { .. }
            | FieldCodec::CountedMulti { .. }
            | FieldCodec::CompressedFloat { count: Some(_), .. } => self.fixed_span(record),
            FieldCodec::InlineMulti { field_type } => {
                let tail = self.var_value(record)?;
                with_native_type!(*field_type, inline_span(tail))
            }
            FieldCodec::Str => {
                let tail = self.var_value(record)?;
                let (len, read) = decode_varint_u32(tail)?;
                sub_span(tail, read, len as usize)
            }
            FieldCodec::MultiStr => {
                let tail = self.var_value(record)?;
                let (count, start) = decode_varint_u32(tail)?;
                let mut pos = start;
                for _ in 0..count {
                    let (len, read) = decode_varint_u32(&tail[pos..])?;
                    pos += read + len as usize;
                    ensure!(
                        pos <= tail.len(),
                        InvalidRecordSnafu {
                            reason: "multi string payload truncated",
                        }
                    );
                }
                Ok(&tail[start..pos])
            }
            FieldCodec::CompressedFloat {
                compress,
                count: None,
            } => {
                let tail = self.var_value(record)?;
                let (count, read) = decode_varint_u32(tail)?;
                sub_span(tail, read, compress.encoded_len(count) as usize)
            }
        }
    }

    /// Formats this member's value as one string, multi values joined with
    /// [MULTI_VALUE_SEPARATOR]. Fixed length char arrays read as one string.
    pub fn format_value(&self, record: &[u8]) -> Result<String> {
        match &self.codec {
            FieldCodec::Scalar {
                field_type: FieldType::Char,
            } => {
                let span = self.fixed_span(record)?;
                Ok((span[0] as char).to_string())
            }
            FieldCodec::Scalar { field_type } => {
                let span = self.fixed_span(record)?;
                Ok(with_native_type!(*field_type, format_scalar(span)))
            }
            FieldCodec::CountedMulti {
                field_type: FieldType::Char,
                ..
            } => {
                let span = self.fixed_span(record)?;
                Ok(String::from_utf8_lossy(span).into_owned())
            }
            FieldCodec::CountedMulti { field_type, .. } => {
                let span = self.fixed_span(record)?;
                with_native_type!(*field_type, format_values(span))
            }
            FieldCodec::InlineMulti { field_type } => {
                let payload = self.raw_value(record)?;
                with_native_type!(*field_type, format_values(payload))
            }
            FieldCodec::Str => Ok(self.get_string(record)?.to_string()),
            FieldCodec::MultiStr => {
                let items = self.get_multi_string(record)?;
                Ok(join_displayed(&items))
            }
            FieldCodec::CompressedFloat { compress, .. } => {
                let payload = self.raw_value(record)?;
                let values = float_compress::decode(*compress, payload)?;
                Ok(join_displayed(&values))
            }
        }
    }

    /// Orders the value in `left` against the value in `right`.
    ///
    /// Only single fixed width values have an order here, every other codec
    /// fails with an unsupported error.
    pub fn less_than(&self, left: &[u8], right: &[u8]) -> Result<bool> {
        match &self.codec {
            FieldCodec::Scalar { field_type } => {
                let a = self.fixed_span(left)?;
                let b = self.fixed_span(right)?;
                Ok(with_native_type!(*field_type, less_than_spans(a, b)))
            }
            FieldCodec::CompressedFloat {
                compress,
                count: Some(1),
            } => {
                let a = float_compress::decode(*compress, self.fixed_span(left)?)?;
                let b = float_compress::decode(*compress, self.fixed_span(right)?)?;
                Ok(a[0] < b[0])
            }
            _ => UnsupportedSnafu {
                reason: format!(
                    "attribute {} is not a single fixed width value, can not compare",
                    self.attr_name
                ),
            }
            .fail(),
        }
    }

    /// Reads a single string member.
    pub fn get_string<'a>(&self, record: &'a [u8]) -> Result<&'a str> {
        ensure!(
            self.codec == FieldCodec::Str,
            UnsupportedSnafu {
                reason: format!("attribute {} is not a single string", self.attr_name),
            }
        );
        let tail = self.var_value(record)?;
        let (len, read) = decode_varint_u32(tail)?;
        let span = sub_span(tail, read, len as usize)?;
        std::str::from_utf8(span).context(Utf8Snafu)
    }

    /// Writes a single string member, returns the variable bytes consumed.
    pub fn set_string(&self, buffer: &mut RecordBuffer, value: &str) -> Result<usize> {
        ensure!(
            self.codec == FieldCodec::Str,
            UnsupportedSnafu {
                reason: format!("attribute {} is not a single string", self.attr_name),
            }
        );
        self.check_buffer(buffer)?;
        let mut payload = Vec::with_capacity(5 + value.len());
        encode_varint_u32(value.len() as u32, &mut payload);
        payload.extend_from_slice(value.as_bytes());
        Ok(buffer.append_var(self.offset as usize, &payload))
    }

    /// Reads a multi string member.
    pub fn get_multi_string<'a>(&self, record: &'a [u8]) -> Result<Vec<&'a str>> {
        ensure!(
            self.codec == FieldCodec::MultiStr,
            UnsupportedSnafu {
                reason: format!("attribute {} is not a multi string", self.attr_name),
            }
        );
        let tail = self.var_value(record)?;
        let (count, mut pos) = decode_varint_u32(tail)?;
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (len, read) = decode_varint_u32(&tail[pos..])?;
            let span = sub_span(&tail[pos..], read, len as usize)?;
            items.push(std::str::from_utf8(span).context(Utf8Snafu)?);
            pos += read + len as usize;
        }
        Ok(items)
    }

    /// Writes a multi string member, returns the variable bytes consumed.
    pub fn set_multi_string(&self, buffer: &mut RecordBuffer, values: &[&str]) -> Result<usize> {
        ensure!(
            self.codec == FieldCodec::MultiStr,
            UnsupportedSnafu {
                reason: format!("attribute {} is not a multi string", self.attr_name),
            }
        );
        self.check_buffer(buffer)?;
        let mut payload = Vec::new();
        encode_varint_u32(values.len() as u32, &mut payload);
        for value in values {
            encode_varint_u32(value.len() as u32, &mut payload);
            payload.extend_from_slice(value.as_bytes());
        }
        Ok(buffer.append_var(self.offset as usize, &payload))
    }
}

/// Typed accessor over one member of a pack record.
///
/// The native type is checked against the member config once at
/// construction, the per document calls stay monomorphic.
#[derive(Debug, Clone)]
pub struct AttributeReferenceTyped<T> {
    reference: AttributeReference,
    _type: PhantomData<T>,
}

impl<T: NativeValue> AttributeReferenceTyped<T> {
    /// Creates a typed reference to the `member_index`-th member of `pack`,
    /// fails when `T` does not match the declared field type.
    pub fn try_new(pack: &PackAttributeConfig, member_index: usize) -> Result<Self> {
        let reference = AttributeReference::new(pack, member_index)?;
        let config = &pack.sub_attributes[member_index];
        ensure!(
            T::compatible_with(config.field_type),
            TypeMismatchSnafu {
                attr_name: config.attr_name.clone(),
                expect: T::FIELD_TYPE,
                actual: config.field_type,
            }
        );
        Ok(AttributeReferenceTyped {
            reference,
            _type: PhantomData,
        })
    }

    pub fn reference(&self) -> &AttributeReference {
        &self.reference
    }

    /// Reads a single value member.
    pub fn get_value(&self, record: &[u8]) -> Result<T> {
        match &self.reference.codec {
            FieldCodec::Scalar { .. } => {
                let span = self.reference.fixed_span(record)?;
                Ok(T::from_le_bytes(span))
            }
            FieldCodec::CompressedFloat {
                compress,
                count: Some(1),
            } => {
                let values = float_compress::decode(*compress, self.reference.fixed_span(record)?)?;
                // try_new pins T to f32 for compressed fields.
                Ok(bytemuck::cast(values[0]))
            }
            _ => UnsupportedSnafu {
                reason: format!(
                    "attribute {} is not single value",
                    self.reference.attr_name
                ),
            }
            .fail(),
        }
    }

    /// Reads a multi value member.
    pub fn get_multi_value<'a>(&self, record: &'a [u8]) -> Result<MultiValue<'a, T>> {
        match &self.reference.codec {
            FieldCodec::CountedMulti { count, .. } => {
                let span = self.reference.fixed_span(record)?;
                decode_values(span, *count as usize)
            }
            FieldCodec::InlineMulti { .. } => {
                let tail = self.reference.var_value(record)?;
                let payload = inline_span::<T>(tail)?;
                decode_values(payload, payload.len() / std::mem::size_of::<T>())
            }
            FieldCodec::CompressedFloat { compress, count } => {
                let values = match count {
                    Some(_) => {
                        let span = self.reference.fixed_span(record)?;
                        float_compress::decode(*compress, span)?
                    }
                    None => {
                        let tail = self.reference.var_value(record)?;
                        let (count, read) = decode_varint_u32(tail)?;
                        let span = sub_span(tail, read, compress.encoded_len(count) as usize)?;
                        float_compress::decode(*compress, span)?
                    }
                };
                Ok(MultiValue::Owned(bytemuck::cast_vec(values)))
            }
            _ => UnsupportedSnafu {
                reason: format!("attribute {} is not multi value", self.reference.attr_name),
            }
            .fail(),
        }
    }

    /// Writes a single value member, returns the variable bytes consumed,
    /// always zero for fixed width members.
    pub fn set_value(&self, buffer: &mut RecordBuffer, value: T) -> Result<usize> {
        match &self.reference.codec {
            FieldCodec::Scalar { .. } => {
                self.reference.check_buffer(buffer)?;
                let offset = self.reference.offset as usize;
                value.copy_le_bytes(buffer.fixed_mut(offset, std::mem::size_of::<T>()));
                Ok(0)
            }
            FieldCodec::CompressedFloat {
                compress,
                count: Some(1),
            } => {
                self.reference.check_buffer(buffer)?;
                let mut payload = Vec::with_capacity(self.reference.slot_len as usize);
                float_compress::encode(*compress, &[bytemuck::cast(value)], &mut payload);
                let offset = self.reference.offset as usize;
                buffer
                    .fixed_mut(offset, payload.len())
                    .copy_from_slice(&payload);
                Ok(0)
            }
            _ => UnsupportedSnafu {
                reason: format!(
                    "attribute {} is not single value",
                    self.reference.attr_name
                ),
            }
            .fail(),
        }
    }

    /// Writes a multi value member, returns the variable bytes consumed.
    pub fn set_multi_value(&self, buffer: &mut RecordBuffer, values: &[T]) -> Result<usize> {
        match &self.reference.codec {
            FieldCodec::CountedMulti { count, .. } => {
                self.check_value_count(values.len(), *count)?;
                self.reference.check_buffer(buffer)?;
                let width = std::mem::size_of::<T>();
                let offset = self.reference.offset as usize;
                let span = buffer.fixed_mut(offset, width * values.len());
                for (index, value) in values.iter().enumerate() {
                    value.copy_le_bytes(&mut span[index * width..(index + 1) * width]);
                }
                Ok(0)
            }
            FieldCodec::InlineMulti { .. } => {
                self.reference.check_buffer(buffer)?;
                let mut payload =
                    Vec::with_capacity(5 + values.len() * std::mem::size_of::<T>());
                encode_varint_u32(values.len() as u32, &mut payload);
                for value in values {
                    value.write_le_bytes(&mut payload);
                }
                Ok(buffer.append_var(self.reference.offset as usize, &payload))
            }
            FieldCodec::CompressedFloat { compress, count } => {
                // try_new pins T to f32 for compressed fields.
                let floats: &[f32] = bytemuck::cast_slice(values);
                match count {
                    Some(count) => {
                        self.check_value_count(floats.len(), *count)?;
                        self.reference.check_buffer(buffer)?;
                        let mut payload = Vec::with_capacity(self.reference.slot_len as usize);
                        float_compress::encode(*compress, floats, &mut payload);
                        let offset = self.reference.offset as usize;
                        buffer
                            .fixed_mut(offset, payload.len())
                            .copy_from_slice(&payload);
                        Ok(0)
                    }
                    None => {
                        self.reference.check_buffer(buffer)?;
                        let mut payload = Vec::new();
                        encode_varint_u32(floats.len() as u32, &mut payload);
                        float_compress::encode(*compress, floats, &mut payload);
                        Ok(buffer.append_var(self.reference.offset as usize, &payload))
                    }
                }
            }
            _ => UnsupportedSnafu {
                reason: format!("attribute {} is not multi value", self.reference.attr_name),
            }
            .fail(),
        }
    }

    fn check_value_count(&self, got: usize, expect: u32) -> Result<()> {
        ensure!(
            got == expect as usize,
            InvalidRecordSnafu {
                reason: format!(
                    "attribute {} expects {} values, got {}",
                    self.reference.attr_name, expect, got
                ),
            }
        );
        Ok(())
    }
}

fn sub_span(tail: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    ensure!(
        start + len <= tail.len(),
        InvalidRecordSnafu {
            reason: format!(
                "value payload truncated, need {} bytes, got {}",
                start + len,
                tail.len()
            ),
        }
    );
    Ok(&tail[start..start + len])
}

fn inline_span<T: NativeValue>(tail: &[u8]) -> Result<&[u8]> {
    let (count, read) = decode_varint_u32(tail)?;
    sub_span(tail, read, count as usize * std::mem::size_of::<T>())
}

fn format_scalar<T: NativeValue>(span: &[u8]) -> String {
    T::from_le_bytes(span).to_string()
}

fn format_values<T: NativeValue>(payload: &[u8]) -> Result<String> {
    let count = payload.len() / std::mem::size_of::<T>();
    let values = decode_values::<T>(payload, count)?;
    Ok(join_displayed(values.as_slice()))
}

fn less_than_spans<T: NativeValue>(a: &[u8], b: &[u8]) -> bool {
    T::from_le_bytes(a) < T::from_le_bytes(b)
}

fn join_displayed<T: std::fmt::Display>(values: &[T]) -> String {
    let mut out = String::new();
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            out.push(MULTI_VALUE_SEPARATOR);
        }
        out.push_str(&value.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use paste::paste;
    use store_api::metadata::CompressType;

    use super::*;

    fn single_member_pack(config: AttributeConfig) -> PackAttributeConfig {
        PackAttributeConfig::new("test_pack", vec![config]).unwrap()
    }

    macro_rules! test_scalar_round_trip {
        ($($type: ident, $field_type: ident, $value: expr);*) => {
            $(
                paste! {
                    #[test]
                    fn [<test_scalar_round_trip_ $type>]() {
                        let pack = single_member_pack(AttributeConfig::new(
                            "field",
                            FieldType::$field_type,
                        ));
                        let reference =
                            AttributeReferenceTyped::<$type>::try_new(&pack, 0).unwrap();
                        let mut buffer = RecordBuffer::for_pack(&pack);
                        assert_eq!(0, reference.set_value(&mut buffer, $value).unwrap());
                        let record = buffer.finish();
                        assert_eq!($value, reference.get_value(&record).unwrap());
                    }
                }
            )*
        };
    }

    test_scalar_round_trip!(
        i8, Int8, -100i8;
        i16, Int16, -30_000i16;
        i32, Int32, 123_456i32;
        i64, Int64, -9_876_543_210i64;
        u8, UInt8, 200u8;
        u16, UInt16, 60_000u16;
        u32, UInt32, 4_000_000_000u32;
        u64, UInt64, 18_000_000_000_000_000_000u64;
        f32, Float32, -1.5f32;
        f64, Float64, 2.25f64
    );

    #[test]
    fn test_char_scalar() {
        let pack = single_member_pack(AttributeConfig::new("flag", FieldType::Char));
        let reference = AttributeReferenceTyped::<u8>::try_new(&pack, 0).unwrap();
        let mut buffer = RecordBuffer::for_pack(&pack);
        reference.set_value(&mut buffer, b'x').unwrap();
        let record = buffer.finish();
        assert_eq!(1, record.len());
        assert_eq!(b'x', reference.get_value(&record).unwrap());
        assert_eq!("x", reference.reference().format_value(&record).unwrap());
    }

    #[test]
    fn test_type_mismatch() {
        let pack = single_member_pack(AttributeConfig::new("price", FieldType::Int64));
        let err = AttributeReferenceTyped::<i32>::try_new(&pack, 0).unwrap_err();
        assert!(
            err.to_string().contains("stores int64 values"),
            "unexpected err: {err}",
        );
        AttributeReferenceTyped::<i64>::try_new(&pack, 0).unwrap();
    }

    #[test]
    fn test_member_index_out_of_range() {
        let pack = single_member_pack(AttributeConfig::new("a", FieldType::Int32));
        let err = AttributeReference::new(&pack, 1).unwrap_err();
        assert!(err.to_string().contains("no member 1"));
    }

    fn mixed_pack() -> PackAttributeConfig {
        PackAttributeConfig::new(
            "mixed",
            vec![
                AttributeConfig::new("count", FieldType::UInt32),
                AttributeConfig::new("flag", FieldType::Char),
                AttributeConfig::new("dims", FieldType::Int16).with_fixed_multi_count(3),
                AttributeConfig::new("ids", FieldType::Int64).with_multi_value(),
                AttributeConfig::new("name", FieldType::String),
                AttributeConfig::new("aliases", FieldType::String).with_multi_value(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_pack_record_round_trip() {
        let pack = mixed_pack();
        // 4 + 1 + 6 then three offset slots.
        assert_eq!(&[0, 4, 5, 11, 15, 19], pack.member_offsets());
        assert_eq!(23, pack.record_fixed_len());

        let count = AttributeReferenceTyped::<u32>::try_new(&pack, 0).unwrap();
        let flag = AttributeReferenceTyped::<u8>::try_new(&pack, 1).unwrap();
        let dims = AttributeReferenceTyped::<i16>::try_new(&pack, 2).unwrap();
        let ids = AttributeReferenceTyped::<i64>::try_new(&pack, 3).unwrap();
        let name = AttributeReference::new(&pack, 4).unwrap();
        let aliases = AttributeReference::new(&pack, 5).unwrap();

        let mut buffer = RecordBuffer::for_pack(&pack);
        assert_eq!(0, count.set_value(&mut buffer, 42).unwrap());
        assert_eq!(0, flag.set_value(&mut buffer, b'y').unwrap());
        assert_eq!(0, dims.set_multi_value(&mut buffer, &[3, -4, 5]).unwrap());
        // varint count + 2 * 8 bytes.
        assert_eq!(17, ids.set_multi_value(&mut buffer, &[10, -20]).unwrap());
        assert_eq!(6, name.set_string(&mut buffer, "attr0").unwrap());
        assert_eq!(8, aliases.set_multi_string(&mut buffer, &["a0", "a00"]).unwrap());

        let record = buffer.finish();
        assert_eq!(23 + 17 + 6 + 8, record.len());

        assert_eq!(42, count.get_value(&record).unwrap());
        assert_eq!(b'y', flag.get_value(&record).unwrap());
        assert_eq!(&[3, -4, 5], dims.get_multi_value(&record).unwrap().as_slice());
        assert_eq!(&[10, -20], ids.get_multi_value(&record).unwrap().as_slice());
        assert_eq!("attr0", name.get_string(&record).unwrap());
        assert_eq!(vec!["a0", "a00"], aliases.get_multi_string(&record).unwrap());
    }

    #[test]
    fn test_set_order_does_not_matter_for_fixed_members() {
        let pack = mixed_pack();
        let count = AttributeReferenceTyped::<u32>::try_new(&pack, 0).unwrap();
        let name = AttributeReference::new(&pack, 4).unwrap();

        let mut buffer = RecordBuffer::for_pack(&pack);
        name.set_string(&mut buffer, "later").unwrap();
        count.set_value(&mut buffer, 7).unwrap();
        let record = buffer.finish();
        assert_eq!(7, count.get_value(&record).unwrap());
        assert_eq!("later", name.get_string(&record).unwrap());
    }

    #[test]
    fn test_empty_var_values() {
        let pack = mixed_pack();
        let ids = AttributeReferenceTyped::<i64>::try_new(&pack, 3).unwrap();
        let name = AttributeReference::new(&pack, 4).unwrap();
        let aliases = AttributeReference::new(&pack, 5).unwrap();

        let mut buffer = RecordBuffer::for_pack(&pack);
        // An empty value still writes its varint count.
        assert_eq!(1, ids.set_multi_value(&mut buffer, &[]).unwrap());
        assert_eq!(1, name.set_string(&mut buffer, "").unwrap());
        assert_eq!(1, aliases.set_multi_string(&mut buffer, &[]).unwrap());

        let record = buffer.finish();
        assert!(ids.get_multi_value(&record).unwrap().is_empty());
        assert_eq!("", name.get_string(&record).unwrap());
        assert!(aliases.get_multi_string(&record).unwrap().is_empty());
    }

    #[test]
    fn test_counted_multi_value_count() {
        let pack = mixed_pack();
        let dims = AttributeReferenceTyped::<i16>::try_new(&pack, 2).unwrap();
        let mut buffer = RecordBuffer::for_pack(&pack);
        let err = dims.set_multi_value(&mut buffer, &[1, 2]).unwrap_err();
        assert!(err.to_string().contains("expects 3 values, got 2"));
    }

    #[test]
    fn test_format_value() {
        let pack = mixed_pack();
        let dims = AttributeReferenceTyped::<i16>::try_new(&pack, 2).unwrap();
        let ids = AttributeReferenceTyped::<i64>::try_new(&pack, 3).unwrap();
        let aliases = AttributeReference::new(&pack, 5).unwrap();

        let mut buffer = RecordBuffer::for_pack(&pack);
        dims.set_multi_value(&mut buffer, &[3, -4, 5]).unwrap();
        ids.set_multi_value(&mut buffer, &[10, -20]).unwrap();
        aliases.set_multi_string(&mut buffer, &["a0", "a00"]).unwrap();
        let record = buffer.finish();

        assert_eq!(
            "3\u{1d}-4\u{1d}5",
            dims.reference().format_value(&record).unwrap()
        );
        assert_eq!(
            "10\u{1d}-20",
            ids.reference().format_value(&record).unwrap()
        );
        assert_eq!("a0\u{1d}a00", aliases.format_value(&record).unwrap());
    }

    #[test]
    fn test_fixed_char_array_formats_as_string() {
        let pack = single_member_pack(
            AttributeConfig::new("code", FieldType::Char).with_fixed_multi_count(4),
        );
        let code = AttributeReferenceTyped::<u8>::try_new(&pack, 0).unwrap();
        let mut buffer = RecordBuffer::for_pack(&pack);
        code.set_multi_value(&mut buffer, b"ABCD").unwrap();
        let record = buffer.finish();
        assert_eq!("ABCD", code.reference().format_value(&record).unwrap());
    }

    #[test]
    fn test_raw_value_spans() {
        let pack = mixed_pack();
        let count = AttributeReferenceTyped::<u32>::try_new(&pack, 0).unwrap();
        let ids = AttributeReferenceTyped::<i64>::try_new(&pack, 3).unwrap();
        let name = AttributeReference::new(&pack, 4).unwrap();

        let mut buffer = RecordBuffer::for_pack(&pack);
        count.set_value(&mut buffer, 42).unwrap();
        ids.set_multi_value(&mut buffer, &[10, -20]).unwrap();
        name.set_string(&mut buffer, "attr0").unwrap();
        let record = buffer.finish();

        assert_eq!(&42u32.to_le_bytes(), count.reference().raw_value(&record).unwrap());
        // Headers are not part of the raw span.
        assert_eq!(16, ids.reference().raw_value(&record).unwrap().len());
        assert_eq!(b"attr0", name.raw_value(&record).unwrap());
    }

    #[test]
    fn test_less_than() {
        let pack = single_member_pack(AttributeConfig::new("rank", FieldType::Int32));
        let rank = AttributeReferenceTyped::<i32>::try_new(&pack, 0).unwrap();
        let mut low = RecordBuffer::for_pack(&pack);
        rank.set_value(&mut low, -5).unwrap();
        let low = low.finish();
        let mut high = RecordBuffer::for_pack(&pack);
        rank.set_value(&mut high, 9).unwrap();
        let high = high.finish();

        let reference = rank.reference();
        assert!(reference.less_than(&low, &high).unwrap());
        assert!(!reference.less_than(&high, &low).unwrap());
        assert!(!reference.less_than(&low, &low).unwrap());
    }

    #[test]
    fn test_less_than_unsupported() {
        let pack = mixed_pack();
        let ids = AttributeReference::new(&pack, 3).unwrap();
        let name = AttributeReference::new(&pack, 4).unwrap();
        let record = RecordBuffer::for_pack(&pack).finish();
        assert!(ids.less_than(&record, &record).unwrap_err().to_string().contains("can not compare"));
        assert!(name.less_than(&record, &record).unwrap_err().to_string().contains("can not compare"));
    }

    #[test]
    fn test_compressed_scalar() {
        let pack = single_member_pack(
            AttributeConfig::new("ratio", FieldType::Float32)
                .with_compress_type(CompressType::fp16()),
        );
        assert_eq!(2, pack.record_fixed_len());
        let ratio = AttributeReferenceTyped::<f32>::try_new(&pack, 0).unwrap();
        let mut buffer = RecordBuffer::for_pack(&pack);
        ratio.set_value(&mut buffer, 1.5).unwrap();
        let record = buffer.finish();
        assert_eq!(2, record.len());
        assert_eq!(1.5, ratio.get_value(&record).unwrap());

        let mut other = RecordBuffer::for_pack(&pack);
        ratio.set_value(&mut other, 2.5).unwrap();
        let other = other.finish();
        assert!(ratio.reference().less_than(&record, &other).unwrap());
    }

    #[test]
    fn test_compressed_fixed_multi() {
        let pack = single_member_pack(
            AttributeConfig::new("embedding", FieldType::Float32)
                .with_fixed_multi_count(4)
                .with_compress_type(CompressType::int8()),
        );
        // f32 scale + 4 bytes.
        assert_eq!(8, pack.record_fixed_len());
        let embedding = AttributeReferenceTyped::<f32>::try_new(&pack, 0).unwrap();
        let mut buffer = RecordBuffer::for_pack(&pack);
        let values = [0.5f32, -1.0, 0.25, 0.0];
        embedding.set_multi_value(&mut buffer, &values).unwrap();
        let record = buffer.finish();
        assert_eq!(8, record.len());

        let decoded = embedding.get_multi_value(&record).unwrap();
        for (e, a) in values.iter().zip(decoded.as_slice()) {
            assert!((e - a).abs() <= 1.0 / 254.0 + f32::EPSILON);
        }

        let err = embedding
            .set_multi_value(&mut RecordBuffer::for_pack(&pack), &values[..2])
            .unwrap_err();
        assert!(err.to_string().contains("expects 4 values"));
    }

    #[test]
    fn test_compressed_var_multi() {
        let pack = single_member_pack(
            AttributeConfig::new("weights", FieldType::Float32)
                .with_multi_value()
                .with_compress_type(CompressType::fp16()),
        );
        // Variable length, only the offset slot is fixed.
        assert_eq!(4, pack.record_fixed_len());
        let weights = AttributeReferenceTyped::<f32>::try_new(&pack, 0).unwrap();
        let mut buffer = RecordBuffer::for_pack(&pack);
        let consumed = weights
            .set_multi_value(&mut buffer, &[1.5, -0.25, 8.0])
            .unwrap();
        // varint count + three halves.
        assert_eq!(7, consumed);
        let record = buffer.finish();
        assert_eq!(
            &[1.5, -0.25, 8.0],
            weights.get_multi_value(&record).unwrap().as_slice()
        );
        assert_eq!(
            "1.5\u{1d}-0.25\u{1d}8",
            weights.reference().format_value(&record).unwrap()
        );
    }

    #[test]
    fn test_truncated_record() {
        let pack = mixed_pack();
        let count = AttributeReferenceTyped::<u32>::try_new(&pack, 0).unwrap();
        let ids = AttributeReferenceTyped::<i64>::try_new(&pack, 3).unwrap();

        let err = count.get_value(&[0u8; 2]).unwrap_err();
        assert!(err.to_string().contains("too short"));

        // A full fixed region whose offset slot points past the end.
        let mut record = RecordBuffer::for_pack(&pack).finish();
        record[11..15].copy_from_slice(&100u32.to_le_bytes());
        let err = ids.get_multi_value(&record).unwrap_err();
        assert!(err.to_string().contains("past the record end"));

        // A count that promises more bytes than the record holds.
        let mut buffer = RecordBuffer::for_pack(&pack);
        ids.set_multi_value(&mut buffer, &[1]).unwrap();
        let mut record = buffer.finish();
        let varint_pos = 23;
        record[varint_pos] = 9;
        let err = ids.get_multi_value(&record).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_buffer_too_small() {
        let pack = mixed_pack();
        let dims = AttributeReferenceTyped::<i16>::try_new(&pack, 2).unwrap();
        let mut buffer = RecordBuffer::new(3);
        let err = dims.set_multi_value(&mut buffer, &[1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn test_get_value_shape_errors() {
        let pack = mixed_pack();
        let count = AttributeReferenceTyped::<u32>::try_new(&pack, 0).unwrap();
        let dims = AttributeReferenceTyped::<i16>::try_new(&pack, 2).unwrap();
        let record = RecordBuffer::for_pack(&pack).finish();

        let err = dims.get_value(&record).unwrap_err();
        assert!(err.to_string().contains("not single value"));
        let err = count.get_multi_value(&record).unwrap_err();
        assert!(err.to_string().contains("not multi value"));
    }
}
