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

//! Lossy float32 codecs.
//!
//! All three codecs trade precision for space:
//! - `fp16` stores IEEE half floats, two bytes per value.
//! - `int8` stores a shared f32 scale followed by one signed byte per value,
//!   quantized symmetrically around zero.
//! - `block_fp` stores one shared exponent byte followed by an i16 mantissa
//!   per value.
//!
//! Encoded lengths must agree with
//! [FloatCompressType::encoded_len](store_api::metadata::FloatCompressType::encoded_len)
//! since pack record layouts are computed from it.

use half::f16;
use snafu::ensure;
use store_api::metadata::FloatCompressType;

use crate::error::{InvalidRecordSnafu, Result};

const INT8_MAX: f32 = 127.0;
const BLOCK_FP_FRACTION_BITS: i32 = 15;

/// Encodes `values` with `compress` and appends the result to `buf`.
pub fn encode(compress: FloatCompressType, values: &[f32], buf: &mut Vec<u8>) {
    match compress {
        FloatCompressType::None => {
            for value in values {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
        FloatCompressType::Fp16 => encode_fp16(values, buf),
        FloatCompressType::Int8 => encode_int8(values, buf),
        FloatCompressType::BlockFp => encode_block_fp(values, buf),
    }
}

/// Decodes all values out of `bytes`. The value count is derived from the
/// payload length.
pub fn decode(compress: FloatCompressType, bytes: &[u8]) -> Result<Vec<f32>> {
    match compress {
        FloatCompressType::None => {
            ensure_payload(bytes.len(), 0, 4)?;
            Ok(bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect())
        }
        FloatCompressType::Fp16 => decode_fp16(bytes),
        FloatCompressType::Int8 => decode_int8(bytes),
        FloatCompressType::BlockFp => decode_block_fp(bytes),
    }
}

fn ensure_payload(len: usize, header: usize, width: usize) -> Result<()> {
    ensure!(
        len >= header && (len - header) % width == 0,
        InvalidRecordSnafu {
            reason: format!("compressed float payload has invalid length {len}"),
        }
    );
    Ok(())
}

fn encode_fp16(values: &[f32], buf: &mut Vec<u8>) {
    for value in values {
        buf.extend_from_slice(&f16::from_f32(*value).to_le_bytes());
    }
}

fn decode_fp16(bytes: &[u8]) -> Result<Vec<f32>> {
    ensure_payload(bytes.len(), 0, 2)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| f16::from_le_bytes([chunk[0], chunk[1]]).to_f32())
        .collect())
}

fn encode_int8(values: &[f32], buf: &mut Vec<u8>) {
    let scale = values.iter().fold(0f32, |max, v| max.max(v.abs()));
    buf.extend_from_slice(&scale.to_le_bytes());
    let inverse = if scale == 0.0 { 0.0 } else { INT8_MAX / scale };
    for value in values {
        let quantized = (value * inverse).round().clamp(-INT8_MAX, INT8_MAX) as i8;
        buf.push(quantized as u8);
    }
}

fn decode_int8(bytes: &[u8]) -> Result<Vec<f32>> {
    ensure_payload(bytes.len(), 4, 1)?;
    let scale = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Ok(bytes[4..]
        .iter()
        .map(|byte| (*byte as i8) as f32 * scale / INT8_MAX)
        .collect())
}

fn encode_block_fp(values: &[f32], buf: &mut Vec<u8>) {
    // Shared exponent such that every |value| <= 2^exponent.
    let exponent = values
        .iter()
        .filter(|v| **v != 0.0)
        .map(|v| v.abs().log2().floor() as i32 + 1)
        .max()
        .unwrap_or(0)
        .clamp(i8::MIN as i32, i8::MAX as i32);
    buf.push(exponent as i8 as u8);

    let factor = 2f32.powi(BLOCK_FP_FRACTION_BITS - exponent);
    for value in values {
        let mantissa = (value * factor)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        buf.extend_from_slice(&mantissa.to_le_bytes());
    }
}

fn decode_block_fp(bytes: &[u8]) -> Result<Vec<f32>> {
    ensure_payload(bytes.len(), 1, 2)?;
    let exponent = bytes[0] as i8 as i32;
    let factor = 2f32.powi(exponent - BLOCK_FP_FRACTION_BITS);
    Ok(bytes[1..]
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 * factor)
        .collect())
}
