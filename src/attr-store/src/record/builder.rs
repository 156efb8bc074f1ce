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

use store_api::metadata::PackAttributeConfig;

/// Write buffer for one record.
///
/// The fixed region is zero filled up front so members may be set in any
/// order, the variable region grows at the back as variable length values
/// are appended. [RecordBuffer::finish] returns the contiguous record.
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    fixed: Vec<u8>,
    var: Vec<u8>,
}

impl RecordBuffer {
    pub fn new(fixed_len: usize) -> RecordBuffer {
        RecordBuffer {
            fixed: vec![0; fixed_len],
            var: Vec::new(),
        }
    }

    pub fn for_pack(pack: &PackAttributeConfig) -> RecordBuffer {
        RecordBuffer::new(pack.record_fixed_len() as usize)
    }

    pub fn fixed_len(&self) -> usize {
        self.fixed.len()
    }

    pub fn var_len(&self) -> usize {
        self.var.len()
    }

    /// Mutable view of `len` bytes at `offset` in the fixed region. Callers
    /// check bounds against [RecordBuffer::fixed_len] first.
    pub(crate) fn fixed_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.fixed[offset..offset + len]
    }

    /// Appends `payload` to the variable region and points the offset slot
    /// at `slot_offset` to it. Returns the variable bytes consumed.
    pub(crate) fn append_var(&mut self, slot_offset: usize, payload: &[u8]) -> usize {
        let value_pos = self.fixed.len() + self.var.len();
        let displacement = (value_pos - slot_offset) as u32;
        self.fixed[slot_offset..slot_offset + 4].copy_from_slice(&displacement.to_le_bytes());
        self.var.extend_from_slice(payload);
        payload.len()
    }

    /// Returns the contiguous record bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.fixed.append(&mut self.var);
        self.fixed
    }
}
