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

//! In memory tracking of which documents received in place updates.

use common_base::BitVec;
use object_store::ObjectStore;
use store_api::storage::{DocId, SegmentId};

use crate::error::Result;
use crate::metrics::{UPDATE_BITMAP_BYTES, UPDATE_DOCS_DROPPED_TOTAL, UPDATE_DOCS_TOTAL};
use crate::segment::PartitionData;
use crate::update::info::{AttributeUpdateInfo, SegmentUpdateInfo};

/// One bit per document of a sealed segment, set when the document was
/// updated after the seal.
#[derive(Debug, Clone)]
pub struct SegmentUpdateBitmap {
    segment_id: SegmentId,
    bits: BitVec,
}

impl SegmentUpdateBitmap {
    fn new(segment_id: SegmentId, doc_count: u32) -> SegmentUpdateBitmap {
        SegmentUpdateBitmap {
            segment_id,
            bits: BitVec::repeat(false, doc_count as usize),
        }
    }

    pub fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    pub fn doc_count(&self) -> u32 {
        self.bits.len() as u32
    }

    pub fn is_updated(&self, local_doc_id: DocId) -> bool {
        self.bits
            .get(local_doc_id as usize)
            .map(|bit| *bit)
            .unwrap_or(false)
    }

    /// Number of documents with at least one update.
    pub fn update_doc_count(&self) -> u32 {
        self.bits.count_ones() as u32
    }

    pub fn memory_usage(&self) -> usize {
        self.bits.as_raw_slice().len()
    }

    fn set(&mut self, local_doc_id: DocId) {
        self.bits.set(local_doc_id as usize, true);
    }
}

/// Update tracking over all segments of one partition view, for one pack
/// attribute.
///
/// Bound to a [PartitionData] at construction. Per segment bitmaps are
/// created on first touch, segments without updates stay empty. One writer
/// mutates the bitmap during the accept phase and dumps it afterwards,
/// the next cycle starts from a fresh instance over the new view.
#[derive(Debug)]
pub struct AttributeUpdateBitmap {
    partition: PartitionData,
    /// Parallel to `partition.segments()`.
    bitmaps: Vec<Option<SegmentUpdateBitmap>>,
}

impl AttributeUpdateBitmap {
    pub fn new(partition: &PartitionData) -> AttributeUpdateBitmap {
        AttributeUpdateBitmap {
            partition: partition.clone(),
            bitmaps: vec![None; partition.segments().len()],
        }
    }

    /// Marks a global doc id as updated.
    ///
    /// Ids beyond the bound view are dropped silently, the document was
    /// merged away or the view is stale, neither is an error.
    pub fn set(&mut self, global_doc_id: DocId) {
        let Some((index, local_doc_id)) = self.partition.locate(global_doc_id) else {
            UPDATE_DOCS_DROPPED_TOTAL.inc();
            return;
        };
        let bitmap = self.bitmaps[index].get_or_insert_with(|| {
            let view = &self.partition.segments()[index];
            let bitmap = SegmentUpdateBitmap::new(view.segment_id(), view.doc_count());
            UPDATE_BITMAP_BYTES.add(bitmap.memory_usage() as i64);
            bitmap
        });
        bitmap.set(local_doc_id);
        UPDATE_DOCS_TOTAL.inc();
    }

    /// The bitmap of a segment, `None` when it received no updates.
    pub fn segment_bitmap(&self, segment_id: SegmentId) -> Option<&SegmentUpdateBitmap> {
        let index = self
            .partition
            .segments()
            .binary_search_by_key(&segment_id, |view| view.segment_id())
            .ok()?;
        self.bitmaps[index].as_ref()
    }

    /// Bytes held by the created segment bitmaps.
    pub fn memory_usage(&self) -> usize {
        self.bitmaps
            .iter()
            .flatten()
            .map(|bitmap| bitmap.memory_usage())
            .sum()
    }

    /// Collects the update counts of all touched segments.
    pub fn to_update_info(&self) -> Result<AttributeUpdateInfo> {
        let mut info = AttributeUpdateInfo::default();
        for bitmap in self.bitmaps.iter().flatten() {
            info.add(SegmentUpdateInfo {
                update_segment_id: bitmap.segment_id(),
                update_doc_count: bitmap.update_doc_count(),
            })?;
        }
        Ok(info)
    }

    /// Writes the update info file into `attribute_dir` and returns it,
    /// `Ok(None)` without touching storage when nothing was updated.
    pub async fn dump(
        &self,
        object_store: &ObjectStore,
        attribute_dir: &str,
    ) -> Result<Option<AttributeUpdateInfo>> {
        let info = self.to_update_info()?;
        if info.is_empty() {
            return Ok(None);
        }
        info.store(object_store, attribute_dir).await?;
        Ok(Some(info))
    }
}

impl Drop for AttributeUpdateBitmap {
    fn drop(&mut self) {
        UPDATE_BITMAP_BYTES.sub(self.memory_usage() as i64);
    }
}
