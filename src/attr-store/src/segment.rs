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

//! Segment metadata and the partition wide segment view.

use common_telemetry::debug;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use store_api::storage::{DocId, SegmentId, Timestamp};

use crate::error::{InvalidMetaSnafu, OpenDalSnafu, Result, SerdeJsonSnafu};
use crate::location;
use crate::version::Version;

/// How a segment was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Sealed by a full or merge build.
    Built,
    /// Built from the live update stream, reclaimed once merged away.
    Realtime,
}

/// Document counts of one sealed segment, persisted as the `segment_info`
/// file in the segment directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub segment_id: SegmentId,
    pub doc_count: u32,
    /// Seal time in milliseconds, drives realtime segment reclaim.
    pub timestamp: Timestamp,
    pub kind: SegmentKind,
}

impl SegmentMeta {
    pub fn new(segment_id: SegmentId, doc_count: u32, timestamp: Timestamp) -> SegmentMeta {
        SegmentMeta {
            segment_id,
            doc_count,
            timestamp,
            kind: SegmentKind::Built,
        }
    }

    pub fn with_kind(mut self, kind: SegmentKind) -> SegmentMeta {
        self.kind = kind;
        self
    }

    /// Writes this meta as the `segment_info` file of `segment_dir`.
    pub async fn store(&self, object_store: &ObjectStore, segment_dir: &str) -> Result<()> {
        let path = location::segment_info_path(segment_dir);
        let json = serde_json::to_vec(self).context(SerdeJsonSnafu)?;
        object_store.write(&path, json).await.context(OpenDalSnafu)?;
        Ok(())
    }

    /// Reads the `segment_info` file of `segment_dir`.
    pub async fn load(object_store: &ObjectStore, segment_dir: &str) -> Result<SegmentMeta> {
        let path = location::segment_info_path(segment_dir);
        let bytes = object_store.read(&path).await.context(OpenDalSnafu)?;
        serde_json::from_slice(&bytes.to_vec()).context(SerdeJsonSnafu)
    }
}

/// A segment inside a partition view, with the global doc id its first
/// document maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentView {
    meta: SegmentMeta,
    base_doc_id: DocId,
}

impl SegmentView {
    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn segment_id(&self) -> SegmentId {
        self.meta.segment_id
    }

    pub fn doc_count(&self) -> u32 {
        self.meta.doc_count
    }

    pub fn base_doc_id(&self) -> DocId {
        self.base_doc_id
    }
}

/// Ordered view over the segments of one partition.
///
/// Segments cover a contiguous global doc id range in segment id order.
/// The view is built once from a [Version] and never mutated, updates that
/// arrive for documents beyond it are dropped by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionData {
    dir: String,
    /// Segment directories gain a `sub_segment` layer for the sub table
    /// view.
    is_sub: bool,
    segments: Vec<SegmentView>,
    total_doc_count: u32,
    sub: Option<Box<PartitionData>>,
}

impl PartitionData {
    /// Builds the view from segment metas in ascending segment id order.
    pub fn new(dir: impl Into<String>, metas: Vec<SegmentMeta>) -> Result<PartitionData> {
        let mut segments: Vec<SegmentView> = Vec::with_capacity(metas.len());
        let mut base_doc_id = 0;
        for meta in metas {
            if let Some(last) = segments.last() {
                ensure!(
                    last.segment_id() < meta.segment_id,
                    InvalidMetaSnafu {
                        reason: format!(
                            "segment {} after segment {}, ids must ascend",
                            meta.segment_id,
                            last.segment_id()
                        ),
                    }
                );
            }
            let doc_count = meta.doc_count;
            segments.push(SegmentView { meta, base_doc_id });
            base_doc_id += doc_count;
        }
        Ok(PartitionData {
            dir: dir.into(),
            is_sub: false,
            segments,
            total_doc_count: base_doc_id,
            sub: None,
        })
    }

    /// Attaches the sub table view, one sub meta per main segment.
    pub fn with_sub(mut self, sub_metas: Vec<SegmentMeta>) -> Result<PartitionData> {
        ensure!(
            sub_metas.len() == self.segments.len()
                && sub_metas
                    .iter()
                    .zip(&self.segments)
                    .all(|(sub, main)| sub.segment_id == main.segment_id()),
            InvalidMetaSnafu {
                reason: "sub segments do not mirror the main segments",
            }
        );
        let mut sub = PartitionData::new(self.dir.clone(), sub_metas)?;
        sub.is_sub = true;
        self.sub = Some(Box::new(sub));
        Ok(self)
    }

    /// Rebuilds the view of `version` from the segment info files under
    /// `partition_dir`.
    pub async fn load(
        object_store: &ObjectStore,
        partition_dir: &str,
        version: &Version,
        has_sub: bool,
    ) -> Result<PartitionData> {
        let metas = Self::load_metas(object_store, partition_dir, version, false).await?;
        let mut data = PartitionData::new(partition_dir, metas)?;
        if has_sub {
            let sub_metas = Self::load_metas(object_store, partition_dir, version, true).await?;
            data = data.with_sub(sub_metas)?;
        }
        debug!(
            "Loaded partition data, dir: {}, version: {}, segments: {}, total_doc_count: {}",
            partition_dir,
            version.version_id,
            data.segments.len(),
            data.total_doc_count
        );
        Ok(data)
    }

    async fn load_metas(
        object_store: &ObjectStore,
        partition_dir: &str,
        version: &Version,
        sub: bool,
    ) -> Result<Vec<SegmentMeta>> {
        let mut metas = Vec::with_capacity(version.segment_ids.len());
        for segment_id in &version.segment_ids {
            let mut segment_dir = location::segment_dir(partition_dir, *segment_id);
            if sub {
                segment_dir = location::sub_segment_dir(&segment_dir);
            }
            let meta = SegmentMeta::load(object_store, &segment_dir).await?;
            ensure!(
                meta.segment_id == *segment_id,
                InvalidMetaSnafu {
                    reason: format!(
                        "segment info under {} belongs to segment {}",
                        segment_dir, meta.segment_id
                    ),
                }
            );
            metas.push(meta);
        }
        Ok(metas)
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn segments(&self) -> &[SegmentView] {
        &self.segments
    }

    pub fn total_doc_count(&self) -> u32 {
        self.total_doc_count
    }

    /// The sub table view, when the table has one.
    pub fn sub(&self) -> Option<&PartitionData> {
        self.sub.as_deref()
    }

    /// Returns the view of a segment by id.
    pub fn segment(&self, segment_id: SegmentId) -> Option<&SegmentView> {
        self.segments
            .binary_search_by_key(&segment_id, |view| view.segment_id())
            .ok()
            .map(|index| &self.segments[index])
    }

    /// Directory of a segment in this view, under `sub_segment` for the
    /// sub table view.
    pub fn segment_dir(&self, segment_id: SegmentId) -> String {
        let dir = location::segment_dir(&self.dir, segment_id);
        if self.is_sub {
            location::sub_segment_dir(&dir)
        } else {
            dir
        }
    }

    /// Resolves a global doc id to `(segment index, doc id local to that
    /// segment)`, `None` when the view does not cover it.
    pub fn locate(&self, global_doc_id: DocId) -> Option<(usize, DocId)> {
        if global_doc_id >= self.total_doc_count {
            return None;
        }
        // Last segment whose base doc id is not greater, empty segments
        // share their base with the next one and never win.
        let index = self
            .segments
            .partition_point(|view| view.base_doc_id <= global_doc_id);
        let view = &self.segments[index - 1];
        Some((index - 1, global_doc_id - view.base_doc_id))
    }
}
