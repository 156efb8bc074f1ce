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

//! Persisted per segment update counts of one pack attribute.

use std::collections::BTreeMap;

use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use store_api::storage::SegmentId;

use crate::error::{DuplicateUpdateSegmentSnafu, OpenDalSnafu, Result, SerdeJsonSnafu};
use crate::location;
use crate::metrics::FILE_IO_ELAPSED;

/// Update count of one target segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentUpdateInfo {
    /// The segment whose documents were updated.
    pub update_segment_id: SegmentId,
    /// Number of its documents with at least one update.
    pub update_doc_count: u32,
}

/// Update counts of one pack attribute over all target segments, written
/// by a dump into the pack's directory and read back for size planning.
///
/// One entry per segment, a segment's count is written exactly once per
/// dump cycle. Entries are keyed by segment id, so iteration order and
/// equality are canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeUpdateInfo {
    counts: BTreeMap<SegmentId, u32>,
}

/// On disk shape of the update info file.
#[derive(Serialize, Deserialize)]
struct UpdateInfoFile {
    attribute_update_info: Vec<SegmentUpdateInfo>,
}

impl AttributeUpdateInfo {
    /// Adds the count of one segment, a second entry for the same segment
    /// is an error.
    pub fn add(&mut self, info: SegmentUpdateInfo) -> Result<()> {
        ensure!(
            !self.counts.contains_key(&info.update_segment_id),
            DuplicateUpdateSegmentSnafu {
                segment_id: info.update_segment_id,
            }
        );
        self.counts.insert(info.update_segment_id, info.update_doc_count);
        Ok(())
    }

    /// Update count of one segment, `None` when it had no updates.
    pub fn update_doc_count(&self, segment_id: SegmentId) -> Option<u32> {
        self.counts.get(&segment_id).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// A fresh cursor over the entries in ascending segment id order.
    pub fn iter(&self) -> impl Iterator<Item = SegmentUpdateInfo> + '_ {
        self.counts
            .iter()
            .map(|(update_segment_id, update_doc_count)| SegmentUpdateInfo {
                update_segment_id: *update_segment_id,
                update_doc_count: *update_doc_count,
            })
    }

    /// Writes this info into `attribute_dir`.
    pub async fn store(&self, object_store: &ObjectStore, attribute_dir: &str) -> Result<()> {
        let _timer = FILE_IO_ELAPSED
            .with_label_values(&["write", "update_info"])
            .start_timer();
        let file = UpdateInfoFile {
            attribute_update_info: self.iter().collect(),
        };
        let json = serde_json::to_vec(&file).context(SerdeJsonSnafu)?;
        let path = location::update_info_path(attribute_dir);
        object_store.write(&path, json).await.context(OpenDalSnafu)?;
        Ok(())
    }

    /// Reads the info of `attribute_dir`, `None` when the pack never
    /// dumped updates there. Duplicate segment entries in the file are an
    /// error.
    pub async fn load(
        object_store: &ObjectStore,
        attribute_dir: &str,
    ) -> Result<Option<AttributeUpdateInfo>> {
        let _timer = FILE_IO_ELAPSED
            .with_label_values(&["read", "update_info"])
            .start_timer();
        let path = location::update_info_path(attribute_dir);
        let bytes = match object_store.read(&path).await.context(OpenDalSnafu) {
            Ok(bytes) => bytes.to_vec(),
            Err(err) if err.is_object_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let file: UpdateInfoFile = serde_json::from_slice(&bytes).context(SerdeJsonSnafu)?;
        let mut info = AttributeUpdateInfo::default();
        for entry in file.attribute_update_info {
            info.add(entry)?;
        }
        Ok(Some(info))
    }
}

#[cfg(test)]
mod tests {
    use object_store::services::Memory;

    use super::*;

    fn memory_store() -> ObjectStore {
        ObjectStore::new(Memory::default()).unwrap().finish()
    }

    fn info_of(counts: &[(SegmentId, u32)]) -> AttributeUpdateInfo {
        let mut info = AttributeUpdateInfo::default();
        for (update_segment_id, update_doc_count) in counts {
            info.add(SegmentUpdateInfo {
                update_segment_id: *update_segment_id,
                update_doc_count: *update_doc_count,
            })
            .unwrap();
        }
        info
    }

    #[test]
    fn test_add_rejects_duplicate_segment() {
        let mut info = info_of(&[(3, 10)]);
        let err = info
            .add(SegmentUpdateInfo {
                update_segment_id: 3,
                update_doc_count: 7,
            })
            .unwrap_err();
        assert!(err.to_string().contains("already has segment 3"));
        // The first entry stays untouched.
        assert_eq!(Some(10), info.update_doc_count(3));
    }

    #[test]
    fn test_iter_ascends_regardless_of_add_order() {
        let info = info_of(&[(5, 1), (1, 2), (3, 3)]);
        let ids: Vec<_> = info.iter().map(|entry| entry.update_segment_id).collect();
        assert_eq!(vec![1, 3, 5], ids);
        // Two cursors are independent.
        let mut first = info.iter();
        let mut second = info.iter();
        first.next();
        assert_eq!(1, second.next().unwrap().update_segment_id);

        assert_eq!(info, info_of(&[(1, 2), (3, 3), (5, 1)]));
    }

    #[tokio::test]
    async fn test_store_load_round_trip() {
        let object_store = memory_store();
        let dir = "table/p0/segment_3/attribute/stats";
        assert_eq!(
            None,
            AttributeUpdateInfo::load(&object_store, dir).await.unwrap()
        );

        let info = info_of(&[(0, 5), (1, 4), (2, 1)]);
        info.store(&object_store, dir).await.unwrap();
        let loaded = AttributeUpdateInfo::load(&object_store, dir)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info, loaded);
    }

    #[tokio::test]
    async fn test_decode_pinned_json() {
        let object_store = memory_store();
        let dir = "table/p0/segment_3/attribute/stats";
        let raw = br#"{"attribute_update_info":[{"update_segment_id":0,"update_doc_count":5},{"update_segment_id":2,"update_doc_count":1}]}"#;
        object_store
            .write(&location::update_info_path(dir), raw.to_vec())
            .await
            .unwrap();

        let info = AttributeUpdateInfo::load(&object_store, dir)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(2, info.len());
        assert_eq!(Some(5), info.update_doc_count(0));
        assert_eq!(None, info.update_doc_count(1));
        assert_eq!(Some(1), info.update_doc_count(2));
    }

    #[tokio::test]
    async fn test_load_rejects_duplicate_entries() {
        let object_store = memory_store();
        let dir = "table/p0/segment_3/attribute/stats";
        let raw = br#"{"attribute_update_info":[{"update_segment_id":3,"update_doc_count":5},{"update_segment_id":3,"update_doc_count":5}]}"#;
        object_store
            .write(&location::update_info_path(dir), raw.to_vec())
            .await
            .unwrap();

        let err = AttributeUpdateInfo::load(&object_store, dir)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already has segment 3"));
    }
}
