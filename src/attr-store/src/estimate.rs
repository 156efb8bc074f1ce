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

//! Memory budget estimation for update overlays.
//!
//! A reader that reopens a partition must hold the updates recorded in
//! segments it has not loaded yet in memory, on top of the mapped data
//! files. The estimate combines per segment update counts with the average
//! document size of the updated segments. It is best effort, a segment
//! without the needed files contributes zero.

use std::collections::BTreeMap;

use common_telemetry::debug;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use store_api::metadata::{AttributeSchemaRef, PackAttributeConfig};
use store_api::storage::{SegmentId, Timestamp};

use crate::error::{OpenDalSnafu, Result, SerdeJsonSnafu};
use crate::location;
use crate::metrics::{ESTIMATED_EXPAND_BYTES, ESTIMATE_ELAPSED, FILE_IO_ELAPSED};
use crate::segment::{PartitionData, SegmentKind};
use crate::update::info::AttributeUpdateInfo;
use crate::version::Version;

/// Size statistics of one pack in one segment, written next to the data
/// file at merge time.
///
/// `uniq_item_count` replaces the raw doc count as the average size
/// denominator when the pack deduplicates values, an update always
/// materializes its own slot even when many documents shared one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDataInfo {
    pub uniq_item_count: u64,
    /// Byte length of the data file when it was sealed.
    pub data_length: u64,
}

impl AttributeDataInfo {
    /// Writes this info into `attribute_dir`.
    pub async fn store(&self, object_store: &ObjectStore, attribute_dir: &str) -> Result<()> {
        let _timer = FILE_IO_ELAPSED
            .with_label_values(&["write", "data_info"])
            .start_timer();
        let json = serde_json::to_vec(self).context(SerdeJsonSnafu)?;
        let path = location::data_info_path(attribute_dir);
        object_store.write(&path, json).await.context(OpenDalSnafu)?;
        Ok(())
    }

    /// Reads the info of `attribute_dir`, `None` when no merge wrote one.
    pub async fn load(
        object_store: &ObjectStore,
        attribute_dir: &str,
    ) -> Result<Option<AttributeDataInfo>> {
        let _timer = FILE_IO_ELAPSED
            .with_label_values(&["read", "data_info"])
            .start_timer();
        let path = location::data_info_path(attribute_dir);
        let bytes = match object_store.read(&path).await.context(OpenDalSnafu) {
            Ok(bytes) => bytes.to_vec(),
            Err(err) if err.is_object_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .context(SerdeJsonSnafu)
    }
}

/// Estimates the extra bytes a reader must budget to hold update overlays
/// for the updatable packs of a partition.
///
/// Immutable after construction, every estimate walks the same schema and
/// partition view.
pub struct UpdateSizeCalculator {
    schema: AttributeSchemaRef,
    sub_schema: Option<AttributeSchemaRef>,
    partition: PartitionData,
    object_store: ObjectStore,
}

impl UpdateSizeCalculator {
    pub fn new(
        schema: AttributeSchemaRef,
        partition: PartitionData,
        object_store: ObjectStore,
    ) -> UpdateSizeCalculator {
        UpdateSizeCalculator {
            schema,
            sub_schema: None,
            partition,
            object_store,
        }
    }

    /// Also estimates the sub table schema over [PartitionData::sub].
    pub fn with_sub_schema(mut self, sub_schema: AttributeSchemaRef) -> UpdateSizeCalculator {
        self.sub_schema = Some(sub_schema);
        self
    }

    /// Estimates the update overlay bytes carried by the segments that
    /// became visible since `last_version`. `None` means nothing was
    /// loaded before, every segment counts.
    pub async fn estimate_update_size(&self, last_version: Option<&Version>) -> Result<u64> {
        let _timer = ESTIMATE_ELAPSED.start_timer();
        let diff_ids: Vec<_> = self
            .partition
            .segments()
            .iter()
            .map(|view| view.segment_id())
            .filter(|segment_id| match last_version {
                Some(last) => last.segment_ids.binary_search(segment_id).is_err(),
                None => true,
            })
            .collect();
        let total = self.estimate_segments(&diff_ids).await?;
        ESTIMATED_EXPAND_BYTES.set(total as i64);
        debug!(
            "Estimated update size, dir: {}, diff_segments: {}, bytes: {}",
            self.partition.dir(),
            diff_ids.len(),
            total
        );
        Ok(total)
    }

    /// Estimates the update overlay bytes carried by realtime segments
    /// that are not yet eligible for reclaim, sealed at or after
    /// `reclaim_timestamp`.
    pub async fn estimate_rt_update_size(&self, reclaim_timestamp: Timestamp) -> Result<u64> {
        let _timer = ESTIMATE_ELAPSED.start_timer();
        let rt_ids: Vec<_> = self
            .partition
            .segments()
            .iter()
            .filter(|view| {
                view.meta().kind == SegmentKind::Realtime
                    && view.meta().timestamp >= reclaim_timestamp
            })
            .map(|view| view.segment_id())
            .collect();
        self.estimate_segments(&rt_ids).await
    }

    /// Sums the estimates of both table layers over one set of update
    /// carrying segments.
    async fn estimate_segments(&self, segment_ids: &[SegmentId]) -> Result<u64> {
        let mut total = self
            .estimate_layer(&self.schema, &self.partition, segment_ids)
            .await?;
        if let (Some(sub_schema), Some(sub_partition)) = (&self.sub_schema, self.partition.sub()) {
            total += self
                .estimate_layer(sub_schema, sub_partition, segment_ids)
                .await?;
        }
        Ok(total)
    }

    async fn estimate_layer(
        &self,
        schema: &AttributeSchemaRef,
        partition: &PartitionData,
        segment_ids: &[SegmentId],
    ) -> Result<u64> {
        let mut total = 0;
        for pack in schema.updatable_packs() {
            total += self.estimate_pack(pack, partition, segment_ids).await?;
        }
        Ok(total)
    }

    /// Estimate of one pack: per target segment update counts accumulated
    /// over the update carrying segments, weighted by the target's average
    /// document size.
    async fn estimate_pack(
        &self,
        pack: &PackAttributeConfig,
        partition: &PartitionData,
        segment_ids: &[SegmentId],
    ) -> Result<u64> {
        let mut update_counts: BTreeMap<SegmentId, u64> = BTreeMap::new();
        for segment_id in segment_ids {
            let attribute_dir = location::attribute_dir(
                &partition.segment_dir(*segment_id),
                &pack.pack_name,
            );
            let Some(info) = AttributeUpdateInfo::load(&self.object_store, &attribute_dir).await?
            else {
                continue;
            };
            // The same target may be updated by several segments, the
            // counts add up to a conservative estimate.
            for entry in info.iter() {
                *update_counts.entry(entry.update_segment_id).or_default() +=
                    entry.update_doc_count as u64;
            }
        }

        let mut total = 0;
        for (target_id, update_count) in update_counts {
            total += update_count * self.average_doc_size(pack, partition, target_id).await?;
        }
        Ok(total)
    }

    /// Average per document byte size of `pack` in one target segment,
    /// zero when the segment left the view or lacks the needed files.
    async fn average_doc_size(
        &self,
        pack: &PackAttributeConfig,
        partition: &PartitionData,
        target_id: SegmentId,
    ) -> Result<u64> {
        let Some(view) = partition.segment(target_id) else {
            return Ok(0);
        };
        let attribute_dir =
            location::attribute_dir(&partition.segment_dir(target_id), &pack.pack_name);
        let data_path = location::data_file_path(&attribute_dir);
        let data_length = match self.object_store.stat(&data_path).await.context(OpenDalSnafu) {
            Ok(meta) => meta.content_length(),
            Err(err) if err.is_object_not_found() => return Ok(0),
            Err(err) => return Err(err),
        };

        let denominator = if pack.compress_type.uniq_encode {
            match AttributeDataInfo::load(&self.object_store, &attribute_dir).await? {
                Some(info) => info.uniq_item_count,
                None => return Ok(0),
            }
        } else {
            view.doc_count() as u64
        };
        if denominator == 0 {
            return Ok(0);
        }
        Ok(data_length / denominator)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use store_api::metadata::{AttributeSchema, CompressType};

    use super::*;
    use crate::segment::SegmentMeta;
    use crate::test_util::{memory_store, partition_30_20_100, schema_with_packs, updatable_pack};
    use crate::update::info::SegmentUpdateInfo;

    async fn write_update_info(
        object_store: &ObjectStore,
        attribute_dir: &str,
        entries: &[(SegmentId, u32)],
    ) {
        let mut info = AttributeUpdateInfo::default();
        for (update_segment_id, update_doc_count) in entries {
            info.add(SegmentUpdateInfo {
                update_segment_id: *update_segment_id,
                update_doc_count: *update_doc_count,
            })
            .unwrap();
        }
        info.store(object_store, attribute_dir).await.unwrap();
    }

    async fn write_data(object_store: &ObjectStore, attribute_dir: &str, len: usize) {
        object_store
            .write(&location::data_file_path(attribute_dir), vec![0u8; len])
            .await
            .unwrap();
    }

    fn stats_dir(partition: &PartitionData, segment_id: SegmentId) -> String {
        location::attribute_dir(&partition.segment_dir(segment_id), "stats")
    }

    #[tokio::test]
    async fn test_data_info_round_trip() {
        let object_store = memory_store();
        let dir = "table/p0/segment_1/attribute/stats";
        assert_eq!(
            None,
            AttributeDataInfo::load(&object_store, dir).await.unwrap()
        );

        let info = AttributeDataInfo {
            uniq_item_count: 50,
            data_length: 1000,
        };
        info.store(&object_store, dir).await.unwrap();
        assert_eq!(
            Some(info),
            AttributeDataInfo::load(&object_store, dir).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_data_info_decode_pinned_json() {
        let object_store = memory_store();
        let dir = "table/p0/segment_1/attribute/stats";
        let raw = br#"{"uniq_item_count":7,"data_length":140}"#;
        object_store
            .write(&location::data_info_path(dir), raw.to_vec())
            .await
            .unwrap();
        let info = AttributeDataInfo::load(&object_store, dir)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(7, info.uniq_item_count);
        assert_eq!(140, info.data_length);
    }

    /// Two segments, 100 docs sealed plus a fresh one carrying updates.
    fn two_segment_partition(dir: &str) -> PartitionData {
        PartitionData::new(
            dir,
            vec![SegmentMeta::new(1, 100, 1000), SegmentMeta::new(2, 50, 2000)],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_estimate_zero_without_updatable_packs() {
        let object_store = memory_store();
        let partition = partition_30_20_100("table/p0");

        // No packs at all.
        let calculator = UpdateSizeCalculator::new(
            Arc::new(AttributeSchema::new()),
            partition.clone(),
            object_store.clone(),
        );
        assert_eq!(0, calculator.estimate_update_size(None).await.unwrap());

        // An updatable pack that was disabled no longer counts.
        let mut schema = AttributeSchema::new();
        schema
            .add_pack_attribute_config(updatable_pack("stats"))
            .unwrap();
        schema.disable_pack_attribute("stats").unwrap();
        let calculator =
            UpdateSizeCalculator::new(Arc::new(schema), partition, object_store);
        assert_eq!(0, calculator.estimate_update_size(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_estimate_end_to_end() {
        let object_store = memory_store();
        let partition = two_segment_partition("table/p0");
        let schema = schema_with_packs().schema;

        // Segment 2 recorded 10 updated docs of segment 1, whose pack data
        // averages 1000 / 100 = 10 bytes per doc.
        write_update_info(&object_store, &stats_dir(&partition, 2), &[(1, 10)]).await;
        write_data(&object_store, &stats_dir(&partition, 1), 1000).await;

        let calculator = UpdateSizeCalculator::new(schema, partition, object_store);
        let last = Version::new(7, vec![1], 1000);
        assert_eq!(
            100,
            calculator
                .estimate_update_size(Some(&last))
                .await
                .unwrap()
        );
        // Without a previous version every segment is new, segment 1
        // carries no update info and adds nothing.
        assert_eq!(100, calculator.estimate_update_size(None).await.unwrap());
        // An up to date reader has nothing to add.
        let current = Version::new(8, vec![1, 2], 2000);
        assert_eq!(
            0,
            calculator
                .estimate_update_size(Some(&current))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_estimate_sums_diff_segments() {
        let object_store = memory_store();
        let partition = PartitionData::new(
            "table/p0",
            vec![
                SegmentMeta::new(1, 100, 1000),
                SegmentMeta::new(2, 50, 2000),
                SegmentMeta::new(3, 50, 3000),
            ],
        )
        .unwrap();
        let schema = schema_with_packs().schema;

        write_update_info(&object_store, &stats_dir(&partition, 2), &[(1, 10)]).await;
        write_update_info(&object_store, &stats_dir(&partition, 3), &[(1, 10)]).await;
        write_data(&object_store, &stats_dir(&partition, 1), 1000).await;

        let calculator = UpdateSizeCalculator::new(schema, partition, object_store);
        let last = Version::new(7, vec![1], 1000);
        assert_eq!(
            200,
            calculator
                .estimate_update_size(Some(&last))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_estimate_uniq_encode_denominator() {
        let object_store = memory_store();
        let partition = two_segment_partition("table/p0");
        let mut schema = AttributeSchema::new();
        schema
            .add_pack_attribute_config(
                updatable_pack("stats").with_compress_type(CompressType::uniq()),
            )
            .unwrap();

        write_update_info(&object_store, &stats_dir(&partition, 2), &[(1, 10)]).await;
        write_data(&object_store, &stats_dir(&partition, 1), 1000).await;

        let calculator = UpdateSizeCalculator::new(
            Arc::new(schema),
            partition.clone(),
            object_store.clone(),
        );
        let last = Version::new(7, vec![1], 1000);
        // Without the data info file the uniq denominator is unknown.
        assert_eq!(
            0,
            calculator
                .estimate_update_size(Some(&last))
                .await
                .unwrap()
        );

        AttributeDataInfo {
            uniq_item_count: 50,
            data_length: 1000,
        }
        .store(&object_store, &stats_dir(&partition, 1))
        .await
        .unwrap();
        // 1000 / 50 unique items = 20 bytes per materialized update.
        assert_eq!(
            200,
            calculator
                .estimate_update_size(Some(&last))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_estimate_missing_pieces_contribute_zero() {
        let object_store = memory_store();
        let partition = two_segment_partition("table/p0");
        let schema = schema_with_packs().schema;
        let last = Version::new(7, vec![1], 1000);

        // No update info anywhere.
        let calculator = UpdateSizeCalculator::new(
            schema.clone(),
            partition.clone(),
            object_store.clone(),
        );
        assert_eq!(
            0,
            calculator
                .estimate_update_size(Some(&last))
                .await
                .unwrap()
        );

        // Updates against a segment without a data file, and against one
        // that is no longer part of the view.
        write_update_info(
            &object_store,
            &stats_dir(&partition, 2),
            &[(1, 10), (99, 10)],
        )
        .await;
        assert_eq!(
            0,
            calculator
                .estimate_update_size(Some(&last))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_estimate_realtime_segments() {
        let object_store = memory_store();
        let partition = PartitionData::new(
            "table/p0",
            vec![
                SegmentMeta::new(0, 100, 1000),
                SegmentMeta::new(1, 10, 2000).with_kind(SegmentKind::Realtime),
                SegmentMeta::new(2, 10, 5000).with_kind(SegmentKind::Realtime),
            ],
        )
        .unwrap();
        let schema = schema_with_packs().schema;

        write_update_info(&object_store, &stats_dir(&partition, 1), &[(0, 5)]).await;
        write_update_info(&object_store, &stats_dir(&partition, 2), &[(0, 3)]).await;
        write_data(&object_store, &stats_dir(&partition, 0), 1000).await;

        let calculator = UpdateSizeCalculator::new(schema, partition, object_store);
        // Segment 1 is older than the reclaim point and drops out.
        assert_eq!(30, calculator.estimate_rt_update_size(3000).await.unwrap());
        // Both realtime segments still count.
        assert_eq!(80, calculator.estimate_rt_update_size(1500).await.unwrap());
        // Everything realtime is reclaimable.
        assert_eq!(0, calculator.estimate_rt_update_size(9000).await.unwrap());
    }

    #[tokio::test]
    async fn test_estimate_includes_sub_schema() {
        let object_store = memory_store();
        let partition = two_segment_partition("table/p0")
            .with_sub(vec![
                SegmentMeta::new(1, 200, 1000),
                SegmentMeta::new(2, 100, 2000),
            ])
            .unwrap();
        let schema = schema_with_packs().schema;
        let mut sub_schema = AttributeSchema::new();
        sub_schema
            .add_pack_attribute_config(updatable_pack("sub_stats"))
            .unwrap();

        write_update_info(&object_store, &stats_dir(&partition, 2), &[(1, 10)]).await;
        write_data(&object_store, &stats_dir(&partition, 1), 1000).await;

        let sub = partition.sub().unwrap();
        let sub_dir_2 = location::attribute_dir(&sub.segment_dir(2), "sub_stats");
        let sub_dir_1 = location::attribute_dir(&sub.segment_dir(1), "sub_stats");
        write_update_info(&object_store, &sub_dir_2, &[(1, 4)]).await;
        // 600 bytes over 200 sub docs, 3 bytes per doc.
        write_data(&object_store, &sub_dir_1, 600).await;

        let calculator = UpdateSizeCalculator::new(schema, partition, object_store)
            .with_sub_schema(Arc::new(sub_schema));
        let last = Version::new(7, vec![1], 1000);
        assert_eq!(
            112,
            calculator
                .estimate_update_size(Some(&last))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_estimate_zero_doc_segment() {
        let object_store = memory_store();
        let partition = PartitionData::new(
            "table/p0",
            vec![SegmentMeta::new(1, 0, 1000), SegmentMeta::new(2, 50, 2000)],
        )
        .unwrap();
        let schema = schema_with_packs().schema;

        write_update_info(&object_store, &stats_dir(&partition, 2), &[(1, 10)]).await;
        write_data(&object_store, &stats_dir(&partition, 1), 1000).await;

        let calculator = UpdateSizeCalculator::new(schema, partition, object_store);
        let last = Version::new(7, vec![1], 1000);
        assert_eq!(
            0,
            calculator
                .estimate_update_size(Some(&last))
                .await
                .unwrap()
        );
    }
}
