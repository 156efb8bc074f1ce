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

//! Routes document updates into per pack bitmaps.

use std::collections::HashMap;

use common_telemetry::info;
use object_store::ObjectStore;
use snafu::OptionExt;
use store_api::metadata::AttributeSchemaRef;
use store_api::storage::{DocId, PackId};

use crate::config::AttrStoreConfig;
use crate::error::{Result, UnsupportedSnafu};
use crate::location;
use crate::segment::PartitionData;
use crate::update::bitmap::AttributeUpdateBitmap;

/// Tracks in place updates for every updatable pack attribute of one
/// schema over one partition view.
///
/// One updater per update cycle: accept updates, dump into the building
/// segment's directory, then drop it and start the next cycle from the
/// new partition view. The sub table runs its own updater over
/// [PartitionData::sub].
#[derive(Debug)]
pub struct AttributeUpdater {
    schema: AttributeSchemaRef,
    memory_budget: usize,
    bitmaps: HashMap<PackId, AttributeUpdateBitmap>,
}

impl AttributeUpdater {
    pub fn new(
        schema: AttributeSchemaRef,
        partition: &PartitionData,
        config: &AttrStoreConfig,
    ) -> AttributeUpdater {
        let bitmaps = schema
            .updatable_packs()
            .map(|pack| (pack.pack_attr_id(), AttributeUpdateBitmap::new(partition)))
            .collect();
        AttributeUpdater {
            schema,
            memory_budget: config.update_memory_budget.as_bytes() as usize,
            bitmaps,
        }
    }

    /// Marks a document of `pack_id` as updated. Errors when the pack is
    /// unknown or does not accept updates, out of range doc ids are
    /// dropped silently by the bitmap.
    pub fn record_update(&mut self, pack_id: PackId, global_doc_id: DocId) -> Result<()> {
        let bitmap = self.bitmaps.get_mut(&pack_id).context(UnsupportedSnafu {
            reason: format!("pack {} does not accept updates", pack_id),
        })?;
        bitmap.set(global_doc_id);
        Ok(())
    }

    /// The bitmap of one pack, `None` when the pack is not tracked.
    pub fn pack_bitmap(&self, pack_id: PackId) -> Option<&AttributeUpdateBitmap> {
        self.bitmaps.get(&pack_id)
    }

    /// Bytes held by all tracked bitmaps.
    pub fn memory_usage(&self) -> usize {
        self.bitmaps
            .values()
            .map(|bitmap| bitmap.memory_usage())
            .sum()
    }

    /// True once tracked memory reaches the configured budget, the caller
    /// should dump and start a fresh cycle.
    pub fn should_dump(&self) -> bool {
        self.memory_usage() >= self.memory_budget
    }

    /// Dumps every pack with updates into its attribute directory under
    /// `segment_dir`, returns how many packs wrote a file.
    pub async fn dump(&self, object_store: &ObjectStore, segment_dir: &str) -> Result<usize> {
        let mut dumped = 0;
        for pack in self.schema.updatable_packs() {
            let Some(bitmap) = self.bitmaps.get(&pack.pack_attr_id()) else {
                continue;
            };
            let attribute_dir = location::attribute_dir(segment_dir, &pack.pack_name);
            if bitmap
                .dump(object_store, &attribute_dir)
                .await?
                .is_some()
            {
                dumped += 1;
            }
        }
        info!(
            "Dumped attribute updates, segment_dir: {}, packs: {}, bytes: {}",
            segment_dir,
            dumped,
            self.memory_usage()
        );
        Ok(dumped)
    }
}

#[cfg(test)]
mod tests {
    use common_base::readable_size::ReadableSize;

    use super::*;
    use crate::test_util::{memory_store, schema_with_packs, SchemaPacks};
    use crate::update::info::AttributeUpdateInfo;

    fn partition() -> PartitionData {
        crate::test_util::partition_30_20_100("table/p0")
    }

    #[tokio::test]
    async fn test_record_and_dump() {
        let SchemaPacks {
            schema,
            updatable_pack_id,
            frozen_pack_id,
        } = schema_with_packs();
        let partition = partition();
        let mut updater = AttributeUpdater::new(
            schema.clone(),
            &partition,
            &AttrStoreConfig::default(),
        );

        for doc_id in [5, 10, 35] {
            updater.record_update(updatable_pack_id, doc_id).unwrap();
        }
        // Doc beyond the view is dropped, not an error.
        updater.record_update(updatable_pack_id, 200).unwrap();

        let err = updater.record_update(frozen_pack_id, 1).unwrap_err();
        assert!(err.to_string().contains("does not accept updates"));
        assert!(updater.record_update(99, 1).is_err());

        let object_store = memory_store();
        let segment_dir = partition.segment_dir(3);
        assert_eq!(1, updater.dump(&object_store, &segment_dir).await.unwrap());

        let pack_name = &schema
            .pack_attribute_config_by_id(updatable_pack_id)
            .unwrap()
            .pack_name;
        let info = AttributeUpdateInfo::load(
            &object_store,
            &location::attribute_dir(&segment_dir, pack_name),
        )
        .await
        .unwrap()
        .unwrap();
        let entries: Vec<_> = info
            .iter()
            .map(|entry| (entry.update_segment_id, entry.update_doc_count))
            .collect();
        assert_eq!(vec![(0, 2), (1, 1)], entries);
    }

    #[test]
    fn test_should_dump_when_budget_reached() {
        let SchemaPacks {
            schema,
            updatable_pack_id,
            ..
        } = schema_with_packs();
        let partition = partition();
        let config = AttrStoreConfig {
            update_memory_budget: ReadableSize(4),
            ..Default::default()
        };
        let mut updater = AttributeUpdater::new(schema, &partition, &config);
        assert!(!updater.should_dump());

        updater.record_update(updatable_pack_id, 0).unwrap();
        // The 30 doc segment bitmap takes 4 bytes.
        assert_eq!(4, updater.memory_usage());
        assert!(updater.should_dump());
    }

    #[tokio::test]
    async fn test_dump_without_updates() {
        let SchemaPacks { schema, .. } = schema_with_packs();
        let partition = partition();
        let updater = AttributeUpdater::new(schema, &partition, &AttrStoreConfig::default());
        let object_store = memory_store();
        assert_eq!(
            0,
            updater
                .dump(&object_store, &partition.segment_dir(3))
                .await
                .unwrap()
        );
    }
}
