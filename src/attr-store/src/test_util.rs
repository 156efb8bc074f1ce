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

//! Utilities shared by attr-store tests.

use std::sync::Arc;

use object_store::services::Memory;
use object_store::ObjectStore;
use store_api::metadata::{
    AttributeConfig, AttributeSchema, AttributeSchemaRef, FieldType, PackAttributeConfig,
};
use store_api::storage::PackId;

use crate::segment::{PartitionData, SegmentMeta};

pub(crate) fn memory_store() -> ObjectStore {
    ObjectStore::new(Memory::default()).unwrap().finish()
}

/// An updatable pack of two numeric members named after the pack.
pub(crate) fn updatable_pack(pack_name: &str) -> PackAttributeConfig {
    PackAttributeConfig::new(
        pack_name,
        vec![
            AttributeConfig::new(format!("{pack_name}_clicks"), FieldType::UInt32),
            AttributeConfig::new(format!("{pack_name}_score"), FieldType::Float32),
        ],
    )
    .unwrap()
    .with_updatable(true)
}

pub(crate) struct SchemaPacks {
    pub(crate) schema: AttributeSchemaRef,
    pub(crate) updatable_pack_id: PackId,
    pub(crate) frozen_pack_id: PackId,
}

/// A schema with one updatable pack `stats` and one pack `extras` that
/// does not accept updates.
pub(crate) fn schema_with_packs() -> SchemaPacks {
    let mut schema = AttributeSchema::new();
    let updatable_pack_id = schema
        .add_pack_attribute_config(updatable_pack("stats"))
        .unwrap();
    let frozen_pack = PackAttributeConfig::new(
        "extras",
        vec![AttributeConfig::new("note", FieldType::String)],
    )
    .unwrap();
    let frozen_pack_id = schema.add_pack_attribute_config(frozen_pack).unwrap();
    SchemaPacks {
        schema: Arc::new(schema),
        updatable_pack_id,
        frozen_pack_id,
    }
}

/// Three built segments of 30, 20 and 100 documents.
pub(crate) fn partition_30_20_100(dir: &str) -> PartitionData {
    PartitionData::new(
        dir,
        vec![
            SegmentMeta::new(0, 30, 1000),
            SegmentMeta::new(1, 20, 2000),
            SegmentMeta::new(2, 100, 3000),
        ],
    )
    .unwrap()
}
