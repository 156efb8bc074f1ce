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

//! Metadata of attributes, pack attributes and the attribute schema.
//!
//! This mod has its own error type [MetadataError] for validation and codec
//! exceptions.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use common_error::ext::ErrorExt;
use common_error::status_code::StatusCode;
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ensure, Location, OptionExt, ResultExt, Snafu};

use crate::storage::{AttrId, FieldId, PackId};

pub type Result<T> = std::result::Result<T, MetadataError>;

/// Byte width of the offset slot a variable length field occupies in the
/// fixed region of a pack record. The slot stores a little endian `u32`
/// displacement from the slot position to the value bytes.
pub const VAR_OFFSET_SLOT_LEN: u32 = 4;

/// Native type of the values an attribute stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Char,
    String,
}

impl FieldType {
    /// Returns the encoded width of one value in bytes, or `None` for
    /// variable length types.
    pub fn fixed_width(&self) -> Option<u32> {
        match self {
            FieldType::Int8 | FieldType::UInt8 | FieldType::Char => Some(1),
            FieldType::Int16 | FieldType::UInt16 => Some(2),
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float32 => Some(4),
            FieldType::Int64 | FieldType::UInt64 | FieldType::Float64 => Some(8),
            FieldType::String => None,
        }
    }
}

/// Lossy codec applied to float32 values before they are written to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatCompressType {
    #[default]
    None,
    /// IEEE 754 half precision, two bytes per value.
    Fp16,
    /// Symmetric max-abs quantization to `i8`, prefixed by the f32 scale.
    Int8,
    /// One shared exponent byte followed by `i16` mantissas.
    BlockFp,
}

impl FloatCompressType {
    /// Encoded byte length of `count` float32 values under this codec.
    pub fn encoded_len(&self, count: u32) -> u32 {
        match self {
            FloatCompressType::None => 4 * count,
            FloatCompressType::Fp16 => 2 * count,
            FloatCompressType::Int8 => 4 + count,
            FloatCompressType::BlockFp => 1 + 2 * count,
        }
    }
}

/// Storage codecs attached to an attribute or a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompressType {
    #[serde(default)]
    pub float_compress: FloatCompressType,
    /// Deduplicate values in the data file and store references,
    /// which changes the per document size accounting.
    #[serde(default)]
    pub uniq_encode: bool,
}

impl CompressType {
    pub fn none() -> Self {
        CompressType::default()
    }

    pub fn fp16() -> Self {
        CompressType {
            float_compress: FloatCompressType::Fp16,
            uniq_encode: false,
        }
    }

    pub fn int8() -> Self {
        CompressType {
            float_compress: FloatCompressType::Int8,
            uniq_encode: false,
        }
    }

    pub fn block_fp() -> Self {
        CompressType {
            float_compress: FloatCompressType::BlockFp,
            uniq_encode: false,
        }
    }

    pub fn uniq() -> Self {
        CompressType {
            float_compress: FloatCompressType::None,
            uniq_encode: true,
        }
    }

    pub fn is_none(&self) -> bool {
        *self == CompressType::default()
    }

    pub fn has_float_compress(&self) -> bool {
        self.float_compress != FloatCompressType::None
    }
}

/// How an attribute came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    #[default]
    Normal,
    /// Added at runtime and never persisted with the schema.
    Virtual,
}

/// Visibility of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeStatus {
    #[default]
    Normal,
    /// Hidden from readers while its storage is kept.
    Disabled,
    /// Dropped from the schema, the id stays reserved.
    Deleted,
}

impl AttributeStatus {
    pub fn is_normal(&self) -> bool {
        *self == AttributeStatus::Normal
    }
}

/// Metadata of a single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub attr_name: String,
    pub field_type: FieldType,
    /// Document field this attribute is built from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<FieldId>,
    #[serde(default)]
    pub multi_value: bool,
    /// Number of values per document when the count is fixed by the schema
    /// instead of being encoded with the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_multi_count: Option<u32>,
    #[serde(default, skip_serializing_if = "CompressType::is_none")]
    pub compress_type: CompressType,
    #[serde(default, skip_serializing_if = "AttributeStatus::is_normal")]
    pub status: AttributeStatus,
    /// Assigned by the schema on registration.
    #[serde(skip)]
    pub attr_id: AttrId,
    #[serde(skip)]
    pub kind: AttributeKind,
    /// Legacy attributes predate the full config object and serialize as a
    /// bare name string.
    #[serde(skip)]
    pub legacy: bool,
}

impl AttributeConfig {
    /// Creates a single value attribute without compression.
    pub fn new(attr_name: impl Into<String>, field_type: FieldType) -> Self {
        AttributeConfig {
            attr_name: attr_name.into(),
            field_type,
            field_id: None,
            multi_value: false,
            fixed_multi_count: None,
            compress_type: CompressType::default(),
            status: AttributeStatus::default(),
            attr_id: 0,
            kind: AttributeKind::default(),
            legacy: false,
        }
    }

    /// Creates a legacy attribute known only by name. Its field binding is
    /// resolved against the document schema by the caller.
    pub fn new_legacy(attr_name: impl Into<String>) -> Self {
        let mut config = AttributeConfig::new(attr_name, FieldType::String);
        config.legacy = true;
        config
    }

    pub fn with_field_id(mut self, field_id: FieldId) -> Self {
        self.field_id = Some(field_id);
        self
    }

    pub fn with_multi_value(mut self) -> Self {
        self.multi_value = true;
        self
    }

    /// Marks the attribute multi value with a schema level value count.
    pub fn with_fixed_multi_count(mut self, count: u32) -> Self {
        self.multi_value = true;
        self.fixed_multi_count = Some(count);
        self
    }

    pub fn with_compress_type(mut self, compress_type: CompressType) -> Self {
        self.compress_type = compress_type;
        self
    }

    pub fn with_kind(mut self, kind: AttributeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_virtual(&self) -> bool {
        self.kind == AttributeKind::Virtual
    }

    pub fn is_disabled(&self) -> bool {
        self.status == AttributeStatus::Disabled
    }

    pub fn is_deleted(&self) -> bool {
        self.status == AttributeStatus::Deleted
    }

    /// Returns true if values of this attribute live in the variable length
    /// region of a record.
    pub fn is_var_len(&self) -> bool {
        self.fixed_slot_len().is_none()
    }

    /// Byte length of the slot this attribute occupies in the fixed region
    /// of a record, or `None` for variable length attributes which occupy an
    /// offset slot instead.
    pub fn fixed_slot_len(&self) -> Option<u32> {
        let width = self.field_type.fixed_width()?;
        let count = if self.multi_value {
            self.fixed_multi_count?
        } else {
            1
        };
        let len = match self.compress_type.float_compress {
            FloatCompressType::None => width * count,
            compress => compress.encoded_len(count),
        };
        Some(len)
    }

    /// Validates the config against itself. Schema level constraints such as
    /// name uniqueness are checked on registration.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.attr_name.is_empty(),
            InvalidMetaSnafu {
                reason: "empty attribute name",
            }
        );
        if let Some(count) = self.fixed_multi_count {
            ensure!(
                self.multi_value,
                InvalidMetaSnafu {
                    reason: format!(
                        "attribute {} has a fixed value count but is single value",
                        self.attr_name
                    ),
                }
            );
            ensure!(
                count > 0,
                InvalidMetaSnafu {
                    reason: format!("attribute {} has a zero fixed value count", self.attr_name),
                }
            );
            ensure!(
                self.field_type.fixed_width().is_some(),
                InvalidMetaSnafu {
                    reason: format!(
                        "attribute {} of type {} can not have a fixed value count",
                        self.attr_name, self.field_type
                    ),
                }
            );
        }
        if self.compress_type.has_float_compress() {
            ensure!(
                self.field_type == FieldType::Float32,
                InvalidMetaSnafu {
                    reason: format!(
                        "attribute {} of type {} can not use float compression",
                        self.attr_name, self.field_type
                    ),
                }
            );
            // int8 and block_fp carry per block metadata so they only apply
            // to fixed count multi value attributes.
            if matches!(
                self.compress_type.float_compress,
                FloatCompressType::Int8 | FloatCompressType::BlockFp
            ) {
                ensure!(
                    self.multi_value && self.fixed_multi_count.is_some(),
                    InvalidMetaSnafu {
                        reason: format!(
                            "attribute {} requires a fixed value count for {:?} compression",
                            self.attr_name, self.compress_type.float_compress
                        ),
                    }
                );
            }
        }
        Ok(())
    }
}

/// Metadata of a pack attribute, a group of attributes stored in one record.
///
/// The record layout is computed at construction and kept alongside the
/// member configs: fixed width members occupy their encoded width in the
/// fixed region, variable length members occupy a [VAR_OFFSET_SLOT_LEN]
/// offset slot pointing into the trailing variable region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackAttributeConfig {
    pub pack_name: String,
    #[serde(default, skip_serializing_if = "CompressType::is_none")]
    pub compress_type: CompressType,
    /// Whether documents in this pack accept in place updates.
    #[serde(default)]
    pub updatable: bool,
    #[serde(default, skip_serializing_if = "AttributeStatus::is_normal")]
    pub status: AttributeStatus,
    pub sub_attributes: Vec<AttributeConfig>,
    // Derived fields below are always constructed through [PackAttributeConfig::new]
    // so we can assume they are consistent with `sub_attributes`.
    #[serde(skip)]
    pack_attr_id: PackId,
    #[serde(skip)]
    member_ids: Vec<AttrId>,
    #[serde(skip)]
    member_offsets: Vec<u32>,
    #[serde(skip)]
    record_fixed_len: u32,
}

impl<'de> Deserialize<'de> for PackAttributeConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // helper internal struct for deserialization
        #[derive(Deserialize)]
        struct PackAttributeConfigWithoutLayout {
            pack_name: String,
            #[serde(default)]
            compress_type: CompressType,
            #[serde(default)]
            updatable: bool,
            #[serde(default)]
            status: AttributeStatus,
            sub_attributes: Vec<AttributeConfig>,
        }

        let without_layout = PackAttributeConfigWithoutLayout::deserialize(deserializer)?;
        let mut pack =
            PackAttributeConfig::new(without_layout.pack_name, without_layout.sub_attributes)
                .map_err(D::Error::custom)?;
        pack.compress_type = without_layout.compress_type;
        pack.updatable = without_layout.updatable;
        pack.status = without_layout.status;
        Ok(pack)
    }
}

impl PackAttributeConfig {
    /// Creates a pack over `sub_attributes` and computes the record layout.
    pub fn new(pack_name: impl Into<String>, sub_attributes: Vec<AttributeConfig>) -> Result<Self> {
        let pack_name = pack_name.into();
        ensure!(
            !sub_attributes.is_empty(),
            InvalidMetaSnafu {
                reason: format!("pack {pack_name} has no sub attributes"),
            }
        );

        let mut names = HashSet::with_capacity(sub_attributes.len());
        let mut member_offsets = Vec::with_capacity(sub_attributes.len());
        let mut offset = 0u32;
        for member in &sub_attributes {
            member.validate()?;
            ensure!(
                member.attr_name != pack_name,
                InvalidMetaSnafu {
                    reason: format!("pack {pack_name} has a sub attribute with the same name"),
                }
            );
            ensure!(
                names.insert(member.attr_name.as_str()),
                InvalidMetaSnafu {
                    reason: format!(
                        "duplicate sub attribute {} in pack {pack_name}",
                        member.attr_name
                    ),
                }
            );
            ensure!(
                !member.is_virtual(),
                InvalidMetaSnafu {
                    reason: format!(
                        "virtual attribute {} can not join pack {pack_name}",
                        member.attr_name
                    ),
                }
            );
            member_offsets.push(offset);
            offset += member.fixed_slot_len().unwrap_or(VAR_OFFSET_SLOT_LEN);
        }

        Ok(PackAttributeConfig {
            pack_name,
            compress_type: CompressType::default(),
            updatable: false,
            status: AttributeStatus::default(),
            sub_attributes,
            pack_attr_id: 0,
            member_ids: Vec::new(),
            member_offsets,
            record_fixed_len: offset,
        })
    }

    pub fn with_compress_type(mut self, compress_type: CompressType) -> Self {
        self.compress_type = compress_type;
        self
    }

    pub fn with_updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    /// Id assigned by the schema on registration.
    pub fn pack_attr_id(&self) -> PackId {
        self.pack_attr_id
    }

    /// Ids of the member attributes, in member order. Empty until the pack
    /// is registered.
    pub fn member_ids(&self) -> &[AttrId] {
        &self.member_ids
    }

    /// Byte offsets of the member slots in the fixed record region.
    pub fn member_offsets(&self) -> &[u32] {
        &self.member_offsets
    }

    /// Total byte length of the fixed record region.
    pub fn record_fixed_len(&self) -> u32 {
        self.record_fixed_len
    }

    pub fn member_count(&self) -> usize {
        self.sub_attributes.len()
    }

    pub fn member_index_by_name(&self, name: &str) -> Option<usize> {
        self.sub_attributes
            .iter()
            .position(|member| member.attr_name == name)
    }

    pub fn is_disabled(&self) -> bool {
        self.status == AttributeStatus::Disabled
    }
}

/// Mutability phase of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaState {
    /// Attributes may be added freely.
    #[default]
    Mutable,
    /// The base attribute count is snapshotted, further additions are
    /// schema evolution attributes.
    BaseImmutable,
    /// Evolution attributes are sealed too, only virtual attributes may
    /// still be added.
    ModifyImmutable,
}

/// The attribute schema of one table.
///
/// Attribute ids are positional: the id of an attribute is its index in the
/// dense config vector, assigned by registration order. Pack members are
/// registered in the same vector, so every attribute is addressable by id
/// regardless of grouping.
#[derive(Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    attributes: Vec<AttributeConfig>,
    packs: Vec<PackAttributeConfig>,
    // We don't pub the maps and always maintain them through the add path
    // so we can assume they are consistent with the vectors.
    name_to_id: HashMap<String, AttrId>,
    pack_name_to_id: HashMap<String, PackId>,
    attr_to_pack: HashMap<AttrId, PackId>,
    /// Back reference from field id to attribute id, indexed by field id
    /// and grown geometrically.
    field_to_attr: Vec<Option<AttrId>>,
    state: SchemaState,
    base_attribute_count: Option<usize>,
}

pub type AttributeSchemaRef = Arc<AttributeSchema>;

impl fmt::Debug for AttributeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSchema")
            .field("attributes", &self.attributes)
            .field("packs", &self.packs)
            .field("state", &self.state)
            .field("base_attribute_count", &self.base_attribute_count)
            .finish()
    }
}

impl Default for AttributeSchema {
    fn default() -> Self {
        AttributeSchema::new()
    }
}

impl AttributeSchema {
    pub fn new() -> AttributeSchema {
        AttributeSchema {
            attributes: Vec::new(),
            packs: Vec::new(),
            name_to_id: HashMap::new(),
            pack_name_to_id: HashMap::new(),
            attr_to_pack: HashMap::new(),
            field_to_attr: Vec::new(),
            state: SchemaState::default(),
            base_attribute_count: None,
        }
    }

    /// Registers a standalone attribute and returns its id.
    ///
    /// Fails if the name is taken, the config is invalid, or the schema only
    /// accepts virtual attributes and the candidate is not one.
    pub fn add_attribute_config(&mut self, config: AttributeConfig) -> Result<AttrId> {
        config.validate()?;
        self.ensure_name_unused(&config.attr_name)?;
        if self.state == SchemaState::ModifyImmutable {
            ensure!(
                config.is_virtual(),
                SchemaImmutableSnafu {
                    name: config.attr_name.clone(),
                }
            );
        }
        self.register_attribute(config)
    }

    /// Registers a pack attribute and all of its members, returns the pack id.
    pub fn add_pack_attribute_config(&mut self, mut pack: PackAttributeConfig) -> Result<PackId> {
        if self.state == SchemaState::ModifyImmutable {
            return SchemaImmutableSnafu {
                name: pack.pack_name,
            }
            .fail();
        }
        self.ensure_name_unused(&pack.pack_name)?;
        // Check every member before mutating anything so a rejected pack
        // leaves the schema untouched.
        let mut fields = HashSet::new();
        for member in &pack.sub_attributes {
            self.ensure_name_unused(&member.attr_name)?;
            if let Some(field_id) = member.field_id {
                ensure!(
                    self.attribute_config_by_field_id(field_id).is_none()
                        && fields.insert(field_id),
                    InvalidMetaSnafu {
                        reason: format!(
                            "field {field_id} is bound twice in pack {}",
                            pack.pack_name
                        ),
                    }
                );
            }
        }

        let pack_id = self.packs.len() as PackId;
        pack.pack_attr_id = pack_id;
        pack.member_ids.clear();
        for member in &mut pack.sub_attributes {
            let attr_id = self.register_attribute(member.clone())?;
            member.attr_id = attr_id;
            pack.member_ids.push(attr_id);
            self.attr_to_pack.insert(attr_id, pack_id);
        }
        self.pack_name_to_id.insert(pack.pack_name.clone(), pack_id);
        self.packs.push(pack);
        Ok(pack_id)
    }

    fn ensure_name_unused(&self, name: &str) -> Result<()> {
        ensure!(
            !self.name_to_id.contains_key(name) && !self.pack_name_to_id.contains_key(name),
            AttributeExistsSnafu { name }
        );
        Ok(())
    }

    fn register_attribute(&mut self, mut config: AttributeConfig) -> Result<AttrId> {
        let attr_id = self.attributes.len() as AttrId;
        if let Some(field_id) = config.field_id {
            self.bind_field(field_id, attr_id)?;
        }
        config.attr_id = attr_id;
        self.name_to_id.insert(config.attr_name.clone(), attr_id);
        self.attributes.push(config);
        Ok(attr_id)
    }

    fn bind_field(&mut self, field_id: FieldId, attr_id: AttrId) -> Result<()> {
        let index = field_id as usize;
        if index >= self.field_to_attr.len() {
            let mut new_len = self.field_to_attr.len().max(1);
            while new_len <= index {
                new_len *= 2;
            }
            self.field_to_attr.resize(new_len, None);
        }
        ensure!(
            self.field_to_attr[index].is_none(),
            InvalidMetaSnafu {
                reason: format!("field {field_id} is already bound to an attribute"),
            }
        );
        self.field_to_attr[index] = Some(attr_id);
        Ok(())
    }

    /// Finds an attribute by name, whatever its status.
    pub fn attribute_config(&self, name: &str) -> Option<&AttributeConfig> {
        self.name_to_id
            .get(name)
            .map(|id| &self.attributes[*id as usize])
    }

    pub fn attribute_config_by_id(&self, attr_id: AttrId) -> Option<&AttributeConfig> {
        self.attributes.get(attr_id as usize)
    }

    pub fn attribute_config_by_field_id(&self, field_id: FieldId) -> Option<&AttributeConfig> {
        let attr_id = self.field_to_attr.get(field_id as usize).copied().flatten()?;
        self.attribute_config_by_id(attr_id)
    }

    pub fn pack_attribute_config(&self, name: &str) -> Option<&PackAttributeConfig> {
        self.pack_name_to_id
            .get(name)
            .map(|id| &self.packs[*id as usize])
    }

    pub fn pack_attribute_config_by_id(&self, pack_id: PackId) -> Option<&PackAttributeConfig> {
        self.packs.get(pack_id as usize)
    }

    /// Returns the id of the pack owning `attr_id`, or `None` for standalone
    /// attributes.
    pub fn pack_id_by_attribute_id(&self, attr_id: AttrId) -> Option<PackId> {
        self.attr_to_pack.get(&attr_id).copied()
    }

    /// Returns true if a non deleted attribute with this name exists.
    pub fn contains_attribute(&self, name: &str) -> bool {
        self.attribute_config(name)
            .map(|config| !config.is_deleted())
            .unwrap_or(false)
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    pub fn attributes(&self) -> &[AttributeConfig] {
        &self.attributes
    }

    pub fn packs(&self) -> &[PackAttributeConfig] {
        &self.packs
    }

    /// Packs that accept updates and are visible to readers.
    pub fn updatable_packs(&self) -> impl Iterator<Item = &PackAttributeConfig> {
        self.packs
            .iter()
            .filter(|pack| pack.updatable && !pack.is_disabled())
    }

    /// Number of attributes present when the base schema was frozen, or the
    /// current count while it is still mutable.
    pub fn base_attribute_count(&self) -> usize {
        self.base_attribute_count.unwrap_or(self.attributes.len())
    }

    pub fn state(&self) -> SchemaState {
        self.state
    }

    /// Hides a standalone attribute from readers while keeping its storage.
    pub fn disable_attribute(&mut self, name: &str) -> Result<()> {
        let attr_id = *self
            .name_to_id
            .get(name)
            .context(AttributeNotFoundSnafu { name })?;
        ensure!(
            !self.attr_to_pack.contains_key(&attr_id),
            AttributeInPackSnafu { name }
        );
        self.attributes[attr_id as usize].status = AttributeStatus::Disabled;
        Ok(())
    }

    /// Hides a pack and all of its members from readers.
    pub fn disable_pack_attribute(&mut self, name: &str) -> Result<()> {
        let pack_id = *self
            .pack_name_to_id
            .get(name)
            .context(AttributeNotFoundSnafu { name })?;
        let member_ids = {
            let pack = &mut self.packs[pack_id as usize];
            pack.status = AttributeStatus::Disabled;
            for member in &mut pack.sub_attributes {
                member.status = AttributeStatus::Disabled;
            }
            pack.member_ids.clone()
        };
        for attr_id in member_ids {
            self.attributes[attr_id as usize].status = AttributeStatus::Disabled;
        }
        Ok(())
    }

    /// Drops a standalone attribute from the schema. The id and name stay
    /// reserved so later registrations can not reuse them.
    pub fn delete_attribute(&mut self, name: &str) -> Result<()> {
        let attr_id = *self
            .name_to_id
            .get(name)
            .context(AttributeNotFoundSnafu { name })?;
        ensure!(
            !self.attr_to_pack.contains_key(&attr_id),
            AttributeInPackSnafu { name }
        );
        self.attributes[attr_id as usize].status = AttributeStatus::Deleted;
        Ok(())
    }

    /// Snapshots the current attribute count as the base. A no-op once the
    /// base is frozen.
    pub fn set_base_schema_immutable(&mut self) {
        if self.state == SchemaState::Mutable {
            self.base_attribute_count = Some(self.attributes.len());
            self.state = SchemaState::BaseImmutable;
        }
    }

    /// Seals evolution attributes, only virtual additions remain legal.
    pub fn set_modify_schema_immutable(&mut self) -> Result<()> {
        ensure!(
            self.state != SchemaState::Mutable,
            InvalidSchemaStateSnafu {
                op: "seal the modify schema",
            }
        );
        self.state = SchemaState::ModifyImmutable;
        Ok(())
    }

    /// Reopens the schema for evolution attributes without resetting the
    /// base snapshot.
    pub fn set_modify_schema_mutable(&mut self) -> Result<()> {
        ensure!(
            self.state != SchemaState::Mutable,
            InvalidSchemaStateSnafu {
                op: "reopen the modify schema",
            }
        );
        self.state = SchemaState::BaseImmutable;
        Ok(())
    }

    /// Ensures `other` holds exactly the same attribute and pack vectors.
    pub fn assert_equal(&self, other: &AttributeSchema) -> Result<()> {
        ensure!(
            self.attributes == other.attributes,
            InvalidMetaSnafu {
                reason: format!(
                    "attribute configs differ, {} attributes vs {}",
                    self.attributes.len(),
                    other.attributes.len()
                ),
            }
        );
        ensure!(
            self.packs == other.packs,
            InvalidMetaSnafu {
                reason: format!(
                    "pack attribute configs differ, {} packs vs {}",
                    self.packs.len(),
                    other.packs.len()
                ),
            }
        );
        Ok(())
    }

    /// Ensures this schema is a prefix of `other`, so data written under
    /// this schema stays readable under `other`.
    pub fn assert_compatible(&self, other: &AttributeSchema) -> Result<()> {
        ensure!(
            self.attributes.len() <= other.attributes.len(),
            InvalidMetaSnafu {
                reason: format!(
                    "schema with {} attributes is not compatible with {}",
                    self.attributes.len(),
                    other.attributes.len()
                ),
            }
        );
        for (mine, theirs) in self.attributes.iter().zip(&other.attributes) {
            ensure!(
                mine == theirs,
                InvalidMetaSnafu {
                    reason: format!("attribute {} differs between schemas", mine.attr_name),
                }
            );
        }
        ensure!(
            self.packs.len() <= other.packs.len(),
            InvalidMetaSnafu {
                reason: format!(
                    "schema with {} packs is not compatible with {}",
                    self.packs.len(),
                    other.packs.len()
                ),
            }
        );
        for (mine, theirs) in self.packs.iter().zip(&other.packs) {
            ensure!(
                mine == theirs,
                InvalidMetaSnafu {
                    reason: format!("pack {} differs between schemas", mine.pack_name),
                }
            );
        }
        Ok(())
    }

    pub fn has_same_attribute_configs(&self, other: &AttributeSchema) -> bool {
        self.attributes == other.attributes && self.packs == other.packs
    }

    /// Decode the schema from a JSON str.
    pub fn from_json(s: &str) -> Result<AttributeSchema> {
        serde_json::from_str(s).context(SerdeJsonSnafu)
    }

    /// Encode the schema to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context(SerdeJsonSnafu)
    }
}

/// One entry of the serialized attribute list.
///
/// Pack members appear once through their owning pack, legacy attributes as
/// a bare name string and everything else as a full config object. Virtual
/// attributes are runtime only and never serialized.
#[derive(Deserialize)]
#[serde(untagged)]
enum AttributeEntry {
    Legacy(String),
    Pack(PackAttributeConfig),
    Attr(AttributeConfig),
}

impl Serialize for AttributeSchema {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        #[serde(untagged)]
        enum AttributeEntryRef<'a> {
            Legacy(&'a str),
            Pack(&'a PackAttributeConfig),
            Attr(&'a AttributeConfig),
        }

        #[derive(Serialize)]
        struct AttributeSchemaRepr<'a> {
            attributes: Vec<AttributeEntryRef<'a>>,
            #[serde(skip_serializing_if = "Option::is_none")]
            base_attribute_count: Option<usize>,
        }

        let mut entries = Vec::with_capacity(self.attributes.len());
        for config in &self.attributes {
            if config.is_virtual() {
                continue;
            }
            if let Some(pack_id) = self.attr_to_pack.get(&config.attr_id) {
                let pack = &self.packs[*pack_id as usize];
                // The pack is emitted at the position of its first member.
                if pack.member_ids.first() == Some(&config.attr_id) {
                    entries.push(AttributeEntryRef::Pack(pack));
                }
                continue;
            }
            if config.legacy {
                entries.push(AttributeEntryRef::Legacy(&config.attr_name));
            } else {
                entries.push(AttributeEntryRef::Attr(config));
            }
        }

        AttributeSchemaRepr {
            attributes: entries,
            base_attribute_count: self.base_attribute_count,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttributeSchema {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct AttributeSchemaRepr {
            attributes: Vec<AttributeEntry>,
            #[serde(default)]
            base_attribute_count: Option<usize>,
        }

        // Rebuild through the add path so duplicate names, conflicting field
        // bindings and invalid configs are rejected on load.
        let repr = AttributeSchemaRepr::deserialize(deserializer)?;
        let mut schema = AttributeSchema::new();
        for entry in repr.attributes {
            match entry {
                AttributeEntry::Legacy(name) => {
                    schema
                        .add_attribute_config(AttributeConfig::new_legacy(name))
                        .map_err(D::Error::custom)?;
                }
                AttributeEntry::Pack(pack) => {
                    schema
                        .add_pack_attribute_config(pack)
                        .map_err(D::Error::custom)?;
                }
                AttributeEntry::Attr(config) => {
                    schema
                        .add_attribute_config(config)
                        .map_err(D::Error::custom)?;
                }
            }
        }
        if let Some(base) = repr.base_attribute_count {
            if base > schema.attributes.len() {
                return Err(D::Error::custom(format!(
                    "base attribute count {} exceeds {} attributes",
                    base,
                    schema.attributes.len()
                )));
            }
            schema.base_attribute_count = Some(base);
            schema.state = SchemaState::BaseImmutable;
        }
        Ok(schema)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetadataError {
    #[snafu(display("Attribute or pack {} already exists", name))]
    AttributeExists { name: String, location: Location },

    #[snafu(display("Attribute {} not found", name))]
    AttributeNotFound { name: String, location: Location },

    #[snafu(display("Schema allows only virtual attributes, can not add {}", name))]
    SchemaImmutable { name: String, location: Location },

    #[snafu(display("Base schema is still mutable, can not {}", op))]
    InvalidSchemaState {
        op: &'static str,
        location: Location,
    },

    #[snafu(display("Attribute {} belongs to a pack", name))]
    AttributeInPack { name: String, location: Location },

    #[snafu(display("Invalid metadata, {}", reason))]
    InvalidMeta { reason: String, location: Location },

    #[snafu(display("Failed to ser/de json object. Location: {}, source: {}", location, source))]
    SerdeJson {
        location: Location,
        source: serde_json::Error,
    },
}

impl ErrorExt for MetadataError {
    fn status_code(&self) -> StatusCode {
        match self {
            MetadataError::AttributeExists { .. } => StatusCode::AttributeAlreadyExists,
            MetadataError::AttributeNotFound { .. } => StatusCode::AttributeNotFound,
            MetadataError::SchemaImmutable { .. } | MetadataError::InvalidSchemaState { .. } => {
                StatusCode::SchemaImmutable
            }
            MetadataError::AttributeInPack { .. } | MetadataError::InvalidMeta { .. } => {
                StatusCode::InvalidArguments
            }
            MetadataError::SerdeJson { .. } => StatusCode::Unexpected,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
