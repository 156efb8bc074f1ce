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

/// Id of an attribute, assigned by registration order within a schema.
pub type AttrId = u32;

/// Id of a pack attribute, assigned by registration order within a schema.
pub type PackId = u32;

/// Id of the document field an attribute is bound to.
pub type FieldId = u32;

/// Id of a segment inside a partition.
pub type SegmentId = u32;

/// Global id of a document inside a partition.
pub type DocId = u32;

/// Id of an on-disk partition version.
pub type VersionId = u32;

/// Unix timestamp in milliseconds.
pub type Timestamp = i64;
