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

//! Locations of attribute files inside a partition directory.
//!
//! ```text
//! <partition>/
//!   version.<id>
//!   segment_<id>/
//!     segment_info
//!     attribute/<pack_name>/{data, attribute_update_info, attribute_data_info}
//!     sub_segment/attribute/<pack_name>/...      # sub table, when present
//! ```

use object_store::util::{join_dir, join_path};
use store_api::storage::{SegmentId, VersionId};

/// Directory holding the attribute data of a segment.
pub const ATTRIBUTE_DIR: &str = "attribute";
/// Directory holding the sub table data of a segment.
pub const SUB_SEGMENT_DIR: &str = "sub_segment";
/// Attribute values of all documents of one pack.
pub const DATA_FILE_NAME: &str = "data";
/// Per segment update counts of one pack, see
/// [AttributeUpdateInfo](crate::update::info::AttributeUpdateInfo).
pub const UPDATE_INFO_FILE_NAME: &str = "attribute_update_info";
/// Size statistics of one pack, see
/// [AttributeDataInfo](crate::estimate::AttributeDataInfo).
pub const DATA_INFO_FILE_NAME: &str = "attribute_data_info";
/// Document counts of a segment.
pub const SEGMENT_INFO_FILE_NAME: &str = "segment_info";

const SEGMENT_DIR_PREFIX: &str = "segment_";
const VERSION_FILE_PREFIX: &str = "version.";

/// Returns the directory of a segment.
pub fn segment_dir(partition_dir: &str, segment_id: SegmentId) -> String {
    join_dir(partition_dir, &format!("{SEGMENT_DIR_PREFIX}{segment_id}"))
}

/// Returns the sub table directory nested in a segment.
pub fn sub_segment_dir(segment_dir: &str) -> String {
    join_dir(segment_dir, SUB_SEGMENT_DIR)
}

/// Returns the directory of one pack attribute inside a segment.
pub fn attribute_dir(segment_dir: &str, pack_name: &str) -> String {
    join_dir(&join_dir(segment_dir, ATTRIBUTE_DIR), pack_name)
}

pub fn data_file_path(attribute_dir: &str) -> String {
    join_path(attribute_dir, DATA_FILE_NAME)
}

pub fn update_info_path(attribute_dir: &str) -> String {
    join_path(attribute_dir, UPDATE_INFO_FILE_NAME)
}

pub fn data_info_path(attribute_dir: &str) -> String {
    join_path(attribute_dir, DATA_INFO_FILE_NAME)
}

pub fn segment_info_path(segment_dir: &str) -> String {
    join_path(segment_dir, SEGMENT_INFO_FILE_NAME)
}

pub fn version_file_path(partition_dir: &str, version_id: VersionId) -> String {
    join_path(partition_dir, &format!("{VERSION_FILE_PREFIX}{version_id}"))
}

/// Parses the version id out of a version file name, e.g. `version.3`.
pub fn parse_version_file_name(file_name: &str) -> Option<VersionId> {
    file_name
        .strip_prefix(VERSION_FILE_PREFIX)?
        .parse::<VersionId>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_locations() {
        // join_dir keeps a leading `/` while join_path drops it, the
        // operator normalizes both to the same object.
        let segment = segment_dir("table/p0/", 42);
        assert_eq!("/table/p0/segment_42/", segment);
        assert_eq!("table/p0/segment_42/segment_info", segment_info_path(&segment));

        let attribute = attribute_dir(&segment, "stats");
        assert_eq!("/table/p0/segment_42/attribute/stats/", attribute);
        assert_eq!(
            "table/p0/segment_42/attribute/stats/data",
            data_file_path(&attribute)
        );
        assert_eq!(
            "table/p0/segment_42/attribute/stats/attribute_update_info",
            update_info_path(&attribute)
        );
        assert_eq!(
            "table/p0/segment_42/attribute/stats/attribute_data_info",
            data_info_path(&attribute)
        );

        let sub = attribute_dir(&sub_segment_dir(&segment), "stats");
        assert_eq!("/table/p0/segment_42/sub_segment/attribute/stats/", sub);
    }

    #[test]
    fn test_version_file_names() {
        assert_eq!("table/p0/version.7", version_file_path("table/p0/", 7));
        assert_eq!(Some(7), parse_version_file_name("version.7"));
        assert_eq!(None, parse_version_file_name("version.x"));
        assert_eq!(None, parse_version_file_name("segment_info"));
    }
}
