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

//! Partition versions, the sets of segments visible to readers.

use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use store_api::storage::{SegmentId, Timestamp, VersionId};

use crate::error::{InvalidMetaSnafu, OpenDalSnafu, Result, SerdeJsonSnafu};
use crate::location;

/// One committed set of segments, persisted as `version.<id>` in the
/// partition directory. Readers diff two versions to find the segments
/// that became visible between loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub version_id: VersionId,
    /// Ascending, unique.
    pub segment_ids: Vec<SegmentId>,
    /// Commit time in milliseconds.
    pub timestamp: Timestamp,
}

impl Version {
    pub fn new(
        version_id: VersionId,
        mut segment_ids: Vec<SegmentId>,
        timestamp: Timestamp,
    ) -> Version {
        segment_ids.sort_unstable();
        segment_ids.dedup();
        Version {
            version_id,
            segment_ids,
            timestamp,
        }
    }

    /// Segment ids in this version but not in `older`.
    pub fn diff(&self, older: &Version) -> Vec<SegmentId> {
        self.segment_ids
            .iter()
            .copied()
            .filter(|segment_id| older.segment_ids.binary_search(segment_id).is_err())
            .collect()
    }

    /// Writes this version as `version.<id>` under `partition_dir`.
    pub async fn store(&self, object_store: &ObjectStore, partition_dir: &str) -> Result<()> {
        let path = location::version_file_path(partition_dir, self.version_id);
        let json = serde_json::to_vec(self).context(SerdeJsonSnafu)?;
        object_store.write(&path, json).await.context(OpenDalSnafu)?;
        Ok(())
    }

    /// Reads one version file, `None` when it does not exist.
    pub async fn load(
        object_store: &ObjectStore,
        partition_dir: &str,
        version_id: VersionId,
    ) -> Result<Option<Version>> {
        let path = location::version_file_path(partition_dir, version_id);
        let bytes = match object_store.read(&path).await.context(OpenDalSnafu) {
            Ok(bytes) => bytes.to_vec(),
            Err(err) if err.is_object_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let version: Version = serde_json::from_slice(&bytes).context(SerdeJsonSnafu)?;
        ensure!(
            version.version_id == version_id,
            InvalidMetaSnafu {
                reason: format!(
                    "version file {} holds version {}",
                    path, version.version_id
                ),
            }
        );
        ensure!(
            version.segment_ids.windows(2).all(|pair| pair[0] < pair[1]),
            InvalidMetaSnafu {
                reason: format!("segment ids of version {} are not ascending", version_id),
            }
        );
        Ok(Some(version))
    }

    /// Finds and reads the version file with the greatest id under
    /// `partition_dir`, `None` when the partition has none.
    pub async fn load_latest(
        object_store: &ObjectStore,
        partition_dir: &str,
    ) -> Result<Option<Version>> {
        let dir = object_store::util::normalize_dir(partition_dir);
        let entries = object_store.list(&dir).await.context(OpenDalSnafu)?;
        let latest = entries
            .iter()
            .filter_map(|entry| location::parse_version_file_name(entry.name()))
            .max();
        match latest {
            Some(version_id) => Self::load(object_store, partition_dir, version_id).await,
            None => Ok(None),
        }
    }
}
