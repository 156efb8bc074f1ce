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

//! Configurations.

use std::time::Duration;

use common_base::readable_size::ReadableSize;
use common_telemetry::warn;
use serde::{Deserialize, Serialize};

/// Default in memory budget for update bitmaps before a dump is forced.
const DEFAULT_UPDATE_MEMORY_BUDGET: ReadableSize = ReadableSize::mb(64);

/// Default age after which realtime segment updates count as reclaimed.
const DEFAULT_RT_RECLAIM_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration of the attribute store.
/// Before using the config, make sure to call `AttrStoreConfig::sanitize()` to check if the config is valid.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AttrStoreConfig {
    /// Memory the in flight update bitmaps of one partition may take before
    /// the updater asks for a dump (default 64MiB).
    pub update_memory_budget: ReadableSize,
    /// Realtime segment updates older than this interval are assumed to be
    /// reclaimed into built segments and excluded from realtime size
    /// estimates (default 1h).
    #[serde(with = "humantime_serde")]
    pub rt_reclaim_interval: Duration,
}

impl Default for AttrStoreConfig {
    fn default() -> Self {
        AttrStoreConfig {
            update_memory_budget: DEFAULT_UPDATE_MEMORY_BUDGET,
            rt_reclaim_interval: DEFAULT_RT_RECLAIM_INTERVAL,
        }
    }
}

impl AttrStoreConfig {
    /// Sanitize incorrect configurations.
    pub fn sanitize(&mut self) {
        if self.update_memory_budget.as_bytes() == 0 {
            self.update_memory_budget = DEFAULT_UPDATE_MEMORY_BUDGET;
            warn!(
                "Sanitize update memory budget to {}",
                self.update_memory_budget
            );
        }

        if self.rt_reclaim_interval.is_zero() {
            self.rt_reclaim_interval = DEFAULT_RT_RECLAIM_INTERVAL;
            warn!(
                "Sanitize rt reclaim interval to {:?}",
                self.rt_reclaim_interval
            );
        }
    }
}
