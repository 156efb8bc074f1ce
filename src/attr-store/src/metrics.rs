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

//! Attribute store metrics.

use lazy_static::lazy_static;
use prometheus::*;

/// Type label.
pub const TYPE_LABEL: &str = "type";
/// File type label.
pub const FILE_TYPE_LABEL: &str = "file_type";

lazy_static! {
    /// Counter of tracked document updates.
    pub static ref UPDATE_DOCS_TOTAL: IntCounter = register_int_counter!(
        "greptime_attr_update_docs_total",
        "attr tracked document updates total"
    )
    .unwrap();
    /// Counter of updates dropped because the doc id was out of range.
    pub static ref UPDATE_DOCS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        "greptime_attr_update_docs_dropped_total",
        "attr out of range document updates total"
    )
    .unwrap();
    /// Memory taken by in flight update bitmaps.
    pub static ref UPDATE_BITMAP_BYTES: IntGauge = register_int_gauge!(
        "greptime_attr_update_bitmap_bytes",
        "attr update bitmap bytes"
    )
    .unwrap();
    /// Elapsed time of reading and writing attribute files.
    pub static ref FILE_IO_ELAPSED: HistogramVec = register_histogram_vec!(
        "greptime_attr_file_io_elapsed",
        "attr file io elapsed",
        &[TYPE_LABEL, FILE_TYPE_LABEL]
    )
    .unwrap();
    /// Estimated expand size of the latest reopen plan.
    pub static ref ESTIMATED_EXPAND_BYTES: IntGauge = register_int_gauge!(
        "greptime_attr_estimated_expand_bytes",
        "attr estimated expand bytes"
    )
    .unwrap();
    /// Elapsed time of update size estimation.
    pub static ref ESTIMATE_ELAPSED: Histogram = register_histogram!(
        "greptime_attr_estimate_elapsed",
        "attr estimate elapsed"
    )
    .unwrap();
}
