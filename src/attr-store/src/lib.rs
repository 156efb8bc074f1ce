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

//! Attribute store of a partition.
//!
//! Attributes are forward-index columns of a table: fixed layout binary
//! records grouped into pack attributes, one data file per pack per segment.
//! This crate covers the record codec ([record]), in place update tracking
//! over built segments ([update]), persisted update and data statistics
//! ([update::info], [estimate]) and the size planning that decides how much
//! memory reopening a new version costs ([estimate]).

pub mod config;
pub mod error;
pub mod estimate;
pub mod location;
pub mod metrics;
pub mod record;
pub mod segment;
#[cfg(test)]
pub(crate) mod test_util;
pub mod update;
pub mod version;
