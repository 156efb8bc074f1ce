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

//! Tracking of in place updates against sealed segments.
//!
//! Updates land in per segment bitmaps during a cycle and are dumped as
//! per segment counts into the building segment, where the size estimator
//! picks them up on the next load.

pub mod bitmap;
pub mod info;
pub mod updater;
