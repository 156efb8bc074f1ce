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

//! Binary record codec for pack attributes.
//!
//! Every document of a pack is one record: a fixed region laid out by the
//! pack config followed by a variable region. Fixed width members live at
//! their member offset, variable length members store a 4 byte displacement
//! there that points at the value in the variable region, relative to the
//! slot itself.

mod builder;
mod float_compress;
mod multi_value;
mod reference;

pub use self::builder::RecordBuffer;
pub use self::multi_value::{decode_varint_u32, encode_varint_u32, MultiValue, NativeValue};
pub use self::reference::{
    AttributeReference, AttributeReferenceTyped, FieldCodec, MULTI_VALUE_SEPARATOR,
};
