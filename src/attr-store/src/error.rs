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

use std::any::Any;

use common_error::ext::ErrorExt;
use common_error::status_code::StatusCode;
use snafu::{Location, Snafu};
use store_api::metadata::FieldType;
use store_api::storage::SegmentId;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("OpenDAL operator failed. Location: {}, source: {}", location, source))]
    OpenDal {
        location: Location,
        source: object_store::Error,
    },

    #[snafu(display(
        "Failed to ser/de json object. Location: {}, source: {}",
        location,
        source
    ))]
    SerdeJson {
        location: Location,
        source: serde_json::Error,
    },

    #[snafu(display(
        "Attribute value is not valid utf8. Location: {}, source: {}",
        location,
        source
    ))]
    Utf8 {
        location: Location,
        source: std::str::Utf8Error,
    },

    #[snafu(display("Invalid record, {}", reason))]
    InvalidRecord { reason: String, location: Location },

    #[snafu(display(
        "Attribute {} stores {} values, can not access as {}",
        attr_name,
        actual,
        expect
    ))]
    TypeMismatch {
        attr_name: String,
        expect: FieldType,
        actual: FieldType,
        location: Location,
    },

    #[snafu(display("Unsupported operation, {}", reason))]
    Unsupported { reason: String, location: Location },

    #[snafu(display("Update info already has segment {}", segment_id))]
    DuplicateUpdateSegment {
        segment_id: SegmentId,
        location: Location,
    },

    #[snafu(display("Invalid metadata, {}", reason))]
    InvalidMeta { reason: String, location: Location },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if the error is the object path to read
    /// doesn't exist.
    pub fn is_object_not_found(&self) -> bool {
        if let Error::OpenDal { source, .. } = self {
            source.kind() == object_store::ErrorKind::NotFound
        } else {
            false
        }
    }
}

impl ErrorExt for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::OpenDal { .. } => StatusCode::StorageUnavailable,
            Error::SerdeJson { .. }
            | Error::Utf8 { .. }
            | Error::InvalidRecord { .. }
            | Error::DuplicateUpdateSegment { .. }
            | Error::InvalidMeta { .. } => StatusCode::Unexpected,
            Error::TypeMismatch { .. } => StatusCode::InvalidArguments,
            Error::Unsupported { .. } => StatusCode::Unsupported,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
