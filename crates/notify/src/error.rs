// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of LockWatch.
//
// LockWatch is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// LockWatch is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with LockWatch. If not, see <https://www.gnu.org/licenses/>.

//! Error types for envelope encoding and decoding.

use thiserror::Error;

/// Result type for notify codec operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors raised while decoding a notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Envelope was produced by a newer protocol revision
    #[error("Unsupported notify version {version} (supported up to {supported})")]
    UnsupportedVersion {
        /// Version carried by the envelope
        version: u32,
        /// Highest version this decoder understands
        supported: u32,
    },

    /// Envelope or payload bytes are malformed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Payload is missing a field its opcode requires
    #[error("Missing field '{field}' for op {op}")]
    MissingField {
        /// Raw opcode
        op: u32,
        /// Field name
        field: &'static str,
    },
}

impl From<prost::DecodeError> for NotifyError {
    fn from(err: prost::DecodeError) -> Self {
        NotifyError::Decode(err.to_string())
    }
}
