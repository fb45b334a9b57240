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

//! Error types for lock record operations.

use thiserror::Error;

/// Result type for lock record operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock record operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// No lock record exists for the resource
    #[error("Lock not found: {0}")]
    LockNotFound(String),

    /// Lock held by another owner (or by shared holders when exclusive was asked)
    #[error("Lock already held by: {0}")]
    LockAlreadyHeld(String),

    /// Owner is not among the record's holders
    #[error("Lock on {resource_id} not held by: {owner}")]
    NotHolder {
        /// Resource the release targeted
        resource_id: String,
        /// Owner that tried to release
        owner: String,
    },

    /// Break token does not match the holder's current token
    #[error("Token mismatch: expected {expected}, got {actual}")]
    TokenMismatch {
        /// Token currently recorded
        expected: String,
        /// Token supplied by the caller
        actual: String,
    },

    /// Invalid resource id
    #[error("Invalid lock key: {0}")]
    InvalidKey(String),

    /// Invalid owner identity
    #[error("Invalid holder ID: {0}")]
    InvalidHolderId(String),

    /// Backend error (database, network, etc.)
    #[error("Backend error: {0}")]
    BackendError(String),
}

impl LockError {
    /// Whether the error reports contention, i.e. a benign racing outcome of acquire.
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::LockAlreadyHeld(_))
    }

    /// Whether the error reports that the lock is already free for this owner
    /// (missing record, not a holder, or a holder that was re-taken since).
    pub fn is_already_free(&self) -> bool {
        matches!(
            self,
            LockError::LockNotFound(_) | LockError::NotHolder { .. } | LockError::TokenMismatch { .. }
        )
    }
}
