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

//! Error types for lock coordination.

use lockwatch_channel::ChannelError;
use lockwatch_locks::LockError;
use lockwatch_notify::errno;
use thiserror::Error;

/// Result type for watcher operations.
pub type WatcherResult<T> = Result<T, WatcherError>;

/// Errors surfaced by the state machine, tracker and coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatcherError {
    /// Lock held elsewhere; recoverable by retry
    #[error("Lock busy: held by {0}")]
    Busy(String),

    /// Lock record names a dead subscription; recovered by breaking it
    #[error("Stale lock held by: {0}")]
    Stale(String),

    /// No subscriber replied with a decision within the notify round
    #[error("No reply to {0} within the notify round")]
    TimedOut(String),

    /// Async request watchdog expired or the owner went away;
    /// re-issue against the current owner
    #[error("Request must be restarted: {0}")]
    Restart(String),

    /// Owner executed the operation and it failed with this code
    #[error("Remote operation failed with code {0}")]
    RemoteFailure(i32),

    /// Publish or subscribe failure
    #[error("Transport error: {0}")]
    Transport(#[from] ChannelError),

    /// Lock record error other than contention, surfaced verbatim
    #[error("Lock record error: {0}")]
    Lock(LockError),

    /// Resource profile does not support exclusive locking
    #[error("Exclusive locking not supported: {0}")]
    Unsupported(String),

    /// Coordinator closed or its subscription was lost
    #[error("Watcher shut down: {0}")]
    Shutdown(String),

    /// Local operation failed with this code
    #[error("Operation failed with code {0}")]
    OperationFailed(i32),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<LockError> for WatcherError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::LockAlreadyHeld(owner) => WatcherError::Busy(owner),
            other => WatcherError::Lock(other),
        }
    }
}

impl WatcherError {
    /// Negated errno carried on the wire for this error.
    pub fn code(&self) -> i32 {
        match self {
            WatcherError::Busy(_) | WatcherError::Stale(_) => -errno::EBUSY,
            WatcherError::TimedOut(_) => -errno::ETIMEDOUT,
            WatcherError::Restart(_) => -errno::ERESTART,
            WatcherError::RemoteFailure(code) | WatcherError::OperationFailed(code) => {
                -code.abs()
            }
            WatcherError::Transport(_) | WatcherError::Lock(_) => -errno::EIO,
            WatcherError::Unsupported(_) => -errno::EOPNOTSUPP,
            WatcherError::Shutdown(_) => -errno::ESHUTDOWN,
            WatcherError::InvalidConfig(_) => -errno::EINVAL,
        }
    }

    /// Map a remote result code to a result. `0` is success.
    ///
    /// `-ERESTART` means the owner lost the lock before running the
    /// operation, so it maps back to [`WatcherError::Restart`].
    pub fn from_remote_code(code: i32) -> WatcherResult<()> {
        match code {
            0 => Ok(()),
            code if code == -errno::ERESTART => Err(WatcherError::Restart(
                "owner lost the lock before executing".to_string(),
            )),
            code => Err(WatcherError::RemoteFailure(code)),
        }
    }

    /// Whether the caller may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WatcherError::Busy(_) | WatcherError::TimedOut(_) | WatcherError::Restart(_)
        )
    }
}

/// Result code for an operation outcome: `0` or negated errno.
pub fn result_code(result: &WatcherResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}
