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

//! Notification opcodes.

use std::fmt;

/// Opcode carried in every notification envelope.
///
/// The numeric values are part of the wire format and must never be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotifyOp {
    /// A peer took the exclusive lock
    AcquiredLock,
    /// A peer gave the exclusive lock up
    ReleasedLock,
    /// A peer asks the current owner to release the lock
    RequestLock,
    /// Resource header changed, peers should refresh
    HeaderUpdate,
    /// Progress of a remote async operation
    AsyncProgress,
    /// Completion of a remote async operation
    AsyncComplete,
    /// Flatten (async)
    Flatten,
    /// Resize (async)
    Resize,
    /// Create a snapshot
    SnapCreate,
    /// Remove a snapshot
    SnapRemove,
    /// Rebuild the object map (async)
    RebuildObjectMap,
    /// Rename a snapshot
    SnapRename,
    /// Protect a snapshot
    SnapProtect,
    /// Unprotect a snapshot
    SnapUnprotect,
    /// Rename the resource
    Rename,
}

impl NotifyOp {
    /// Every known opcode, in wire order.
    pub const ALL: [NotifyOp; 15] = [
        NotifyOp::AcquiredLock,
        NotifyOp::ReleasedLock,
        NotifyOp::RequestLock,
        NotifyOp::HeaderUpdate,
        NotifyOp::AsyncProgress,
        NotifyOp::AsyncComplete,
        NotifyOp::Flatten,
        NotifyOp::Resize,
        NotifyOp::SnapCreate,
        NotifyOp::SnapRemove,
        NotifyOp::RebuildObjectMap,
        NotifyOp::SnapRename,
        NotifyOp::SnapProtect,
        NotifyOp::SnapUnprotect,
        NotifyOp::Rename,
    ];

    /// Wire value of this opcode.
    pub fn as_u32(self) -> u32 {
        match self {
            NotifyOp::AcquiredLock => 0,
            NotifyOp::ReleasedLock => 1,
            NotifyOp::RequestLock => 2,
            NotifyOp::HeaderUpdate => 3,
            NotifyOp::AsyncProgress => 4,
            NotifyOp::AsyncComplete => 5,
            NotifyOp::Flatten => 6,
            NotifyOp::Resize => 7,
            NotifyOp::SnapCreate => 8,
            NotifyOp::SnapRemove => 9,
            NotifyOp::RebuildObjectMap => 10,
            NotifyOp::SnapRename => 11,
            NotifyOp::SnapProtect => 12,
            NotifyOp::SnapUnprotect => 13,
            NotifyOp::Rename => 14,
        }
    }

    /// Opcode for a wire value, `None` for opcodes this revision does not know.
    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_u32() == value)
    }

    /// Whether receivers answer this opcode with a [`crate::ResponseMessage`].
    pub fn is_request(self) -> bool {
        matches!(
            self,
            NotifyOp::RequestLock
                | NotifyOp::Flatten
                | NotifyOp::Resize
                | NotifyOp::RebuildObjectMap
                | NotifyOp::SnapCreate
                | NotifyOp::SnapRemove
                | NotifyOp::SnapRename
                | NotifyOp::SnapProtect
                | NotifyOp::SnapUnprotect
                | NotifyOp::Rename
        )
    }

    /// Whether the owner executes this opcode in the background and reports
    /// through `async-progress` / `async-complete`.
    pub fn is_async_request(self) -> bool {
        matches!(
            self,
            NotifyOp::Flatten | NotifyOp::Resize | NotifyOp::RebuildObjectMap
        )
    }

    /// Stable lowercase name, used in logs.
    pub fn name(self) -> &'static str {
        match self {
            NotifyOp::AcquiredLock => "acquired_lock",
            NotifyOp::ReleasedLock => "released_lock",
            NotifyOp::RequestLock => "request_lock",
            NotifyOp::HeaderUpdate => "header_update",
            NotifyOp::AsyncProgress => "async_progress",
            NotifyOp::AsyncComplete => "async_complete",
            NotifyOp::Flatten => "flatten",
            NotifyOp::Resize => "resize",
            NotifyOp::SnapCreate => "snap_create",
            NotifyOp::SnapRemove => "snap_remove",
            NotifyOp::RebuildObjectMap => "rebuild_object_map",
            NotifyOp::SnapRename => "snap_rename",
            NotifyOp::SnapProtect => "snap_protect",
            NotifyOp::SnapUnprotect => "snap_unprotect",
            NotifyOp::Rename => "rename",
        }
    }
}

impl fmt::Display for NotifyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
