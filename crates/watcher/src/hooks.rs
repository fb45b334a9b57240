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

//! Collaborator hooks supplied by the layer that owns the resource's data.

use crate::{WatcherError, WatcherResult};
use async_trait::async_trait;
use lockwatch_notify::{errno, AsyncRequestId, NotifyOp, NotifyPayload};
use std::sync::Arc;

/// Receives `(offset, total)` progress of a long-running operation.
pub trait ProgressSink: Send + Sync {
    /// Report progress. Called from the dispatch path; must not block.
    fn update_progress(&self, offset: u64, total: u64);
}

/// Progress sink that discards updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn update_progress(&self, _offset: u64, _total: u64) {}
}

/// Drains pending local mutating work before the lock is handed to a peer.
#[async_trait]
pub trait FlushHook: Send + Sync {
    /// Wait until no local mutation is in flight.
    async fn flush_pending_writes(&self) -> WatcherResult<()>;
}

/// Flush hook for resources without write-back state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpFlush;

#[async_trait]
impl FlushHook for NoOpFlush {
    async fn flush_pending_writes(&self) -> WatcherResult<()> {
        Ok(())
    }
}

/// Privileged operation that only the lock owner may execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOperation {
    /// Copy parent data into the resource (async)
    Flatten,
    /// Change the resource size (async)
    Resize {
        /// New size in bytes
        size: u64,
    },
    /// Rebuild the object map (async)
    RebuildObjectMap,
    /// Create a snapshot
    SnapCreate {
        /// Snapshot name
        snap_name: String,
    },
    /// Rename a snapshot
    SnapRename {
        /// Snapshot id
        snap_id: u64,
        /// New name
        snap_name: String,
    },
    /// Remove a snapshot
    SnapRemove {
        /// Snapshot name
        snap_name: String,
    },
    /// Protect a snapshot
    SnapProtect {
        /// Snapshot name
        snap_name: String,
    },
    /// Unprotect a snapshot
    SnapUnprotect {
        /// Snapshot name
        snap_name: String,
    },
    /// Rename the resource
    Rename {
        /// New resource name
        name: String,
    },
}

impl ResourceOperation {
    /// Opcode used to forward this operation to the owner.
    pub fn op(&self) -> NotifyOp {
        match self {
            ResourceOperation::Flatten => NotifyOp::Flatten,
            ResourceOperation::Resize { .. } => NotifyOp::Resize,
            ResourceOperation::RebuildObjectMap => NotifyOp::RebuildObjectMap,
            ResourceOperation::SnapCreate { .. } => NotifyOp::SnapCreate,
            ResourceOperation::SnapRename { .. } => NotifyOp::SnapRename,
            ResourceOperation::SnapRemove { .. } => NotifyOp::SnapRemove,
            ResourceOperation::SnapProtect { .. } => NotifyOp::SnapProtect,
            ResourceOperation::SnapUnprotect { .. } => NotifyOp::SnapUnprotect,
            ResourceOperation::Rename { .. } => NotifyOp::Rename,
        }
    }

    /// Whether the owner runs it in the background and reports progress.
    pub fn is_async(&self) -> bool {
        self.op().is_async_request()
    }

    /// Payload forwarding this operation. Async operations need `request_id`.
    pub(crate) fn to_payload(&self, request_id: AsyncRequestId) -> NotifyPayload {
        match self.clone() {
            ResourceOperation::Flatten => NotifyPayload::Flatten { request_id },
            ResourceOperation::Resize { size } => NotifyPayload::Resize { request_id, size },
            ResourceOperation::RebuildObjectMap => NotifyPayload::RebuildObjectMap { request_id },
            ResourceOperation::SnapCreate { snap_name } => NotifyPayload::SnapCreate { snap_name },
            ResourceOperation::SnapRename { snap_id, snap_name } => {
                NotifyPayload::SnapRename { snap_id, snap_name }
            }
            ResourceOperation::SnapRemove { snap_name } => NotifyPayload::SnapRemove { snap_name },
            ResourceOperation::SnapProtect { snap_name } => {
                NotifyPayload::SnapProtect { snap_name }
            }
            ResourceOperation::SnapUnprotect { snap_name } => {
                NotifyPayload::SnapUnprotect { snap_name }
            }
            ResourceOperation::Rename { name } => NotifyPayload::Rename { name },
        }
    }

    /// Operation requested by a payload, with its correlation id when async.
    pub(crate) fn from_payload(
        payload: &NotifyPayload,
    ) -> Option<(ResourceOperation, Option<AsyncRequestId>)> {
        let parsed = match payload.clone() {
            NotifyPayload::Flatten { request_id } => (ResourceOperation::Flatten, Some(request_id)),
            NotifyPayload::Resize { request_id, size } => {
                (ResourceOperation::Resize { size }, Some(request_id))
            }
            NotifyPayload::RebuildObjectMap { request_id } => {
                (ResourceOperation::RebuildObjectMap, Some(request_id))
            }
            NotifyPayload::SnapCreate { snap_name } => {
                (ResourceOperation::SnapCreate { snap_name }, None)
            }
            NotifyPayload::SnapRename { snap_id, snap_name } => {
                (ResourceOperation::SnapRename { snap_id, snap_name }, None)
            }
            NotifyPayload::SnapRemove { snap_name } => {
                (ResourceOperation::SnapRemove { snap_name }, None)
            }
            NotifyPayload::SnapProtect { snap_name } => {
                (ResourceOperation::SnapProtect { snap_name }, None)
            }
            NotifyPayload::SnapUnprotect { snap_name } => {
                (ResourceOperation::SnapUnprotect { snap_name }, None)
            }
            NotifyPayload::Rename { name } => (ResourceOperation::Rename { name }, None),
            _ => return None,
        };
        Some(parsed)
    }
}

/// Executes privileged operations against the resource.
///
/// Invoked on the owner only, with the coordinator's ownership lock held
/// shared, so a lock handoff waits until the operation returns.
#[async_trait]
pub trait ResourceOperations: Send + Sync {
    /// Quick admission check run before an async operation is accepted.
    ///
    /// A failure is replied to the requester immediately instead of `0`.
    fn validate(&self, operation: &ResourceOperation) -> WatcherResult<()> {
        let _ = operation;
        Ok(())
    }

    /// Run the operation to completion.
    ///
    /// `progress` is only forwarded to the requester until this returns;
    /// updates reported later through a retained clone are dropped.
    async fn apply(
        &self,
        operation: ResourceOperation,
        progress: Arc<dyn ProgressSink>,
    ) -> WatcherResult<()>;
}

/// Rejects every operation with `-EOPNOTSUPP`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedOperations;

#[async_trait]
impl ResourceOperations for UnsupportedOperations {
    async fn apply(
        &self,
        _operation: ResourceOperation,
        _progress: Arc<dyn ProgressSink>,
    ) -> WatcherResult<()> {
        Err(WatcherError::OperationFailed(-errno::EOPNOTSUPP))
    }
}
