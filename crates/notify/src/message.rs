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

//! Notification envelope and typed payloads.

use crate::wire::{
    AsyncCompleteWire, AsyncProgressWire, AsyncRequestIdWire, AsyncRequestWire, LockOwnerWire,
    NotifyEnvelope, RenameWire, ResizeWire, SnapNameWire, SnapRenameWire,
};
use crate::{NotifyError, NotifyOp, NotifyResult};
use prost::Message;
use std::fmt;

/// Highest envelope version produced and understood by this revision.
///
/// Version 1 lock payloads carried no client id; version 2 added it along
/// with async request ids. Prost decoding fills absent fields with defaults,
/// so older envelopes remain readable.
pub const NOTIFY_VERSION: u32 = 2;

/// Correlates a remote operation across requester and owner.
///
/// `client_id` is the requester's subscription handle, `request_id` a
/// sequence number that only grows for the lifetime of that subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AsyncRequestId {
    /// Subscription handle of the requester
    pub client_id: u64,
    /// Requester-local sequence number
    pub request_id: u64,
}

impl AsyncRequestId {
    /// Create a request id.
    pub fn new(client_id: u64, request_id: u64) -> Self {
        Self {
            client_id,
            request_id,
        }
    }

    fn to_wire(self) -> AsyncRequestIdWire {
        AsyncRequestIdWire {
            client_id: self.client_id,
            request_id: self.request_id,
        }
    }

    fn from_wire(op: NotifyOp, wire: Option<AsyncRequestIdWire>) -> NotifyResult<Self> {
        wire.map(|w| Self::new(w.client_id, w.request_id))
            .ok_or(NotifyError::MissingField {
                op: op.as_u32(),
                field: "async_request_id",
            })
    }
}

impl fmt::Display for AsyncRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.client_id, self.request_id)
    }
}

/// Opcode-specific payload of a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyPayload {
    /// Sender now owns the exclusive lock
    AcquiredLock {
        /// Sender subscription handle
        client_id: u64,
    },
    /// Sender no longer owns the exclusive lock
    ReleasedLock {
        /// Sender subscription handle
        client_id: u64,
    },
    /// Sender asks the owner to hand the lock over
    RequestLock {
        /// Sender subscription handle
        client_id: u64,
    },
    /// Resource header changed
    HeaderUpdate,
    /// Progress of a remote async operation
    AsyncProgress {
        /// Request being reported on
        request_id: AsyncRequestId,
        /// Units done
        offset: u64,
        /// Units total
        total: u64,
    },
    /// Completion of a remote async operation
    AsyncComplete {
        /// Request being completed
        request_id: AsyncRequestId,
        /// 0 or negated errno
        result: i32,
    },
    /// Flatten the resource
    Flatten {
        /// Correlation id
        request_id: AsyncRequestId,
    },
    /// Resize the resource
    Resize {
        /// Correlation id
        request_id: AsyncRequestId,
        /// New size in bytes
        size: u64,
    },
    /// Rebuild the object map
    RebuildObjectMap {
        /// Correlation id
        request_id: AsyncRequestId,
    },
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
    /// Opcode from a newer protocol revision; receivers ignore it
    Unknown {
        /// Raw opcode
        op: u32,
    },
}

impl NotifyPayload {
    /// Raw opcode of this payload.
    pub fn op_code(&self) -> u32 {
        match self {
            NotifyPayload::Unknown { op } => *op,
            known => known.op().map(NotifyOp::as_u32).unwrap_or_default(),
        }
    }

    /// Typed opcode, `None` for [`NotifyPayload::Unknown`].
    pub fn op(&self) -> Option<NotifyOp> {
        let op = match self {
            NotifyPayload::AcquiredLock { .. } => NotifyOp::AcquiredLock,
            NotifyPayload::ReleasedLock { .. } => NotifyOp::ReleasedLock,
            NotifyPayload::RequestLock { .. } => NotifyOp::RequestLock,
            NotifyPayload::HeaderUpdate => NotifyOp::HeaderUpdate,
            NotifyPayload::AsyncProgress { .. } => NotifyOp::AsyncProgress,
            NotifyPayload::AsyncComplete { .. } => NotifyOp::AsyncComplete,
            NotifyPayload::Flatten { .. } => NotifyOp::Flatten,
            NotifyPayload::Resize { .. } => NotifyOp::Resize,
            NotifyPayload::RebuildObjectMap { .. } => NotifyOp::RebuildObjectMap,
            NotifyPayload::SnapCreate { .. } => NotifyOp::SnapCreate,
            NotifyPayload::SnapRename { .. } => NotifyOp::SnapRename,
            NotifyPayload::SnapRemove { .. } => NotifyOp::SnapRemove,
            NotifyPayload::SnapProtect { .. } => NotifyOp::SnapProtect,
            NotifyPayload::SnapUnprotect { .. } => NotifyOp::SnapUnprotect,
            NotifyPayload::Rename { .. } => NotifyOp::Rename,
            NotifyPayload::Unknown { .. } => return None,
        };
        Some(op)
    }

    /// Correlation id for payloads that carry one.
    pub fn async_request_id(&self) -> Option<AsyncRequestId> {
        match self {
            NotifyPayload::AsyncProgress { request_id, .. }
            | NotifyPayload::AsyncComplete { request_id, .. }
            | NotifyPayload::Flatten { request_id }
            | NotifyPayload::Resize { request_id, .. }
            | NotifyPayload::RebuildObjectMap { request_id } => Some(*request_id),
            _ => None,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        match self {
            NotifyPayload::AcquiredLock { client_id }
            | NotifyPayload::ReleasedLock { client_id }
            | NotifyPayload::RequestLock { client_id } => LockOwnerWire {
                client_id: *client_id,
            }
            .encode_to_vec(),
            NotifyPayload::HeaderUpdate | NotifyPayload::Unknown { .. } => Vec::new(),
            NotifyPayload::AsyncProgress {
                request_id,
                offset,
                total,
            } => AsyncProgressWire {
                async_request_id: Some(request_id.to_wire()),
                offset: *offset,
                total: *total,
            }
            .encode_to_vec(),
            NotifyPayload::AsyncComplete { request_id, result } => AsyncCompleteWire {
                async_request_id: Some(request_id.to_wire()),
                result: *result,
            }
            .encode_to_vec(),
            NotifyPayload::Flatten { request_id }
            | NotifyPayload::RebuildObjectMap { request_id } => AsyncRequestWire {
                async_request_id: Some(request_id.to_wire()),
            }
            .encode_to_vec(),
            NotifyPayload::Resize { request_id, size } => ResizeWire {
                async_request_id: Some(request_id.to_wire()),
                size: *size,
            }
            .encode_to_vec(),
            NotifyPayload::SnapCreate { snap_name }
            | NotifyPayload::SnapRemove { snap_name }
            | NotifyPayload::SnapProtect { snap_name }
            | NotifyPayload::SnapUnprotect { snap_name } => SnapNameWire {
                snap_name: snap_name.clone(),
            }
            .encode_to_vec(),
            NotifyPayload::SnapRename { snap_id, snap_name } => SnapRenameWire {
                snap_id: *snap_id,
                snap_name: snap_name.clone(),
            }
            .encode_to_vec(),
            NotifyPayload::Rename { name } => RenameWire { name: name.clone() }.encode_to_vec(),
        }
    }

    fn decode_body(raw_op: u32, body: &[u8]) -> NotifyResult<Self> {
        let Some(op) = NotifyOp::from_u32(raw_op) else {
            return Ok(NotifyPayload::Unknown { op: raw_op });
        };

        let payload = match op {
            NotifyOp::AcquiredLock => NotifyPayload::AcquiredLock {
                client_id: LockOwnerWire::decode(body)?.client_id,
            },
            NotifyOp::ReleasedLock => NotifyPayload::ReleasedLock {
                client_id: LockOwnerWire::decode(body)?.client_id,
            },
            NotifyOp::RequestLock => NotifyPayload::RequestLock {
                client_id: LockOwnerWire::decode(body)?.client_id,
            },
            NotifyOp::HeaderUpdate => NotifyPayload::HeaderUpdate,
            NotifyOp::AsyncProgress => {
                let wire = AsyncProgressWire::decode(body)?;
                NotifyPayload::AsyncProgress {
                    request_id: AsyncRequestId::from_wire(op, wire.async_request_id)?,
                    offset: wire.offset,
                    total: wire.total,
                }
            }
            NotifyOp::AsyncComplete => {
                let wire = AsyncCompleteWire::decode(body)?;
                NotifyPayload::AsyncComplete {
                    request_id: AsyncRequestId::from_wire(op, wire.async_request_id)?,
                    result: wire.result,
                }
            }
            NotifyOp::Flatten => NotifyPayload::Flatten {
                request_id: AsyncRequestId::from_wire(
                    op,
                    AsyncRequestWire::decode(body)?.async_request_id,
                )?,
            },
            NotifyOp::RebuildObjectMap => NotifyPayload::RebuildObjectMap {
                request_id: AsyncRequestId::from_wire(
                    op,
                    AsyncRequestWire::decode(body)?.async_request_id,
                )?,
            },
            NotifyOp::Resize => {
                let wire = ResizeWire::decode(body)?;
                NotifyPayload::Resize {
                    request_id: AsyncRequestId::from_wire(op, wire.async_request_id)?,
                    size: wire.size,
                }
            }
            NotifyOp::SnapCreate => NotifyPayload::SnapCreate {
                snap_name: SnapNameWire::decode(body)?.snap_name,
            },
            NotifyOp::SnapRemove => NotifyPayload::SnapRemove {
                snap_name: SnapNameWire::decode(body)?.snap_name,
            },
            NotifyOp::SnapProtect => NotifyPayload::SnapProtect {
                snap_name: SnapNameWire::decode(body)?.snap_name,
            },
            NotifyOp::SnapUnprotect => NotifyPayload::SnapUnprotect {
                snap_name: SnapNameWire::decode(body)?.snap_name,
            },
            NotifyOp::SnapRename => {
                let wire = SnapRenameWire::decode(body)?;
                NotifyPayload::SnapRename {
                    snap_id: wire.snap_id,
                    snap_name: wire.snap_name,
                }
            }
            NotifyOp::Rename => NotifyPayload::Rename {
                name: RenameWire::decode(body)?.name,
            },
        };
        Ok(payload)
    }
}

/// A notification as published on a resource's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyMessage {
    /// Envelope version the message was encoded with
    pub version: u32,
    /// Typed payload
    pub payload: NotifyPayload,
}

impl NotifyMessage {
    /// Wrap a payload in a current-version envelope.
    pub fn new(payload: NotifyPayload) -> Self {
        Self {
            version: NOTIFY_VERSION,
            payload,
        }
    }

    /// Encode to bytes for publishing.
    pub fn encode(&self) -> Vec<u8> {
        NotifyEnvelope {
            version: self.version,
            op: self.payload.op_code(),
            payload: self.payload.encode_body(),
        }
        .encode_to_vec()
    }

    /// Decode bytes received from the channel.
    ///
    /// ## Errors
    /// - [`NotifyError::UnsupportedVersion`]: envelope newer than [`NOTIFY_VERSION`]
    /// - [`NotifyError::Decode`]: malformed bytes or missing version
    /// - [`NotifyError::MissingField`]: payload lacks a required field
    ///
    /// Unknown opcodes are not an error; they decode to [`NotifyPayload::Unknown`].
    pub fn decode(bytes: &[u8]) -> NotifyResult<Self> {
        let envelope = NotifyEnvelope::decode(bytes)?;
        if envelope.version == 0 {
            return Err(NotifyError::Decode("envelope without version".to_string()));
        }
        if envelope.version > NOTIFY_VERSION {
            return Err(NotifyError::UnsupportedVersion {
                version: envelope.version,
                supported: NOTIFY_VERSION,
            });
        }

        Ok(Self {
            version: envelope.version,
            payload: NotifyPayload::decode_body(envelope.op, &envelope.payload)?,
        })
    }
}

impl From<NotifyPayload> for NotifyMessage {
    fn from(payload: NotifyPayload) -> Self {
        NotifyMessage::new(payload)
    }
}
