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

//! Prost wire messages.
//!
//! These mirror what a `notify.proto` would generate. They are public so
//! that tooling and tests can craft raw envelopes, but regular callers go
//! through [`crate::NotifyMessage`] and [`crate::ResponseMessage`].

/// Outer envelope. `op` is encoded before the opcode-specific payload.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotifyEnvelope {
    /// Envelope format version
    #[prost(uint32, tag = "1")]
    pub version: u32,
    /// Raw opcode
    #[prost(uint32, tag = "2")]
    pub op: u32,
    /// Opcode-specific payload
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
}

/// Reply to a request-class opcode.
///
/// `result` is optional so that a result of `0` still encodes to a
/// non-empty buffer: an empty reply means "no decision".
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResponseWire {
    /// Result code (0 or negated errno)
    #[prost(sint32, optional, tag = "1")]
    pub result: Option<i32>,
}

/// Correlation id of a remote async operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, ::prost::Message)]
pub struct AsyncRequestIdWire {
    /// Subscription handle of the requester
    #[prost(uint64, tag = "1")]
    pub client_id: u64,
    /// Requester-local sequence number
    #[prost(uint64, tag = "2")]
    pub request_id: u64,
}

/// Payload of `acquired-lock`, `released-lock` and `request-lock`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LockOwnerWire {
    /// Subscription handle of the sender
    #[prost(uint64, tag = "1")]
    pub client_id: u64,
}

/// Payload of `async-progress`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AsyncProgressWire {
    /// Request being reported on
    #[prost(message, optional, tag = "1")]
    pub async_request_id: Option<AsyncRequestIdWire>,
    /// Units of work done
    #[prost(uint64, tag = "2")]
    pub offset: u64,
    /// Units of work in total
    #[prost(uint64, tag = "3")]
    pub total: u64,
}

/// Payload of `async-complete`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AsyncCompleteWire {
    /// Request being completed
    #[prost(message, optional, tag = "1")]
    pub async_request_id: Option<AsyncRequestIdWire>,
    /// Terminal result (0 or negated errno)
    #[prost(sint32, tag = "2")]
    pub result: i32,
}

/// Payload of `flatten` and `rebuild-object-map`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AsyncRequestWire {
    /// Correlation id chosen by the requester
    #[prost(message, optional, tag = "1")]
    pub async_request_id: Option<AsyncRequestIdWire>,
}

/// Payload of `resize`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResizeWire {
    /// Correlation id chosen by the requester
    #[prost(message, optional, tag = "1")]
    pub async_request_id: Option<AsyncRequestIdWire>,
    /// New size in bytes
    #[prost(uint64, tag = "2")]
    pub size: u64,
}

/// Payload of `snap-create`, `snap-remove`, `snap-protect`, `snap-unprotect`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SnapNameWire {
    /// Snapshot name
    #[prost(string, tag = "1")]
    pub snap_name: String,
}

/// Payload of `snap-rename`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SnapRenameWire {
    /// Id of the snapshot to rename
    #[prost(uint64, tag = "1")]
    pub snap_id: u64,
    /// New snapshot name
    #[prost(string, tag = "2")]
    pub snap_name: String,
}

/// Payload of `rename`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RenameWire {
    /// New resource name
    #[prost(string, tag = "1")]
    pub name: String,
}
