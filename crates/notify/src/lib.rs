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

//! # LockWatch Notify
//!
//! ## Purpose
//! Defines the messages exchanged over a resource's broadcast notification
//! channel: the versioned [`NotifyMessage`] envelope with one typed
//! [`NotifyPayload`] per opcode, and the single-integer [`ResponseMessage`]
//! that receivers return for request-class opcodes.
//!
//! ## Architecture Context
//! This crate is the leaf of the LockWatch stack:
//! - **lockwatch-channel** moves the encoded bytes around and collects replies
//! - **lockwatch-watcher** encodes outgoing notifications and decodes incoming
//!   ones before routing them to the lock state machine, the async request
//!   tracker or the registered listeners
//!
//! ## Wire Format
//! ```text
//! NotifyEnvelope { version: u32, op: u32, payload: bytes }
//!                                          └── opcode-specific prost message
//! ResponseMessage { result: optional sint32 }   (empty reply = no decision)
//! ```
//!
//! ## Design Decisions
//! - **Proto-first**: every payload is a prost message, so new fields can be
//!   added without breaking older decoders
//! - **Fail closed on newer envelopes**: a version above [`NOTIFY_VERSION`]
//!   is rejected rather than guessed at
//! - **Forward compatible opcodes**: unknown opcodes decode to
//!   [`NotifyPayload::Unknown`] and are ignored by receivers
//!
//! ## Examples
//! ```rust
//! use lockwatch_notify::{AsyncRequestId, NotifyMessage, NotifyPayload, ResponseMessage};
//!
//! let id = AsyncRequestId::new(42, 1);
//! let bytes = NotifyMessage::new(NotifyPayload::Resize { request_id: id, size: 4096 }).encode();
//! let decoded = NotifyMessage::decode(&bytes).unwrap();
//! assert_eq!(decoded.payload.async_request_id(), Some(id));
//!
//! let reply = ResponseMessage::new(0).encode();
//! assert_eq!(ResponseMessage::decode_reply(&reply), Some(ResponseMessage::new(0)));
//! assert_eq!(ResponseMessage::decode_reply(&[]), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errno;
mod error;
mod message;
mod op;
mod response;
pub mod wire;

pub use error::{NotifyError, NotifyResult};
pub use message::{AsyncRequestId, NotifyMessage, NotifyPayload, NOTIFY_VERSION};
pub use op::NotifyOp;
pub use response::ResponseMessage;
