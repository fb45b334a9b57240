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

//! Reply to request-class notifications.

use crate::wire::ResponseWire;
use prost::Message;

/// Decision returned by a subscriber that handled a request-class opcode.
///
/// `0` means accepted (or succeeded, for synchronous operations); any other
/// value is a negated errno. A subscriber that takes no action replies with
/// an empty buffer instead, which [`ResponseMessage::decode_reply`] maps to
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseMessage {
    /// 0 or negated errno
    pub result: i32,
}

impl ResponseMessage {
    /// Create a response.
    pub fn new(result: i32) -> Self {
        Self { result }
    }

    /// Encode for use as a notify ack payload. Never empty.
    pub fn encode(&self) -> Vec<u8> {
        ResponseWire {
            result: Some(self.result),
        }
        .encode_to_vec()
    }

    /// Interpret a subscriber's ack payload.
    ///
    /// Returns `None` for "received, no decision": an empty reply, a reply
    /// without a result, or bytes that are not a response at all.
    pub fn decode_reply(reply: &[u8]) -> Option<Self> {
        if reply.is_empty() {
            return None;
        }
        ResponseWire::decode(reply)
            .ok()
            .and_then(|wire| wire.result)
            .map(Self::new)
    }
}
