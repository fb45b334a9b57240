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

//! Best-effort broadcasts and request rounds over a [`NotifyChannel`].

use lockwatch_channel::{NotifyChannel, SubscriptionHandle};
use lockwatch_notify::{NotifyMessage, NotifyPayload, ResponseMessage};
use std::time::Duration;
use tracing::{debug, warn};

/// Publish a notification whose replies nobody waits on.
///
/// Failures are logged and swallowed: `acquired-lock`, `released-lock`,
/// `header-update`, `async-progress` and `async-complete` are best-effort.
pub async fn publish_best_effort(
    channel: &dyn NotifyChannel,
    resource_id: &str,
    sender: Option<SubscriptionHandle>,
    payload: NotifyPayload,
    timeout: Duration,
) {
    let op = payload.op_code();
    let bytes = NotifyMessage::new(payload).encode();
    match channel.publish(resource_id, sender, bytes, timeout).await {
        Ok(outcome) => debug!(
            resource = %resource_id,
            op = op,
            acks = outcome.acks.len(),
            "broadcast delivered"
        ),
        Err(e) => warn!(
            resource = %resource_id,
            op = op,
            error = %e,
            "broadcast failed"
        ),
    }
}

/// Tell every subscriber of `resource_id` that its header changed.
pub async fn notify_header_update(
    channel: &dyn NotifyChannel,
    resource_id: &str,
    sender: Option<SubscriptionHandle>,
    timeout: Duration,
) {
    publish_best_effort(channel, resource_id, sender, NotifyPayload::HeaderUpdate, timeout).await;
}

/// Run one request round and return the first decision, if any.
///
/// Transport failures count as "no replies received".
pub async fn request_round(
    channel: &dyn NotifyChannel,
    resource_id: &str,
    sender: SubscriptionHandle,
    payload: NotifyPayload,
    timeout: Duration,
) -> Option<ResponseMessage> {
    let op = payload.op_code();
    let bytes = NotifyMessage::new(payload).encode();
    let outcome = match channel.publish(resource_id, Some(sender), bytes, timeout).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(
                resource = %resource_id,
                op = op,
                error = %e,
                "request publish failed, treating as no reply"
            );
            return None;
        }
    };

    let decision = outcome
        .replies()
        .find_map(|ack| ResponseMessage::decode_reply(&ack.reply));
    debug!(
        resource = %resource_id,
        op = op,
        acks = outcome.acks.len(),
        timed_out = outcome.timed_out.len(),
        result = ?decision.map(|r| r.result),
        "request round finished"
    );
    decision
}
