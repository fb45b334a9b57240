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

//! Channel observability helpers
//!
//! ## Purpose
//! Provides reusable observability helpers for notify rounds (publish,
//! per-subscriber timeout, dropped delivery, lost subscription) that can be
//! used both within channel implementations and by external transports.
//!
//! ## Usage
//! ```rust
//! use lockwatch_channel::observability::*;
//! use std::time::Duration;
//!
//! // After a notify round completes
//! record_notify_published("image-1", 7, 3, 2, Duration::from_millis(4));
//!
//! // When a subscriber misses the round
//! record_notify_timeout("image-1", 7, 12);
//! ```

use std::time::Duration;
use tracing::{debug, trace, warn};

/// Record a completed notify round
///
/// ## Arguments
/// * `resource_id` - Resource whose channel carried the round
/// * `notify_id` - Correlation id of the round
/// * `subscribers` - Subscribers the round was delivered to
/// * `acks` - Replies collected within the timeout
/// * `duration` - Wall time of the round
///
/// ## Observability
/// - Logs at trace level for high-volume operations
/// - Logs at debug level with structured fields
pub fn record_notify_published(
    resource_id: &str,
    notify_id: u64,
    subscribers: usize,
    acks: usize,
    duration: Duration,
) {
    trace!(
        resource = %resource_id,
        notify_id = notify_id,
        "Notify round finished"
    );

    debug!(
        resource = %resource_id,
        notify_id = notify_id,
        subscribers = subscribers,
        acks = acks,
        latency_us = duration.as_micros() as u64,
        operation = "publish",
        "Notify round: {}/{} subscribers replied",
        acks,
        subscribers
    );
}

/// Record a subscriber that did not reply within the round
///
/// ## Observability
/// - Logs at debug level: missing replies are an expected outcome of a round
pub fn record_notify_timeout(resource_id: &str, notify_id: u64, handle: u64) {
    debug!(
        resource = %resource_id,
        notify_id = notify_id,
        handle = handle,
        operation = "publish",
        "Notify round: subscriber did not reply in time"
    );
}

/// Record a delivery that was dropped before reaching the handler
///
/// ## Arguments
/// * `reason` - Why the delivery was dropped (e.g. "muted", "handler_panicked")
pub fn record_notify_dropped(resource_id: &str, handle: u64, reason: &str) {
    warn!(
        resource = %resource_id,
        handle = handle,
        reason = %reason,
        operation = "deliver",
        "Notify delivery dropped: {}",
        reason
    );
}

/// Record a subscription torn down by the transport
pub fn record_subscription_lost(resource_id: &str, handle: u64) {
    warn!(
        resource = %resource_id,
        handle = handle,
        operation = "watch",
        "Subscription lost"
    );
}
