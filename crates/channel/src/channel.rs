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

//! Notify channel traits and error types

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Opaque handle of a live subscription.
///
/// Handles are unique for the lifetime of a channel and never reused, so
/// they can be embedded in owner identities and request ids.
pub type SubscriptionHandle = u64;

/// Errors that can occur during channel operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Channel is closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Handle does not name a live subscription
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionHandle),

    /// Subscription was torn down by the transport
    #[error("Subscription lost: {0}")]
    SubscriptionLost(SubscriptionHandle),

    /// Invalid argument or configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Backend-specific error
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// One message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Resource whose channel carried the message
    pub resource_id: String,
    /// Correlation id of the notify round
    pub notify_id: u64,
    /// Publishing subscription, `None` for anonymous publishers
    pub sender: Option<SubscriptionHandle>,
    /// Encoded payload
    pub payload: Vec<u8>,
}

/// A subscriber's synchronous reply within a notify round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyAck {
    /// Subscriber that replied
    pub subscriber: SubscriptionHandle,
    /// Reply payload, empty for "received, no decision"
    pub reply: Vec<u8>,
}

/// Aggregated result of one notify round.
///
/// Replies arrive in any order and are aggregated as a set. A subscriber
/// that missed the round is listed in `timed_out`, which is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Replies received within the round
    pub acks: Vec<NotifyAck>,
    /// Subscribers that did not reply in time
    pub timed_out: Vec<SubscriptionHandle>,
}

impl PublishOutcome {
    /// Non-empty replies, i.e. replies that carry a decision.
    pub fn replies(&self) -> impl Iterator<Item = &NotifyAck> {
        self.acks.iter().filter(|ack| !ack.reply.is_empty())
    }
}

/// Receives notifications for one subscription.
///
/// ## Design Decisions
/// - **Synchronous reply**: the returned bytes are the ack payload of the round
/// - **Short path**: implementations must not block on long-held locks, or
///   they stall every other peer's round
#[async_trait]
pub trait NotifyHandler: Send + Sync {
    /// Handle one notification and return the ack payload.
    async fn handle_notify(&self, notification: Notification) -> Vec<u8>;

    /// The transport lost the subscription. No more notifications follow.
    async fn handle_error(&self, handle: SubscriptionHandle, error: ChannelError) {
        let _ = (handle, error);
    }
}

/// Broadcast notification channel shared by every process with a resource open.
///
/// ## Purpose
/// Carries lock and request notifications between peers and aggregates their
/// synchronous replies per round.
///
/// ## Invariants
/// - `publish` delivers to every subscriber live at publish time, the
///   publisher included
/// - A subscriber that does not reply within `timeout` is absent from
///   `acks` but does not fail the round
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Register a handler for a resource's notifications.
    ///
    /// ## Errors
    /// - [`ChannelError::ChannelClosed`]: channel shut down
    /// - [`ChannelError::InvalidConfiguration`]: empty resource id
    async fn subscribe(
        &self,
        resource_id: &str,
        handler: Arc<dyn NotifyHandler>,
    ) -> ChannelResult<SubscriptionHandle>;

    /// Remove a subscription.
    ///
    /// ## Errors
    /// - [`ChannelError::SubscriptionNotFound`]: handle unknown or already removed
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> ChannelResult<()>;

    /// Run one notify round.
    ///
    /// ## Errors
    /// - [`ChannelError::ChannelClosed`]: channel shut down
    async fn publish(
        &self,
        resource_id: &str,
        sender: Option<SubscriptionHandle>,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> ChannelResult<PublishOutcome>;
}

/// Tells whether a subscription is still live.
///
/// Used for stale-lock detection: a lock record naming a dead subscription
/// may be broken.
#[async_trait]
pub trait LivenessOracle: Send + Sync {
    /// Whether `handle` is a live subscription on `resource_id`'s channel.
    async fn is_live(&self, resource_id: &str, handle: SubscriptionHandle) -> ChannelResult<bool>;
}
