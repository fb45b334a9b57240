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

//! In-memory notify bus shared by every subscriber in one process

use crate::observability::{
    record_notify_dropped, record_notify_published, record_notify_timeout,
    record_subscription_lost,
};
use crate::{
    ChannelError, ChannelResult, LivenessOracle, Notification, NotifyAck, NotifyChannel,
    NotifyHandler, PublishOutcome, SubscriptionHandle,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::debug;

struct Subscriber {
    resource_id: String,
    handler: Arc<dyn NotifyHandler>,
}

#[derive(Default)]
struct BusState {
    subscribers: HashMap<SubscriptionHandle, Subscriber>,
    muted: HashSet<SubscriptionHandle>,
    closed: bool,
}

/// In-memory notify bus
///
/// ## Purpose
/// Implements [`NotifyChannel`] and [`LivenessOracle`] for processes that
/// share one address space: tests, simulations and single-node deployments.
///
/// ## Design Decisions
/// - **Snapshot delivery**: the subscriber set is copied under a short read
///   lock; handlers run without any bus lock held, so a handler may publish
/// - **Spawned handlers**: each delivery runs in its own task and the round
///   waits on it with a timeout, so a slow handler still finishes its work
///   after missing the round
/// - **Fault injection**: subscribers can be muted (alive but unresponsive)
///   or killed (subscription lost) to exercise peer failures
#[derive(Clone)]
pub struct InMemoryNotifyBus {
    state: Arc<RwLock<BusState>>,
    next_handle: Arc<AtomicU64>,
    next_notify_id: Arc<AtomicU64>,
}

impl Default for InMemoryNotifyBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNotifyBus {
    /// Create an empty bus. Handles start at 1.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BusState::default())),
            next_handle: Arc::new(AtomicU64::new(1)),
            next_notify_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Live subscriptions on a resource, in handle order.
    pub async fn subscribers(&self, resource_id: &str) -> Vec<SubscriptionHandle> {
        let state = self.state.read().await;
        let mut handles: Vec<_> = state
            .subscribers
            .iter()
            .filter(|(_, s)| s.resource_id == resource_id)
            .map(|(h, _)| *h)
            .collect();
        handles.sort_unstable();
        handles
    }

    /// Keep a subscription live but drop everything delivered to it.
    pub async fn set_muted(&self, handle: SubscriptionHandle, muted: bool) {
        let mut state = self.state.write().await;
        if muted {
            state.muted.insert(handle);
        } else {
            state.muted.remove(&handle);
        }
    }

    /// Tear a subscription down as a failing transport would.
    ///
    /// The handle stops being live and its handler receives
    /// [`ChannelError::SubscriptionLost`].
    pub async fn kill_subscription(&self, handle: SubscriptionHandle) -> ChannelResult<()> {
        let subscriber = {
            let mut state = self.state.write().await;
            state.muted.remove(&handle);
            state
                .subscribers
                .remove(&handle)
                .ok_or(ChannelError::SubscriptionNotFound(handle))?
        };

        record_subscription_lost(&subscriber.resource_id, handle);
        subscriber
            .handler
            .handle_error(handle, ChannelError::SubscriptionLost(handle))
            .await;
        Ok(())
    }

    /// Close the bus. Every later subscribe or publish fails.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        state.closed = true;
        state.subscribers.clear();
        state.muted.clear();
    }
}

#[async_trait]
impl NotifyChannel for InMemoryNotifyBus {
    async fn subscribe(
        &self,
        resource_id: &str,
        handler: Arc<dyn NotifyHandler>,
    ) -> ChannelResult<SubscriptionHandle> {
        if resource_id.is_empty() {
            return Err(ChannelError::InvalidConfiguration(
                "resource id is empty".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if state.closed {
            return Err(ChannelError::ChannelClosed(resource_id.to_string()));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        state.subscribers.insert(
            handle,
            Subscriber {
                resource_id: resource_id.to_string(),
                handler,
            },
        );
        debug!(resource = %resource_id, handle = handle, "subscribed");
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> ChannelResult<()> {
        let mut state = self.state.write().await;
        state.muted.remove(&handle);
        let removed = state
            .subscribers
            .remove(&handle)
            .ok_or(ChannelError::SubscriptionNotFound(handle))?;
        debug!(resource = %removed.resource_id, handle = handle, "unsubscribed");
        Ok(())
    }

    async fn publish(
        &self,
        resource_id: &str,
        sender: Option<SubscriptionHandle>,
        payload: Vec<u8>,
        round_timeout: Duration,
    ) -> ChannelResult<PublishOutcome> {
        let started = Instant::now();
        let notify_id = self.next_notify_id.fetch_add(1, Ordering::SeqCst);

        let targets: Vec<(SubscriptionHandle, Option<Arc<dyn NotifyHandler>>)> = {
            let state = self.state.read().await;
            if state.closed {
                return Err(ChannelError::ChannelClosed(resource_id.to_string()));
            }
            state
                .subscribers
                .iter()
                .filter(|(_, s)| s.resource_id == resource_id)
                .map(|(handle, s)| {
                    let handler = if state.muted.contains(handle) {
                        None
                    } else {
                        Some(s.handler.clone())
                    };
                    (*handle, handler)
                })
                .collect()
        };
        let subscribers = targets.len();

        let deliveries = targets.into_iter().map(|(handle, handler)| {
            let notification = Notification {
                resource_id: resource_id.to_string(),
                notify_id,
                sender,
                payload: payload.clone(),
            };
            async move {
                let Some(handler) = handler else {
                    record_notify_dropped(&notification.resource_id, handle, "muted");
                    tokio::time::sleep(round_timeout).await;
                    return (handle, None);
                };
                let task = tokio::spawn(async move { handler.handle_notify(notification).await });
                match timeout(round_timeout, task).await {
                    Ok(Ok(reply)) => (handle, Some(reply)),
                    Ok(Err(_)) => {
                        record_notify_dropped(resource_id, handle, "handler_panicked");
                        (handle, None)
                    }
                    Err(_) => (handle, None),
                }
            }
        });

        let mut outcome = PublishOutcome::default();
        for (handle, reply) in join_all(deliveries).await {
            match reply {
                Some(reply) => outcome.acks.push(NotifyAck {
                    subscriber: handle,
                    reply,
                }),
                None => {
                    record_notify_timeout(resource_id, notify_id, handle);
                    outcome.timed_out.push(handle);
                }
            }
        }

        record_notify_published(
            resource_id,
            notify_id,
            subscribers,
            outcome.acks.len(),
            started.elapsed(),
        );
        Ok(outcome)
    }
}

#[async_trait]
impl LivenessOracle for InMemoryNotifyBus {
    async fn is_live(&self, resource_id: &str, handle: SubscriptionHandle) -> ChannelResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .subscribers
            .get(&handle)
            .map(|s| s.resource_id == resource_id)
            .unwrap_or(false))
    }
}
