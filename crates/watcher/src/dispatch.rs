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

//! Notification dispatch.
//!
//! Decodes every delivery on the transport's path and routes it to the
//! state machine, the tracker or the listeners. Nothing here waits on the
//! ownership lock: work that needs it is spawned, and synchronous owner
//! operations only take it if it is immediately available.

use crate::broadcast::publish_best_effort;
use crate::coordinator::LockCoordinator;
use crate::error::result_code;
use crate::hooks::{NoOpProgress, ProgressSink, ResourceOperation};
use crate::state::{LockState, LockUpdateState};
use crate::WatcherError;
use async_trait::async_trait;
use lockwatch_channel::{ChannelError, Notification, NotifyHandler, SubscriptionHandle};
use lockwatch_notify::{AsyncRequestId, NotifyMessage, NotifyPayload, ResponseMessage};
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Channel handler bound to a coordinator after it is built.
pub(crate) struct WatchHandler {
    coordinator: OnceLock<Weak<LockCoordinator>>,
}

impl WatchHandler {
    pub(crate) fn new() -> Self {
        Self {
            coordinator: OnceLock::new(),
        }
    }

    pub(crate) fn bind(&self, coordinator: &Arc<LockCoordinator>) {
        let _ = self.coordinator.set(Arc::downgrade(coordinator));
    }

    fn coordinator(&self) -> Option<Arc<LockCoordinator>> {
        self.coordinator.get().and_then(Weak::upgrade)
    }
}

#[async_trait]
impl NotifyHandler for WatchHandler {
    async fn handle_notify(&self, notification: Notification) -> Vec<u8> {
        match self.coordinator() {
            Some(coordinator) => coordinator.handle_notification(notification).await,
            None => Vec::new(),
        }
    }

    async fn handle_error(&self, handle: SubscriptionHandle, error: ChannelError) {
        if let Some(coordinator) = self.coordinator() {
            coordinator.handle_watch_error(handle, error);
        }
    }
}

/// Forwards owner-side progress to a publishing task, in order.
struct ForwardProgress(mpsc::UnboundedSender<(u64, u64)>);

impl ProgressSink for ForwardProgress {
    fn update_progress(&self, offset: u64, total: u64) {
        let _ = self.0.send((offset, total));
    }
}

fn accepted() -> Vec<u8> {
    ResponseMessage::new(0).encode()
}

impl LockCoordinator {
    pub(crate) async fn handle_notification(
        self: &Arc<Self>,
        notification: Notification,
    ) -> Vec<u8> {
        let message = match NotifyMessage::decode(&notification.payload) {
            Ok(message) => message,
            Err(e) => {
                debug!(
                    resource = %self.resource_id,
                    handle = self.handle,
                    notify_id = notification.notify_id,
                    error = %e,
                    "dropping undecodable notification"
                );
                return Vec::new();
            }
        };
        let from_self = notification.sender == Some(self.handle);
        trace!(
            resource = %self.resource_id,
            handle = self.handle,
            notify_id = notification.notify_id,
            op = message.payload.op_code(),
            from_self = from_self,
            "notification received"
        );

        match message.payload {
            NotifyPayload::AcquiredLock { client_id } => {
                if !from_self {
                    self.handle_acquired_lock(client_id);
                }
                Vec::new()
            }
            NotifyPayload::ReleasedLock { client_id } => {
                if !from_self {
                    self.handle_released_lock(client_id);
                }
                Vec::new()
            }
            NotifyPayload::RequestLock { client_id } => {
                if from_self {
                    return Vec::new();
                }
                self.handle_request_lock(client_id)
            }
            NotifyPayload::HeaderUpdate => {
                if !from_self {
                    self.notify_header_listeners();
                }
                Vec::new()
            }
            NotifyPayload::AsyncProgress {
                request_id,
                offset,
                total,
            } => {
                if request_id.client_id == self.handle {
                    self.tracker.handle_progress(request_id, offset, total);
                }
                Vec::new()
            }
            NotifyPayload::AsyncComplete { request_id, result } => {
                if request_id.client_id == self.handle {
                    self.tracker.handle_complete(request_id, result);
                }
                Vec::new()
            }
            NotifyPayload::Unknown { op } => {
                debug!(resource = %self.resource_id, op = op, "ignoring unknown opcode");
                Vec::new()
            }
            payload => {
                if from_self {
                    return Vec::new();
                }
                self.handle_operation_request(&payload).await
            }
        }
    }

    fn handle_acquired_lock(self: &Arc<Self>, client_id: u64) {
        debug!(
            resource = %self.resource_id,
            handle = self.handle,
            peer = client_id,
            "peer acquired lock"
        );
        self.notify_listeners(LockUpdateState::Notification);

        if self.state.is_lock_owner() {
            let coordinator = self.clone();
            tokio::spawn(async move { coordinator.revalidate_ownership(client_id).await });
        }
    }

    /// A peer claims the lock while we believe we own it: our record was
    /// broken as stale. Trust the store, not the message.
    async fn revalidate_ownership(self: Arc<Self>, peer: u64) {
        let _guard = self.owner_lock.write().await;
        if !self.state.is_lock_owner() {
            return;
        }
        match self.state.record_names_self().await {
            Ok(true) => debug!(
                resource = %self.resource_id,
                handle = self.handle,
                peer = peer,
                "lock record still ours, ignoring peer acquired-lock"
            ),
            Ok(false) => {
                warn!(
                    resource = %self.resource_id,
                    handle = self.handle,
                    peer = peer,
                    "lock was taken over by peer"
                );
                if self.state.force_unlocked() {
                    self.notify_listeners(LockUpdateState::Unlocked);
                }
            }
            Err(e) => warn!(
                resource = %self.resource_id,
                handle = self.handle,
                error = %e,
                "failed to revalidate lock ownership"
            ),
        }
    }

    fn handle_released_lock(&self, client_id: u64) {
        debug!(
            resource = %self.resource_id,
            handle = self.handle,
            peer = client_id,
            "peer released lock"
        );
        self.bump_release_epoch();
        self.notify_listeners(LockUpdateState::Notification);
    }

    fn handle_request_lock(self: &Arc<Self>, client_id: u64) -> Vec<u8> {
        if self.release_pending.load(Ordering::SeqCst) {
            return accepted();
        }
        if self.state.state() != LockState::LockedBySelf {
            return Vec::new();
        }
        if !self.listeners_permit_release() {
            info!(
                resource = %self.resource_id,
                handle = self.handle,
                peer = client_id,
                "listener declined lock request"
            );
            return Vec::new();
        }
        if self
            .release_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!(
                resource = %self.resource_id,
                handle = self.handle,
                peer = client_id,
                "releasing lock for peer"
            );
            let coordinator = self.clone();
            tokio::spawn(async move { coordinator.release_for_peer().await });
        }
        accepted()
    }

    /// Flush, then release, under the exclusive ownership lock.
    async fn release_for_peer(self: Arc<Self>) {
        {
            let _guard = self.owner_lock.write().await;
            if self.state.is_lock_owner() {
                self.state.set_state(LockState::Releasing);
                self.notify_listeners(LockUpdateState::Releasing);

                let released = match self.flush.flush_pending_writes().await {
                    Ok(()) => self.release_while_exclusive().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = released {
                    warn!(
                        resource = %self.resource_id,
                        handle = self.handle,
                        error = %e,
                        "handoff failed, keeping lock"
                    );
                    // A lost subscription has already forced us to Unlocked
                    if self
                        .state
                        .transition(LockState::Releasing, LockState::LockedBySelf)
                        && self.subscription_live()
                    {
                        self.notify_listeners(LockUpdateState::Locked);
                    }
                }
            }
        }
        self.release_pending.store(false, Ordering::SeqCst);
    }

    async fn handle_operation_request(self: &Arc<Self>, payload: &NotifyPayload) -> Vec<u8> {
        let Some((operation, request_id)) = ResourceOperation::from_payload(payload) else {
            return Vec::new();
        };
        if !self.state.is_lock_owner() {
            return Vec::new();
        }
        match request_id {
            Some(id) => self.accept_async_operation(id, operation),
            None => self.run_sync_operation(operation).await,
        }
    }

    fn accept_async_operation(
        self: &Arc<Self>,
        id: AsyncRequestId,
        operation: ResourceOperation,
    ) -> Vec<u8> {
        if !self.tracker.begin_remote(id) {
            debug!(
                resource = %self.resource_id,
                request_id = %id,
                "duplicate request, already executing"
            );
            return accepted();
        }
        if let Err(e) = self.operations.validate(&operation) {
            self.tracker.finish_remote(id);
            return ResponseMessage::new(e.code()).encode();
        }

        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.run_remote_operation(id, operation).await });
        accepted()
    }

    async fn run_remote_operation(self: Arc<Self>, id: AsyncRequestId, operation: ResourceOperation) {
        let op = operation.op();
        let (tx, mut rx) = mpsc::unbounded_channel::<(u64, u64)>();
        let (done_tx, mut done_rx) = oneshot::channel::<()>();
        let forwarder = {
            let coordinator = self.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        update = rx.recv() => match update {
                            Some((offset, total)) => {
                                coordinator.publish_progress(id, offset, total).await;
                            }
                            None => break,
                        },
                        _ = &mut done_rx => {
                            // The sink may outlive `apply`; drain what was queued and stop
                            while let Ok((offset, total)) = rx.try_recv() {
                                coordinator.publish_progress(id, offset, total).await;
                            }
                            break;
                        }
                    }
                }
            })
        };

        let result = {
            let _guard = self.owner_lock.read().await;
            if self.state.is_lock_owner() {
                let sink: Arc<dyn ProgressSink> = Arc::new(ForwardProgress(tx));
                self.operations.apply(operation, sink).await
            } else {
                drop(tx);
                Err(WatcherError::Restart(format!(
                    "{} no longer owns {}",
                    self.handle, self.resource_id
                )))
            }
        };
        // Progress is published before completion
        let _ = done_tx.send(());
        let _ = forwarder.await;

        let code = result_code(&result);
        info!(
            resource = %self.resource_id,
            op = %op,
            request_id = %id,
            result = code,
            "remote operation finished"
        );
        if result.is_ok() {
            self.notify_header_update().await;
        }
        publish_best_effort(
            self.channel.as_ref(),
            &self.resource_id,
            Some(self.handle),
            NotifyPayload::AsyncComplete {
                request_id: id,
                result: code,
            },
            self.config.notify_timeout,
        )
        .await;
        self.tracker.finish_remote(id);
    }

    async fn publish_progress(&self, id: AsyncRequestId, offset: u64, total: u64) {
        publish_best_effort(
            self.channel.as_ref(),
            &self.resource_id,
            Some(self.handle),
            NotifyPayload::AsyncProgress {
                request_id: id,
                offset,
                total,
            },
            self.config.notify_timeout,
        )
        .await;
    }

    async fn run_sync_operation(self: &Arc<Self>, operation: ResourceOperation) -> Vec<u8> {
        let Ok(_guard) = self.owner_lock.try_read() else {
            debug!(
                resource = %self.resource_id,
                op = %operation.op(),
                "ownership changing, not answering"
            );
            return Vec::new();
        };
        if !self.state.is_lock_owner() {
            return Vec::new();
        }

        let op = operation.op();
        let result = self.operations.apply(operation, Arc::new(NoOpProgress)).await;
        debug!(
            resource = %self.resource_id,
            op = %op,
            result = result_code(&result),
            "executed operation for peer"
        );
        if result.is_ok() {
            let coordinator = self.clone();
            tokio::spawn(async move { coordinator.notify_header_update().await });
        }
        ResponseMessage::new(result_code(&result)).encode()
    }

    /// The transport lost our subscription: ownership is void and every
    /// pending request must be re-issued by its caller.
    pub(crate) fn handle_watch_error(&self, handle: SubscriptionHandle, error: ChannelError) {
        warn!(
            resource = %self.resource_id,
            handle = handle,
            error = %error,
            "watch error, dropping ownership"
        );
        self.watch_lost.store(true, Ordering::SeqCst);
        if self.state.force_unlocked() {
            self.notify_listeners(LockUpdateState::Unlocked);
        }
        self.tracker.fail_all(WatcherError::Restart(format!(
            "subscription {} lost",
            handle
        )));
    }
}
