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

//! Lock handoff coordinator.
//!
//! ## Purpose
//! Orchestrates exclusive-lock ownership for one resource and subscription:
//! acquiring, releasing, requesting the lock from a peer, handing it over
//! when a peer asks, and forwarding privileged operations to the owner.
//!
//! ## Architecture Context
//! ```text
//!   caller ──▶ LockCoordinator ──▶ LockStateMachine ──▶ LockRecordStore
//!                 │      ▲                 │
//!                 │      │ dispatch        └──▶ NotifyChannel (acquired/released)
//!                 ▼      │
//!           NotifyChannel (request rounds) ──▶ peers
//!                 │
//!                 └──▶ AsyncRequestTracker (progress / completion)
//! ```
//!
//! ## Design Decisions
//! - **Ownership lock**: a per-resource `RwLock`; transitions take it
//!   exclusively, operations executing as owner take it shared, so a handoff
//!   waits for in-flight operations and the flush hook
//! - **Short bookkeeping locks**: listener lists, profile and state word sit
//!   behind std mutexes never held across an await; dispatch only uses these
//! - **Release epoch**: peer `released-lock` notifications bump a watch
//!   counter that wakes `request_lock` waiters
//! - **No retry ceiling**: `request_lock` and `execute` retry until success
//!   or a non-retryable error; callers impose deadlines

use crate::broadcast::{notify_header_update, request_round};
use crate::dispatch::WatchHandler;
use crate::hooks::{
    FlushHook, NoOpFlush, ProgressSink, ResourceOperation, ResourceOperations,
    UnsupportedOperations,
};
use crate::state::{LockState, LockStateMachine, LockUpdateState};
use crate::tracker::AsyncRequestTracker;
use crate::{LockListener, ResourceProfile, WatcherConfig, WatcherError, WatcherResult};
use lockwatch_channel::{LivenessOracle, NotifyChannel, SubscriptionHandle};
use lockwatch_locks::LockRecordStore;
use lockwatch_notify::NotifyPayload;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builds a [`LockCoordinator`] and subscribes it to the resource's channel.
pub struct LockCoordinatorBuilder {
    resource_id: String,
    channel: Arc<dyn NotifyChannel>,
    store: Arc<dyn LockRecordStore>,
    oracle: Arc<dyn LivenessOracle>,
    config: WatcherConfig,
    profile: ResourceProfile,
    flush: Arc<dyn FlushHook>,
    operations: Arc<dyn ResourceOperations>,
    listeners: Vec<Arc<dyn LockListener>>,
}

impl LockCoordinatorBuilder {
    /// Timeouts and retry pacing.
    pub fn config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// How the resource was opened.
    pub fn profile(mut self, profile: ResourceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Hook draining pending writes before a handoff.
    pub fn flush_hook(mut self, flush: Arc<dyn FlushHook>) -> Self {
        self.flush = flush;
        self
    }

    /// Executor for privileged operations.
    pub fn operations(mut self, operations: Arc<dyn ResourceOperations>) -> Self {
        self.operations = operations;
        self
    }

    /// Listener registered before the subscription goes live.
    pub fn listener(mut self, listener: Arc<dyn LockListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Subscribe and build.
    ///
    /// ## Errors
    /// - [`WatcherError::InvalidConfig`]: config failed validation
    /// - [`WatcherError::Transport`]: subscribe failed
    pub async fn build(self) -> WatcherResult<Arc<LockCoordinator>> {
        self.config.validate()?;

        let handler = Arc::new(WatchHandler::new());
        let handle = self
            .channel
            .subscribe(&self.resource_id, handler.clone())
            .await?;

        let (release_epoch, _) = watch::channel(0u64);
        let coordinator = Arc::new(LockCoordinator {
            state: LockStateMachine::new(
                self.resource_id.clone(),
                handle,
                self.store,
                self.oracle,
                self.channel.clone(),
                self.config.notify_timeout,
            ),
            tracker: AsyncRequestTracker::new(handle),
            resource_id: self.resource_id,
            handle,
            config: self.config,
            channel: self.channel,
            owner_lock: RwLock::new(()),
            listeners: Mutex::new(self.listeners),
            profile: Mutex::new(self.profile),
            flush: self.flush,
            operations: self.operations,
            release_epoch,
            release_pending: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            watch_lost: AtomicBool::new(false),
        });
        handler.bind(&coordinator);

        info!(
            resource = %coordinator.resource_id,
            handle = handle,
            "lock coordinator registered"
        );
        Ok(coordinator)
    }
}

/// Exclusive-lock coordinator for one resource and subscription.
pub struct LockCoordinator {
    pub(crate) resource_id: String,
    pub(crate) handle: SubscriptionHandle,
    pub(crate) config: WatcherConfig,
    pub(crate) channel: Arc<dyn NotifyChannel>,
    pub(crate) state: LockStateMachine,
    pub(crate) tracker: AsyncRequestTracker,
    pub(crate) owner_lock: RwLock<()>,
    listeners: Mutex<Vec<Arc<dyn LockListener>>>,
    profile: Mutex<ResourceProfile>,
    pub(crate) flush: Arc<dyn FlushHook>,
    pub(crate) operations: Arc<dyn ResourceOperations>,
    release_epoch: watch::Sender<u64>,
    pub(crate) release_pending: AtomicBool,
    closed: AtomicBool,
    pub(crate) watch_lost: AtomicBool,
}

impl LockCoordinator {
    /// Start building a coordinator for `resource_id`.
    pub fn builder(
        resource_id: impl Into<String>,
        channel: Arc<dyn NotifyChannel>,
        store: Arc<dyn LockRecordStore>,
        oracle: Arc<dyn LivenessOracle>,
    ) -> LockCoordinatorBuilder {
        LockCoordinatorBuilder {
            resource_id: resource_id.into(),
            channel,
            store,
            oracle,
            config: WatcherConfig::default(),
            profile: ResourceProfile::default(),
            flush: Arc::new(NoOpFlush),
            operations: Arc::new(UnsupportedOperations),
            listeners: Vec::new(),
        }
    }

    /// Resource this coordinator manages.
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Subscription handle on the resource's channel.
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Active configuration.
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Add a listener.
    pub fn register_listener(&self, listener: Arc<dyn LockListener>) {
        locked(&self.listeners).push(listener);
    }

    /// Current resource profile.
    pub fn profile(&self) -> ResourceProfile {
        *locked(&self.profile)
    }

    /// Replace the resource profile, e.g. after binding to a snapshot.
    pub fn set_profile(&self, profile: ResourceProfile) {
        *locked(&self.profile) = profile;
    }

    /// False for read-only resources, resources without the exclusive-lock
    /// capability and snapshot views.
    pub fn is_lock_supported(&self) -> bool {
        self.profile().supports_exclusive_lock()
    }

    /// True iff this subscription owns the lock.
    pub fn is_lock_owner(&self) -> bool {
        self.state.is_lock_owner()
    }

    /// Local ownership state.
    pub fn lock_state(&self) -> LockState {
        self.state.state()
    }

    /// Whether the coordinator was closed or lost its subscription.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.watch_lost.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> WatcherResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WatcherError::Shutdown(format!(
                "coordinator for {} closed",
                self.resource_id
            )));
        }
        if self.watch_lost.load(Ordering::SeqCst) {
            return Err(WatcherError::Shutdown(format!(
                "subscription {} on {} lost",
                self.handle, self.resource_id
            )));
        }
        Ok(())
    }

    fn ensure_supported(&self) -> WatcherResult<()> {
        if self.is_lock_supported() {
            return Ok(());
        }
        self.notify_listeners(LockUpdateState::NotSupported);
        Err(WatcherError::Unsupported(self.resource_id.clone()))
    }

    fn listener_snapshot(&self) -> Vec<Arc<dyn LockListener>> {
        locked(&self.listeners).clone()
    }

    pub(crate) fn notify_listeners(&self, state: LockUpdateState) {
        for listener in self.listener_snapshot() {
            listener.on_lock_state_changed(state);
        }
    }

    /// Every listener must permit; no listeners means permitted.
    pub(crate) fn listeners_permit_release(&self) -> bool {
        self.listener_snapshot()
            .iter()
            .all(|listener| listener.on_peer_lock_requested())
    }

    pub(crate) fn notify_header_listeners(&self) {
        for listener in self.listener_snapshot() {
            listener.on_header_updated();
        }
    }

    pub(crate) fn bump_release_epoch(&self) {
        self.release_epoch.send_modify(|epoch| *epoch += 1);
    }

    /// Acquire the exclusive lock.
    ///
    /// ## Errors
    /// - [`WatcherError::Busy`]: held by a live peer
    /// - [`WatcherError::Unsupported`]: profile does not support locking
    /// - [`WatcherError::Lock`]: store failure
    /// - [`WatcherError::Shutdown`]: closed, or the subscription was lost
    ///   while the record was being acquired
    pub async fn try_lock(&self) -> WatcherResult<()> {
        self.ensure_open()?;
        self.ensure_supported()?;

        let _guard = self.owner_lock.write().await;
        if self.state.is_lock_owner() {
            return Ok(());
        }
        self.state.try_lock().await?;
        if let Err(e) = self.ensure_open() {
            self.abandon_record().await;
            return Err(e);
        }
        self.notify_listeners(LockUpdateState::Locked);
        Ok(())
    }

    /// Keep a freshly set `LockedBySelf` only while the subscription is live.
    ///
    /// A subscription error can void ownership without holding `owner_lock`,
    /// so callers that set `LockedBySelf` re-check afterwards. The state word
    /// is written before `watch_lost` is read, and the error path writes
    /// `watch_lost` before forcing `Unlocked`, so one side always sees the other.
    pub(crate) fn subscription_live(&self) -> bool {
        if !self.is_closed() {
            return true;
        }
        if self.state.force_unlocked() {
            self.notify_listeners(LockUpdateState::Unlocked);
        }
        false
    }

    /// Drop ownership taken under a subscription that is gone and remove our
    /// record, so peers need not break it as stale.
    async fn abandon_record(&self) {
        self.state.force_unlocked();
        warn!(
            resource = %self.resource_id,
            handle = self.handle,
            "subscription lost while acquiring, abandoning lock"
        );
        if let Err(e) = self.state.release_record().await {
            debug!(
                resource = %self.resource_id,
                handle = self.handle,
                error = %e,
                "abandoned record left for stale-lock recovery"
            );
        }
    }

    /// Release the lock. Succeeds without broadcasting when not held.
    pub async fn release_lock(&self) -> WatcherResult<()> {
        let _guard = self.owner_lock.write().await;
        self.release_while_exclusive().await
    }

    /// Caller holds `owner_lock` exclusively.
    pub(crate) async fn release_while_exclusive(&self) -> WatcherResult<()> {
        if self.state.state() == LockState::Unlocked {
            return Ok(());
        }
        self.state.release_lock().await?;
        self.notify_listeners(LockUpdateState::Unlocked);
        Ok(())
    }

    /// Obtain the lock cooperatively.
    ///
    /// Broadcasts `request-lock`. If the owner accepts, waits for its
    /// `released-lock`. Then tries to acquire. `Busy` loops back to the
    /// request after the configured retry interval; there is no retry
    /// ceiling.
    pub async fn request_lock(&self) -> WatcherResult<()> {
        let mut attempt: u64 = 0;
        loop {
            self.ensure_open()?;
            self.ensure_supported()?;
            if self.state.is_lock_owner() {
                return Ok(());
            }
            attempt += 1;

            let mut released = self.release_epoch.subscribe();
            let reply = request_round(
                self.channel.as_ref(),
                &self.resource_id,
                self.handle,
                NotifyPayload::RequestLock {
                    client_id: self.handle,
                },
                self.config.notify_timeout,
            )
            .await;

            match reply.map(|r| r.result) {
                Some(0) => {
                    debug!(
                        resource = %self.resource_id,
                        handle = self.handle,
                        attempt = attempt,
                        "lock request accepted, waiting for release"
                    );
                    if timeout(self.config.released_lock_wait, released.changed())
                        .await
                        .is_err()
                    {
                        debug!(
                            resource = %self.resource_id,
                            handle = self.handle,
                            "no released-lock seen, trying anyway"
                        );
                    }
                }
                Some(code) => debug!(
                    resource = %self.resource_id,
                    handle = self.handle,
                    result = code,
                    "lock request refused"
                ),
                None => debug!(
                    resource = %self.resource_id,
                    handle = self.handle,
                    attempt = attempt,
                    "no lock owner answered"
                ),
            }

            match self.try_lock().await {
                Ok(()) => return Ok(()),
                Err(WatcherError::Busy(holder)) => {
                    debug!(
                        resource = %self.resource_id,
                        handle = self.handle,
                        holder = %holder,
                        attempt = attempt,
                        "lock still busy, re-requesting"
                    );
                    sleep(self.config.request_lock_retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Broadcast `header-update`. Best-effort.
    pub async fn notify_header_update(&self) {
        notify_header_update(
            self.channel.as_ref(),
            &self.resource_id,
            Some(self.handle),
            self.config.notify_timeout,
        )
        .await;
    }

    /// Run `operation` wherever it is allowed to run.
    ///
    /// Runs locally when locking is unsupported or this subscription owns the
    /// lock, otherwise forwards it to the owner. When no owner answers, tries
    /// to take the lock and loops; `Restart` re-issues against the new owner.
    pub async fn execute(
        &self,
        operation: ResourceOperation,
        progress: Arc<dyn ProgressSink>,
    ) -> WatcherResult<()> {
        loop {
            self.ensure_open()?;
            if !self.is_lock_supported() {
                return self.run_local(operation, progress).await;
            }

            {
                let _guard = self.owner_lock.read().await;
                if self.state.is_lock_owner() {
                    return self.run_local(operation, progress).await;
                }
            }

            match self.notify_remote(&operation, progress.clone()).await {
                Err(WatcherError::TimedOut(_)) => match self.try_lock().await {
                    Ok(()) => {}
                    Err(WatcherError::Busy(_)) => {
                        sleep(self.config.request_lock_retry_interval).await;
                    }
                    Err(e) => return Err(e),
                },
                Err(WatcherError::Restart(reason)) => {
                    debug!(
                        resource = %self.resource_id,
                        op = %operation.op(),
                        reason = %reason,
                        "re-issuing operation"
                    );
                }
                other => return other,
            }
        }
    }

    async fn run_local(
        &self,
        operation: ResourceOperation,
        progress: Arc<dyn ProgressSink>,
    ) -> WatcherResult<()> {
        let op = operation.op();
        self.operations.apply(operation, progress).await?;
        debug!(resource = %self.resource_id, op = %op, "operation executed locally");
        self.notify_header_update().await;
        Ok(())
    }

    /// Forward `operation` to the owner once.
    ///
    /// ## Errors
    /// - [`WatcherError::TimedOut`]: no subscriber replied with a decision
    /// - [`WatcherError::RemoteFailure`]: owner refused or the operation failed
    /// - [`WatcherError::Restart`]: async watchdog expired or subscription lost
    pub async fn notify_remote(
        &self,
        operation: &ResourceOperation,
        progress: Arc<dyn ProgressSink>,
    ) -> WatcherResult<()> {
        self.ensure_open()?;
        let id = self.tracker.next_request_id();
        let op = operation.op();
        let payload = operation.to_payload(id);

        // Registered before publishing so an early completion is not lost
        let pending = operation
            .is_async()
            .then(|| self.tracker.register(id, progress));

        let reply = request_round(
            self.channel.as_ref(),
            &self.resource_id,
            self.handle,
            payload,
            self.config.notify_timeout,
        )
        .await;

        match (reply, pending) {
            (None, _) => Err(WatcherError::TimedOut(op.name().to_string())),
            (Some(response), _) if response.result != 0 => {
                WatcherError::from_remote_code(response.result)
            }
            (Some(_), Some(pending)) => {
                debug!(
                    resource = %self.resource_id,
                    op = %op,
                    request_id = %id,
                    "remote operation accepted"
                );
                pending.wait(self.config.request_timeout).await
            }
            (Some(_), None) => Ok(()),
        }
    }

    /// Ask the owner to flatten the resource.
    pub async fn notify_flatten(&self, progress: Arc<dyn ProgressSink>) -> WatcherResult<()> {
        self.notify_remote(&ResourceOperation::Flatten, progress).await
    }

    /// Ask the owner to resize the resource.
    pub async fn notify_resize(
        &self,
        size: u64,
        progress: Arc<dyn ProgressSink>,
    ) -> WatcherResult<()> {
        self.notify_remote(&ResourceOperation::Resize { size }, progress)
            .await
    }

    /// Ask the owner to rebuild the object map.
    pub async fn notify_rebuild_object_map(
        &self,
        progress: Arc<dyn ProgressSink>,
    ) -> WatcherResult<()> {
        self.notify_remote(&ResourceOperation::RebuildObjectMap, progress)
            .await
    }

    /// Ask the owner to create a snapshot.
    pub async fn notify_snap_create(&self, snap_name: &str) -> WatcherResult<()> {
        self.notify_sync(ResourceOperation::SnapCreate {
            snap_name: snap_name.to_string(),
        })
        .await
    }

    /// Ask the owner to rename a snapshot.
    pub async fn notify_snap_rename(&self, snap_id: u64, snap_name: &str) -> WatcherResult<()> {
        self.notify_sync(ResourceOperation::SnapRename {
            snap_id,
            snap_name: snap_name.to_string(),
        })
        .await
    }

    /// Ask the owner to remove a snapshot.
    pub async fn notify_snap_remove(&self, snap_name: &str) -> WatcherResult<()> {
        self.notify_sync(ResourceOperation::SnapRemove {
            snap_name: snap_name.to_string(),
        })
        .await
    }

    /// Ask the owner to protect a snapshot.
    pub async fn notify_snap_protect(&self, snap_name: &str) -> WatcherResult<()> {
        self.notify_sync(ResourceOperation::SnapProtect {
            snap_name: snap_name.to_string(),
        })
        .await
    }

    /// Ask the owner to unprotect a snapshot.
    pub async fn notify_snap_unprotect(&self, snap_name: &str) -> WatcherResult<()> {
        self.notify_sync(ResourceOperation::SnapUnprotect {
            snap_name: snap_name.to_string(),
        })
        .await
    }

    /// Ask the owner to rename the resource.
    pub async fn notify_rename(&self, name: &str) -> WatcherResult<()> {
        self.notify_sync(ResourceOperation::Rename {
            name: name.to_string(),
        })
        .await
    }

    async fn notify_sync(&self, operation: ResourceOperation) -> WatcherResult<()> {
        self.notify_remote(&operation, Arc::new(crate::hooks::NoOpProgress))
            .await
    }

    /// Release the lock if held, unsubscribe and fail pending requests with
    /// `Shutdown`. Idempotent.
    pub async fn close(&self) -> WatcherResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let released = {
            let _guard = self.owner_lock.write().await;
            self.release_while_exclusive().await
        };
        if let Err(e) = &released {
            warn!(
                resource = %self.resource_id,
                handle = self.handle,
                error = %e,
                "failed to release lock on close"
            );
        }

        if let Err(e) = self.channel.unsubscribe(self.handle).await {
            debug!(
                resource = %self.resource_id,
                handle = self.handle,
                error = %e,
                "unsubscribe on close failed"
            );
        }
        // A failed release still leaves us without a live subscription
        if self.state.force_unlocked() {
            self.notify_listeners(LockUpdateState::Unlocked);
        }
        self.tracker.fail_all(WatcherError::Shutdown(format!(
            "coordinator for {} closed",
            self.resource_id
        )));

        info!(
            resource = %self.resource_id,
            handle = self.handle,
            "lock coordinator closed"
        );
        released
    }
}
