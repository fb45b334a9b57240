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

//! Shared helpers for watcher integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use lockwatch_channel::{
    ChannelError, ChannelResult, InMemoryNotifyBus, Notification, NotifyChannel, NotifyHandler,
    PublishOutcome, SubscriptionHandle,
};
use lockwatch_locks::{
    AcquireLockOptions, BreakLockOptions, LockError, LockRecord, LockRecordStore, LockResult,
    MemoryLockStore, ReleaseLockOptions,
};
use lockwatch_notify::{NotifyMessage, NotifyOp, NotifyPayload};
use lockwatch_watcher::{
    FlushHook, LockCoordinator, LockListener, LockUpdateState, ProgressSink, ResourceOperation,
    ResourceOperations, WatcherConfig, WatcherError, WatcherResult,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const RESOURCE: &str = "image-1";

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> WatcherConfig {
    WatcherConfig {
        notify_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_millis(500),
        request_lock_retry_interval: Duration::from_millis(20),
        released_lock_wait: Duration::from_millis(300),
    }
}

/// Poll `condition` every 10ms until it holds or `limit` passes.
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Bus and store shared by every peer of a test.
#[derive(Clone, Default)]
pub struct Cluster {
    pub bus: InMemoryNotifyBus,
    pub store: MemoryLockStore,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder(&self) -> lockwatch_watcher::LockCoordinatorBuilder {
        LockCoordinator::builder(
            RESOURCE,
            Arc::new(self.bus.clone()),
            Arc::new(self.store.clone()) as Arc<dyn LockRecordStore>,
            Arc::new(self.bus.clone()),
        )
        .config(test_config())
    }

    /// Builder whose coordinator talks to `store` and `channel` instead of
    /// the shared ones. Liveness still comes from the shared bus.
    pub fn builder_on(
        &self,
        store: Arc<dyn LockRecordStore>,
        channel: Arc<dyn NotifyChannel>,
    ) -> lockwatch_watcher::LockCoordinatorBuilder {
        LockCoordinator::builder(RESOURCE, channel, store, Arc::new(self.bus.clone()))
            .config(test_config())
    }

    pub async fn peer(&self) -> Arc<LockCoordinator> {
        self.builder().build().await.unwrap()
    }

    pub async fn peer_with(
        &self,
        listener: Arc<RecordingListener>,
        operations: Arc<RecordingOperations>,
    ) -> Arc<LockCoordinator> {
        self.builder()
            .listener(listener)
            .operations(operations)
            .build()
            .await
            .unwrap()
    }

    pub async fn owner_identity(&self) -> Option<String> {
        self.store
            .inspect(RESOURCE)
            .await
            .unwrap()
            .and_then(|record| record.holders.first().map(|h| h.owner.clone()))
    }
}

/// Listener recording every callback.
pub struct RecordingListener {
    pub permit: AtomicBool,
    pub states: Mutex<Vec<LockUpdateState>>,
    pub lock_requests: AtomicUsize,
    pub header_updates: AtomicUsize,
}

impl RecordingListener {
    pub fn new(permit: bool) -> Arc<Self> {
        Arc::new(Self {
            permit: AtomicBool::new(permit),
            states: Mutex::new(Vec::new()),
            lock_requests: AtomicUsize::new(0),
            header_updates: AtomicUsize::new(0),
        })
    }

    pub fn states(&self) -> Vec<LockUpdateState> {
        self.states.lock().unwrap().clone()
    }

    /// States other than peer notifications, in order.
    pub fn transitions(&self) -> Vec<LockUpdateState> {
        self.states()
            .into_iter()
            .filter(|s| *s != LockUpdateState::Notification)
            .collect()
    }
}

impl LockListener for RecordingListener {
    fn on_peer_lock_requested(&self) -> bool {
        self.lock_requests.fetch_add(1, Ordering::SeqCst);
        self.permit.load(Ordering::SeqCst)
    }

    fn on_lock_state_changed(&self, state: LockUpdateState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_header_updated(&self) {
        self.header_updates.fetch_add(1, Ordering::SeqCst);
    }
}

/// Progress sink recording every update.
#[derive(Default)]
pub struct RecordingProgress {
    pub updates: Mutex<Vec<(u64, u64)>>,
}

impl RecordingProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn updates(&self) -> Vec<(u64, u64)> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn update_progress(&self, offset: u64, total: u64) {
        self.updates.lock().unwrap().push((offset, total));
    }
}

/// Operation executor that records what ran.
///
/// Async operations report progress (10, 20) before returning. Snapshot
/// names starting with `exists` fail with `-EEXIST`; a resize to 0 is
/// rejected at admission with `-EINVAL`.
pub struct RecordingOperations {
    pub applied: Mutex<Vec<ResourceOperation>>,
    pub delay: Duration,
}

impl RecordingOperations {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            applied: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub fn applied(&self) -> Vec<ResourceOperation> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceOperations for RecordingOperations {
    fn validate(&self, operation: &ResourceOperation) -> WatcherResult<()> {
        match operation {
            ResourceOperation::Resize { size: 0 } => Err(WatcherError::OperationFailed(-22)),
            _ => Ok(()),
        }
    }

    async fn apply(
        &self,
        operation: ResourceOperation,
        progress: Arc<dyn ProgressSink>,
    ) -> WatcherResult<()> {
        self.applied.lock().unwrap().push(operation.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if operation.is_async() {
            progress.update_progress(10, 20);
        }
        match operation {
            ResourceOperation::SnapCreate { snap_name } if snap_name.starts_with("exists") => {
                Err(WatcherError::OperationFailed(-17))
            }
            _ => Ok(()),
        }
    }
}

/// Flush hook that records whether the lock record still existed when it ran.
pub struct RecordingFlush {
    pub store: MemoryLockStore,
    pub calls: AtomicUsize,
    pub record_present: Mutex<Vec<bool>>,
}

impl RecordingFlush {
    pub fn new(store: MemoryLockStore) -> Arc<Self> {
        Arc::new(Self {
            store,
            calls: AtomicUsize::new(0),
            record_present: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl FlushHook for RecordingFlush {
    async fn flush_pending_writes(&self) -> WatcherResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let present = self.store.inspect(RESOURCE).await.unwrap().is_some();
        self.record_present.lock().unwrap().push(present);
        Ok(())
    }
}

type Responder = Box<dyn Fn(&NotifyPayload) -> Vec<u8> + Send + Sync>;

/// Raw subscriber that records decoded payloads and replies from a script.
pub struct ScriptedPeer {
    pub handle: u64,
    pub bus: InMemoryNotifyBus,
    inner: Arc<ScriptedHandler>,
}

struct ScriptedHandler {
    seen: Mutex<Vec<(Option<u64>, NotifyPayload)>>,
    responder: Responder,
}

#[async_trait]
impl NotifyHandler for ScriptedHandler {
    async fn handle_notify(&self, notification: Notification) -> Vec<u8> {
        let Ok(message) = NotifyMessage::decode(&notification.payload) else {
            return Vec::new();
        };
        let reply = (self.responder)(&message.payload);
        self.seen
            .lock()
            .unwrap()
            .push((notification.sender, message.payload));
        reply
    }
}

impl ScriptedPeer {
    pub async fn join(
        bus: &InMemoryNotifyBus,
        responder: impl Fn(&NotifyPayload) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        let inner = Arc::new(ScriptedHandler {
            seen: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        });
        let handle = bus.subscribe(RESOURCE, inner.clone()).await.unwrap();
        Self {
            handle,
            bus: bus.clone(),
            inner,
        }
    }

    /// Observer that never decides anything.
    pub async fn observer(bus: &InMemoryNotifyBus) -> Self {
        Self::join(bus, |_| Vec::new()).await
    }

    pub fn seen(&self) -> Vec<(Option<u64>, NotifyPayload)> {
        self.inner.seen.lock().unwrap().clone()
    }

    pub fn count(&self, op: NotifyOp) -> usize {
        self.seen()
            .iter()
            .filter(|(_, payload)| payload.op() == Some(op))
            .count()
    }

    /// Publish `payload` as this peer.
    pub async fn send(&self, payload: NotifyPayload) {
        self.bus
            .publish(
                RESOURCE,
                Some(self.handle),
                NotifyMessage::new(payload).encode(),
                Duration::from_millis(200),
            )
            .await
            .unwrap();
    }
}

/// Store that delegates to a [`MemoryLockStore`], with injectable faults.
pub struct FaultyStore {
    pub inner: MemoryLockStore,
    /// Held after a successful acquire, before returning.
    pub acquire_delay: Duration,
    pub fail_release: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: MemoryLockStore) -> Arc<Self> {
        Self::with_acquire_delay(inner, Duration::ZERO)
    }

    pub fn with_acquire_delay(inner: MemoryLockStore, acquire_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            acquire_delay,
            fail_release: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl LockRecordStore for FaultyStore {
    async fn acquire_lock(&self, options: AcquireLockOptions) -> LockResult<LockRecord> {
        let record = self.inner.acquire_lock(options).await?;
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }
        Ok(record)
    }

    async fn release_lock(&self, options: ReleaseLockOptions) -> LockResult<()> {
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(LockError::BackendError("store unreachable".to_string()));
        }
        self.inner.release_lock(options).await
    }

    async fn break_lock(&self, options: BreakLockOptions) -> LockResult<()> {
        self.inner.break_lock(options).await
    }

    async fn inspect(&self, resource_id: &str) -> LockResult<Option<LockRecord>> {
        self.inner.inspect(resource_id).await
    }
}

/// Channel that delegates to an [`InMemoryNotifyBus`] but can fail publishes.
pub struct FaultyChannel {
    pub bus: InMemoryNotifyBus,
    pub fail_publish: AtomicBool,
}

impl FaultyChannel {
    pub fn new(bus: InMemoryNotifyBus) -> Arc<Self> {
        Arc::new(Self {
            bus,
            fail_publish: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl NotifyChannel for FaultyChannel {
    async fn subscribe(
        &self,
        resource_id: &str,
        handler: Arc<dyn NotifyHandler>,
    ) -> ChannelResult<SubscriptionHandle> {
        self.bus.subscribe(resource_id, handler).await
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> ChannelResult<()> {
        self.bus.unsubscribe(handle).await
    }

    async fn publish(
        &self,
        resource_id: &str,
        sender: Option<SubscriptionHandle>,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> ChannelResult<PublishOutcome> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ChannelError::BackendError("publish unreachable".to_string()));
        }
        self.bus.publish(resource_id, sender, payload, timeout).await
    }
}

/// Flush hook that kills its coordinator's subscription and then fails.
pub struct SubscriptionKillingFlush {
    pub bus: InMemoryNotifyBus,
    pub handle: Mutex<Option<SubscriptionHandle>>,
}

impl SubscriptionKillingFlush {
    pub fn new(bus: InMemoryNotifyBus) -> Arc<Self> {
        Arc::new(Self {
            bus,
            handle: Mutex::new(None),
        })
    }
}

#[async_trait]
impl FlushHook for SubscriptionKillingFlush {
    async fn flush_pending_writes(&self) -> WatcherResult<()> {
        let handle = *self.handle.lock().unwrap();
        if let Some(handle) = handle {
            self.bus.kill_subscription(handle).await.unwrap();
        }
        Err(WatcherError::OperationFailed(-5))
    }
}
