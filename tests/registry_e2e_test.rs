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

//! End-to-end: two processes, each with its own registry, sharing one bus
//! and one lock store.

use async_trait::async_trait;
use lockwatch::watcher::{NoOpProgress, ProgressSink};
use lockwatch::{
    InMemoryNotifyBus, LockRecordStore, LockUpdateState, MemoryLockStore, OpenOptions,
    ResourceOperation, ResourceOperations, ResourceRegistry, WatcherConfig, WatcherResult,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn config() -> WatcherConfig {
    WatcherConfig {
        notify_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_millis(500),
        request_lock_retry_interval: Duration::from_millis(20),
        released_lock_wait: Duration::from_millis(300),
    }
}

fn process(bus: &InMemoryNotifyBus, store: &MemoryLockStore) -> ResourceRegistry {
    ResourceRegistry::new(
        Arc::new(bus.clone()),
        Arc::new(store.clone()),
        Arc::new(bus.clone()),
        config(),
    )
}

async fn owner_of(store: &MemoryLockStore, resource_id: &str) -> Option<String> {
    store
        .inspect(resource_id)
        .await
        .unwrap()
        .and_then(|record| record.holders.first().map(|h| h.owner.clone()))
}

#[derive(Default)]
struct Journal {
    applied: Mutex<Vec<ResourceOperation>>,
}

#[async_trait]
impl ResourceOperations for Journal {
    async fn apply(
        &self,
        operation: ResourceOperation,
        progress: Arc<dyn ProgressSink>,
    ) -> WatcherResult<()> {
        if operation.is_async() {
            progress.update_progress(1, 1);
        }
        self.applied.lock().unwrap().push(operation);
        Ok(())
    }
}

struct States(Mutex<Vec<LockUpdateState>>);

impl lockwatch::LockListener for States {
    fn on_peer_lock_requested(&self) -> bool {
        true
    }

    fn on_lock_state_changed(&self, state: LockUpdateState) {
        self.0.lock().unwrap().push(state);
    }
}

#[tokio::test]
async fn test_open_is_idempotent_per_resource() {
    init_test_tracing();
    let bus = InMemoryNotifyBus::new();
    let store = MemoryLockStore::new();
    let registry = process(&bus, &store);

    let first = registry.open("image-1", OpenOptions::default()).await.unwrap();
    let again = registry.open("image-1", OpenOptions::default()).await.unwrap();
    let other = registry.open("image-0", OpenOptions::default()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(registry.resources().await, vec!["image-0", "image-1"]);
    assert_eq!(bus.subscribers("image-1").await, vec![first.handle()]);

    registry.close("image-1").await.unwrap();
    assert!(registry.get("image-1").await.is_none());
    assert!(bus.subscribers("image-1").await.is_empty());
    registry.close("image-1").await.unwrap();
}

#[tokio::test]
async fn test_lock_moves_between_processes() {
    init_test_tracing();
    let bus = InMemoryNotifyBus::new();
    let store = MemoryLockStore::new();
    let p1 = process(&bus, &store);
    let p2 = process(&bus, &store);

    let states = Arc::new(States(Mutex::new(Vec::new())));
    let a = p1
        .open(
            "image-1",
            OpenOptions {
                listeners: vec![states.clone() as Arc<dyn lockwatch::LockListener>],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let b = p2.open("image-1", OpenOptions::default()).await.unwrap();

    a.request_lock().await.unwrap();
    b.request_lock().await.unwrap();

    assert!(b.is_lock_owner());
    assert!(!a.is_lock_owner());
    assert_eq!(owner_of(&store, "image-1").await, Some(format!("auto {}", b.handle())));
    assert!(states.0.lock().unwrap().contains(&LockUpdateState::Releasing));
}

#[tokio::test]
async fn test_resources_are_independent() {
    init_test_tracing();
    let bus = InMemoryNotifyBus::new();
    let store = MemoryLockStore::new();
    let p1 = process(&bus, &store);
    let p2 = process(&bus, &store);

    let a1 = p1.open("image-1", OpenOptions::default()).await.unwrap();
    let b2 = p2.open("image-2", OpenOptions::default()).await.unwrap();
    let b1 = p2.open("image-1", OpenOptions::default()).await.unwrap();

    a1.try_lock().await.unwrap();
    b2.try_lock().await.unwrap();
    assert!(b1.try_lock().await.is_err());

    assert!(a1.is_lock_owner());
    assert!(b2.is_lock_owner());
    assert_eq!(store.len().await, 2);

    p1.close_all().await.unwrap();
    p2.close_all().await.unwrap();
    assert!(store.is_empty().await);
    assert!(p1.resources().await.is_empty());
}

#[tokio::test]
async fn test_operations_run_on_the_owning_process() {
    init_test_tracing();
    let bus = InMemoryNotifyBus::new();
    let store = MemoryLockStore::new();
    let p1 = process(&bus, &store);
    let p2 = process(&bus, &store);

    let journal = Arc::new(Journal::default());
    let a = p1
        .open(
            "image-1",
            OpenOptions {
                operations: Some(journal.clone() as Arc<dyn ResourceOperations>),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let b = p2.open("image-1", OpenOptions::default()).await.unwrap();
    a.try_lock().await.unwrap();

    b.execute(ResourceOperation::Flatten, Arc::new(NoOpProgress))
        .await
        .unwrap();
    b.notify_snap_protect("snap1").await.unwrap();

    assert_eq!(
        journal.applied.lock().unwrap().clone(),
        vec![
            ResourceOperation::Flatten,
            ResourceOperation::SnapProtect {
                snap_name: "snap1".to_string()
            }
        ]
    );
    assert!(a.is_lock_owner());
}

#[tokio::test]
async fn test_lost_subscription_is_replaced_on_reopen() {
    init_test_tracing();
    let bus = InMemoryNotifyBus::new();
    let store = MemoryLockStore::new();
    let p1 = process(&bus, &store);
    let p2 = process(&bus, &store);

    let a = p1.open("image-1", OpenOptions::default()).await.unwrap();
    a.try_lock().await.unwrap();
    bus.kill_subscription(a.handle()).await.unwrap();
    assert!(a.is_closed());

    let reopened = p1.open("image-1", OpenOptions::default()).await.unwrap();
    assert!(!Arc::ptr_eq(&a, &reopened));
    assert_ne!(a.handle(), reopened.handle());

    // The dead subscription's record is stale and gets broken
    let b = p2.open("image-1", OpenOptions::default()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), b.request_lock())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(owner_of(&store, "image-1").await, Some(format!("auto {}", b.handle())));
}
