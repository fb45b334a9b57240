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

//! Lock ownership and handoff between peers sharing one bus and store.

mod common;

use common::*;
use lockwatch_channel::LivenessOracle;
use lockwatch_locks::{
    AcquireLockOptions, BreakLockOptions, LockMode, LockRecordStore,
};
use lockwatch_notify::{NotifyOp, NotifyPayload};
use lockwatch_watcher::{
    LockState, LockUpdateState, ResourceProfile, WatcherError,
};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_try_lock_broadcasts_acquired_lock_once() {
    init_test_tracing();
    let cluster = Cluster::new();
    let observer = ScriptedPeer::observer(&cluster.bus).await;
    let listener = RecordingListener::new(true);
    let a = cluster.peer_with(listener.clone(), RecordingOperations::new()).await;

    a.try_lock().await.unwrap();
    assert!(a.is_lock_owner());
    assert_eq!(cluster.owner_identity().await, Some(format!("auto {}", a.handle())));

    // Already owner: no second broadcast
    a.try_lock().await.unwrap();

    assert_eq!(observer.count(NotifyOp::AcquiredLock), 1);
    assert_eq!(
        observer.seen()[0],
        (Some(a.handle()), NotifyPayload::AcquiredLock { client_id: a.handle() })
    );
    assert_eq!(listener.transitions(), vec![LockUpdateState::Locked]);
}

#[tokio::test]
async fn test_release_lock_is_idempotent() {
    init_test_tracing();
    let cluster = Cluster::new();
    let observer = ScriptedPeer::observer(&cluster.bus).await;
    let a = cluster.peer().await;

    a.release_lock().await.unwrap();
    assert_eq!(observer.count(NotifyOp::ReleasedLock), 0);

    a.try_lock().await.unwrap();
    a.release_lock().await.unwrap();
    a.release_lock().await.unwrap();
    assert_eq!(observer.count(NotifyOp::ReleasedLock), 1);
    assert_eq!(a.lock_state(), LockState::Unlocked);
    assert!(cluster.store.is_empty().await);
}

#[tokio::test]
async fn test_request_lock_hands_off_after_flush() {
    init_test_tracing();
    let cluster = Cluster::new();
    let a_listener = RecordingListener::new(true);
    let flush = RecordingFlush::new(cluster.store.clone());
    let a = cluster
        .builder()
        .listener(a_listener.clone())
        .flush_hook(flush.clone())
        .build()
        .await
        .unwrap();
    let b_listener = RecordingListener::new(true);
    let b = cluster.peer_with(b_listener.clone(), RecordingOperations::new()).await;

    a.try_lock().await.unwrap();
    b.request_lock().await.unwrap();

    assert!(b.is_lock_owner());
    assert!(!a.is_lock_owner());
    assert_eq!(cluster.owner_identity().await, Some(format!("auto {}", b.handle())));

    assert_eq!(a_listener.lock_requests.load(Ordering::SeqCst), 1);
    assert_eq!(
        a_listener.transitions(),
        vec![
            LockUpdateState::Locked,
            LockUpdateState::Releasing,
            LockUpdateState::Unlocked
        ]
    );
    // The record was still held while flushing
    assert_eq!(flush.calls.load(Ordering::SeqCst), 1);
    assert_eq!(flush.record_present.lock().unwrap().as_slice(), &[true]);

    assert!(b_listener.states().contains(&LockUpdateState::Notification));
    assert_eq!(b_listener.transitions(), vec![LockUpdateState::Locked]);
}

#[tokio::test]
async fn test_declining_owner_keeps_lock_until_it_releases() {
    init_test_tracing();
    let cluster = Cluster::new();
    let a_listener = RecordingListener::new(false);
    let a = cluster.peer_with(a_listener.clone(), RecordingOperations::new()).await;
    let b = cluster.peer().await;

    a.try_lock().await.unwrap();
    let requester = {
        let b = b.clone();
        tokio::spawn(async move { b.request_lock().await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(a.is_lock_owner());
    assert!(!b.is_lock_owner());
    assert!(a_listener.lock_requests.load(Ordering::SeqCst) >= 2);

    a.release_lock().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), requester)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(b.is_lock_owner());
}

#[tokio::test]
async fn test_unresponsive_owner_eventually_releases() {
    init_test_tracing();
    let cluster = Cluster::new();
    let a = cluster.peer().await;
    let b = cluster.peer().await;

    a.try_lock().await.unwrap();
    cluster.bus.set_muted(a.handle(), true).await;

    let requester = {
        let b = b.clone();
        tokio::spawn(async move { b.request_lock().await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!b.is_lock_owner());

    a.release_lock().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), requester)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(b.is_lock_owner());
}

#[tokio::test]
async fn test_stale_lock_is_broken_after_subscription_loss() {
    init_test_tracing();
    let cluster = Cluster::new();
    let a_listener = RecordingListener::new(true);
    let a = cluster.peer_with(a_listener.clone(), RecordingOperations::new()).await;
    let b = cluster.peer().await;

    a.try_lock().await.unwrap();
    cluster.bus.kill_subscription(a.handle()).await.unwrap();

    assert!(!a.is_lock_owner());
    assert!(a.is_closed());
    assert_eq!(
        a_listener.transitions(),
        vec![LockUpdateState::Locked, LockUpdateState::Unlocked]
    );
    // The record still names the dead subscription
    assert_eq!(cluster.owner_identity().await, Some(format!("auto {}", a.handle())));
    assert!(matches!(a.try_lock().await, Err(WatcherError::Shutdown(_))));

    b.request_lock().await.unwrap();
    assert!(b.is_lock_owner());
    assert_eq!(cluster.owner_identity().await, Some(format!("auto {}", b.handle())));
}

#[tokio::test]
async fn test_racing_try_lock_has_one_winner() {
    init_test_tracing();
    let cluster = Cluster::new();
    let b = cluster.peer().await;
    let c = cluster.peer().await;

    let (rb, rc) = tokio::join!(b.try_lock(), c.try_lock());
    assert!(rb.is_ok() ^ rc.is_ok());
    let loser = if rb.is_ok() { rc } else { rb };
    assert!(matches!(loser, Err(WatcherError::Busy(_))));
    assert!(b.is_lock_owner() ^ c.is_lock_owner());
}

#[tokio::test]
async fn test_racing_requesters_both_eventually_acquire() {
    init_test_tracing();
    let cluster = Cluster::new();
    let a = cluster.peer().await;
    let b = cluster.peer().await;
    let c = cluster.peer().await;
    a.try_lock().await.unwrap();

    let (rb, rc) = tokio::time::timeout(
        Duration::from_secs(10),
        async { tokio::join!(b.request_lock(), c.request_lock()) },
    )
    .await
    .unwrap();
    rb.unwrap();
    rc.unwrap();

    // Whoever acquired second took the lock from the first
    assert!(!a.is_lock_owner());
    assert!(b.is_lock_owner() ^ c.is_lock_owner());
    let owner = if b.is_lock_owner() { b.handle() } else { c.handle() };
    assert_eq!(cluster.owner_identity().await, Some(format!("auto {}", owner)));
}

#[tokio::test]
async fn test_manual_lock_is_never_broken() {
    init_test_tracing();
    let cluster = Cluster::new();
    cluster
        .store
        .acquire_lock(AcquireLockOptions {
            resource_id: RESOURCE.to_string(),
            mode: LockMode::Exclusive,
            owner: "manually locked".to_string(),
        })
        .await
        .unwrap();
    let b = cluster.peer().await;

    assert_eq!(
        b.try_lock().await,
        Err(WatcherError::Busy("manually locked".to_string()))
    );
    assert_eq!(cluster.owner_identity().await, Some("manually locked".to_string()));
}

#[tokio::test]
async fn test_shared_lock_is_busy() {
    init_test_tracing();
    let cluster = Cluster::new();
    cluster
        .store
        .acquire_lock(AcquireLockOptions {
            resource_id: RESOURCE.to_string(),
            mode: LockMode::Shared,
            owner: "auto 9999".to_string(),
        })
        .await
        .unwrap();
    let b = cluster.peer().await;
    assert!(matches!(b.try_lock().await, Err(WatcherError::Busy(_))));
}

#[tokio::test]
async fn test_owner_drops_ownership_when_record_taken_over() {
    init_test_tracing();
    let cluster = Cluster::new();
    let a_listener = RecordingListener::new(true);
    let a = cluster.peer_with(a_listener.clone(), RecordingOperations::new()).await;
    let b = cluster.peer().await;

    a.try_lock().await.unwrap();
    let record = cluster.store.inspect(RESOURCE).await.unwrap().unwrap();
    cluster
        .store
        .break_lock(BreakLockOptions {
            resource_id: RESOURCE.to_string(),
            owner: record.holders[0].owner.clone(),
            token: record.holders[0].token.clone(),
        })
        .await
        .unwrap();

    b.try_lock().await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || !a.is_lock_owner()).await);
    assert!(a_listener.transitions().ends_with(&[LockUpdateState::Unlocked]));

    // A release from the displaced owner leaves the new owner's record alone
    a.release_lock().await.unwrap();
    assert_eq!(cluster.owner_identity().await, Some(format!("auto {}", b.handle())));
}

#[tokio::test]
async fn test_stale_acquired_lock_does_not_unseat_owner() {
    init_test_tracing();
    let cluster = Cluster::new();
    let a = cluster.peer().await;
    let ghost = ScriptedPeer::observer(&cluster.bus).await;

    a.try_lock().await.unwrap();
    ghost
        .send(NotifyPayload::AcquiredLock {
            client_id: ghost.handle,
        })
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(a.is_lock_owner());
}

#[tokio::test]
async fn test_lock_unsupported_profiles() {
    init_test_tracing();
    let cluster = Cluster::new();
    let listener = RecordingListener::new(true);
    let a = cluster
        .builder()
        .profile(ResourceProfile {
            read_only: true,
            ..Default::default()
        })
        .listener(listener.clone())
        .build()
        .await
        .unwrap();

    assert!(!a.is_lock_supported());
    assert!(matches!(a.try_lock().await, Err(WatcherError::Unsupported(_))));
    assert!(matches!(a.request_lock().await, Err(WatcherError::Unsupported(_))));
    assert_eq!(listener.states()[0], LockUpdateState::NotSupported);

    a.set_profile(ResourceProfile {
        snapshot: Some(3),
        ..Default::default()
    });
    assert!(!a.is_lock_supported());
    a.set_profile(ResourceProfile {
        exclusive_lock: false,
        ..Default::default()
    });
    assert!(!a.is_lock_supported());
    a.set_profile(ResourceProfile::default());
    assert!(a.is_lock_supported());
    a.try_lock().await.unwrap();
}

#[tokio::test]
async fn test_close_releases_and_unsubscribes() {
    init_test_tracing();
    let cluster = Cluster::new();
    let observer = ScriptedPeer::observer(&cluster.bus).await;
    let a = cluster.peer().await;

    a.try_lock().await.unwrap();
    a.close().await.unwrap();
    a.close().await.unwrap();

    assert!(cluster.store.is_empty().await);
    assert_eq!(observer.count(NotifyOp::ReleasedLock), 1);
    assert_eq!(cluster.bus.subscribers(RESOURCE).await, vec![observer.handle]);
    assert!(!cluster.bus.is_live(RESOURCE, a.handle()).await.unwrap());
    assert!(matches!(a.request_lock().await, Err(WatcherError::Shutdown(_))));
}

#[tokio::test]
async fn test_request_lock_without_owner_acquires() {
    init_test_tracing();
    let cluster = Cluster::new();
    let a = cluster.peer().await;
    a.request_lock().await.unwrap();
    assert!(a.is_lock_owner());
    assert_eq!(cluster.bus.subscribers(RESOURCE).await, vec![a.handle()]);
}
