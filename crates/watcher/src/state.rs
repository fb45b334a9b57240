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

//! Lock ownership state machine.
//!
//! ## Purpose
//! Tracks whether this subscription owns the resource's exclusive lock and
//! exposes `try_lock` / `release_lock` backed by the external lock record.
//!
//! ## Design Decisions
//! - **Store is the arbiter**: local state only changes after the record
//!   operation succeeds; two racing `try_lock` calls are decided by the store
//! - **Stale lock recovery**: a `Busy` record whose `auto <handle>` owner is
//!   no longer live is broken by token and the acquire is retried once
//! - **No retries**: any other store failure is surfaced to the caller; retry
//!   policy lives in the coordinator

use crate::broadcast::publish_best_effort;
use crate::{WatcherError, WatcherResult};
use lockwatch_channel::{LivenessOracle, NotifyChannel, SubscriptionHandle};
use lockwatch_locks::{
    AcquireLockOptions, BreakLockOptions, LockMode, LockRecordStore, ReleaseLockOptions,
};
use lockwatch_notify::NotifyPayload;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Local ownership state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    /// Not the owner
    Unlocked,
    /// This subscription holds the lock record
    LockedBySelf,
    /// Handing the lock to a peer: flushing, then releasing
    Releasing,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Unlocked => f.write_str("unlocked"),
            LockState::LockedBySelf => f.write_str("locked"),
            LockState::Releasing => f.write_str("releasing"),
        }
    }
}

/// State reported to listeners on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockUpdateState {
    /// Locking was attempted on a resource whose profile does not support it
    NotSupported,
    /// This subscription no longer owns the lock
    Unlocked,
    /// A peer acquired or released the lock
    Notification,
    /// This subscription is handing the lock to a peer
    Releasing,
    /// This subscription now owns the lock
    Locked,
}

const AUTO_PREFIX: &str = "auto ";

/// Owner identity written into the lock record for a subscription.
pub fn auto_identity(handle: SubscriptionHandle) -> String {
    format!("{}{}", AUTO_PREFIX, handle)
}

/// Subscription handle of an `auto <handle>` identity.
///
/// Any other identity (e.g. an administrator's manual lock) yields `None`
/// and is never treated as stale.
pub fn parse_auto_identity(owner: &str) -> Option<SubscriptionHandle> {
    owner.strip_prefix(AUTO_PREFIX)?.parse().ok()
}

/// Ownership bookkeeping for one resource and subscription.
///
/// Transitions are serialized by the coordinator; the inner mutex only
/// protects the state word and is never held across an await.
pub struct LockStateMachine {
    resource_id: String,
    handle: SubscriptionHandle,
    identity: String,
    store: Arc<dyn LockRecordStore>,
    oracle: Arc<dyn LivenessOracle>,
    channel: Arc<dyn NotifyChannel>,
    notify_timeout: Duration,
    state: Mutex<LockState>,
}

impl LockStateMachine {
    /// Create an unlocked state machine for `handle` on `resource_id`.
    pub fn new(
        resource_id: impl Into<String>,
        handle: SubscriptionHandle,
        store: Arc<dyn LockRecordStore>,
        oracle: Arc<dyn LivenessOracle>,
        channel: Arc<dyn NotifyChannel>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            handle,
            identity: auto_identity(handle),
            store,
            oracle,
            channel,
            notify_timeout,
            state: Mutex::new(LockState::Unlocked),
        }
    }

    fn guard(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state.
    pub fn state(&self) -> LockState {
        *self.guard()
    }

    /// Replace the state, returning the previous one.
    pub fn set_state(&self, next: LockState) -> LockState {
        let mut state = self.guard();
        let prev = *state;
        *state = next;
        if prev != next {
            debug!(
                resource = %self.resource_id,
                handle = self.handle,
                from = %prev,
                to = %next,
                "lock state changed"
            );
        }
        prev
    }

    /// Move from `from` to `to` only if the state is still `from`.
    pub fn transition(&self, from: LockState, to: LockState) -> bool {
        let mut state = self.guard();
        if *state != from {
            return false;
        }
        *state = to;
        debug!(
            resource = %self.resource_id,
            handle = self.handle,
            from = %from,
            to = %to,
            "lock state changed"
        );
        true
    }

    /// True iff the state is `LockedBySelf`.
    pub fn is_lock_owner(&self) -> bool {
        self.state() == LockState::LockedBySelf
    }

    /// Identity written into the lock record.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Whether the lock record currently names this subscription.
    pub async fn record_names_self(&self) -> WatcherResult<bool> {
        let record = self
            .store
            .inspect(&self.resource_id)
            .await
            .map_err(WatcherError::Lock)?;
        Ok(record.map(|r| r.is_held_by(&self.identity)).unwrap_or(false))
    }

    /// Acquire the exclusive lock record.
    ///
    /// ## Returns
    /// - `Ok(())`: now `LockedBySelf`; `acquired-lock` was broadcast
    /// - `Err(WatcherError::Busy)`: held by a live owner, a manual lock or shared holders
    /// - `Err(WatcherError::Lock)`: store failure, surfaced verbatim
    pub async fn try_lock(&self) -> WatcherResult<()> {
        match self.acquire().await {
            Ok(()) => {}
            Err(WatcherError::Busy(_)) => match self.check_stale().await {
                Err(WatcherError::Stale(owner)) => {
                    self.break_stale(&owner).await?;
                    self.acquire().await?;
                }
                Ok(()) => self.acquire().await?,
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e),
        }

        self.set_state(LockState::LockedBySelf);
        info!(resource = %self.resource_id, handle = self.handle, "acquired exclusive lock");
        publish_best_effort(
            self.channel.as_ref(),
            &self.resource_id,
            Some(self.handle),
            NotifyPayload::AcquiredLock {
                client_id: self.handle,
            },
            self.notify_timeout,
        )
        .await;
        Ok(())
    }

    /// Release the lock record. Succeeds without broadcasting when already unlocked.
    ///
    /// A record that was already broken or removed by someone else counts as
    /// released.
    pub async fn release_lock(&self) -> WatcherResult<()> {
        if self.state() == LockState::Unlocked {
            return Ok(());
        }

        self.release_record().await?;

        self.set_state(LockState::Unlocked);
        info!(resource = %self.resource_id, handle = self.handle, "released exclusive lock");
        publish_best_effort(
            self.channel.as_ref(),
            &self.resource_id,
            Some(self.handle),
            NotifyPayload::ReleasedLock {
                client_id: self.handle,
            },
            self.notify_timeout,
        )
        .await;
        Ok(())
    }

    /// Remove this subscription from the lock record without touching local
    /// state or broadcasting. A record that is already gone counts as released.
    pub async fn release_record(&self) -> WatcherResult<()> {
        let released = self
            .store
            .release_lock(ReleaseLockOptions {
                resource_id: self.resource_id.clone(),
                owner: self.identity.clone(),
            })
            .await;
        match released {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_free() => {
                debug!(
                    resource = %self.resource_id,
                    handle = self.handle,
                    error = %e,
                    "lock record already released"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    resource = %self.resource_id,
                    handle = self.handle,
                    error = %e,
                    "failed to release lock record"
                );
                Err(WatcherError::Lock(e))
            }
        }
    }

    /// Drop local ownership without touching the record.
    ///
    /// Returns whether the state changed.
    pub fn force_unlocked(&self) -> bool {
        self.set_state(LockState::Unlocked) != LockState::Unlocked
    }

    async fn acquire(&self) -> WatcherResult<()> {
        self.store
            .acquire_lock(AcquireLockOptions {
                resource_id: self.resource_id.clone(),
                mode: LockMode::Exclusive,
                owner: self.identity.clone(),
            })
            .await
            .map(|_| ())
            .map_err(WatcherError::from)
    }

    /// Classify the current record.
    ///
    /// `Ok(())` means the record vanished, `Err(Stale)` names a dead owner,
    /// `Err(Busy)` a live one.
    async fn check_stale(&self) -> WatcherResult<()> {
        let Some(record) = self
            .store
            .inspect(&self.resource_id)
            .await
            .map_err(WatcherError::Lock)?
        else {
            return Ok(());
        };

        let Some(holder) = record.holders.first() else {
            return Ok(());
        };
        if record.mode == LockMode::Shared || record.holders.len() != 1 {
            return Err(WatcherError::Busy(holder.owner.clone()));
        }
        let Some(owner_handle) = parse_auto_identity(&holder.owner) else {
            return Err(WatcherError::Busy(holder.owner.clone()));
        };
        if self.oracle.is_live(&self.resource_id, owner_handle).await? {
            return Err(WatcherError::Busy(holder.owner.clone()));
        }
        Err(WatcherError::Stale(holder.owner.clone()))
    }

    async fn break_stale(&self, owner: &str) -> WatcherResult<()> {
        let record = self
            .store
            .inspect(&self.resource_id)
            .await
            .map_err(WatcherError::Lock)?;
        let Some(holder) = record.as_ref().and_then(|r| r.holder(owner)) else {
            return Ok(());
        };

        warn!(
            resource = %self.resource_id,
            handle = self.handle,
            stale_owner = %owner,
            "breaking stale lock"
        );
        match self
            .store
            .break_lock(BreakLockOptions {
                resource_id: self.resource_id.clone(),
                owner: owner.to_string(),
                token: holder.token.clone(),
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_free() => Ok(()),
            Err(e) => {
                error!(
                    resource = %self.resource_id,
                    stale_owner = %owner,
                    error = %e,
                    "failed to break stale lock"
                );
                Err(WatcherError::Lock(e))
            }
        }
    }
}
