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

//! Lock record store trait and record types.

use crate::LockResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lock mode of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Single holder, write ownership
    Exclusive,
    /// Any number of shared holders
    Shared,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Exclusive => f.write_str("exclusive"),
            LockMode::Shared => f.write_str("shared"),
        }
    }
}

/// One holder of a lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    /// Opaque owner identity
    pub owner: String,
    /// Token minted at acquire time; breaking a holder requires it
    pub token: String,
    /// When the holder acquired the record
    pub acquired_at: DateTime<Utc>,
}

/// Lock metadata stored for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Resource the record guards
    pub resource_id: String,
    /// Mode shared by every holder
    pub mode: LockMode,
    /// Current holders (exactly one for exclusive records)
    pub holders: Vec<LockHolder>,
}

impl LockRecord {
    /// Holder entry for `owner`, if any.
    pub fn holder(&self, owner: &str) -> Option<&LockHolder> {
        self.holders.iter().find(|h| h.owner == owner)
    }

    /// Whether `owner` is among the holders.
    pub fn is_held_by(&self, owner: &str) -> bool {
        self.holder(owner).is_some()
    }
}

/// Options for [`LockRecordStore::acquire_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireLockOptions {
    /// Resource to lock
    pub resource_id: String,
    /// Requested mode
    pub mode: LockMode,
    /// Owner identity written into the record
    pub owner: String,
}

/// Options for [`LockRecordStore::release_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLockOptions {
    /// Resource to unlock
    pub resource_id: String,
    /// Owner giving the lock up
    pub owner: String,
}

/// Options for [`LockRecordStore::break_lock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakLockOptions {
    /// Resource whose record is broken
    pub resource_id: String,
    /// Holder to evict
    pub owner: String,
    /// Token observed via [`LockRecordStore::inspect`]
    pub token: String,
}

/// Atomic lock record primitive shared by every process that opens a resource.
///
/// ## Purpose
/// The store is the sole arbiter of ownership: two processes racing
/// `acquire_lock` on the same resource see exactly one success. Callers never
/// assume exclusive access to a record; any operation may observe a peer's
/// concurrent mutation.
///
/// ## Design
/// - **Acquire**: create, join (shared) or fail with `LockAlreadyHeld`
/// - **Release**: remove the caller's holder entry
/// - **Break**: evict another holder, guarded by the token seen at inspect time
/// - **Inspect**: read the current record
#[async_trait]
pub trait LockRecordStore: Send + Sync {
    /// Acquire a record.
    ///
    /// ## Behavior
    /// - No record: create one with a fresh token
    /// - Held by the same owner: return the existing record
    /// - Shared record and shared request: join as another holder
    /// - Otherwise: `LockAlreadyHeld` naming the first holder
    async fn acquire_lock(&self, options: AcquireLockOptions) -> LockResult<LockRecord>;

    /// Release the caller's hold.
    ///
    /// ## Returns
    /// - `Err(LockError::LockNotFound)`: no record
    /// - `Err(LockError::NotHolder)`: caller does not hold it
    async fn release_lock(&self, options: ReleaseLockOptions) -> LockResult<()>;

    /// Evict a holder.
    ///
    /// ## Returns
    /// - `Err(LockError::LockNotFound)`: no record
    /// - `Err(LockError::NotHolder)`: owner is no longer a holder
    /// - `Err(LockError::TokenMismatch)`: owner re-acquired since inspection
    async fn break_lock(&self, options: BreakLockOptions) -> LockResult<()>;

    /// Current record, `None` when unlocked.
    async fn inspect(&self, resource_id: &str) -> LockResult<Option<LockRecord>>;
}
