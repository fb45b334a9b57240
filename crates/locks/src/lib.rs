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

//! # LockWatch Lock Records
//!
//! ## Purpose
//! Defines the atomic lock record primitive that arbitrates exclusive
//! ownership of a resource between processes, plus an in-memory store.
//!
//! ## Architecture Context
//! This crate is used by:
//! - **Lock State Machine** (`lockwatch-watcher`): acquires, releases and
//!   breaks stale records on behalf of a subscription
//!
//! ## Design Decisions
//! - **Single arbiter**: the store alone decides who wins a racing acquire
//! - **Opaque owners**: identities are strings; the watcher encodes its
//!   subscription handle into them for stale-lock detection
//! - **Token-guarded break**: a break only evicts the holder instance that
//!   was inspected, never one that re-acquired since
//!
//! ## Examples
//!
//! ```rust
//! use lockwatch_locks::{AcquireLockOptions, LockMode, LockRecordStore, MemoryLockStore, ReleaseLockOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryLockStore::new();
//!
//! let record = store.acquire_lock(AcquireLockOptions {
//!     resource_id: "image-1".to_string(),
//!     mode: LockMode::Exclusive,
//!     owner: "auto 42".to_string(),
//! }).await?;
//! assert!(record.is_held_by("auto 42"));
//!
//! store.release_lock(ReleaseLockOptions {
//!     resource_id: "image-1".to_string(),
//!     owner: "auto 42".to_string(),
//! }).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
mod store;

pub use error::{LockError, LockResult};
pub use memory::MemoryLockStore;
pub use store::{
    AcquireLockOptions, BreakLockOptions, LockHolder, LockMode, LockRecord, LockRecordStore,
    ReleaseLockOptions,
};
