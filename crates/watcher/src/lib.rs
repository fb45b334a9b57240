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

//! # LockWatch Watcher
//!
//! ## Purpose
//! Lets exactly one process at a time own a resource for writing, lets
//! peers request ownership cooperatively, and lets the owner execute
//! privileged operations on behalf of a non-owner while streaming progress
//! and completion back.
//!
//! ## Architecture Context
//! - [`LockStateMachine`]: local ownership backed by the lock record store
//! - [`AsyncRequestTracker`]: correlates remote operations with their
//!   progress and completion notifications
//! - [`LockCoordinator`]: request / release / re-acquire sequencing, owner
//!   side handoff, remote operation routing and notification dispatch
//! - [`ResourceRegistry`]: one coordinator per open resource
//!
//! ## Design Decisions
//! - **Store arbitrates**: racing acquires are decided by the lock record,
//!   never by messages
//! - **Two timeout tiers**: the notify round bounds each request; the
//!   request watchdog bounds an accepted remote operation
//! - **Best-effort broadcasts**: `acquired-lock`, `released-lock` and
//!   `header-update` failures are logged, not returned
//!
//! ## Examples
//!
//! ```rust
//! use lockwatch_channel::InMemoryNotifyBus;
//! use lockwatch_locks::MemoryLockStore;
//! use lockwatch_watcher::LockCoordinator;
//! use std::sync::Arc;
//!
//! # async fn example() -> lockwatch_watcher::WatcherResult<()> {
//! let bus = InMemoryNotifyBus::new();
//! let store = MemoryLockStore::new();
//!
//! let coordinator = LockCoordinator::builder(
//!     "image-1",
//!     Arc::new(bus.clone()),
//!     Arc::new(store.clone()),
//!     Arc::new(bus.clone()),
//! )
//! .build()
//! .await?;
//!
//! coordinator.request_lock().await?;
//! assert!(coordinator.is_lock_owner());
//! coordinator.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broadcast;
pub mod config;
mod coordinator;
mod dispatch;
pub mod error;
pub mod hooks;
mod listener;
pub mod registry;
pub mod state;
pub mod tracing_setup;
pub mod tracker;

pub use config::{ResourceProfile, WatcherConfig};
pub use coordinator::{LockCoordinator, LockCoordinatorBuilder};
pub use error::{WatcherError, WatcherResult};
pub use hooks::{
    FlushHook, NoOpFlush, NoOpProgress, ProgressSink, ResourceOperation, ResourceOperations,
    UnsupportedOperations,
};
pub use listener::LockListener;
pub use registry::{OpenOptions, ResourceRegistry};
pub use state::{LockState, LockStateMachine, LockUpdateState};
pub use tracker::{AsyncRequestTracker, PendingRequest};
