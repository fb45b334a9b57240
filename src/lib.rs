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

//! LockWatch: cooperative exclusive-lock handoff over a notification channel
//!
//! Processes that open the same resource subscribe to its notification
//! channel. Exactly one of them owns the resource's exclusive lock at a
//! time; the others ask for it, or ask the owner to run privileged
//! operations for them and stream progress back.
//!
//! Layers:
//! 1. Wire protocol (`notify`): versioned, opcode-tagged messages and replies
//! 2. Transport (`channel`): broadcast with per-subscriber acknowledgements
//! 3. Lock records (`locks`): the persistent arbiter of ownership
//! 4. Coordination (`watcher`): state machine, handoff, request tracking

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Independent crates - re-export them here
pub use lockwatch_channel as channel;
pub use lockwatch_locks as locks;
pub use lockwatch_notify as notify;
pub use lockwatch_watcher as watcher;

// Re-export the types most callers need
pub use channel::{InMemoryNotifyBus, LivenessOracle, NotifyChannel};
pub use locks::{LockRecordStore, MemoryLockStore};
pub use notify::{NotifyMessage, NotifyOp, NotifyPayload, ResponseMessage};
pub use watcher::{
    LockCoordinator, LockListener, LockUpdateState, OpenOptions, ResourceOperation,
    ResourceOperations, ResourceRegistry, WatcherConfig, WatcherError, WatcherResult,
};
