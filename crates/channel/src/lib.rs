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

//! # LockWatch Channel
//!
//! ## Purpose
//! Defines the broadcast notification channel that every process with a
//! resource open subscribes to, and ships an in-memory bus implementing it.
//!
//! ## Architecture Context
//! ```text
//! ┌──────────────┐   publish(round)   ┌────────────────────┐
//! │ Coordinator  │───────────────────▶│   NotifyChannel    │
//! │ (watcher)    │◀───── acks ────────│  (this crate)      │
//! └──────────────┘                    └─────────┬──────────┘
//!        ▲                                      │ deliver
//!        │ handle_notify / handle_error         ▼
//!        └──────────────────────────── NotifyHandler (per subscription)
//! ```
//!
//! ## Key Components
//! - [`NotifyChannel`]: subscribe, unsubscribe and publish-with-ack rounds
//! - [`NotifyHandler`]: per-subscription delivery callback
//! - [`LivenessOracle`]: liveness of a subscription, for stale-lock detection
//! - [`InMemoryNotifyBus`]: single-process implementation of both seams
//!
//! ## Examples
//!
//! ```rust
//! use lockwatch_channel::*;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Ack;
//!
//! #[async_trait]
//! impl NotifyHandler for Ack {
//!     async fn handle_notify(&self, _n: Notification) -> Vec<u8> {
//!         b"ok".to_vec()
//!     }
//! }
//!
//! # async fn example() -> ChannelResult<()> {
//! let bus = InMemoryNotifyBus::new();
//! let handle = bus.subscribe("image-1", Arc::new(Ack)).await?;
//!
//! let outcome = bus.publish("image-1", Some(handle), b"ping".to_vec(), Duration::from_secs(1)).await?;
//! assert_eq!(outcome.acks.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod channel;
pub mod in_memory;
pub mod observability;

pub use channel::{
    ChannelError, ChannelResult, LivenessOracle, Notification, NotifyAck, NotifyChannel,
    NotifyHandler, PublishOutcome, SubscriptionHandle,
};
pub use in_memory::InMemoryNotifyBus;
