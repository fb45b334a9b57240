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

//! Async request tracker.
//!
//! ## Purpose
//! Correlates remote operations with the `async-progress` and
//! `async-complete` notifications the owner sends back, on both sides of
//! the exchange:
//! - **Requester**: one [`PendingRequest`] per outstanding id, waited on with
//!   a watchdog that every matching progress update resets
//! - **Owner**: the set of ids currently executing, so duplicate deliveries
//!   of a request are not run twice
//!
//! ## Design Decisions
//! - **Channel per request**: dispatch pushes events into an unbounded mpsc;
//!   the waiting task owns the receiver, so dispatch never blocks
//! - **RAII cleanup**: dropping a `PendingRequest` removes its entry; late
//!   notifications for it are then dropped silently

use crate::hooks::ProgressSink;
use crate::{WatcherError, WatcherResult};
use lockwatch_channel::SubscriptionHandle;
use lockwatch_notify::AsyncRequestId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

enum TrackerEvent {
    Progress,
    Complete(i32),
    Abort(WatcherError),
}

struct PendingEntry {
    sink: Arc<dyn ProgressSink>,
    events: mpsc::UnboundedSender<TrackerEvent>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tracks outstanding remote operations for one subscription.
pub struct AsyncRequestTracker {
    client_id: SubscriptionHandle,
    next_request: AtomicU64,
    pending: Mutex<HashMap<AsyncRequestId, PendingEntry>>,
    executing: Mutex<HashSet<AsyncRequestId>>,
}

impl AsyncRequestTracker {
    /// Create a tracker whose ids carry `client_id` as their high part.
    pub fn new(client_id: SubscriptionHandle) -> Self {
        Self {
            client_id,
            next_request: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            executing: Mutex::new(HashSet::new()),
        }
    }

    /// Mint a fresh id. Sequence numbers only grow.
    pub fn next_request_id(&self) -> AsyncRequestId {
        AsyncRequestId::new(
            self.client_id,
            self.next_request.fetch_add(1, Ordering::SeqCst),
        )
    }

    /// Register a pending request before its notification is published.
    pub fn register(&self, id: AsyncRequestId, sink: Arc<dyn ProgressSink>) -> PendingRequest<'_> {
        let (tx, rx) = mpsc::unbounded_channel();
        locked(&self.pending).insert(id, PendingEntry { sink, events: tx });
        trace!(request_id = %id, "registered pending request");
        PendingRequest {
            tracker: self,
            id,
            events: rx,
        }
    }

    /// Number of requests being waited on.
    pub fn pending_count(&self) -> usize {
        locked(&self.pending).len()
    }

    /// Route an `async-progress`. Returns whether a pending request matched.
    pub fn handle_progress(&self, id: AsyncRequestId, offset: u64, total: u64) -> bool {
        let matched = locked(&self.pending)
            .get(&id)
            .map(|entry| (entry.sink.clone(), entry.events.clone()));
        let Some((sink, events)) = matched else {
            debug!(request_id = %id, "dropping progress for unknown request");
            return false;
        };

        sink.update_progress(offset, total);
        let _ = events.send(TrackerEvent::Progress);
        true
    }

    /// Route an `async-complete`. Returns whether a pending request matched.
    pub fn handle_complete(&self, id: AsyncRequestId, result: i32) -> bool {
        let matched = locked(&self.pending).get(&id).map(|entry| entry.events.clone());
        let Some(events) = matched else {
            debug!(request_id = %id, result = result, "dropping completion for unknown request");
            return false;
        };
        let _ = events.send(TrackerEvent::Complete(result));
        true
    }

    /// Fail every pending request with `err`.
    pub fn fail_all(&self, err: WatcherError) {
        let pending = locked(&self.pending);
        for (id, entry) in pending.iter() {
            debug!(request_id = %id, error = %err, "aborting pending request");
            let _ = entry.events.send(TrackerEvent::Abort(err.clone()));
        }
    }

    /// Owner side: mark `id` as executing. `false` if it already is.
    pub fn begin_remote(&self, id: AsyncRequestId) -> bool {
        locked(&self.executing).insert(id)
    }

    /// Owner side: `id` finished executing.
    pub fn finish_remote(&self, id: AsyncRequestId) {
        locked(&self.executing).remove(&id);
    }

    /// Owner side: whether `id` is executing.
    pub fn is_executing(&self, id: AsyncRequestId) -> bool {
        locked(&self.executing).contains(&id)
    }

    fn remove(&self, id: AsyncRequestId) {
        locked(&self.pending).remove(&id);
    }
}

/// One outstanding remote operation on the requester side.
///
/// Dropping it stops tracking the id.
pub struct PendingRequest<'a> {
    tracker: &'a AsyncRequestTracker,
    id: AsyncRequestId,
    events: mpsc::UnboundedReceiver<TrackerEvent>,
}

impl PendingRequest<'_> {
    /// Correlation id of this request.
    pub fn id(&self) -> AsyncRequestId {
        self.id
    }

    /// Wait for `async-complete`.
    ///
    /// ## Returns
    /// - `Ok(())`: completed with 0
    /// - `Err(WatcherError::RemoteFailure(code))`: completed with a non-zero code
    /// - `Err(WatcherError::Restart)`: no activity within `watchdog`
    /// - any error passed to [`AsyncRequestTracker::fail_all`]
    pub async fn wait(mut self, watchdog: Duration) -> WatcherResult<()> {
        let mut deadline = Instant::now() + watchdog;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.events.recv()).await {
                Ok(Some(TrackerEvent::Progress)) => {
                    deadline = Instant::now() + watchdog;
                }
                Ok(Some(TrackerEvent::Complete(code))) => {
                    debug!(request_id = %self.id, result = code, "request completed");
                    return WatcherError::from_remote_code(code);
                }
                Ok(Some(TrackerEvent::Abort(err))) => return Err(err),
                Ok(None) => {
                    return Err(WatcherError::Shutdown(format!("request {} abandoned", self.id)))
                }
                Err(_) => {
                    debug!(request_id = %self.id, "request watchdog expired");
                    return Err(WatcherError::Restart(format!(
                        "no activity for request {} within {:?}",
                        self.id, watchdog
                    )));
                }
            }
        }
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.tracker.remove(self.id);
    }
}
