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

//! Per-process registry of coordinators, keyed by resource id.

use crate::hooks::{FlushHook, ResourceOperations};
use crate::{LockCoordinator, LockListener, ResourceProfile, WatcherConfig, WatcherResult};
use futures::future::join_all;
use lockwatch_channel::{LivenessOracle, NotifyChannel};
use lockwatch_locks::LockRecordStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Options for [`ResourceRegistry::open`].
#[derive(Clone, Default)]
pub struct OpenOptions {
    /// How the resource is opened
    pub profile: ResourceProfile,
    /// Flush hook, defaults to a no-op
    pub flush: Option<Arc<dyn FlushHook>>,
    /// Operation executor, defaults to rejecting everything
    pub operations: Option<Arc<dyn ResourceOperations>>,
    /// Listeners registered before the subscription goes live
    pub listeners: Vec<Arc<dyn LockListener>>,
}

/// Coordinators for every resource this process has open.
///
/// ## Purpose
/// Keeps ownership state per resource so several resources are managed
/// independently over the same channel and store.
pub struct ResourceRegistry {
    channel: Arc<dyn NotifyChannel>,
    store: Arc<dyn LockRecordStore>,
    oracle: Arc<dyn LivenessOracle>,
    config: WatcherConfig,
    coordinators: Mutex<HashMap<String, Arc<LockCoordinator>>>,
}

impl ResourceRegistry {
    /// Create an empty registry over shared collaborators.
    pub fn new(
        channel: Arc<dyn NotifyChannel>,
        store: Arc<dyn LockRecordStore>,
        oracle: Arc<dyn LivenessOracle>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            channel,
            store,
            oracle,
            config,
            coordinators: Mutex::new(HashMap::new()),
        }
    }

    /// Open `resource_id`, or return its coordinator if already open.
    ///
    /// A coordinator that lost its subscription is replaced by a fresh one.
    pub async fn open(
        &self,
        resource_id: &str,
        options: OpenOptions,
    ) -> WatcherResult<Arc<LockCoordinator>> {
        let mut coordinators = self.coordinators.lock().await;
        if let Some(existing) = coordinators.get(resource_id) {
            if !existing.is_closed() {
                return Ok(existing.clone());
            }
            debug!(resource = %resource_id, "replacing closed coordinator");
        }

        let mut builder = LockCoordinator::builder(
            resource_id,
            self.channel.clone(),
            self.store.clone(),
            self.oracle.clone(),
        )
        .config(self.config.clone())
        .profile(options.profile);
        if let Some(flush) = options.flush {
            builder = builder.flush_hook(flush);
        }
        if let Some(operations) = options.operations {
            builder = builder.operations(operations);
        }
        for listener in options.listeners {
            builder = builder.listener(listener);
        }

        let coordinator = builder.build().await?;
        coordinators.insert(resource_id.to_string(), coordinator.clone());
        Ok(coordinator)
    }

    /// Coordinator for `resource_id`, if open.
    pub async fn get(&self, resource_id: &str) -> Option<Arc<LockCoordinator>> {
        self.coordinators.lock().await.get(resource_id).cloned()
    }

    /// Open resource ids, sorted.
    pub async fn resources(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.coordinators.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close and forget `resource_id`. Unknown ids are a no-op.
    pub async fn close(&self, resource_id: &str) -> WatcherResult<()> {
        let removed = self.coordinators.lock().await.remove(resource_id);
        match removed {
            Some(coordinator) => coordinator.close().await,
            None => Ok(()),
        }
    }

    /// Close every resource. Returns the first error after closing all.
    pub async fn close_all(&self) -> WatcherResult<()> {
        let drained: Vec<_> = self
            .coordinators
            .lock()
            .await
            .drain()
            .map(|(_, coordinator)| coordinator)
            .collect();
        let results = join_all(drained.iter().map(|c| c.close())).await;
        results.into_iter().collect()
    }
}
