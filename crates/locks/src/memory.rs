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

//! In-memory lock record store.

use crate::{
    AcquireLockOptions, BreakLockOptions, LockError, LockHolder, LockMode, LockRecord,
    LockRecordStore, LockResult, ReleaseLockOptions,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use ulid::Ulid;

/// In-memory lock record store.
///
/// ## Purpose
/// Provides a `LockRecordStore` for tests and single-process deployments
/// where every coordinator shares one store instance.
///
/// ## Limitations
/// - Not persistent (records lost on restart)
/// - Not distributed (single process only)
#[derive(Clone, Default)]
pub struct MemoryLockStore {
    records: Arc<RwLock<HashMap<String, LockRecord>>>,
}

impl MemoryLockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resources currently locked.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether no resource is locked.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn validate(resource_id: &str, owner: &str) -> LockResult<()> {
    if resource_id.is_empty() {
        return Err(LockError::InvalidKey("resource id is empty".to_string()));
    }
    if owner.is_empty() {
        return Err(LockError::InvalidHolderId("owner is empty".to_string()));
    }
    Ok(())
}

fn new_holder(owner: &str) -> LockHolder {
    LockHolder {
        owner: owner.to_string(),
        token: Ulid::new().to_string(),
        acquired_at: Utc::now(),
    }
}

#[async_trait]
impl LockRecordStore for MemoryLockStore {
    async fn acquire_lock(&self, options: AcquireLockOptions) -> LockResult<LockRecord> {
        validate(&options.resource_id, &options.owner)?;
        let mut records = self.records.write().await;

        if let Some(existing) = records.get_mut(&options.resource_id) {
            if existing.is_held_by(&options.owner) && existing.mode == options.mode {
                return Ok(existing.clone());
            }
            if existing.mode == LockMode::Shared && options.mode == LockMode::Shared {
                existing.holders.push(new_holder(&options.owner));
                return Ok(existing.clone());
            }
            let held_by = existing
                .holders
                .first()
                .map(|h| h.owner.clone())
                .unwrap_or_default();
            return Err(LockError::LockAlreadyHeld(held_by));
        }

        let record = LockRecord {
            resource_id: options.resource_id.clone(),
            mode: options.mode,
            holders: vec![new_holder(&options.owner)],
        };
        records.insert(options.resource_id.clone(), record.clone());
        debug!(
            resource = %options.resource_id,
            owner = %options.owner,
            mode = %options.mode,
            "lock record created"
        );
        Ok(record)
    }

    async fn release_lock(&self, options: ReleaseLockOptions) -> LockResult<()> {
        let mut records = self.records.write().await;
        let existing = records
            .get_mut(&options.resource_id)
            .ok_or_else(|| LockError::LockNotFound(options.resource_id.clone()))?;

        let before = existing.holders.len();
        existing.holders.retain(|h| h.owner != options.owner);
        if existing.holders.len() == before {
            return Err(LockError::NotHolder {
                resource_id: options.resource_id,
                owner: options.owner,
            });
        }
        if existing.holders.is_empty() {
            records.remove(&options.resource_id);
        }
        Ok(())
    }

    async fn break_lock(&self, options: BreakLockOptions) -> LockResult<()> {
        let mut records = self.records.write().await;
        let existing = records
            .get_mut(&options.resource_id)
            .ok_or_else(|| LockError::LockNotFound(options.resource_id.clone()))?;

        let holder = existing
            .holder(&options.owner)
            .ok_or_else(|| LockError::NotHolder {
                resource_id: options.resource_id.clone(),
                owner: options.owner.clone(),
            })?;
        if holder.token != options.token {
            return Err(LockError::TokenMismatch {
                expected: holder.token.clone(),
                actual: options.token,
            });
        }

        existing.holders.retain(|h| h.owner != options.owner);
        if existing.holders.is_empty() {
            records.remove(&options.resource_id);
        }
        debug!(
            resource = %options.resource_id,
            owner = %options.owner,
            "lock record broken"
        );
        Ok(())
    }

    async fn inspect(&self, resource_id: &str) -> LockResult<Option<LockRecord>> {
        let records = self.records.read().await;
        Ok(records.get(resource_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acquire(owner: &str, mode: LockMode) -> AcquireLockOptions {
        AcquireLockOptions {
            resource_id: "image-1".to_string(),
            mode,
            owner: owner.to_string(),
        }
    }

    #[tokio::test]
    async fn test_acquire_lock() {
        let store = MemoryLockStore::new();
        let record = store
            .acquire_lock(acquire("auto 1", LockMode::Exclusive))
            .await
            .unwrap();

        assert_eq!(record.resource_id, "image-1");
        assert_eq!(record.mode, LockMode::Exclusive);
        assert!(record.is_held_by("auto 1"));
        assert!(!record.holders[0].token.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_lock_already_held() {
        let store = MemoryLockStore::new();
        store
            .acquire_lock(acquire("auto 1", LockMode::Exclusive))
            .await
            .unwrap();

        let result = store
            .acquire_lock(acquire("auto 2", LockMode::Exclusive))
            .await;
        assert_eq!(result, Err(LockError::LockAlreadyHeld("auto 1".to_string())));
        assert!(result.unwrap_err().is_contention());
    }

    #[tokio::test]
    async fn test_reacquire_by_same_owner_keeps_token() {
        let store = MemoryLockStore::new();
        let first = store
            .acquire_lock(acquire("auto 1", LockMode::Exclusive))
            .await
            .unwrap();
        let second = store
            .acquire_lock(acquire("auto 1", LockMode::Exclusive))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_shared_holders_block_exclusive() {
        let store = MemoryLockStore::new();
        store.acquire_lock(acquire("reader-a", LockMode::Shared)).await.unwrap();
        let joined = store
            .acquire_lock(acquire("reader-b", LockMode::Shared))
            .await
            .unwrap();
        assert_eq!(joined.holders.len(), 2);

        let result = store
            .acquire_lock(acquire("auto 1", LockMode::Exclusive))
            .await;
        assert!(matches!(result, Err(LockError::LockAlreadyHeld(_))));
    }

    #[tokio::test]
    async fn test_release_lock() {
        let store = MemoryLockStore::new();
        store
            .acquire_lock(acquire("auto 1", LockMode::Exclusive))
            .await
            .unwrap();

        store
            .release_lock(ReleaseLockOptions {
                resource_id: "image-1".to_string(),
                owner: "auto 1".to_string(),
            })
            .await
            .unwrap();
        assert!(store.inspect("image-1").await.unwrap().is_none());

        let again = store
            .release_lock(ReleaseLockOptions {
                resource_id: "image-1".to_string(),
                owner: "auto 1".to_string(),
            })
            .await;
        assert!(matches!(again, Err(LockError::LockNotFound(_))));
        assert!(again.unwrap_err().is_already_free());
    }

    #[tokio::test]
    async fn test_release_by_non_holder() {
        let store = MemoryLockStore::new();
        store
            .acquire_lock(acquire("auto 1", LockMode::Exclusive))
            .await
            .unwrap();

        let result = store
            .release_lock(ReleaseLockOptions {
                resource_id: "image-1".to_string(),
                owner: "auto 2".to_string(),
            })
            .await;
        assert!(matches!(result, Err(LockError::NotHolder { .. })));
        assert!(store.inspect("image-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_break_lock_requires_current_token() {
        let store = MemoryLockStore::new();
        let record = store
            .acquire_lock(acquire("auto 1", LockMode::Exclusive))
            .await
            .unwrap();

        let wrong = store
            .break_lock(BreakLockOptions {
                resource_id: "image-1".to_string(),
                owner: "auto 1".to_string(),
                token: Ulid::new().to_string(),
            })
            .await;
        assert!(matches!(wrong, Err(LockError::TokenMismatch { .. })));

        store
            .break_lock(BreakLockOptions {
                resource_id: "image-1".to_string(),
                owner: "auto 1".to_string(),
                token: record.holders[0].token.clone(),
            })
            .await
            .unwrap();
        assert!(store.is_empty().await);

        store
            .acquire_lock(acquire("auto 2", LockMode::Exclusive))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_options() {
        let store = MemoryLockStore::new();
        let result = store
            .acquire_lock(AcquireLockOptions {
                resource_id: String::new(),
                mode: LockMode::Exclusive,
                owner: "auto 1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(LockError::InvalidKey(_))));

        let result = store.acquire_lock(acquire("", LockMode::Exclusive)).await;
        assert!(matches!(result, Err(LockError::InvalidHolderId(_))));
    }

    #[tokio::test]
    async fn test_concurrent_exclusive_acquire_has_one_winner() {
        let store = MemoryLockStore::new();
        let attempts = (0..16).map(|i| {
            let store = store.clone();
            async move {
                store
                    .acquire_lock(acquire(&format!("auto {}", i), LockMode::Exclusive))
                    .await
            }
        });

        let results = futures::future::join_all(attempts).await;
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(LockError::is_contention));
    }

    #[test]
    fn test_record_serializes() {
        let record = LockRecord {
            resource_id: "image-1".to_string(),
            mode: LockMode::Exclusive,
            holders: vec![new_holder("auto 1")],
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"Exclusive\""));
        assert!(json.contains("auto 1"));
    }
}
