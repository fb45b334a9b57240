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

//! Watcher configuration

use crate::{WatcherError, WatcherResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Timeouts and retry pacing for one coordinator.
///
/// Durations serialise as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Reply window of one notify round
    #[serde(rename = "notify_timeout_ms", with = "duration_ms")]
    pub notify_timeout: Duration,

    /// Async request watchdog, reset by every matching progress update
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,

    /// Pause between `request_lock` attempts (may be zero)
    #[serde(rename = "request_lock_retry_ms", with = "duration_ms")]
    pub request_lock_retry_interval: Duration,

    /// How long an accepted lock request waits for the owner's `released-lock`
    #[serde(rename = "released_lock_wait_ms", with = "duration_ms")]
    pub released_lock_wait: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            notify_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            request_lock_retry_interval: Duration::from_millis(100),
            released_lock_wait: Duration::from_secs(5),
        }
    }
}

fn env_ms(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

impl WatcherConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            notify_timeout: env_ms("LOCKWATCH_NOTIFY_TIMEOUT_MS", defaults.notify_timeout),
            request_timeout: env_ms("LOCKWATCH_REQUEST_TIMEOUT_MS", defaults.request_timeout),
            request_lock_retry_interval: env_ms(
                "LOCKWATCH_REQUEST_LOCK_RETRY_MS",
                defaults.request_lock_retry_interval,
            ),
            released_lock_wait: env_ms(
                "LOCKWATCH_RELEASED_LOCK_WAIT_MS",
                defaults.released_lock_wait,
            ),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> WatcherResult<()> {
        if self.notify_timeout.is_zero() {
            return Err(WatcherError::InvalidConfig(
                "notify_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the resource was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    /// Opened read-only
    pub read_only: bool,
    /// Exclusive-lock capability flag of the resource
    pub exclusive_lock: bool,
    /// Bound to a point-in-time snapshot instead of the live resource
    pub snapshot: Option<u64>,
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self {
            read_only: false,
            exclusive_lock: true,
            snapshot: None,
        }
    }
}

impl ResourceProfile {
    /// Whether exclusive locking applies to a resource opened this way.
    pub fn supports_exclusive_lock(&self) -> bool {
        !self.read_only && self.exclusive_lock && self.snapshot.is_none()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
