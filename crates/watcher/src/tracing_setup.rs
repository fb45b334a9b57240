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

//! # Tracing Setup
//!
//! ## Purpose
//! Installs a `tracing` subscriber for processes embedding the watcher.
//!
//! ## Design Notes
//! - Uses `tracing` crate for structured logging
//! - `RUST_LOG` selects the filter, `info` otherwise
//! - Installing twice is an error, not a panic

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing
///
/// ## Configuration
/// - `RUST_LOG`: Log level filter (e.g., "info", "debug", "lockwatch_watcher=trace")
///
/// ## Examples
/// ```rust,ignore
/// lockwatch_watcher::tracing_setup::init_tracing()?;
/// ```
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()?;

    tracing::info!("Tracing initialized");
    Ok(())
}
