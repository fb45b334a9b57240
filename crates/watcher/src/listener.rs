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

//! Upper-layer callbacks for lock ownership changes.

use crate::LockUpdateState;

/// Capabilities an upper layer registers with a coordinator.
///
/// Every callback runs synchronously on the coordinator's dispatch or
/// transition path. Implementations must return quickly and must not call
/// back into coordinator lock operations.
pub trait LockListener: Send + Sync {
    /// A peer asked for the lock. Return `true` to permit the release.
    fn on_peer_lock_requested(&self) -> bool;

    /// Local lock state changed, or a peer acquired or released the lock.
    fn on_lock_state_changed(&self, state: LockUpdateState);

    /// The resource header changed and cached metadata should be refreshed.
    fn on_header_updated(&self) {}
}
