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

//! Errno values carried in `ResponseMessage` and `async-complete` results.
//!
//! Results travel as negated errno codes (`-EIO`, `-ERESTART`, ...) so that
//! peers agree on their meaning regardless of platform.

/// I/O error
pub const EIO: i32 = 5;
/// Resource busy
pub const EBUSY: i32 = 16;
/// Already exists
pub const EEXIST: i32 = 17;
/// Not found
pub const ENOENT: i32 = 2;
/// Invalid argument
pub const EINVAL: i32 = 22;
/// Operation not supported
pub const EOPNOTSUPP: i32 = 95;
/// Read-only resource
pub const EROFS: i32 = 30;
/// Interrupted call should be restarted
pub const ERESTART: i32 = 85;
/// Endpoint shut down
pub const ESHUTDOWN: i32 = 108;
/// Timed out
pub const ETIMEDOUT: i32 = 110;
