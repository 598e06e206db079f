// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record storage backends.
//!
//! - [`memory`]: DashMap-backed store and cache (tests, embedded use)
//! - [`sql`]: SQLite / MySQL record store (authoritative)
//! - [`redis`]: shared read cache with prefixed keys

pub mod traits;
pub mod memory;
pub mod sql;
pub mod redis;

/// Generate a new record id (time-ordered UUID).
pub(crate) fn new_record_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
