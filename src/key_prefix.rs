// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-wide cache key prefix.
//!
//! Cached records from a previous deployment must not be read back by a new
//! one, so every cache key is namespaced by a prefix derived from build
//! metadata. The prefix is computed once and never changes for the lifetime
//! of the process. The first available source wins:
//!
//! 1. source-control revision (`CATALOG_SYNC_GIT_REVISION`)
//! 2. build timestamp, RFC 3339 (`CATALOG_SYNC_BUILD_TIME`)
//! 3. build version (`CATALOG_SYNC_BUILD_VERSION`)
//! 4. a random 12-character alphanumeric token
//!
//! Each variable is read from the runtime environment first, then from the
//! value baked in at compile time.
//!
//! ```
//! use catalog_sync::key_prefix::{self, BuildInfo};
//!
//! let info = BuildInfo { revision: Some("9f3c2ab".into()), ..Default::default() };
//! assert_eq!(info.resolve_prefix(), "9f3c2ab");
//!
//! let key = key_prefix::cache_key("find_one", &["r-1"]);
//! assert!(key.ends_with(":find_one:r-1"));
//! ```

use std::sync::OnceLock;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{debug, info};

const REVISION_VAR: &str = "CATALOG_SYNC_GIT_REVISION";
const BUILD_TIME_VAR: &str = "CATALOG_SYNC_BUILD_TIME";
const BUILD_VERSION_VAR: &str = "CATALOG_SYNC_BUILD_VERSION";
const RANDOM_TOKEN_LEN: usize = 12;

static PREFIX: OnceLock<String> = OnceLock::new();

/// Build metadata the prefix may be derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    pub revision: Option<String>,
    pub build_time: Option<DateTime<Utc>>,
    pub version: Option<String>,
}

impl BuildInfo {
    /// Read build metadata from the environment, falling back to values
    /// captured at compile time.
    pub fn detect() -> Self {
        let revision = lookup(REVISION_VAR, option_env!("CATALOG_SYNC_GIT_REVISION"));
        let build_time = lookup(BUILD_TIME_VAR, option_env!("CATALOG_SYNC_BUILD_TIME"))
            .and_then(|raw| match DateTime::parse_from_rfc3339(&raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(e) => {
                    debug!(value = %raw, error = %e, "Ignoring unparseable build time");
                    None
                }
            });
        let version = lookup(BUILD_VERSION_VAR, option_env!("CATALOG_SYNC_BUILD_VERSION"));

        Self {
            revision,
            build_time,
            version,
        }
    }

    /// Apply the fallback chain. Only the random tail is non-deterministic.
    #[must_use]
    pub fn resolve_prefix(&self) -> String {
        if let Some(ref revision) = self.revision {
            return revision.clone();
        }
        if let Some(build_time) = self.build_time {
            return build_time.to_rfc3339_opts(SecondsFormat::Secs, true);
        }
        if let Some(ref version) = self.version {
            return version.clone();
        }
        random_token()
    }
}

fn lookup(var: &str, baked: Option<&'static str>) -> Option<String> {
    std::env::var(var)
        .ok()
        .or_else(|| baked.map(str::to_string))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn random_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Initialise the process prefix from explicit build info.
///
/// Only the first call has any effect; later calls return the prefix that is
/// already in place.
pub fn init(info: &BuildInfo) -> &'static str {
    PREFIX.get_or_init(|| {
        let prefix = info.resolve_prefix();
        info!(prefix = %prefix, "Cache key prefix initialised");
        prefix
    })
}

/// The process prefix, detecting build info on first use.
pub fn prefix() -> &'static str {
    PREFIX.get_or_init(|| {
        let prefix = BuildInfo::detect().resolve_prefix();
        info!(prefix = %prefix, "Cache key prefix initialised");
        prefix
    })
}

/// Build a namespaced cache key: `{prefix}:{method}:{param1}:{param2}...`
pub fn cache_key(method: &str, params: &[&str]) -> String {
    let mut key = String::with_capacity(prefix().len() + method.len() + 16);
    key.push_str(prefix());
    key.push(':');
    key.push_str(method);
    for param in params {
        key.push(':');
        key.push_str(param);
    }
    key
}
