// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record data model.
//!
//! The [`Record`] is the authoritative entity owned by the record store. The
//! search index only ever holds a derived copy of it, addressed by the same id.
//!
//! # Example
//!
//! ```
//! use catalog_sync::{Record, RecordPatch};
//!
//! let mut record = Record::new("Desk lamp").with_content("Warm white, 40W");
//! assert!(record.id.is_none());
//!
//! // Merge patch: only fields that are present are applied
//! RecordPatch::default().with_content("Cool white, 40W").apply_to(&mut record);
//! assert_eq!(record.name, "Desk lamp");
//! assert_eq!(record.content.as_deref(), Some("Cool white, 40W"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authoritative entity.
///
/// `id` is `None` until the record store assigns one on first save and is
/// immutable afterwards. Audit timestamps are owned by the store as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Set by the store on first save (millisecond precision)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
    /// Set by the store on every save (millisecond precision)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date: Option<DateTime<Utc>>,
}

impl Record {
    /// Create an unsaved record.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            content: None,
            created_date: None,
            last_modified_date: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Id as a string slice, if assigned.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// A merge patch over [`Record`].
///
/// Fields left as `None` are not touched when the patch is applied. The id is
/// carried only so callers can check it against the addressed record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl RecordPatch {
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Apply the non-null fields onto `record`. Identity and audit fields are
    /// never touched.
    pub fn apply_to(&self, record: &mut Record) {
        if let Some(ref name) = self.name {
            record.name = name.clone();
        }
        if let Some(ref content) = self.content {
            record.content = Some(content.clone());
        }
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Self {
        Self { page, size }
    }

    /// Offset of the first element on this page.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    /// Clamp the size into `1..=max_size`.
    #[must_use]
    pub fn clamped(self, max_size: usize) -> Self {
        Self {
            page: self.page,
            size: self.size.clamp(1, max_size.max(1)),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: PageRequest, total: u64) -> Self {
        Self {
            content,
            page: request.page,
            size: request.size,
            total,
        }
    }

    /// Number of pages needed to hold `total` elements.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total.div_ceil(self.size as u64)
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        (self.page as u64).saturating_add(1) < self.total_pages()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total: self.total,
        }
    }
}

/// Current time truncated to milliseconds (the precision every backend keeps).
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
