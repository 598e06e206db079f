// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record API: create, update, partial update, delete, reads.
//!
//! Every write commits to the record store first. Only then is the cache
//! entry evicted and the index mirror job dispatched, so a reader can never
//! see a document in the index for a record the store no longer has (modulo
//! the eventual delete).

use std::sync::atomic::Ordering;
use tracing::{debug, warn};

use crate::error::{ServiceError, ValidationError};
use crate::key_prefix;
use crate::metrics::{self, LatencyTimer};
use crate::record::{Page, PageRequest, Record, RecordPatch};

use super::{IndexOp, RecordService};

impl RecordService {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: Writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Save a new record and mirror it into the index.
    ///
    /// Waits for the mirror job, but a mirror failure only produces a warning:
    /// the stored record is returned either way.
    pub async fn create(&self, record: Record) -> Result<Record, ServiceError> {
        debug!(name = %record.name, "Request to create record");
        let _timer = LatencyTimer::new("create");

        if record.id.is_some() {
            metrics::record_operation("create", "invalid");
            return Err(ValidationError::id_exists().into());
        }
        validate_name(&record.name, "create")?;

        let saved = self.save("create", &record).await?;

        if let Err(failure) = self.dispatcher.dispatch_and_wait(IndexOp::Upsert(saved.clone())).await {
            warn!(
                id = %failure.id,
                attempts = failure.attempts,
                error = %failure.error,
                "Record created but not indexed; search may miss it until reindexed"
            );
        }

        metrics::record_operation("create", "success");
        Ok(saved)
    }

    /// Replace the record stored under `id`.
    ///
    /// The body must carry the same id. The index is updated in the
    /// background.
    pub async fn update(&self, id: &str, record: Record) -> Result<Record, ServiceError> {
        debug!(id = %id, "Request to update record");
        let _timer = LatencyTimer::new("update");

        check_body_id(id, record.id(), "update")?;
        validate_name(&record.name, "update")?;

        if !self.store.exists(id).await? {
            metrics::record_operation("update", "not_found");
            return Err(ServiceError::not_found(id));
        }

        let saved = self.save("update", &record).await?;
        self.after_write(id, IndexOp::Reindex(id.to_string())).await;

        metrics::record_operation("update", "success");
        Ok(saved)
    }

    /// Merge `patch` into the record stored under `id`.
    ///
    /// Returns `Ok(None)` if there is no such record; the index is not
    /// touched in that case.
    pub async fn partial_update(&self, id: &str, patch: RecordPatch) -> Result<Option<Record>, ServiceError> {
        debug!(id = %id, "Request to partially update record");
        let _timer = LatencyTimer::new("partial_update");

        check_body_id(id, patch.id.as_deref(), "partial_update")?;
        if let Some(ref name) = patch.name {
            validate_name(name, "partial_update")?;
        }

        let mut existing = match self.store.get(id).await? {
            Some(record) => record,
            None => {
                metrics::record_operation("partial_update", "not_found");
                return Ok(None);
            }
        };

        patch.apply_to(&mut existing);
        let saved = self.save("partial_update", &existing).await?;
        self.after_write(id, IndexOp::Reindex(id.to_string())).await;

        metrics::record_operation("partial_update", "success");
        Ok(Some(saved))
    }

    /// Delete the record, then its document. Deleting an absent id succeeds.
    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        debug!(id = %id, "Request to delete record");
        let _timer = LatencyTimer::new("delete");

        if let Err(e) = self.store.delete(id).await {
            metrics::record_operation("delete", "error");
            return Err(e.into());
        }
        self.after_write(id, IndexOp::Delete(id.to_string())).await;

        metrics::record_operation("delete", "success");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Reads (authoritative store only)
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fetch one record, through the cache when one is configured.
    pub async fn find_one(&self, id: &str) -> Result<Option<Record>, ServiceError> {
        debug!(id = %id, "Request to get record");
        let _timer = LatencyTimer::new("find_one");

        let key = key_prefix::cache_key("find_one", &[id]);
        if let Some(ref cache) = self.cache {
            match cache.get(&key).await {
                Ok(Some(record)) => {
                    metrics::record_cache_lookup("hit");
                    return Ok(Some(record));
                }
                Ok(None) => metrics::record_cache_lookup("miss"),
                Err(e) => {
                    warn!(id = %id, error = %e, "Record cache read failed");
                    metrics::record_cache_lookup("error");
                }
            }
        }

        let epoch = self.write_epoch.load(Ordering::SeqCst);
        let found = self.store.get(id).await?;
        if let (Some(cache), Some(record)) = (&self.cache, &found) {
            if let Err(e) = cache.put(&key, record, self.config.cache_ttl()).await {
                warn!(id = %id, error = %e, "Record cache write failed");
            }
            // A write that committed while we read may have evicted before our
            // put landed. Its eviction missed the entry, so take it out again.
            if self.write_epoch.load(Ordering::SeqCst) != epoch {
                debug!(id = %id, "Write raced cache fill, evicting");
                if let Err(e) = cache.evict(&key).await {
                    warn!(id = %id, error = %e, "Record cache eviction failed");
                }
            }
        }

        metrics::record_operation("find_one", if found.is_some() { "success" } else { "not_found" });
        Ok(found)
    }

    /// Page through all records ordered by id. The page size is capped at
    /// `max_page_size`.
    pub async fn find_all(&self, page: PageRequest) -> Result<Page<Record>, ServiceError> {
        debug!(page = page.page, size = page.size, "Request to get a page of records");
        let _timer = LatencyTimer::new("find_all");

        let page = self.store.list_all(page.clamped(self.config.max_page_size)).await?;
        metrics::record_operation("find_all", "success");
        Ok(page)
    }

    /// First page with the configured default size.
    #[must_use]
    pub fn default_page(&self) -> PageRequest {
        PageRequest::new(0, self.config.default_page_size)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════════

    async fn save(&self, operation: &str, record: &Record) -> Result<Record, ServiceError> {
        self.store.save(record).await.map_err(|e| {
            metrics::record_operation(operation, "error");
            ServiceError::from(e)
        })
    }

    /// Evict the cache entry and queue the index mirror job. Runs only after
    /// the store has committed.
    async fn after_write(&self, id: &str, op: IndexOp) {
        self.write_epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(ref cache) = self.cache {
            let key = key_prefix::cache_key("find_one", &[id]);
            if let Err(e) = cache.evict(&key).await {
                warn!(id = %id, error = %e, "Record cache eviction failed");
            }
        }
        self.dispatcher.dispatch(op).await;
    }
}

fn check_body_id(path_id: &str, body_id: Option<&str>, operation: &str) -> Result<(), ValidationError> {
    match body_id {
        None => {
            metrics::record_operation(operation, "invalid");
            Err(ValidationError::id_null())
        }
        Some(body_id) if body_id != path_id => {
            metrics::record_operation(operation, "invalid");
            Err(ValidationError::id_invalid())
        }
        Some(_) => Ok(()),
    }
}

fn validate_name(name: &str, operation: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        metrics::record_operation(operation, "invalid");
        return Err(ValidationError::name_required());
    }
    Ok(())
}
