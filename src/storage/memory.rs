// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use crate::record::{now_millis, Page, PageRequest, Record};
use super::new_record_id;
use super::traits::{RecordCache, RecordStore, StorageError};

pub struct InMemoryRecordStore {
    data: DashMap<String, Record>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all records
    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, id: &str) -> Result<Option<Record>, StorageError> {
        Ok(self.data.get(id).map(|r| r.value().clone()))
    }

    async fn save(&self, record: &Record) -> Result<Record, StorageError> {
        let now = now_millis();
        let mut stored = record.clone();
        let id = match record.id {
            Some(ref id) => id.clone(),
            None => new_record_id(),
        };
        stored.id = Some(id.clone());
        stored.last_modified_date = Some(now);

        // Entry lock keeps created_date stable under concurrent saves of one id
        let mut entry = self.data.entry(id).or_insert_with(|| Record {
            created_date: Some(now),
            ..stored.clone()
        });
        stored.created_date = entry.created_date.or(Some(now));
        *entry = stored.clone();
        Ok(stored)
    }

    async fn exists(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(id))
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.data.remove(id);
        Ok(())
    }

    async fn list_all(&self, page: PageRequest) -> Result<Page<Record>, StorageError> {
        let mut ids: Vec<String> = self.data.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        let total = ids.len() as u64;

        let content = ids
            .iter()
            .skip(page.offset())
            .take(page.size)
            .filter_map(|id| self.data.get(id).map(|r| r.value().clone()))
            .collect();

        Ok(Page::new(content, page, total))
    }
}

/// Process-local read cache with per-entry expiry.
pub struct InMemoryRecordCache {
    entries: DashMap<String, (Record, Instant)>,
}

impl InMemoryRecordCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryRecordCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordCache for InMemoryRecordCache {
    async fn get(&self, key: &str) -> Result<Option<Record>, StorageError> {
        let now = Instant::now();
        let hit = self.entries.get(key).map(|e| {
            let (record, expires_at) = e.value();
            (record.clone(), *expires_at)
        });

        match hit {
            Some((record, expires_at)) if expires_at > now => Ok(Some(record)),
            Some(_) => {
                self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, record: &Record, ttl: Duration) -> Result<(), StorageError> {
        self.entries
            .insert(key.to_string(), (record.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn evict(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryRecordStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_audit_dates() {
        let store = InMemoryRecordStore::new();

        let saved = store.save(&Record::new("Lamp")).await.unwrap();

        assert!(saved.id.is_some());
        assert!(saved.created_date.is_some());
        assert_eq!(saved.created_date, saved.last_modified_date);

        let fetched = store.get(saved.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn test_save_with_id_replaces_and_keeps_created_date() {
        let store = InMemoryRecordStore::new();
        let first = store.save(&Record::new("Lamp")).await.unwrap();

        let mut replacement = Record::new("Floor lamp").with_id(first.id().unwrap());
        replacement.created_date = None;
        let second = store.save(&replacement).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Floor lamp");
        assert_eq!(second.created_date, first.created_date);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryRecordStore::new();

        let result = store.get("nonexistent").await.unwrap();
        assert!(result.is_none());
        assert!(!store.exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = InMemoryRecordStore::new();

        // Should not error
        let result = store.delete("nonexistent").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_list_all_pages_in_id_order() {
        let store = InMemoryRecordStore::new();
        for i in 0..5 {
            store
                .save(&Record::new(format!("r{}", i)).with_id(format!("id-{}", i)))
                .await
                .unwrap();
        }

        let page = store.list_all(PageRequest::new(1, 2)).await.unwrap();

        assert_eq!(page.total, 5);
        let ids: Vec<_> = page.content.iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["id-2", "id-3"]);
    }

    #[tokio::test]
    async fn test_concurrent_saves() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryRecordStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store_clone = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    store_clone
                        .save(&Record::new(format!("batch-{}-item-{}", batch, i)))
                        .await
                        .unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }

    #[tokio::test]
    async fn test_cache_put_get_evict() {
        let cache = InMemoryRecordCache::new();
        let record = Record::new("Lamp").with_id("r1");

        cache.put("k", &record, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(record));

        cache.evict("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_entry_expires() {
        let cache = InMemoryRecordCache::new();
        let record = Record::new("Lamp").with_id("r1");

        cache.put("k", &record, Duration::ZERO).await.unwrap();

        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }
}
