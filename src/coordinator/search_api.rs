// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search and reindexing.
//!
//! Searches read the index only; they never consult the record store. The
//! reindex operations go the other way and rebuild documents from the store.

use tracing::{debug, info};

use crate::error::ServiceError;
use crate::metrics::{self, LatencyTimer};
use crate::record::{Page, PageRequest, Record};
use crate::search::SearchQuery;

use super::{IndexOp, RecordService};

impl RecordService {
    /// Run a raw query string against the index.
    ///
    /// The page number is kept as given. The page size is capped at
    /// `max_page_size` (and raised to at least 1); the returned
    /// [`Page::size`] is the size actually used, so a caller asking for more
    /// can tell from the page itself.
    ///
    /// A query the engine cannot parse fails with
    /// [`ServiceError::QuerySyntax`]; other engine failures come back as
    /// [`ServiceError::Search`] with the engine error in the source chain.
    pub async fn search(&self, query: &str, page: PageRequest) -> Result<Page<Record>, ServiceError> {
        debug!(query = %query, "Request to search for a page of records");
        let _timer = LatencyTimer::new("search");

        let page = page.clamped(self.config.max_page_size);
        Ok(self.translator.search(query, page).await?)
    }

    /// Run a pre-built query against the index. Paging follows
    /// [`search`](Self::search).
    pub async fn search_query(&self, query: &SearchQuery, page: PageRequest) -> Result<Page<Record>, ServiceError> {
        debug!(query = ?query, "Request to search with structured query");
        let _timer = LatencyTimer::new("search");

        let page = page.clamped(self.config.max_page_size);
        Ok(self.translator.search_query(query, page).await?)
    }

    /// Queue a rebuild of one document from the store. A missing record
    /// removes the document.
    pub async fn reindex(&self, id: &str) {
        debug!(id = %id, "Request to reindex record");
        self.dispatcher.dispatch(IndexOp::Reindex(id.to_string())).await;
    }

    /// Queue a rebuild of every document, paging through the store.
    ///
    /// Returns the number of records queued. Documents whose records no
    /// longer exist are not discovered this way.
    pub async fn reindex_all(&self) -> Result<usize, ServiceError> {
        info!("Request to reindex all records");
        let _timer = LatencyTimer::new("reindex_all");

        let mut request = PageRequest::new(0, self.config.max_page_size.max(1));
        let mut queued = 0usize;
        loop {
            let page = self.store.list_all(request).await?;
            let has_next = page.has_next();
            for record in page.content {
                if let Some(id) = record.id {
                    self.dispatcher.dispatch(IndexOp::Reindex(id)).await;
                    queued += 1;
                }
            }
            if !has_next {
                break;
            }
            request.page += 1;
        }

        metrics::record_operation("reindex_all", "success");
        info!(queued, "Reindex queued");
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SyncConfig;
    use crate::coordinator::RecordService;
    use crate::error::ServiceError;
    use crate::record::{PageRequest, Record};
    use crate::search::{MemorySearchIndex, SearchIndex, SearchQuery};
    use crate::storage::memory::InMemoryRecordStore;
    use crate::storage::traits::RecordStore;
    use std::sync::Arc;

    fn service() -> (RecordService, Arc<InMemoryRecordStore>, Arc<MemorySearchIndex>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let index = Arc::new(MemorySearchIndex::new().unwrap());
        let config = SyncConfig {
            max_page_size: 2,
            ..Default::default()
        };
        (RecordService::new(config, store.clone(), index.clone()), store, index)
    }

    #[tokio::test]
    async fn test_search_finds_created_records() {
        let (service, _, _) = service();
        let lamp = service.create(Record::new("Lamp").with_content("hello world")).await.unwrap();
        service.create(Record::new("Chair").with_content("goodbye")).await.unwrap();

        let page = service.search("hello", PageRequest::new(0, 10)).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.content, vec![lamp]);
        // size capped by max_page_size
        assert_eq!(page.size, 2);
    }

    #[tokio::test]
    async fn test_search_keeps_page_number_and_reports_effective_size() {
        let (service, _, _) = service();
        for i in 0..5 {
            service.create(Record::new(format!("hello {i}"))).await.unwrap();
        }

        let page = service.search("hello", PageRequest::new(1, 2)).await.unwrap();
        assert_eq!((page.page, page.size, page.total), (1, 2, 5));
        assert_eq!(page.content.len(), 2);

        let oversized = service.search("hello", PageRequest::new(2, 500)).await.unwrap();
        assert_eq!((oversized.page, oversized.size), (2, 2));
        assert_eq!(oversized.content.len(), 1);
        assert!(!oversized.has_next());
    }

    #[tokio::test]
    async fn test_malformed_query_is_query_syntax_error() {
        let (service, _, _) = service();

        match service.search("name:", PageRequest::default()).await {
            Err(ServiceError::QuerySyntax(e)) => {
                assert_eq!(e.code, "querySyntaxError");
                assert_eq!(e.entity, "elasticsearch");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_query_ids() {
        let (service, _, _) = service();
        let a = service.create(Record::new("A")).await.unwrap();
        service.create(Record::new("B")).await.unwrap();

        let query = SearchQuery::ids([a.id.clone().unwrap()]);
        let page = service.search_query(&query, PageRequest::default()).await.unwrap();
        assert_eq!(page.content, vec![a]);
    }

    #[tokio::test]
    async fn test_reindex_all_rebuilds_lost_documents() {
        let (service, store, index) = service();
        for i in 0..5 {
            store.save(&Record::new(format!("Item {i}"))).await.unwrap();
        }
        assert!(index.is_empty());

        let queued = service.reindex_all().await.unwrap();
        service.flush_index().await;

        assert_eq!(queued, 5);
        assert_eq!(index.len(), 5);
    }

    #[tokio::test]
    async fn test_reindex_removes_orphaned_document() {
        let (service, _, index) = service();
        let orphan = Record::new("Orphan").with_id("orphan-1");
        index.index_document(&orphan).await.unwrap();

        service.reindex("orphan-1").await;
        service.flush_index().await;

        assert!(!index.contains("orphan-1"));
    }
}
