// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query translation and search failure mapping.
//!
//! A raw query string goes to the engine untouched as a
//! [`SearchQuery::QueryString`]. Whatever comes back is mapped into the
//! service's vocabulary: hits become a [`Page`] of records, and an engine
//! parse failure becomes a [`QuerySyntaxError`]. Every other failure passes
//! through unchanged.

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use super::error::{find_engine_error, IndexError};
use super::index::SearchIndex;
use super::query::SearchQuery;
use crate::metrics;
use crate::record::{Page, PageRequest, Record};

/// Entity tag attached to errors raised by the search subsystem.
///
/// Older clients of this API may match the misspelled legacy tag
/// `"elasticseach"`; the tag is spelled correctly here on purpose. Clients
/// should match on [`QUERY_SYNTAX_ERROR_KEY`], which is unchanged.
pub const SEARCH_ENTITY: &str = "elasticsearch";
/// Error key for malformed queries.
pub const QUERY_SYNTAX_ERROR_KEY: &str = "querySyntaxError";
pub const QUERY_SYNTAX_MESSAGE: &str = "Invalid query syntax!";

/// The caller's query string could not be parsed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QuerySyntaxError {
    pub message: String,
    pub entity: String,
    pub code: String,
}

impl QuerySyntaxError {
    pub fn new() -> Self {
        Self {
            message: QUERY_SYNTAX_MESSAGE.to_string(),
            entity: SEARCH_ENTITY.to_string(),
            code: QUERY_SYNTAX_ERROR_KEY.to_string(),
        }
    }

    /// Client error: the request, not the system, is at fault.
    #[must_use]
    pub fn status(&self) -> u16 {
        400
    }
}

impl Default for QuerySyntaxError {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    QuerySyntax(#[from] QuerySyntaxError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Map a search failure into the service taxonomy.
///
/// The cause chain is searched for an engine payload whose first root cause
/// reads `Failed to parse query [...`. Anything else is returned as is.
pub fn map_search_failure(err: IndexError) -> SearchError {
    let is_parse_failure = find_engine_error(&err).is_some_and(|engine| engine.is_query_parse_failure());
    if is_parse_failure {
        debug!(error = %err, "Search query rejected by engine parser");
        SearchError::QuerySyntax(QuerySyntaxError::new())
    } else {
        SearchError::Index(err)
    }
}

/// Runs searches against an index and maps their results.
#[derive(Clone)]
pub struct QueryTranslator {
    index: Arc<dyn SearchIndex>,
}

impl QueryTranslator {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Pass-through translation: the raw string is not validated here.
    pub fn translate(query: &str) -> SearchQuery {
        SearchQuery::query_string(query)
    }

    /// Run a raw query string.
    pub async fn search(&self, query: &str, page: PageRequest) -> Result<Page<Record>, SearchError> {
        self.search_query(&Self::translate(query), page).await
    }

    /// Run a structured query. The page total is the engine's total hit
    /// count, not the number of records on this page.
    pub async fn search_query(&self, query: &SearchQuery, page: PageRequest) -> Result<Page<Record>, SearchError> {
        let start = Instant::now();
        let result = self.index.execute_query(query, page).await;
        metrics::record_search_latency(start.elapsed());

        match result {
            Ok(hits) => {
                metrics::record_search_query("success");
                metrics::record_search_results(hits.documents.len());
                debug!(total = hits.total, returned = hits.documents.len(), "Search completed");
                Ok(Page::new(hits.documents, page, hits.total))
            }
            Err(e) => {
                let mapped = map_search_failure(e);
                match &mapped {
                    SearchError::QuerySyntax(_) => metrics::record_search_query("query_syntax"),
                    SearchError::Index(e) => {
                        warn!(error = %e, "Search failed");
                        metrics::record_search_query("error");
                    }
                }
                Err(mapped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::error::{EngineError, ErrorCause};
    use crate::search::memory::MemorySearchIndex;

    fn parse_failure() -> IndexError {
        IndexError::Engine(EngineError::query_parse_failure("name:", "missing value"))
    }

    #[test]
    fn test_parse_failure_maps_to_query_syntax() {
        match map_search_failure(parse_failure()) {
            SearchError::QuerySyntax(e) => {
                assert_eq!(e.message, "Invalid query syntax!");
                assert_eq!(e.entity, "elasticsearch");
                assert_ne!(e.entity, "elasticseach");
                assert_eq!(e.code, "querySyntaxError");
                assert_eq!(e.status(), 400);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_wrapped_parse_failure_maps_to_query_syntax() {
        let wrapped = IndexError::uncategorized(
            "search failed",
            IndexError::uncategorized("request failed", parse_failure()),
        );
        assert!(matches!(map_search_failure(wrapped), SearchError::QuerySyntax(_)));
    }

    #[test]
    fn test_other_engine_errors_pass_through() {
        let engine = EngineError::new(
            404,
            ErrorCause::new("index_not_found_exception", "no such index [products]")
                .with_root_cause(ErrorCause::new("index_not_found_exception", "no such index [products]")),
        );
        match map_search_failure(IndexError::Engine(engine.clone())) {
            SearchError::Index(IndexError::Engine(e)) => assert_eq!(e, engine),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_non_engine_errors_pass_through() {
        let err = IndexError::Unavailable("search_index".into());
        assert!(matches!(
            map_search_failure(err),
            SearchError::Index(IndexError::Unavailable(ref name)) if name == "search_index"
        ));
    }

    #[test]
    fn test_empty_root_cause_passes_through() {
        let engine = EngineError::new(500, ErrorCause::new("exception", "Failed to parse query [x]"));
        assert!(matches!(
            map_search_failure(IndexError::Engine(engine)),
            SearchError::Index(_)
        ));
    }

    #[test]
    fn test_translate_is_pass_through() {
        assert_eq!(
            QueryTranslator::translate("name:(a OR b"),
            SearchQuery::query_string("name:(a OR b")
        );
    }

    #[tokio::test]
    async fn test_search_pages_with_engine_total() {
        let index = Arc::new(MemorySearchIndex::new().unwrap());
        for i in 0..3 {
            index
                .index_document(&Record::new(format!("hello {i}")).with_id(format!("r-{i}")))
                .await
                .unwrap();
        }
        let translator = QueryTranslator::new(index);

        let page = translator.search("hello", PageRequest::new(0, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.content.len(), 2);
        assert!(page.has_next());

        let empty = translator.search("absent", PageRequest::new(0, 10)).await.unwrap();
        assert_eq!(empty.total, 0);
        assert!(empty.content.is_empty());
    }

    #[tokio::test]
    async fn test_search_maps_malformed_query() {
        let translator = QueryTranslator::new(Arc::new(MemorySearchIndex::new().unwrap()));
        let err = translator.search("name:", PageRequest::default()).await.unwrap_err();
        assert!(matches!(err, SearchError::QuerySyntax(_)));
    }
}
