// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search index port.
//!
//! The index holds a derived, eventually consistent copy of the record store.
//! Adapters translate between [`Record`]s and engine documents; they do not
//! retry, that is the mirror dispatcher's job.

use std::sync::Arc;
use async_trait::async_trait;
use tracing::debug;

use super::error::IndexError;
use super::query::SearchQuery;
use crate::record::{PageRequest, Record};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};

/// One page of hits plus the engine's total hit count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub documents: Vec<Record>,
    pub total: u64,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Upsert the document for this record, keyed by its id.
    async fn index_document(&self, record: &Record) -> Result<(), IndexError>;

    /// Remove the document. Deleting an absent id succeeds.
    async fn delete_document(&self, id: &str) -> Result<(), IndexError>;

    /// Run a query and return the requested page.
    async fn execute_query(&self, query: &SearchQuery, page: PageRequest) -> Result<SearchHits, IndexError>;
}

/// Wraps an index so writes go through a circuit breaker.
///
/// Queries bypass the breaker: a failing search should reach the caller with
/// its own error, not a generic "unavailable".
pub struct CircuitBreakingIndex {
    inner: Arc<dyn SearchIndex>,
    circuit: CircuitBreaker,
}

impl CircuitBreakingIndex {
    pub fn new(inner: Arc<dyn SearchIndex>, config: CircuitConfig) -> Self {
        Self {
            inner,
            circuit: CircuitBreaker::new("search_index", config),
        }
    }

    #[must_use]
    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    fn map_circuit_error(&self, op: &str, err: CircuitError<IndexError>) -> IndexError {
        match err {
            CircuitError::Rejected => {
                debug!(op, circuit = %self.circuit.name(), "Index write short-circuited");
                IndexError::Unavailable(self.circuit.name().to_string())
            }
            CircuitError::Inner(e) => IndexError::uncategorized(format!("index {} failed", op), e),
        }
    }
}

#[async_trait]
impl SearchIndex for CircuitBreakingIndex {
    async fn index_document(&self, record: &Record) -> Result<(), IndexError> {
        self.circuit
            .call(|| self.inner.index_document(record))
            .await
            .map_err(|e| self.map_circuit_error("upsert", e))
    }

    async fn delete_document(&self, id: &str) -> Result<(), IndexError> {
        self.circuit
            .call(|| self.inner.delete_document(id))
            .await
            .map_err(|e| self.map_circuit_error("delete", e))
    }

    async fn execute_query(&self, query: &SearchQuery, page: PageRequest) -> Result<SearchHits, IndexError> {
        self.inner.execute_query(query, page).await
    }
}
