// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory search index.
//!
//! Evaluates [`QueryNode`] trees over documents encoded by the shared
//! [`DocumentMapper`]. Used for tests and single-process deployments; it
//! reports malformed query strings exactly like the real engine does.
//!
//! Scoring is term frequency. Hits are ordered by score, highest first, ties
//! broken by id.

use std::collections::{BTreeMap, HashMap};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

use super::codec::DocumentMapper;
use super::error::IndexError;
use super::index::{SearchHits, SearchIndex};
use super::query::{analyze, QueryNode, SearchQuery};
use crate::record::{PageRequest, Record};

struct IndexedDocument {
    source: Value,
    /// Analyzed tokens per string field.
    tokens: HashMap<String, Vec<String>>,
}

impl IndexedDocument {
    fn new(source: Value) -> Self {
        let tokens = source
            .as_object()
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|(name, value)| value.as_str().map(|s| (name.clone(), analyze(s))))
                    .collect()
            })
            .unwrap_or_default();
        Self { source, tokens }
    }

    fn field_tokens<'a>(&'a self, field: &Option<String>, full_text: &'a [&'static str]) -> Vec<&'a [String]> {
        match field {
            Some(f) => self.tokens.get(f).map(|t| vec![t.as_slice()]).unwrap_or_default(),
            None => full_text
                .iter()
                .filter_map(|f| self.tokens.get(*f).map(Vec::as_slice))
                .collect(),
        }
    }
}

pub struct MemorySearchIndex {
    docs: RwLock<BTreeMap<String, IndexedDocument>>,
    mapper: &'static DocumentMapper,
    full_text: Vec<&'static str>,
}

impl MemorySearchIndex {
    pub fn new() -> Result<Self, IndexError> {
        let mapper = DocumentMapper::records()?;
        Ok(Self {
            docs: RwLock::new(BTreeMap::new()),
            full_text: mapper.full_text_fields().collect(),
            mapper,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.docs.read().contains_key(id)
    }

    /// Decode the stored document for an id.
    pub fn document(&self, id: &str) -> Result<Option<Record>, IndexError> {
        let docs = self.docs.read();
        match docs.get(id) {
            Some(doc) => Ok(Some(self.mapper.from_document(id, &doc.source)?)),
            None => Ok(None),
        }
    }

    pub fn clear(&self) {
        self.docs.write().clear();
    }

    /// Score a document against a node. `None` means no match.
    fn score(&self, node: &QueryNode, id: &str, doc: &IndexedDocument) -> Option<f64> {
        match node {
            QueryNode::All => Some(1.0),
            QueryNode::Exists(field) => doc
                .source
                .get(field)
                .filter(|v| !v.is_null())
                .map(|_| 1.0),
            QueryNode::Ids(ids) => ids.iter().any(|i| i == id).then_some(1.0),
            QueryNode::Term { field, term } => {
                let hits: usize = doc
                    .field_tokens(field, &self.full_text)
                    .iter()
                    .map(|tokens| tokens.iter().filter(|t| *t == term).count())
                    .sum();
                positive(hits)
            }
            QueryNode::Prefix { field, prefix } => {
                let hits: usize = doc
                    .field_tokens(field, &self.full_text)
                    .iter()
                    .map(|tokens| tokens.iter().filter(|t| t.starts_with(prefix.as_str())).count())
                    .sum();
                positive(hits)
            }
            QueryNode::Phrase { field, terms } => {
                let hits: usize = doc
                    .field_tokens(field, &self.full_text)
                    .iter()
                    .map(|tokens| {
                        if terms.is_empty() || tokens.len() < terms.len() {
                            0
                        } else {
                            tokens.windows(terms.len()).filter(|w| *w == terms.as_slice()).count()
                        }
                    })
                    .sum();
                positive(hits)
            }
            QueryNode::And(nodes) => nodes
                .iter()
                .map(|n| self.score(n, id, doc))
                .sum::<Option<f64>>(),
            QueryNode::Or(nodes) => {
                let matched: Vec<f64> = nodes.iter().filter_map(|n| self.score(n, id, doc)).collect();
                (!matched.is_empty()).then(|| matched.iter().sum())
            }
            QueryNode::Not(inner) => match self.score(inner, id, doc) {
                Some(_) => None,
                None => Some(1.0),
            },
            QueryNode::Bool { must, should, must_not } => {
                if must_not.iter().any(|n| self.score(n, id, doc).is_some()) {
                    return None;
                }
                let required = must
                    .iter()
                    .map(|n| self.score(n, id, doc))
                    .sum::<Option<f64>>()?;
                let optional: Vec<f64> = should.iter().filter_map(|n| self.score(n, id, doc)).collect();
                if must.is_empty() && !should.is_empty() && optional.is_empty() {
                    return None;
                }
                Some((required + optional.iter().sum::<f64>()).max(1.0))
            }
        }
    }
}

fn positive(hits: usize) -> Option<f64> {
    (hits > 0).then_some(hits as f64)
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn index_document(&self, record: &Record) -> Result<(), IndexError> {
        let (id, source) = self.mapper.to_document(record)?;
        trace!(id = %id, "Indexing document in memory");
        self.docs.write().insert(id, IndexedDocument::new(source));
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), IndexError> {
        self.docs.write().remove(id);
        Ok(())
    }

    async fn execute_query(&self, query: &SearchQuery, page: PageRequest) -> Result<SearchHits, IndexError> {
        let node = query.to_node()?;

        let mut scored: Vec<(f64, String, Record)> = Vec::new();
        {
            let docs = self.docs.read();
            for (id, doc) in docs.iter() {
                if let Some(score) = self.score(&node, id, doc) {
                    scored.push((score, id.clone(), self.mapper.from_document(id, &doc.source)?));
                }
            }
        }

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let total = scored.len() as u64;
        let documents = scored
            .into_iter()
            .skip(page.offset())
            .take(page.size)
            .map(|(_, _, record)| record)
            .collect();

        Ok(SearchHits { documents, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemorySearchIndex {
        let index = MemorySearchIndex::new().unwrap();
        for record in [
            Record::new("Blue Widget").with_id("r-1").with_content("a small blue widget"),
            Record::new("Red Widget").with_id("r-2").with_content("widget widget widget"),
            Record::new("Gadget").with_id("r-3").with_content("nothing blue here"),
            Record::new("Gizmo").with_id("r-4"),
        ] {
            index.index_document(&record).await.unwrap();
        }
        index
    }

    async fn ids(index: &MemorySearchIndex, q: &str) -> Vec<String> {
        index
            .execute_query(&SearchQuery::query_string(q), PageRequest::new(0, 50))
            .await
            .unwrap()
            .documents
            .into_iter()
            .filter_map(|r| r.id)
            .collect()
    }

    #[tokio::test]
    async fn test_term_ranked_by_frequency() {
        let index = seeded().await;
        // r-2 mentions "widget" four times
        assert_eq!(ids(&index, "widget").await, vec!["r-2", "r-1"]);
    }

    #[tokio::test]
    async fn test_field_restriction() {
        let index = seeded().await;
        assert_eq!(ids(&index, "name:blue").await, vec!["r-1"]);
        assert_eq!(ids(&index, "content:blue").await, vec!["r-1", "r-3"]);
    }

    #[tokio::test]
    async fn test_boolean_operators() {
        let index = seeded().await;
        assert_eq!(ids(&index, "blue AND widget").await, vec!["r-1"]);
        assert_eq!(ids(&index, "blue -widget").await, vec!["r-3"]);
        assert_eq!(ids(&index, "gizmo OR gadget").await, vec!["r-3", "r-4"]);
        assert_eq!(ids(&index, "NOT widget").await, vec!["r-3", "r-4"]);
    }

    #[tokio::test]
    async fn test_phrase_and_prefix() {
        let index = seeded().await;
        assert_eq!(ids(&index, "\"blue widget\"").await, vec!["r-1"]);
        assert_eq!(ids(&index, "gi*").await, vec!["r-4"]);
        assert_eq!(ids(&index, "g*").await, vec!["r-3", "r-4"]);
    }

    #[tokio::test]
    async fn test_match_all_and_exists() {
        let index = seeded().await;
        assert_eq!(ids(&index, "*").await.len(), 4);
        assert_eq!(ids(&index, "content:*").await, vec!["r-1", "r-2", "r-3"]);
    }

    #[tokio::test]
    async fn test_paging_keeps_total() {
        let index = seeded().await;
        let hits = index
            .execute_query(&SearchQuery::MatchAll, PageRequest::new(1, 3))
            .await
            .unwrap();

        assert_eq!(hits.total, 4);
        assert_eq!(hits.documents.len(), 1);
        assert_eq!(hits.documents[0].id.as_deref(), Some("r-4"));
    }

    #[tokio::test]
    async fn test_structured_queries() {
        let index = seeded().await;
        let by_ids = index
            .execute_query(&SearchQuery::ids(["r-3", "missing"]), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(by_ids.total, 1);

        let matched = index
            .execute_query(&SearchQuery::matching("name", "gizmo gadget"), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(matched.total, 2);
    }

    #[tokio::test]
    async fn test_malformed_query_reports_engine_error() {
        let index = seeded().await;
        let err = index
            .execute_query(&SearchQuery::query_string("name:"), PageRequest::default())
            .await
            .unwrap_err();

        match err {
            IndexError::Engine(engine) => {
                assert_eq!(engine.status, 400);
                assert!(engine.is_query_parse_failure());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reindex_replaces_and_delete_is_idempotent() {
        let index = seeded().await;
        index
            .index_document(&Record::new("Renamed").with_id("r-4"))
            .await
            .unwrap();
        assert_eq!(index.document("r-4").unwrap().unwrap().name, "Renamed");
        assert!(ids(&index, "gizmo").await.is_empty());

        index.delete_document("r-4").await.unwrap();
        index.delete_document("r-4").await.unwrap();
        assert!(!index.contains("r-4"));
        assert_eq!(index.len(), 3);
    }

    #[tokio::test]
    async fn test_index_requires_id() {
        let index = MemorySearchIndex::new().unwrap();
        let err = index.index_document(&Record::new("no id")).await.unwrap_err();
        assert!(matches!(err, IndexError::Codec(_)));
        assert!(index.is_empty());
    }
}
