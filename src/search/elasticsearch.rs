// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Elasticsearch adapter over the REST API.
//!
//! | Operation        | Request                                  |
//! |------------------|------------------------------------------|
//! | index_document   | `PUT /{index}/_doc/{id}`                 |
//! | delete_document  | `DELETE /{index}/_doc/{id}` (404 is fine)|
//! | execute_query    | `POST /{index}/_search`                  |
//!
//! Non-2xx responses are parsed into [`EngineError`] when the body is an
//! engine error document, so callers can inspect root causes.

use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::codec::DocumentMapper;
use super::error::{EngineError, IndexError};
use super::index::{SearchHits, SearchIndex};
use super::query::SearchQuery;
use crate::record::{PageRequest, Record};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Hit>,
}

/// `hits.total` is an object on 7.x+ and a bare number before that.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Object { value: u64 },
    Count(u64),
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Clone)]
pub struct ElasticsearchIndex {
    client: Client,
    base_url: Url,
    index: String,
    mapper: &'static DocumentMapper,
    wait_for_refresh: bool,
}

impl ElasticsearchIndex {
    pub fn new(base_url: &str, index: impl Into<String>) -> Result<Self, IndexError> {
        let base_url = Url::parse(base_url).map_err(|e| IndexError::Endpoint(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(IndexError::Endpoint(base_url.to_string()));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url,
            index: index.into(),
            mapper: DocumentMapper::records()?,
            wait_for_refresh: false,
        })
    }

    /// Make writes block until they are visible to search.
    #[must_use]
    pub fn with_refresh(mut self, wait_for_refresh: bool) -> Self {
        self.wait_for_refresh = wait_for_refresh;
        self
    }

    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn url(&self, segments: &[&str]) -> Result<Url, IndexError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| IndexError::Endpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn doc_url(&self, id: &str) -> Result<Url, IndexError> {
        let mut url = self.url(&[self.index.as_str(), "_doc", id])?;
        if self.wait_for_refresh {
            url.query_pairs_mut().append_pair("refresh", "wait_for");
        }
        Ok(url)
    }

    /// Create the index with explicit mappings if it does not exist yet.
    pub async fn ensure_index(&self) -> Result<(), IndexError> {
        let body = json!({
            "mappings": {
                "properties": {
                    "id": { "type": "keyword" },
                    "name": { "type": "text" },
                    "content": { "type": "text" },
                    "created_date": { "type": "date" },
                    "last_modified_date": { "type": "date" }
                }
            }
        });

        let response = self.client.put(self.url(&[self.index.as_str()])?).json(&body).send().await?;
        if response.status().is_success() {
            info!(index = %self.index, "Created search index");
            return Ok(());
        }

        match error_from_response(response).await {
            IndexError::Engine(e) if e.error.kind.as_deref() == Some("resource_already_exists_exception") => {
                debug!(index = %self.index, "Search index already exists");
                Ok(())
            }
            other => Err(other),
        }
    }
}

async fn error_from_response(response: Response) -> IndexError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return IndexError::Transport(e),
    };
    match EngineError::from_body(status.as_u16(), &body) {
        Some(engine) => IndexError::Engine(engine),
        None => IndexError::Response(format!("{}: {}", status, body)),
    }
}

fn parse_search_response(mapper: &DocumentMapper, body: SearchResponse) -> Result<SearchHits, IndexError> {
    let documents = body
        .hits
        .hits
        .iter()
        .map(|hit| mapper.from_document(&hit.id, &hit.source))
        .collect::<Result<Vec<Record>, _>>()?;

    let total = match body.hits.total {
        Some(TotalHits::Object { value }) | Some(TotalHits::Count(value)) => value,
        None => documents.len() as u64,
    };

    Ok(SearchHits { documents, total })
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn index_document(&self, record: &Record) -> Result<(), IndexError> {
        let (id, doc) = self.mapper.to_document(record)?;
        let response = self.client.put(self.doc_url(&id)?).json(&doc).send().await?;

        if response.status().is_success() {
            debug!(index = %self.index, id = %id, "Indexed document");
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn delete_document(&self, id: &str) -> Result<(), IndexError> {
        let response = self.client.delete(self.doc_url(id)?).send().await?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            debug!(index = %self.index, id = %id, "Deleted document");
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn execute_query(&self, query: &SearchQuery, page: PageRequest) -> Result<SearchHits, IndexError> {
        let body = json!({
            "query": query.to_elasticsearch(),
            "from": page.offset(),
            "size": page.size,
            "track_total_hits": true
        });

        let response = self
            .client
            .post(self.url(&[self.index.as_str(), "_search"])?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = error_from_response(response).await;
            warn!(index = %self.index, error = %err, "Search request failed");
            return Err(err);
        }

        let parsed: SearchResponse = response.json().await?;
        parse_search_response(self.mapper, parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_endpoint() {
        assert!(matches!(
            ElasticsearchIndex::new("not a url", "products"),
            Err(IndexError::Endpoint(_))
        ));
        assert!(matches!(
            ElasticsearchIndex::new("mailto:ops@example.com", "products"),
            Err(IndexError::Endpoint(_))
        ));
    }

    #[test]
    fn test_doc_url_escapes_id() {
        let index = ElasticsearchIndex::new("http://localhost:9200/", "products").unwrap();
        let url = index.doc_url("a/b c").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9200/products/_doc/a%2Fb%20c");
    }

    #[test]
    fn test_doc_url_with_refresh_and_base_path() {
        let index = ElasticsearchIndex::new("http://proxy:8080/es", "products")
            .unwrap()
            .with_refresh(true);
        let url = index.doc_url("r-1").unwrap();
        assert_eq!(url.as_str(), "http://proxy:8080/es/products/_doc/r-1?refresh=wait_for");
    }

    #[test]
    fn test_parse_search_response() {
        let mapper = DocumentMapper::records().unwrap();
        let body: SearchResponse = serde_json::from_value(json!({
            "took": 3,
            "hits": {
                "total": {"value": 42, "relation": "eq"},
                "hits": [
                    {"_id": "r-1", "_score": 1.3, "_source": {"id": "r-1", "name": "Widget"}},
                    {"_id": "r-2", "_score": 0.7, "_source": {"id": "r-2", "name": "Gadget", "content": "x"}}
                ]
            }
        }))
        .unwrap();

        let hits = parse_search_response(mapper, body).unwrap();
        assert_eq!(hits.total, 42);
        assert_eq!(hits.documents.len(), 2);
        assert_eq!(hits.documents[1].content.as_deref(), Some("x"));
    }

    #[test]
    fn test_parse_legacy_total() {
        let mapper = DocumentMapper::records().unwrap();
        let body: SearchResponse =
            serde_json::from_value(json!({"hits": {"total": 7, "hits": []}})).unwrap();

        assert_eq!(parse_search_response(mapper, body).unwrap().total, 7);
    }

    #[test]
    fn test_parse_rejects_undecodable_source() {
        let mapper = DocumentMapper::records().unwrap();
        let body: SearchResponse = serde_json::from_value(json!({
            "hits": {"hits": [{"_id": "r-1", "_source": {"content": "no name"}}]}
        }))
        .unwrap();

        assert!(matches!(parse_search_response(mapper, body), Err(IndexError::Codec(_))));
    }
}
