// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search Infrastructure
//!
//! Derived full-text index over records. The record store stays the source
//! of truth; the index is rebuilt from it one document at a time by the
//! mirror dispatcher.
//!
//! # Architecture
//!
//! ```text
//! QueryTranslator ── SearchQuery ──→ SearchIndex
//!       ↑                              ├─→ ElasticsearchIndex (REST)
//!       │                              ├─→ MemorySearchIndex  (QueryNode evaluation)
//!  map_search_failure                  └─→ CircuitBreakingIndex (guards writes)
//!       │
//!  QuerySyntaxError | IndexError
//! ```
//!
//! Records are converted to documents by a [`DocumentMapper`] whose field
//! codecs come from a [`CodecRegistry`].

mod codec;
mod elasticsearch;
mod error;
mod index;
mod memory;
mod query;
mod translator;

pub use codec::{CodecError, CodecRegistry, DocumentMapper, FieldCodec, FieldValue, TypeTag};
pub use elasticsearch::ElasticsearchIndex;
pub use error::{find_engine_error, EngineError, ErrorCause, IndexError, QUERY_PARSE_FAILURE_PREFIX};
pub use index::{CircuitBreakingIndex, SearchHits, SearchIndex};
pub use memory::MemorySearchIndex;
pub use query::{analyze, parse_query_string, QueryNode, QueryParseError, SearchQuery};
pub use translator::{
    map_search_failure, QuerySyntaxError, QueryTranslator, SearchError, QUERY_SYNTAX_ERROR_KEY,
    SEARCH_ENTITY,
};
