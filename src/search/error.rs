// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search engine failure shapes.
//!
//! The engine reports failures as a structured payload:
//!
//! ```json
//! {
//!   "error": {
//!     "root_cause": [
//!       { "type": "query_shard_exception", "reason": "Failed to parse query [name:]" }
//!     ],
//!     "type": "search_phase_execution_exception",
//!     "reason": "all shards failed"
//!   },
//!   "status": 400
//! }
//! ```
//!
//! [`EngineError`] carries that payload. Adapters may wrap it in further
//! [`IndexError`] layers; [`find_engine_error`] walks the `source()` chain to
//! get it back.

use std::error::Error as StdError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::codec::CodecError;

/// Reason prefix the engine uses when a query string cannot be parsed.
pub const QUERY_PARSE_FAILURE_PREFIX: &str = "Failed to parse query [";

/// One node of the engine's error tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCause {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub root_cause: Vec<ErrorCause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<Box<ErrorCause>>,
}

impl ErrorCause {
    pub fn new(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            reason: Some(reason.into()),
            root_cause: Vec::new(),
            caused_by: None,
        }
    }

    #[must_use]
    pub fn with_root_cause(mut self, cause: ErrorCause) -> Self {
        self.root_cause.push(cause);
        self
    }
}

/// Structured error payload returned by the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("search engine error (status {status}): {}", .error.reason.as_deref().unwrap_or("no reason given"))]
pub struct EngineError {
    pub status: u16,
    pub error: ErrorCause,
}

impl EngineError {
    pub fn new(status: u16, error: ErrorCause) -> Self {
        Self { status, error }
    }

    /// The shape the engine produces for a query string it cannot parse.
    pub fn query_parse_failure(query: &str, detail: &str) -> Self {
        let root = ErrorCause::new(
            "query_shard_exception",
            format!("{}{}]", QUERY_PARSE_FAILURE_PREFIX, query),
        );
        let mut error = ErrorCause::new("search_phase_execution_exception", "all shards failed")
            .with_root_cause(root.clone());
        error.caused_by = Some(Box::new(ErrorCause {
            caused_by: Some(Box::new(ErrorCause::new("parse_exception", detail))),
            ..root
        }));
        Self::new(400, error)
    }

    /// Root-cause list as reported by the engine (may be empty).
    #[must_use]
    pub fn root_causes(&self) -> &[ErrorCause] {
        &self.error.root_cause
    }

    /// True when the first root cause says the query string could not be parsed.
    #[must_use]
    pub fn is_query_parse_failure(&self) -> bool {
        self.root_causes()
            .first()
            .and_then(|cause| cause.reason.as_deref())
            .is_some_and(|reason| reason.starts_with(QUERY_PARSE_FAILURE_PREFIX))
    }

    /// Parse an error response body. Returns `None` when the body is not an
    /// engine error document.
    pub fn from_body(status: u16, body: &str) -> Option<Self> {
        let doc: Value = serde_json::from_str(body).ok()?;
        let error = match doc.get("error")? {
            Value::String(reason) => ErrorCause {
                reason: Some(reason.clone()),
                ..Default::default()
            },
            obj @ Value::Object(_) => serde_json::from_value(obj.clone()).ok()?,
            _ => return None,
        };
        let status = doc
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(status);
        Some(Self::new(status, error))
    }
}

/// Failures of the search index adapter.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The engine answered with its structured error payload.
    #[error("search engine rejected the request")]
    Engine(#[from] EngineError),

    #[error("search request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The engine answered with something that is not an error document.
    #[error("unexpected search engine response: {0}")]
    Response(String),

    #[error("document mapping failed: {0}")]
    Codec(#[from] CodecError),

    #[error("invalid search endpoint: {0}")]
    Endpoint(String),

    #[error("search index unavailable: circuit '{0}' is open")]
    Unavailable(String),

    /// Generic infrastructure wrapper around another index failure.
    #[error("{message}")]
    Uncategorized {
        message: String,
        #[source]
        source: Box<IndexError>,
    },
}

impl IndexError {
    pub fn uncategorized(message: impl Into<String>, source: IndexError) -> Self {
        Self::Uncategorized {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// The engine payload somewhere in this error's cause chain.
    #[must_use]
    pub fn engine_error(&self) -> Option<&EngineError> {
        find_engine_error(self)
    }
}

/// Walk an error's `source()` chain and return the first engine payload.
pub fn find_engine_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a EngineError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(engine) = e.downcast_ref::<EngineError>() {
            return Some(engine);
        }
        current = e.source();
    }
    None
}
