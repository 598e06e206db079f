// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-facing error taxonomy.
//!
//! | Variant       | Status | Key                                   |
//! |---------------|--------|---------------------------------------|
//! | `Validation`  | 400    | `idexists`, `idnull`, `idinvalid`, `namerequired` |
//! | `NotFound`    | 404    | `idnotfound`                          |
//! | `QuerySyntax` | 400    | `querySyntaxError`                    |
//! | `Storage`     | 500    | `internal`                            |
//! | `Search`      | 500    | `internal`                            |
//!
//! Index mirror failures are deliberately absent: they are reported through
//! [`IndexSyncFailure`](crate::coordinator::IndexSyncFailure) events and
//! never fail an authoritative operation.

use thiserror::Error;

use crate::search::{IndexError, QuerySyntaxError, SearchError};
use crate::storage::traits::StorageError;

/// Entity name used in validation errors.
pub const RECORD_ENTITY: &str = "product";

pub const KEY_ID_EXISTS: &str = "idexists";
pub const KEY_ID_NULL: &str = "idnull";
pub const KEY_ID_INVALID: &str = "idinvalid";
pub const KEY_ID_NOT_FOUND: &str = "idnotfound";
pub const KEY_NAME_REQUIRED: &str = "namerequired";

/// The caller sent an id where none was expected, omitted a required one,
/// or sent one that does not match the addressed record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub entity: String,
    pub key: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, key: &str) -> Self {
        Self {
            message: message.into(),
            entity: RECORD_ENTITY.to_string(),
            key: key.to_string(),
        }
    }

    pub fn id_exists() -> Self {
        Self::new("A new product cannot already have an ID", KEY_ID_EXISTS)
    }

    pub fn id_null() -> Self {
        Self::new("Invalid id", KEY_ID_NULL)
    }

    pub fn id_invalid() -> Self {
        Self::new("Invalid ID", KEY_ID_INVALID)
    }

    pub fn name_required() -> Self {
        Self::new("Name must not be blank", KEY_NAME_REQUIRED)
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error(transparent)]
    QuerySyntax(#[from] QuerySyntaxError),

    #[error("record store failure: {0}")]
    Storage(#[from] StorageError),

    #[error("search failure: {0}")]
    Search(#[source] IndexError),
}

impl ServiceError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: RECORD_ENTITY.to_string(),
            id: id.into(),
        }
    }

    /// HTTP-equivalent status.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::NotFound { .. } => 404,
            ServiceError::QuerySyntax(e) => e.status(),
            ServiceError::Storage(_) | ServiceError::Search(_) => 500,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn error_key(&self) -> &str {
        match self {
            ServiceError::Validation(e) => &e.key,
            ServiceError::NotFound { .. } => KEY_ID_NOT_FOUND,
            ServiceError::QuerySyntax(e) => &e.code,
            ServiceError::Storage(_) | ServiceError::Search(_) => "internal",
        }
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}

impl From<SearchError> for ServiceError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::QuerySyntax(e) => ServiceError::QuerySyntax(e),
            SearchError::Index(e) => ServiceError::Search(e),
        }
    }
}
