// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Field codecs for search documents.
//!
//! A [`CodecRegistry`] maps a [`TypeTag`] to an `(encode, decode)` pair.
//! [`DocumentMapper`] binds every record field to its codec once, when the
//! mapper is built, so adapters never look codecs up per call.
//!
//! Instants are encoded as RFC 3339 UTC strings with millisecond precision.
//! Only tags that a record field carries are registered.

use std::collections::HashMap;
use std::sync::OnceLock;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::Record;

/// Document field carrying the record id.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Text,
    Instant,
}

/// A typed field value on its way into or out of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Instant(DateTime<Utc>),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Instant(_) => "instant",
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no codec registered for {0:?}")]
    Unregistered(TypeTag),

    #[error("field '{field}': {message}")]
    Invalid { field: String, message: String },

    #[error("document is missing required field '{0}'")]
    Missing(String),
}

pub type EncodeFn = fn(&FieldValue) -> Result<Value, String>;
pub type DecodeFn = fn(&Value) -> Result<FieldValue, String>;

/// Encode/decode pair for one type tag.
#[derive(Clone, Copy)]
pub struct FieldCodec {
    pub encode: EncodeFn,
    pub decode: DecodeFn,
}

impl std::fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCodec").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<TypeTag, FieldCodec>,
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the text and instant codecs installed.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(TypeTag::Text, FieldCodec { encode: encode_text, decode: decode_text });
        registry.register(TypeTag::Instant, FieldCodec { encode: encode_instant, decode: decode_instant });
        registry
    }

    /// Process-wide builtin registry.
    pub fn global() -> &'static CodecRegistry {
        static GLOBAL: OnceLock<CodecRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::builtin)
    }

    /// Install (or replace) the codec for a tag.
    pub fn register(&mut self, tag: TypeTag, codec: FieldCodec) {
        self.codecs.insert(tag, codec);
    }

    pub fn resolve(&self, tag: TypeTag) -> Result<FieldCodec, CodecError> {
        self.codecs.get(&tag).copied().ok_or(CodecError::Unregistered(tag))
    }

    pub fn encode(&self, field: &str, tag: TypeTag, value: &FieldValue) -> Result<Value, CodecError> {
        let codec = self.resolve(tag)?;
        (codec.encode)(value).map_err(|message| invalid(field, message))
    }

    pub fn decode(&self, field: &str, tag: TypeTag, raw: &Value) -> Result<FieldValue, CodecError> {
        let codec = self.resolve(tag)?;
        (codec.decode)(raw).map_err(|message| invalid(field, message))
    }
}

fn invalid(field: &str, message: String) -> CodecError {
    CodecError::Invalid {
        field: field.to_string(),
        message,
    }
}

fn mismatch(expected: &str, got: &FieldValue) -> String {
    format!("expected {} value, got {}", expected, got.kind())
}

fn as_str(raw: &Value) -> Result<&str, String> {
    raw.as_str().ok_or_else(|| format!("expected a string, got {}", raw))
}

fn encode_text(value: &FieldValue) -> Result<Value, String> {
    match value {
        FieldValue::Text(s) => Ok(Value::String(s.clone())),
        other => Err(mismatch("text", other)),
    }
}

fn decode_text(raw: &Value) -> Result<FieldValue, String> {
    as_str(raw).map(|s| FieldValue::Text(s.to_string()))
}

fn encode_instant(value: &FieldValue) -> Result<Value, String> {
    match value {
        FieldValue::Instant(t) => Ok(Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))),
        other => Err(mismatch("instant", other)),
    }
}

fn decode_instant(raw: &Value) -> Result<FieldValue, String> {
    parse_utc(as_str(raw)?).map(FieldValue::Instant)
}

fn parse_utc(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", s, e))
}

// ═══════════════════════════════════════════════════════════════════════════
// Record <-> document
// ═══════════════════════════════════════════════════════════════════════════

/// Declares how one record field maps into a document.
pub struct FieldSpec {
    pub name: &'static str,
    pub tag: TypeTag,
    pub required: bool,
    /// Searched by unqualified query terms.
    pub full_text: bool,
    get: fn(&Record) -> Option<FieldValue>,
    set: fn(&mut Record, FieldValue) -> Result<(), String>,
}

const RECORD_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "name",
        tag: TypeTag::Text,
        required: true,
        full_text: true,
        get: |r| Some(FieldValue::Text(r.name.clone())),
        set: |r, v| match v {
            FieldValue::Text(s) => {
                r.name = s;
                Ok(())
            }
            other => Err(mismatch("text", &other)),
        },
    },
    FieldSpec {
        name: "content",
        tag: TypeTag::Text,
        required: false,
        full_text: true,
        get: |r| r.content.clone().map(FieldValue::Text),
        set: |r, v| match v {
            FieldValue::Text(s) => {
                r.content = Some(s);
                Ok(())
            }
            other => Err(mismatch("text", &other)),
        },
    },
    FieldSpec {
        name: "created_date",
        tag: TypeTag::Instant,
        required: false,
        full_text: false,
        get: |r| r.created_date.map(FieldValue::Instant),
        set: |r, v| match v {
            FieldValue::Instant(t) => {
                r.created_date = Some(t);
                Ok(())
            }
            other => Err(mismatch("instant", &other)),
        },
    },
    FieldSpec {
        name: "last_modified_date",
        tag: TypeTag::Instant,
        required: false,
        full_text: false,
        get: |r| r.last_modified_date.map(FieldValue::Instant),
        set: |r, v| match v {
            FieldValue::Instant(t) => {
                r.last_modified_date = Some(t);
                Ok(())
            }
            other => Err(mismatch("instant", &other)),
        },
    },
];

struct BoundField {
    spec: &'static FieldSpec,
    codec: FieldCodec,
}

/// Converts records to search documents and back.
pub struct DocumentMapper {
    fields: Vec<BoundField>,
}

impl std::fmt::Debug for DocumentMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentMapper")
            .field("fields", &self.fields.iter().map(|b| b.spec.name).collect::<Vec<_>>())
            .finish()
    }
}

impl DocumentMapper {
    /// Bind each field spec to its codec. Fails if a tag has no codec.
    pub fn new(registry: &CodecRegistry, specs: &'static [FieldSpec]) -> Result<Self, CodecError> {
        let fields = specs
            .iter()
            .map(|spec| {
                registry
                    .resolve(spec.tag)
                    .map(|codec| BoundField { spec, codec })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fields })
    }

    /// Shared record mapper over the builtin registry.
    pub fn records() -> Result<&'static DocumentMapper, CodecError> {
        static RECORDS: OnceLock<DocumentMapper> = OnceLock::new();
        if let Some(mapper) = RECORDS.get() {
            return Ok(mapper);
        }
        let mapper = Self::new(CodecRegistry::global(), RECORD_FIELDS)?;
        Ok(RECORDS.get_or_init(|| mapper))
    }

    /// Names of fields unqualified query terms search.
    pub fn full_text_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|b| b.spec.full_text)
            .map(|b| b.spec.name)
    }

    /// Encode a record. Returns the document id and body.
    pub fn to_document(&self, record: &Record) -> Result<(String, Value), CodecError> {
        let id = record
            .id()
            .ok_or_else(|| CodecError::Missing(ID_FIELD.to_string()))?
            .to_string();

        let mut doc = Map::new();
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        for bound in &self.fields {
            match (bound.spec.get)(record) {
                Some(value) => {
                    let encoded = (bound.codec.encode)(&value)
                        .map_err(|message| invalid(bound.spec.name, message))?;
                    doc.insert(bound.spec.name.to_string(), encoded);
                }
                None if bound.spec.required => {
                    return Err(CodecError::Missing(bound.spec.name.to_string()));
                }
                None => {}
            }
        }
        Ok((id, Value::Object(doc)))
    }

    /// Decode a document body stored under `id`.
    pub fn from_document(&self, id: &str, doc: &Value) -> Result<Record, CodecError> {
        let mut record = Record::new("").with_id(id);
        for bound in &self.fields {
            match doc.get(bound.spec.name) {
                Some(Value::Null) | None if bound.spec.required => {
                    return Err(CodecError::Missing(bound.spec.name.to_string()));
                }
                Some(Value::Null) | None => {}
                Some(raw) => {
                    let value = (bound.codec.decode)(raw)
                        .map_err(|message| invalid(bound.spec.name, message))?;
                    (bound.spec.set)(&mut record, value)
                        .map_err(|message| invalid(bound.spec.name, message))?;
                }
            }
        }
        Ok(record)
    }
}
