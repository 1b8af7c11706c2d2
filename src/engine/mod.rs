//! Index engine interface.
//!
//! The catalog talks to its storage/search backend only through the traits in
//! this module. An engine owns one named index and hands out readers and
//! writers; writers buffer their operations and apply them atomically when
//! closed, readers count documents and execute [`Query`] values.
//!
//! Two implementations ship with the crate:
//!
//! - [`lmdb::LmdbEngine`]: persistent, backed by LMDB via heed
//! - [`memory::MemoryEngine`]: in-process, used by tests and dry runs

pub mod lmdb;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::query::Query;

/// How a field's value is turned into index terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    /// The whole value is a single term.
    Atomic,
    /// The value is split into tokens, see [`analyze`].
    Tokenized,
}

/// A field in the engine's native representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineField {
    pub name: String,
    pub value: String,
    pub stored: bool,
    pub indexed: bool,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineDocument {
    pub fields: Vec<EngineField>,
}

impl EngineDocument {
    pub fn add(&mut self, field: EngineField) {
        self.fields.push(field);
    }

    /// Every `(field, term)` pair this document contributes to the inverted index.
    pub fn index_terms(&self) -> Vec<(String, String)> {
        let mut terms = Vec::new();
        for field in self.fields.iter().filter(|f| f.indexed) {
            for term in analyze(&field.value, field.kind) {
                let pair = (field.name.clone(), term);
                if !terms.contains(&pair) {
                    terms.push(pair);
                }
            }
        }
        terms
    }

    /// The subset of fields an engine returns on read.
    pub fn stored_fields(&self) -> impl Iterator<Item = &EngineField> {
        self.fields.iter().filter(|f| f.stored)
    }
}

/// One query match: the engine-assigned ordinal and the stored fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub ordinal: u64,
    pub document: EngineDocument,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    pub added: u64,
    pub deleted: u64,
}

/// A buffered writer operation.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Add(EngineDocument),
    DeleteTerm { field: String, term: String },
}

pub trait EngineReader: Send + Sync {
    fn num_docs(&self) -> Result<u64, EngineError>;

    /// Kind recorded for `field` by the most recent write that indexed it.
    fn field_kind(&self, field: &str) -> Result<Option<FieldKind>, EngineError>;

    /// Matches in ascending ordinal order.
    fn search(&self, query: &Query) -> Result<Vec<Hit>, EngineError>;

    fn close(self: Box<Self>) -> Result<(), EngineError>;
}

pub trait EngineWriter: Send + Sync {
    fn add_document(&mut self, doc: EngineDocument) -> Result<(), EngineError>;

    /// Deletes every document indexed with exactly `term` under `field`.
    fn delete_by_term(&mut self, field: &str, term: &str) -> Result<(), EngineError>;

    /// Commits buffered operations.
    fn close(self: Box<Self>) -> Result<CommitStats, EngineError>;
}

pub trait IndexEngine: Send + Sync {
    fn name(&self) -> &str;

    fn open_reader(&self) -> Result<Box<dyn EngineReader>, EngineError>;

    fn open_writer(&self) -> Result<Box<dyn EngineWriter>, EngineError>;
}

/// Splits `value` into index terms.
///
/// Atomic values are one term, even when empty. Tokenized values break at
/// every character that is not alphanumeric, `_` or `$`; case is preserved.
pub fn analyze(value: &str, kind: FieldKind) -> Vec<String> {
    match kind {
        FieldKind::Atomic => vec![value.to_string()],
        FieldKind::Tokenized => value
            .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
    }
}
