//! Persistent index engine on LMDB (via heed).
//!
//! All stores of one index location share a single environment file; each
//! store owns four named databases:
//!
//! - `<store>.docs`: zero-padded ordinal -> stored document (JSON)
//! - `<store>.postings`: `field \x1f term \x1f ordinal` -> `""`, one key per
//!   posting. Terms too long for an LMDB key are stored as a head of the term
//!   plus its SHA-256 (see `PostingTerm`) and the value holds the full term.
//! - `<store>.fields`: field name -> [`FieldKind`] of the last indexing write
//! - `<store>.meta`: next ordinal
//!
//! Writers buffer their operations and apply them in one write transaction on
//! close. Readers open a short read transaction per call.

use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{
    CommitStats, EngineDocument, EngineField, EngineReader, EngineWriter, FieldKind, Hit,
    IndexEngine, WriteOp,
};
use crate::error::EngineError;
use crate::query::{Query, TermIndex};

const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 32;
const NEXT_ORDINAL: &str = "next_ordinal";

/// Largest key LMDB accepts with its default page size.
const MAX_KEY_BYTES: usize = 511;
const ORDINAL_WIDTH: usize = 20;
const DIGEST_HEX_LEN: usize = 64;
const SEPARATOR: char = '\u{1f}';
const DIGEST_MARK: char = '\u{1e}';

type StrDb = Database<Str, Str>;

/// Opens (or creates) the environment file backing an index location.
pub fn open_env(db_path: &Path) -> Result<Arc<Env>, EngineError> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = EnvOpenOptions::new();
    options.map_size(DEFAULT_MAP_SIZE);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: We do not use NO_LOCK and keep default LMDB locking guarantees.
    // NO_SUB_DIR keeps the index a single file plus its `-lock` sibling.
    let env = unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        options.open(db_path)?
    };
    Ok(Arc::new(env))
}

/// Path of the lock file LMDB keeps next to a `NO_SUB_DIR` environment.
pub fn lock_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push("-lock");
    PathBuf::from(os)
}

#[derive(Debug)]
struct Tables {
    docs: StrDb,
    postings: StrDb,
    fields: StrDb,
    meta: StrDb,
}

impl Tables {
    fn create(env: &Env, store: &str) -> Result<Self, EngineError> {
        let mut wtxn = env.write_txn()?;
        let mut table = |suffix: &str| {
            let name = format!("{store}.{suffix}");
            env.create_database::<Str, Str>(&mut wtxn, Some(name.as_str()))
        };
        let docs = table("docs")?;
        let postings = table("postings")?;
        let fields = table("fields")?;
        let meta = table("meta")?;
        wtxn.commit()?;
        Ok(Self {
            docs,
            postings,
            fields,
            meta,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredField {
    name: String,
    value: String,
    indexed: bool,
    kind: FieldKind,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    fields: Vec<StoredField>,
    /// Postings this document was added to, so deletes can unlink it.
    terms: Vec<(String, String)>,
}

impl StoredDocument {
    fn from_document(doc: &EngineDocument) -> Self {
        Self {
            fields: doc
                .stored_fields()
                .map(|f| StoredField {
                    name: f.name.clone(),
                    value: f.value.clone(),
                    indexed: f.indexed,
                    kind: f.kind,
                })
                .collect(),
            terms: doc.index_terms(),
        }
    }

    fn into_document(self) -> EngineDocument {
        EngineDocument {
            fields: self
                .fields
                .into_iter()
                .map(|f| EngineField {
                    name: f.name,
                    value: f.value,
                    stored: true,
                    indexed: f.indexed,
                    kind: f.kind,
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct LmdbEngine {
    name: String,
    env: Arc<Env>,
    tables: Arc<Tables>,
}

impl LmdbEngine {
    pub fn open(env: Arc<Env>, name: &str) -> Result<Self, EngineError> {
        let tables = Tables::create(&env, name)?;
        Ok(Self {
            name: name.to_string(),
            env,
            tables: Arc::new(tables),
        })
    }
}

impl IndexEngine for LmdbEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_reader(&self) -> Result<Box<dyn EngineReader>, EngineError> {
        Ok(Box::new(LmdbReader {
            env: Arc::clone(&self.env),
            tables: Arc::clone(&self.tables),
        }))
    }

    fn open_writer(&self) -> Result<Box<dyn EngineWriter>, EngineError> {
        Ok(Box::new(LmdbWriter {
            env: Arc::clone(&self.env),
            tables: Arc::clone(&self.tables),
            ops: Vec::new(),
        }))
    }
}

struct LmdbReader {
    env: Arc<Env>,
    tables: Arc<Tables>,
}

struct TxnView<'t, 'e> {
    txn: &'t RoTxn<'e>,
    tables: &'t Tables,
}

impl TermIndex for TxnView<'_, '_> {
    fn postings(&self, field: &str, term: &str) -> Result<BTreeSet<u64>, EngineError> {
        term_ordinals(&self.tables.postings, self.txn, field, term)
    }

    fn prefix_postings(&self, field: &str, prefix: &str) -> Result<BTreeSet<u64>, EngineError> {
        let field_prefix = format!("{field}{SEPARATOR}");
        let scan = format!("{field_prefix}{}", char_head(prefix, head_budget(field)));
        let mut out = BTreeSet::new();
        for item in self.tables.postings.prefix_iter(self.txn, &scan)? {
            let (key, value) = item?;
            let (term_part, ordinal) = split_posting(key, field_prefix.len())?;
            let term = if value.is_empty() { term_part } else { value };
            if term.starts_with(prefix) {
                out.insert(ordinal);
            }
        }
        Ok(out)
    }
}

impl EngineReader for LmdbReader {
    fn num_docs(&self) -> Result<u64, EngineError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.tables.docs.len(&rtxn)?)
    }

    fn field_kind(&self, field: &str) -> Result<Option<FieldKind>, EngineError> {
        let rtxn = self.env.read_txn()?;
        match self.tables.fields.get(&rtxn, field)? {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn search(&self, query: &Query) -> Result<Vec<Hit>, EngineError> {
        let rtxn = self.env.read_txn()?;
        let view = TxnView {
            txn: &rtxn,
            tables: &self.tables,
        };
        let ordinals = query.matches(&view)?;

        let mut hits = Vec::with_capacity(ordinals.len());
        for ordinal in ordinals {
            let Some(raw) = self.tables.docs.get(&rtxn, &ordinal_key(ordinal))? else {
                log::warn!("posting references missing document {ordinal}; skipping");
                continue;
            };
            let stored: StoredDocument = serde_json::from_str(raw)?;
            hits.push(Hit {
                ordinal,
                document: stored.into_document(),
            });
        }
        Ok(hits)
    }

    fn close(self: Box<Self>) -> Result<(), EngineError> {
        Ok(())
    }
}

struct LmdbWriter {
    env: Arc<Env>,
    tables: Arc<Tables>,
    ops: Vec<WriteOp>,
}

impl EngineWriter for LmdbWriter {
    fn add_document(&mut self, doc: EngineDocument) -> Result<(), EngineError> {
        self.ops.push(WriteOp::Add(doc));
        Ok(())
    }

    fn delete_by_term(&mut self, field: &str, term: &str) -> Result<(), EngineError> {
        self.ops.push(WriteOp::DeleteTerm {
            field: field.to_string(),
            term: term.to_string(),
        });
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<CommitStats, EngineError> {
        let mut stats = CommitStats::default();
        if self.ops.is_empty() {
            return Ok(stats);
        }

        let t = &*self.tables;
        let mut wtxn = self.env.write_txn()?;
        let mut next = t
            .meta
            .get(&wtxn, NEXT_ORDINAL)?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        for op in &self.ops {
            match op {
                WriteOp::Add(doc) => {
                    let ordinal = next;
                    next += 1;

                    for field in doc.fields.iter().filter(|f| f.indexed) {
                        let kind = serde_json::to_string(&field.kind)?;
                        t.fields.put(&mut wtxn, &field.name, &kind)?;
                    }

                    let stored = StoredDocument::from_document(doc);
                    for (field, term) in &stored.terms {
                        let posting = PostingTerm::new(field, term);
                        t.postings
                            .put(&mut wtxn, &posting.key(field, ordinal), posting.value(term))?;
                    }

                    let json = serde_json::to_string(&stored)?;
                    t.docs.put(&mut wtxn, &ordinal_key(ordinal), &json)?;
                    stats.added += 1;
                }
                WriteOp::DeleteTerm { field, term } => {
                    for ordinal in term_ordinals(&t.postings, &wtxn, field, term)? {
                        let doc_key = ordinal_key(ordinal);
                        let Some(raw) = t.docs.get(&wtxn, &doc_key)?.map(str::to_owned) else {
                            continue;
                        };
                        let stored: StoredDocument = serde_json::from_str(&raw)?;
                        for (f, tm) in &stored.terms {
                            unlink(&t.postings, &mut wtxn, f, tm, ordinal)?;
                        }
                        t.docs.delete(&mut wtxn, &doc_key)?;
                        stats.deleted += 1;
                    }
                }
            }
        }

        t.meta.put(&mut wtxn, NEXT_ORDINAL, &next.to_string())?;
        wtxn.commit()?;
        Ok(stats)
    }
}

fn ordinal_key(ordinal: u64) -> String {
    format!("{ordinal:020}")
}

/// The term segment of a posting key.
///
/// Terms that fit are used verbatim. Longer ones become a char-aligned head
/// of the term, a digest mark and the term's SHA-256, which keeps prefix scans
/// working on the head; their postings carry the full term as value.
#[derive(Debug)]
struct PostingTerm {
    segment: String,
    digested: bool,
}

impl PostingTerm {
    fn new(field: &str, term: &str) -> Self {
        if field.len() + term.len() + ORDINAL_WIDTH + 2 <= MAX_KEY_BYTES {
            return Self {
                segment: term.to_string(),
                digested: false,
            };
        }
        let head = char_head(term, head_budget(field));
        Self {
            segment: format!("{head}{DIGEST_MARK}{}", digest(term)),
            digested: true,
        }
    }

    fn scan_prefix(&self, field: &str) -> String {
        format!("{field}{SEPARATOR}{}{SEPARATOR}", self.segment)
    }

    fn key(&self, field: &str, ordinal: u64) -> String {
        format!("{}{}", self.scan_prefix(field), ordinal_key(ordinal))
    }

    fn value<'t>(&self, term: &'t str) -> &'t str {
        if self.digested { term } else { "" }
    }

    fn matches(&self, term: &str, value: &str) -> bool {
        if self.digested { value == term } else { value.is_empty() }
    }
}

fn digest(term: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(term.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bytes of a term head that still leave room for the digest and ordinal.
fn head_budget(field: &str) -> usize {
    MAX_KEY_BYTES.saturating_sub(field.len() + DIGEST_HEX_LEN + ORDINAL_WIDTH + 3)
}

fn char_head(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Splits a posting key into its term segment and ordinal.
fn split_posting(key: &str, field_prefix_len: usize) -> Result<(&str, u64), EngineError> {
    let corrupt = || EngineError::Corrupt(format!("posting key {key:?}"));
    let ordinal_start = key
        .len()
        .checked_sub(ORDINAL_WIDTH)
        .filter(|&start| start > field_prefix_len && key.is_char_boundary(start))
        .ok_or_else(corrupt)?;
    let ordinal = key[ordinal_start..].parse::<u64>().map_err(|_| corrupt())?;
    Ok((&key[field_prefix_len..ordinal_start - 1], ordinal))
}

fn term_ordinals(
    db: &StrDb,
    txn: &RoTxn<'_>,
    field: &str,
    term: &str,
) -> Result<BTreeSet<u64>, EngineError> {
    let posting = PostingTerm::new(field, term);
    let scan = posting.scan_prefix(field);
    let mut out = BTreeSet::new();
    for item in db.prefix_iter(txn, &scan)? {
        let (key, value) = item?;
        // longer terms that merely start with `term` share the scan prefix
        if key.len() != scan.len() + ORDINAL_WIDTH || !posting.matches(term, value) {
            continue;
        }
        let (_, ordinal) = split_posting(key, field.len() + 1)?;
        out.insert(ordinal);
    }
    Ok(out)
}

fn unlink(
    db: &StrDb,
    wtxn: &mut RwTxn<'_>,
    field: &str,
    term: &str,
    ordinal: u64,
) -> Result<(), EngineError> {
    let key = PostingTerm::new(field, term).key(field, ordinal);
    db.delete(wtxn, &key)?;
    Ok(())
}
