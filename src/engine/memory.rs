//! In-process index engine with the same semantics as the LMDB one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    CommitStats, EngineDocument, EngineReader, EngineWriter, FieldKind, Hit, IndexEngine, WriteOp,
};
use crate::error::EngineError;
use crate::query::{Query, TermIndex};

#[derive(Debug, Default)]
struct MemoryIndex {
    next_ordinal: u64,
    docs: BTreeMap<u64, StoredEntry>,
    postings: BTreeMap<(String, String), BTreeSet<u64>>,
    kinds: HashMap<String, FieldKind>,
}

#[derive(Debug)]
struct StoredEntry {
    stored: EngineDocument,
    terms: Vec<(String, String)>,
}

impl MemoryIndex {
    fn apply(&mut self, op: WriteOp, stats: &mut CommitStats) {
        match op {
            WriteOp::Add(doc) => {
                let ordinal = self.next_ordinal;
                self.next_ordinal += 1;

                for field in doc.fields.iter().filter(|f| f.indexed) {
                    self.kinds.insert(field.name.clone(), field.kind);
                }
                let terms = doc.index_terms();
                for term in &terms {
                    self.postings.entry(term.clone()).or_default().insert(ordinal);
                }
                let stored = EngineDocument {
                    fields: doc.stored_fields().cloned().collect(),
                };
                self.docs.insert(ordinal, StoredEntry { stored, terms });
                stats.added += 1;
            }
            WriteOp::DeleteTerm { field, term } => {
                let ordinals = self.postings.get(&(field, term)).cloned().unwrap_or_default();
                for ordinal in ordinals {
                    let Some(entry) = self.docs.remove(&ordinal) else {
                        continue;
                    };
                    for key in entry.terms {
                        if let Some(set) = self.postings.get_mut(&key) {
                            set.remove(&ordinal);
                            if set.is_empty() {
                                self.postings.remove(&key);
                            }
                        }
                    }
                    stats.deleted += 1;
                }
            }
        }
    }
}

impl TermIndex for MemoryIndex {
    fn postings(&self, field: &str, term: &str) -> Result<BTreeSet<u64>, EngineError> {
        Ok(self
            .postings
            .get(&(field.to_string(), term.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn prefix_postings(&self, field: &str, prefix: &str) -> Result<BTreeSet<u64>, EngineError> {
        let start = (field.to_string(), prefix.to_string());
        Ok(self
            .postings
            .range(start..)
            .take_while(|((f, t), _)| f == field && t.starts_with(prefix))
            .flat_map(|(_, ordinals)| ordinals.iter().copied())
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryEngine {
    name: String,
    index: Arc<Mutex<MemoryIndex>>,
}

impl MemoryEngine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            index: Arc::new(Mutex::new(MemoryIndex::default())),
        }
    }
}

fn lock(index: &Mutex<MemoryIndex>) -> MutexGuard<'_, MemoryIndex> {
    index.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IndexEngine for MemoryEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_reader(&self) -> Result<Box<dyn EngineReader>, EngineError> {
        Ok(Box::new(MemoryReader {
            index: Arc::clone(&self.index),
        }))
    }

    fn open_writer(&self) -> Result<Box<dyn EngineWriter>, EngineError> {
        Ok(Box::new(MemoryWriter {
            index: Arc::clone(&self.index),
            ops: Vec::new(),
        }))
    }
}

struct MemoryReader {
    index: Arc<Mutex<MemoryIndex>>,
}

impl EngineReader for MemoryReader {
    fn num_docs(&self) -> Result<u64, EngineError> {
        Ok(lock(&self.index).docs.len() as u64)
    }

    fn field_kind(&self, field: &str) -> Result<Option<FieldKind>, EngineError> {
        Ok(lock(&self.index).kinds.get(field).copied())
    }

    fn search(&self, query: &Query) -> Result<Vec<Hit>, EngineError> {
        let index = lock(&self.index);
        let ordinals = query.matches(&*index)?;
        Ok(ordinals
            .into_iter()
            .filter_map(|ordinal| {
                index.docs.get(&ordinal).map(|entry| Hit {
                    ordinal,
                    document: entry.stored.clone(),
                })
            })
            .collect())
    }

    fn close(self: Box<Self>) -> Result<(), EngineError> {
        Ok(())
    }
}

struct MemoryWriter {
    index: Arc<Mutex<MemoryIndex>>,
    ops: Vec<WriteOp>,
}

impl EngineWriter for MemoryWriter {
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
        let this = *self;
        let mut stats = CommitStats::default();
        let mut index = lock(&this.index);
        for op in this.ops {
            index.apply(op, &mut stats);
        }
        Ok(stats)
    }
}
