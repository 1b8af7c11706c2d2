//! Entry Store: the reader/writer lifecycle of one named index.
//!
//! The engine must never see a reader and a writer open at the same time.
//! Each store keeps its state in a [`Lifecycle`] behind an `RwLock`:
//! mutations and `count` hold the lock exclusively for the whole
//! open→act→close sequence, searches share it.
//!
//! ```text
//! Closed ──store/delete──▶ WriterOpen ──commit──▶ Closed
//!   │                          ▲
//!   └──count──▶ ReaderOpen ────┘ (reader closed first)
//! ```

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};
use serde::Serialize;

use crate::document::{Record, to_engine_document};
use crate::engine::{CommitStats, EngineReader, EngineWriter, IndexEngine};
use crate::error::{CatalogError, EngineError, Result};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreState {
    Closed,
    ReaderOpen,
    WriterOpen,
}

enum Lifecycle {
    Closed,
    ReaderOpen(Box<dyn EngineReader>),
    /// A mutation is in flight; the writer lives on the mutating call's stack.
    WriterOpen,
}

pub struct EntryStore {
    name: String,
    engine: Arc<dyn IndexEngine>,
    lifecycle: RwLock<Lifecycle>,
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl EntryStore {
    pub fn new(engine: Arc<dyn IndexEngine>) -> Self {
        Self {
            name: engine.name().to_string(),
            engine,
            lifecycle: RwLock::new(Lifecycle::Closed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StoreState {
        match &*self.shared() {
            Lifecycle::Closed => StoreState::Closed,
            Lifecycle::ReaderOpen(_) => StoreState::ReaderOpen,
            Lifecycle::WriterOpen => StoreState::WriterOpen,
        }
    }

    /// Persists one record as its own committed transaction.
    pub fn store(&self, record: &Record) -> Result<()> {
        let doc = to_engine_document(record).map_err(|e| self.failure("store", e))?;
        self.mutate("store", |writer| writer.add_document(doc))?;
        Ok(())
    }

    /// Deletes every document whose `field` equals `value`; returns how many went.
    pub fn delete_by_field(&self, field: &str, value: &str) -> Result<u64> {
        let stats = self.mutate("delete", |writer| writer.delete_by_term(field, value))?;
        Ok(stats.deleted)
    }

    /// Number of documents in the store.
    ///
    /// Returns `None` when a reader is already open: the count is only taken
    /// while opening the shared reader, which then stays open for queries.
    pub fn count(&self) -> Result<Option<u64>> {
        let mut state = self.exclusive();
        if let Lifecycle::ReaderOpen(_) = &*state {
            debug!("store '{}': count requested with reader already open", self.name);
            return Ok(None);
        }
        let reader = self
            .engine
            .open_reader()
            .map_err(|e| self.failure("count", e))?;
        let docs = reader.num_docs().map_err(|e| self.failure("count", e))?;
        *state = Lifecycle::ReaderOpen(reader);
        Ok(Some(docs))
    }

    /// Closes the shared reader, if any.
    pub fn close(&self) -> Result<()> {
        let mut state = self.exclusive();
        if let Lifecycle::ReaderOpen(reader) = std::mem::replace(&mut *state, Lifecycle::Closed) {
            reader.close().map_err(|e| self.failure("close", e))?;
        }
        Ok(())
    }

    /// Runs `f` against the shared reader if one is open, otherwise against
    /// a reader opened and closed for this call only.
    pub(crate) fn with_reader<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn EngineReader) -> Result<T, EngineError>,
    ) -> Result<T> {
        let state = self.shared();
        if let Lifecycle::ReaderOpen(reader) = &*state {
            return f(&**reader).map_err(|e| self.failure(operation, e));
        }
        debug_assert!(!matches!(&*state, Lifecycle::WriterOpen));

        let reader = self
            .engine
            .open_reader()
            .map_err(|e| self.failure(operation, e))?;
        let outcome = f(&*reader);
        let closed = reader.close();
        let value = outcome.map_err(|e| self.failure(operation, e))?;
        closed.map_err(|e| self.failure(operation, e))?;
        Ok(value)
    }

    fn mutate(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn EngineWriter) -> Result<(), EngineError>,
    ) -> Result<CommitStats> {
        let mut state = self.exclusive();
        match std::mem::replace(&mut *state, Lifecycle::Closed) {
            Lifecycle::ReaderOpen(reader) => {
                debug!("store '{}': closing reader before {operation}", self.name);
                reader.close().map_err(|e| self.failure(operation, e))?;
            }
            Lifecycle::WriterOpen => {
                // left behind by a mutation that panicked; its writer was dropped uncommitted
                warn!("store '{}': discarding abandoned writer", self.name);
            }
            Lifecycle::Closed => {}
        }

        let mut writer = self
            .engine
            .open_writer()
            .map_err(|e| self.failure(operation, e))?;
        *state = Lifecycle::WriterOpen;

        let applied = f(writer.as_mut());
        let committed = applied.and_then(|()| writer.close());
        *state = Lifecycle::Closed;
        committed.map_err(|e| self.failure(operation, e))
    }

    fn failure(&self, operation: &'static str, source: EngineError) -> CatalogError {
        CatalogError::index(operation, &self.name, source)
    }

    fn shared(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn exclusive(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle.write().unwrap_or_else(PoisonError::into_inner)
    }
}
