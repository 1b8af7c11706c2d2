use heed::Env;
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::IndexEngine;
use crate::engine::lmdb::{LmdbEngine, open_env};
use crate::engine::memory::MemoryEngine;
use crate::error::{CatalogError, Result};
use crate::store::EntryStore;

pub const CLASS_STORE: &str = "classes";
pub const ARCHIVE_STORE: &str = "archives";

enum Backend {
    Lmdb { path: PathBuf, env: Arc<Env> },
    Memory,
}

/// Named Entry Stores of one index location.
///
/// Owned by whoever opened the index and passed down by reference; asking
/// for the same name twice yields the same store, so every caller shares its
/// lifecycle lock.
pub struct StoreRegistry {
    backend: Backend,
    stores: Mutex<HashMap<String, Arc<EntryStore>>>,
}

impl StoreRegistry {
    pub fn open(path: &Path) -> Result<Self> {
        let env = open_env(path)
            .map_err(|e| CatalogError::index("open", &path.display().to_string(), e))?;
        debug!("opened index at {}", path.display());
        Ok(Self {
            backend: Backend::Lmdb {
                path: path.to_path_buf(),
                env,
            },
            stores: Mutex::new(HashMap::new()),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Index file backing this registry, if it is persistent.
    pub fn location(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Lmdb { path, .. } => Some(path),
            Backend::Memory => None,
        }
    }

    pub fn store(&self, name: &str) -> Result<Arc<EntryStore>> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(name) {
            return Ok(Arc::clone(store));
        }

        let engine: Arc<dyn IndexEngine> = match &self.backend {
            Backend::Lmdb { env, .. } => Arc::new(
                LmdbEngine::open(Arc::clone(env), name)
                    .map_err(|e| CatalogError::index("open", name, e))?,
            ),
            Backend::Memory => Arc::new(MemoryEngine::new(name)),
        };
        let store = Arc::new(EntryStore::new(engine));
        stores.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Registers a store over a caller-supplied engine, replacing any store
    /// of the same name.
    pub fn install(&self, engine: Arc<dyn IndexEngine>) -> Arc<EntryStore> {
        let store = Arc::new(EntryStore::new(engine));
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores.insert(store.name().to_string(), Arc::clone(&store));
        store
    }

    pub fn names(&self) -> Vec<String> {
        let stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = stores.keys().cloned().collect();
        names.sort();
        names
    }

    /// Closes every shared reader.
    pub fn close_all(&self) -> Result<()> {
        let stores: Vec<Arc<EntryStore>> = {
            let stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
            stores.values().cloned().collect()
        };
        for store in stores {
            store.close()?;
        }
        Ok(())
    }
}
