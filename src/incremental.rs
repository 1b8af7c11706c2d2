use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::archive::archive_name;
use crate::builder::CatalogBuilder;
use crate::config::ReloadingSettings;
use crate::error::Result;
use crate::registry::StoreRegistry;
use crate::scan::find_archives;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassResult {
    pub roots: Vec<String>,
    pub scanned: usize,
    pub new_archives: usize,
    pub modified_archives: usize,
    pub skipped: usize,
    pub classes_stored: usize,
    pub classes_forgotten: u64,
    pub unreadable: usize,
    pub failed_inserts: usize,
    /// Modified archives whose file name is shared by another scanned path.
    pub name_collisions: usize,
}

/// Re-scans directory trees and catalogs what appeared or changed.
///
/// Modification times are remembered between passes of one indexer. An
/// archive seen for the first time is built normally (so an already
/// registered one is skipped); one whose mtime advanced is forgotten and
/// rebuilt.
#[derive(Debug, Clone)]
pub struct IncrementalIndexer {
    roots: Vec<PathBuf>,
    seen: HashMap<PathBuf, u128>,
}

impl IncrementalIndexer {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            seen: HashMap::new(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Returns `(scanned, new, modified)` and records the current mtimes.
    pub fn scan_changes(
        &mut self,
        suffixes: &[String],
    ) -> Result<(usize, Vec<PathBuf>, Vec<PathBuf>)> {
        let mut archives = Vec::new();
        for root in &self.roots {
            archives.extend(find_archives(root, suffixes)?);
        }

        let mut new = Vec::new();
        let mut modified = Vec::new();
        for path in &archives {
            let stamp = mtime_nanos(path);
            match self.seen.insert(path.clone(), stamp) {
                None => new.push(path.clone()),
                Some(old) if old < stamp => modified.push(path.clone()),
                Some(_) => {}
            }
        }
        // forget paths that vanished so namesake checks see only this scan
        let current: HashSet<&PathBuf> = archives.iter().collect();
        self.seen.retain(|path, _| current.contains(path));
        Ok((archives.len(), new, modified))
    }

    /// The catalog keys archives by file name, so forgetting a changed
    /// archive also drops what its namesakes contributed. Such cases are
    /// logged and counted.
    fn report_collisions(&self, modified: &[PathBuf]) -> usize {
        let shared = shared_names(self.seen.keys());
        let mut collisions = 0;
        for path in modified {
            let name = archive_name(path);
            if let Some(paths) = shared.get(&name) {
                collisions += 1;
                warn!(
                    "{} changed but {name} is also found at {}; forgetting it drops both",
                    path.display(),
                    paths
                        .iter()
                        .filter(|p| p.as_path() != path.as_path())
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
        collisions
    }

    pub fn run_once(&mut self, builder: &CatalogBuilder, suffixes: &[String]) -> Result<PassResult> {
        let (scanned, new, modified) = self.scan_changes(suffixes)?;
        let mut result = PassResult {
            roots: self
                .roots
                .iter()
                .map(|r| r.to_string_lossy().to_string())
                .collect(),
            scanned,
            new_archives: new.len(),
            modified_archives: modified.len(),
            name_collisions: self.report_collisions(&modified),
            ..PassResult::default()
        };

        for path in &modified {
            let forgotten = builder.forget(&archive_name(path))?;
            result.classes_forgotten += forgotten.classes_removed;
        }
        for path in new.iter().chain(&modified) {
            let report = builder.build(path)?;
            if report.skipped {
                result.skipped += 1;
            }
            if report.archive_unreadable {
                result.unreadable += 1;
            }
            result.classes_stored += report.classes_stored;
            result.failed_inserts += report.classes_failed;
        }
        Ok(result)
    }

    /// Runs passes every refresh interval, re-reading settings in between.
    ///
    /// Stops after `max_passes` when given; otherwise runs until an error.
    pub fn watch(
        &mut self,
        registry: &StoreRegistry,
        settings: &mut ReloadingSettings,
        max_passes: Option<usize>,
        mut on_pass: impl FnMut(&PassResult),
    ) -> Result<()> {
        let index_location = settings.current().index_location.clone();
        let mut passes = 0usize;
        loop {
            if settings.refresh() && settings.current().index_location != index_location {
                warn!(
                    "index-location changed; keeping {} until restart",
                    index_location.display()
                );
            }
            let current = settings.current().clone();
            let builder = CatalogBuilder::open(registry, current.skip_if_processed)?;
            let result = self.run_once(&builder, &current.file_type)?;
            info!(
                "pass {}: {} new, {} modified, {} classes stored",
                passes + 1,
                result.new_archives,
                result.modified_archives,
                result.classes_stored
            );
            on_pass(&result);

            passes += 1;
            if max_passes.is_some_and(|max| passes >= max) {
                return Ok(());
            }
            std::thread::sleep(current.refresh_interval);
        }
    }
}

/// File names that more than one path maps to, with those paths in order.
fn shared_names<'p>(paths: impl Iterator<Item = &'p PathBuf>) -> BTreeMap<String, Vec<PathBuf>> {
    let mut by_name: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in paths {
        by_name.entry(archive_name(path)).or_default().push(path.clone());
    }
    by_name.retain(|_, paths| paths.len() > 1);
    for paths in by_name.values_mut() {
        paths.sort();
    }
    by_name
}

fn mtime_nanos(path: &Path) -> u128 {
    path.metadata()
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}
