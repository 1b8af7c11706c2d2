//! Catalog Builder: archive -> class entries -> dedup registration.

use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::archive::{self, archive_name};
use crate::catalog::{ArchiveIndex, ClassIndex};
use crate::entry::{ClassEntry, ClassField};
use crate::error::Result;
use crate::registry::StoreRegistry;
use crate::scan::find_archives;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub archive: String,
    pub path: String,
    pub skipped: bool,
    pub archive_unreadable: bool,
    pub classes_found: usize,
    pub classes_stored: usize,
    pub classes_failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub roots: Vec<String>,
    pub scanned: usize,
    pub built: usize,
    pub skipped: usize,
    pub unreadable: usize,
    pub classes_stored: usize,
    pub failed_inserts: usize,
    pub duration_ms: u64,
}

impl IndexSummary {
    fn record(&mut self, report: &BuildReport) {
        self.scanned += 1;
        if report.skipped {
            self.skipped += 1;
            return;
        }
        self.built += 1;
        if report.archive_unreadable {
            self.unreadable += 1;
        }
        self.classes_stored += report.classes_stored;
        self.failed_inserts += report.classes_failed;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForgetReport {
    pub classes_removed: u64,
    pub registrations_removed: u64,
}

#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    classes: ClassIndex,
    archives: ArchiveIndex,
    skip_if_processed: bool,
}

impl CatalogBuilder {
    pub fn new(classes: ClassIndex, archives: ArchiveIndex, skip_if_processed: bool) -> Self {
        Self {
            classes,
            archives,
            skip_if_processed,
        }
    }

    pub fn open(registry: &StoreRegistry, skip_if_processed: bool) -> Result<Self> {
        Ok(Self::new(
            ClassIndex::open(registry)?,
            ArchiveIndex::open(registry)?,
            skip_if_processed,
        ))
    }

    pub fn classes(&self) -> &ClassIndex {
        &self.classes
    }

    pub fn archives(&self) -> &ArchiveIndex {
        &self.archives
    }

    /// Catalogs every class of the archive at `path`.
    ///
    /// Already registered archives are skipped when skip-if-processed is on.
    /// A class that fails to store is logged and counted; the archive is
    /// registered once the loop completes regardless.
    pub fn build(&self, path: &Path) -> Result<BuildReport> {
        let start = Instant::now();
        let name = archive_name(path);
        let mut report = BuildReport {
            archive: name.clone(),
            path: path.to_string_lossy().to_string(),
            ..BuildReport::default()
        };

        if self.skip_if_processed && self.archives.contains(&name)? {
            debug!("{name}: already cataloged, skipping");
            report.skipped = true;
            report.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let map = archive::parse(path);
        report.archive_unreadable = map.is_degraded();
        report.classes_found = map.len();

        for short_name in map.class_names() {
            let package = map.package_of(short_name).unwrap_or_default();
            let entry = ClassEntry::from_parts(package, short_name, name.as_str());
            match self.classes.add(&entry) {
                Ok(()) => {
                    debug!("{name}: indexed {}", entry.full_name().unwrap_or(short_name));
                    report.classes_stored += 1;
                }
                Err(e) => {
                    error!("{name}: failed to index {short_name}: {e}");
                    report.classes_failed += 1;
                }
            }
        }
        if report.classes_failed > 0 {
            warn!(
                "{name}: {} of {} classes failed to index; registering anyway, `forget {name}` to retry",
                report.classes_failed, report.classes_found
            );
        }

        self.archives.add(&name)?;
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "{name}: {} classes cataloged in {}ms",
            report.classes_stored, report.duration_ms
        );
        Ok(report)
    }

    /// Removes an archive's classes and its registration so it can be rebuilt.
    pub fn forget(&self, name: &str) -> Result<ForgetReport> {
        let classes_removed = self.classes.delete_by_term(ClassField::ArchiveName, name)?;
        let registrations_removed = self.archives.delete(name)?;
        info!("{name}: forgot {classes_removed} classes");
        Ok(ForgetReport {
            classes_removed,
            registrations_removed,
        })
    }

    /// Builds every archive under `roots` whose file name ends with one of
    /// `suffixes`, in parallel on the current rayon pool.
    pub fn index_tree(&self, roots: &[PathBuf], suffixes: &[String]) -> Result<IndexSummary> {
        let start = Instant::now();
        let mut archives = Vec::new();
        for root in roots {
            archives.extend(find_archives(root, suffixes)?);
        }
        archives.sort();
        archives.dedup();

        let reports: Vec<BuildReport> = archives
            .par_iter()
            .map(|path| self.build(path))
            .collect::<Result<_>>()?;

        let mut summary = IndexSummary {
            roots: roots
                .iter()
                .map(|r| r.to_string_lossy().to_string())
                .collect(),
            ..IndexSummary::default()
        };
        for report in &reports {
            summary.record(report);
        }
        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "indexed {} archives ({} skipped, {} unreadable) in {}ms",
            summary.built, summary.skipped, summary.unreadable, summary.duration_ms
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_skips_separately_from_builds() {
        let mut summary = IndexSummary::default();
        summary.record(&BuildReport {
            classes_found: 3,
            classes_stored: 2,
            classes_failed: 1,
            ..BuildReport::default()
        });
        summary.record(&BuildReport {
            skipped: true,
            ..BuildReport::default()
        });
        summary.record(&BuildReport {
            archive_unreadable: true,
            ..BuildReport::default()
        });
        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.built, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.unreadable, 1);
        assert_eq!(summary.classes_stored, 2);
        assert_eq!(summary.failed_inserts, 1);
    }

    #[test]
    fn forget_then_rebuild_restores_the_archive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let jar = dir.path().join("lib.jar");
        {
            let file = std::fs::File::create(&jar)?;
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("x/A.class", zip::write::FileOptions::default())?;
            zip.finish()?;
        }

        let registry = StoreRegistry::in_memory();
        let builder = CatalogBuilder::open(&registry, true)?;
        assert_eq!(builder.build(&jar)?.classes_stored, 1);
        assert!(builder.build(&jar)?.skipped);

        let forgotten = builder.forget("lib.jar")?;
        assert_eq!(forgotten.classes_removed, 1);
        assert_eq!(forgotten.registrations_removed, 1);

        let rebuilt = builder.build(&jar)?;
        assert!(!rebuilt.skipped);
        assert_eq!(builder.classes().search_by_term(ClassField::ClassName, "A")?.len(), 1);
        Ok(())
    }
}
