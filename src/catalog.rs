//! Typed services over the class store and the dedup registry.

use std::sync::Arc;

use crate::document::{Indexable, from_record, to_record};
use crate::entry::{ArchiveEntry, ClassEntry, ClassField};
use crate::error::Result;
use crate::query::escape;
use crate::registry::{ARCHIVE_STORE, CLASS_STORE, StoreRegistry};
use crate::search::Searcher;
use crate::store::EntryStore;

#[derive(Debug, Clone)]
pub struct ClassIndex {
    store: Arc<EntryStore>,
}

impl ClassIndex {
    pub fn new(store: Arc<EntryStore>) -> Self {
        Self { store }
    }

    pub fn open(registry: &StoreRegistry) -> Result<Self> {
        Ok(Self::new(registry.store(CLASS_STORE)?))
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn add(&self, entry: &ClassEntry) -> Result<()> {
        let mut entry = entry.clone();
        entry.normalize();
        self.store.store(&to_record(&entry))
    }

    pub fn count(&self) -> Result<Option<u64>> {
        self.store.count()
    }

    /// Entries matching every name/package/archive set on `sample`.
    pub fn search_by_example(&self, sample: &ClassEntry) -> Result<Vec<ClassEntry>> {
        let records = Searcher::new(&self.store).search_by_example(&to_record(sample))?;
        Ok(records.iter().map(from_record::<ClassEntry>).collect())
    }

    pub fn search_by_term(&self, field: ClassField, expr: &str) -> Result<Vec<ClassEntry>> {
        let records = Searcher::new(&self.store).search_by_term(field.as_str(), expr)?;
        Ok(records.iter().map(from_record::<ClassEntry>).collect())
    }

    pub fn delete_by_term(&self, field: ClassField, value: &str) -> Result<u64> {
        self.store.delete_by_field(field.as_str(), value)
    }
}

/// The dedup registry: names of archives already cataloged.
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    store: Arc<EntryStore>,
}

impl ArchiveIndex {
    pub fn new(store: Arc<EntryStore>) -> Self {
        Self { store }
    }

    pub fn open(registry: &StoreRegistry) -> Result<Self> {
        Ok(Self::new(registry.store(ARCHIVE_STORE)?))
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn add(&self, name: &str) -> Result<()> {
        self.store.store(&to_record(&ArchiveEntry::new(name)))
    }

    pub fn count(&self) -> Result<Option<u64>> {
        self.store.count()
    }

    /// Names of registered archives matching `expr`, in registration order.
    pub fn search(&self, expr: &str) -> Result<Vec<String>> {
        let records = Searcher::new(&self.store).search_by_term(field(), expr)?;
        Ok(records
            .iter()
            .map(|r| from_record::<ArchiveEntry>(r).name)
            .collect())
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Ok(false);
        }
        let expr = format!("{}:{}", field(), escape(name));
        Ok(!self.search(&expr)?.is_empty())
    }

    pub fn delete(&self, name: &str) -> Result<u64> {
        self.store.delete_by_field(field(), name)
    }
}

fn field() -> &'static str {
    ArchiveEntry::default_field_name().unwrap_or("jn")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> anyhow::Result<(ClassIndex, ArchiveIndex)> {
        let registry = StoreRegistry::in_memory();
        let classes = ClassIndex::open(&registry)?;
        let archives = ArchiveIndex::open(&registry)?;
        for (full, jar) in [
            ("com.acme.Foo", "sample.jar"),
            ("com.acme.Bar", "sample.jar"),
            ("org.other.Foo", "other-1.0.jar"),
        ] {
            classes.add(&ClassEntry::from_full_name(full, jar))?;
        }
        archives.add("sample.jar")?;
        archives.add("other-1.0.jar")?;
        Ok((classes, archives))
    }

    #[test]
    fn class_search_by_term_defaults_to_the_named_field() -> anyhow::Result<()> {
        let (classes, _) = seeded()?;
        let hits = classes.search_by_term(ClassField::ClassName, "Foo")?;
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|c| c.short_name.as_deref() == Some("Foo")));
        assert_eq!(hits[0].full_name(), Some("com.acme.Foo"));
        assert_eq!(hits[0].internal_id, Some(0));

        let hits = classes.search_by_term(ClassField::PackageName, "com.acme")?;
        assert_eq!(hits.len(), 2);
        let hits = classes.search_by_term(ClassField::ClassName, "Foo AND jn:sample.jar")?;
        assert_eq!(hits.len(), 1);
        Ok(())
    }

    #[test]
    fn class_search_by_example_uses_only_set_fields() -> anyhow::Result<()> {
        let (classes, _) = seeded()?;
        let mut sample = ClassEntry::sample();
        sample.short_name = Some("Foo".into());
        assert_eq!(classes.search_by_example(&sample)?.len(), 2);

        sample.archive_name = "other-1.0.jar".into();
        let hits = classes.search_by_example(&sample)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].package_name.as_deref(), Some("org.other"));
        Ok(())
    }

    #[test]
    fn delete_by_term_removes_an_archives_classes() -> anyhow::Result<()> {
        let (classes, _) = seeded()?;
        assert_eq!(classes.delete_by_term(ClassField::ArchiveName, "sample.jar")?, 2);
        assert_eq!(classes.count()?, Some(1));
        Ok(())
    }

    #[test]
    fn archive_registry_lookups() -> anyhow::Result<()> {
        let (_, archives) = seeded()?;
        assert!(archives.contains("sample.jar")?);
        assert!(archives.contains("other-1.0.jar")?);
        assert!(!archives.contains("sample")?);
        assert!(!archives.contains("")?);
        assert_eq!(archives.search("*")?, vec!["sample.jar", "other-1.0.jar"]);
        assert_eq!(archives.search("other*")?, vec!["other-1.0.jar"]);

        assert_eq!(archives.delete("sample.jar")?, 1);
        assert!(!archives.contains("sample.jar")?);
        Ok(())
    }
}
