//! Query Facade over an [`EntryStore`].

use log::debug;

use crate::document::{Record, from_engine_document};
use crate::engine::{EngineReader, FieldKind, Hit};
use crate::error::{EngineError, Result};
use crate::query::{Query, build_query};
use crate::store::EntryStore;

#[derive(Debug, Clone, Copy)]
pub struct Searcher<'a> {
    store: &'a EntryStore,
}

impl<'a> Searcher<'a> {
    pub fn new(store: &'a EntryStore) -> Self {
        Self { store }
    }

    /// Records matching every searchable field of `sample`.
    ///
    /// Fields not flagged searchable are ignored. A sample without searchable
    /// fields matches nothing.
    pub fn search_by_example(&self, sample: &Record) -> Result<Vec<Record>> {
        self.store.with_reader("search-by-example", |reader| {
            let mut clauses = Vec::new();
            for field in sample.iter().filter(|f| f.searchable) {
                let kind = reader.field_kind(field.name())?.unwrap_or(field.kind());
                match Query::analyzed(field.name(), field.value(), kind) {
                    Query::Nothing => {}
                    clause => clauses.push(clause),
                }
            }
            let query = Query::all_of(clauses);
            debug!("store '{}': by-example {query:?}", self.store.name());
            execute(reader, &query)
        })
    }

    /// Records matching `expr` parsed with `field` as the default field.
    ///
    /// Terms keep their case; `Foo` never matches `foo`.
    pub fn search_by_term(&self, field: &str, expr: &str) -> Result<Vec<Record>> {
        self.store.with_reader("search-by-term", |reader| {
            let query = build_query(field, expr, |name| {
                Ok(reader.field_kind(name)?.unwrap_or(FieldKind::Atomic))
            })?;
            debug!("store '{}': {expr:?} -> {query:?}", self.store.name());
            execute(reader, &query)
        })
    }
}

fn execute(reader: &dyn EngineReader, query: &Query) -> Result<Vec<Record>, EngineError> {
    let hits = reader.search(query)?;
    Ok(hits.into_iter().map(to_record).collect())
}

fn to_record(hit: Hit) -> Record {
    let mut record = from_engine_document(&hit.document);
    record.set_internal_id(hit.ordinal);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Field;
    use crate::engine::memory::MemoryEngine;
    use std::sync::Arc;

    fn seeded() -> anyhow::Result<EntryStore> {
        let store = EntryStore::new(Arc::new(MemoryEngine::new("books")));
        for (title, author, tags) in [
            ("Dune", "Herbert", "sci-fi classic"),
            ("Emma", "Austen", "romance classic"),
            ("Dune", "Lynch", "film"),
        ] {
            store.store(
                &Record::new()
                    .with(Field::with_flags("title", title, true, false, true))
                    .with(Field::with_flags("author", author, true, false, false))
                    .with(Field::with_flags("tags", tags, true, true, false)),
            )?;
        }
        Ok(store)
    }

    fn sample(fields: &[(&str, &str, bool)]) -> Record {
        let mut record = Record::new();
        for (name, value, searchable) in fields {
            record.push(Field::new(*name, *value).searchable(*searchable));
        }
        record
    }

    #[test]
    fn by_example_ands_searchable_fields_only() -> anyhow::Result<()> {
        let store = seeded()?;
        let searcher = Searcher::new(&store);

        let hits = searcher.search_by_example(&sample(&[
            ("title", "Dune", true),
            ("author", "Lynch", true),
        ]))?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value("author"), Some("Lynch"));
        assert_eq!(hits[0].internal_id(), Some(2));

        let hits = searcher.search_by_example(&sample(&[
            ("title", "Dune", true),
            ("author", "Nobody", false),
        ]))?;
        assert_eq!(hits.len(), 2);
        Ok(())
    }

    #[test]
    fn by_example_without_searchable_fields_matches_nothing() -> anyhow::Result<()> {
        let store = seeded()?;
        let searcher = Searcher::new(&store);
        assert!(searcher.search_by_example(&Record::new())?.is_empty());
        assert!(
            searcher
                .search_by_example(&sample(&[("title", "Dune", false)]))?
                .is_empty()
        );
        Ok(())
    }

    #[test]
    fn by_example_analyzes_tokenized_fields() -> anyhow::Result<()> {
        let store = seeded()?;
        let hits = Searcher::new(&store).search_by_example(&sample(&[("tags", "classic", true)]))?;
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|r| r.get("tags").is_some_and(|f| f.tokenizable)));
        Ok(())
    }

    #[test]
    fn by_term_is_case_sensitive_and_supports_syntax() -> anyhow::Result<()> {
        let store = seeded()?;
        let searcher = Searcher::new(&store);
        assert_eq!(searcher.search_by_term("title", "Dune")?.len(), 2);
        assert!(searcher.search_by_term("title", "dune")?.is_empty());
        assert_eq!(searcher.search_by_term("title", "Dune -author:Lynch")?.len(), 1);
        assert_eq!(searcher.search_by_term("title", "Em*")?.len(), 1);
        assert_eq!(searcher.search_by_term("tags", "\"sci-fi\"")?.len(), 1);
        Ok(())
    }

    #[test]
    fn malformed_expressions_are_index_failures() -> anyhow::Result<()> {
        let store = seeded()?;
        let err = Searcher::new(&store)
            .search_by_term("title", "\"open")
            .unwrap_err();
        assert!(err.is_index_failure());
        Ok(())
    }
}
