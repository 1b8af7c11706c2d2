//! # jar-catalog
//!
//! A searchable catalog of the classes inside jar archives.
//!
//! ## Architecture
//!
//! - **document**: Engine-agnostic fields and records, declarative entity mapping
//! - **engine**: Index engine interface with LMDB and in-memory implementations
//! - **query**: Term/prefix/boolean queries and the query expression parser
//! - **store**: Entry Store with reader/writer lifecycle exclusivity
//! - **search**: Query Facade (by example, by term expression)
//! - **registry**: Named stores of one index location
//! - **archive**: Jar introspection into class name -> package maps
//! - **entry**: Class and archive entities with their field tables
//! - **catalog**: Class store and dedup registry services
//! - **builder**: Archive cataloging with skip-if-processed dedup
//! - **scan**: Archive discovery under directory trees
//! - **incremental**: Periodic re-scans based on file modification times
//! - **config**: Settings file, overrides and reloading
//! - **cli**: Command-line definitions

pub mod archive;
pub mod builder;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod document;
pub mod engine;
pub mod entry;
pub mod error;
pub mod incremental;
pub mod query;
pub mod registry;
pub mod scan;
pub mod search;
pub mod store;
