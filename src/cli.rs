use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::entry::ClassField;

#[derive(Debug, Clone, Parser)]
#[command(name = "jar-catalog")]
#[command(about = "Catalog the classes inside jar archives and search them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (default: <data dir>/jar-catalog/catalog.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Index location, overriding `index-location` from the settings file
    #[arg(long, global = true, value_name = "PATH")]
    pub index: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Catalog every matching archive under the given directories
    Index {
        #[arg(value_name = "DIR", required = true)]
        dirs: Vec<PathBuf>,

        /// Worker threads (default: one per core)
        #[arg(short = 'j', long, value_name = "N")]
        jobs: Option<usize>,
    },
    /// Catalog one archive
    Build {
        #[arg(value_name = "JAR")]
        jar_path: PathBuf,
    },
    /// Search classes with a query expression
    Find {
        expr: String,

        #[arg(long, value_enum, default_value_t = ClassField::ClassName)]
        field: ClassField,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Search classes by exact class, package and archive names
    Query {
        #[arg(long, value_name = "NAME")]
        class: Option<String>,

        #[arg(long, value_name = "PKG")]
        package: Option<String>,

        #[arg(long, value_name = "JAR")]
        archive: Option<String>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// List cataloged archives
    Archives {
        #[arg(value_name = "EXPR")]
        expr: Option<String>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Remove an archive's classes and registration
    Forget {
        #[arg(value_name = "JAR-NAME")]
        name: String,
    },
    /// Document counts of both stores
    Stats,
    /// Re-scan a directory every refresh interval
    Watch {
        #[arg(value_name = "DIR", required = true)]
        dirs: Vec<PathBuf>,

        /// Stop after this many passes
        #[arg(long, value_name = "N")]
        passes: Option<usize>,
    },
    /// Delete the index
    Clear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
