use anyhow::{Context, Result};
use clap::Parser;
use jar_catalog::builder::CatalogBuilder;
use jar_catalog::catalog::{ArchiveIndex, ClassIndex};
use jar_catalog::cli::{Cli, Commands, OutputFormat};
use jar_catalog::config::{self, ReloadingSettings, Settings};
use jar_catalog::entry::ClassEntry;
use jar_catalog::incremental::IncrementalIndexer;
use jar_catalog::registry::StoreRegistry;
use serde::Serialize;
use std::path::PathBuf;

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_timestamp(None)
        .init();

    match cli.command.clone() {
        Commands::Clear => {
            let settings = config::resolve(&cli)?;
            config::clear_index(&settings.index_location).with_context(|| {
                format!(
                    "Failed to clear index: {}",
                    settings.index_location.display()
                )
            })?;
            print_json(&Cleared {
                index: settings.index_location,
            })?;
        }
        Commands::Stats => {
            let (settings, registry) = open(&cli)?;
            let stats = Stats {
                index: settings.index_location,
                classes: ClassIndex::open(&registry)?.count()?,
                archives: ArchiveIndex::open(&registry)?.count()?,
            };
            print_json(&stats)?;
        }
        Commands::Build { jar_path } => {
            let (settings, registry) = open(&cli)?;
            let builder = CatalogBuilder::open(&registry, settings.skip_if_processed)?;
            let report = builder
                .build(&jar_path)
                .with_context(|| format!("Failed to catalog {}", jar_path.display()))?;
            print_json(&report)?;
        }
        Commands::Index { dirs, jobs } => {
            let (settings, registry) = open(&cli)?;
            let builder = CatalogBuilder::open(&registry, settings.skip_if_processed)?;
            let mut pool = rayon::ThreadPoolBuilder::new();
            if let Some(n) = jobs {
                pool = pool.num_threads(n);
            }
            let pool = pool.build().context("Failed to start worker threads")?;
            let summary = pool.install(|| builder.index_tree(&dirs, &settings.file_type))?;
            print_json(&summary)?;
        }
        Commands::Find {
            expr,
            field,
            format,
        } => {
            let (_, registry) = open(&cli)?;
            let classes = ClassIndex::open(&registry)?
                .search_by_term(field, &expr)
                .with_context(|| format!("Query failed: {expr}"))?;
            write_classes(&classes, format)?;
        }
        Commands::Query {
            class,
            package,
            archive,
            format,
        } => {
            if class.is_none() && package.is_none() && archive.is_none() {
                anyhow::bail!("query needs at least one of --class, --package, --archive");
            }
            let (_, registry) = open(&cli)?;
            let mut sample = ClassEntry::sample();
            sample.short_name = class;
            sample.package_name = package;
            sample.archive_name = archive.unwrap_or_default();
            let classes = ClassIndex::open(&registry)?.search_by_example(&sample)?;
            write_classes(&classes, format)?;
        }
        Commands::Archives { expr, format } => {
            let (_, registry) = open(&cli)?;
            let expr = expr.unwrap_or_else(|| "*".to_string());
            let names = ArchiveIndex::open(&registry)?
                .search(&expr)
                .with_context(|| format!("Query failed: {expr}"))?;
            match format {
                OutputFormat::Json => print_json(&names)?,
                OutputFormat::Text => {
                    for name in names {
                        println!("{name}");
                    }
                }
            }
        }
        Commands::Forget { name } => {
            let (settings, registry) = open(&cli)?;
            let builder = CatalogBuilder::open(&registry, settings.skip_if_processed)?;
            print_json(&builder.forget(&name)?)?;
        }
        Commands::Watch { dirs, passes } => {
            let mut settings = ReloadingSettings::from_cli(&cli)?;
            let registry = open_registry(settings.current())?;
            let mut indexer = IncrementalIndexer::new(dirs);
            indexer.watch(&registry, &mut settings, passes, |pass| {
                if let Ok(line) = serde_json::to_string(pass) {
                    println!("{line}");
                }
            })?;
        }
    }

    Ok(())
}

fn open(cli: &Cli) -> Result<(Settings, StoreRegistry)> {
    let settings = config::resolve(cli)?;
    let registry = open_registry(&settings)?;
    Ok((settings, registry))
}

fn open_registry(settings: &Settings) -> Result<StoreRegistry> {
    StoreRegistry::open(&settings.index_location).with_context(|| {
        format!(
            "Failed to open index: {}",
            settings.index_location.display()
        )
    })
}

#[derive(Debug, Serialize)]
struct Cleared {
    index: PathBuf,
}

#[derive(Debug, Serialize)]
struct Stats {
    index: PathBuf,
    classes: Option<u64>,
    archives: Option<u64>,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_classes(classes: &[ClassEntry], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(classes)?,
        OutputFormat::Text => {
            for class in classes {
                println!(
                    "{}\t{}",
                    class.full_name().unwrap_or_default(),
                    class.archive_name
                );
            }
        }
    }
    Ok(())
}
