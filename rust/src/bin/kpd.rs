//! KPD Command Line Interface
//!
//! Import, inspect and search the classification stored in PostgreSQL.
//!
//! # Usage
//!
//! ```bash
//! # Load a release (plain, .gz or .zst) and rebuild the search mirror
//! kpd import data/kpd_2025.csv.gz --rebuild-index
//!
//! # Look up by full or official code
//! kpd lookup A01.11
//!
//! # Children of a path, search in Croatian
//! kpd children A.01
//! kpd search "žitarice" --lang hr
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kpd::config::delimiter_byte;
use kpd::{
    ClassificationEntry, ClassificationService, ConflictMode, DatabaseManager, ExpiryFilter,
    KpdConfig, SearchLanguage, SearchRequest,
};

#[derive(Parser)]
#[command(name = "kpd")]
#[command(version = "0.1.0")]
#[command(about = "KPD classification: import, navigate and search")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: json or text (default)
    #[arg(long, short = 'o', global = true, default_value = "text", value_enum)]
    format: OutputFormat,

    /// Include entries whose end date has passed
    #[arg(long, global = true)]
    include_expired: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a classification file
    Import {
        /// Source file; falls back to `data_file` from config
        file: Option<PathBuf>,

        /// Rows per upsert chunk
        #[arg(long)]
        batch_size: Option<usize>,

        /// Chunks upserted concurrently
        #[arg(long)]
        concurrency: Option<usize>,

        /// update or skip
        #[arg(long)]
        conflict_mode: Option<ConflictMode>,

        /// Column delimiter
        #[arg(long)]
        delimiter: Option<char>,

        /// Rebuild the search index after the import
        #[arg(long)]
        rebuild_index: bool,
    },

    /// Drop and repopulate the search index
    RebuildIndex,

    /// Look up one entry by full or official code
    Lookup { code: String },

    /// Direct children of a path
    Children { path: String },

    /// Ancestors of a path followed by the entry itself
    Ancestry { path: String },

    /// Substring search over code and names
    Search {
        query: String,

        /// hr, en or both
        #[arg(long, default_value = "both")]
        lang: SearchLanguage,

        #[arg(long)]
        level: Option<u8>,

        #[arg(long, default_value_t = kpd_core::search::DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Count entries, optionally at one level
    Count {
        #[arg(long)]
        level: Option<u8>,
    },

    /// Apply database migrations
    Migrate,
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kpd=info,kpd_core=info,kpd_postgres=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = KpdConfig::load()?;
    let db = DatabaseManager::new(config.database_config())
        .await
        .context("Failed to connect to database")?;

    let service = ClassificationService::new(Arc::new(db.classification_store()));
    let expiry = ExpiryFilter::from_flag(!cli.include_expired);
    let format = cli.format;

    match cli.command {
        Commands::Import {
            file,
            batch_size,
            concurrency,
            conflict_mode,
            delimiter,
            rebuild_index,
        } => {
            let file = file
                .or_else(|| config.data_file.clone())
                .context("No input file given and no data_file configured")?;

            let mut options = config.import_options()?;
            if let Some(n) = batch_size {
                options.batch_size = n;
            }
            if let Some(n) = concurrency {
                options.concurrency = n;
            }
            if let Some(mode) = conflict_mode {
                options.conflict_mode = mode;
            }
            if let Some(c) = delimiter {
                options.delimiter = delimiter_byte(c)?;
            }
            options.rebuild_index |= rebuild_index;

            let report = service.load_from_file(&file, &options).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    println!("processed: {}", report.processed);
                    println!("rejected:  {}", report.rejected());
                    if let Some(indexed) = report.indexed {
                        println!("indexed:   {indexed}");
                    }
                    for rejection in &report.errors {
                        println!("  line {}: {}", rejection.line, rejection.reason);
                    }
                }
            }
        }
        Commands::RebuildIndex => {
            let indexed = service.rebuild_index().await?;
            println!("indexed {indexed} entries");
        }
        Commands::Lookup { code } => {
            let entry = service.require_by_code(&code).await?;
            print_entries(format, std::slice::from_ref(&entry))?;
        }
        Commands::Children { path } => {
            let children = service.get_children(&path, expiry).await?;
            print_entries(format, &children)?;
        }
        Commands::Ancestry { path } => {
            let chain = service.get_full_path(&path, expiry).await?;
            print_entries(format, &chain)?;
        }
        Commands::Search {
            query,
            lang,
            level,
            limit,
        } => {
            let mut request = SearchRequest::new(query)
                .language(lang)
                .limit(limit)
                .expiry(expiry);
            if let Some(level) = level {
                request = request.level(level);
            }
            let hits = service.search(&request).await?;
            print_entries(format, &hits)?;
        }
        Commands::Count { level } => {
            let count = service.count(level, expiry).await?;
            println!("{count}");
        }
        Commands::Migrate => {
            db.run_migrations().await?;
            println!("migrations applied");
        }
    }

    db.close().await;
    Ok(())
}

fn print_entries(format: OutputFormat, entries: &[ClassificationEntry]) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(entries)?),
        OutputFormat::Text => {
            for e in entries {
                let indent = "  ".repeat(e.level.saturating_sub(1) as usize);
                println!("{indent}{:<12} {:<16} {}", e.full_code, e.path, e.name_hr);
            }
        }
    }
    Ok(())
}
