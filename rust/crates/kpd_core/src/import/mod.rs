//! Batch importer: delimited source → validated rows → chunked concurrent upserts.
//!
//! Parsing runs on a blocking thread and hands full chunks to the async side
//! over a bounded channel, so a large file never sits in memory at once. Each
//! chunk is upserted independently with at most `concurrency` in flight.
//!
//! A bad row never stops the import: it becomes a `(line, reason)` entry in
//! the report. A chunk the store refuses contributes one entry per row, in row
//! order. Only failures that make the source unreadable abort the run.

pub mod row;
pub mod source;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{KpdError, Result};
use crate::ports::ClassificationStore;
use crate::types::ConflictMode;

pub use row::{ImportRow, RowError, DATE_FORMAT, MIN_COLUMNS};
pub use source::{open_source, strip_bom, Compression};

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Rows per upsert chunk.
    pub batch_size: usize,
    /// Chunks upserted at the same time.
    pub concurrency: usize,
    pub conflict_mode: ConflictMode,
    /// Column delimiter byte.
    pub delimiter: u8,
    /// Rebuild the text index once after the last chunk.
    pub rebuild_index: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            conflict_mode: ConflictMode::default(),
            delimiter: b',',
            rebuild_index: false,
        }
    }
}

impl ImportOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(KpdError::InvalidInput("batch_size must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(KpdError::InvalidInput("concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

/// A rejected row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRejection {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Rows accepted by the store, inserted or updated.
    pub processed: u64,
    /// Rejections, in row order within each chunk; chunks in completion order.
    pub errors: Vec<RowRejection>,
    /// Rows indexed by the post-import rebuild, when one ran.
    pub indexed: Option<u64>,
}

impl ImportReport {
    pub fn rejected(&self) -> usize {
        self.errors.len()
    }
}

#[derive(Clone)]
pub struct BatchImporter {
    store: Arc<dyn ClassificationStore>,
}

impl BatchImporter {
    pub fn new(store: Arc<dyn ClassificationStore>) -> Self {
        Self { store }
    }

    /// Import a file, decompressing `.gz` / `.zst` sources.
    pub async fn load_from_file(
        &self,
        path: impl AsRef<Path>,
        options: &ImportOptions,
    ) -> Result<ImportReport> {
        let path: PathBuf = path.as_ref().to_path_buf();
        info!(
            path = %path.display(),
            batch_size = options.batch_size,
            concurrency = options.concurrency,
            conflict_mode = %options.conflict_mode,
            "Starting classification import"
        );
        self.run(move || source::open_source(&path), options).await
    }

    /// Import from an already-open, uncompressed reader.
    pub async fn load_from_reader<R>(&self, reader: R, options: &ImportOptions) -> Result<ImportReport>
    where
        R: Read + Send + 'static,
    {
        self.run(move || source::strip_bom(reader), options).await
    }

    async fn run<F>(&self, open: F, options: &ImportOptions) -> Result<ImportReport>
    where
        F: FnOnce() -> std::io::Result<Box<dyn Read + Send>> + Send + 'static,
    {
        options.validate()?;
        let start = Instant::now();

        let (tx, rx) = mpsc::channel::<Vec<ImportRow>>(options.concurrency * 2);
        let parse_options = options.clone();
        let producer = tokio::task::spawn_blocking(move || {
            let reader = open()?;
            read_rows(reader, &parse_options, tx)
        });

        let mode = options.conflict_mode;
        let outcomes: Vec<ChunkOutcome> =
            stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) })
                .map(|chunk| self.upsert_chunk(chunk, mode))
                .buffer_unordered(options.concurrency)
                .collect()
                .await;

        let parse_rejections = producer
            .await
            .map_err(|e| KpdError::Internal(anyhow!("import reader task failed: {e}")))??;

        let mut report = ImportReport {
            errors: parse_rejections,
            ..Default::default()
        };
        for outcome in outcomes {
            report.processed += outcome.processed;
            report.errors.extend(outcome.errors);
        }

        if options.rebuild_index {
            report.indexed = Some(self.store.rebuild_index().await?);
        }

        info!(
            processed = report.processed,
            rejected = report.rejected(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Classification import complete"
        );

        Ok(report)
    }

    async fn upsert_chunk(&self, chunk: Vec<ImportRow>, mode: ConflictMode) -> ChunkOutcome {
        let entries: Vec<_> = chunk.iter().map(|row| row.entry.clone()).collect();

        match self.store.upsert_batch(&entries, mode).await {
            Ok(_) => ChunkOutcome {
                processed: chunk.len() as u64,
                errors: Vec::new(),
            },
            Err(e) => {
                let first_line = chunk.first().map(|r| r.line).unwrap_or_default();
                warn!(error = %e, rows = chunk.len(), first_line, "Chunk upsert failed");
                let reason = format!("Batch upsert failed: {e}");
                ChunkOutcome {
                    processed: 0,
                    errors: chunk
                        .iter()
                        .map(|row| RowRejection {
                            line: row.line,
                            reason: reason.clone(),
                        })
                        .collect(),
                }
            }
        }
    }
}

struct ChunkOutcome {
    processed: u64,
    errors: Vec<RowRejection>,
}

/// Parse every record, sending full chunks down `tx`. Returns the rejections.
fn read_rows(
    reader: Box<dyn Read + Send>,
    options: &ImportOptions,
    tx: mpsc::Sender<Vec<ImportRow>>,
) -> Result<Vec<RowRejection>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let now = Utc::now();
    let mut rejected = Vec::new();
    let mut chunk = Vec::with_capacity(options.batch_size);

    for (index, result) in csv_reader.records().enumerate() {
        // header is line 1
        let fallback_line = index as u64 + 2;

        let outcome = match result {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);
                let fields: Vec<&str> = record.iter().collect();
                row::parse_fields(&fields, now)
                    .map(|entry| ImportRow { line, entry })
                    .map_err(|e| (line, e))
            }
            Err(e) if e.is_io_error() => return Err(KpdError::Io(e.into())),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
                Err((line, RowError::Malformed(e.to_string())))
            }
        };

        match outcome {
            Ok(row) => {
                chunk.push(row);
                if chunk.len() >= options.batch_size {
                    let full = std::mem::replace(&mut chunk, Vec::with_capacity(options.batch_size));
                    if tx.blocking_send(full).is_err() {
                        return Err(KpdError::Internal(anyhow!("import consumer stopped early")));
                    }
                }
            }
            Err((line, reason)) => {
                debug!(line, %reason, "Row rejected");
                rejected.push(RowRejection {
                    line,
                    reason: reason.to_string(),
                });
            }
        }
    }

    if !chunk.is_empty() && tx.blocking_send(chunk).is_err() {
        return Err(KpdError::Internal(anyhow!("import consumer stopped early")));
    }

    Ok(rejected)
}
