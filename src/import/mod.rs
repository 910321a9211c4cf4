//! CSV import into the `fire_calls` table.
//!
//! Two interchangeable strategies load the same input:
//!
//! 1. **Sequential** (`sequential`) - one path of control, batches written in
//!    input order, at most one batch in flight.
//! 2. **Concurrent** (`pipeline`) - a reader task, N parser tasks and M writer
//!    tasks joined by bounded queues. Faster, but row order is not kept.
//!
//! Both report partial progress on failure through
//! [`ImportAborted`](crate::error::ImportAborted): rows written before the
//! error are already in the table.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use fire_calls_importer::import::{CsvImporter, ImportStrategy};
//! use fire_calls_importer::store::PgBatchStore;
//!
//! let importer = CsvImporter::new(PgBatchStore::new(pool), 1000);
//! let summary = importer
//!     .import_file("data/sf-fire-calls.csv", ImportStrategy::concurrent(4))
//!     .await?;
//!
//! println!("Imported {} rows", summary.rows_written);
//! ```

pub mod pipeline;
pub mod sequential;
pub mod source;

pub use pipeline::PipelineOptions;
pub use source::{CsvSource, RecordSource};

use crate::error::{ImportAborted, ImportError};
use crate::store::BatchStore;
use crate::writer::{BatchWriter, MAX_BATCH_SIZE};
use serde::Serialize;
use std::path::Path;

/// Default number of rows per INSERT.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Counters for one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Rows persisted by successful batches
    pub rows_written: usize,
    /// Data records read from the source (header excluded)
    pub records_read: usize,
    /// Records dropped for having the wrong number of fields
    pub records_skipped: usize,
    /// Batches the store accepted
    pub batches_written: usize,
}

/// How to run an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    Sequential,
    Concurrent(PipelineOptions),
}

impl ImportStrategy {
    /// Concurrent pipeline with `parser_workers` parsers and the default
    /// writer count.
    pub fn concurrent(parser_workers: usize) -> Self {
        ImportStrategy::Concurrent(PipelineOptions {
            parser_workers,
            ..PipelineOptions::default()
        })
    }
}

/// Loads CSV records into the store in fixed-size batches.
pub struct CsvImporter<S> {
    writer: BatchWriter<S>,
    batch_size: usize,
}

impl<S: BatchStore> CsvImporter<S> {
    /// Create an importer writing `batch_size` rows per statement.
    ///
    /// The batch size is clamped to `1..=MAX_BATCH_SIZE`, the most rows one
    /// statement can bind.
    pub fn new(store: S, batch_size: usize) -> Self {
        Self {
            writer: BatchWriter::new(store),
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Import every record in input order, one batch at a time.
    pub async fn import_sequential<R: RecordSource>(
        &self,
        source: R,
    ) -> Result<ImportSummary, ImportAborted> {
        sequential::run(&self.writer, self.batch_size, source).await
    }

    /// Import through the reader/parser/writer pipeline.
    pub async fn import_concurrent<R: RecordSource>(
        &self,
        source: R,
        options: PipelineOptions,
    ) -> Result<ImportSummary, ImportAborted> {
        pipeline::run(self.writer.clone(), self.batch_size, source, options).await
    }

    pub async fn import<R: RecordSource>(
        &self,
        source: R,
        strategy: ImportStrategy,
    ) -> Result<ImportSummary, ImportAborted> {
        match strategy {
            ImportStrategy::Sequential => self.import_sequential(source).await,
            ImportStrategy::Concurrent(options) => self.import_concurrent(source, options).await,
        }
    }

    /// Open `path` as CSV and import it.
    pub async fn import_file(
        &self,
        path: impl AsRef<Path>,
        strategy: ImportStrategy,
    ) -> Result<ImportSummary, ImportAborted> {
        let source = CsvSource::open(path).map_err(|err| ImportAborted::new(0, err))?;
        self.import(source, strategy).await
    }
}

pub(crate) fn log_skipped(err: &ImportError) {
    log::warn!("skipping invalid row: {}", err);
}
