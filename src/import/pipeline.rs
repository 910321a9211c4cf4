//! Concurrent reader/parser/writer import pipeline.
//!
//! The pipeline is split into three stages connected by bounded channels:
//!
//! ```text
//! ┌──────────┐  records  ┌──────────┐  batches  ┌──────────┐
//! │  Reader  │──────────▶│ Parser×N │──────────▶│ Writer×M │──▶ store
//! └──────────┘           └──────────┘           └──────────┘
//! ```
//!
//! - The reader owns the source and runs on the blocking pool.
//! - Each parser decodes records into a private batch and hands full batches
//!   on. At end of input it flushes its partial batch.
//! - Writers insert batches and add the row count to a shared total.
//!
//! The batch channel closes only when every parser has dropped its sender,
//! so writers never see end-of-stream while a parser is still flushing.
//!
//! The first stage error wins. It cancels a shared token, every stage stops
//! at its next suspension point, and all tasks are joined before the result
//! is returned. A write already in flight is allowed to finish.

use crate::codec::{DecodedRow, RawRecord, decode_record};
use crate::error::{ImportAborted, ImportError};
use crate::import::{ImportSummary, RecordSource, log_skipped};
use crate::store::BatchStore;
use crate::writer::BatchWriter;
use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Writer count used when none is given; bounds concurrent store connections.
pub const DEFAULT_WRITER_WORKERS: usize = 2;

/// Parser count used when none is given.
pub const DEFAULT_PARSER_WORKERS: usize = 4;

/// Worker counts for the concurrent pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Number of parser tasks (at least 1)
    pub parser_workers: usize,
    /// Number of writer tasks (at least 1)
    pub writer_workers: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            parser_workers: DEFAULT_PARSER_WORKERS,
            writer_workers: DEFAULT_WRITER_WORKERS,
        }
    }
}

#[derive(Default)]
struct StageCounters {
    records_read: AtomicUsize,
    records_skipped: AtomicUsize,
    batches_written: AtomicUsize,
}

pub(crate) async fn run<S: BatchStore, R: RecordSource>(
    writer: BatchWriter<S>,
    batch_size: usize,
    source: R,
    options: PipelineOptions,
) -> Result<ImportSummary, ImportAborted> {
    let parser_workers = options.parser_workers.max(1);
    let writer_workers = options.writer_workers.max(1);

    log::info!(
        "concurrent import: {} parsers, {} writers, batch size {}",
        parser_workers,
        writer_workers,
        batch_size
    );

    let (record_tx, record_rx) = async_channel::bounded::<RawRecord>(batch_size * 2);
    let (batch_tx, batch_rx) = async_channel::bounded::<Vec<DecodedRow>>(parser_workers);

    let cancel = CancellationToken::new();
    let counters = Arc::new(StageCounters::default());
    let rows_written = Arc::new(Mutex::new(0usize));
    let mut tasks: JoinSet<Result<(), ImportError>> = JoinSet::new();

    // Stage 1: reader
    {
        let cancel = cancel.clone();
        let counters = counters.clone();
        tasks.spawn_blocking(move || read_stage(source, record_tx, cancel, counters));
    }

    // Stage 2: parsers
    for worker_id in 0..parser_workers {
        let record_rx = record_rx.clone();
        let batch_tx = batch_tx.clone();
        let cancel = cancel.clone();
        let counters = counters.clone();
        tasks.spawn(async move {
            parse_stage(worker_id, record_rx, batch_tx, batch_size, cancel, counters).await
        });
    }

    // Stage 3: writers
    for worker_id in 0..writer_workers {
        let writer = writer.clone();
        let batch_rx = batch_rx.clone();
        let cancel = cancel.clone();
        let counters = counters.clone();
        let rows_written = rows_written.clone();
        tasks.spawn(async move {
            write_stage(worker_id, writer, batch_rx, cancel, counters, rows_written).await
        });
    }

    // Only workers may hold channel ends, otherwise the channels never close.
    drop(record_rx);
    drop(batch_tx);
    drop(batch_rx);

    let mut first_error: Option<ImportError> = None;
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.unwrap_or_else(|err| Err(ImportError::Worker(err.to_string())));
        if let Err(err) = outcome {
            cancel.cancel();
            if first_error.is_none() {
                log::error!("concurrent import: stopping pipeline: {}", err);
                first_error = Some(err);
            } else {
                log::debug!("concurrent import: additional failure ignored: {}", err);
            }
        }
    }

    let rows = *rows_written.lock();
    if let Some(err) = first_error {
        return Err(ImportAborted::new(rows, err));
    }

    let summary = ImportSummary {
        rows_written: rows,
        records_read: counters.records_read.load(Ordering::Relaxed),
        records_skipped: counters.records_skipped.load(Ordering::Relaxed),
        batches_written: counters.batches_written.load(Ordering::Relaxed),
    };

    log::info!(
        "concurrent import complete: {} rows in {} batches ({} skipped)",
        summary.rows_written,
        summary.batches_written,
        summary.records_skipped
    );
    Ok(summary)
}

fn read_stage<R: RecordSource>(
    mut source: R,
    record_tx: Sender<RawRecord>,
    cancel: CancellationToken,
    counters: Arc<StageCounters>,
) -> Result<(), ImportError> {
    if let Err(err) = source.read_header() {
        cancel.cancel();
        return Err(err);
    }

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        match source.next_record() {
            Ok(Some(record)) => {
                counters.records_read.fetch_add(1, Ordering::Relaxed);
                // Fails only once every parser is gone.
                if record_tx.send_blocking(record).is_err() {
                    log::debug!("reader: record channel closed, stopping");
                    return Ok(());
                }
            }
            Ok(None) => {
                log::debug!(
                    "reader: end of input after {} records",
                    counters.records_read.load(Ordering::Relaxed)
                );
                return Ok(());
            }
            Err(err) => {
                cancel.cancel();
                return Err(err);
            }
        }
    }
}

async fn parse_stage(
    worker_id: usize,
    record_rx: Receiver<RawRecord>,
    batch_tx: Sender<Vec<DecodedRow>>,
    batch_size: usize,
    cancel: CancellationToken,
    counters: Arc<StageCounters>,
) -> Result<(), ImportError> {
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            received = record_rx.recv() => match received {
                Ok(record) => record,
                Err(_) => break,
            },
        };

        match decode_record(&record) {
            Ok(row) => batch.push(row),
            Err(err) if err.is_recoverable() => {
                counters.records_skipped.fetch_add(1, Ordering::Relaxed);
                log_skipped(&err);
                continue;
            }
            Err(err) => return Err(err),
        }

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if !send_batch(&batch_tx, full, &cancel).await {
                return Ok(());
            }
        }
    }

    if !batch.is_empty() {
        log::trace!("parser {}: flushing {} remaining rows", worker_id, batch.len());
        send_batch(&batch_tx, batch, &cancel).await;
    }

    log::trace!("parser {}: done", worker_id);
    Ok(())
}

// Returns false when the pipeline is shutting down.
async fn send_batch(
    batch_tx: &Sender<Vec<DecodedRow>>,
    batch: Vec<DecodedRow>,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = batch_tx.send(batch) => sent.is_ok(),
    }
}

async fn write_stage<S: BatchStore>(
    worker_id: usize,
    writer: BatchWriter<S>,
    batch_rx: Receiver<Vec<DecodedRow>>,
    cancel: CancellationToken,
    counters: Arc<StageCounters>,
    rows_written: Arc<Mutex<usize>>,
) -> Result<(), ImportError> {
    loop {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            received = batch_rx.recv() => match received {
                Ok(batch) => batch,
                Err(_) => break,
            },
        };

        match writer.write(&batch).await {
            Ok(written) => {
                let total = {
                    let mut rows = rows_written.lock();
                    *rows += written;
                    *rows
                };
                counters.batches_written.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "writer {}: batch of {} rows written ({} total)",
                    worker_id,
                    written,
                    total
                );
            }
            Err(err) => {
                cancel.cancel();
                log::error!("writer {}: {}", worker_id, err);
                return Err(err);
            }
        }
    }

    log::trace!("writer {}: done", worker_id);
    Ok(())
}
