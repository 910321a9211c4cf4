//! Ordered, single-threaded import.
//!
//! Records are decoded and written in the order they appear in the source.
//! Only one batch is held in memory and only one write is in flight.

use crate::codec::{DecodedRow, decode_record};
use crate::error::ImportAborted;
use crate::import::{ImportSummary, RecordSource, log_skipped};
use crate::store::BatchStore;
use crate::writer::BatchWriter;

pub(crate) async fn run<S: BatchStore, R: RecordSource>(
    writer: &BatchWriter<S>,
    batch_size: usize,
    mut source: R,
) -> Result<ImportSummary, ImportAborted> {
    let mut summary = ImportSummary::default();

    source
        .read_header()
        .map_err(|err| ImportAborted::new(0, err))?;

    let mut batch = Vec::with_capacity(batch_size);

    loop {
        let record = match source.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(err) => {
                log::error!(
                    "sequential import: read failed after {} rows: {}",
                    summary.rows_written,
                    err
                );
                return Err(ImportAborted::new(summary.rows_written, err));
            }
        };
        summary.records_read += 1;

        match decode_record(&record) {
            Ok(row) => batch.push(row),
            Err(err) if err.is_recoverable() => {
                summary.records_skipped += 1;
                log_skipped(&err);
                continue;
            }
            Err(err) => return Err(ImportAborted::new(summary.rows_written, err)),
        }

        if batch.len() >= batch_size {
            flush(writer, &mut batch, &mut summary).await?;
        }
    }

    if !batch.is_empty() {
        flush(writer, &mut batch, &mut summary).await?;
    }

    log::info!(
        "sequential import complete: {} rows in {} batches ({} skipped)",
        summary.rows_written,
        summary.batches_written,
        summary.records_skipped
    );
    Ok(summary)
}

async fn flush<S: BatchStore>(
    writer: &BatchWriter<S>,
    batch: &mut Vec<DecodedRow>,
    summary: &mut ImportSummary,
) -> Result<(), ImportAborted> {
    match writer.write(batch).await {
        Ok(written) => {
            summary.rows_written += written;
            summary.batches_written += 1;
            batch.clear();
            log::debug!("sequential import: {} rows written", summary.rows_written);
            Ok(())
        }
        Err(err) => {
            log::error!(
                "sequential import: batch failed after {} rows: {}",
                summary.rows_written,
                err
            );
            Err(ImportAborted::new(summary.rows_written, err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportError;
    use crate::import::CsvSource;
    use crate::test_support::{MemoryStore, VecSource, csv_text, sample_records};
    use std::io::Cursor;

    async fn import(
        store: &MemoryStore,
        batch_size: usize,
        source: VecSource,
    ) -> Result<ImportSummary, ImportAborted> {
        let writer = BatchWriter::new(store.clone());
        run(&writer, batch_size, source).await
    }

    #[tokio::test]
    async fn preserves_input_order_across_batches() {
        let records = sample_records(25);
        let store = MemoryStore::new();

        let summary = import(&store, 10, VecSource::new(records.clone()))
            .await
            .expect("import succeeds");

        assert_eq!(summary.rows_written, 25);
        assert_eq!(summary.batches_written, 3);
        assert_eq!(store.batch_sizes(), vec![10, 10, 5]);

        let expected: Vec<String> = records.iter().map(|r| r[26].clone()).collect();
        assert_eq!(store.row_ids(), expected);
    }

    #[tokio::test]
    async fn header_only_input_writes_nothing() {
        let store = MemoryStore::new();
        let summary = import(&store, 10, VecSource::new(Vec::new()))
            .await
            .expect("import succeeds");

        assert_eq!(summary, ImportSummary::default());
        assert!(store.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn batch_size_one_writes_every_row_alone() {
        let store = MemoryStore::new();
        let summary = import(&store, 1, VecSource::new(sample_records(7)))
            .await
            .expect("import succeeds");

        assert_eq!(summary.rows_written, 7);
        assert_eq!(store.batch_sizes(), vec![1; 7]);
    }

    #[tokio::test]
    async fn malformed_records_are_skipped() {
        let mut records = sample_records(5);
        records.insert(2, vec!["too".to_string(), "short".to_string()]);
        records.push(vec![String::new(); 30]);
        let store = MemoryStore::new();

        let summary = import(&store, 100, VecSource::new(records))
            .await
            .expect("import succeeds");

        assert_eq!(summary.records_read, 7);
        assert_eq!(summary.records_skipped, 2);
        assert_eq!(summary.rows_written, 5);
    }

    #[tokio::test]
    async fn read_failure_keeps_partial_count() {
        let store = MemoryStore::new();
        let source = VecSource::new(sample_records(12)).failing_after(9);

        let aborted = import(&store, 4, source).await.expect_err("read fails");

        assert_eq!(aborted.rows_written, 8);
        assert!(matches!(aborted.error, ImportError::SourceRead(_)));
        assert_eq!(store.batch_sizes(), vec![4, 4]);
    }

    #[tokio::test]
    async fn write_failure_stops_the_import() {
        let store = MemoryStore::failing_on_call(2);
        let aborted = import(&store, 5, VecSource::new(sample_records(20)))
            .await
            .expect_err("second batch fails");

        assert_eq!(aborted.rows_written, 5);
        assert!(matches!(aborted.error, ImportError::Write(_)));
        assert_eq!(store.batch_sizes(), vec![5]);
    }

    #[tokio::test]
    async fn final_batch_failure_is_reported() {
        let store = MemoryStore::failing_on_call(3);
        let aborted = import(&store, 5, VecSource::new(sample_records(12)))
            .await
            .expect_err("final partial batch fails");

        assert_eq!(aborted.rows_written, 10);
    }

    #[tokio::test]
    async fn empty_input_is_missing_header() {
        let store = MemoryStore::new();
        let writer = BatchWriter::new(store.clone());

        let aborted = run(&writer, 10, CsvSource::new("".as_bytes()))
            .await
            .expect_err("no header");

        assert_eq!(aborted.rows_written, 0);
        assert!(matches!(aborted.error, ImportError::MissingHeader));
    }

    #[tokio::test]
    async fn reads_real_csv_text() {
        let records = sample_records(3);
        let text = csv_text(&records);
        let store = MemoryStore::new();
        let writer = BatchWriter::new(store.clone());

        let summary = run(&writer, 2, CsvSource::new(Cursor::new(text.into_bytes())))
            .await
            .expect("import succeeds");

        assert_eq!(summary.rows_written, 3);
        assert_eq!(store.batch_sizes(), vec![2, 1]);
    }
}
