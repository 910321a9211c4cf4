//! Multi-row INSERT for decoded batches.

use crate::codec::{COLUMN_COUNT, COLUMNS, DecodedRow, FieldValue};
use crate::error::ImportError;
use crate::store::BatchStore;

/// Target table for imported rows.
pub const TABLE_NAME: &str = "fire_calls";

/// PostgreSQL accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMETERS: usize = 65_535;

/// Largest batch that fits in a single statement.
pub const MAX_BATCH_SIZE: usize = MAX_BIND_PARAMETERS / COLUMN_COUNT;

/// Build the INSERT statement for `row_count` rows.
///
/// Placeholders are numbered row-major: row `i`, column `j` binds to
/// `$(i * 28 + j + 1)`.
pub fn build_insert_statement(row_count: usize) -> String {
    let columns = COLUMNS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");

    let mut statement = format!("INSERT INTO {} ({}) VALUES ", TABLE_NAME, columns);
    statement.reserve(row_count * COLUMN_COUNT * 6);

    for row in 0..row_count {
        if row > 0 {
            statement.push(',');
        }
        statement.push('(');
        for col in 0..COLUMN_COUNT {
            if col > 0 {
                statement.push(',');
            }
            statement.push('$');
            statement.push_str(&(row * COLUMN_COUNT + col + 1).to_string());
        }
        statement.push(')');
    }

    statement
}

/// Flatten a batch into bind parameters, row by row.
pub fn flatten_parameters(batch: &[DecodedRow]) -> Vec<FieldValue> {
    let mut params = Vec::with_capacity(batch.len() * COLUMN_COUNT);
    for row in batch {
        params.extend(row.values().iter().cloned());
    }
    params
}

/// Writes one batch per call through a [`BatchStore`].
///
/// A batch either succeeds as a whole or fails as a whole. Retrying is left
/// to the caller.
#[derive(Clone)]
pub struct BatchWriter<S> {
    store: S,
}

impl<S: BatchStore> BatchWriter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Insert `batch`, returning the number of rows sent.
    ///
    /// An empty batch is a no-op and never reaches the store.
    pub async fn write(&self, batch: &[DecodedRow]) -> Result<usize, ImportError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let statement = build_insert_statement(batch.len());
        let params = flatten_parameters(batch);

        let affected = self.store.execute_batch(&statement, params).await?;
        log::trace!("bulk inserted {} rows ({} affected)", batch.len(), affected);

        Ok(batch.len())
    }
}
