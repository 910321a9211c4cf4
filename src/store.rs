//! Store abstraction used by the batch writer.
//!
//! The importers never talk to PostgreSQL directly. They hand a statement
//! template and a flat parameter list to a [`BatchStore`], which lets tests
//! swap in [`MemoryStore`](crate::test_support::MemoryStore).

use crate::codec::FieldValue;
use crate::error::StoreError;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use std::future::Future;

/// Executes one parameterized statement per call.
///
/// Implementations must accept concurrent calls from several writer workers.
pub trait BatchStore: Clone + Send + Sync + 'static {
    /// Execute `statement` with positional `params`, returning rows affected.
    fn execute_batch(
        &self,
        statement: &str,
        params: Vec<FieldValue>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// [`BatchStore`] backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgBatchStore {
    pool: PgPool,
}

impl PgBatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl BatchStore for PgBatchStore {
    async fn execute_batch(
        &self,
        statement: &str,
        params: Vec<FieldValue>,
    ) -> Result<u64, StoreError> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = bind_value(query, param);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: FieldValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        FieldValue::Text(v) => query.bind(v),
        FieldValue::Integer(v) => query.bind(v),
        FieldValue::Float(v) => query.bind(v),
        FieldValue::Boolean(v) => query.bind(v),
    }
}
