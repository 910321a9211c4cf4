//! Schema management for the `fire_calls` table.
//!
//! Applies DDL scripts, manages the secondary indexes and reads table
//! statistics. Nothing here is cached; statistics are recomputed by the
//! database on every call.

use crate::error::SchemaError;
use crate::writer::TABLE_NAME;
use serde::Serialize;
use sqlx::{Executor, PgPool};
use std::fmt;
use std::path::Path;

/// Secondary indexes as `(name, column)` pairs.
pub const INDEXES: [(&str, &str); 4] = [
    ("idx_call_type", "call_type"),
    ("idx_call_date", "call_date"),
    ("idx_neighborhood", "neighborhood"),
    ("idx_unit_type", "unit_type"),
];

/// Number of call types reported by default.
pub const DEFAULT_TOP_CALL_TYPES: i64 = 5;

/// A call type and how many rows carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CallTypeCount {
    pub call_type: Option<String>,
    pub count: i64,
}

/// Row count plus the most frequent call types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub total_rows: i64,
    pub top_call_types: Vec<CallTypeCount>,
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "TABLE STATISTICS")?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "total rows: {}", self.total_rows)?;
        writeln!(f, "top {} call types:", self.top_call_types.len())?;
        writeln!(f, "{}", "-".repeat(60))?;
        for (idx, entry) in self.top_call_types.iter().enumerate() {
            let percentage = if self.total_rows > 0 {
                entry.count as f64 / self.total_rows as f64 * 100.0
            } else {
                0.0
            };
            writeln!(
                f,
                "{}. {:<30}: {:>6} ({:.2}%)",
                idx + 1,
                entry.call_type.as_deref().unwrap_or("(none)"),
                entry.count,
                percentage
            )?;
        }
        write!(f, "{}", "=".repeat(60))
    }
}

/// Schema operations against a shared pool.
pub struct SchemaManager {
    pool: PgPool,
}

impl SchemaManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Read a SQL file and execute it.
    pub async fn create_from_file(&self, path: impl AsRef<Path>) -> Result<(), SchemaError> {
        let path = path.as_ref();
        let script = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SchemaError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        log::info!("applying schema from {}", path.display());
        self.create_from_script(&script).await
    }

    /// Execute a script that may contain several statements.
    pub async fn create_from_script(&self, script: &str) -> Result<(), SchemaError> {
        // Without bind parameters the script goes over the simple query
        // protocol, which accepts multiple statements.
        self.pool
            .execute(script)
            .await
            .map_err(SchemaError::database("execute schema"))?;
        Ok(())
    }

    pub async fn drop_table(&self) -> Result<(), SchemaError> {
        log::info!("dropping table {}", TABLE_NAME);
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", TABLE_NAME))
            .execute(&self.pool)
            .await
            .map_err(SchemaError::database("drop table"))?;
        Ok(())
    }

    pub async fn create_indexes(&self) -> Result<(), SchemaError> {
        for (name, column) in INDEXES {
            log::debug!("creating index {}", name);
            let statement = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                name, TABLE_NAME, column
            );
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(SchemaError::database("create index"))?;
        }
        Ok(())
    }

    pub async fn drop_indexes(&self) -> Result<(), SchemaError> {
        for (name, _) in INDEXES {
            log::debug!("dropping index {}", name);
            sqlx::query(&format!("DROP INDEX IF EXISTS {}", name))
                .execute(&self.pool)
                .await
                .map_err(SchemaError::database("drop index"))?;
        }
        Ok(())
    }

    /// Total rows and the `top_n` most frequent call types.
    pub async fn table_stats(&self, top_n: i64) -> Result<TableStats, SchemaError> {
        let total_rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", TABLE_NAME))
            .fetch_one(&self.pool)
            .await
            .map_err(SchemaError::database("count rows"))?;

        let top_call_types = sqlx::query_as::<_, CallTypeCount>(&format!(
            "SELECT call_type, COUNT(*) AS count FROM {} GROUP BY call_type ORDER BY count DESC, call_type LIMIT $1",
            TABLE_NAME
        ))
        .bind(top_n)
        .fetch_all(&self.pool)
        .await
        .map_err(SchemaError::database("read top call types"))?;

        Ok(TableStats {
            total_rows,
            top_call_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_display_shows_percentages() {
        let stats = TableStats {
            total_rows: 200,
            top_call_types: vec![
                CallTypeCount {
                    call_type: Some("Medical Incident".to_string()),
                    count: 150,
                },
                CallTypeCount {
                    call_type: None,
                    count: 50,
                },
            ],
        };

        let rendered = stats.to_string();
        assert!(rendered.contains("total rows: 200"));
        assert!(rendered.contains("1. Medical Incident"));
        assert!(rendered.contains("(75.00%)"));
        assert!(rendered.contains("2. (none)"));
    }

    #[test]
    fn stats_display_handles_empty_table() {
        let stats = TableStats {
            total_rows: 0,
            top_call_types: Vec::new(),
        };
        assert!(stats.to_string().contains("top 0 call types"));
    }
}
