use crate::error::ConfigError;
use crate::import::pipeline::{DEFAULT_PARSER_WORKERS, DEFAULT_WRITER_WORKERS};
use crate::import::{DEFAULT_BATCH_SIZE, PipelineOptions};
use crate::writer::MAX_BATCH_SIZE;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// Unset or out-of-range values fall back to `default`.
fn parse_or<T: FromStr>(value: Option<&str>, default: T) -> T {
    value
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    parse_or(env::var(key).ok().as_deref(), default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    parse_or(env::var(key).ok().as_deref(), default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Runtime configuration for an import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub database_url: Option<String>,
    pub csv_path: PathBuf,
    pub schema_path: PathBuf,
    pub batch_size: usize,
    pub parser_workers: usize,
    pub writer_workers: usize,
    pub max_connections: u32,
}

impl ImportConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            csv_path: PathBuf::from(env_string("IMPORT_CSV_PATH", "data/sf-fire-calls.csv")),
            schema_path: PathBuf::from(env_string("IMPORT_SCHEMA_PATH", "schema.sql")),
            batch_size: env_usize("IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            parser_workers: env_usize("IMPORT_PARSER_WORKERS", DEFAULT_PARSER_WORKERS),
            writer_workers: env_usize("IMPORT_WRITER_WORKERS", DEFAULT_WRITER_WORKERS),
            max_connections: env_u32("IMPORT_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
        }
    }

    /// Check limits the importers rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Zero { name: "batch size" });
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::BatchTooLarge {
                batch_size: self.batch_size,
                max: MAX_BATCH_SIZE,
            });
        }
        if self.parser_workers == 0 {
            return Err(ConfigError::Zero {
                name: "parser workers",
            });
        }
        if self.writer_workers == 0 {
            return Err(ConfigError::Zero {
                name: "writer workers",
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Zero {
                name: "max connections",
            });
        }
        Ok(())
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            parser_workers: self.parser_workers,
            writer_workers: self.writer_workers,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ImportConfig {
        ImportConfig {
            database_url: None,
            csv_path: PathBuf::from("data.csv"),
            schema_path: PathBuf::from("schema.sql"),
            batch_size: 1000,
            parser_workers: 4,
            writer_workers: 2,
            max_connections: 5,
        }
    }

    #[test]
    fn accepts_defaults() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn rejects_zero_values() {
        let mut zero_batch = config();
        zero_batch.batch_size = 0;
        assert!(matches!(zero_batch.validate(), Err(ConfigError::Zero { .. })));

        let mut zero_writers = config();
        zero_writers.writer_workers = 0;
        assert!(matches!(
            zero_writers.validate(),
            Err(ConfigError::Zero { name: "writer workers" })
        ));
    }

    #[test]
    fn rejects_batches_over_the_bind_limit() {
        let mut big = config();
        big.batch_size = MAX_BATCH_SIZE + 1;
        assert!(matches!(big.validate(), Err(ConfigError::BatchTooLarge { .. })));

        big.batch_size = MAX_BATCH_SIZE;
        assert!(big.validate().is_ok());
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = config().database_url().expect_err("no url");
        assert_eq!(err.to_string(), "DATABASE_URL is not set");
    }

    #[test]
    fn connection_count_outside_u32_falls_back_to_default() {
        assert_eq!(parse_or(Some("12"), DEFAULT_MAX_CONNECTIONS), 12);
        assert_eq!(parse_or(Some(" 8 "), DEFAULT_MAX_CONNECTIONS), 8);
        assert_eq!(
            parse_or(Some("4294967297"), DEFAULT_MAX_CONNECTIONS),
            DEFAULT_MAX_CONNECTIONS
        );
        assert_eq!(parse_or(Some("-1"), DEFAULT_MAX_CONNECTIONS), DEFAULT_MAX_CONNECTIONS);
        assert_eq!(parse_or::<u32>(None, DEFAULT_MAX_CONNECTIONS), DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn pipeline_options_follow_config() {
        let mut cfg = config();
        cfg.parser_workers = 8;
        cfg.writer_workers = 3;
        assert_eq!(
            cfg.pipeline_options(),
            PipelineOptions {
                parser_workers: 8,
                writer_workers: 3
            }
        );
    }
}
