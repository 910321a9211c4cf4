pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod profiler;
pub mod schema;
pub mod store;
pub mod writer;

use env_logger::Env;
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Install the global logger once; `RUST_LOG` overrides the default filter.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info,sqlx=warn")).init();
    });
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use crate::codec::{COLUMN_COUNT, COLUMNS, DecodedRow, FieldValue, RawRecord};
    use crate::error::{ImportError, StoreError};
    use crate::import::RecordSource;
    use crate::store::BatchStore;
    use parking_lot::Mutex;
    use std::io::{self, Write};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    pub use database::{TestDatabase, TestDatabaseError};

    const CALL_TYPES: [&str; 4] = [
        "Medical Incident",
        "Structure Fire",
        "Alarms",
        "Traffic Collision",
    ];

    /// `count` valid records with unique `row_id`s.
    ///
    /// Call types cycle through a fixed list weighted towards
    /// "Medical Incident" so statistics have a stable ranking.
    pub fn sample_records(count: usize) -> Vec<RawRecord> {
        (0..count)
            .map(|i| {
                let call_type = match i % 10 {
                    0..=5 => CALL_TYPES[0],
                    6 | 7 => CALL_TYPES[1],
                    8 => CALL_TYPES[2],
                    _ => CALL_TYPES[3],
                };
                let fields = [
                    format!("{}", 20110016 + i),
                    format!("U{}", i % 50),
                    format!("{}", 2003235 + i),
                    call_type.to_string(),
                    "01/11/2002".to_string(),
                    "01/10/2002".to_string(),
                    "Other".to_string(),
                    "01/11/2002 01:51:44 AM".to_string(),
                    format!("{} Block of MARKET ST", i % 30 * 100),
                    "SF".to_string(),
                    "94103".to_string(),
                    format!("B0{}", i % 10),
                    format!("{}", i % 44),
                    format!("{}", 1000 + i % 900),
                    format!("{}", i % 3 + 1),
                    format!("{}", i % 3 + 1),
                    format!("{}", i % 3 + 1),
                    if i % 2 == 0 { "true" } else { "false" }.to_string(),
                    if i % 7 == 0 { String::new() } else { "Alarm".to_string() },
                    "1".to_string(),
                    "ENGINE".to_string(),
                    format!("{}", i % 5 + 1),
                    format!("{}", i % 10),
                    format!("{}", i % 11),
                    "Mission".to_string(),
                    "(37.7749, -122.4194)".to_string(),
                    format!("{:09}-U{}", i, i % 50),
                    if i % 9 == 0 { String::new() } else { format!("{}.{}", i % 15, i % 100) },
                ];
                fields.to_vec()
            })
            .collect()
    }

    /// Render records as CSV text with the column names as header.
    pub fn csv_text(records: &[RawRecord]) -> String {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let header: Vec<&str> = COLUMNS.iter().map(|(name, _)| *name).collect();
        writer.write_record(&header).expect("write header");
        for record in records {
            writer.write_record(record).expect("write record");
        }
        let bytes = writer.into_inner().expect("flush csv");
        String::from_utf8(bytes).expect("utf-8 csv")
    }

    /// Write records to a temporary CSV file.
    pub fn write_csv(records: &[RawRecord]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp file");
        file.write_all(csv_text(records).as_bytes())
            .expect("write csv");
        file.flush().expect("flush csv");
        file
    }

    /// In-memory [`RecordSource`] with optional failure injection.
    pub struct VecSource {
        has_header: bool,
        records: std::vec::IntoIter<RawRecord>,
        fail_after: Option<usize>,
        served: usize,
    }

    impl VecSource {
        pub fn new(records: Vec<RawRecord>) -> Self {
            Self {
                has_header: true,
                records: records.into_iter(),
                fail_after: None,
                served: 0,
            }
        }

        /// A source whose header read fails, as for an empty file.
        pub fn without_header() -> Self {
            Self {
                has_header: false,
                ..Self::new(Vec::new())
            }
        }

        /// Fail with a read error once `count` records have been served.
        pub fn failing_after(mut self, count: usize) -> Self {
            self.fail_after = Some(count);
            self
        }
    }

    impl RecordSource for VecSource {
        fn read_header(&mut self) -> Result<(), ImportError> {
            if self.has_header {
                Ok(())
            } else {
                Err(ImportError::MissingHeader)
            }
        }

        fn next_record(&mut self) -> Result<Option<RawRecord>, ImportError> {
            if self.fail_after == Some(self.served) {
                let err = io::Error::new(io::ErrorKind::Other, "injected read failure");
                return Err(ImportError::SourceRead(csv::Error::from(err)));
            }
            let record = self.records.next();
            if record.is_some() {
                self.served += 1;
            }
            Ok(record)
        }
    }

    #[derive(Default)]
    struct MemoryState {
        batches: Mutex<Vec<Vec<DecodedRow>>>,
        calls: AtomicUsize,
    }

    /// [`BatchStore`] that keeps accepted batches in memory.
    #[derive(Clone, Default)]
    pub struct MemoryStore {
        state: Arc<MemoryState>,
        fail_on_call: Option<usize>,
        delay: Option<Duration>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reject the `call`-th batch (1-based).
        pub fn failing_on_call(call: usize) -> Self {
            Self {
                fail_on_call: Some(call),
                ..Self::default()
            }
        }

        /// Sleep before answering each call.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Number of `execute_batch` calls, failed ones included.
        pub fn calls(&self) -> usize {
            self.state.calls.load(Ordering::SeqCst)
        }

        pub fn batch_sizes(&self) -> Vec<usize> {
            self.state.batches.lock().iter().map(Vec::len).collect()
        }

        /// Accepted rows in the order their batches were accepted.
        pub fn rows(&self) -> Vec<DecodedRow> {
            self.state.batches.lock().iter().flatten().cloned().collect()
        }

        pub fn row_ids(&self) -> Vec<String> {
            self.rows()
                .iter()
                .filter_map(|row| row.row_id().map(str::to_string))
                .collect()
        }
    }

    impl BatchStore for MemoryStore {
        async fn execute_batch(
            &self,
            statement: &str,
            params: Vec<FieldValue>,
        ) -> Result<u64, StoreError> {
            let call = self.state.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_on_call == Some(call) {
                return Err(StoreError::Rejected(format!("injected failure on call {call}")));
            }

            let placeholders = statement.matches('$').count();
            let misaligned = params.len() % COLUMN_COUNT != 0;
            if params.is_empty() || misaligned || placeholders != params.len() {
                return Err(StoreError::Rejected(format!(
                    "{} parameters for {} placeholders",
                    params.len(),
                    placeholders
                )));
            }

            let rows = params
                .chunks(COLUMN_COUNT)
                .map(|chunk| {
                    <[FieldValue; COLUMN_COUNT]>::try_from(chunk.to_vec())
                        .map(DecodedRow)
                        .map_err(|_| StoreError::Rejected("short row".to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let count = rows.len() as u64;
            self.state.batches.lock().push(rows);
            Ok(count)
        }
    }

    pub mod database {
        use crate::schema::SchemaManager;
        use log::LevelFilter;
        use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use sqlx::{ConnectOptions, PgPool};
        use testcontainers::{
            ContainerAsync, ImageExt, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use testcontainers_modules::postgres::Postgres;
        use thiserror::Error;
        use uuid::Uuid;

        const SCHEMA: &str = include_str!("../schema.sql");
        const POSTGRES_TAG: &str = "16-alpine";

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("schema error: {0}")]
            Schema(#[from] crate::error::SchemaError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Disposable PostgreSQL database with the `fire_calls` schema applied.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            container: Option<ContainerAsync<Postgres>>,
        }

        impl TestDatabase {
            /// Launch a Postgres container and create a fresh database in it.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default().with_tag(POSTGRES_TAG).start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let base_options: PgConnectOptions = admin_url.parse()?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(base_options.clone())
                    .await?;

                let database_name = format!("fire_calls_{}", Uuid::new_v4().simple());
                sqlx::query(&format!("CREATE DATABASE \"{}\"", database_name))
                    .execute(&admin_pool)
                    .await?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.database(&database_name))
                    .await?;

                SchemaManager::new(pool.clone())
                    .create_from_script(SCHEMA)
                    .await?;

                Ok(Self {
                    pool: Some(pool),
                    container: Some(container),
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and stop the container.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }
                if let Some(container) = self.container.take() {
                    drop(container);
                }
                Ok(())
            }
        }
    }
}
