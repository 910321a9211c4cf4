use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use fire_calls_importer::config::ImportConfig;
use fire_calls_importer::db;
use fire_calls_importer::import::{CsvImporter, ImportStrategy};
use fire_calls_importer::init_logger;
use fire_calls_importer::profiler::{DATA_IMPORT, Profiler};
use fire_calls_importer::schema::{DEFAULT_TOP_CALL_TYPES, SchemaManager};
use fire_calls_importer::store::PgBatchStore;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Ordered, one batch at a time
    Sequential,
    /// Reader, parser and writer tasks over bounded queues
    Concurrent,
}

#[derive(Parser, Debug)]
#[command(
    name = "fire-calls-importer",
    about = "Load the SF fire calls CSV into PostgreSQL and report timings"
)]
struct Args {
    /// CSV file to import (defaults to IMPORT_CSV_PATH).
    #[arg(long)]
    file: Option<PathBuf>,

    /// SQL script creating the target table (defaults to IMPORT_SCHEMA_PATH).
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Import strategy.
    #[arg(long, value_enum, default_value_t = Mode::Concurrent)]
    mode: Mode,

    /// Rows per INSERT statement.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Parser tasks for the concurrent mode.
    #[arg(long)]
    workers: Option<usize>,

    /// Writer tasks for the concurrent mode.
    #[arg(long)]
    writers: Option<usize>,

    /// Drop the table before applying the schema.
    #[arg(long)]
    drop_table: bool,

    /// Create secondary indexes after the import.
    #[arg(long)]
    create_indexes: bool,

    /// Number of call types in the statistics report.
    #[arg(long, default_value_t = DEFAULT_TOP_CALL_TYPES)]
    top_n: i64,

    /// Print the timing report as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let args = Args::parse();

    let mut config = ImportConfig::from_env();
    if let Some(file) = args.file {
        config.csv_path = file;
    }
    if let Some(schema) = args.schema {
        config.schema_path = schema;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(workers) = args.workers {
        config.parser_workers = workers;
    }
    if let Some(writers) = args.writers {
        config.writer_workers = writers;
    }
    config.validate()?;

    let pool = db::connect(config.database_url()?, config.max_connections).await?;
    let schema = SchemaManager::new(pool.clone());
    let mut profiler = Profiler::new();

    if args.drop_table {
        schema.drop_table().await?;
    }

    profiler.start("schema_creation");
    schema.create_from_file(&config.schema_path).await?;
    let schema_time = profiler.end("schema_creation");
    log::info!("schema created in {:?}", schema_time);

    let strategy = match args.mode {
        Mode::Sequential => ImportStrategy::Sequential,
        Mode::Concurrent => ImportStrategy::Concurrent(config.pipeline_options()),
    };

    log::info!("starting data import from {}", config.csv_path.display());
    let importer = CsvImporter::new(PgBatchStore::new(pool.clone()), config.batch_size);

    profiler.start(DATA_IMPORT);
    let summary = match importer.import_file(&config.csv_path, strategy).await {
        Ok(summary) => summary,
        Err(aborted) => {
            log::error!("failed to import data: {}", aborted);
            db::close(&pool).await;
            return Err(aborted.into());
        }
    };
    profiler.end(DATA_IMPORT);

    if args.create_indexes {
        profiler.start("index_creation");
        schema.create_indexes().await?;
        profiler.end("index_creation");
    }

    let report = profiler.report(summary.rows_written);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    match schema.table_stats(args.top_n).await {
        Ok(stats) => println!("{}", stats),
        Err(err) => log::warn!("could not retrieve table stats: {}", err),
    }

    db::close(&pool).await;
    Ok(())
}
