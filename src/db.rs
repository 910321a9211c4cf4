use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Open the shared connection pool.
///
/// The pool is passed explicitly to every component that needs it.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    log::info!("database connection pool created (max {} connections)", max_connections);
    Ok(pool)
}

/// Close the pool, waiting for checked-out connections to be returned.
pub async fn close(pool: &PgPool) {
    pool.close().await;
    log::info!("database pool closed");
}
