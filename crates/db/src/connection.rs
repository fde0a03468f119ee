use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use frontdesk_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens the pool described by the `[database]` config section. Pool size and
/// acquire timeout come from the config; every connection gets foreign keys
/// and a busy timeout derived from the same acquire window. WAL only applies
/// to file-backed databases, an in-memory database has no journal to tune.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let wal = !config.url.contains(":memory:");
    let busy_timeout_ms = config.timeout_secs.clamp(1, 30) * 1_000;

    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                if wal {
                    sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                }
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
}

/// Direct-knob variant for callers without a full config, mainly tests.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    connect(&DatabaseConfig {
        url: database_url.to_owned(),
        max_connections,
        timeout_secs,
    })
    .await
}
