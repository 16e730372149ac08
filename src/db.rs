use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Connect to Postgres and bring the schema up to date.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;
    tracing::info!("database migrations applied");

    Ok(db)
}

/// Pool for store tests. `None` (test skipped) unless `DATABASE_URL` is set.
#[cfg(test)]
pub async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    Some(connect(&url).await.expect("DATABASE_URL is set but unreachable"))
}
