use sqlx::{PgPool, postgres::PgPoolOptions};

/// Open the pool and bring the schema up to date.
pub async fn connect_pg(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(max_connections, "database ready");
    Ok(pool)
}
