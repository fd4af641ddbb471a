use crate::config::AppConfig;
use crate::entities::videos;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm::{ConnectionTrait, Schema};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(config: &AppConfig) -> anyhow::Result<DatabaseConnection> {
    let db_url = &config.database_url;

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(db_url);
    if db_url.contains(":memory:") {
        // Every connection to an in-memory SQLite database is a separate database
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(50).min_connections(2);
    }
    opt.connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    let stmt = schema
        .create_table_from_entity(videos::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&stmt)).await?;

    Ok(())
}
