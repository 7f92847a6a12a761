use sea_orm::{Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod migrations;

pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, sea_orm::DbErr> {
    let mut opt = sea_orm::ConnectOptions::new(database_url);
    opt.max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug);

    info!("Connecting to database...");
    let db = Database::connect(opt).await?;
    info!("Database connection established");

    Ok(db)
}

/// Fresh, fully migrated in-memory database for tests.
#[cfg(test)]
pub async fn test_connection() -> DatabaseConnection {
    use sea_orm_migration::MigratorTrait;

    // A second pooled connection would open a different in-memory database
    let mut opt = sea_orm::ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(opt).await.expect("sqlite in-memory database");
    migrations::Migrator::up(&db, None)
        .await
        .expect("migrations apply to sqlite");
    db
}
