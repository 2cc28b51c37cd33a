use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

/// Connects to a fresh in-memory database and applies all migrations.
///
/// The pool is pinned to a single connection: every pooled connection of an
/// in-memory SQLite database would otherwise see its own empty schema.
pub async fn setup_db() -> anyhow::Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).min_connections(1);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}
