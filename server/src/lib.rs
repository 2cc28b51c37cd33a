pub mod config {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    pub struct Config {
        pub db_url: String,
        #[serde(default = "default_max_connections")]
        pub max_connections: u32,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            let settings = config::Config::builder()
                .add_source(config::Environment::default())
                .build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }
    }

    fn default_max_connections() -> u32 {
        5
    }
}

pub mod company;
pub mod entities;
pub mod file;
pub mod norm;
pub mod policy;
pub mod task;
pub mod user;

use migration::MigratorTrait;

/// Connects to the configured database and applies pending migrations.
#[tracing::instrument(skip(config))]
pub async fn connect(config: &config::Config) -> anyhow::Result<sea_orm::DatabaseConnection> {
    let mut options = sea_orm::ConnectOptions::new(config.db_url.clone());
    options.max_connections(config.max_connections);
    let db = sea_orm::Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");
    Ok(db)
}
