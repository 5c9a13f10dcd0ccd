//! PostgreSQL connection pool for the classification store.
//!
//! Settings come from [`crate::KpdConfig::database_config`]; env overrides
//! are applied there, not here.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use kpd_postgres::PgClassificationStore;

const DEFAULT_DATABASE_URL: &str = "postgresql://localhost:5432/kpd";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

/// Owns the pool the CLI hands to [`PgClassificationStore`].
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(config: DatabaseConfig) -> Result<Self, sqlx::Error> {
        let masked = mask_database_url(&config.database_url);
        info!(url = %masked, max_connections = config.max_connections, "Connecting to KPD database");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(&config.database_url)
            .await
            .inspect_err(|e| warn!(url = %masked, error = %e, "Database connection failed"))?;

        Ok(Self { pool })
    }

    pub fn classification_store(&self) -> PgClassificationStore {
        PgClassificationStore::new(self.pool.clone())
    }

    /// Apply the `kpd` schema migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        self.classification_store().run_migrations().await?;
        info!("KPD schema up to date");
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Replace the password in `url` with `***` for logging.
///
/// Strings that do not parse as URLs keep only their first and last ten
/// characters.
pub fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => {
            let chars: Vec<char> = url.chars().collect();
            if chars.len() > 20 {
                let head: String = chars[..10].iter().collect();
                let tail: String = chars[chars.len() - 10..].iter().collect();
                format!("{head}***{tail}")
            } else {
                "***".to_string()
            }
        }
    }
}
