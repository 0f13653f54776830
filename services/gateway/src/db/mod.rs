//! Postgres pool and schema migrations.
//!
//! `PgLedger` and `PgIdentityStore` each hold a clone of the pool opened
//! here; nothing else in the gateway talks to the database directly.

mod error;

pub use error::{is_unique_violation, DbError, UNIQUE_VIOLATION};

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/slotgate";

/// Pool settings, read from `DATABASE_URL` and `DB_*`.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a request waits for a free connection before failing.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10 * 60),
            max_lifetime: Duration::from_secs(30 * 60),
        }
    }
}

impl DbConfig {
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_or("DB_MIN_CONNECTIONS", defaults.min_connections),
            acquire_timeout: Duration::from_secs(env_or(
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout.as_secs(),
            )),
            ..defaults
        }
    }
}

fn env_or<T: FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

/// Directories searched for `*.sql` migrations, in order. The binary may be
/// started from the workspace root or from the crate directory.
fn migration_dirs() -> [PathBuf; 3] {
    [
        PathBuf::from("migrations"),
        PathBuf::from("services/gateway/migrations"),
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    ]
}

/// An open connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            acquire_timeout_secs = config.acquire_timeout.as_secs(),
            "Opening database pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies pending migrations from the first migration directory that
    /// exists.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        let dirs = migration_dirs();
        let Some(dir) = dirs.iter().find(|dir| dir.is_dir()) else {
            let tried = dirs
                .iter()
                .map(|dir| dir.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DbError::MigrationDirNotFound { tried });
        };

        let migrator = Migrator::new(dir.as_path())
            .await
            .map_err(DbError::Migration)?;
        debug!(
            migrations_dir = %dir.display(),
            count = migrator.iter().count(),
            "Loaded migrations"
        );

        migrator.run(&self.pool).await.map_err(DbError::Migration)?;
        info!(migrations_dir = %dir.display(), "Database schema is up to date");
        Ok(())
    }
}
