use thiserror::Error;

/// SQLSTATE `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("could not open database pool: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("database query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// None of the candidate migration directories exist.
    #[error("no migrations directory found (looked in {tried})")]
    MigrationDirNotFound { tried: String },

    /// A stored value no longer decodes into its domain type.
    #[error("corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },
}

/// True for a unique constraint violation, whichever constraint it was.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}
