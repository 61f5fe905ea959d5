//! Catalog connection management.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

/// The session runs strictly sequentially; one connection is plenty and
/// keeps us from competing with the firmware for locks.
const MAX_CONNECTIONS: u32 = 1;
/// The firmware may be writing to the catalog at the same time.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Connection to the firmware's content catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub(crate) pool: SqlitePool,
}

impl Catalog {
    async fn new(options: SqliteConnectOptions) -> std::result::Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS).connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Open the catalog database at the given path.
    ///
    /// The database must already exist; a missing catalog means we're not
    /// running on a device (or the firmware hasn't finished its first boot).
    #[instrument(fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::base_options().filename(path).create_if_missing(false);
        Self::new(options).await.or_raise(|| ErrorKind::Open(path.to_path_buf()))
    }

    /// Connect to an empty in-memory catalog with the columns this crate
    /// uses (useful for testing).
    ///
    /// Not `#[cfg(test)]` so that other crates can use it in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        let catalog = Self::new(options).await.or_raise(|| ErrorKind::Open(":memory:".into()))?;
        sqlx::raw_sql(include_str!("../queries/create_schema.sql"))
            .execute(&catalog.pool)
            .await
            .or_raise(|| ErrorKind::Write)?;
        Ok(catalog)
    }

    fn base_options() -> SqliteConnectOptions {
        // Journal mode and friends are left as the firmware configured them.
        SqliteConnectOptions::new().busy_timeout(BUSY_TIMEOUT)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the catalog connection.
    ///
    /// Waits for the connection to be returned to the pool; the catalog must
    /// not be used afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
