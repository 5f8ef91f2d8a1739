//! Connection management: open the store once and configure it for WAL.

use crate::error::StoreError;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Tunable pragma values. Journal mode, synchronous level, temp store and
/// foreign keys are fixed; these are the knobs that depend on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PragmaSettings {
    /// Page cache budget in pages (negative values mean KiB).
    pub cache_size: i64,
    /// Memory-mapped I/O ceiling in bytes.
    pub mmap_size: u64,
    pub busy_timeout_ms: u64,
    /// WAL size (bytes) above which a checkpoint truncates the log.
    pub journal_size_limit: i64,
}

impl Default for PragmaSettings {
    fn default() -> Self {
        PragmaSettings {
            cache_size: 20_000,
            mmap_size: 268_435_456,
            busy_timeout_ms: 5_000,
            journal_size_limit: 1_048_576,
        }
    }
}

impl PragmaSettings {
    /// Pragmas in the order they are applied to every new connection.
    ///
    /// `journal_mode` goes first: it is file-scoped and the rest assume WAL.
    pub fn statements(&self) -> Vec<(&'static str, String)> {
        vec![
            ("journal_mode", "WAL".to_string()),
            ("synchronous", "NORMAL".to_string()),
            ("temp_store", "MEMORY".to_string()),
            ("cache_size", self.cache_size.to_string()),
            ("mmap_size", self.mmap_size.to_string()),
            ("busy_timeout", self.busy_timeout_ms.to_string()),
            ("foreign_keys", "ON".to_string()),
            ("journal_size_limit", self.journal_size_limit.to_string()),
        ]
    }
}

#[derive(Debug, Error)]
#[error("PRAGMA {pragma} = {value} failed: {source}")]
struct PragmaError {
    pragma: &'static str,
    value: String,
    #[source]
    source: sqlx::Error,
}

/// Journal and durability settings as reported by the store after setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PragmaReport {
    pub journal_mode: String,
    pub synchronous: String,
    pub foreign_keys: bool,
}

/// Handle to the process-wide store.
///
/// Cloning is cheap; every clone shares the same single-connection pool.
/// The connection has had [`PragmaSettings`] applied before it is handed
/// out, and is configured again if the pool ever has to reopen it.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Open the store at `path` and apply the connection pragmas.
    ///
    /// # Errors
    /// Returns `StoreError::Configuration` if the file cannot be opened or any
    /// pragma fails to apply. The process should not continue without a
    /// configured store.
    pub async fn initialize(
        path: impl AsRef<Path>,
        settings: PragmaSettings,
    ) -> Result<Self, StoreError> {
        Self::open(path.as_ref(), settings.statements()).await
    }

    async fn open(
        path: &Path,
        statements: Vec<(&'static str, String)>,
    ) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Configuration(format!(
                        "cannot create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);

        // One connection per process. A second connection keeps a read
        // snapshot open and turns wal_checkpoint(TRUNCATE) into a busy no-op.
        let statements = Arc::new(statements);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .after_connect(move |conn, _meta| {
                let statements = statements.clone();
                Box::pin(async move { apply_pragmas(conn, &statements).await })
            })
            .connect_with(options)
            .await
            .map_err(|e| match e {
                sqlx::Error::Configuration(inner) => StoreError::Configuration(inner.to_string()),
                other => StoreError::Configuration(format!(
                    "cannot open {}: {}",
                    path.display(),
                    other
                )),
            })?;

        let db = Database { pool, path };
        let report = db
            .pragma_report()
            .await
            .map_err(|e| StoreError::Configuration(format!("cannot verify pragmas: {}", e)))?;

        info!(
            journal_mode = %report.journal_mode,
            synchronous = %report.synchronous,
            foreign_keys = report.foreign_keys,
            "SQLite pragmas applied to {}",
            db.path.display()
        );
        if report.journal_mode != "wal" {
            warn!(
                journal_mode = %report.journal_mode,
                "SQLite did not switch to WAL; readers and the writer may block each other"
            );
        }

        Ok(db)
    }

    /// Query the live journal mode, synchronous level and FK enforcement.
    pub async fn pragma_report(&self) -> Result<PragmaReport, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;

        let journal_mode: String = sqlx::query("PRAGMA journal_mode")
            .fetch_one(&mut *conn)
            .await?
            .get(0);
        let synchronous: i64 = sqlx::query("PRAGMA synchronous")
            .fetch_one(&mut *conn)
            .await?
            .get(0);
        let foreign_keys: i64 = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(&mut *conn)
            .await?
            .get(0);

        Ok(PragmaReport {
            journal_mode: journal_mode.to_lowercase(),
            synchronous: synchronous_name(synchronous).to_string(),
            foreign_keys: foreign_keys != 0,
        })
    }

    /// The shared pool. Reads go here directly; writes go through the
    /// [`WriteSerializer`](crate::db::WriteSerializer). The pool holds a
    /// single connection, so a job holding a transaction delays reads until
    /// it finishes.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the connection, waiting for it to be returned if checked out.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn apply_pragmas(
    conn: &mut SqliteConnection,
    statements: &[(&'static str, String)],
) -> Result<(), sqlx::Error> {
    for (pragma, value) in statements {
        let sql = format!("PRAGMA {} = {}", pragma, value);
        // Several pragmas echo their new value as a row; ignore it here.
        if let Err(source) = sqlx::query(&sql).fetch_optional(&mut *conn).await {
            return Err(sqlx::Error::Configuration(Box::new(PragmaError {
                pragma,
                value: value.clone(),
                source,
            })));
        }
    }
    debug!("Connection pragmas applied");
    Ok(())
}

fn synchronous_name(level: i64) -> &'static str {
    match level {
        0 => "off",
        1 => "normal",
        2 => "full",
        3 => "extra",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pragma_order() {
        let names: Vec<&str> = PragmaSettings::default()
            .statements()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(
            names,
            vec![
                "journal_mode",
                "synchronous",
                "temp_store",
                "cache_size",
                "mmap_size",
                "busy_timeout",
                "foreign_keys",
                "journal_size_limit",
            ]
        );
    }

    #[test]
    fn test_synchronous_names() {
        assert_eq!(synchronous_name(1), "normal");
        assert_eq!(synchronous_name(2), "full");
        assert_eq!(synchronous_name(9), "unknown");
    }

    #[tokio::test]
    async fn test_initialize_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("dir").join("test.db");

        let db = Database::initialize(&db_path, PragmaSettings::default())
            .await
            .expect("initialize failed");
        assert!(db_path.exists());
        assert_eq!(db.path(), db_path.as_path());

        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(db.pool())
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_single_connection_is_configured() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let settings = PragmaSettings {
            busy_timeout_ms: 1234,
            ..PragmaSettings::default()
        };
        let db = Database::initialize(&db_path, settings)
            .await
            .expect("initialize failed");
        assert_eq!(db.pool().options().get_max_connections(), 1);

        let mut conn = db.pool().acquire().await.unwrap();
        let timeout: (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(timeout.0, 1234);

        let temp_store: (i64,) = sqlx::query_as("PRAGMA temp_store")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        // 2 = MEMORY
        assert_eq!(temp_store.0, 2);
        drop(conn);
        assert_eq!(db.pool().size(), 1);
    }

    #[tokio::test]
    async fn test_unopenable_path_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        // A directory cannot be opened as a database file.
        let result = Database::initialize(temp_dir.path(), PragmaSettings::default()).await;
        match result {
            Err(StoreError::Configuration(_)) => {}
            other => panic!("Expected Configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_failing_pragma_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut statements = PragmaSettings::default().statements();
        statements[3].1 = "1 2".to_string();

        let result = Database::open(&temp_dir.path().join("test.db"), statements).await;
        match result {
            Err(StoreError::Configuration(msg)) => {
                assert!(msg.contains("PRAGMA cache_size = 1 2"), "message: {}", msg)
            }
            other => panic!("Expected Configuration error, got {:?}", other.map(|_| ())),
        }
    }
}
