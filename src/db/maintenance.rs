//! Housekeeping that is safe to run against a live store.
//!
//! Checkpoint and statistics refresh are best-effort: the plain methods log
//! failures and carry on, the `try_` variants return them. Snapshot export is
//! user-initiated, so its errors always reach the caller.

use super::Database;
use crate::error::StoreError;
use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};

/// Result row of `PRAGMA wal_checkpoint(TRUNCATE)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckpointOutcome {
    /// A reader or writer prevented the checkpoint from completing.
    pub busy: bool,
    /// Frames in the WAL when the checkpoint ran (-1 if not in WAL mode).
    pub log_frames: i64,
    pub checkpointed_frames: i64,
}

impl Database {
    /// Fold the WAL into the main file and truncate the log.
    pub async fn try_checkpoint_and_truncate(&self) -> Result<CheckpointOutcome, StoreError> {
        let (busy, log_frames, checkpointed_frames): (i64, i64, i64) =
            sqlx::query_as("PRAGMA wal_checkpoint(TRUNCATE)")
                .fetch_one(self.pool())
                .await
                .map_err(|e| StoreError::Maintenance(format!("wal_checkpoint failed: {}", e)))?;

        Ok(CheckpointOutcome {
            busy: busy != 0,
            log_frames,
            checkpointed_frames,
        })
    }

    /// Best-effort [`try_checkpoint_and_truncate`](Self::try_checkpoint_and_truncate).
    /// Returns `None` if the checkpoint failed; the error is logged.
    pub async fn checkpoint_and_truncate(&self) -> Option<CheckpointOutcome> {
        match self.try_checkpoint_and_truncate().await {
            Ok(outcome) => {
                if outcome.busy {
                    warn!(
                        log_frames = outcome.log_frames,
                        checkpointed_frames = outcome.checkpointed_frames,
                        "WAL checkpoint could not complete, store was busy"
                    );
                } else {
                    info!(
                        log_frames = outcome.log_frames,
                        checkpointed_frames = outcome.checkpointed_frames,
                        "WAL checkpoint(TRUNCATE) completed"
                    );
                }
                Some(outcome)
            }
            Err(e) => {
                error!(error = %e, "WAL checkpoint failed");
                None
            }
        }
    }

    /// Recompute query planner statistics.
    pub async fn try_refresh_statistics(&self) -> Result<(), StoreError> {
        sqlx::query("ANALYZE")
            .execute(self.pool())
            .await
            .map_err(|e| StoreError::Maintenance(format!("ANALYZE failed: {}", e)))?;
        Ok(())
    }

    /// Best-effort [`try_refresh_statistics`](Self::try_refresh_statistics).
    /// Returns whether the refresh succeeded.
    pub async fn refresh_statistics(&self) -> bool {
        match self.try_refresh_statistics().await {
            Ok(()) => {
                info!("Query planner statistics refreshed");
                true
            }
            Err(e) => {
                error!(error = %e, "Statistics refresh failed");
                false
            }
        }
    }

    /// Write a consistent point-in-time copy of the store to `destination`.
    ///
    /// # Errors
    /// Returns `StoreError::Export` if `destination` already exists, is not
    /// valid UTF-8, or SQLite cannot write it.
    pub async fn export_snapshot(&self, destination: impl AsRef<Path>) -> Result<(), StoreError> {
        let destination = destination.as_ref();
        if destination.exists() {
            return Err(StoreError::export(destination, "destination already exists"));
        }
        let target = destination
            .to_str()
            .ok_or_else(|| StoreError::export(destination, "path is not valid UTF-8"))?;

        sqlx::query("VACUUM INTO ?")
            .bind(target)
            .execute(self.pool())
            .await
            .map_err(|e| StoreError::export(destination, e.to_string()))?;

        info!("Snapshot exported to {}", destination.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, PragmaSettings};
    use crate::error::StoreError;
    use tempfile::TempDir;

    async fn setup_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::initialize(temp_dir.path().join("test.db"), PragmaSettings::default())
            .await
            .expect("initialize failed");
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_checkpoint_on_idle_store() {
        let (db, _temp) = setup_db().await;
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(db.pool())
            .await
            .unwrap();

        let outcome = db.checkpoint_and_truncate().await.expect("checkpoint failed");
        assert!(!outcome.busy);
        assert_eq!(outcome.log_frames, outcome.checkpointed_frames);
    }

    #[tokio::test]
    async fn test_refresh_statistics() {
        let (db, _temp) = setup_db().await;
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("CREATE INDEX t_x ON t (x)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO t (x) VALUES (1), (2), (3)")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(db.refresh_statistics().await);
        let stat: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sqlite_stat1")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(stat.0 > 0);
    }

    #[tokio::test]
    async fn test_export_refuses_existing_destination() {
        let (db, temp) = setup_db().await;
        let dest = temp.path().join("exists.db");
        std::fs::write(&dest, b"occupied").unwrap();

        match db.export_snapshot(&dest).await {
            Err(StoreError::Export { path, reason }) => {
                assert_eq!(path, dest);
                assert!(reason.contains("already exists"));
            }
            other => panic!("Expected Export error, got {:?}", other),
        }
        assert_eq!(std::fs::read(&dest).unwrap(), b"occupied");
    }

    #[tokio::test]
    async fn test_export_into_missing_directory_fails() {
        let (db, temp) = setup_db().await;
        let dest = temp.path().join("no_such_dir").join("snap.db");
        assert!(matches!(
            db.export_snapshot(&dest).await,
            Err(StoreError::Export { .. })
        ));
    }
}
