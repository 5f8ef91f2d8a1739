//! Repository layer for database operations.
//!
//! Reads run directly against the pool. Every write is wrapped in a job and
//! handed to the [`WriteSerializer`], so writers never contend for the lock.
//! Methods are organized across submodules by table:
//! - `users.rs` - User operations
//! - `quests.rs` - Quest operations

mod quests;
mod users;

use crate::db::{Database, WriteSerializer};
use crate::domain::{from_unix_secs, Quest, QuestStatus, User};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

const USER_COLUMNS: &str = "id, name, email, created_at, updated_at";
const QUEST_COLUMNS: &str = "id, title, description, status, user_id, created_at, updated_at";

/// Repository for database operations.
#[derive(Clone)]
pub struct Repository {
    db: Database,
    writer: WriteSerializer,
}

impl Repository {
    /// Create a repository over the store handle and its write queue.
    pub fn new(db: Database, writer: WriteSerializer) -> Self {
        Repository { db, writer }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn writer(&self) -> &WriteSerializer {
        &self.writer
    }
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        created_at: from_unix_secs(row.get("created_at")),
        updated_at: from_unix_secs(row.get("updated_at")),
    }
}

fn quest_from_row(row: &SqliteRow) -> Quest {
    let id: String = row.get("id");
    let status_str: String = row.get("status");
    let status = status_str.parse::<QuestStatus>().unwrap_or_else(|e| {
        warn!(quest_id = %id, error = %e, "Unknown quest status, using pending");
        QuestStatus::Pending
    });

    Quest {
        id,
        title: row.get("title"),
        description: row.get("description"),
        status,
        user_id: row.get("user_id"),
        created_at: from_unix_secs(row.get("created_at")),
        updated_at: from_unix_secs(row.get("updated_at")),
    }
}
