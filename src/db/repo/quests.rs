//! Quest operations for the repository.

use super::{quest_from_row, Repository, QUEST_COLUMNS};
use crate::domain::{from_unix_secs, NewQuest, Quest, QuestFilter, QuestStatus, QuestUpdate};
use crate::error::StoreError;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

impl Repository {
    /// List quests matching every criterion set in `filter`, oldest first.
    pub async fn list_quests(&self, filter: &QuestFilter) -> Result<Vec<Quest>, StoreError> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM quests WHERE 1 = 1", QUEST_COLUMNS));

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            // SQLite LIKE is case-insensitive for ASCII.
            let pattern = format!("%{}%", escape_like(search));
            query
                .push(" AND (title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR description LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        query.push(" ORDER BY created_at ASC, rowid ASC");

        let rows = query.build().fetch_all(self.db.pool()).await?;
        Ok(rows.iter().map(quest_from_row).collect())
    }

    pub async fn get_quest(&self, id: &str) -> Result<Option<Quest>, StoreError> {
        let sql = format!("SELECT {} FROM quests WHERE id = ?", QUEST_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.as_ref().map(quest_from_row))
    }

    /// Insert a `pending` quest through the write queue.
    ///
    /// # Errors
    /// Returns `StoreError::JobExecution` if the insert fails, e.g. when
    /// `user_id` does not reference an existing user.
    pub async fn create_quest(&self, new_quest: NewQuest) -> Result<Quest, StoreError> {
        self.writer
            .submit(move |pool| async move {
                let now = from_unix_secs(Utc::now().timestamp());
                let quest = Quest {
                    id: Uuid::new_v4().to_string(),
                    title: new_quest.title,
                    description: new_quest.description,
                    status: QuestStatus::Pending,
                    user_id: new_quest.user_id,
                    created_at: now,
                    updated_at: now,
                };

                sqlx::query(
                    r#"
                    INSERT INTO quests (id, title, description, status, user_id, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&quest.id)
                .bind(&quest.title)
                .bind(&quest.description)
                .bind(quest.status.as_str())
                .bind(&quest.user_id)
                .bind(now.timestamp())
                .bind(now.timestamp())
                .execute(&pool)
                .await?;

                anyhow::Ok(quest)
            })
            .await
    }

    /// Apply a partial update and bump `updated_at`. Returns `None` if no
    /// quest has this id. An empty update leaves the row untouched.
    pub async fn update_quest(
        &self,
        id: &str,
        update: QuestUpdate,
    ) -> Result<Option<Quest>, StoreError> {
        if update.is_empty() {
            return self.get_quest(id).await;
        }

        let id = id.to_string();
        self.writer
            .submit(move |pool| async move {
                let sql = format!(
                    r#"
                    UPDATE quests
                    SET title = COALESCE(?, title),
                        description = COALESCE(?, description),
                        status = COALESCE(?, status),
                        updated_at = ?
                    WHERE id = ?
                    RETURNING {}
                    "#,
                    QUEST_COLUMNS
                );
                let row = sqlx::query(&sql)
                    .bind(update.title)
                    .bind(update.description)
                    .bind(update.status.map(|s| s.as_str()))
                    .bind(Utc::now().timestamp())
                    .bind(id)
                    .fetch_optional(&pool)
                    .await?;
                anyhow::Ok(row.as_ref().map(quest_from_row))
            })
            .await
    }

    /// Returns whether a row was removed.
    pub async fn delete_quest(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.writer
            .submit(move |pool| async move {
                let result = sqlx::query("DELETE FROM quests WHERE id = ?")
                    .bind(id)
                    .execute(&pool)
                    .await?;
                anyhow::Ok(result.rows_affected() > 0)
            })
            .await
    }
}

/// Escape LIKE wildcards so user input matches literally (escape char `\`).
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
