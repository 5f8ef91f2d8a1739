//! User operations for the repository.

use super::{user_from_row, Repository, USER_COLUMNS};
use crate::domain::{from_unix_secs, NewUser, User, UserUpdate};
use crate::error::StoreError;
use chrono::Utc;
use uuid::Uuid;

impl Repository {
    /// List all users in creation order.
    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY created_at ASC, rowid ASC",
            USER_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(self.db.pool()).await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    /// Insert a user through the write queue.
    ///
    /// # Errors
    /// Returns `StoreError::JobExecution` if the insert fails, e.g. on a
    /// duplicate email.
    pub async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        self.writer
            .submit(move |pool| async move {
                // Stored with whole-second precision; match it in the result.
                let now = from_unix_secs(Utc::now().timestamp());
                let user = User {
                    id: Uuid::new_v4().to_string(),
                    name: new_user.name,
                    email: new_user.email,
                    created_at: now,
                    updated_at: now,
                };

                sqlx::query(
                    r#"
                    INSERT INTO users (id, name, email, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&user.id)
                .bind(&user.name)
                .bind(&user.email)
                .bind(now.timestamp())
                .bind(now.timestamp())
                .execute(&pool)
                .await?;

                anyhow::Ok(user)
            })
            .await
    }

    /// Apply a partial update. Returns `None` if no user has this id.
    pub async fn update_user(
        &self,
        id: &str,
        update: UserUpdate,
    ) -> Result<Option<User>, StoreError> {
        if update.is_empty() {
            return self.get_user(id).await;
        }

        let id = id.to_string();
        self.writer
            .submit(move |pool| async move {
                let sql = format!(
                    r#"
                    UPDATE users
                    SET name = COALESCE(?, name),
                        email = COALESCE(?, email),
                        updated_at = ?
                    WHERE id = ?
                    RETURNING {}
                    "#,
                    USER_COLUMNS
                );
                let row = sqlx::query(&sql)
                    .bind(update.name)
                    .bind(update.email)
                    .bind(Utc::now().timestamp())
                    .bind(id)
                    .fetch_optional(&pool)
                    .await?;
                anyhow::Ok(row.as_ref().map(user_from_row))
            })
            .await
    }

    /// Delete a user and, through the foreign key, their quests.
    /// Returns whether a row was removed.
    pub async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.writer
            .submit(move |pool| async move {
                let result = sqlx::query("DELETE FROM users WHERE id = ?")
                    .bind(id)
                    .execute(&pool)
                    .await?;
                anyhow::Ok(result.rows_affected() > 0)
            })
            .await
    }
}
