//! Repository for published messages.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Message, MessageId},
};

/// Repository for message database operations.
///
/// Messages are immutable once created; `save` on an existing id exists only
/// for completeness of the store contract.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Loads a message by id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoData` if the message does not exist.
    pub async fn load(&self, id: MessageId) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            "SELECT id, topic_id, identifier, data, created_at FROM message WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        message.ok_or(CoreError::NoData)
    }

    /// Creates a new message (id 0) or updates an existing one.
    ///
    /// Returns the saved row with its store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or update fails.
    pub async fn save(&self, message: &Message) -> Result<Message> {
        if message.id.0 == 0 {
            let saved = sqlx::query_as::<_, Message>(
                r"
                INSERT INTO message (topic_id, identifier, data, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id, topic_id, identifier, data, created_at
                ",
            )
            .bind(message.topic_id)
            .bind(&message.identifier)
            .bind(&message.data)
            .bind(message.created_at)
            .fetch_one(&*self.pool)
            .await?;

            return Ok(saved);
        }

        let saved = sqlx::query_as::<_, Message>(
            r"
            UPDATE message
            SET topic_id = $1, identifier = $2, data = $3
            WHERE id = $4
            RETURNING id, topic_id, identifier, data, created_at
            ",
        )
        .bind(message.topic_id)
        .bind(&message.identifier)
        .bind(&message.data)
        .bind(message.id)
        .fetch_optional(&*self.pool)
        .await?;

        saved.ok_or(CoreError::NoData)
    }

    /// Permanently removes a message.
    ///
    /// Only for archival sweeps, never during normal operation.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, id: MessageId) -> Result<()> {
        sqlx::query("DELETE FROM message WHERE id = $1").bind(id).execute(&*self.pool).await?;

        Ok(())
    }

    /// Finds messages older than the given number of days.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_outdated(&self, days: i64) -> Result<Vec<Message>> {
        let cutoff = Utc::now() - chrono::Duration::days(days);

        let messages = sqlx::query_as::<_, Message>(
            r"
            SELECT id, topic_id, identifier, data, created_at FROM message
            WHERE created_at < $1
            ORDER BY created_at ASC
            ",
        )
        .bind(cutoff)
        .fetch_all(&*self.pool)
        .await?;

        Ok(messages)
    }
}
