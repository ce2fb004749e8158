//! Repository for delivery queue items.
//!
//! The queue table is the engine's hot path: the publisher inserts rows, the
//! worker polls and mutates them. The worker queries are backed by the
//! `(status, next_retry_at)` and `(expires_at, status)` indexes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{MessageId, QueueItem, QueueItemId, QueueStatus, SubscriptionId},
};

const QUEUE_COLUMNS: &str = "id, subscription_id, message_id, status, attempt_count, \
     last_attempt_at, next_retry_at, last_error, expires_at, sequence_number, \
     operation_timestamp, completed_at, created_at";

/// Repository for queue item database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Loads a queue item by id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoData` if the item does not exist.
    pub async fn load(&self, id: QueueItemId) -> Result<QueueItem> {
        let item = sqlx::query_as::<_, QueueItem>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM queue WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        item.ok_or(CoreError::NoData)
    }

    /// Creates a new queue item (id 0) or updates an existing one.
    ///
    /// On insert the store assigns the id and the monotonic per-subscription
    /// `sequence_number`. Returns the saved row.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or update fails.
    pub async fn save(&self, item: &QueueItem) -> Result<QueueItem> {
        if item.id.0 == 0 {
            let saved = sqlx::query_as::<_, QueueItem>(&format!(
                r"
                INSERT INTO queue (
                    subscription_id, message_id, status, attempt_count, last_attempt_at,
                    next_retry_at, last_error, expires_at, sequence_number,
                    operation_timestamp, completed_at, created_at
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8,
                    (SELECT COALESCE(MAX(sequence_number), 0) + 1
                       FROM queue WHERE subscription_id = $1),
                    $9, $10, $11
                )
                RETURNING {QUEUE_COLUMNS}
                "
            ))
            .bind(item.subscription_id)
            .bind(item.message_id)
            .bind(item.status)
            .bind(item.attempt_count)
            .bind(item.last_attempt_at)
            .bind(item.next_retry_at)
            .bind(&item.last_error)
            .bind(item.expires_at)
            .bind(item.operation_timestamp)
            .bind(item.completed_at)
            .bind(item.created_at)
            .fetch_one(&*self.pool)
            .await?;

            return Ok(saved);
        }

        let saved = sqlx::query_as::<_, QueueItem>(&format!(
            r"
            UPDATE queue
            SET status = $1,
                attempt_count = $2,
                last_attempt_at = $3,
                next_retry_at = $4,
                last_error = $5,
                operation_timestamp = $6,
                completed_at = $7
            WHERE id = $8
            RETURNING {QUEUE_COLUMNS}
            "
        ))
        .bind(item.status)
        .bind(item.attempt_count)
        .bind(item.last_attempt_at)
        .bind(item.next_retry_at)
        .bind(&item.last_error)
        .bind(item.operation_timestamp)
        .bind(item.completed_at)
        .bind(item.id)
        .fetch_optional(&*self.pool)
        .await?;

        saved.ok_or(CoreError::NoData)
    }

    /// Permanently removes a queue item.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, id: QueueItemId) -> Result<()> {
        sqlx::query("DELETE FROM queue WHERE id = $1").bind(id).execute(&*self.pool).await?;

        Ok(())
    }

    /// Finds the queue item for a specific message and subscription.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoData` if no matching row exists.
    pub async fn find_by_message(
        &self,
        subscription_id: SubscriptionId,
        message_id: MessageId,
    ) -> Result<QueueItem> {
        let item = sqlx::query_as::<_, QueueItem>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM queue WHERE subscription_id = $1 AND message_id = $2"
        ))
        .bind(subscription_id)
        .bind(message_id)
        .fetch_optional(&*self.pool)
        .await?;

        item.ok_or(CoreError::NoData)
    }

    /// Finds queue items ready for first-time delivery.
    ///
    /// Items with `status = pending` and `next_retry_at <= now`, ordered by
    /// `created_at` ascending (FIFO discovery).
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_pending(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let items = sqlx::query_as::<_, QueueItem>(&format!(
            r"
            SELECT {QUEUE_COLUMNS} FROM queue
            WHERE status = 'pending' AND next_retry_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            "
        ))
        .bind(Utc::now())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await?;

        Ok(items)
    }

    /// Finds failed queue items whose retry delay has elapsed.
    ///
    /// Items with `status = failed` and `next_retry_at <= now`, oldest
    /// failures first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_retryable(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let items = sqlx::query_as::<_, QueueItem>(&format!(
            r"
            SELECT {QUEUE_COLUMNS} FROM queue
            WHERE status = 'failed' AND next_retry_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            "
        ))
        .bind(Utc::now())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await?;

        Ok(items)
    }

    /// Finds queue items past their expiration deadline.
    ///
    /// Items with `expires_at <= now` that never reached `sent`, oldest
    /// expiry first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_expired(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let items = sqlx::query_as::<_, QueueItem>(&format!(
            r"
            SELECT {QUEUE_COLUMNS} FROM queue
            WHERE expires_at <= $1 AND status != 'sent'
            ORDER BY expires_at ASC
            LIMIT $2
            "
        ))
        .bind(Utc::now())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await?;

        Ok(items)
    }

    /// Narrow update of the retry schedule for out-of-band rescheduling.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn update_next_retry(
        &self,
        id: QueueItemId,
        next_retry_at: DateTime<Utc>,
        attempt_count: i32,
    ) -> Result<()> {
        sqlx::query("UPDATE queue SET next_retry_at = $1, attempt_count = $2 WHERE id = $3")
            .bind(next_retry_at)
            .bind(attempt_count)
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    /// Counts queue items in the given status.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_by_status(&self, status: QueueStatus) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queue WHERE status = $1")
            .bind(status)
            .fetch_one(&*self.pool)
            .await?;

        Ok(count.0)
    }
}
