//! Repository for dead letter entries.
//!
//! Entries are written by the worker's DLQ transition and read by operators.
//! Nothing here deletes automatically; removal is always a manual act.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{DlqEntry, DlqEntryId, DlqStats, MessageId, SubscriptionId},
};

const DLQ_COLUMNS: &str = "id, subscription_id, message_id, original_queue_id, attempt_count, \
     last_error, failure_reason, first_attempt_at, last_attempt_at, moved_to_dlq_at, \
     message_data, callback_url, is_resolved, resolved_at, resolved_by, resolution_note, \
     created_at";

/// Repository for dead letter queue database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Loads a DLQ entry by id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoData` if the entry does not exist.
    pub async fn load(&self, id: DlqEntryId) -> Result<DlqEntry> {
        let entry = sqlx::query_as::<_, DlqEntry>(&format!(
            "SELECT {DLQ_COLUMNS} FROM dlq WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        entry.ok_or(CoreError::NoData)
    }

    /// Creates a new DLQ entry (id 0) or updates an existing one.
    ///
    /// Updates only touch the resolution lifecycle; failure diagnostics are
    /// immutable once written.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or update fails.
    pub async fn save(&self, entry: &DlqEntry) -> Result<DlqEntry> {
        if entry.id.0 == 0 {
            let saved = sqlx::query_as::<_, DlqEntry>(&format!(
                r"
                INSERT INTO dlq (
                    subscription_id, message_id, original_queue_id, attempt_count,
                    last_error, failure_reason, first_attempt_at, last_attempt_at,
                    moved_to_dlq_at, message_data, callback_url, is_resolved,
                    resolved_at, resolved_by, resolution_note, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                RETURNING {DLQ_COLUMNS}
                "
            ))
            .bind(entry.subscription_id)
            .bind(entry.message_id)
            .bind(entry.original_queue_id)
            .bind(entry.attempt_count)
            .bind(&entry.last_error)
            .bind(&entry.failure_reason)
            .bind(entry.first_attempt_at)
            .bind(entry.last_attempt_at)
            .bind(entry.moved_to_dlq_at)
            .bind(&entry.message_data)
            .bind(&entry.callback_url)
            .bind(entry.is_resolved)
            .bind(entry.resolved_at)
            .bind(&entry.resolved_by)
            .bind(&entry.resolution_note)
            .bind(entry.created_at)
            .fetch_one(&*self.pool)
            .await?;

            return Ok(saved);
        }

        let saved = sqlx::query_as::<_, DlqEntry>(&format!(
            r"
            UPDATE dlq
            SET is_resolved = $1, resolved_at = $2, resolved_by = $3, resolution_note = $4
            WHERE id = $5
            RETURNING {DLQ_COLUMNS}
            "
        ))
        .bind(entry.is_resolved)
        .bind(entry.resolved_at)
        .bind(&entry.resolved_by)
        .bind(&entry.resolution_note)
        .bind(entry.id)
        .fetch_optional(&*self.pool)
        .await?;

        saved.ok_or(CoreError::NoData)
    }

    /// Permanently removes a DLQ entry after manual cleanup.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, id: DlqEntryId) -> Result<()> {
        sqlx::query("DELETE FROM dlq WHERE id = $1").bind(id).execute(&*self.pool).await?;

        Ok(())
    }

    /// Finds unresolved entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_unresolved(&self, limit: usize) -> Result<Vec<DlqEntry>> {
        let entries = sqlx::query_as::<_, DlqEntry>(&format!(
            r"
            SELECT {DLQ_COLUMNS} FROM dlq
            WHERE is_resolved = FALSE
            ORDER BY created_at ASC
            LIMIT $1
            "
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await?;

        Ok(entries)
    }

    /// Finds entries for a specific subscription, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_subscription(
        &self,
        subscription_id: SubscriptionId,
        limit: usize,
    ) -> Result<Vec<DlqEntry>> {
        let entries = sqlx::query_as::<_, DlqEntry>(&format!(
            r"
            SELECT {DLQ_COLUMNS} FROM dlq
            WHERE subscription_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "
        ))
        .bind(subscription_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await?;

        Ok(entries)
    }

    /// Finds the entry for a specific message.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoData` if no entry references the message.
    pub async fn find_by_message(&self, message_id: MessageId) -> Result<DlqEntry> {
        let entry = sqlx::query_as::<_, DlqEntry>(&format!(
            "SELECT {DLQ_COLUMNS} FROM dlq WHERE message_id = $1"
        ))
        .bind(message_id)
        .fetch_optional(&*self.pool)
        .await?;

        entry.ok_or(CoreError::NoData)
    }

    /// Finds entries that have sat in the DLQ longer than `threshold`.
    ///
    /// Surfaces stuck items that need operator attention.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_older_than(
        &self,
        threshold: Duration,
        limit: usize,
    ) -> Result<Vec<DlqEntry>> {
        let delta = chrono::Duration::from_std(threshold)
            .map_err(|e| CoreError::database(format!("threshold out of range: {e}")))?;
        let cutoff = Utc::now() - delta;

        let entries = sqlx::query_as::<_, DlqEntry>(&format!(
            r"
            SELECT {DLQ_COLUMNS} FROM dlq
            WHERE moved_to_dlq_at < $1
            ORDER BY moved_to_dlq_at ASC
            LIMIT $2
            "
        ))
        .bind(cutoff)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await?;

        Ok(entries)
    }

    /// Counts entries awaiting manual resolution.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_unresolved(&self) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM dlq WHERE is_resolved = FALSE")
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0)
    }

    /// Computes aggregate DLQ statistics for monitoring.
    ///
    /// # Errors
    ///
    /// Returns error if a query fails.
    pub async fn stats(&self) -> Result<DlqStats> {
        let (total, unresolved, resolved, oldest_age, newest_age): (
            i64,
            i64,
            i64,
            Option<i64>,
            Option<i64>,
        ) = sqlx::query_as(
            r"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE is_resolved = FALSE),
                   COUNT(*) FILTER (WHERE is_resolved = TRUE),
                   EXTRACT(EPOCH FROM (NOW() - MIN(moved_to_dlq_at)))::BIGINT,
                   EXTRACT(EPOCH FROM (NOW() - MAX(moved_to_dlq_at)))::BIGINT
            FROM dlq
            ",
        )
        .fetch_one(&*self.pool)
        .await?;

        let top_failure_reason: Option<String> = sqlx::query_scalar(
            r"
            SELECT failure_reason FROM dlq
            GROUP BY failure_reason
            ORDER BY COUNT(*) DESC
            LIMIT 1
            ",
        )
        .fetch_optional(&*self.pool)
        .await?;

        Ok(DlqStats {
            total_items: total,
            unresolved_items: unresolved,
            resolved_items: resolved,
            oldest_item_age: oldest_age.unwrap_or(0),
            newest_item_age: newest_age.unwrap_or(0),
            top_failure_reason,
            last_updated: Utc::now(),
        })
    }
}
