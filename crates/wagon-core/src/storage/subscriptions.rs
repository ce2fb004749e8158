//! Repository for topic subscriptions.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{SubscriberId, Subscription, SubscriptionId},
};

const SUBSCRIPTION_COLUMNS: &str =
    "id, subscriber_id, topic_id, identifier, is_active, created_at, deleted_at";

/// Repository for subscription database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Loads a subscription by id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoData` if the subscription does not exist.
    pub async fn load(&self, id: SubscriptionId) -> Result<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscription WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        subscription.ok_or(CoreError::NoData)
    }

    /// Finds active subscriptions matching the identifier filter.
    ///
    /// The store filters by identifier and active flag only; topic matching
    /// happens in the publisher. Passing a subscriber narrows the search to
    /// that subscriber's subscriptions.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_active(
        &self,
        subscriber_id: Option<SubscriberId>,
        identifier: &str,
    ) -> Result<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, Subscription>(&format!(
            r"
            SELECT {SUBSCRIPTION_COLUMNS} FROM subscription
            WHERE is_active = TRUE
              AND identifier = $1
              AND ($2::BIGINT IS NULL OR subscriber_id = $2)
            ORDER BY created_at ASC
            "
        ))
        .bind(identifier)
        .bind(subscriber_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(subscriptions)
    }

    /// Creates a new subscription (id 0) or updates an existing one.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or update fails.
    pub async fn save(&self, subscription: &Subscription) -> Result<Subscription> {
        if subscription.id.0 == 0 {
            let saved = sqlx::query_as::<_, Subscription>(&format!(
                r"
                INSERT INTO subscription (
                    subscriber_id, topic_id, identifier, is_active, created_at, deleted_at
                ) VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {SUBSCRIPTION_COLUMNS}
                "
            ))
            .bind(subscription.subscriber_id)
            .bind(subscription.topic_id)
            .bind(&subscription.identifier)
            .bind(subscription.is_active)
            .bind(subscription.created_at)
            .bind(subscription.deleted_at)
            .fetch_one(&*self.pool)
            .await?;

            return Ok(saved);
        }

        let saved = sqlx::query_as::<_, Subscription>(&format!(
            r"
            UPDATE subscription
            SET subscriber_id = $1, topic_id = $2, identifier = $3,
                is_active = $4, deleted_at = $5
            WHERE id = $6
            RETURNING {SUBSCRIPTION_COLUMNS}
            "
        ))
        .bind(subscription.subscriber_id)
        .bind(subscription.topic_id)
        .bind(&subscription.identifier)
        .bind(subscription.is_active)
        .bind(subscription.deleted_at)
        .bind(subscription.id)
        .fetch_optional(&*self.pool)
        .await?;

        saved.ok_or(CoreError::NoData)
    }
}
