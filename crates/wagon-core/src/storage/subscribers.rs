//! Repository for subscriber webhook configuration.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Subscriber, SubscriberId},
};

/// Repository for subscriber database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Loads a subscriber by id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoData` if the subscriber does not exist.
    pub async fn load(&self, id: SubscriberId) -> Result<Subscriber> {
        let subscriber = sqlx::query_as::<_, Subscriber>(
            r"
            SELECT id, client_id, name, webhook_url, is_active, created_at
            FROM subscriber WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        subscriber.ok_or(CoreError::NoData)
    }

    /// Finds all subscribers registered for a client.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_client(&self, client_id: i64) -> Result<Vec<Subscriber>> {
        let subscribers = sqlx::query_as::<_, Subscriber>(
            r"
            SELECT id, client_id, name, webhook_url, is_active, created_at
            FROM subscriber WHERE client_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(client_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(subscribers)
    }

    /// Creates a new subscriber (id 0) or updates an existing one.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or update fails.
    pub async fn save(&self, subscriber: &Subscriber) -> Result<Subscriber> {
        if subscriber.id.0 == 0 {
            let saved = sqlx::query_as::<_, Subscriber>(
                r"
                INSERT INTO subscriber (client_id, name, webhook_url, is_active, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, client_id, name, webhook_url, is_active, created_at
                ",
            )
            .bind(subscriber.client_id)
            .bind(&subscriber.name)
            .bind(&subscriber.webhook_url)
            .bind(subscriber.is_active)
            .bind(subscriber.created_at)
            .fetch_one(&*self.pool)
            .await?;

            return Ok(saved);
        }

        let saved = sqlx::query_as::<_, Subscriber>(
            r"
            UPDATE subscriber
            SET client_id = $1, name = $2, webhook_url = $3, is_active = $4
            WHERE id = $5
            RETURNING id, client_id, name, webhook_url, is_active, created_at
            ",
        )
        .bind(subscriber.client_id)
        .bind(&subscriber.name)
        .bind(&subscriber.webhook_url)
        .bind(subscriber.is_active)
        .bind(subscriber.id)
        .fetch_optional(&*self.pool)
        .await?;

        saved.ok_or(CoreError::NoData)
    }
}
