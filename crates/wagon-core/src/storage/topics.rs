//! Repository for topic routing keys.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Topic, TopicId},
};

/// Repository for topic database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Loads a topic by id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoData` if the topic does not exist.
    pub async fn load(&self, id: TopicId) -> Result<Topic> {
        let topic = sqlx::query_as::<_, Topic>(
            "SELECT id, code, name, description, is_active, created_at FROM topic WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        topic.ok_or(CoreError::NoData)
    }

    /// Resolves a topic by its unique code.
    ///
    /// This is the publish-time lookup.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NoData` if no topic carries the code.
    pub async fn get_by_code(&self, code: &str) -> Result<Topic> {
        let topic = sqlx::query_as::<_, Topic>(
            "SELECT id, code, name, description, is_active, created_at FROM topic WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&*self.pool)
        .await?;

        topic.ok_or(CoreError::NoData)
    }

    /// Creates a new topic (id 0) or updates an existing one.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or update fails.
    pub async fn save(&self, topic: &Topic) -> Result<Topic> {
        if topic.id.0 == 0 {
            let saved = sqlx::query_as::<_, Topic>(
                r"
                INSERT INTO topic (code, name, description, is_active, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, code, name, description, is_active, created_at
                ",
            )
            .bind(&topic.code)
            .bind(&topic.name)
            .bind(&topic.description)
            .bind(topic.is_active)
            .bind(topic.created_at)
            .fetch_one(&*self.pool)
            .await?;

            return Ok(saved);
        }

        let saved = sqlx::query_as::<_, Topic>(
            r"
            UPDATE topic
            SET code = $1, name = $2, description = $3, is_active = $4
            WHERE id = $5
            RETURNING id, code, name, description, is_active, created_at
            ",
        )
        .bind(&topic.code)
        .bind(&topic.name)
        .bind(&topic.description)
        .bind(topic.is_active)
        .bind(topic.id)
        .fetch_optional(&*self.pool)
        .await?;

        saved.ok_or(CoreError::NoData)
    }
}
