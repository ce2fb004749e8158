//! Database access layer implementing the repository pattern.
//!
//! The repositories translate between domain models and the Postgres
//! schema. All SQL lives here; the engine crates only see domain types and
//! the error taxonomy. Every repository is safe for concurrent calls from
//! the worker task and publisher tasks sharing the pool.

use std::sync::Arc;

use sqlx::PgPool;

pub mod dlq;
pub mod messages;
pub mod queue;
pub mod subscribers;
pub mod subscriptions;
pub mod topics;

use crate::error::Result;

/// Container for all repository instances providing unified database access.
#[derive(Clone)]
pub struct Storage {
    /// Repository for topic routing keys.
    pub topics: Arc<topics::Repository>,

    /// Repository for subscriber webhook configuration.
    pub subscribers: Arc<subscribers::Repository>,

    /// Repository for topic subscriptions.
    pub subscriptions: Arc<subscriptions::Repository>,

    /// Repository for published messages.
    pub messages: Arc<messages::Repository>,

    /// Repository for delivery queue items.
    pub queue: Arc<queue::Repository>,

    /// Repository for dead letter entries.
    pub dlq: Arc<dlq::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            topics: Arc::new(topics::Repository::new(pool.clone())),
            subscribers: Arc::new(subscribers::Repository::new(pool.clone())),
            subscriptions: Arc::new(subscriptions::Repository::new(pool.clone())),
            messages: Arc::new(messages::Repository::new(pool.clone())),
            queue: Arc::new(queue::Repository::new(pool.clone())),
            dlq: Arc::new(dlq::Repository::new(pool)),
        }
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.queue.pool()).await?;

        Ok(())
    }
}
