//! Publish fan-out and webhook delivery engine with reliability guarantees.
//!
//! Implements the pub/sub pipeline over the durable store: publishers write
//! a message and one pending queue item per matching active subscription; a
//! poll-based worker dispatches webhooks with exponential-backoff retries
//! and moves exhausted items to the dead letter queue.
//!
//! ```text
//!  Publisher ──► message + queue items (pending)
//!                          │
//!                          ▼
//!                ┌───────────────────┐
//!                │   durable store   │◄──── retry schedule updates
//!                └───────────────────┘
//!                          │ poll (batch)
//!                          ▼
//!                   DeliveryWorker ──► webhook gateway ──► subscriber
//!                          │
//!                          └──► DLQ after exhausted retries
//! ```
//!
//! Delivery is at-least-once: a retry or worker restart can duplicate a
//! dispatch, and nothing here deduplicates or orders deliveries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

pub mod envelope;
pub mod gateway;
pub mod notify;
pub mod publisher;
pub mod retry;
pub mod storage;
pub mod subscriptions;
pub mod worker;

pub use envelope::DeliveryEnvelope;
pub use gateway::{
    DeliveryGateway, GatewayConfig, SubscriberUrlProvider, UrlProvider, WebhookGateway,
};
pub use notify::{LogSink, NoOpSink, NotificationSink};
pub use publisher::{PublishRequest, PublishResult, Publisher};
pub use retry::RetryPolicy;
pub use storage::{
    DlqStore, MessageStore, PostgresStore, QueueStore, SubscriberStore, SubscriptionStore,
    TopicStore,
};
pub use subscriptions::{SubscribeRequest, SubscriptionManager};
pub use worker::{BatchStats, DeliveryConfig, DeliveryWorker};

/// Default number of queue items fetched per phase per tick.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default worker poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
