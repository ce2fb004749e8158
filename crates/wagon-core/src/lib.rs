//! Core domain types for the wagon pub/sub delivery engine.
//!
//! Provides the entity models, the error taxonomy, the clock abstraction and
//! the Postgres repository layer. The delivery crate builds the publish and
//! worker pipelines on top of these foundations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    DlqEntry, DlqEntryId, DlqStats, Message, MessageId, QueueError, QueueItem, QueueItemId,
    QueueStatus, Subscriber, SubscriberId, Subscription, SubscriptionId, Topic, TopicId,
};
pub use time::{Clock, RealClock};

#[cfg(any(test, feature = "test-util"))]
pub use time::TestClock;
