//! Store abstractions consumed by the publish and delivery pipelines.
//!
//! Each trait is the narrow slice of persistence one collaborator needs.
//! Production code goes through [`PostgresStore`], which delegates to the
//! repositories in `wagon-core`; tests use the in-memory doubles in
//! [`mock`] for deterministic behavior without a database.
//!
//! Unique lookups signal a missing row as `CoreError::NoData`. List queries
//! return empty vectors; callers additionally tolerate `NoData` as empty,
//! which keeps the worker independent of how a store backend chooses to
//! report zero rows.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use wagon_core::{
    error::Result,
    models::{
        DlqEntry, DlqStats, Message, MessageId, QueueItem, QueueItemId, Subscriber, SubscriberId,
        Subscription, SubscriptionId, Topic,
    },
    storage::Storage,
};

/// Persistence operations for delivery queue items.
pub trait QueueStore: Send + Sync + 'static {
    /// Loads a queue item by id. `NoData` if absent.
    fn load(&self, id: QueueItemId)
        -> Pin<Box<dyn Future<Output = Result<QueueItem>> + Send + '_>>;

    /// Creates (id 0) or updates a queue item, returning the saved row with
    /// store-assigned id and sequence number.
    fn save(&self, item: QueueItem)
        -> Pin<Box<dyn Future<Output = Result<QueueItem>> + Send + '_>>;

    /// Permanently removes a queue item.
    fn delete(&self, id: QueueItemId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Finds the queue item for a message/subscription pair. `NoData` if
    /// absent.
    fn find_by_message(
        &self,
        subscription_id: SubscriptionId,
        message_id: MessageId,
    ) -> Pin<Box<dyn Future<Output = Result<QueueItem>> + Send + '_>>;

    /// Pending items whose `next_retry_at` has passed, FIFO by creation.
    fn find_pending(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueItem>>> + Send + '_>>;

    /// Failed items whose retry delay has elapsed, FIFO by creation.
    fn find_retryable(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueItem>>> + Send + '_>>;

    /// Unsent items past their expiry deadline, oldest expiry first.
    fn find_expired(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueItem>>> + Send + '_>>;

    /// Narrow update of the retry schedule for out-of-band rescheduling.
    fn update_next_retry(
        &self,
        id: QueueItemId,
        next_retry_at: DateTime<Utc>,
        attempt_count: i32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Persistence operations for published messages.
pub trait MessageStore: Send + Sync + 'static {
    /// Loads a message by id. `NoData` if absent.
    fn load(&self, id: MessageId) -> Pin<Box<dyn Future<Output = Result<Message>> + Send + '_>>;

    /// Creates (id 0) or updates a message, returning the saved row.
    fn save(&self, message: Message)
        -> Pin<Box<dyn Future<Output = Result<Message>> + Send + '_>>;
}

/// Persistence operations for subscriptions.
pub trait SubscriptionStore: Send + Sync + 'static {
    /// Loads a subscription by id. `NoData` if absent.
    fn load(
        &self,
        id: SubscriptionId,
    ) -> Pin<Box<dyn Future<Output = Result<Subscription>> + Send + '_>>;

    /// Active subscriptions matching the identifier, optionally narrowed to
    /// one subscriber. Topic matching is the caller's concern.
    fn find_active(
        &self,
        subscriber_id: Option<SubscriberId>,
        identifier: String,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Subscription>>> + Send + '_>>;

    /// Creates (id 0) or updates a subscription, returning the saved row.
    fn save(
        &self,
        subscription: Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<Subscription>> + Send + '_>>;
}

/// Persistence operations for topics.
pub trait TopicStore: Send + Sync + 'static {
    /// Resolves a topic by its unique code. `NoData` if absent.
    fn get_by_code(&self, code: String)
        -> Pin<Box<dyn Future<Output = Result<Topic>> + Send + '_>>;
}

/// Persistence operations for subscribers.
pub trait SubscriberStore: Send + Sync + 'static {
    /// Loads a subscriber by id. `NoData` if absent.
    fn load(
        &self,
        id: SubscriberId,
    ) -> Pin<Box<dyn Future<Output = Result<Subscriber>> + Send + '_>>;
}

/// Persistence operations for the dead letter queue.
pub trait DlqStore: Send + Sync + 'static {
    /// Creates (id 0) or updates a DLQ entry, returning the saved row.
    fn save(&self, entry: DlqEntry)
        -> Pin<Box<dyn Future<Output = Result<DlqEntry>> + Send + '_>>;

    /// Unresolved entries, oldest first.
    fn find_unresolved(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DlqEntry>>> + Send + '_>>;

    /// Aggregate statistics for monitoring.
    fn stats(&self) -> Pin<Box<dyn Future<Output = Result<DlqStats>> + Send + '_>>;
}

/// Production store implementation delegating to the Postgres repositories.
#[derive(Clone)]
pub struct PostgresStore {
    storage: Arc<Storage>,
}

impl PostgresStore {
    /// Creates a new Postgres-backed store adapter.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl QueueStore for PostgresStore {
    fn load(
        &self,
        id: QueueItemId,
    ) -> Pin<Box<dyn Future<Output = Result<QueueItem>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.queue.load(id).await })
    }

    fn save(
        &self,
        item: QueueItem,
    ) -> Pin<Box<dyn Future<Output = Result<QueueItem>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.queue.save(&item).await })
    }

    fn delete(&self, id: QueueItemId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.queue.delete(id).await })
    }

    fn find_by_message(
        &self,
        subscription_id: SubscriptionId,
        message_id: MessageId,
    ) -> Pin<Box<dyn Future<Output = Result<QueueItem>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.queue.find_by_message(subscription_id, message_id).await })
    }

    fn find_pending(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueItem>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.queue.find_pending(limit).await })
    }

    fn find_retryable(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueItem>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.queue.find_retryable(limit).await })
    }

    fn find_expired(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueItem>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.queue.find_expired(limit).await })
    }

    fn update_next_retry(
        &self,
        id: QueueItemId,
        next_retry_at: DateTime<Utc>,
        attempt_count: i32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.queue.update_next_retry(id, next_retry_at, attempt_count).await
        })
    }
}

impl MessageStore for PostgresStore {
    fn load(&self, id: MessageId) -> Pin<Box<dyn Future<Output = Result<Message>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.messages.load(id).await })
    }

    fn save(
        &self,
        message: Message,
    ) -> Pin<Box<dyn Future<Output = Result<Message>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.messages.save(&message).await })
    }
}

impl SubscriptionStore for PostgresStore {
    fn load(
        &self,
        id: SubscriptionId,
    ) -> Pin<Box<dyn Future<Output = Result<Subscription>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.subscriptions.load(id).await })
    }

    fn find_active(
        &self,
        subscriber_id: Option<SubscriberId>,
        identifier: String,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Subscription>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.subscriptions.find_active(subscriber_id, &identifier).await
        })
    }

    fn save(
        &self,
        subscription: Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<Subscription>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.subscriptions.save(&subscription).await })
    }
}

impl TopicStore for PostgresStore {
    fn get_by_code(
        &self,
        code: String,
    ) -> Pin<Box<dyn Future<Output = Result<Topic>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.topics.get_by_code(&code).await })
    }
}

impl SubscriberStore for PostgresStore {
    fn load(
        &self,
        id: SubscriberId,
    ) -> Pin<Box<dyn Future<Output = Result<Subscriber>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.subscribers.load(id).await })
    }
}

impl DlqStore for PostgresStore {
    fn save(
        &self,
        entry: DlqEntry,
    ) -> Pin<Box<dyn Future<Output = Result<DlqEntry>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.dlq.save(&entry).await })
    }

    fn find_unresolved(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DlqEntry>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.dlq.find_unresolved(limit).await })
    }

    fn stats(&self) -> Pin<Box<dyn Future<Output = Result<DlqStats>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.dlq.stats().await })
    }
}

pub mod mock {
    //! In-memory store doubles for testing.
    //!
    //! One [`MemoryStore`] implements every store trait over shared hash
    //! maps, assigns ids and per-subscription sequence numbers the way the
    //! database would, and supports error injection for failure-path tests.
    //! Time-dependent queries read the injected clock, so tests drive
    //! eligibility by advancing a `TestClock`.

    use std::{
        collections::HashMap,
        future::Future,
        pin::Pin,
        sync::{
            atomic::{AtomicI64, Ordering},
            Arc,
        },
    };

    use chrono::{DateTime, Utc};
    use tokio::sync::RwLock;
    use wagon_core::{
        error::{CoreError, Result},
        models::{
            DlqEntry, DlqEntryId, DlqStats, Message, MessageId, QueueItem, QueueItemId,
            QueueStatus, Subscriber, SubscriberId, Subscription, SubscriptionId, Topic, TopicId,
        },
        time::Clock,
    };

    use super::{
        DlqStore, MessageStore, QueueStore, SubscriberStore, SubscriptionStore, TopicStore,
    };

    /// In-memory implementation of every store trait.
    pub struct MemoryStore {
        clock: Arc<dyn Clock>,
        next_id: AtomicI64,
        topics: Arc<RwLock<HashMap<i64, Topic>>>,
        subscribers: Arc<RwLock<HashMap<i64, Subscriber>>>,
        subscriptions: Arc<RwLock<HashMap<i64, Subscription>>>,
        messages: Arc<RwLock<HashMap<i64, Message>>>,
        queue: Arc<RwLock<HashMap<i64, QueueItem>>>,
        dlq: Arc<RwLock<HashMap<i64, DlqEntry>>>,
        queue_save_error: Arc<RwLock<Option<String>>>,
        queue_find_error: Arc<RwLock<Option<String>>>,
    }

    impl MemoryStore {
        /// Creates an empty store reading time from the given clock.
        pub fn new(clock: Arc<dyn Clock>) -> Self {
            Self {
                clock,
                next_id: AtomicI64::new(1),
                topics: Arc::new(RwLock::new(HashMap::new())),
                subscribers: Arc::new(RwLock::new(HashMap::new())),
                subscriptions: Arc::new(RwLock::new(HashMap::new())),
                messages: Arc::new(RwLock::new(HashMap::new())),
                queue: Arc::new(RwLock::new(HashMap::new())),
                dlq: Arc::new(RwLock::new(HashMap::new())),
                queue_save_error: Arc::new(RwLock::new(None)),
                queue_find_error: Arc::new(RwLock::new(None)),
            }
        }

        fn allocate_id(&self) -> i64 {
            self.next_id.fetch_add(1, Ordering::SeqCst)
        }

        /// Inserts a topic, assigning its id. Returns the stored row.
        pub async fn add_topic(&self, mut topic: Topic) -> Topic {
            if topic.id.0 == 0 {
                topic.id = TopicId(self.allocate_id());
            }
            self.topics.write().await.insert(topic.id.0, topic.clone());
            topic
        }

        /// Inserts a subscriber, assigning its id. Returns the stored row.
        pub async fn add_subscriber(&self, mut subscriber: Subscriber) -> Subscriber {
            if subscriber.id.0 == 0 {
                subscriber.id = SubscriberId(self.allocate_id());
            }
            self.subscribers.write().await.insert(subscriber.id.0, subscriber.clone());
            subscriber
        }

        /// Inserts a subscription, assigning its id. Returns the stored row.
        pub async fn add_subscription(&self, mut subscription: Subscription) -> Subscription {
            if subscription.id.0 == 0 {
                subscription.id = SubscriptionId(self.allocate_id());
            }
            self.subscriptions.write().await.insert(subscription.id.0, subscription.clone());
            subscription
        }

        /// Inserts a message, assigning its id. Returns the stored row.
        pub async fn add_message(&self, mut message: Message) -> Message {
            if message.id.0 == 0 {
                message.id = MessageId(self.allocate_id());
            }
            self.messages.write().await.insert(message.id.0, message.clone());
            message
        }

        /// Inserts a queue item the way `QueueStore::save` would.
        pub async fn add_queue_item(&self, item: QueueItem) -> QueueItem {
            QueueStore::save(self, item).await.expect("memory store insert cannot fail")
        }

        /// Snapshot of every stored message, ordered by id.
        pub async fn messages(&self) -> Vec<Message> {
            let mut messages: Vec<_> = self.messages.read().await.values().cloned().collect();
            messages.sort_by_key(|message| message.id.0);
            messages
        }

        /// Snapshot of every queue item, ordered by id.
        pub async fn queue_items(&self) -> Vec<QueueItem> {
            let mut items: Vec<_> = self.queue.read().await.values().cloned().collect();
            items.sort_by_key(|item| item.id.0);
            items
        }

        /// Looks up a single queue item.
        pub async fn queue_item(&self, id: QueueItemId) -> Option<QueueItem> {
            self.queue.read().await.get(&id.0).cloned()
        }

        /// Snapshot of every DLQ entry, ordered by id.
        pub async fn dlq_entries(&self) -> Vec<DlqEntry> {
            let mut entries: Vec<_> = self.dlq.read().await.values().cloned().collect();
            entries.sort_by_key(|entry| entry.id.0);
            entries
        }

        /// Fails the next `QueueStore::save` with a database error.
        pub async fn inject_queue_save_error(&self, error: impl Into<String>) {
            *self.queue_save_error.write().await = Some(error.into());
        }

        /// Fails the next pending/retryable/expired query with a database
        /// error.
        pub async fn inject_queue_find_error(&self, error: impl Into<String>) {
            *self.queue_find_error.write().await = Some(error.into());
        }

        async fn take_find_error(&self) -> Option<String> {
            self.queue_find_error.write().await.take()
        }

        fn sorted_limited(mut items: Vec<QueueItem>, limit: usize) -> Vec<QueueItem> {
            items.sort_by_key(|item| (item.created_at, item.id.0));
            items.truncate(limit);
            items
        }
    }

    impl QueueStore for MemoryStore {
        fn load(
            &self,
            id: QueueItemId,
        ) -> Pin<Box<dyn Future<Output = Result<QueueItem>> + Send + '_>> {
            let queue = self.queue.clone();
            Box::pin(async move { queue.read().await.get(&id.0).cloned().ok_or(CoreError::NoData) })
        }

        fn save(
            &self,
            mut item: QueueItem,
        ) -> Pin<Box<dyn Future<Output = Result<QueueItem>> + Send + '_>> {
            Box::pin(async move {
                if let Some(error) = self.queue_save_error.write().await.take() {
                    return Err(CoreError::Database(error));
                }

                let mut queue = self.queue.write().await;
                if item.id.0 == 0 {
                    item.id = QueueItemId(self.allocate_id());
                    item.sequence_number = queue
                        .values()
                        .filter(|existing| existing.subscription_id == item.subscription_id)
                        .map(|existing| existing.sequence_number)
                        .max()
                        .unwrap_or(0)
                        + 1;
                }
                queue.insert(item.id.0, item.clone());
                Ok(item)
            })
        }

        fn delete(
            &self,
            id: QueueItemId,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let queue = self.queue.clone();
            Box::pin(async move {
                queue.write().await.remove(&id.0);
                Ok(())
            })
        }

        fn find_by_message(
            &self,
            subscription_id: SubscriptionId,
            message_id: MessageId,
        ) -> Pin<Box<dyn Future<Output = Result<QueueItem>> + Send + '_>> {
            let queue = self.queue.clone();
            Box::pin(async move {
                queue
                    .read()
                    .await
                    .values()
                    .find(|item| {
                        item.subscription_id == subscription_id && item.message_id == message_id
                    })
                    .cloned()
                    .ok_or(CoreError::NoData)
            })
        }

        fn find_pending(
            &self,
            limit: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueItem>>> + Send + '_>> {
            Box::pin(async move {
                if let Some(error) = self.take_find_error().await {
                    return Err(CoreError::Database(error));
                }
                let now = self.clock.now();
                let items: Vec<_> = self
                    .queue
                    .read()
                    .await
                    .values()
                    .filter(|item| {
                        item.status == QueueStatus::Pending
                            && item.next_retry_at.is_some_and(|at| at <= now)
                    })
                    .cloned()
                    .collect();
                Ok(Self::sorted_limited(items, limit))
            })
        }

        fn find_retryable(
            &self,
            limit: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueItem>>> + Send + '_>> {
            Box::pin(async move {
                if let Some(error) = self.take_find_error().await {
                    return Err(CoreError::Database(error));
                }
                let now = self.clock.now();
                let items: Vec<_> = self
                    .queue
                    .read()
                    .await
                    .values()
                    .filter(|item| {
                        item.status == QueueStatus::Failed
                            && item.next_retry_at.is_some_and(|at| at <= now)
                    })
                    .cloned()
                    .collect();
                Ok(Self::sorted_limited(items, limit))
            })
        }

        fn find_expired(
            &self,
            limit: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<QueueItem>>> + Send + '_>> {
            Box::pin(async move {
                if let Some(error) = self.take_find_error().await {
                    return Err(CoreError::Database(error));
                }
                let now = self.clock.now();
                let mut items: Vec<_> = self
                    .queue
                    .read()
                    .await
                    .values()
                    .filter(|item| item.expires_at <= now && item.status != QueueStatus::Sent)
                    .cloned()
                    .collect();
                items.sort_by_key(|item| (item.expires_at, item.id.0));
                items.truncate(limit);
                Ok(items)
            })
        }

        fn update_next_retry(
            &self,
            id: QueueItemId,
            next_retry_at: DateTime<Utc>,
            attempt_count: i32,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let queue = self.queue.clone();
            Box::pin(async move {
                if let Some(item) = queue.write().await.get_mut(&id.0) {
                    item.next_retry_at = Some(next_retry_at);
                    item.attempt_count = attempt_count;
                }
                Ok(())
            })
        }
    }

    impl MessageStore for MemoryStore {
        fn load(
            &self,
            id: MessageId,
        ) -> Pin<Box<dyn Future<Output = Result<Message>> + Send + '_>> {
            let messages = self.messages.clone();
            Box::pin(async move {
                messages.read().await.get(&id.0).cloned().ok_or(CoreError::NoData)
            })
        }

        fn save(
            &self,
            mut message: Message,
        ) -> Pin<Box<dyn Future<Output = Result<Message>> + Send + '_>> {
            Box::pin(async move {
                if message.id.0 == 0 {
                    message.id = MessageId(self.allocate_id());
                }
                self.messages.write().await.insert(message.id.0, message.clone());
                Ok(message)
            })
        }
    }

    impl SubscriptionStore for MemoryStore {
        fn load(
            &self,
            id: SubscriptionId,
        ) -> Pin<Box<dyn Future<Output = Result<Subscription>> + Send + '_>> {
            let subscriptions = self.subscriptions.clone();
            Box::pin(async move {
                subscriptions.read().await.get(&id.0).cloned().ok_or(CoreError::NoData)
            })
        }

        fn find_active(
            &self,
            subscriber_id: Option<SubscriberId>,
            identifier: String,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Subscription>>> + Send + '_>> {
            let subscriptions = self.subscriptions.clone();
            Box::pin(async move {
                let mut matching: Vec<_> = subscriptions
                    .read()
                    .await
                    .values()
                    .filter(|sub| {
                        sub.is_active
                            && sub.identifier == identifier
                            && subscriber_id.is_none_or(|id| sub.subscriber_id == id)
                    })
                    .cloned()
                    .collect();
                matching.sort_by_key(|sub| sub.id.0);
                Ok(matching)
            })
        }

        fn save(
            &self,
            mut subscription: Subscription,
        ) -> Pin<Box<dyn Future<Output = Result<Subscription>> + Send + '_>> {
            Box::pin(async move {
                if subscription.id.0 == 0 {
                    subscription.id = SubscriptionId(self.allocate_id());
                }
                self.subscriptions.write().await.insert(subscription.id.0, subscription.clone());
                Ok(subscription)
            })
        }
    }

    impl TopicStore for MemoryStore {
        fn get_by_code(
            &self,
            code: String,
        ) -> Pin<Box<dyn Future<Output = Result<Topic>> + Send + '_>> {
            let topics = self.topics.clone();
            Box::pin(async move {
                topics
                    .read()
                    .await
                    .values()
                    .find(|topic| topic.code == code)
                    .cloned()
                    .ok_or(CoreError::NoData)
            })
        }
    }

    impl SubscriberStore for MemoryStore {
        fn load(
            &self,
            id: SubscriberId,
        ) -> Pin<Box<dyn Future<Output = Result<Subscriber>> + Send + '_>> {
            let subscribers = self.subscribers.clone();
            Box::pin(async move {
                subscribers.read().await.get(&id.0).cloned().ok_or(CoreError::NoData)
            })
        }
    }

    impl DlqStore for MemoryStore {
        fn save(
            &self,
            mut entry: DlqEntry,
        ) -> Pin<Box<dyn Future<Output = Result<DlqEntry>> + Send + '_>> {
            Box::pin(async move {
                if entry.id.0 == 0 {
                    entry.id = DlqEntryId(self.allocate_id());
                }
                self.dlq.write().await.insert(entry.id.0, entry.clone());
                Ok(entry)
            })
        }

        fn find_unresolved(
            &self,
            limit: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<DlqEntry>>> + Send + '_>> {
            let dlq = self.dlq.clone();
            Box::pin(async move {
                let mut entries: Vec<_> = dlq
                    .read()
                    .await
                    .values()
                    .filter(|entry| !entry.is_resolved)
                    .cloned()
                    .collect();
                entries.sort_by_key(|entry| (entry.created_at, entry.id.0));
                entries.truncate(limit);
                Ok(entries)
            })
        }

        fn stats(&self) -> Pin<Box<dyn Future<Output = Result<DlqStats>> + Send + '_>> {
            Box::pin(async move {
                let now = self.clock.now();
                let entries = self.dlq.read().await;

                let total = i64::try_from(entries.len()).unwrap_or(i64::MAX);
                let unresolved =
                    i64::try_from(entries.values().filter(|e| !e.is_resolved).count())
                        .unwrap_or(i64::MAX);

                let oldest = entries.values().map(|e| e.moved_to_dlq_at).min();
                let newest = entries.values().map(|e| e.moved_to_dlq_at).max();

                let mut reasons: HashMap<&str, usize> = HashMap::new();
                for entry in entries.values() {
                    *reasons.entry(entry.failure_reason.as_str()).or_default() += 1;
                }
                let top_failure_reason = reasons
                    .into_iter()
                    .max_by_key(|(_, count)| *count)
                    .map(|(reason, _)| reason.to_string());

                Ok(DlqStats {
                    total_items: total,
                    unresolved_items: unresolved,
                    resolved_items: total - unresolved,
                    oldest_item_age: oldest.map_or(0, |at| (now - at).num_seconds()),
                    newest_item_age: newest.map_or(0, |at| (now - at).num_seconds()),
                    top_failure_reason,
                    last_updated: now,
                })
            })
        }
    }
}
