//! Publish pipeline: message persistence and queue fan-out.

use std::sync::Arc;

use tracing::{error, info, warn};
use wagon_core::{
    error::{CoreError, Result},
    models::{Message, MessageId, QueueItem, SubscriptionId},
    time::Clock,
};

use crate::storage::{MessageStore, QueueStore, SubscriptionStore, TopicStore};

/// A request to publish a message to a topic.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Topic code to publish to.
    pub topic_code: String,

    /// Message identifier used as the subscription filter key.
    pub identifier: String,

    /// Message payload, typically JSON.
    pub data: String,
}

/// Outcome of a publish operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    /// Id of the persisted message.
    pub message_id: MessageId,

    /// Number of queue items created.
    pub queue_items_created: usize,

    /// Subscriptions that received a queue item.
    pub subscription_ids: Vec<SubscriptionId>,
}

/// Publishes messages to topics and fans them out to active subscriptions.
///
/// Holds no mutable state; every publish call is independent. Concurrent
/// publishes are ordered only by the store's insertion order.
pub struct Publisher {
    topics: Arc<dyn TopicStore>,
    messages: Arc<dyn MessageStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    queue: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
}

impl Publisher {
    /// Creates a new publisher over the given stores.
    pub fn new(
        topics: Arc<dyn TopicStore>,
        messages: Arc<dyn MessageStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        queue: Arc<dyn QueueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { topics, messages, subscriptions, queue, clock }
    }

    /// Publishes a message and creates one queue item per matching active
    /// subscription.
    ///
    /// Zero matching subscriptions is not an error: the message is persisted
    /// and the result reports zero items. Per-item persistence failures are
    /// logged and skipped so the remaining subscriptions still get their
    /// queue items.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for empty inputs, an unknown topic
    /// code or an inactive topic, and `CoreError::Database` when the message
    /// itself cannot be persisted.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishResult> {
        if request.topic_code.is_empty() {
            return Err(CoreError::validation("topic code is required"));
        }
        if request.identifier.is_empty() {
            return Err(CoreError::validation("identifier is required"));
        }

        let topic = match self.topics.get_by_code(request.topic_code.clone()).await {
            Ok(topic) => topic,
            Err(err) if err.is_no_data() => {
                return Err(CoreError::validation(format!(
                    "topic not found: {}",
                    request.topic_code
                )));
            },
            Err(err) => return Err(err),
        };
        if !topic.is_active {
            return Err(CoreError::validation(format!(
                "topic is not active: {}",
                request.topic_code
            )));
        }

        let now = self.clock.now();
        let message = self
            .messages
            .save(Message::new(topic.id, request.identifier.clone(), request.data.clone(), now))
            .await?;

        info!(
            message_id = message.id.0,
            topic = %request.topic_code,
            identifier = %request.identifier,
            "message created"
        );

        // The store filters by identifier only; topic matching is ours.
        let candidates = match self.subscriptions.find_active(None, request.identifier.clone()).await
        {
            Ok(subscriptions) => subscriptions,
            Err(err) if err.is_no_data() => Vec::new(),
            Err(err) => return Err(err),
        };

        let matching: Vec<_> = candidates
            .into_iter()
            .filter(|subscription| subscription.topic_id == topic.id && subscription.is_active)
            .collect();

        if matching.is_empty() {
            warn!(
                topic = %request.topic_code,
                identifier = %request.identifier,
                "no active subscriptions matched the publish"
            );
            return Ok(PublishResult {
                message_id: message.id,
                queue_items_created: 0,
                subscription_ids: Vec::new(),
            });
        }

        let mut subscription_ids = Vec::with_capacity(matching.len());
        for subscription in matching {
            let item = QueueItem::new(subscription.id, message.id, now);
            match self.queue.save(item).await {
                Ok(_) => subscription_ids.push(subscription.id),
                Err(err) => {
                    error!(
                        subscription_id = subscription.id.0,
                        message_id = message.id.0,
                        error = %err,
                        "failed to create queue item"
                    );
                },
            }
        }

        info!(
            message_id = message.id.0,
            subscriptions = subscription_ids.len(),
            topic = %request.topic_code,
            identifier = %request.identifier,
            "message published"
        );

        Ok(PublishResult {
            message_id: message.id,
            queue_items_created: subscription_ids.len(),
            subscription_ids,
        })
    }

    /// Publishes a batch of messages.
    ///
    /// Per-request failures are logged and skipped; the returned results
    /// cover the requests that succeeded.
    pub async fn publish_batch(&self, requests: Vec<PublishRequest>) -> Vec<PublishResult> {
        let mut results = Vec::with_capacity(requests.len());

        for request in requests {
            let topic_code = request.topic_code.clone();
            let identifier = request.identifier.clone();
            match self.publish(request).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    error!(
                        topic = %topic_code,
                        identifier = %identifier,
                        error = %err,
                        "failed to publish message"
                    );
                },
            }
        }

        results
    }
}
