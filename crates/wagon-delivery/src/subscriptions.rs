//! Subscription lifecycle management.
//!
//! High-level operations connecting subscribers to topics. Deactivation is
//! always a soft delete so the engine's audit trail survives churn.

use std::sync::Arc;

use tracing::{info, warn};
use wagon_core::{
    error::{CoreError, Result},
    models::{SubscriberId, Subscription, SubscriptionId},
    time::Clock,
};

use crate::{
    notify::NotificationSink,
    storage::{SubscriberStore, SubscriptionStore, TopicStore},
};

/// A request to create a new subscription.
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    /// Subscriber creating the subscription. Must exist.
    pub subscriber_id: SubscriberId,

    /// Topic code to subscribe to. Must exist.
    pub topic_code: String,

    /// Identifier filter for the subscription (e.g. `"user.created"`).
    pub identifier: String,
}

/// Manages subscription lifecycle for the pub/sub engine.
///
/// Safe for concurrent use; holds no mutable state.
pub struct SubscriptionManager {
    subscriptions: Arc<dyn SubscriptionStore>,
    subscribers: Arc<dyn SubscriberStore>,
    topics: Arc<dyn TopicStore>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionManager {
    /// Creates a new subscription manager over the given stores.
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        subscribers: Arc<dyn SubscriberStore>,
        topics: Arc<dyn TopicStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { subscriptions, subscribers, topics, sink, clock }
    }

    /// Creates a subscription connecting a subscriber to a topic.
    ///
    /// If an equivalent active subscription already exists it is returned
    /// as-is instead of creating a duplicate.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for empty inputs or unknown
    /// subscriber/topic references.
    pub async fn subscribe(&self, request: SubscribeRequest) -> Result<Subscription> {
        if request.subscriber_id.0 == 0 {
            return Err(CoreError::validation("subscriber ID is required"));
        }
        if request.topic_code.is_empty() {
            return Err(CoreError::validation("topic code is required"));
        }
        if request.identifier.is_empty() {
            return Err(CoreError::validation("identifier is required"));
        }

        if let Err(err) = self.subscribers.load(request.subscriber_id).await {
            if err.is_no_data() {
                return Err(CoreError::validation(format!(
                    "subscriber not found: {}",
                    request.subscriber_id
                )));
            }
            return Err(err);
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

        let existing = match self
            .subscriptions
            .find_active(Some(request.subscriber_id), request.identifier.clone())
            .await
        {
            Ok(subscriptions) => subscriptions,
            Err(err) if err.is_no_data() => Vec::new(),
            Err(err) => return Err(err),
        };
        if let Some(duplicate) =
            existing.into_iter().find(|sub| sub.topic_id == topic.id && sub.is_active)
        {
            warn!(
                subscriber_id = request.subscriber_id.0,
                topic = %request.topic_code,
                identifier = %request.identifier,
                "subscription already exists"
            );
            return Ok(duplicate);
        }

        let subscription = self
            .subscriptions
            .save(Subscription::new(
                request.subscriber_id,
                topic.id,
                request.identifier.clone(),
                self.clock.now(),
            ))
            .await?;

        info!(
            subscription_id = subscription.id.0,
            subscriber_id = request.subscriber_id.0,
            topic = %request.topic_code,
            identifier = %request.identifier,
            "subscription created"
        );

        if let Err(err) = self.sink.subscription_created(subscription.clone()).await {
            warn!(error = %err, "failed to send subscription creation notification");
        }

        Ok(subscription)
    }

    /// Deactivates a subscription (soft delete).
    ///
    /// Already-inactive subscriptions are returned unchanged without error.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the subscription does not exist.
    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) -> Result<Subscription> {
        let mut subscription = self.load_required(subscription_id).await?;

        if !subscription.is_active {
            warn!(subscription_id = subscription_id.0, "subscription already inactive");
            return Ok(subscription);
        }

        subscription.deactivate(self.clock.now());
        let subscription = self.subscriptions.save(subscription).await?;

        info!(subscription_id = subscription_id.0, "subscription deactivated");

        if let Err(err) = self.sink.subscription_deactivated(subscription.clone()).await {
            warn!(error = %err, "failed to send subscription deactivation notification");
        }

        Ok(subscription)
    }

    /// Re-enables a previously deactivated subscription.
    ///
    /// Already-active subscriptions are returned unchanged without error.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the subscription does not exist.
    pub async fn reactivate(&self, subscription_id: SubscriptionId) -> Result<Subscription> {
        let mut subscription = self.load_required(subscription_id).await?;

        if subscription.is_active {
            warn!(subscription_id = subscription_id.0, "subscription already active");
            return Ok(subscription);
        }

        subscription.reactivate();
        let subscription = self.subscriptions.save(subscription).await?;

        info!(subscription_id = subscription_id.0, "subscription reactivated");

        Ok(subscription)
    }

    /// Lists active subscriptions for a subscriber, filtered by identifier.
    ///
    /// Returns an empty vector when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for a missing subscriber id.
    pub async fn list_subscriptions(
        &self,
        subscriber_id: SubscriberId,
        identifier: String,
    ) -> Result<Vec<Subscription>> {
        if subscriber_id.0 == 0 {
            return Err(CoreError::validation("subscriber ID is required"));
        }

        match self.subscriptions.find_active(Some(subscriber_id), identifier).await {
            Ok(subscriptions) => Ok(subscriptions),
            Err(err) if err.is_no_data() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// Retrieves a single subscription by id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the subscription does not exist.
    pub async fn get_subscription(&self, subscription_id: SubscriptionId) -> Result<Subscription> {
        self.load_required(subscription_id).await
    }

    async fn load_required(&self, subscription_id: SubscriptionId) -> Result<Subscription> {
        match self.subscriptions.load(subscription_id).await {
            Ok(subscription) => Ok(subscription),
            Err(err) if err.is_no_data() => Err(CoreError::validation(format!(
                "subscription not found: {subscription_id}"
            ))),
            Err(err) => Err(err),
        }
    }
}
