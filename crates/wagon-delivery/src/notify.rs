//! Best-effort notification hooks for engine events.
//!
//! Sinks never alter engine state and their failures never propagate: the
//! caller logs and moves on. Use [`NoOpSink`] when notifications are not
//! wanted, or [`LogSink`] to surface them through tracing.

use std::{future::Future, pin::Pin};

use tracing::{info, warn};
use wagon_core::{
    error::Result,
    models::{DlqEntry, QueueItem, Subscription},
};

/// Receiver for engine lifecycle notifications.
///
/// Implementations might page an operator, post to chat, or feed a metrics
/// pipeline. Every call is best-effort.
pub trait NotificationSink: Send + Sync + 'static {
    /// Called when a queue item is moved to the dead letter queue.
    fn dlq_added(&self, entry: DlqEntry) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Called on every failed delivery attempt, before any DLQ move.
    fn delivery_failed(
        &self,
        item: QueueItem,
        error: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Called when a new subscription is created.
    fn subscription_created(
        &self,
        subscription: Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Called when a subscription is deactivated.
    fn subscription_deactivated(
        &self,
        subscription: Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Sink that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl NotificationSink for NoOpSink {
    fn dlq_added(&self, _entry: DlqEntry) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn delivery_failed(
        &self,
        _item: QueueItem,
        _error: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn subscription_created(
        &self,
        _subscription: Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn subscription_deactivated(
        &self,
        _subscription: Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Sink that logs every notification through tracing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn dlq_added(&self, entry: DlqEntry) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            warn!(
                message_id = entry.message_id.0,
                subscription_id = entry.subscription_id.0,
                attempts = entry.attempt_count,
                reason = %entry.failure_reason,
                "message moved to DLQ"
            );
            Ok(())
        })
    }

    fn delivery_failed(
        &self,
        item: QueueItem,
        error: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            warn!(
                queue_id = item.id.0,
                message_id = item.message_id.0,
                attempt = item.attempt_count,
                error = %error,
                "delivery failed"
            );
            Ok(())
        })
    }

    fn subscription_created(
        &self,
        subscription: Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            info!(
                subscription_id = subscription.id.0,
                subscriber_id = subscription.subscriber_id.0,
                topic_id = subscription.topic_id.0,
                identifier = %subscription.identifier,
                "subscription created"
            );
            Ok(())
        })
    }

    fn subscription_deactivated(
        &self,
        subscription: Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            info!(
                subscription_id = subscription.id.0,
                subscriber_id = subscription.subscriber_id.0,
                "subscription deactivated"
            );
            Ok(())
        })
    }
}
