//! Batch worker draining the delivery queue.
//!
//! The worker polls the shared store on a fixed interval and runs three
//! phases per tick: pending items (first delivery), retryable items (failed
//! deliveries whose backoff elapsed), and expired-item cleanup. Phases are
//! independent: an error in one is logged and the next still runs.
//!
//! Partial failure is the norm here. An individual item failing never stops
//! the batch; a sink or logging failure never alters engine state; a DLQ
//! entry that was written but whose queue row could not be deleted is left
//! for the next run to retry the delete.
//!
//! One worker instance per store: there is no row-level claim, so a second
//! instance polling the same queue can dispatch the same item twice.
//! Deliveries are at-least-once either way; horizontal scaling needs a
//! claim mechanism this engine does not implement.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wagon_core::{
    error::{CoreError, Result},
    models::{DlqEntry, DlqStats, QueueItem},
    time::Clock,
};

use crate::{
    envelope::DeliveryEnvelope,
    gateway::{DeliveryGateway, UrlProvider},
    notify::NotificationSink,
    retry::RetryPolicy,
    storage::{DlqStore, MessageStore, QueueStore, SubscriptionStore},
};

/// Configuration for the delivery worker.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Maximum items fetched per phase per tick.
    pub batch_size: usize,

    /// How often the worker polls for ready items.
    pub poll_interval: Duration,

    /// Retry policy governing backoff and the DLQ threshold.
    pub retry_policy: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            poll_interval: crate::DEFAULT_POLL_INTERVAL,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Per-tick processing counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Pending items successfully delivered.
    pub pending: usize,

    /// Retried items successfully delivered.
    pub retried: usize,

    /// Expired items removed.
    pub expired: usize,
}

/// Background worker delivering queued messages to subscriber webhooks.
pub struct DeliveryWorker {
    queue: Arc<dyn QueueStore>,
    messages: Arc<dyn MessageStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    dlq: Arc<dyn DlqStore>,
    urls: Arc<dyn UrlProvider>,
    gateway: Arc<dyn DeliveryGateway>,
    sink: Arc<dyn NotificationSink>,
    config: DeliveryConfig,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl DeliveryWorker {
    /// Creates a new delivery worker.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` for an invalid configuration
    /// (zero batch size, zero attempt budget or DLQ threshold). Runtime code
    /// never sees configuration errors.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn QueueStore>,
        messages: Arc<dyn MessageStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        dlq: Arc<dyn DlqStore>,
        urls: Arc<dyn UrlProvider>,
        gateway: Arc<dyn DeliveryGateway>,
        sink: Arc<dyn NotificationSink>,
        config: DeliveryConfig,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(CoreError::configuration("batch size must be > 0"));
        }
        if config.retry_policy.max_attempts == 0 {
            return Err(CoreError::configuration("max attempts must be > 0"));
        }
        if config.retry_policy.dlq_threshold == 0 {
            return Err(CoreError::configuration("DLQ threshold must be > 0"));
        }

        Ok(Self {
            queue,
            messages,
            subscriptions,
            dlq,
            urls,
            gateway,
            sink,
            config,
            clock,
            cancel,
        })
    }

    /// Runs the worker loop until the cancellation token fires.
    ///
    /// One batch at a time; cancellation between ticks is immediate, and
    /// within a batch the worker stops before the next item.
    pub async fn run(&self) {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "queue worker started"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = self.clock.sleep(self.config.poll_interval) => {
                    self.process_batch().await;
                }
            }
        }

        info!("queue worker stopped");
    }

    /// Processes one batch: pending, then retryable, then expired cleanup.
    ///
    /// Phase errors are logged and do not abort the remaining phases.
    pub async fn process_batch(&self) -> BatchStats {
        let mut stats = BatchStats::default();

        match self.process_pending().await {
            Ok(count) => stats.pending = count,
            Err(err) => error!(error = %err, "error processing pending items"),
        }

        match self.process_retryable().await {
            Ok(count) => stats.retried = count,
            Err(err) => error!(error = %err, "error processing retryable items"),
        }

        match self.cleanup_expired().await {
            Ok(count) => stats.expired = count,
            Err(err) => error!(error = %err, "error cleaning up expired items"),
        }

        if stats.pending > 0 || stats.retried > 0 || stats.expired > 0 {
            info!(
                pending = stats.pending,
                retries = stats.retried,
                expired = stats.expired,
                "batch processed"
            );
        }

        stats
    }

    /// Processes pending items awaiting their first delivery attempt.
    ///
    /// Returns the number of successful deliveries. Individual item failures
    /// are logged and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns error only if the pending query itself fails.
    pub async fn process_pending(&self) -> Result<usize> {
        let items = match self.queue.find_pending(self.config.batch_size).await {
            Ok(items) => items,
            Err(err) if err.is_no_data() => return Ok(0),
            Err(err) => return Err(err),
        };

        self.process_items(items).await
    }

    /// Processes failed items whose retry delay has elapsed.
    ///
    /// Returns the number of successful deliveries. Individual item failures
    /// are logged and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns error only if the retryable query itself fails.
    pub async fn process_retryable(&self) -> Result<usize> {
        let items = match self.queue.find_retryable(self.config.batch_size).await {
            Ok(items) => items,
            Err(err) if err.is_no_data() => return Ok(0),
            Err(err) => return Err(err),
        };

        self.process_items(items).await
    }

    async fn process_items(&self, items: Vec<QueueItem>) -> Result<usize> {
        let mut processed = 0;
        for mut item in items {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.process_item(&mut item).await {
                Ok(true) => processed += 1,
                Ok(false) => {},
                Err(err) => {
                    error!(queue_id = item.id.0, error = %err, "failed to process queue item");
                },
            }
        }

        Ok(processed)
    }

    /// Runs one queue item through the delivery pipeline.
    ///
    /// Returns `Ok(true)` for a successful delivery and `Ok(false)` for an
    /// ineligible item (skipped without mutation). A failed dispatch
    /// schedules the retry or DLQ move, then surfaces the delivery error.
    ///
    /// # Errors
    ///
    /// Returns error if a required entity cannot be loaded, the callback URL
    /// cannot be resolved, or the dispatch fails.
    pub async fn process_item(&self, item: &mut QueueItem) -> Result<bool> {
        if let Err(denied) =
            item.can_attempt_delivery(self.config.retry_policy.max_attempts, self.clock.now())
        {
            debug!(
                queue_id = item.id.0,
                code = denied.code(),
                "cannot attempt delivery: {denied}"
            );
            return Ok(false);
        }

        // Item left unchanged on load failures: it stays eligible for the
        // next poll.
        let subscription = self.subscriptions.load(item.subscription_id).await?;
        let message = self.messages.load(item.message_id).await?;

        let envelope = DeliveryEnvelope::from_message(&message);
        let url = self.urls.callback_url_for(subscription.subscriber_id).await?;

        match self.gateway.deliver(url, envelope).await {
            Ok(()) => {
                self.handle_success(item).await;
                Ok(true)
            },
            Err(err) => {
                self.handle_failure(item, &err).await;
                Err(err)
            },
        }
    }

    async fn handle_success(&self, item: &mut QueueItem) {
        item.mark_sent(self.clock.now());

        match self.queue.save(item.clone()).await {
            Ok(saved) => *item = saved,
            Err(err) => {
                error!(queue_id = item.id.0, error = %err, "failed to mark queue item as sent");
                return;
            },
        }

        info!(
            message_id = item.message_id.0,
            queue_id = item.id.0,
            attempts = item.attempt_count,
            "message delivered"
        );
    }

    async fn handle_failure(&self, item: &mut QueueItem, delivery_err: &CoreError) {
        let attempt = u32::try_from(item.attempt_count + 1).unwrap_or(u32::MAX);
        let retry_after = self.config.retry_policy.delay_for(attempt);

        item.mark_failed(Some(&delivery_err.to_string()), retry_after, self.clock.now());

        match self.queue.save(item.clone()).await {
            Ok(saved) => *item = saved,
            Err(err) => {
                error!(queue_id = item.id.0, error = %err, "failed to update queue item after failure");
                return;
            },
        }

        if let Err(err) = self.sink.delivery_failed(item.clone(), delivery_err.to_string()).await {
            warn!(error = %err, "failed to send delivery failure notification");
        }

        if item.should_move_to_dlq(self.config.retry_policy.dlq_threshold) {
            warn!(
                queue_id = item.id.0,
                attempts = item.attempt_count,
                threshold = self.config.retry_policy.dlq_threshold,
                "moving queue item to DLQ"
            );

            if let Err(err) = self.move_to_dlq(item).await {
                error!(queue_id = item.id.0, error = %err, "failed to move queue item to DLQ");
            }
            return;
        }

        warn!(
            message_id = item.message_id.0,
            queue_id = item.id.0,
            attempts = item.attempt_count,
            retry_in_secs = retry_after.as_secs(),
            error = %delivery_err,
            "delivery failed, retry scheduled"
        );
    }

    /// Moves an exhausted queue item to the dead letter queue.
    ///
    /// The DLQ entry denormalizes the message payload and callback URL; if
    /// URL resolution fails the entry is still written with `"unknown"`.
    /// The queue-row delete is best-effort: a row that outlives its DLQ copy
    /// is rejected by the eligibility check and re-deleted later, which is
    /// preferred over losing the diagnostic.
    async fn move_to_dlq(&self, item: &QueueItem) -> Result<()> {
        let message = self.messages.load(item.message_id).await?;
        let subscription = self.subscriptions.load(item.subscription_id).await?;

        let callback_url = match self.urls.callback_url_for(subscription.subscriber_id).await {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "failed to resolve callback URL for DLQ entry");
                "unknown".to_string()
            },
        };

        let failure_reason = format!(
            "Max retry attempts exceeded ({} ≥ {})",
            item.attempt_count, self.config.retry_policy.dlq_threshold
        );

        let entry = DlqEntry::new(
            item.subscription_id,
            item.message_id,
            item.id,
            item.attempt_count,
            item.last_error.clone().unwrap_or_default(),
            failure_reason.clone(),
            item.created_at,
            // Unset when expiry raced retry scheduling and the item was
            // never attempted.
            item.last_attempt_at.unwrap_or(item.created_at),
            message.data,
            callback_url,
            self.clock.now(),
        );

        let entry = self.dlq.save(entry).await?;

        if let Err(err) = self.queue.delete(item.id).await {
            error!(
                queue_id = item.id.0,
                error = %err,
                "failed to delete queue item after moving to DLQ"
            );
        }

        info!(
            message_id = item.message_id.0,
            queue_id = item.id.0,
            dlq_id = entry.id.0,
            attempts = item.attempt_count,
            reason = %failure_reason,
            "moved message to DLQ"
        );

        if let Err(err) = self.sink.dlq_added(entry).await {
            warn!(error = %err, "failed to send DLQ notification");
        }

        Ok(())
    }

    /// Deletes queue items past their expiration deadline.
    ///
    /// Expired items are dropped silently by design: no DLQ record, no
    /// notification. Returns the number of deleted items.
    ///
    /// # Errors
    ///
    /// Returns error only if the expired query itself fails.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let items = match self.queue.find_expired(self.config.batch_size).await {
            Ok(items) => items,
            Err(err) if err.is_no_data() => return Ok(0),
            Err(err) => return Err(err),
        };

        let mut deleted = 0;
        for item in items {
            if let Err(err) = self.queue.delete(item.id).await {
                error!(queue_id = item.id.0, error = %err, "failed to delete expired queue item");
                continue;
            }
            deleted += 1;
        }

        if deleted > 0 {
            info!(count = deleted, "cleaned up expired queue items");
        }
        Ok(deleted)
    }

    /// Renders the retry schedule of the configured policy.
    pub fn retry_schedule(&self) -> String {
        self.config.retry_policy.describe_schedule()
    }

    /// Retrieves dead letter queue statistics for monitoring.
    ///
    /// # Errors
    ///
    /// Returns error if the stats query fails.
    pub async fn dlq_stats(&self) -> Result<DlqStats> {
        self.dlq.stats().await
    }
}
