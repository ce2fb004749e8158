//! Domain models and strongly-typed identifiers.
//!
//! Defines topics, subscribers, subscriptions, messages, queue items and
//! dead-letter entries, plus newtype id wrappers for compile-time type
//! safety. The queue item carries the delivery state machine; everything
//! else is data the pipeline routes around it.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed topic identifier.
///
/// Ids are assigned by the store on insert; `0` marks an unsaved entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct TopicId(pub i64);

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly-typed subscriber identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct SubscriberId(pub i64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly-typed subscription identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct SubscriptionId(pub i64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly-typed message identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly-typed queue item identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct QueueItemId(pub i64);

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly-typed dead-letter entry identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct DlqEntryId(pub i64);

impl fmt::Display for DlqEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Topic represents a message category for pub/sub routing.
///
/// A publish addresses a topic by its unique `code`; all active
/// subscriptions matching the topic and the message identifier receive a
/// queue item. Only active topics accept new messages.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Topic {
    /// Unique identifier for this topic.
    pub id: TopicId,

    /// Unique routing key (e.g. `"user.signup"`).
    pub code: String,

    /// Human-readable topic name.
    pub name: String,

    /// Purpose and usage details.
    pub description: String,

    /// Only active topics accept new messages.
    pub is_active: bool,

    /// When this topic was created.
    pub created_at: DateTime<Utc>,
}

impl Topic {
    /// Creates a new active topic. The id is assigned by the store on save.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TopicId(0),
            code: code.into(),
            name: name.into(),
            description: description.into(),
            is_active: true,
            created_at: now,
        }
    }
}

/// Subscriber represents a message consumer reachable over a webhook.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscriber {
    /// Unique identifier for this subscriber.
    pub id: SubscriberId,

    /// Owning client/tenant id.
    pub client_id: i64,

    /// Human-readable subscriber name.
    pub name: String,

    /// HTTP endpoint receiving deliveries for this subscriber.
    pub webhook_url: String,

    /// Only active subscribers receive messages.
    pub is_active: bool,

    /// When this subscriber was registered.
    pub created_at: DateTime<Utc>,
}

impl Subscriber {
    /// Creates a new active subscriber.
    pub fn new(
        client_id: i64,
        name: impl Into<String>,
        webhook_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SubscriberId(0),
            client_id,
            name: name.into(),
            webhook_url: webhook_url.into(),
            is_active: true,
            created_at: now,
        }
    }
}

/// Subscription connects a subscriber to a topic with an identifier filter.
///
/// A subscription matches a publish iff its topic and identifier both match
/// and it is active. Deactivation is a soft delete: the row is retained for
/// audit, stamped with `deleted_at`, and stops receiving new queue items.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    /// Unique identifier for this subscription.
    pub id: SubscriptionId,

    /// Subscriber that owns this subscription.
    pub subscriber_id: SubscriberId,

    /// Topic being subscribed to.
    pub topic_id: TopicId,

    /// Identifier filter (e.g. `"user.created"`).
    pub identifier: String,

    /// Active subscriptions receive new messages.
    pub is_active: bool,

    /// When this subscription was created.
    pub created_at: DateTime<Utc>,

    /// Soft-delete timestamp, set on deactivation.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Creates a new active subscription.
    pub fn new(
        subscriber_id: SubscriberId,
        topic_id: TopicId,
        identifier: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SubscriptionId(0),
            subscriber_id,
            topic_id,
            identifier: identifier.into(),
            is_active: true,
            created_at: now,
            deleted_at: None,
        }
    }

    /// Soft-deletes the subscription.
    ///
    /// Repeated calls refresh `deleted_at`; the subscription stays inactive.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.deleted_at = Some(now);
    }

    /// Re-enables a previously deactivated subscription.
    pub fn reactivate(&mut self) {
        self.is_active = true;
        self.deleted_at = None;
    }
}

/// Message is an immutable published payload.
///
/// Each publish creates one message and one queue item per matching active
/// subscription. Messages are retained for audit even after every delivery
/// settles.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: MessageId,

    /// Topic this message was published to.
    pub topic_id: TopicId,

    /// Routing/filter key (e.g. `"user.created"`).
    pub identifier: String,

    /// Opaque payload, typically JSON.
    pub data: String,

    /// Publication timestamp.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a new message for publication. Messages never mutate after
    /// creation.
    pub fn new(
        topic_id: TopicId,
        identifier: impl Into<String>,
        data: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId(0),
            topic_id,
            identifier: identifier.into(),
            data: data.into(),
            created_at: now,
        }
    }
}

/// Queue item lifecycle state.
///
/// ```text
/// pending -> sent    (terminal)
/// pending -> failed  -> sent (terminal)
///            failed  -> failed (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Awaiting the first delivery attempt.
    Pending,

    /// Successfully delivered. Terminal: never re-dispatched or mutated.
    Sent,

    /// Delivery failed; awaiting the scheduled retry.
    Failed,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl sqlx::Type<PgDb> for QueueStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for QueueStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid queue status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for QueueStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Rejection reasons returned by queue item business rules.
///
/// These are outcomes, not failures: the worker logs them at debug level and
/// skips the item without mutating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The item has passed its expiration time.
    #[error("queue item has expired")]
    Expired,

    /// The message was already successfully delivered.
    #[error("queue item already sent")]
    AlreadySent,

    /// The item reached the maximum delivery attempts.
    #[error("maximum delivery attempts exceeded")]
    MaxAttempts,

    /// The retry delay has not elapsed yet.
    #[error("not ready for retry yet")]
    NotReady,

    /// No retry time has been scheduled for this item.
    #[error("no retry scheduled")]
    NoRetry,
}

impl QueueError {
    /// Returns the machine-readable rejection code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Expired => "QUEUE_EXPIRED",
            Self::AlreadySent => "ALREADY_SENT",
            Self::MaxAttempts => "MAX_ATTEMPTS",
            Self::NotReady => "NOT_READY",
            Self::NoRetry => "NO_RETRY",
        }
    }
}

/// Default time-to-live for a queue item.
pub const QUEUE_ITEM_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// QueueItem tracks one delivery of one message to one subscription.
///
/// Created by the publisher in `pending` with `next_retry_at = now` so it is
/// immediately eligible. The worker mutates it on each dispatch outcome and
/// removes it when it moves to the DLQ or expires.
///
/// All time-dependent operations take `now` explicitly so callers control
/// the clock.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueItem {
    /// Unique identifier for this queue item.
    pub id: QueueItemId,

    /// Subscription this delivery targets.
    pub subscription_id: SubscriptionId,

    /// Message being delivered.
    pub message_id: MessageId,

    /// Current lifecycle state.
    pub status: QueueStatus,

    /// Number of failed delivery attempts. Never decreases.
    pub attempt_count: i32,

    /// Timestamp of the most recent delivery attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// When the next delivery attempt becomes eligible.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,

    /// Hard deadline: past this instant the item is swept, not delivered.
    pub expires_at: DateTime<Utc>,

    /// Monotonic per-subscription ordinal, assigned by the store on insert.
    pub sequence_number: i64,

    /// Timestamp of the last state-changing operation.
    pub operation_timestamp: DateTime<Utc>,

    /// When the item was successfully delivered.
    pub completed_at: Option<DateTime<Utc>>,

    /// When the item was created.
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    /// Creates a new queue item for message delivery.
    ///
    /// Initial state: `pending`, zero attempts, `next_retry_at = now`
    /// (eligible immediately), expiry 24h out.
    pub fn new(subscription_id: SubscriptionId, message_id: MessageId, now: DateTime<Utc>) -> Self {
        let ttl = chrono::Duration::from_std(QUEUE_ITEM_TTL)
            .unwrap_or_else(|_| chrono::Duration::hours(24));

        Self {
            id: QueueItemId(0),
            subscription_id,
            message_id,
            status: QueueStatus::Pending,
            attempt_count: 0,
            last_attempt_at: None,
            next_retry_at: Some(now),
            last_error: None,
            expires_at: now + ttl,
            sequence_number: 0,
            operation_timestamp: now,
            completed_at: None,
            created_at: now,
        }
    }

    /// Marks the item failed and schedules the next retry.
    ///
    /// Increments the attempt counter, stamps `last_attempt_at`, and sets
    /// `next_retry_at = now + retry_after`. A `None` error clears
    /// `last_error` so diagnostics always describe the latest attempt.
    pub fn mark_failed(&mut self, error: Option<&str>, retry_after: Duration, now: DateTime<Utc>) {
        let delay = chrono::Duration::from_std(retry_after).unwrap_or(chrono::TimeDelta::MAX);

        self.status = QueueStatus::Failed;
        self.attempt_count += 1;
        self.last_attempt_at = Some(now);
        self.next_retry_at = Some(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC));
        self.last_error = error.map(str::to_owned);
        self.operation_timestamp = now;
    }

    /// Marks the item successfully delivered.
    ///
    /// Stamps `last_attempt_at` and `completed_at`. The attempt counter is
    /// not incremented: it counts failures, and the successful dispatch is
    /// not one.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.status = QueueStatus::Sent;
        self.last_attempt_at = Some(now);
        self.completed_at = Some(now);
        self.operation_timestamp = now;
    }

    /// Returns true if the item has passed its expiration time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Returns true if a failed item is ready for its next retry.
    ///
    /// Uses strict `>`: at exactly `next_retry_at` the item is not ready.
    pub fn should_retry(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Failed
            && self.next_retry_at.is_some_and(|retry_at| now > retry_at)
    }

    /// Validates whether a delivery can be attempted.
    ///
    /// The check order is part of the contract: expiry overrides sent,
    /// which overrides the attempt limit, which overrides retry timing.
    pub fn can_attempt_delivery(
        &self,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        if self.is_expired(now) {
            return Err(QueueError::Expired);
        }
        if self.status == QueueStatus::Sent {
            return Err(QueueError::AlreadySent);
        }
        if i64::from(self.attempt_count) >= i64::from(max_attempts) {
            return Err(QueueError::MaxAttempts);
        }
        if self.status == QueueStatus::Failed && !self.should_retry(now) {
            return Err(QueueError::NotReady);
        }
        Ok(())
    }

    /// Returns true if the item exhausted its retry budget and belongs in
    /// the dead letter queue.
    pub fn should_move_to_dlq(&self, dlq_threshold: u32) -> bool {
        self.status == QueueStatus::Failed
            && i64::from(self.attempt_count) >= i64::from(dlq_threshold)
    }

    /// Returns the time remaining until the next retry attempt.
    ///
    /// Zero if the item is ready now; [`QueueError::NoRetry`] if no retry is
    /// scheduled.
    pub fn time_until_retry(&self, now: DateTime<Utc>) -> Result<Duration, QueueError> {
        let retry_at = self.next_retry_at.ok_or(QueueError::NoRetry)?;
        if now >= retry_at {
            return Ok(Duration::ZERO);
        }
        Ok((retry_at - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Returns how long the item has existed since creation.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Dead letter entry: a permanently failed delivery retained for operators.
///
/// Message payload and callback URL are denormalized at transition time so
/// the entry stays meaningful after the queue row is deleted and the
/// subscriber is reconfigured. Entries are never deleted automatically; they
/// remain until manually resolved or removed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DlqEntry {
    /// Unique identifier for this entry.
    pub id: DlqEntryId,

    /// Subscription the failed delivery targeted.
    pub subscription_id: SubscriptionId,

    /// Message that could not be delivered.
    pub message_id: MessageId,

    /// Id of the queue item this entry replaced.
    pub original_queue_id: QueueItemId,

    /// Total failed attempts before the move.
    pub attempt_count: i32,

    /// Error message from the final attempt.
    pub last_error: String,

    /// Human-readable reason for the move.
    pub failure_reason: String,

    /// When the first delivery was attempted (the queue item's creation).
    pub first_attempt_at: DateTime<Utc>,

    /// When the last attempt failed.
    pub last_attempt_at: DateTime<Utc>,

    /// When the item was moved to the DLQ.
    pub moved_to_dlq_at: DateTime<Utc>,

    /// Denormalized message payload.
    pub message_data: String,

    /// Denormalized target webhook URL.
    pub callback_url: String,

    /// Manual resolution flag.
    pub is_resolved: bool,

    /// When the entry was resolved.
    pub resolved_at: Option<DateTime<Utc>>,

    /// Operator or system that resolved the entry.
    pub resolved_by: Option<String>,

    /// Explanation of the resolution action.
    pub resolution_note: Option<String>,

    /// When this row was created.
    pub created_at: DateTime<Utc>,
}

impl DlqEntry {
    /// Creates a dead letter entry from a failed queue item.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscription_id: SubscriptionId,
        message_id: MessageId,
        original_queue_id: QueueItemId,
        attempt_count: i32,
        last_error: impl Into<String>,
        failure_reason: impl Into<String>,
        first_attempt_at: DateTime<Utc>,
        last_attempt_at: DateTime<Utc>,
        message_data: impl Into<String>,
        callback_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DlqEntryId(0),
            subscription_id,
            message_id,
            original_queue_id,
            attempt_count,
            last_error: last_error.into(),
            failure_reason: failure_reason.into(),
            first_attempt_at,
            last_attempt_at,
            moved_to_dlq_at: now,
            message_data: message_data.into(),
            callback_url: callback_url.into(),
            is_resolved: false,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
            created_at: now,
        }
    }

    /// Marks the entry as manually resolved.
    ///
    /// Repeated calls overwrite the resolution fields without error.
    pub fn resolve(&mut self, resolved_by: impl Into<String>, note: impl Into<String>, now: DateTime<Utc>) {
        self.is_resolved = true;
        self.resolved_at = Some(now);
        self.resolved_by = Some(resolved_by.into());
        self.resolution_note = Some(note.into());
    }

    /// Returns how long the entry has been in the DLQ.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.moved_to_dlq_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns true if the entry has sat in the DLQ longer than `threshold`.
    pub fn is_old(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > threshold
    }
}

/// Aggregate dead letter queue statistics for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqStats {
    /// Total entries in the DLQ.
    pub total_items: i64,

    /// Entries awaiting manual resolution.
    pub unresolved_items: i64,

    /// Entries already resolved.
    pub resolved_items: i64,

    /// Age of the oldest entry, in seconds.
    pub oldest_item_age: i64,

    /// Age of the newest entry, in seconds.
    pub newest_item_age: i64,

    /// Most common failure reason, if any entries exist.
    pub top_failure_reason: Option<String>,

    /// When these statistics were computed.
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn new_queue_item_is_immediately_eligible() {
        let now = fixed_now();
        let item = QueueItem::new(SubscriptionId(1), MessageId(2), now);

        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.attempt_count, 0);
        assert_eq!(item.next_retry_at, Some(now));
        assert_eq!(item.expires_at, now + chrono::Duration::hours(24));
        assert!(item.can_attempt_delivery(10, now).is_ok());
    }

    #[test]
    fn mark_failed_schedules_retry_from_attempt_time() {
        let now = fixed_now();
        let mut item = QueueItem::new(SubscriptionId(1), MessageId(2), now);

        item.mark_failed(Some("500"), Duration::from_secs(60), now);

        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.attempt_count, 1);
        assert_eq!(item.last_attempt_at, Some(now));
        assert_eq!(item.next_retry_at, Some(now + chrono::Duration::seconds(60)));
        assert_eq!(item.last_error.as_deref(), Some("500"));
    }

    #[test]
    fn mark_failed_without_error_clears_last_error() {
        let now = fixed_now();
        let mut item = QueueItem::new(SubscriptionId(1), MessageId(2), now);

        item.mark_failed(Some("timeout"), Duration::from_secs(30), now);
        item.mark_failed(None, Duration::from_secs(60), now);

        assert_eq!(item.last_error, None);
        assert_eq!(item.attempt_count, 2);
    }

    #[test]
    fn mark_sent_does_not_touch_attempt_count() {
        let now = fixed_now();
        let mut item = QueueItem::new(SubscriptionId(1), MessageId(2), now);
        item.mark_failed(Some("503"), Duration::from_secs(30), now);

        let later = now + chrono::Duration::seconds(90);
        item.mark_sent(later);

        assert_eq!(item.status, QueueStatus::Sent);
        assert_eq!(item.attempt_count, 1);
        assert_eq!(item.last_attempt_at, Some(later));
        assert_eq!(item.completed_at, Some(later));
    }

    #[test]
    fn eligibility_check_order_is_fixed() {
        let now = fixed_now();

        // Expired wins over sent.
        let mut item = QueueItem::new(SubscriptionId(1), MessageId(2), now);
        item.mark_sent(now);
        let past_expiry = item.expires_at + chrono::Duration::seconds(1);
        assert_eq!(item.can_attempt_delivery(10, past_expiry), Err(QueueError::Expired));

        // Sent wins over the attempt limit.
        let mut item = QueueItem::new(SubscriptionId(1), MessageId(2), now);
        item.attempt_count = 99;
        item.mark_sent(now);
        assert_eq!(item.can_attempt_delivery(10, now), Err(QueueError::AlreadySent));

        // Attempt limit wins over retry timing.
        let mut item = QueueItem::new(SubscriptionId(1), MessageId(2), now);
        for _ in 0..10 {
            item.mark_failed(Some("500"), Duration::from_secs(3600), now);
        }
        assert_eq!(item.can_attempt_delivery(10, now), Err(QueueError::MaxAttempts));

        // Finally, a failed item before its retry time is not ready.
        let mut item = QueueItem::new(SubscriptionId(1), MessageId(2), now);
        item.mark_failed(Some("500"), Duration::from_secs(3600), now);
        assert_eq!(item.can_attempt_delivery(10, now), Err(QueueError::NotReady));
    }

    #[test]
    fn retry_timing_uses_strict_comparison() {
        let now = fixed_now();
        let mut item = QueueItem::new(SubscriptionId(1), MessageId(2), now);
        item.mark_failed(Some("500"), Duration::from_secs(60), now);

        let exactly_due = now + chrono::Duration::seconds(60);
        assert!(!item.should_retry(exactly_due));
        assert_eq!(item.can_attempt_delivery(10, exactly_due), Err(QueueError::NotReady));

        let past_due = exactly_due + chrono::Duration::seconds(1);
        assert!(item.should_retry(past_due));
        assert!(item.can_attempt_delivery(10, past_due).is_ok());
    }

    #[test]
    fn dlq_threshold_requires_failed_status() {
        let now = fixed_now();
        let mut item = QueueItem::new(SubscriptionId(1), MessageId(2), now);
        assert!(!item.should_move_to_dlq(5));

        for _ in 0..5 {
            item.mark_failed(Some("500"), Duration::from_secs(1), now);
        }
        assert!(item.should_move_to_dlq(5));

        item.mark_sent(now);
        assert!(!item.should_move_to_dlq(5));
    }

    #[test]
    fn time_until_retry_reports_readiness() {
        let now = fixed_now();
        let mut item = QueueItem::new(SubscriptionId(1), MessageId(2), now);
        item.next_retry_at = None;
        assert_eq!(item.time_until_retry(now), Err(QueueError::NoRetry));

        item.mark_failed(Some("500"), Duration::from_secs(120), now);
        assert_eq!(item.time_until_retry(now), Ok(Duration::from_secs(120)));
        assert_eq!(
            item.time_until_retry(now + chrono::Duration::seconds(300)),
            Ok(Duration::ZERO)
        );
    }

    #[test]
    fn dlq_entry_resolution_is_idempotent() {
        let now = fixed_now();
        let mut entry = DlqEntry::new(
            SubscriptionId(1),
            MessageId(2),
            QueueItemId(3),
            5,
            "500",
            "Max retry attempts exceeded (5 ≥ 5)",
            now - chrono::Duration::hours(2),
            now - chrono::Duration::minutes(5),
            r#"{"user":1}"#,
            "https://example.com/hook",
            now,
        );
        assert!(!entry.is_resolved);

        entry.resolve("ops", "replayed manually", now);
        assert!(entry.is_resolved);
        assert_eq!(entry.resolved_at, Some(now));

        let later = now + chrono::Duration::minutes(10);
        entry.resolve("ops2", "confirmed fixed", later);
        assert!(entry.is_resolved);
        assert_eq!(entry.resolved_at, Some(later));
        assert_eq!(entry.resolved_by.as_deref(), Some("ops2"));
        assert_eq!(entry.resolution_note.as_deref(), Some("confirmed fixed"));
    }

    #[test]
    fn dlq_entry_age_threshold() {
        let now = fixed_now();
        let entry = DlqEntry::new(
            SubscriptionId(1),
            MessageId(2),
            QueueItemId(3),
            5,
            "500",
            "Max retry attempts exceeded (5 ≥ 5)",
            now,
            now,
            "{}",
            "https://example.com/hook",
            now,
        );

        let later = now + chrono::Duration::hours(3);
        assert_eq!(entry.age(later), Duration::from_secs(3 * 3600));
        assert!(entry.is_old(Duration::from_secs(2 * 3600), later));
        assert!(!entry.is_old(Duration::from_secs(4 * 3600), later));
    }

    #[test]
    fn queue_status_display_matches_storage_format() {
        assert_eq!(QueueStatus::Pending.to_string(), "pending");
        assert_eq!(QueueStatus::Sent.to_string(), "sent");
        assert_eq!(QueueStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn queue_error_codes() {
        assert_eq!(QueueError::Expired.code(), "QUEUE_EXPIRED");
        assert_eq!(QueueError::AlreadySent.code(), "ALREADY_SENT");
        assert_eq!(QueueError::MaxAttempts.code(), "MAX_ATTEMPTS");
        assert_eq!(QueueError::NotReady.code(), "NOT_READY");
        assert_eq!(QueueError::NoRetry.code(), "NO_RETRY");
    }

    #[test]
    fn subscription_deactivation_is_soft_delete() {
        let now = fixed_now();
        let mut sub = Subscription::new(SubscriberId(7), TopicId(1), "user.created", now);
        assert!(sub.is_active);
        assert!(sub.deleted_at.is_none());

        sub.deactivate(now);
        assert!(!sub.is_active);
        assert_eq!(sub.deleted_at, Some(now));

        // A second deactivation may refresh the stamp; it stays inactive.
        let later = now + chrono::Duration::minutes(1);
        sub.deactivate(later);
        assert!(!sub.is_active);
        assert_eq!(sub.deleted_at, Some(later));

        sub.reactivate();
        assert!(sub.is_active);
        assert!(sub.deleted_at.is_none());
    }
}
