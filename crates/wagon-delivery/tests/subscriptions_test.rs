//! Subscription lifecycle tests against in-memory stores.

mod support;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use support::RecordingSink;
use wagon_core::{
    models::{Subscriber, SubscriberId, SubscriptionId, Topic},
    time::{Clock, TestClock},
};
use wagon_delivery::{storage::mock::MemoryStore, SubscribeRequest, SubscriptionManager};

fn fixed_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
}

struct World {
    clock: TestClock,
    store: Arc<MemoryStore>,
    sink: Arc<RecordingSink>,
    manager: SubscriptionManager,
    subscriber: Subscriber,
    topic: Topic,
}

async fn world() -> World {
    let clock = TestClock::at(fixed_now());
    let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
    let store = Arc::new(MemoryStore::new(clock_arc.clone()));
    let sink = Arc::new(RecordingSink::new());

    let manager = SubscriptionManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        sink.clone(),
        clock_arc,
    );

    let now = clock.now();
    let subscriber = store
        .add_subscriber(Subscriber::new(1, "billing", "https://hooks.example.com/b", now))
        .await;
    let topic = store.add_topic(Topic::new("user.signup", "User signup", "", now)).await;

    World { clock, store, sink, manager, subscriber, topic }
}

fn subscribe_request(subscriber_id: SubscriberId) -> SubscribeRequest {
    SubscribeRequest {
        subscriber_id,
        topic_code: "user.signup".to_string(),
        identifier: "user.created".to_string(),
    }
}

#[tokio::test]
async fn subscribe_creates_an_active_subscription() {
    let w = world().await;

    let subscription = w.manager.subscribe(subscribe_request(w.subscriber.id)).await.unwrap();

    assert!(subscription.id.0 > 0);
    assert!(subscription.is_active);
    assert_eq!(subscription.topic_id, w.topic.id);
    assert_eq!(subscription.subscriber_id, w.subscriber.id);
    assert_eq!(subscription.identifier, "user.created");
    assert_eq!(w.sink.subscription_created.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_subscribe_returns_the_existing_subscription() {
    let w = world().await;

    let first = w.manager.subscribe(subscribe_request(w.subscriber.id)).await.unwrap();
    let second = w.manager.subscribe(subscribe_request(w.subscriber.id)).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(w.sink.subscription_created.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn subscribe_validates_its_inputs() {
    let w = world().await;

    let err = w
        .manager
        .subscribe(SubscribeRequest {
            subscriber_id: SubscriberId(0),
            topic_code: "user.signup".to_string(),
            identifier: "user.created".to_string(),
        })
        .await
        .err()
        .expect("zero subscriber id is invalid");
    assert_eq!(err.code(), "VALIDATION");

    let err = w
        .manager
        .subscribe(SubscribeRequest {
            subscriber_id: w.subscriber.id,
            topic_code: String::new(),
            identifier: "user.created".to_string(),
        })
        .await
        .err()
        .expect("empty topic code is invalid");
    assert_eq!(err.code(), "VALIDATION");

    let err = w
        .manager
        .subscribe(SubscribeRequest {
            subscriber_id: SubscriberId(777),
            topic_code: "user.signup".to_string(),
            identifier: "user.created".to_string(),
        })
        .await
        .err()
        .expect("unknown subscriber is invalid");
    assert_eq!(err.code(), "VALIDATION");
    assert!(err.to_string().contains("subscriber not found"));
}

#[tokio::test]
async fn unsubscribe_soft_deletes_and_is_idempotent() {
    let w = world().await;
    let subscription = w.manager.subscribe(subscribe_request(w.subscriber.id)).await.unwrap();

    let deactivated = w.manager.unsubscribe(subscription.id).await.unwrap();
    assert!(!deactivated.is_active);
    assert_eq!(deactivated.deleted_at, Some(w.clock.now()));
    assert_eq!(w.sink.subscription_deactivated.load(std::sync::atomic::Ordering::SeqCst), 1);

    // A second unsubscribe is a no-op, not an error.
    let again = w.manager.unsubscribe(subscription.id).await.unwrap();
    assert!(!again.is_active);
    assert_eq!(w.sink.subscription_deactivated.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsubscribed_subscriptions_no_longer_receive_publishes() {
    let w = world().await;
    let subscription = w.manager.subscribe(subscribe_request(w.subscriber.id)).await.unwrap();
    w.manager.unsubscribe(subscription.id).await.unwrap();

    let clock_arc: Arc<dyn Clock> = Arc::new(w.clock.clone());
    let publisher = wagon_delivery::Publisher::new(
        w.store.clone(),
        w.store.clone(),
        w.store.clone(),
        w.store.clone(),
        clock_arc,
    );

    let result = publisher
        .publish(wagon_delivery::PublishRequest {
            topic_code: "user.signup".to_string(),
            identifier: "user.created".to_string(),
            data: "{}".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(result.queue_items_created, 0);
}

#[tokio::test]
async fn reactivate_restores_delivery_eligibility() {
    let w = world().await;
    let subscription = w.manager.subscribe(subscribe_request(w.subscriber.id)).await.unwrap();
    w.manager.unsubscribe(subscription.id).await.unwrap();

    let restored = w.manager.reactivate(subscription.id).await.unwrap();
    assert!(restored.is_active);
    assert!(restored.deleted_at.is_none());

    // Reactivating an active subscription is a no-op.
    let again = w.manager.reactivate(subscription.id).await.unwrap();
    assert!(again.is_active);
}

#[tokio::test]
async fn list_subscriptions_filters_by_identifier() {
    let w = world().await;
    w.manager.subscribe(subscribe_request(w.subscriber.id)).await.unwrap();
    w.manager
        .subscribe(SubscribeRequest {
            subscriber_id: w.subscriber.id,
            topic_code: "user.signup".to_string(),
            identifier: "user.deleted".to_string(),
        })
        .await
        .unwrap();

    let created =
        w.manager.list_subscriptions(w.subscriber.id, "user.created".to_string()).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].identifier, "user.created");

    let none =
        w.manager.list_subscriptions(w.subscriber.id, "order.placed".to_string()).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn get_subscription_reports_missing_ids_as_validation() {
    let w = world().await;

    let err = w
        .manager
        .get_subscription(SubscriptionId(404))
        .await
        .err()
        .expect("unknown subscription is invalid");

    assert_eq!(err.code(), "VALIDATION");
    assert!(err.to_string().contains("subscription not found"));
}

#[tokio::test]
async fn deactivation_survives_in_the_store() {
    let w = world().await;
    let subscription = w.manager.subscribe(subscribe_request(w.subscriber.id)).await.unwrap();
    w.manager.unsubscribe(subscription.id).await.unwrap();

    let stored = w.manager.get_subscription(subscription.id).await.unwrap();
    assert!(!stored.is_active);
    assert!(stored.deleted_at.is_some());
}
