//! Shared test doubles for the delivery pipeline tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicUsize, Ordering},
};

use tokio::sync::Mutex;
use wagon_core::{
    error::{CoreError, Result},
    models::{DlqEntry, QueueItem, SubscriberId, Subscription},
};
use wagon_delivery::{DeliveryEnvelope, DeliveryGateway, NotificationSink, UrlProvider};

/// Gateway double with a scripted response queue.
///
/// Responses are consumed in order; once the script is exhausted the
/// configured default applies (success unless built with
/// [`ScriptedGateway::always_failing`]). All calls are recorded.
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<std::result::Result<(), String>>>,
    default_error: Option<String>,
    calls: Mutex<Vec<(String, DeliveryEnvelope)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Gateway that fails every delivery with the given error message.
    pub fn always_failing(error: &str) -> Self {
        Self { default_error: Some(error.to_string()), ..Self::new() }
    }

    pub async fn script_ok(&self) {
        self.responses.lock().await.push_back(Ok(()));
    }

    pub async fn script_error(&self, message: &str) {
        self.responses.lock().await.push_back(Err(message.to_string()));
    }

    pub async fn recorded_calls(&self) -> Vec<(String, DeliveryEnvelope)> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

impl DeliveryGateway for ScriptedGateway {
    fn deliver(
        &self,
        url: String,
        envelope: DeliveryEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.calls.lock().await.push((url, envelope));

            match self.responses.lock().await.pop_front() {
                Some(Ok(())) => Ok(()),
                Some(Err(message)) => Err(CoreError::delivery(message)),
                None => match &self.default_error {
                    Some(message) => Err(CoreError::delivery(message.clone())),
                    None => Ok(()),
                },
            }
        })
    }
}

/// Notification sink that counts every call, optionally failing each one.
#[derive(Default)]
pub struct RecordingSink {
    pub dlq_added: AtomicUsize,
    pub delivery_failed: AtomicUsize,
    pub subscription_created: AtomicUsize,
    pub subscription_deactivated: AtomicUsize,
    /// When true, every notification returns an error.
    pub failing: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    fn outcome(&self) -> Result<()> {
        if self.failing {
            Err(CoreError::delivery("notification channel unavailable"))
        } else {
            Ok(())
        }
    }
}

impl NotificationSink for RecordingSink {
    fn dlq_added(&self, _entry: DlqEntry) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.dlq_added.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::ready(self.outcome()))
    }

    fn delivery_failed(
        &self,
        _item: QueueItem,
        _error: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.delivery_failed.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::ready(self.outcome()))
    }

    fn subscription_created(
        &self,
        _subscription: Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.subscription_created.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::ready(self.outcome()))
    }

    fn subscription_deactivated(
        &self,
        _subscription: Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.subscription_deactivated.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::ready(self.outcome()))
    }
}

/// URL provider with a scripted response queue.
///
/// Responses are consumed in order; once exhausted every lookup fails with
/// `NoData`.
pub struct ScriptedUrls {
    responses: Mutex<VecDeque<std::result::Result<String, ()>>>,
}

impl ScriptedUrls {
    pub fn new() -> Self {
        Self { responses: Mutex::new(VecDeque::new()) }
    }

    pub async fn script_url(&self, url: &str) {
        self.responses.lock().await.push_back(Ok(url.to_string()));
    }

    pub async fn script_missing(&self) {
        self.responses.lock().await.push_back(Err(()));
    }
}

impl UrlProvider for ScriptedUrls {
    fn callback_url_for(
        &self,
        _subscriber_id: SubscriberId,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            match self.responses.lock().await.pop_front() {
                Some(Ok(url)) => Ok(url),
                _ => Err(CoreError::NoData),
            }
        })
    }
}
