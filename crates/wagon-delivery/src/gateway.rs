//! Webhook transport and callback URL resolution.
//!
//! Both collaborators sit behind narrow traits so the worker can be tested
//! with scripted doubles. The production gateway is a thin reqwest client;
//! the production URL provider reads the subscriber's configured webhook
//! URL.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use tracing::debug;
use wagon_core::{
    error::{CoreError, Result},
    models::SubscriberId,
};

use crate::{envelope::DeliveryEnvelope, storage::SubscriberStore};

/// Dispatches a delivery envelope to a subscriber webhook.
///
/// The engine treats every error uniformly as a retriable delivery failure;
/// it does not distinguish 4xx from 5xx or transport errors. Implementations
/// own transport-level concerns (timeouts, TLS, redirects).
pub trait DeliveryGateway: Send + Sync + 'static {
    /// Sends the envelope to the given webhook URL.
    ///
    /// Returns `Ok(())` only for an accepted delivery; anything else is a
    /// `CoreError::Delivery`.
    fn deliver(
        &self,
        url: String,
        envelope: DeliveryEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Resolves the callback URL for a subscriber.
pub trait UrlProvider: Send + Sync + 'static {
    /// Returns the webhook URL for the subscriber.
    ///
    /// Returns `CoreError::NoData` when the subscriber is unknown.
    fn callback_url_for(
        &self,
        subscriber_id: SubscriberId,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// Configuration for the production webhook gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// HTTP request timeout.
    pub timeout: Duration,

    /// User agent string for outgoing requests.
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), user_agent: "wagon-delivery/1.0".to_string() }
    }
}

/// HTTP webhook gateway backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct WebhookGateway {
    client: reqwest::Client,
}

impl WebhookGateway {
    /// Creates a gateway with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| CoreError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Creates a gateway with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(GatewayConfig::default())
    }
}

impl DeliveryGateway for WebhookGateway {
    fn deliver(
        &self,
        url: String,
        envelope: DeliveryEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let client = self.client.clone();

        Box::pin(async move {
            debug!(url = %url, message_id = %envelope.message_id, "dispatching webhook");

            let response = client
                .post(&url)
                .json(&envelope)
                .send()
                .await
                .map_err(|e| CoreError::delivery(format!("webhook request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(CoreError::delivery(format!(
                    "webhook returned HTTP {}",
                    status.as_u16()
                )));
            }

            Ok(())
        })
    }
}

/// URL provider backed by the subscriber store.
pub struct SubscriberUrlProvider {
    subscribers: Arc<dyn SubscriberStore>,
}

impl SubscriberUrlProvider {
    /// Creates a provider reading webhook URLs from subscriber records.
    pub fn new(subscribers: Arc<dyn SubscriberStore>) -> Self {
        Self { subscribers }
    }
}

impl UrlProvider for SubscriberUrlProvider {
    fn callback_url_for(
        &self,
        subscriber_id: SubscriberId,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let subscribers = self.subscribers.clone();

        Box::pin(async move {
            let subscriber = subscribers.load(subscriber_id).await?;
            Ok(subscriber.webhook_url)
        })
    }
}
