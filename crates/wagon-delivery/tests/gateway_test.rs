//! Webhook gateway tests against a real HTTP server.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use wagon_core::models::{Message, MessageId, TopicId};
use wagon_delivery::{DeliveryEnvelope, DeliveryGateway, GatewayConfig, WebhookGateway};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn envelope() -> DeliveryEnvelope {
    let mut message = Message::new(TopicId(1), "user.created", r#"{"user":42}"#, Utc::now());
    message.id = MessageId(17);
    DeliveryEnvelope::from_message(&message)
}

#[tokio::test]
async fn successful_response_completes_the_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = WebhookGateway::with_defaults().unwrap();
    let result = gateway.deliver(format!("{}/hook", server.uri()), envelope()).await;

    assert!(result.is_ok(), "2xx means delivered: {:?}", result.err());
    server.verify().await;
}

#[tokio::test]
async fn request_body_carries_the_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let gateway = WebhookGateway::with_defaults().unwrap();
    gateway.deliver(format!("{}/hook", server.uri()), envelope()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["messageID"], "17");
    assert_eq!(body["identifier"], "user.created");
    assert_eq!(body["data"], BASE64.encode(br#"{"user":42}"#));
    assert_eq!(body["attributes"]["publisher"], "wagon");
    assert_eq!(body["attributes"]["version"], "1.0");
    assert_eq!(body["orderingKey"], "");
    assert!(body["publishTime"].is_string(), "publishTime is a timestamp, never null");
}

#[tokio::test]
async fn server_error_is_a_delivery_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let gateway = WebhookGateway::with_defaults().unwrap();
    let err = gateway
        .deliver(format!("{}/hook", server.uri()), envelope())
        .await
        .err()
        .expect("5xx is a failure");

    assert_eq!(err.code(), "DELIVERY");
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn client_error_is_also_a_delivery_failure() {
    // The engine does not distinguish 4xx from 5xx: both go through the
    // same retry path.
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let gateway = WebhookGateway::with_defaults().unwrap();
    let err = gateway
        .deliver(format!("{}/hook", server.uri()), envelope())
        .await
        .err()
        .expect("4xx is a failure");

    assert_eq!(err.code(), "DELIVERY");
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_delivery_failure() {
    let gateway = WebhookGateway::new(GatewayConfig {
        timeout: Duration::from_millis(500),
        ..GatewayConfig::default()
    })
    .unwrap();

    // Reserved TEST-NET-1 address: nothing listens there.
    let err = gateway
        .deliver("http://192.0.2.1:9/hook".to_string(), envelope())
        .await
        .err()
        .expect("connection failure is a delivery failure");

    assert_eq!(err.code(), "DELIVERY");
}
