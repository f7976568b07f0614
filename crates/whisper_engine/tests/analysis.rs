use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use whisper_core::{Direction, MessageOrigin, ObservedMessage};
use whisper_engine::{
    AnalysisRequest, AnalysisService, AnalysisSettings, FailureKind, ReqwestAnalysisClient,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(correlation_id: &str) -> AnalysisRequest {
    AnalysisRequest {
        conversation_id: "whatsapp:Alice".to_string(),
        context_window: vec![ObservedMessage {
            conversation_id: "whatsapp:Alice".to_string(),
            message_id: "fp-1".to_string(),
            sender: "Alice".to_string(),
            direction: Direction::Incoming,
            text: "I'm upset".to_string(),
            timestamp: "10:01".to_string(),
            first_seen_at: 0,
            origin: MessageOrigin::Dom,
        }],
        correlation_id: correlation_id.to_string(),
    }
}

fn client(server: &MockServer, request_timeout: Duration) -> ReqwestAnalysisClient {
    ReqwestAnalysisClient::new(AnalysisSettings {
        endpoint: format!("{}/analyze", server.uri()),
        request_timeout,
        ..AnalysisSettings::default()
    })
    .expect("client builds")
}

#[tokio::test]
async fn posts_context_and_returns_suggestions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(body_partial_json(json!({
            "conversationId": "whatsapp:Alice",
            "correlationId": "req-1.1",
            "contextWindow": [{"messageId": "fp-1", "direction": "incoming", "text": "I'm upset"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "correlationId": "req-1.1",
            "suggestions": ["Ask what happened", "Acknowledge the feeling"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server, Duration::from_secs(5))
        .analyze(request("req-1.1"))
        .await
        .expect("analysis ok");
    assert_eq!(response.correlation_id, "req-1.1");
    assert_eq!(
        response.suggestions,
        vec!["Ask what happened", "Acknowledge the feeling"]
    );
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .analyze(request("req-1.1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(503));
    assert!(err.is_transient());
}

#[tokio::test]
async fn client_errors_are_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .analyze(request("req-1.1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(400));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn slow_attempt_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"correlationId": "req-1.1", "suggestions": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_millis(100))
        .analyze(request("req-1.1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
    assert!(err.is_transient());
}

#[tokio::test]
async fn malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>oops</html>", "text/html"))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .analyze(request("req-1.1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidResponse);
    assert!(!err.is_transient());
}

#[tokio::test]
async fn mismatched_correlation_id_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "correlationId": "req-7.1",
            "suggestions": ["stale"]
        })))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .analyze(request("req-1.2"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::CorrelationMismatch);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    let client = ReqwestAnalysisClient::new(AnalysisSettings {
        endpoint: "http://127.0.0.1:9/analyze".to_string(),
        connect_timeout: Duration::from_millis(200),
        ..AnalysisSettings::default()
    })
    .expect("client builds");
    let err = client.analyze(request("req-1.1")).await.unwrap_err();
    assert!(
        matches!(err.kind, FailureKind::Network | FailureKind::Timeout),
        "unexpected failure {err:?}"
    );
    assert!(err.is_transient());
}
