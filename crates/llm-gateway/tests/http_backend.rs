//! HTTP backend behaviour against mock Ollama and OpenAI-compatible servers.

use std::sync::Arc;
use std::time::Duration;

use llm_gateway::{
    BackendKind, Gateway, GatewayConfig, GatewayError, GenerateOptions, GenerateRequest,
    HttpBackend, HttpBackendConfig, LlmBackend, RetryPolicy,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options() -> GenerateOptions {
    GenerateOptions::default()
        .with_model("qwen2.5:32b")
        .with_max_tokens(128)
        .with_timeout_ms(2_000)
}

fn fast_gateway(backend: HttpBackend) -> Gateway {
    Gateway::new(
        Arc::new(backend),
        GatewayConfig {
            retry: RetryPolicy {
                max_retries: 2,
                backoff_base_ms: 5,
            },
            cache: false,
        },
    )
}

#[tokio::test]
async fn ollama_generate_sends_model_and_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "qwen2.5:32b",
            "stream": false,
            "options": { "num_predict": 128 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "<think>checking</think>role(processor); ensure_security_of_processing",
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend =
        HttpBackend::new(HttpBackendConfig::new(BackendKind::Ollama, server.uri())).unwrap();
    let gw = fast_gateway(backend);
    let text = gw
        .generate(&GenerateRequest::new("extract facts", options()))
        .await
        .unwrap();
    assert_eq!(text, "role(processor); ensure_security_of_processing");
}

#[tokio::test]
async fn openai_generate_uses_chat_completions_and_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "qwen2.5:32b",
            "messages": [
                { "role": "system", "content": "You are a legal analyst." },
                { "role": "user", "content": "classify" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "3 7" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(
        HttpBackendConfig::new(BackendKind::OpenAi, server.uri()).with_api_key("sk-test"),
    )
    .unwrap();
    let request =
        GenerateRequest::new("classify", options()).with_system("You are a legal analyst.");
    assert_eq!(backend.generate(&request).await.unwrap(), "3 7");
}

#[tokio::test]
async fn server_errors_are_retried_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "NONE" })))
        .mount(&server)
        .await;

    let backend =
        HttpBackend::new(HttpBackendConfig::new(BackendKind::Ollama, server.uri())).unwrap();
    let gw = fast_gateway(backend);
    let text = gw
        .generate(&GenerateRequest::new("classify", options()))
        .await
        .unwrap();
    assert_eq!(text, "NONE");
    assert_eq!(gw.stats().retries, 2);
}

#[tokio::test]
async fn persistent_server_errors_become_backend_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let backend =
        HttpBackend::new(HttpBackendConfig::new(BackendKind::Ollama, server.uri())).unwrap();
    let err = fast_gateway(backend)
        .generate(&GenerateRequest::new("classify", options()))
        .await
        .unwrap_err();
    match err {
        GatewayError::BackendUnavailable { attempts, reason } => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("500"), "reason was {reason}");
        }
        other => panic!("expected BackendUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .expect(1)
        .mount(&server)
        .await;

    let backend =
        HttpBackend::new(HttpBackendConfig::new(BackendKind::Ollama, server.uri())).unwrap();
    let err = fast_gateway(backend)
        .generate(&GenerateRequest::new("classify", options()))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRequest(ref m) if m.contains("model not found")));
}

#[tokio::test]
async fn slow_backend_times_out_per_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "late" }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let backend =
        HttpBackend::new(HttpBackendConfig::new(BackendKind::Ollama, server.uri())).unwrap();
    let gw = Gateway::new(
        Arc::new(backend),
        GatewayConfig {
            retry: RetryPolicy {
                max_retries: 0,
                backoff_base_ms: 1,
            },
            cache: false,
        },
    );
    let err = gw
        .generate(&GenerateRequest::new("p", options().with_timeout_ms(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::BackendUnavailable { attempts: 1, .. }));
}

#[tokio::test]
async fn malformed_payload_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let backend =
        HttpBackend::new(HttpBackendConfig::new(BackendKind::OpenAi, server.uri())).unwrap();
    let err = backend
        .generate(&GenerateRequest::new("p", options()))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::MalformedResponse(_)));
}

#[tokio::test]
async fn readiness_probe_hits_health_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let backend =
        HttpBackend::new(HttpBackendConfig::new(BackendKind::Ollama, server.uri())).unwrap();
    fast_gateway(backend)
        .probe_ready(3, Duration::from_millis(5))
        .await
        .unwrap();
}

#[tokio::test]
async fn readiness_probe_fails_when_unreachable() {
    // nothing listens on the discard port
    let backend =
        HttpBackend::new(HttpBackendConfig::new(BackendKind::Ollama, "http://127.0.0.1:9"))
            .unwrap();
    let err = fast_gateway(backend)
        .probe_ready(2, Duration::from_millis(5))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::BackendUnavailable { attempts: 2, .. }));
}
