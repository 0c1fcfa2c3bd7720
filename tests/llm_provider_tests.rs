use futures_util::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use study_generation::config::{LLMConfig, LocalModelConfig};
use study_generation::llm_providers::{HostedProvider, LLMMessage, PacingPolicy, RequestExecutor};
use study_generation::{
    AIError, LocalModelProvider, OllamaLocalModel, ProviderKind, ProviderPreference, StaticSettings,
    UnavailableLocalModel,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: &str) -> LLMConfig {
    LLMConfig {
        api_key: Some("sk-test".to_string()),
        base_url: base_url.to_string(),
        pacing_min_ms: 0,
        pacing_max_ms: 0,
        ..LLMConfig::default()
    }
}

fn messages() -> Vec<LLMMessage> {
    vec![LLMMessage::system("You are a tutor."), LLMMessage::user("Explain osmosis.")]
}

async fn hosted_result(template: ResponseTemplate) -> Result<String, AIError> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(template)
        .mount(&server)
        .await;

    let provider = HostedProvider::new(&config(&server.uri()));
    provider.complete("sk-test", "test/model", &messages()).await
}

#[tokio::test]
async fn test_hosted_returns_first_choice_content() {
    let body = json!({
        "choices": [
            { "message": { "role": "assistant", "content": "Water moves across a membrane." } },
            { "message": { "role": "assistant", "content": "ignored" } }
        ]
    });
    let result = hosted_result(ResponseTemplate::new(200).set_body_json(body)).await;
    assert_eq!(result.unwrap(), "Water moves across a membrane.");
}

#[tokio::test]
async fn test_hosted_error_classification() {
    let cases: Vec<(ResponseTemplate, AIError)> = vec![
        (ResponseTemplate::new(500), AIError::status(500)),
        (ResponseTemplate::new(401).set_body_string("bad key"), AIError::status(401)),
        (
            ResponseTemplate::new(200).set_body_string("<html>gateway</html>"),
            AIError::InvalidResponse,
        ),
        (
            ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })),
            AIError::InvalidResponse,
        ),
        (
            ResponseTemplate::new(200)
                .set_body_json(json!({ "choices": [{ "message": { "content": "   " } }] })),
            AIError::InvalidResponse,
        ),
        (
            ResponseTemplate::new(200)
                .set_body_json(json!({ "error": { "message": "Rate limit exceeded", "code": 429 } })),
            AIError::ApiError("Rate limit exceeded".to_string()),
        ),
    ];

    for (template, expected) in cases {
        let result = hosted_result(template).await;
        assert_eq!(result, Err(expected.clone()));
        println!("✅ classified as {}", expected.code());
    }
}

#[tokio::test]
async fn test_hosted_transport_failure() {
    let provider = HostedProvider::new(&config("http://127.0.0.1:1"));
    let result = provider.complete("sk-test", "test/model", &messages()).await;
    assert_eq!(result, Err(AIError::GenerationFailed));
}

#[tokio::test]
async fn test_hosted_timeout_is_generation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let config = LLMConfig {
        timeout_secs: 1,
        ..config(&server.uri())
    };
    let provider = HostedProvider::new(&config);
    let result = provider.complete("sk-test", "test/model", &messages()).await;
    assert_eq!(result, Err(AIError::GenerationFailed));
}

#[tokio::test]
async fn test_concurrent_hosted_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "choices": [{ "message": { "content": "ok" } }] })),
        )
        .expect(5)
        .mount(&server)
        .await;

    let settings = Arc::new(StaticSettings {
        preference: ProviderPreference::ForceHosted,
        api_key: Some("sk-test".to_string()),
        model: "test/model".to_string(),
        local_model_available: false,
    });
    let executor = RequestExecutor::new(
        settings,
        HostedProvider::new(&config(&server.uri())),
        Arc::new(UnavailableLocalModel),
        PacingPolicy::new(0, 20),
    );

    let calls = (0..5).map(|n| {
        let executor = executor.clone();
        async move {
            executor
                .execute(ProviderKind::Hosted, "system", &format!("prompt {}", n), None)
                .await
        }
    });
    let results = join_all(calls).await;
    assert!(results.iter().all(|result| result.as_deref() == Ok("ok")));
}

#[tokio::test]
async fn test_executor_rejects_missing_credential_before_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let settings = Arc::new(StaticSettings {
        preference: ProviderPreference::ForceHosted,
        api_key: None,
        model: "test/model".to_string(),
        local_model_available: false,
    });
    let executor = RequestExecutor::new(
        settings,
        HostedProvider::new(&config(&server.uri())),
        Arc::new(UnavailableLocalModel),
        PacingPolicy::disabled(),
    );

    let result = executor.execute(ProviderKind::Hosted, "system", "user", None).await;
    assert_eq!(result, Err(AIError::MissingCredential));
    assert!(result.unwrap_err().terminal().is_some());
}

#[tokio::test]
async fn test_ollama_session_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "message": { "role": "assistant", "content": "Osmosis is diffusion of water." },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let local = OllamaLocalModel::new(&LocalModelConfig {
        url: Some(format!("{}/", server.uri())),
        model: "llama3.2".to_string(),
        ..LocalModelConfig::default()
    });
    assert!(local.is_available());

    let session = local.open_session("You are a tutor.").await.unwrap();
    let reply = session.respond("Explain osmosis.").await.unwrap();
    assert_eq!(reply, "Osmosis is diffusion of water.");

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["stream"], false);
    assert_eq!(body["model"], "llama3.2");
    assert_eq!(body["messages"][0]["content"], "You are a tutor.");
    assert_eq!(body["messages"][1]["content"], "Explain osmosis.");
}

#[tokio::test]
async fn test_ollama_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "model 'llama3.2' not found" })))
        .mount(&server)
        .await;

    let local = OllamaLocalModel::new(&LocalModelConfig {
        url: Some(server.uri()),
        model: "llama3.2".to_string(),
        ..LocalModelConfig::default()
    });
    let session = local.open_session("instructions").await.unwrap();
    assert_eq!(
        session.respond("hi").await,
        Err(AIError::ApiError("model 'llama3.2' not found".to_string()))
    );

    let unconfigured = OllamaLocalModel::new(&LocalModelConfig::default());
    assert!(!unconfigured.is_available());
    assert!(unconfigured.open_session("instructions").await.is_err());
}

#[tokio::test]
async fn test_ollama_session_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "message": { "content": "too late" } }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let local = OllamaLocalModel::new(&LocalModelConfig {
        url: Some(server.uri()),
        timeout_secs: 1,
        ..LocalModelConfig::default()
    });
    let session = local.open_session("instructions").await.unwrap();
    assert_eq!(session.respond("hi").await, Err(AIError::GenerationFailed));
}
