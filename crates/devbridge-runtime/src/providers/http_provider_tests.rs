use super::*;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEADLINE: Duration = Duration::from_secs(5);

fn provider(server: &MockServer) -> HttpProvider {
    HttpProvider::new("cloud", format!("{}/v1/run", server.uri()))
}

#[tokio::test]
async fn test_result_field_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/run"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "operation": "generateCode",
            "prompt": "add two numbers",
            "context": {"language": "rust"}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"result": {"code": "a + b"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let spec = RequestSpec::new("add two numbers").with_context("language", "rust");
    let value = provider(&server)
        .with_api_key("sk-test")
        .call("generateCode", &spec, DEADLINE)
        .await
        .unwrap();
    assert_eq!(value, json!({"code": "a + b"}));
}

#[tokio::test]
async fn test_whole_body_without_result_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hi"})))
        .mount(&server)
        .await;

    let value = provider(&server)
        .call("explainCode", &RequestSpec::new("x"), DEADLINE)
        .await
        .unwrap();
    assert_eq!(value, json!({"text": "hi"}));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .call("generateCode", &RequestSpec::new("x"), DEADLINE)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::ApiError {
            status: 503,
            message: "overloaded".into()
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .call("generateCode", &RequestSpec::new("x"), DEADLINE)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::RateLimited {
            retry_after_seconds: 7
        }
    );
}

#[tokio::test]
async fn test_client_errors_are_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/run"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .call("generateCode", &RequestSpec::new("x"), DEADLINE)
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::AuthenticationFailed("bad key".into()));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"result": 1}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = provider(&server)
        .call("generateCode", &RequestSpec::new("x"), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::Timeout(100));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    let provider = HttpProvider::new("cloud", "http://127.0.0.1:1/v1/run");
    let err = provider
        .call("generateCode", &RequestSpec::new("x"), DEADLINE)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)));
}

#[test]
fn test_supports_operations() {
    let provider = HttpProvider::new("cloud", "http://localhost/run")
        .with_operations(vec!["generateCode".into(), "explainCode".into()]);
    assert!(provider.supports("explainCode"));
    assert!(!provider.supports("refactor"));
    assert_eq!(provider.endpoint(), "http://localhost/run");
}
