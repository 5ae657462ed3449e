use super::*;

#[test]
fn test_provider_error_api_error() {
    let err = ProviderError::ApiError {
        status: 500,
        message: "Internal Server Error".to_string(),
    };
    assert!(err.to_string().contains("500"));
    assert!(err.to_string().contains("Internal Server Error"));
}

#[test]
fn test_provider_error_timeout() {
    let err = ProviderError::Timeout(3000);
    assert!(err.to_string().contains("Timeout"));
    assert!(err.to_string().contains("3000"));
}

#[test]
fn test_from_api_response_auth_failed() {
    let err = ProviderError::from_api_response(401, "Invalid API key".to_string());
    assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    let err = ProviderError::from_api_response(403, "Forbidden".to_string());
    assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
}

#[test]
fn test_from_api_response_rate_limited() {
    let err = ProviderError::from_api_response(429, "slow down".to_string());
    assert!(matches!(err, ProviderError::RateLimited { .. }));
}

#[test]
fn test_from_api_response_invalid_request() {
    let err = ProviderError::from_api_response(400, "bad".to_string());
    assert!(matches!(err, ProviderError::InvalidRequest(_)));
}

#[test]
fn test_from_api_response_generic_error() {
    let err = ProviderError::from_api_response(503, "Unavailable".to_string());
    assert!(matches!(err, ProviderError::ApiError { status: 503, .. }));
}

#[test]
fn test_is_transient() {
    assert!(ProviderError::RateLimited { retry_after_seconds: 5 }.is_transient());
    assert!(ProviderError::Network("err".to_string()).is_transient());
    assert!(ProviderError::Timeout(30).is_transient());
    assert!(ProviderError::Remote("peer failed".to_string()).is_transient());
    assert!(ProviderError::ApiError { status: 502, message: String::new() }.is_transient());
    assert!(!ProviderError::ApiError { status: 418, message: String::new() }.is_transient());
    assert!(!ProviderError::AuthenticationFailed("err".to_string()).is_transient());
    assert!(!ProviderError::InvalidRequest("err".to_string()).is_transient());
    assert!(!ProviderError::Unsupported("op".to_string()).is_transient());
}
