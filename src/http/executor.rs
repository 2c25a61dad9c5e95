//! Request executor: one logical POST with classification and retries.

use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;

use super::transport::{RawResponse, Timeout, Transport};
use crate::error::{ApiError, ErrorKind};
use crate::retry::{RetryConfig, RetryPolicy};

/// Failure kinds the executor retries by default.
pub const RETRYABLE_KINDS: [ErrorKind; 2] = [ErrorKind::RateLimited, ErrorKind::ServiceError];

#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub payload: Value,
    pub timeout: Timeout,
}

impl RequestSpec {
    /// A JSON POST to `url` with the default timeout.
    pub fn new(url: impl Into<String>, payload: Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            url: url.into(),
            headers,
            payload,
            timeout: Timeout::default(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Maps one raw response onto the outcome taxonomy. The body is decoded
/// before the status is looked at, so a non-JSON body is fatal whatever the
/// status.
pub fn classify_response(response: RawResponse) -> Result<Value, ApiError> {
    let parsed: Value = match serde_json::from_str(&response.body) {
        Ok(value) => value,
        Err(e) => {
            return Err(ApiError::MalformedResponse {
                status: response.status,
                body: response.body,
                reason: e.to_string(),
            });
        }
    };

    match response.status {
        200 => Ok(parsed),
        429 => Err(ApiError::RateLimited {
            body: response.body,
        }),
        status_code => Err(ApiError::Service {
            status_code,
            body: response.body,
        }),
    }
}

pub struct RequestExecutor<T: Transport> {
    transport: T,
    policy: RetryPolicy<ApiError>,
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(transport: T, config: RetryConfig) -> Self {
        Self::with_policy(transport, RetryPolicy::for_kinds(config, &RETRYABLE_KINDS))
    }

    pub fn with_policy(transport: T, policy: RetryPolicy<ApiError>) -> Self {
        Self { transport, policy }
    }

    /// Sends `spec`, retrying classified failures per the policy.
    #[tracing::instrument(skip(self, spec), fields(url = %spec.url))]
    pub async fn send(&self, spec: &RequestSpec) -> Result<Value, ApiError> {
        let body = serde_json::to_string(&spec.payload)
            .map_err(|e| ApiError::InvalidInput(format!("payload is not serializable: {}", e)))?;

        debug!("POST {} ({} bytes)...", spec.url, body.len());

        self.policy
            .run("API request", || self.send_once(spec, body.clone()))
            .await
    }

    /// One attempt, no retries.
    pub async fn send_once(&self, spec: &RequestSpec, body: String) -> Result<Value, ApiError> {
        let response = self
            .transport
            .post(&spec.url, &spec.headers, body, spec.timeout)
            .await?;
        classify_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::transport::{MockTransport, ReqwestTransport};
    use crate::test_utils::RecordingSleeper;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    fn config(max_attempts: u32, base_delay: Duration) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay,
            jitter: false,
        }
    }

    fn scripted(statuses: &[u16]) -> MockTransport {
        let mut script: VecDeque<u16> = statuses.iter().copied().collect();
        let calls = script.len();
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .times(calls)
            .returning(move |_, _, _, _| {
                let status = script.pop_front().unwrap_or(200);
                Ok(RawResponse::new(status, format!(r#"{{"status":{}}}"#, status)))
            });
        transport
    }

    fn executor(
        transport: MockTransport,
        config: RetryConfig,
        sleeper: &Arc<RecordingSleeper>,
    ) -> RequestExecutor<MockTransport> {
        let policy =
            RetryPolicy::for_kinds(config, &RETRYABLE_KINDS).with_sleeper(sleeper.clone());
        RequestExecutor::with_policy(transport, policy)
    }

    fn spec() -> RequestSpec {
        RequestSpec::new("https://api.example.com/v1/chat", json!({"model": "m"}))
    }

    #[test]
    fn test_request_spec_defaults() {
        let spec = spec().with_bearer_token("sk-1");
        assert_eq!(spec.headers["Content-Type"], "application/json");
        assert_eq!(spec.headers["Authorization"], "Bearer sk-1");
        assert_eq!(spec.timeout, Timeout::Total(Duration::from_secs(30)));
    }

    #[test]
    fn test_classify_response() {
        assert_eq!(
            classify_response(RawResponse::new(200, r#"{"a":1}"#)).unwrap(),
            json!({"a": 1})
        );
        assert!(matches!(
            classify_response(RawResponse::new(429, "{}")),
            Err(ApiError::RateLimited { .. })
        ));
        assert!(matches!(
            classify_response(RawResponse::new(404, "{}")),
            Err(ApiError::Service { status_code: 404, .. })
        ));
        assert!(matches!(
            classify_response(RawResponse::new(429, "Too Many Requests")),
            Err(ApiError::MalformedResponse { status: 429, .. })
        ));
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let executor = executor(scripted(&[200]), config(6, Duration::from_secs(1)), &sleeper);

        let value = executor.send(&spec()).await.unwrap();

        assert_eq!(value, json!({"status": 200}));
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_then_success_backs_off_exponentially() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let executor = executor(
            scripted(&[429, 429, 200]),
            config(3, Duration::from_secs(1)),
            &sleeper,
        );

        let value = executor.send(&spec()).await.unwrap();

        assert_eq!(value, json!({"status": 200}));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_rate_limited_until_exhaustion() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let executor = executor(
            scripted(&[429; 6]),
            config(6, Duration::from_millis(10)),
            &sleeper,
        );

        let result = executor.send(&spec()).await;

        match result {
            Err(ApiError::RateLimited { body }) => assert_eq!(body, r#"{"status":429}"#),
            other => panic!("expected rate limit error, got {:?}", other),
        }
        assert_eq!(sleeper.delays().len(), 5);
    }

    #[tokio::test]
    async fn test_server_error_retried_like_rate_limit() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let executor = executor(
            scripted(&[500, 500, 500]),
            config(3, Duration::from_secs(1)),
            &sleeper,
        );

        let result = executor.send(&spec()).await;

        assert!(matches!(
            result,
            Err(ApiError::Service { status_code: 500, .. })
        ));
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .times(1)
            .returning(|_, _, _, _| Err(ApiError::Transport("timed out".to_string())));
        let executor = executor(transport, config(6, Duration::from_secs(1)), &sleeper);

        let result = executor.send(&spec()).await;

        assert!(matches!(result, Err(ApiError::Transport(_))));
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .times(1)
            .returning(|_, _, _, _| Ok(RawResponse::new(502, "<html>Bad Gateway</html>")));
        let executor = executor(transport, config(6, Duration::from_secs(1)), &sleeper);

        let result = executor.send(&spec()).await;

        assert!(matches!(
            result,
            Err(ApiError::MalformedResponse { status: 502, .. })
        ));
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_send_serializes_payload_and_passes_spec() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .withf(|url, headers, body, timeout| {
                url == "https://api.example.com/v1/chat"
                    && headers.get("Authorization").map(String::as_str) == Some("Bearer k")
                    && body == r#"{"model":"m"}"#
                    && *timeout == Timeout::Total(Duration::from_secs(5))
            })
            .times(1)
            .returning(|_, _, _, _| Ok(RawResponse::new(200, "{}")));
        let executor = executor(transport, config(1, Duration::from_secs(1)), &sleeper);

        let spec = spec()
            .with_bearer_token("k")
            .with_timeout(Timeout::Total(Duration::from_secs(5)));
        executor.send(&spec).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_against_http_server() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("POST", "/v1/embeddings")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit reached"}}"#)
            .expect(1)
            .create_async()
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = RetryPolicy::for_kinds(config(2, Duration::from_millis(1)), &RETRYABLE_KINDS)
            .with_sleeper(sleeper.clone());
        let executor =
            RequestExecutor::with_policy(ReqwestTransport::with_defaults().unwrap(), policy);
        let spec = RequestSpec::new(format!("{}/v1/embeddings", server.url()), json!({}));

        // The first attempt is rate limited; swap in a success before the retry.
        let first = executor.send_once(&spec, "{}".to_string()).await;
        assert!(matches!(first, Err(ApiError::RateLimited { ref body }) if body.contains("Rate limit")));
        limited.assert_async().await;
        limited.remove_async().await;

        let ok = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let value = executor.send(&spec).await.unwrap();
        ok.assert_async().await;
        assert_eq!(value, json!({"data": []}));
    }
}
