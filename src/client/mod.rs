//! Chat-completion and embeddings clients.
//!
//! Both clients load their tokenizer when constructed, so a missing backend
//! or a bad tokenizer name is reported before any request is sent.

mod chat;
mod embedding;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

pub use chat::{ChatClient, ChatMessage, ChatReply};
pub use embedding::EmbeddingClient;

/// Token accounting reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Decodes a successful response body into `T`.
fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    let body = value.to_string();
    serde_json::from_value(value).map_err(|e| ApiError::MalformedResponse {
        status: 200,
        body,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_usage_with_missing_fields() {
        let usage: Usage = decode(json!({"prompt_tokens": 7, "total_tokens": 7})).unwrap();
        assert_eq!(
            usage,
            Usage {
                prompt_tokens: 7,
                completion_tokens: 0,
                total_tokens: 7,
            }
        );
    }

    #[test]
    fn test_decode_wrong_shape_is_malformed() {
        let result: Result<Usage, _> = decode(json!({"prompt_tokens": "seven"}));
        assert!(matches!(
            result,
            Err(ApiError::MalformedResponse { status: 200, .. })
        ));
    }

    #[cfg(not(feature = "tiktoken"))]
    #[test]
    fn test_missing_fast_backend_fails_before_any_request() {
        use crate::config::{ChatConfig, ClientConfig};
        use crate::http::{MockTransport, RequestExecutor};
        use crate::retry::RetryConfig;

        let mut transport = MockTransport::new();
        transport.expect_post().times(0);
        let executor = RequestExecutor::new(transport, RetryConfig::default());

        let result = ChatClient::new(&ClientConfig::new("sk-test"), ChatConfig::default(), executor);

        assert!(matches!(
            result,
            Err(ApiError::MissingDependency {
                feature: "tiktoken"
            })
        ));
    }
}
