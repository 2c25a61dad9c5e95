use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;

use super::{Usage, decode};
use crate::config::{ClientConfig, EmbeddingConfig};
use crate::error::ApiError;
use crate::http::{RequestExecutor, RequestSpec, ReqwestTransport, Timeout, Transport};
use crate::tokenizer::{self, TokenizerHandle};

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct EmbeddingClient<T: Transport> {
    executor: RequestExecutor<T>,
    config: EmbeddingConfig,
    api_key: String,
    timeout: Timeout,
    tokenizer: TokenizerHandle,
}

impl EmbeddingClient<ReqwestTransport> {
    pub fn from_config(client: &ClientConfig, config: EmbeddingConfig) -> Result<Self, ApiError> {
        let executor = RequestExecutor::new(ReqwestTransport::with_defaults()?, client.retry.clone());
        Self::new(client, config, executor)
    }
}

impl<T: Transport> EmbeddingClient<T> {
    pub fn new(
        client: &ClientConfig,
        config: EmbeddingConfig,
        executor: RequestExecutor<T>,
    ) -> Result<Self, ApiError> {
        let tokenizer = tokenizer::load(config.tokenizer_name(), config.use_tiktoken)?;
        Ok(Self {
            executor,
            config,
            api_key: client.api_key.clone(),
            timeout: client.timeout,
            tokenizer,
        })
    }

    /// Embeds `texts` in a single request. Vectors come back in input order.
    #[tracing::instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn embed<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Err(ApiError::InvalidInput(
                "at least one text is required".to_string(),
            ));
        }

        let inputs: Vec<&str> = texts.iter().map(AsRef::as_ref).collect();
        for (i, text) in inputs.iter().enumerate() {
            let tokens = self.tokenizer.count(text);
            if tokens > self.config.max_seq_len {
                warn!(
                    "Text {} has {} tokens, more than the {} the model accepts",
                    i, tokens, self.config.max_seq_len
                );
            }
        }

        let payload = json!({
            "model": self.config.model,
            "input": inputs,
        });
        let spec = RequestSpec::new(&self.config.url, payload)
            .with_bearer_token(&self.api_key)
            .with_timeout(self.timeout);

        let value = self.executor.send(&spec).await?;
        let body = value.to_string();
        let mut response: EmbeddingResponse = decode(value)?;

        if response.data.len() != inputs.len() {
            return Err(ApiError::MalformedResponse {
                status: 200,
                body,
                reason: format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    response.data.len()
                ),
            });
        }

        // Indices must be a permutation of 0..n.
        response.data.sort_by_key(|d| d.index);
        if let Some((position, item)) = response
            .data
            .iter()
            .enumerate()
            .find(|(position, item)| item.index != *position)
        {
            return Err(ApiError::MalformedResponse {
                status: 200,
                body,
                reason: format!(
                    "embedding index {} where {} was expected",
                    item.index, position
                ),
            });
        }

        if let Some(usage) = &response.usage {
            debug!("Embedding request used {} tokens", usage.total_tokens);
        }

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}
