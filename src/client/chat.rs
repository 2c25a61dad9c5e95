use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{Usage, decode};
use crate::config::{ChatConfig, ClientConfig};
use crate::error::ApiError;
use crate::http::{RequestExecutor, RequestSpec, ReqwestTransport, Timeout, Transport};
use crate::prompt::render_prompt;
use crate::tokenizer::{self, TokenizerHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    /// Prompt size as counted locally, before sending.
    pub prompt_tokens: usize,
    pub usage: Option<Usage>,
}

pub struct ChatClient<T: Transport> {
    executor: RequestExecutor<T>,
    config: ChatConfig,
    api_key: String,
    timeout: Timeout,
    tokenizer: TokenizerHandle,
}

impl ChatClient<ReqwestTransport> {
    pub fn from_config(client: &ClientConfig, config: ChatConfig) -> Result<Self, ApiError> {
        let executor = RequestExecutor::new(ReqwestTransport::with_defaults()?, client.retry.clone());
        Self::new(client, config, executor)
    }
}

impl<T: Transport> ChatClient<T> {
    pub fn new(
        client: &ClientConfig,
        config: ChatConfig,
        executor: RequestExecutor<T>,
    ) -> Result<Self, ApiError> {
        let tokenizer = tokenizer::load(&config.tokenizer_name, config.use_tiktoken)?;
        Ok(Self {
            executor,
            config,
            api_key: client.api_key.clone(),
            timeout: client.timeout,
            tokenizer,
        })
    }

    fn request_spec(&self, prompt: &str) -> Result<RequestSpec, ApiError> {
        let request = ChatRequest {
            model: &self.config.model_name,
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let payload = serde_json::to_value(&request)
            .map_err(|e| ApiError::InvalidInput(format!("cannot encode chat request: {}", e)))?;

        Ok(RequestSpec::new(&self.config.url, payload)
            .with_bearer_token(&self.api_key)
            .with_timeout(self.timeout))
    }

    /// Sends `message` with the conversation `history` and returns the first
    /// choice.
    #[tracing::instrument(skip(self, message, history))]
    pub async fn complete(&self, message: &str, history: &str) -> Result<ChatReply, ApiError> {
        let prompt = render_prompt(message, history);
        let prompt_tokens = self.tokenizer.count(&prompt);

        if self.config.verbose {
            info!("Prompt ({} tokens):\n{}", prompt_tokens, prompt);
        } else {
            debug!(
                "Sending chat prompt of {} tokens to {}",
                prompt_tokens, self.config.model_name
            );
        }

        let spec = self.request_spec(&prompt)?;
        let value = self.executor.send(&spec).await?;
        let body = value.to_string();
        let response: ChatResponse = decode(value)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::MalformedResponse {
                status: 200,
                body,
                reason: "response has no choices".to_string(),
            })?;

        Ok(ChatReply {
            content: choice.message.content,
            prompt_tokens,
            usage: response.usage,
        })
    }
}
