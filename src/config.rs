//! Configuration for the API clients.
//!
//! [`ClientConfig`] holds what every request needs (key, timeout, retry
//! policy) and is read from the environment. [`ChatConfig`] and
//! [`EmbeddingConfig`] describe one endpoint each.

use anyhow::{Context, Result, anyhow};
use log::debug;
use std::fmt;
use std::time::Duration;

use crate::http::Timeout;
use crate::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, RetryConfig};
use crate::runtime::Runtime;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const TIMEOUT_VAR: &str = "OPENAI_TIMEOUT";
pub const BACKOFF_VAR: &str = "OPENAI_BACKOFF";
pub const MAX_RETRIES_VAR: &str = "OPENAI_MAX_RETRIES";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

#[derive(Clone, PartialEq)]
pub struct ClientConfig {
    pub api_key: String,
    pub timeout: Timeout,
    pub retry: RetryConfig,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            timeout: Timeout::Total(DEFAULT_TIMEOUT),
            retry: RetryConfig::default(),
        }
    }

    /// Reads the key and the request tuning knobs from the environment.
    ///
    /// - `OPENAI_API_KEY` (required)
    /// - `OPENAI_TIMEOUT`: seconds, or `connect,read` seconds (default 30)
    /// - `OPENAI_BACKOFF`: base backoff in seconds (default 2)
    /// - `OPENAI_MAX_RETRIES`: total attempts per request, including the first (default 6)
    pub fn from_runtime<R: Runtime>(runtime: &R) -> Result<Self> {
        let api_key = runtime
            .env_var(API_KEY_VAR)
            .map_err(|_| anyhow!("{} is not set", API_KEY_VAR))?;
        if api_key.trim().is_empty() {
            anyhow::bail!("{} is empty", API_KEY_VAR);
        }
        debug!("Using {}: {}", API_KEY_VAR, mask_secret(&api_key));

        let mut config = Self::new(api_key);

        if let Ok(raw) = runtime.env_var(TIMEOUT_VAR) {
            config.timeout = parse_timeout(&raw)
                .with_context(|| format!("Invalid {} value '{}'", TIMEOUT_VAR, raw))?;
        }

        let base_delay = match runtime.env_var(BACKOFF_VAR) {
            Ok(raw) => parse_seconds(&raw)
                .with_context(|| format!("Invalid {} value '{}'", BACKOFF_VAR, raw))?,
            Err(_) => DEFAULT_BASE_DELAY,
        };

        let max_attempts = match runtime.env_var(MAX_RETRIES_VAR) {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid {} value '{}'", MAX_RETRIES_VAR, raw))?,
            Err(_) => DEFAULT_MAX_ATTEMPTS,
        };

        config.retry = RetryConfig {
            max_attempts,
            base_delay,
            ..RetryConfig::default()
        };

        Ok(config)
    }
}

fn parse_seconds(raw: &str) -> Result<Duration> {
    let secs: f64 = raw.trim().parse().context("not a number")?;
    if !secs.is_finite() || secs < 0.0 {
        anyhow::bail!("must be a non-negative number of seconds");
    }
    Duration::try_from_secs_f64(secs).context("out of range")
}

/// `"30"` is a total timeout, `"5,30"` a connect/read pair.
fn parse_timeout(raw: &str) -> Result<Timeout> {
    match raw.split_once(',') {
        Some((connect, read)) => Ok(Timeout::Split {
            connect: parse_seconds(connect)?,
            read: parse_seconds(read)?,
        }),
        None => Ok(Timeout::Total(parse_seconds(raw)?)),
    }
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub url: String,
    pub model_name: String,
    pub temperature: f32,
    /// Upper bound on completion tokens.
    pub max_tokens: u32,
    /// Log the rendered prompt at info level.
    pub verbose: bool,
    pub tokenizer_name: String,
    pub use_tiktoken: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: CHAT_COMPLETIONS_URL.to_string(),
            model_name: "gpt-3.5-turbo-16k-0613".to_string(),
            temperature: 0.0,
            max_tokens: 12000,
            verbose: false,
            tokenizer_name: "cl100k_base".to_string(),
            use_tiktoken: true,
        }
    }
}

/// Embedding models the API has offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingModel {
    Ada,
    Ada002,
    Babbage,
    Curie,
    Davinci,
}

impl EmbeddingModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingModel::Ada => "*-ada-*-002",
            EmbeddingModel::Ada002 => "text-embedding-ada-002",
            EmbeddingModel::Babbage => "*-babbage-*-001",
            EmbeddingModel::Curie => "*-curie-*-001",
            EmbeddingModel::Davinci => "*-davinci-*-001",
        }
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub url: String,
    pub model: String,
    /// Longest input, in tokens, the model accepts.
    pub max_seq_len: usize,
    pub use_tiktoken: bool,
    /// Defaults per backend when unset: `cl100k_base` or `gpt2`.
    pub tokenizer_name: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: EMBEDDINGS_URL.to_string(),
            model: EmbeddingModel::Ada002.as_str().to_string(),
            max_seq_len: 8191,
            use_tiktoken: false,
            tokenizer_name: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn with_model(mut self, model: EmbeddingModel) -> Self {
        self.model = model.as_str().to_string();
        self
    }

    pub fn tokenizer_name(&self) -> &str {
        match &self.tokenizer_name {
            Some(name) => name,
            None if self.use_tiktoken => "cl100k_base",
            None => "gpt2",
        }
    }
}
