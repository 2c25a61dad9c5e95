//! Token counting over two interchangeable backends.
//!
//! - **BPE** (`tiktoken` feature): `tiktoken-rs` encoding tables, selected by
//!   encoding name such as `cl100k_base`.
//! - **Pretrained** (`hf-tokenizers` feature): a HuggingFace tokenizer,
//!   selected by hub model id (`gpt2`) or by a local `tokenizer.json` path.
//!
//! The backend is chosen once, by [`load`]. A backend that was not compiled
//! in fails with [`ApiError::MissingDependency`].

use log::{debug, warn};

use crate::error::ApiError;

/// Which backend a [`TokenizerHandle`] counts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Bpe,
    Pretrained,
}

pub enum TokenizerHandle {
    Bpe { name: String, backend: BpeBackend },
    Pretrained { name: String, backend: PretrainedBackend },
}

impl std::fmt::Debug for TokenizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerHandle")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

/// Loads a tokenizer. With `use_fast_backend`, `tokenizer_name` is an
/// encoding name; otherwise it is a pretrained model id or tokenizer file.
pub fn load(tokenizer_name: &str, use_fast_backend: bool) -> Result<TokenizerHandle, ApiError> {
    if use_fast_backend {
        TokenizerHandle::bpe(tokenizer_name)
    } else {
        TokenizerHandle::pretrained(tokenizer_name)
    }
}

impl TokenizerHandle {
    pub fn bpe(encoding: &str) -> Result<Self, ApiError> {
        debug!("Using tiktoken {} encoding", encoding);
        let backend = BpeBackend::load(encoding)?;
        Ok(TokenizerHandle::Bpe {
            name: encoding.to_string(),
            backend,
        })
    }

    pub fn pretrained(identifier: &str) -> Result<Self, ApiError> {
        warn!(
            "Not using the tiktoken encoder; counting tokens with the pretrained '{}' tokenizer instead",
            identifier
        );
        let backend = PretrainedBackend::load(identifier)?;
        Ok(TokenizerHandle::Pretrained {
            name: identifier.to_string(),
            backend,
        })
    }

    /// Number of tokens in `text`. Zero for the empty string.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self {
            TokenizerHandle::Bpe { backend, .. } => backend.count(text),
            TokenizerHandle::Pretrained { backend, .. } => backend.count(text),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            TokenizerHandle::Bpe { .. } => BackendKind::Bpe,
            TokenizerHandle::Pretrained { .. } => BackendKind::Pretrained,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TokenizerHandle::Bpe { name, .. } | TokenizerHandle::Pretrained { name, .. } => name,
        }
    }
}

fn invalid(identifier: &str, reason: impl Into<String>) -> ApiError {
    ApiError::InvalidModelIdentifier {
        identifier: identifier.to_string(),
        reason: reason.into(),
    }
}

#[cfg(feature = "tiktoken")]
pub struct BpeBackend(tiktoken_rs::CoreBPE);

#[cfg(not(feature = "tiktoken"))]
pub enum BpeBackend {}

#[cfg(feature = "tiktoken")]
impl BpeBackend {
    fn load(encoding: &str) -> Result<Self, ApiError> {
        use tiktoken_rs::{cl100k_base, o200k_base, p50k_base, p50k_edit, r50k_base};

        let bpe = match encoding {
            "o200k_base" => o200k_base(),
            "cl100k_base" => cl100k_base(),
            "p50k_base" => p50k_base(),
            "p50k_edit" => p50k_edit(),
            "r50k_base" | "gpt2" => r50k_base(),
            _ => return Err(invalid(encoding, "unknown tiktoken encoding")),
        }
        .map_err(|e| invalid(encoding, e.to_string()))?;

        Ok(BpeBackend(bpe))
    }

    fn count(&self, text: &str) -> usize {
        self.0.encode_ordinary(text).len()
    }
}

#[cfg(not(feature = "tiktoken"))]
impl BpeBackend {
    fn load(_encoding: &str) -> Result<Self, ApiError> {
        Err(ApiError::MissingDependency {
            feature: "tiktoken",
        })
    }

    fn count(&self, _text: &str) -> usize {
        match *self {}
    }
}

#[cfg(feature = "hf-tokenizers")]
pub struct PretrainedBackend(Box<tokenizers::Tokenizer>);

#[cfg(not(feature = "hf-tokenizers"))]
pub enum PretrainedBackend {}

#[cfg(feature = "hf-tokenizers")]
impl PretrainedBackend {
    fn load(identifier: &str) -> Result<Self, ApiError> {
        let path = std::path::Path::new(identifier);
        let loaded = if path.is_file() {
            debug!("Loading tokenizer from file {}", path.display());
            tokenizers::Tokenizer::from_file(path)
        } else {
            debug!("Loading pretrained tokenizer {}", identifier);
            tokenizers::Tokenizer::from_pretrained(identifier, None)
        };

        loaded
            .map(|tokenizer| PretrainedBackend(Box::new(tokenizer)))
            .map_err(|e| invalid(identifier, e.to_string()))
    }

    fn count(&self, text: &str) -> usize {
        match self.0.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                // Word count is the closest estimate without an encoding.
                warn!("Tokenizer failed to encode text ({}), estimating by words", e);
                text.split_whitespace().count()
            }
        }
    }
}

#[cfg(not(feature = "hf-tokenizers"))]
impl PretrainedBackend {
    fn load(_identifier: &str) -> Result<Self, ApiError> {
        Err(ApiError::MissingDependency {
            feature: "hf-tokenizers",
        })
    }

    fn count(&self, _text: &str) -> usize {
        match *self {}
    }
}
