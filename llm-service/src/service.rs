//! Provider-agnostic facade over the concrete clients.
//!
//! Construct one [`LlmService`] per process, wrap it in `Arc`, and pass
//! clones to dependents. Two profiles are managed: **chat** (answer
//! generation) and **embedding**. Underlying HTTP clients are cached per
//! config (endpoint+model+key+timeout) so repeated calls do not rebuild
//! connections.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::trace;

use serde::{Deserialize, Serialize};

use crate::config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider};
use crate::error_handler::Result;
use crate::services::{ollama_service::OllamaService, open_ai_service::OpenAiService};

/// Prompt/completion token counts reported by the provider.
///
/// Zeroes mean the provider did not report usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One completion result: generated text plus usage accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Shared service that manages the **chat** and **embedding** profiles.
///
/// Internally caches Ollama/OpenAI clients keyed by their configuration
/// to avoid recreating HTTP clients on each call.
pub struct LlmService {
    chat: LlmModelConfig,
    embedding: LlmModelConfig,

    ollama: RwLock<HashMap<ClientKey, Arc<OllamaService>>>,
    openai: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,
}

impl LlmService {
    /// Creates a new service from the two profiles.
    pub fn new(chat: LlmModelConfig, embedding: LlmModelConfig) -> Self {
        Self {
            chat,
            embedding,
            ollama: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
        }
    }

    /// Builds both profiles from environment variables.
    ///
    /// # Errors
    /// Propagates config errors from
    /// [`crate::config::default_config::config_chat`] and
    /// [`crate::config::default_config::config_embedding`].
    pub fn from_env() -> Result<Self> {
        let chat = crate::config::default_config::config_chat()?;
        let embedding = crate::config::default_config::config_embedding()?;
        Ok(Self::new(chat, embedding))
    }

    /// Generates a completion using the **chat** profile.
    ///
    /// # Errors
    /// Returns provider/transport errors; classification for retry is on
    /// the error itself ([`crate::retry::Transience`]).
    pub async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<Completion> {
        trace!(prompt_len = prompt.len(), "LlmService::complete");
        match self.chat.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(&self.chat).await?;
                cli.complete(prompt, system).await
            }
            LlmProvider::OpenAi => {
                let cli = self.get_or_init_openai(&self.chat).await?;
                cli.complete(prompt, system).await
            }
        }
    }

    /// Computes embeddings for a batch of texts using the **embedding**
    /// profile, one vector per input, preserving input order.
    ///
    /// OpenAI handles the batch in a single request; Ollama exposes a
    /// single-input endpoint, so the batch is iterated sequentially.
    ///
    /// # Errors
    /// Returns provider/transport errors.
    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        trace!(batch = inputs.len(), "LlmService::embed_batch");
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        match self.embedding.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(&self.embedding).await?;
                let mut out = Vec::with_capacity(inputs.len());
                for input in inputs {
                    out.push(cli.embeddings(input).await?);
                }
                Ok(out)
            }
            LlmProvider::OpenAi => {
                let cli = self.get_or_init_openai(&self.embedding).await?;
                cli.embeddings(inputs).await
            }
        }
    }

    /// Returns references to the current profiles `(chat, embedding)`.
    pub fn profiles(&self) -> (&LlmModelConfig, &LlmModelConfig) {
        (&self.chat, &self.embedding)
    }

    /* --------------------- Internals --------------------- */

    async fn get_or_init_ollama(&self, cfg: &LlmModelConfig) -> Result<Arc<OllamaService>> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.ollama.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.ollama.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OllamaService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }

    async fn get_or_init_openai(&self, cfg: &LlmModelConfig) -> Result<Arc<OpenAiService>> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.openai.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.openai.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OpenAiService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }
}

/// Internal cache key to identify unique client configs.
#[derive(Clone, Eq)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<u64>,
}

impl From<&LlmModelConfig> for ClientKey {
    fn from(cfg: &LlmModelConfig) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout_secs,
        }
    }
}

impl PartialEq for ClientKey {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.endpoint == other.endpoint
            && self.model == other.model
            && self.api_key == other.api_key
            && self.timeout == other.timeout
    }
}

impl Hash for ClientKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.endpoint.hash(state);
        self.model.hash(state);
        if let Some(ref k) = self.api_key {
            k.hash(state);
        } else {
            0usize.hash(state);
        }
        self.timeout.hash(state);
    }
}
