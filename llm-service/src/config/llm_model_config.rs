//! Universal model configuration shared by all provider clients.

use crate::config::llm_provider::LlmProvider;

/// Configuration for a single model invocation profile.
///
/// One instance describes one `(provider, endpoint, model)` triple plus
/// generation knobs. The same struct is used for completion and
/// embedding profiles; embedding profiles simply ignore the sampling
/// fields.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// The LLM provider/backend (e.g., Ollama, OpenAI).
    pub provider: LlmProvider,

    /// Model identifier string (e.g., `"gpt-4o-mini"`, `"qwen3:14b"`).
    pub model: String,

    /// Inference endpoint (local server or remote API URL).
    pub endpoint: String,

    /// Optional API key for authentication (e.g., OpenAI).
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic).
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Optional per-request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}
