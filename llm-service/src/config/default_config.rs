//! Default model configs loaded strictly from environment variables.
//!
//! Two roles are recognized:
//!
//! - **Chat**      → the answer-generation model
//! - **Embedding** → the embedding generator
//!
//! # Environment variables
//!
//! Chat:
//! - `LLM_KIND`         = provider kind (`ollama` | `openai`), default `ollama`
//! - `LLM_MODEL`        = model name (mandatory)
//! - `LLM_ENDPOINT`     = endpoint URL (default `http://localhost:11434`)
//! - `LLM_API_KEY`      = API key (mandatory for OpenAI)
//! - `LLM_MAX_TOKENS`   = optional generation cap (u32)
//! - `LLM_TIMEOUT_SECS` = per-attempt wall clock (default 60)
//!
//! Embedding:
//! - `EMBED_KIND`       = provider kind, defaults to `LLM_KIND`
//! - `EMBED_MODEL`      = embedding model name (mandatory)
//! - `EMBED_ENDPOINT`   = endpoint URL, defaults to `LLM_ENDPOINT`

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{LlmServiceError, env_opt_u32, must_env, validate_http_endpoint},
};

fn env_or(name: &str, dflt: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| dflt.to_string())
}

fn provider_kind(var: &str, dflt: &str) -> Result<LlmProvider, LlmServiceError> {
    env_or(var, dflt).parse()
}

/// Constructs the **chat** (answer-generation) profile from env.
///
/// # Defaults
/// - `temperature = Some(0.2)` (answers should be stable)
/// - `timeout_secs = Some(60)`
///
/// # Errors
/// Returns config errors for a missing model, an unsupported kind, or a
/// malformed endpoint.
pub fn config_chat() -> Result<LlmModelConfig, LlmServiceError> {
    let provider = provider_kind("LLM_KIND", "ollama")?;
    let model = must_env("LLM_MODEL")?;
    let endpoint = env_or("LLM_ENDPOINT", "http://localhost:11434");
    validate_http_endpoint("LLM_ENDPOINT", &endpoint)?;
    let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?;
    let timeout_secs = env_opt_u32("LLM_TIMEOUT_SECS")?.map(u64::from).or(Some(60));

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key: std::env::var("LLM_API_KEY").ok().filter(|s| !s.is_empty()),
        max_tokens,
        temperature: Some(0.2),
        top_p: None,
        timeout_secs,
    })
}

/// Constructs the **embedding** profile from env.
///
/// Falls back to the chat provider/endpoint when the embedding-specific
/// variables are unset, which is the common single-server setup.
///
/// # Errors
/// Returns config errors for a missing `EMBED_MODEL`, an unsupported
/// kind, or a malformed endpoint.
pub fn config_embedding() -> Result<LlmModelConfig, LlmServiceError> {
    let chat_kind = env_or("LLM_KIND", "ollama");
    let provider = provider_kind("EMBED_KIND", &chat_kind)?;
    let model = must_env("EMBED_MODEL")?;
    let endpoint = env_or(
        "EMBED_ENDPOINT",
        &env_or("LLM_ENDPOINT", "http://localhost:11434"),
    );
    validate_http_endpoint("EMBED_ENDPOINT", &endpoint)?;

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key: std::env::var("LLM_API_KEY").ok().filter(|s| !s.is_empty()),
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(30),
    })
}
