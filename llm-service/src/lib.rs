//! Shared LLM service layer.
//!
//! Provides thin clients for the supported providers (Ollama, OpenAI),
//! a provider-agnostic facade ([`LlmService`]) for completion and
//! embedding calls, a unified error type with transient/fatal
//! classification, and a bounded retry loop with exponential backoff.
//!
//! The rest of the workspace talks to remote models exclusively through
//! this crate; provider quirks (endpoints, payload shapes, token-usage
//! accounting) stay here.

pub mod config;
pub mod error_handler;
pub mod retry;
pub mod service;
pub mod services;

pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use error_handler::{LlmServiceError, ProviderError, ProviderErrorKind, Result};
pub use retry::{RetryError, RetryPolicy, Transience, run_with_retry};
pub use service::{Completion, LlmService, TokenUsage};
