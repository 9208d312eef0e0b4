//! Unified error handling for `llm-service`.
//!
//! This module exposes a single top-level error type [`LlmServiceError`]
//! for the whole library, and groups domain-specific errors in nested
//! enums ([`ConfigError`], [`ProviderError`]). Small helpers for
//! reading/validating environment variables are provided and return the
//! unified [`Result<T>`] alias.
//!
//! Every error knows whether it is **transient** (worth retrying with
//! backoff) or **fatal** (surfaced immediately); the retry loop in
//! [`crate::retry`] consults that classification and nothing else.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::config::llm_provider::LlmProvider;
use crate::retry::Transience;

/* ------------------------------------------------------------------------- */
/* Public result alias                                                       */
/* ------------------------------------------------------------------------- */

/// Unified result alias for the entire crate.
pub type Result<T> = std::result::Result<T, LlmServiceError>;

/* ------------------------------------------------------------------------- */
/* Top-level error                                                           */
/* ------------------------------------------------------------------------- */

/// Top-level error for the `llm-service` crate.
///
/// Variants wrap domain-specific enums (config/provider) plus the raw
/// HTTP transport case. Prefer adding new sub-enums for distinct
/// domains instead of growing this type indefinitely.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LlmServiceError {
    /// Configuration/validation errors (startup/readiness). Never retried.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Provider-level errors (HTTP status, decode, timeouts).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Underlying HTTP transport error (e.g., `reqwest::Error`).
    #[error("[LLM Service] transport error: {0}")]
    HttpTransport(#[from] reqwest::Error),
}

impl Transience for LlmServiceError {
    fn is_transient(&self) -> bool {
        match self {
            LlmServiceError::Config(_) => false,
            LlmServiceError::Provider(p) => p.is_transient(),
            // Connection resets and client-side timeouts are worth retrying;
            // anything else (builder misuse, TLS setup) is not.
            LlmServiceError::HttpTransport(e) => e.is_timeout() || e.is_connect(),
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Config errors                                                             */
/* ------------------------------------------------------------------------- */

/// Error enum for environment/config-driven setup.
///
/// Keep this focused: only errors that realistically happen at config
/// load/validation time.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("[LLM Service] missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (like ports, limits, timeouts).
    #[error("[LLM Service] invalid number in {var}: {reason}")]
    InvalidNumber {
        /// Variable name (e.g., `LLM_MAX_TOKENS`).
        var: &'static str,
        /// Human-readable reason (e.g., `expected u32`).
        reason: &'static str,
    },

    /// Unsupported provider in `LLM_KIND`.
    #[error("[LLM Service] unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Value had the wrong format (e.g., invalid URL).
    #[error("[LLM Service] invalid format in {var}: {reason}")]
    InvalidFormat {
        /// Variable name (e.g., `LLM_ENDPOINT`).
        var: &'static str,
        /// Explanation (e.g., `must start with http:// or https://`).
        reason: &'static str,
    },

    /// Model name was empty or invalid.
    #[error("[LLM Service] model name must not be empty")]
    EmptyModel,
}

/* ------------------------------------------------------------------------- */
/* Provider errors                                                           */
/* ------------------------------------------------------------------------- */

/// Error raised while talking to a concrete provider.
#[derive(Debug, Error)]
#[error("[LLM Service] {provider:?}: {kind}")]
pub struct ProviderError {
    /// Which backend produced the error.
    pub provider: LlmProvider,
    /// What went wrong.
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    /// Convenience constructor.
    pub fn new(provider: LlmProvider, kind: ProviderErrorKind) -> Self {
        Self { provider, kind }
    }
}

/// Provider error shapes, classified for retry purposes.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderErrorKind {
    /// The config has an unexpected provider for this client.
    #[error("invalid provider for this client")]
    InvalidProvider,

    /// API key required but absent.
    #[error("missing API key")]
    MissingApiKey,

    /// The endpoint is empty or does not start with http/https.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Upstream returned a non-successful HTTP status.
    #[error("HTTP {status} from {url}: {snippet}")]
    HttpStatus {
        /// Numeric HTTP status code.
        status: StatusCode,
        /// Request URL.
        url: String,
        /// Short snippet of the response body (trimmed).
        snippet: String,
    },

    /// Response payload could not be decoded as expected.
    #[error("decode error: {0}")]
    Decode(String),

    /// Completion response carried no choices/content.
    #[error("empty choices in completion response")]
    EmptyChoices,

    /// A single attempt exceeded its wall-clock budget.
    #[error("attempt timed out after {0:?}")]
    AttemptTimeout(Duration),
}

impl Transience for ProviderError {
    /// Rate limiting (429), server-side failures (5xx), and per-attempt
    /// timeouts are transient. Authentication problems (401/403), other
    /// 4xx statuses, and decode failures are fatal.
    fn is_transient(&self) -> bool {
        match &self.kind {
            ProviderErrorKind::HttpStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ProviderErrorKind::AttemptTimeout(_) => true,
            _ => false,
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Env helpers (return unified `Result<T>`)                                  */
/* ------------------------------------------------------------------------- */

/// Fetches a required, non-empty environment variable.
///
/// # Errors
/// Returns [`ConfigError::MissingVar`] if the variable is absent or empty.
pub fn must_env(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name).into()),
    }
}

/// Parses an optional `u32` from env (`Ok(None)` if unset/empty).
///
/// # Errors
/// Returns [`ConfigError::InvalidNumber`] if the variable is set but not
/// a valid `u32`.
pub fn env_opt_u32(name: &'static str) -> Result<Option<u32>> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.parse::<u32>().map(Some).map_err(|_| {
            LlmServiceError::from(ConfigError::InvalidNumber {
                var: name,
                reason: "expected u32",
            })
        }),
        _ => Ok(None),
    }
}

/// Validates that an HTTP endpoint starts with `http://` or `https://`.
///
/// # Errors
/// Returns [`ConfigError::InvalidFormat`] when the string does not start
/// with a valid HTTP scheme.
pub fn validate_http_endpoint(var: &'static str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidFormat {
            var,
            reason: "must start with http:// or https://",
        }
        .into())
    }
}

/// Trims a response body down to a loggable snippet.
pub fn make_snippet(body: &str) -> String {
    body.chars().take(240).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_err(status: u16) -> ProviderError {
        ProviderError::new(
            LlmProvider::OpenAi,
            ProviderErrorKind::HttpStatus {
                status: StatusCode::from_u16(status).unwrap(),
                url: "http://x/v1/chat/completions".into(),
                snippet: String::new(),
            },
        )
    }

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        assert!(provider_err(429).is_transient());
        assert!(provider_err(500).is_transient());
        assert!(provider_err(503).is_transient());
    }

    #[test]
    fn auth_and_client_errors_are_fatal() {
        assert!(!provider_err(401).is_transient());
        assert!(!provider_err(403).is_transient());
        assert!(!provider_err(400).is_transient());
    }

    #[test]
    fn attempt_timeout_is_transient_and_decode_is_not() {
        let t = ProviderError::new(
            LlmProvider::Ollama,
            ProviderErrorKind::AttemptTimeout(Duration::from_secs(5)),
        );
        assert!(t.is_transient());

        let d = ProviderError::new(LlmProvider::Ollama, ProviderErrorKind::Decode("bad".into()));
        assert!(!d.is_transient());
    }

    #[test]
    fn config_errors_never_retry() {
        let e = LlmServiceError::from(ConfigError::EmptyModel);
        assert!(!e.is_transient());
    }
}
