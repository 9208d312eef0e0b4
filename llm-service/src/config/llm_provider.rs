//! Represents the provider (backend) used for LLM inference and embeddings.

use crate::error_handler::{ConfigError, LlmServiceError};

/// Supported LLM backends.
///
/// Adding more providers in the future (e.g., Anthropic, Mistral API)
/// means extending this enum and supplying a matching service client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// Local Ollama runtime for on-device inference.
    Ollama,
    /// OpenAI REST API.
    OpenAi,
}

impl std::str::FromStr for LlmProvider {
    type Err = LlmServiceError;

    /// Parses the `LLM_KIND` / `EMBED_KIND` env value (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "openai" | "chatgpt" => Ok(LlmProvider::OpenAi),
            other => Err(ConfigError::UnsupportedProvider(other.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        assert_eq!("ollama".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert!("mystery".parse::<LlmProvider>().is_err());
    }
}
