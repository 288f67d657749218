//! HTTP model collaborators: the primary sentiment classifier and the
//! context-note providers.

use brandwatch_core::{ContextProviderKind, LlmError, LlmProvider, ModelConfig, SentimentClassifier};
use reqwest::{Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod claude;
pub mod openai;
pub mod sentiment;

pub use claude::ClaudeProvider;
pub use openai::OpenAiProvider;
pub use sentiment::HttpSentimentClassifier;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()
}

/// Maps a non-success response to the matching `LlmError`.
pub(crate) fn status_error(provider: &str, model: &str, response: &Response) -> LlmError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidApiKey {
            provider: provider.to_string(),
        },
        StatusCode::NOT_FOUND => LlmError::ModelNotAvailable {
            model: model.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded {
            provider: provider.to_string(),
            retry_after: response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(60),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LlmError::RequestTimeout {
            provider: provider.to_string(),
        },
        _ => LlmError::ServiceUnavailable {
            provider: provider.to_string(),
        },
    }
}

pub(crate) fn transport_error(provider: &str, error: &reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::RequestTimeout {
            provider: provider.to_string(),
        }
    } else {
        LlmError::ServiceUnavailable {
            provider: provider.to_string(),
        }
    }
}

/// Primary sentiment model from config, `None` when no endpoint is set.
pub fn sentiment_classifier(config: &ModelConfig) -> Option<Arc<dyn SentimentClassifier>> {
    let endpoint = config.sentiment_endpoint.as_deref()?;
    match HttpSentimentClassifier::new(endpoint, config.sentiment_api_token.clone()) {
        Ok(classifier) => {
            info!("Using sentiment model at {}", endpoint);
            Some(Arc::new(classifier))
        }
        Err(e) => {
            warn!("Could not build sentiment client, lexical fallback only: {}", e);
            None
        }
    }
}

/// Context-note provider from config, `None` when unconfigured.
pub fn context_provider(config: &ModelConfig) -> Option<Arc<dyn LlmProvider>> {
    let built: Result<Arc<dyn LlmProvider>, reqwest::Error> = match config.context_provider {
        ContextProviderKind::None => return None,
        ContextProviderKind::OpenAi => {
            let Some(key) = config.openai_api_key.as_deref() else {
                warn!("OpenAI context provider selected but no API key is set");
                return None;
            };
            OpenAiProvider::new(key, &config.openai_model)
                .map(|p| p.max_tokens(config.max_tokens).temperature(config.temperature))
                .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
        }
        ContextProviderKind::Anthropic => {
            let Some(key) = config.anthropic_api_key.as_deref() else {
                warn!("Anthropic context provider selected but no API key is set");
                return None;
            };
            ClaudeProvider::new(key, &config.anthropic_model)
                .map(|p| p.max_tokens(config.max_tokens).temperature(config.temperature))
                .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
        }
    };

    match built {
        Ok(provider) => {
            info!("Context notes via {}", provider.provider_name());
            Some(provider)
        }
        Err(e) => {
            warn!("Could not build context provider: {}", e);
            None
        }
    }
}
