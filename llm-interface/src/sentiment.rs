use async_trait::async_trait;
use brandwatch_core::{Classification, CoreError, LlmError, SentimentClassifier, SentimentLabel};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{http_client, status_error, transport_error};

const PROVIDER: &str = "sentiment-model";

/// Longest input sent to the model, in characters.
pub const MAX_INPUT_CHARS: usize = 512;

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// Inference endpoints answer either `[[{label, score}, ..]]` or
/// `[{label, score}, ..]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ClassifyResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl ClassifyResponse {
    pub(crate) fn best(self) -> Option<LabelScore> {
        let candidates = match self {
            ClassifyResponse::Nested(batches) => batches.into_iter().next().unwrap_or_default(),
            ClassifyResponse::Flat(scores) => scores,
        };
        candidates
            .into_iter()
            .filter(|candidate| candidate.score.is_finite())
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

/// Transformer sentiment model behind a Hugging Face style inference API.
#[derive(Debug, Clone)]
pub struct HttpSentimentClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpSentimentClassifier {
    pub fn new(endpoint: &str, api_token: Option<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http_client()?,
            endpoint: endpoint.to_string(),
            api_token,
        })
    }
}

/// Positive wins over negative when a label mentions both.
/// `label_2`/`label_0` are the positional labels of three-class checkpoints.
pub fn map_label(label: &str) -> SentimentLabel {
    let label = label.to_lowercase();
    if label.contains("positive") || label == "label_2" {
        SentimentLabel::Positive
    } else if label.contains("negative") || label == "label_0" {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[async_trait]
impl SentimentClassifier for HttpSentimentClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, CoreError> {
        let request = ClassifyRequest {
            inputs: truncate_chars(text, MAX_INPUT_CHARS),
        };

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;

        if !response.status().is_success() {
            return Err(status_error(PROVIDER, &self.endpoint, &response).into());
        }

        let parsed: ClassifyResponse =
            response
                .json()
                .await
                .map_err(|_| LlmError::InvalidResponseFormat {
                    provider: PROVIDER.to_string(),
                })?;

        let best = parsed.best().ok_or_else(|| LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
        })?;

        debug!(label = %best.label, score = best.score, "Sentiment model result");

        Ok(Classification {
            label: map_label(&best.label),
            confidence: best.score.clamp(0.0, 1.0),
        })
    }
}
