use brandwatch_core::{CoreError, ErrorExt, LlmError, LlmProvider, SentimentLabel, SentimentResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::sentiment::SentimentScorer;

/// Sentiment verdict for a post title, with a short explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleSentiment {
    pub sentiment: SentimentLabel,
    pub confidence: f64,
    pub explanation: String,
    pub is_positive: bool,
    pub is_negative: bool,
}

impl TitleSentiment {
    fn empty() -> Self {
        Self {
            sentiment: SentimentLabel::Neutral,
            confidence: 0.0,
            explanation: "Empty title".to_string(),
            is_positive: false,
            is_negative: false,
        }
    }

    fn from_scorer(result: &SentimentResult) -> Self {
        Self {
            sentiment: result.label,
            confidence: result.confidence,
            explanation: format!("Basic analysis: {}", result.label),
            is_positive: result.label == SentimentLabel::Positive,
            is_negative: result.label == SentimentLabel::Negative,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LlmVerdict {
    sentiment: String,
    confidence: f64,
    #[serde(default)]
    explanation: String,
    is_positive: Option<bool>,
    is_negative: Option<bool>,
}

/// Scores titles with a language model when one is configured, falling back
/// to the [`SentimentScorer`] when the model fails or answers nonsense.
#[derive(Clone)]
pub struct TitleSentimentAnalyzer {
    scorer: SentimentScorer,
    llm: Option<Arc<dyn LlmProvider>>,
}

impl TitleSentimentAnalyzer {
    pub fn new(scorer: SentimentScorer, llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { scorer, llm }
    }

    pub fn scorer(&self) -> &SentimentScorer {
        &self.scorer
    }

    pub async fn analyze(&self, title: &str) -> TitleSentiment {
        if title.trim().is_empty() {
            return TitleSentiment::empty();
        }

        if let Some(llm) = &self.llm {
            match self.ask_model(llm.as_ref(), title).await {
                Ok(verdict) => return verdict,
                Err(e) => {
                    warn!(
                        provider = llm.provider_name(),
                        code = %e.error_code(),
                        "Title sentiment model failed, using basic analysis: {}", e
                    );
                }
            }
        }

        TitleSentiment::from_scorer(&self.scorer.score(title).await)
    }

    async fn ask_model(
        &self,
        llm: &dyn LlmProvider,
        title: &str,
    ) -> Result<TitleSentiment, CoreError> {
        let reply = llm.generate(&title_prompt(title)).await?;
        debug!(provider = llm.provider_name(), "Title sentiment reply received");
        parse_verdict(llm.provider_name(), &reply)
    }
}

fn title_prompt(title: &str) -> String {
    format!(
        "Classify the sentiment of this Reddit post title as positive, negative or neutral.\n\
         Take context, sarcasm, irony and emotional wording into account.\n\n\
         Title: \"{title}\"\n\n\
         Reply with JSON only:\n\
         {{\"sentiment\": \"positive|negative|neutral\", \"confidence\": 0.0-1.0, \
         \"explanation\": \"short reason\", \"is_positive\": true|false, \"is_negative\": true|false}}"
    )
}

/// Parses the JSON object in a model reply. Surrounding prose or code fences
/// are ignored.
pub(crate) fn parse_verdict(provider: &str, reply: &str) -> Result<TitleSentiment, CoreError> {
    let invalid = || -> CoreError {
        LlmError::InvalidResponseFormat {
            provider: provider.to_string(),
        }
        .into()
    };

    let start = reply.find('{').ok_or_else(invalid)?;
    let end = reply.rfind('}').ok_or_else(invalid)?;
    if end < start {
        return Err(invalid());
    }

    let verdict: LlmVerdict = serde_json::from_str(&reply[start..=end]).map_err(|_| invalid())?;
    let sentiment: SentimentLabel = verdict.sentiment.trim().parse()?;
    if !verdict.confidence.is_finite() {
        return Err(invalid());
    }

    Ok(TitleSentiment {
        sentiment,
        confidence: verdict.confidence.clamp(0.0, 1.0),
        explanation: verdict.explanation,
        is_positive: verdict
            .is_positive
            .unwrap_or(sentiment == SentimentLabel::Positive),
        is_negative: verdict
            .is_negative
            .unwrap_or(sentiment == SentimentLabel::Negative),
    })
}
