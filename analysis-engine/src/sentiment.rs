use brandwatch_core::{
    Classification, ErrorExt, SentimentClassifier, SentimentLabel, SentimentResult,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::lexicon::PolarityLexicon;

/// Polarity magnitude below which the fallback reports NEUTRAL.
const NEUTRAL_BAND: f64 = 0.1;

/// Sentiment with a primary model and a deterministic lexical fallback.
///
/// Never fails: empty text is NEUTRAL with zero confidence, a model error or
/// panic falls back to [`PolarityLexicon`] for that call, and anything else
/// unexpected yields a zero-confidence NEUTRAL result.
#[derive(Clone, Default)]
pub struct SentimentScorer {
    primary: Option<Arc<dyn SentimentClassifier>>,
    lexicon: PolarityLexicon,
}

impl SentimentScorer {
    pub fn new(primary: Option<Arc<dyn SentimentClassifier>>) -> Self {
        Self {
            primary,
            lexicon: PolarityLexicon::new(),
        }
    }

    /// Scorer that only uses the lexical fallback.
    pub fn lexical() -> Self {
        Self::new(None)
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub async fn score(&self, text: &str) -> SentimentResult {
        if text.trim().is_empty() {
            return SentimentResult::neutral();
        }

        match AssertUnwindSafe(self.score_non_empty(text)).catch_unwind().await {
            Ok(result) => sanitize(result),
            Err(_) => {
                error!("Sentiment scoring panicked, returning neutral result");
                SentimentResult::neutral()
            }
        }
    }

    async fn score_non_empty(&self, text: &str) -> SentimentResult {
        if let Some(primary) = &self.primary {
            match AssertUnwindSafe(primary.classify(text)).catch_unwind().await {
                Ok(Ok(classification)) => return from_classification(&classification),
                Ok(Err(e)) => {
                    warn!(
                        code = %e.error_code(),
                        "Primary sentiment model failed, using lexical fallback: {}", e
                    );
                }
                Err(_) => error!("Primary sentiment model panicked, using lexical fallback"),
            }
        }

        self.lexical_score(text)
    }

    /// Maps lexical polarity in [-1, 1] to a result.
    pub fn lexical_score(&self, text: &str) -> SentimentResult {
        let polarity = self.lexicon.polarity(text);
        debug!(polarity, "Lexical sentiment polarity");
        from_polarity(polarity)
    }
}

pub fn from_polarity(polarity: f64) -> SentimentResult {
    if polarity > NEUTRAL_BAND {
        let positive_score = (polarity + 1.0) / 2.0;
        SentimentResult {
            label: SentimentLabel::Positive,
            confidence: polarity.abs(),
            positive_score,
            negative_score: 0.0,
            neutral_score: 1.0 - positive_score,
        }
    } else if polarity < -NEUTRAL_BAND {
        let negative_score = (polarity.abs() + 1.0) / 2.0;
        SentimentResult {
            label: SentimentLabel::Negative,
            confidence: polarity.abs(),
            positive_score: 0.0,
            negative_score,
            neutral_score: 1.0 - negative_score,
        }
    } else {
        SentimentResult {
            label: SentimentLabel::Neutral,
            confidence: 1.0 - polarity.abs(),
            positive_score: 0.0,
            negative_score: 0.0,
            neutral_score: 1.0,
        }
    }
}

fn from_classification(classification: &Classification) -> SentimentResult {
    let confidence = classification.confidence.clamp(0.0, 1.0);
    match classification.label {
        SentimentLabel::Positive => SentimentResult {
            label: SentimentLabel::Positive,
            confidence,
            positive_score: confidence,
            negative_score: 0.0,
            neutral_score: 1.0 - confidence,
        },
        SentimentLabel::Negative => SentimentResult {
            label: SentimentLabel::Negative,
            confidence,
            positive_score: 0.0,
            negative_score: confidence,
            neutral_score: 1.0 - confidence,
        },
        SentimentLabel::Neutral => SentimentResult {
            label: SentimentLabel::Neutral,
            confidence,
            positive_score: 0.0,
            negative_score: 0.0,
            neutral_score: confidence,
        },
    }
}

fn sanitize(result: SentimentResult) -> SentimentResult {
    let finite = [
        result.confidence,
        result.positive_score,
        result.negative_score,
        result.neutral_score,
    ]
    .iter()
    .all(|value| value.is_finite());

    if !finite {
        warn!("Sentiment result contained non-finite scores, returning neutral result");
        return SentimentResult::neutral();
    }

    SentimentResult {
        confidence: result.confidence.clamp(0.0, 1.0),
        positive_score: result.positive_score.clamp(0.0, 1.0),
        negative_score: result.negative_score.clamp(0.0, 1.0),
        neutral_score: result.neutral_score.clamp(0.0, 1.0),
        ..result
    }
}
