//! Lexical polarity scoring used when no sentiment model is reachable.
//!
//! Word scores come from `data/polarity.tsv` on a -5..=5 scale and are
//! normalized to -1..=1. A word's polarity is scaled by an intensifier
//! directly before it and flipped (halved) by a negation up to three words
//! before it. The text polarity is the mean over scored words.

use std::collections::HashMap;
use std::sync::LazyLock;

const POLARITY_DATA: &str = include_str!("../data/polarity.tsv");

/// Words between a negation and the word it flips.
const NEGATION_WINDOW: usize = 3;

const NEGATION_FACTOR: f64 = -0.5;

static POLARITY_SCORES: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    POLARITY_DATA
        .lines()
        .filter_map(|line| {
            let (word, score) = line.split_once('\t')?;
            let score = score.trim().parse::<i8>().ok()?;
            Some((word.trim(), f64::from(score) / 5.0))
        })
        .collect()
});

const INTENSIFIERS: &[(&str, f64)] = &[
    ("absolutely", 1.4),
    ("completely", 1.3),
    ("extremely", 1.5),
    ("highly", 1.3),
    ("incredibly", 1.4),
    ("really", 1.2),
    ("so", 1.2),
    ("super", 1.3),
    ("totally", 1.3),
    ("very", 1.3),
    ("barely", 0.4),
    ("kinda", 0.7),
    ("slightly", 0.5),
    ("somewhat", 0.6),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "nothing", "nobody", "none", "neither", "nor", "cannot", "without",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct PolarityLexicon;

impl PolarityLexicon {
    pub fn new() -> Self {
        Self
    }

    /// Polarity of `text` in [-1, 1]; 0.0 when no scored word occurs.
    pub fn polarity(&self, text: &str) -> f64 {
        let tokens = tokenize(text);
        let mut total = 0.0;
        let mut scored = 0usize;

        for (index, token) in tokens.iter().enumerate() {
            let Some(&base) = POLARITY_SCORES.get(token.as_str()) else {
                continue;
            };

            let mut value = base;
            if index > 0 {
                if let Some(multiplier) = intensifier(&tokens[index - 1]) {
                    value *= multiplier;
                }
            }

            let window_start = index.saturating_sub(NEGATION_WINDOW);
            if tokens[window_start..index].iter().any(|t| is_negation(t)) {
                value *= NEGATION_FACTOR;
            }

            total += value;
            scored += 1;
        }

        if scored == 0 {
            return 0.0;
        }
        (total / scored as f64).clamp(-1.0, 1.0)
    }

    pub fn contains(&self, word: &str) -> bool {
        POLARITY_SCORES.contains_key(word.to_lowercase().as_str())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('\u{2019}', "'")
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|token| token.trim_matches('\''))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn intensifier(token: &str) -> Option<f64> {
    INTENSIFIERS
        .iter()
        .find(|(word, _)| *word == token)
        .map(|(_, multiplier)| *multiplier)
}

fn is_negation(token: &str) -> bool {
    NEGATIONS.contains(&token) || token.ends_with("n't")
}
