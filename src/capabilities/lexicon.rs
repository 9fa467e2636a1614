use std::collections::HashSet;

use async_trait::async_trait;

use super::{normalize_word, truncate_chars, SentimentCapability, SENTIMENT_MAX_CHARS};
use crate::models::SentimentResult;

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "happy", "glad", "thanks", "thank", "appreciate",
    "helpful", "perfect", "wonderful", "awesome", "resolved", "love", "pleased",
    "nice", "fantastic", "satisfied", "amazing", "fine", "sure", "welcome",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "angry", "upset", "frustrated", "frustrating",
    "problem", "issue", "broken", "wrong", "cancel", "refund", "complaint",
    "disappointed", "horrible", "hate", "annoyed", "poor", "worst", "unacceptable",
    "charged", "error", "fail", "failed",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "don't", "didn't", "isn't", "wasn't", "can't"];

/// Word-list sentiment scorer
///
/// Counts positive and negative words, flipping the polarity of a word that
/// directly follows a negation. The score is `(pos - neg) / (pos + neg)`.
#[derive(Debug, Clone)]
pub struct LexiconSentiment {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
}

impl Default for LexiconSentiment {
    fn default() -> Self {
        Self {
            positive: POSITIVE_WORDS.iter().copied().collect(),
            negative: NEGATIVE_WORDS.iter().copied().collect(),
        }
    }
}

impl LexiconSentiment {
    fn score(&self, text: &str) -> SentimentResult {
        let mut positive = 0usize;
        let mut negative = 0usize;
        let mut negated = false;

        for raw in text.split_whitespace() {
            let word = normalize_word(raw);
            if word.is_empty() {
                continue;
            }

            let polarity = if self.positive.contains(word.as_str()) {
                1i8
            } else if self.negative.contains(word.as_str()) {
                -1
            } else {
                0
            };

            match (polarity, negated) {
                (1, false) | (-1, true) => positive += 1,
                (-1, false) | (1, true) => negative += 1,
                _ => {}
            }

            negated = NEGATIONS.contains(&word.as_str());
        }

        let total = positive + negative;
        if total == 0 || positive == negative {
            return SentimentResult::neutral();
        }

        let polarity = (positive as f64 - negative as f64) / total as f64;
        let label = if polarity > 0.0 { "POSITIVE" } else { "NEGATIVE" };
        SentimentResult::from_label(label, polarity.abs())
    }
}

#[async_trait]
impl SentimentCapability for LexiconSentiment {
    async fn analyze(&self, text: &str) -> SentimentResult {
        if text.trim().is_empty() {
            return SentimentResult::neutral();
        }
        self.score(truncate_chars(text, SENTIMENT_MAX_CHARS))
    }
}
