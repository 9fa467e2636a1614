/// Word counts attributed to each side of the call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TalkStats {
    pub agent_words: usize,
    pub customer_words: usize,
}

impl TalkStats {
    /// Count attributed words in a cleaned transcript
    ///
    /// Only lines starting with `agent:` or `customer:` (case-insensitive)
    /// are attributed. The label counts as one whitespace token and is
    /// subtracted from the line's total.
    pub fn from_transcript(transcript: &str) -> Self {
        let mut stats = TalkStats::default();

        for line in transcript.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let lower = line.to_lowercase();
            let words = line.split_whitespace().count().saturating_sub(1);

            if lower.starts_with("agent:") {
                stats.agent_words += words;
            } else if lower.starts_with("customer:") {
                stats.customer_words += words;
            }
        }

        stats
    }

    pub fn total_words(&self) -> usize {
        self.agent_words + self.customer_words
    }

    /// Agent share of attributed words, 0.0 when nothing is attributed
    pub fn agent_ratio(&self) -> f64 {
        let total = self.total_words();
        if total == 0 {
            0.0
        } else {
            self.agent_words as f64 / total as f64
        }
    }
}

/// Fraction of attributed words spoken by the agent, in [0, 1]
pub fn agent_talk_ratio(transcript: &str) -> f64 {
    TalkStats::from_transcript(transcript).agent_ratio()
}
