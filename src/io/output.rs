use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{CallRecord, ProcessingStatus, SentimentScores};

/// Insight report for one call
#[derive(Debug, Clone, Serialize)]
pub struct InsightReport {
    pub call_id: i64,
    pub processing_status: ProcessingStatus,
    pub agent_talk_ratio: Option<f64>,
    pub sentiment_score: Option<f64>,
    pub sentiment_scores: Option<SentimentScores>,
    pub embedding: Option<Vec<f32>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub metadata: ReportMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub agent_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub language: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub transcript_lines: usize,
}

impl InsightReport {
    pub fn from_record(record: &CallRecord) -> Self {
        Self {
            call_id: record.call_id,
            processing_status: record.processing_status.clone(),
            agent_talk_ratio: record.agent_talk_ratio,
            sentiment_score: record.sentiment_score,
            sentiment_scores: record.sentiment_scores.clone(),
            embedding: record.embedding.clone(),
            processed_at: record.processed_at,
            metadata: ReportMetadata {
                agent_id: record.agent_id,
                customer_id: record.customer_id,
                language: record.language.clone(),
                start_time: record.start_time,
                duration_seconds: record.duration_seconds,
                transcript_lines: record.transcript.lines().filter(|l| !l.trim().is_empty()).count(),
            },
        }
    }

    /// Write to a JSON file
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write JSON")?;
        Ok(())
    }

    /// Format the report as human-readable text
    pub fn format(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "Call {}", self.call_id);
        let _ = writeln!(output, "{}", "=".repeat(5 + self.call_id.to_string().len()));
        let _ = writeln!(output, "Status: {}", self.processing_status);
        if let Some(language) = &self.metadata.language {
            let _ = writeln!(output, "Language: {}", language);
        }
        if let Some(duration) = self.metadata.duration_seconds {
            let _ = writeln!(output, "Duration: {}", format_duration(duration));
        }
        let _ = writeln!(output, "Transcript lines: {}", self.metadata.transcript_lines);

        match self.agent_talk_ratio {
            Some(ratio) => {
                let _ = writeln!(output, "Agent talk ratio: {:.1}%", ratio * 100.0);
            }
            None => {
                let _ = writeln!(output, "Agent talk ratio: -");
            }
        }

        match self.sentiment_score {
            Some(score) => {
                let _ = writeln!(output, "Sentiment: {:+.3}", score);
            }
            None => {
                let _ = writeln!(output, "Sentiment: -");
            }
        }
        if let Some(scores) = &self.sentiment_scores {
            for (key, result) in scores {
                let _ = write!(output, "  {}: {} ({:+.3})", key, result.label, result.score);
                if let Some(error) = &result.error {
                    let _ = write!(output, " error: {}", error);
                }
                output.push('\n');
            }
        }

        let dimension = self.embedding.as_ref().map_or(0, Vec::len);
        let _ = writeln!(output, "Embedding dimension: {}", dimension);
        if let Some(processed_at) = self.processed_at {
            let _ = writeln!(output, "Processed at: {}", processed_at.to_rfc3339());
        }

        output
    }
}

/// Table of record counts per status kind
pub fn format_status_counts(counts: &[(String, usize)]) -> String {
    let mut output = String::new();
    let total: usize = counts.iter().map(|(_, n)| n).sum();

    let _ = writeln!(output, "Processing Status");
    let _ = writeln!(output, "-----------------");
    for (status, count) in counts {
        let _ = writeln!(output, "{:<12} {:>6}", status, count);
    }
    let _ = writeln!(output, "{:<12} {:>6}", "total", total);

    output
}

/// Format seconds as MM:SS
fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
