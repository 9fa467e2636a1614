use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::models::NewCall;

/// Parse a JSON file holding an array of raw calls
pub fn parse_calls_file(path: &Path) -> Result<Vec<NewCall>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    parse_calls_json(&content)
}

/// Parse a JSON array of raw calls, rejecting repeated call ids
pub fn parse_calls_json(json: &str) -> Result<Vec<NewCall>> {
    let calls: Vec<NewCall> = serde_json::from_str(json).context("Failed to parse calls JSON")?;

    let mut seen = HashSet::with_capacity(calls.len());
    for call in &calls {
        if !seen.insert(call.call_id) {
            bail!("Duplicate call_id {} in input", call.call_id);
        }
    }

    Ok(calls)
}
