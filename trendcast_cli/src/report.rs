use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};

use trendcast_rs::{AnalysisError, LabeledRow, TickerAnalysis};

/// `short_term_prediction_5D` -> `Short Term Prediction 5D`.
pub fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut word_start = true;
    for ch in key.chars() {
        if ch == '_' {
            out.push(' ');
            word_start = true;
        } else if ch.is_alphabetic() {
            if word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(ch);
            word_start = true;
        }
    }
    out
}

pub fn analysis_lines(analysis: &TickerAnalysis) -> Vec<String> {
    let record = analysis.result.to_record();
    record
        .fields()
        .iter()
        .map(|(key, value)| format!("  {}: {}", title_case(key), value))
        .collect()
}

pub fn history_value(rows: &[LabeledRow]) -> Result<Value> {
    serde_json::to_value(rows).context("Failed to serialize indicator history")
}

pub fn analysis_value(outcome: &Result<TickerAnalysis, AnalysisError>) -> Result<Value> {
    match outcome {
        Ok(analysis) => {
            serde_json::to_value(&analysis.result).context("Failed to serialize analysis")
        }
        Err(err) => Ok(json!({ "error": err.to_string() })),
    }
}

pub fn write_document(path: &Path, document: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(document).context("Failed to render JSON output")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
