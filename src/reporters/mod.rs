//! Output reporters for analysis results
//!
//! Supports two formats:
//! - `markdown` - human-readable diagnostic report
//! - `json` - machine-readable payload with every evidence layer

mod json;
mod markdown;

use crate::history::RunReceipt;
use crate::models::AnalysisResult;
use anyhow::{anyhow, Result};
use std::path::Path;
use std::str::FromStr;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!(
                "Unknown format '{}'. Valid formats: markdown, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Run-level facts the reporters need beyond the analysis result itself.
pub struct ReportContext<'a> {
    pub repo_path: &'a Path,
    pub time_window_days: u32,
    pub currency: &'a str,
    pub history: Option<&'a RunReceipt>,
}

/// Render an analysis result in the requested format.
pub fn render(
    result: &AnalysisResult,
    ctx: &ReportContext<'_>,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Markdown => markdown::render(result, ctx),
        OutputFormat::Json => json::render(result, ctx),
    }
}

/// Format a monetary amount with thousands separators, e.g. `USD 1,234.50`.
pub(crate) fn format_currency(value: f64, currency: &str) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let fraction = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{currency} {sign}{grouped}.{fraction:02}")
}
