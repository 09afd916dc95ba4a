//! JSON reporter
//!
//! Emits the full analysis payload as pretty-printed JSON: report metadata,
//! summary counters, every evidence layer, findings, and the trend against
//! the previous recorded run when history is enabled.

use super::ReportContext;
use crate::models::AnalysisResult;
use anyhow::Result;
use chrono::Utc;
use serde_json::json;

pub fn render(result: &AnalysisResult, ctx: &ReportContext<'_>) -> Result<String> {
    let generated_at = Utc::now().format("%Y-%m-%d %H:%M:%SZ").to_string();

    let payload = json!({
        "meta": {
            "repository": ctx.repo_path.display().to_string(),
            "generated_at": generated_at,
            "time_window_days": ctx.time_window_days,
            "currency": ctx.currency,
        },
        "summary": result.summary,
        "entities": result.entities,
        "ai_signals": result.ai_signals,
        "duplication_pairs": result.duplication_pairs,
        "git_evidence": result.git_evidence,
        "runtime_evidence": result.runtime_evidence,
        "findings": result.findings,
        "trend": ctx.history.and_then(|receipt| receipt.trend.as_ref()),
        "previous_scanned_at": ctx.history.and_then(|receipt| receipt.previous_scanned_at.as_ref()),
    });

    Ok(serde_json::to_string_pretty(&payload)?)
}
