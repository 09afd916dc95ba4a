//! Markdown reporter
//!
//! Human-readable diagnostic report: scope, summary, trend against the
//! previous recorded run, a waste taxonomy table, and evidence snapshots for
//! the top findings.

use super::{format_currency, ReportContext};
use crate::models::{AnalysisResult, Entity};
use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Maximum findings rendered in the evidence section
const MAX_FINDINGS: usize = 20;

fn entity_reference<'a>(entities: &'a HashMap<&str, &Entity>, entity_id: &'a str) -> String {
    match entities.get(entity_id) {
        Some(entity) => format!("{}:{}", entity.file_path, entity.line_start),
        None => entity_id.to_string(),
    }
}

pub fn render(result: &AnalysisResult, ctx: &ReportContext<'_>) -> Result<String> {
    let entity_by_id: HashMap<&str, &Entity> = result
        .entities
        .iter()
        .map(|entity| (entity.id.as_str(), entity))
        .collect();
    let generated_at = Utc::now().format("%Y-%m-%d %H:%M:%SZ").to_string();
    let summary = &result.summary;

    let cost_text = if summary.estimated_annualized_avoidable_runtime_cost > 0.0 {
        format_currency(
            summary.estimated_annualized_avoidable_runtime_cost,
            ctx.currency,
        )
    } else {
        "Not calculated (set --cost-per-invocation to enable)".to_string()
    };

    let mut md = String::new();
    md.push_str("# Software Intelligence Waste Diagnostic\n\n");

    md.push_str("## Scope\n");
    writeln!(md, "- Repository: `{}`", ctx.repo_path.display())?;
    writeln!(md, "- Generated at: `{generated_at}`")?;
    writeln!(md, "- Runtime window: `{}` days", ctx.time_window_days)?;
    md.push('\n');

    md.push_str("## Executive Truth Summary\n");
    writeln!(md, "- Functions scanned: **{}**", summary.functions_scanned)?;
    writeln!(
        md,
        "- Probable AI-generated functions: **{}**",
        summary.probable_ai_functions
    )?;
    writeln!(
        md,
        "- High-confidence duplicate pairs: **{}**",
        summary.high_confidence_duplication_pairs
    )?;
    writeln!(
        md,
        "- Probable AI functions with zero runtime invocations: **{}**",
        summary.probable_ai_zero_invocations
    )?;
    writeln!(
        md,
        "- Git provenance coverage: **{}**",
        summary.git_evidence_available
    )?;
    writeln!(
        md,
        "- Estimated annualized avoidable runtime cost: **{cost_text}**"
    )?;
    md.push('\n');

    if let Some(receipt) = ctx.history {
        if let (Some(trend), Some(previous_scanned_at)) =
            (&receipt.trend, &receipt.previous_scanned_at)
        {
            md.push_str("## Trend vs Previous Run\n");
            writeln!(md, "- Previous run: `{previous_scanned_at}`")?;
            writeln!(
                md,
                "- Functions scanned delta: **{:+}**",
                trend.functions_scanned_delta
            )?;
            writeln!(
                md,
                "- Probable AI functions delta: **{:+}**",
                trend.probable_ai_functions_delta
            )?;
            writeln!(
                md,
                "- High-confidence duplicate pairs delta: **{:+}**",
                trend.high_confidence_duplication_pairs_delta
            )?;
            writeln!(
                md,
                "- Runtime zero-invocation delta: **{:+}**",
                trend.runtime_zero_invocations_delta
            )?;
            writeln!(
                md,
                "- Estimated annualized avoidable runtime cost delta: **{}**",
                format_currency(
                    trend.estimated_annualized_avoidable_runtime_cost_delta,
                    ctx.currency
                )
            )?;
            md.push('\n');
        }
    }

    md.push_str("## Waste Taxonomy Mapping\n");
    md.push_str("| Category | Instances | Economic signal |\n");
    md.push_str("| --- | ---: | --- |\n");
    writeln!(
        md,
        "| Structural duplication | {} | Consolidation may reduce repeated execution and maintenance. |",
        summary.high_confidence_duplication_pairs
    )?;
    writeln!(
        md,
        "| Runtime unused paths | {} | Unused paths carry maintenance burden without runtime value. |",
        summary.runtime_zero_invocations
    )?;
    writeln!(
        md,
        "| Probable AI + runtime unused | {} | Candidate area for delete/consolidate review. |",
        summary.probable_ai_zero_invocations
    )?;
    writeln!(
        md,
        "| Runtime ambiguity | {} | No decision without mapped runtime evidence. |",
        summary.runtime_unknown
    )?;
    md.push('\n');

    md.push_str("## Evidence Snapshots\n");
    if result.findings.is_empty() {
        md.push_str("- No high-confidence findings met report thresholds.\n");
    } else {
        for (index, finding) in result.findings.iter().take(MAX_FINDINGS).enumerate() {
            writeln!(md, "{}. **{}**", index + 1, finding.title)?;
            writeln!(md, "   - Type: `{}`", finding.finding_type)?;
            writeln!(md, "   - Severity: `{}`", finding.severity)?;
            if !finding.entity_ids.is_empty() {
                let refs: Vec<String> = finding
                    .entity_ids
                    .iter()
                    .map(|entity_id| format!("`{}`", entity_reference(&entity_by_id, entity_id)))
                    .collect();
                writeln!(md, "   - Entities: {}", refs.join(", "))?;
            }
            if !finding.evidence.is_empty() {
                writeln!(md, "   - Evidence: {}", finding.evidence.join("; "))?;
            }
            if let Some(cost) = finding.estimated_annual_cost {
                writeln!(
                    md,
                    "   - Estimated annual cost: {}",
                    format_currency(cost, ctx.currency)
                )?;
            }
        }
    }
    md.push('\n');

    md.push_str("## Method Constraints\n");
    md.push_str("- Diagnostic only: no code mutation, no auto-refactor.\n");
    md.push_str("- AI provenance is heuristic probability, not authorship proof.\n");
    md.push_str("- Runtime mapping is best-effort; ambiguous mappings stay unresolved.\n");

    Ok(md)
}
