//! Analysis pipeline
//!
//! Runs the full pass over one repository: scan entities, gather version
//! control evidence, score provenance, detect duplication, join runtime
//! counts, then correlate the layers into review findings. Every finding is
//! advisory; nothing here deletes or rewrites code.

use crate::config::{AnalysisConfig, ConfigError};
use crate::models::{AnalysisResult, Confidence, Finding, Severity, Summary};
use crate::{duplication, gitinfo, provenance, runtime, scanner};
use anyhow::Result;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Analyze the repository at `root`, optionally joining a runtime profile.
pub fn analyze(
    root: &Path,
    runtime_path: Option<&Path>,
    cfg: &AnalysisConfig,
) -> Result<AnalysisResult> {
    cfg.validate()?;
    if !root.is_dir() {
        return Err(ConfigError::RootNotFound(root.to_path_buf()).into());
    }

    let entities = scanner::scan_repository(root, cfg.include_tests)?;
    info!(count = entities.len(), "extracted entities");

    let git_evidence = if cfg.git_enabled {
        gitinfo::collect(root, &entities)
    } else {
        debug!("version control evidence disabled");
        BTreeMap::new()
    };

    let ai_signals = provenance::score_entities(&entities, &git_evidence, cfg);
    let duplication_pairs = duplication::detect_duplication_pairs(&entities, cfg);

    let runtime_records = match runtime_path {
        Some(path) => Some(runtime::load_runtime_data(path)?),
        None => None,
    };
    let runtime_evidence = runtime::map_runtime_evidence(&entities, runtime_records.as_ref());

    let ai_by_entity: BTreeMap<&str, &crate::models::ProvenanceSignal> = ai_signals
        .iter()
        .map(|signal| (signal.entity_id.as_str(), signal))
        .collect();
    let duplicate_members: HashSet<&str> = duplication_pairs
        .iter()
        .flat_map(|pair| [pair.entity_a.as_str(), pair.entity_b.as_str()])
        .collect();

    let mut findings = Vec::new();
    let mut annualized_cost_total = 0.0;
    let mut runtime_zero_invocations = 0;
    let mut runtime_unknown = 0;
    let mut probable_ai_zero_invocations = 0;

    for entity in &entities {
        let runtime = &runtime_evidence[&entity.id];
        let signal = ai_by_entity.get(entity.id.as_str());

        if runtime.invocation_count == Some(0) {
            runtime_zero_invocations += 1;
            if let Some(signal) = signal {
                probable_ai_zero_invocations += 1;
                findings.push(Finding {
                    finding_type: "runtime_unused_review".to_string(),
                    severity: Severity::Low,
                    title: "Probable AI-generated function with zero runtime usage".to_string(),
                    entity_ids: vec![entity.id.clone()],
                    evidence: vec![
                        format!("ai_probability={}", signal.probability),
                        "runtime_invocations=0".to_string(),
                        format!("confidence={}", signal.confidence),
                    ],
                    estimated_annual_cost: None,
                });
            }
        }

        if runtime.invocation_count.is_none() {
            runtime_unknown += 1;
        }

        if let Some(signal) = signal {
            if signal.confidence == Confidence::High
                && runtime.invocation_count == Some(0)
                && duplicate_members.contains(entity.id.as_str())
            {
                findings.push(Finding {
                    finding_type: "delete_candidate_review".to_string(),
                    severity: Severity::Low,
                    title: "High-confidence delete candidate (human review required)".to_string(),
                    entity_ids: vec![entity.id.clone()],
                    evidence: vec![
                        format!("ai_probability={}", signal.probability),
                        "runtime_invocations=0".to_string(),
                        "high_semantic_overlap=true".to_string(),
                    ],
                    estimated_annual_cost: None,
                });
            }
        }
    }

    for pair in &duplication_pairs {
        let runtime_a = &runtime_evidence[&pair.entity_a];
        let runtime_b = &runtime_evidence[&pair.entity_b];
        let (Some(invocations_a), Some(invocations_b)) =
            (runtime_a.invocation_count, runtime_b.invocation_count)
        else {
            continue;
        };
        if invocations_a == 0 || invocations_b == 0 {
            continue;
        }

        let estimated_annual_cost = if cfg.cost_per_invocation > 0.0 {
            let duplicate_invocations = invocations_a.min(invocations_b);
            let annualization_factor = 365.0 / cfg.time_window_days.max(1) as f64;
            let cost = round2(
                duplicate_invocations as f64 * cfg.cost_per_invocation * annualization_factor,
            );
            annualized_cost_total += cost;
            Some(cost)
        } else {
            None
        };

        findings.push(Finding {
            finding_type: "consolidation_candidate_review".to_string(),
            severity: Severity::Medium,
            title: "High-overlap active duplicate logic (human review required)".to_string(),
            entity_ids: vec![pair.entity_a.clone(), pair.entity_b.clone()],
            evidence: vec![
                format!("semantic_overlap={}", pair.similarity),
                format!("invocations_a={invocations_a}"),
                format!("invocations_b={invocations_b}"),
            ],
            estimated_annual_cost,
        });
    }

    let summary = Summary {
        functions_scanned: entities.len(),
        probable_ai_functions: ai_signals.len(),
        high_confidence_ai_functions: ai_signals
            .iter()
            .filter(|signal| signal.confidence == Confidence::High)
            .count(),
        high_confidence_duplication_pairs: duplication_pairs
            .iter()
            .filter(|pair| pair.confidence == Confidence::High)
            .count(),
        runtime_zero_invocations,
        runtime_unknown,
        probable_ai_zero_invocations,
        git_evidence_available: git_evidence
            .values()
            .filter(|evidence| evidence.available)
            .count(),
        estimated_annualized_avoidable_runtime_cost: round2(annualized_cost_total),
    };
    info!(
        findings = findings.len(),
        ai_signals = summary.probable_ai_functions,
        duplication_pairs = duplication_pairs.len(),
        "analysis complete"
    );

    Ok(AnalysisResult {
        entities,
        ai_signals,
        duplication_pairs,
        git_evidence,
        runtime_evidence,
        findings,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const GENERATED_PAIR: &str = concat!(
        "def validate_order_request(payload):\n",
        "    if payload is None:\n",
        "        raise ValueError(\"invalid payload error\")\n",
        "    if not payload:\n",
        "        raise ValueError(\"invalid payload error\")\n",
        "    if payload == {}:\n",
        "        return None\n",
        "    if payload == []:\n",
        "        return None\n",
        "    data = payload\n",
        "    result = dict(data)\n",
        "    result[\"order_id\"] = data[\"order_id\"]\n",
        "    result[\"status\"] = data[\"status\"]\n",
        "    return result\n",
        "\n",
        "\n",
        "def validate_order_payload(incoming):\n",
        "    if incoming is None:\n",
        "        raise ValueError(\"invalid incoming error\")\n",
        "    if not incoming:\n",
        "        raise ValueError(\"invalid incoming error\")\n",
        "    if incoming == {}:\n",
        "        return None\n",
        "    if incoming == []:\n",
        "        return None\n",
        "    data = incoming\n",
        "    result = dict(data)\n",
        "    result[\"order_id\"] = data[\"order_id\"]\n",
        "    result[\"status\"] = data[\"status\"]\n",
        "    return result\n",
    );

    fn no_git_config() -> AnalysisConfig {
        AnalysisConfig {
            git_enabled: false,
            min_dup_signature_chars: 0,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_analyze_missing_root_fails() {
        let missing = Path::new("/definitely/not/here");
        assert!(analyze(missing, None, &AnalysisConfig::default()).is_err());
    }

    #[test]
    fn test_unused_ai_duplicates_yield_delete_candidates() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("orders.py"), GENERATED_PAIR).expect("write");
        let runtime_path = dir.path().join("runtime.json");
        fs::write(
            &runtime_path,
            r#"{"orders.validate_order_request": 0, "orders.validate_order_payload": 0}"#,
        )
        .expect("write runtime");

        let result =
            analyze(dir.path(), Some(&runtime_path), &no_git_config()).expect("analysis runs");

        assert_eq!(result.summary.functions_scanned, 2);
        assert_eq!(result.summary.probable_ai_functions, 2);
        assert_eq!(result.summary.high_confidence_duplication_pairs, 1);
        assert_eq!(result.summary.runtime_zero_invocations, 2);
        assert_eq!(result.summary.probable_ai_zero_invocations, 2);

        let unused = result
            .findings
            .iter()
            .filter(|finding| finding.finding_type == "runtime_unused_review")
            .count();
        let deletable = result
            .findings
            .iter()
            .filter(|finding| finding.finding_type == "delete_candidate_review")
            .count();
        assert_eq!(unused, 2);
        assert_eq!(deletable, 2);
    }

    #[test]
    fn test_active_duplicates_yield_consolidation_with_cost() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("orders.py"), GENERATED_PAIR).expect("write");
        let runtime_path = dir.path().join("runtime.json");
        fs::write(
            &runtime_path,
            r#"{"orders.validate_order_request": 400, "orders.validate_order_payload": 100}"#,
        )
        .expect("write runtime");

        let cfg = AnalysisConfig {
            cost_per_invocation: 0.01,
            time_window_days: 365,
            ..no_git_config()
        };
        let result = analyze(dir.path(), Some(&runtime_path), &cfg).expect("analysis runs");

        let consolidation: Vec<&Finding> = result
            .findings
            .iter()
            .filter(|finding| finding.finding_type == "consolidation_candidate_review")
            .collect();
        assert_eq!(consolidation.len(), 1);
        // min(400, 100) * 0.01 * 365/365
        assert_eq!(consolidation[0].estimated_annual_cost, Some(1.0));
        assert_eq!(
            result.summary.estimated_annualized_avoidable_runtime_cost,
            1.0
        );
        assert!(!result
            .findings
            .iter()
            .any(|finding| finding.finding_type == "delete_candidate_review"));
    }

    #[test]
    fn test_no_runtime_profile_means_unknown_not_zero() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("orders.py"), GENERATED_PAIR).expect("write");

        let result = analyze(dir.path(), None, &no_git_config()).expect("analysis runs");
        assert_eq!(result.summary.runtime_unknown, 2);
        assert_eq!(result.summary.runtime_zero_invocations, 0);
        assert!(result
            .findings
            .iter()
            .all(|finding| finding.finding_type != "runtime_unused_review"));
    }

    #[test]
    fn test_partial_profile_does_not_flag_uncovered_functions() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("orders.py"), GENERATED_PAIR).expect("write");
        let runtime_path = dir.path().join("runtime.json");
        fs::write(
            &runtime_path,
            r#"{"other.module.other_function": 10}"#,
        )
        .expect("write runtime");

        let result =
            analyze(dir.path(), Some(&runtime_path), &no_git_config()).expect("analysis runs");
        assert_eq!(result.summary.runtime_zero_invocations, 0);
        assert_eq!(result.summary.runtime_unknown, 2);
        assert!(result
            .findings
            .iter()
            .all(|finding| finding.finding_type != "runtime_unused_review"));
    }

    #[test]
    fn test_git_disabled_reports_no_evidence() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("orders.py"), GENERATED_PAIR).expect("write");
        let result = analyze(dir.path(), None, &no_git_config()).expect("analysis runs");
        assert!(result.git_evidence.is_empty());
        assert_eq!(result.summary.git_evidence_available, 0);
    }
}
