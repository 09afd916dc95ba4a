//! Core data models for codewaste
//!
//! These records flow through every analysis stage: the scanner produces
//! entities, the detectors derive signals/pairs/evidence from them, and the
//! reporters consume the assembled `AnalysisResult`. All derived records are
//! owned by the run that produced them and are never mutated afterward.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Generate a deterministic entity ID based on content hash.
///
/// The ID is a pure function of (file path, qualified name, start line), so
/// re-scanning an unchanged file reproduces identical IDs. This enables
/// tracking entities across runs and joining runtime/git evidence by ID.
///
/// Uses MD5 for stable cross-version hashing; `DefaultHasher` is intentionally
/// not stable across compiler versions.
pub fn deterministic_entity_id(file: &str, qualified_name: &str, line: u32) -> String {
    let input = format!("{file}:{qualified_name}:{line}");
    let digest = md5::compute(input.as_bytes());
    format!("{:x}", digest)[..12].to_string()
}

/// Confidence tier derived from thresholding a continuous score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
        }
    }
}

/// Severity levels for findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// One extracted function/method definition with location and source text.
///
/// `source` is the exact text of lines `[line_start, line_end]` of the
/// original file (1-based, inclusive).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    /// Repo-relative path with forward slashes
    pub file_path: String,
    /// Simple name of the function
    pub name: String,
    /// Dot-joined module path + enclosing types + simple name
    pub qualified_name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub source: String,
}

/// Heuristic estimate that an entity was machine-generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceSignal {
    pub entity_id: String,
    /// Clamped to [0, 0.99]; never reported as certainty
    pub probability: f64,
    pub confidence: Confidence,
    /// Human-readable labels for the features that contributed to the score
    pub signals: Vec<String>,
}

/// A near-duplicate pair of entities. `entity_a` always precedes `entity_b`
/// in scan order; the pair is emitted at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicationPair {
    pub entity_a: String,
    pub entity_b: String,
    /// Symmetric similarity ratio in [0, 1]
    pub similarity: f64,
    pub confidence: Confidence,
}

/// Per-entity line-blame statistics from version-control history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitEvidence {
    pub entity_id: String,
    /// Whether line-level blame data was obtainable for the entity's range
    pub available: bool,
    /// Distinct commits touching the entity's lines
    pub commit_count: Option<usize>,
    /// Distinct authors touching the entity's lines
    pub author_count: Option<usize>,
    /// Fraction of lines attributable to the single most-represented commit
    pub concentration: Option<f64>,
    /// Age in days of the most recent touching commit
    pub last_commit_age_days: Option<i64>,
    pub file_commit_count: usize,
    pub file_author_count: usize,
}

/// Runtime-invocation evidence mapped onto one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvidence {
    pub entity_id: String,
    /// None when no runtime record could be mapped to this entity
    pub invocation_count: Option<u64>,
    pub last_invoked_at: Option<String>,
    /// "runtime-file", "runtime-unmapped", or "runtime-unavailable"
    pub source: String,
}

/// A correlated review candidate produced by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub finding_type: String,
    pub severity: Severity,
    pub title: String,
    pub entity_ids: Vec<String>,
    pub evidence: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_annual_cost: Option<f64>,
}

/// Aggregate counters for one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub functions_scanned: usize,
    pub probable_ai_functions: usize,
    pub high_confidence_ai_functions: usize,
    pub high_confidence_duplication_pairs: usize,
    pub runtime_zero_invocations: usize,
    pub runtime_unknown: usize,
    pub probable_ai_zero_invocations: usize,
    pub git_evidence_available: usize,
    pub estimated_annualized_avoidable_runtime_cost: f64,
}

/// Everything one `analyze()` invocation produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub entities: Vec<Entity>,
    pub ai_signals: Vec<ProvenanceSignal>,
    pub duplication_pairs: Vec<DuplicationPair>,
    pub git_evidence: BTreeMap<String, GitEvidence>,
    pub runtime_evidence: BTreeMap<String, RuntimeEvidence>,
    pub findings: Vec<Finding>,
    pub summary: Summary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_deterministic() {
        let a = deterministic_entity_id("src/app.py", "app.handler", 10);
        let b = deterministic_entity_id("src/app.py", "app.handler", 10);
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn test_entity_id_varies_with_inputs() {
        let base = deterministic_entity_id("src/app.py", "app.handler", 10);
        assert_ne!(base, deterministic_entity_id("src/app.py", "app.handler", 11));
        assert_ne!(base, deterministic_entity_id("src/app.py", "app.other", 10));
        assert_ne!(base, deterministic_entity_id("src/b.py", "app.handler", 10));
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Low.to_string(), "low");
        assert_eq!(Severity::High.to_string(), "high");
        assert_eq!(Confidence::Medium.to_string(), "medium");
    }
}
