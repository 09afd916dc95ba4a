//! Run history persistence
//!
//! Records each analysis run in a SQLite database so successive runs over the
//! same repository can report trend deltas. The schema is created on first
//! use; columns added after the initial release are backfilled through
//! `ensure_column` so older databases keep working.

use crate::config::AnalysisConfig;
use crate::models::{Finding, Summary};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Metric deltas against the previous recorded run for the same repository.
#[derive(Debug, Clone, Serialize)]
pub struct Trend {
    pub functions_scanned_delta: i64,
    pub probable_ai_functions_delta: i64,
    pub high_confidence_duplication_pairs_delta: i64,
    pub runtime_zero_invocations_delta: i64,
    pub probable_ai_zero_invocations_delta: i64,
    pub estimated_annualized_avoidable_runtime_cost_delta: f64,
}

/// What `record_run` stored, plus the comparison to the previous run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReceipt {
    pub run_id: i64,
    pub scanned_at: String,
    pub previous_run_id: Option<i64>,
    pub previous_scanned_at: Option<String>,
    pub trend: Option<Trend>,
}

struct PreviousRun {
    id: i64,
    scanned_at: String,
    functions_scanned: i64,
    probable_ai_functions: i64,
    high_confidence_duplication_pairs: i64,
    runtime_zero_invocations: i64,
    probable_ai_zero_invocations: i64,
    estimated_cost: f64,
}

/// Repositories are keyed by lowercased canonical path so runs from different
/// working directories land on the same history.
fn repo_key(repo_path: &Path) -> String {
    let resolved = fs::canonicalize(repo_path).unwrap_or_else(|_| repo_path.to_path_buf());
    resolved.to_string_lossy().to_lowercase()
}

fn ensure_column(
    connection: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<()> {
    let mut stmt = connection.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<_>>()?;
    if !existing.iter().any(|name| name == column) {
        debug!(table, column, "adding missing history column");
        connection.execute(
            &format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"),
            [],
        )?;
    }
    Ok(())
}

fn open(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history directory {}", parent.display())
            })?;
        }
    }
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open history database {}", db_path.display()))?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    initialize_schema(&connection)?;
    Ok(connection)
}

fn initialize_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repo_key TEXT NOT NULL,
            repo_path TEXT NOT NULL,
            scanned_at TEXT NOT NULL,
            functions_scanned INTEGER NOT NULL,
            probable_ai_functions INTEGER NOT NULL,
            high_confidence_duplication_pairs INTEGER NOT NULL,
            runtime_zero_invocations INTEGER NOT NULL,
            probable_ai_zero_invocations INTEGER NOT NULL,
            estimated_annualized_avoidable_runtime_cost REAL NOT NULL,
            ai_threshold REAL NOT NULL,
            dup_threshold REAL NOT NULL,
            min_dup_body_statements INTEGER NOT NULL,
            min_dup_signature_chars INTEGER NOT NULL,
            include_tests INTEGER NOT NULL,
            git_provenance_enabled INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS finding_counts (
            run_id INTEGER NOT NULL,
            finding_type TEXT NOT NULL,
            finding_count INTEGER NOT NULL,
            PRIMARY KEY (run_id, finding_type),
            FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_runs_repo_key_id ON runs(repo_key, id);",
    )?;
    ensure_column(
        connection,
        "runs",
        "min_dup_signature_chars",
        "INTEGER NOT NULL DEFAULT 160",
    )?;
    ensure_column(
        connection,
        "runs",
        "git_provenance_enabled",
        "INTEGER NOT NULL DEFAULT 1",
    )?;
    Ok(())
}

/// Persist one run and compute deltas against the previous run for the same
/// repository, if any.
pub fn record_run(
    db_path: &Path,
    repo_path: &Path,
    summary: &Summary,
    findings: &[Finding],
    cfg: &AnalysisConfig,
) -> Result<RunReceipt> {
    let key = repo_key(repo_path);
    let resolved_repo = fs::canonicalize(repo_path)
        .unwrap_or_else(|_| repo_path.to_path_buf())
        .to_string_lossy()
        .into_owned();
    let scanned_at = Utc::now().format("%Y-%m-%d %H:%M:%SZ").to_string();

    let connection = open(db_path)?;
    connection.execute(
        "INSERT INTO runs (
            repo_key, repo_path, scanned_at,
            functions_scanned, probable_ai_functions,
            high_confidence_duplication_pairs, runtime_zero_invocations,
            probable_ai_zero_invocations,
            estimated_annualized_avoidable_runtime_cost,
            ai_threshold, dup_threshold, min_dup_body_statements,
            min_dup_signature_chars, include_tests, git_provenance_enabled
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            key,
            resolved_repo,
            scanned_at,
            summary.functions_scanned as i64,
            summary.probable_ai_functions as i64,
            summary.high_confidence_duplication_pairs as i64,
            summary.runtime_zero_invocations as i64,
            summary.probable_ai_zero_invocations as i64,
            summary.estimated_annualized_avoidable_runtime_cost,
            cfg.ai_threshold,
            cfg.dup_high_threshold,
            cfg.min_dup_body_statements as i64,
            cfg.min_dup_signature_chars as i64,
            cfg.include_tests as i64,
            cfg.git_enabled as i64,
        ],
    )?;
    let run_id = connection.last_insert_rowid();

    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.finding_type.as_str()).or_insert(0) += 1;
    }
    for (finding_type, finding_count) in counts {
        connection.execute(
            "INSERT INTO finding_counts (run_id, finding_type, finding_count)
             VALUES (?1, ?2, ?3)",
            params![run_id, finding_type, finding_count],
        )?;
    }

    let previous = connection
        .query_row(
            "SELECT id, scanned_at, functions_scanned, probable_ai_functions,
                    high_confidence_duplication_pairs, runtime_zero_invocations,
                    probable_ai_zero_invocations,
                    estimated_annualized_avoidable_runtime_cost
             FROM runs
             WHERE repo_key = ?1 AND id < ?2
             ORDER BY id DESC
             LIMIT 1",
            params![key, run_id],
            |row| {
                Ok(PreviousRun {
                    id: row.get(0)?,
                    scanned_at: row.get(1)?,
                    functions_scanned: row.get(2)?,
                    probable_ai_functions: row.get(3)?,
                    high_confidence_duplication_pairs: row.get(4)?,
                    runtime_zero_invocations: row.get(5)?,
                    probable_ai_zero_invocations: row.get(6)?,
                    estimated_cost: row.get(7)?,
                })
            },
        )
        .optional()?;

    let trend = previous.as_ref().map(|prev| Trend {
        functions_scanned_delta: summary.functions_scanned as i64 - prev.functions_scanned,
        probable_ai_functions_delta: summary.probable_ai_functions as i64
            - prev.probable_ai_functions,
        high_confidence_duplication_pairs_delta: summary.high_confidence_duplication_pairs as i64
            - prev.high_confidence_duplication_pairs,
        runtime_zero_invocations_delta: summary.runtime_zero_invocations as i64
            - prev.runtime_zero_invocations,
        probable_ai_zero_invocations_delta: summary.probable_ai_zero_invocations as i64
            - prev.probable_ai_zero_invocations,
        estimated_annualized_avoidable_runtime_cost_delta: ((summary
            .estimated_annualized_avoidable_runtime_cost
            - prev.estimated_cost)
            * 100.0)
            .round()
            / 100.0,
    });

    Ok(RunReceipt {
        run_id,
        scanned_at,
        previous_run_id: previous.as_ref().map(|prev| prev.id),
        previous_scanned_at: previous.map(|prev| prev.scanned_at),
        trend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn summary(functions: usize, cost: f64) -> Summary {
        Summary {
            functions_scanned: functions,
            probable_ai_functions: 2,
            high_confidence_ai_functions: 1,
            high_confidence_duplication_pairs: 1,
            runtime_zero_invocations: 1,
            runtime_unknown: 0,
            probable_ai_zero_invocations: 1,
            git_evidence_available: 0,
            estimated_annualized_avoidable_runtime_cost: cost,
        }
    }

    #[test]
    fn test_first_run_has_no_trend() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("history.db");
        let receipt = record_run(
            &db,
            dir.path(),
            &summary(10, 0.0),
            &[],
            &AnalysisConfig::default(),
        )
        .expect("recorded");
        assert!(receipt.trend.is_none());
        assert!(receipt.previous_run_id.is_none());
    }

    #[test]
    fn test_second_run_reports_deltas() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("history.db");
        let cfg = AnalysisConfig::default();
        let first = record_run(&db, dir.path(), &summary(10, 5.0), &[], &cfg).expect("first");
        let second = record_run(&db, dir.path(), &summary(13, 7.5), &[], &cfg).expect("second");

        assert_eq!(second.previous_run_id, Some(first.run_id));
        let trend = second.trend.expect("trend present");
        assert_eq!(trend.functions_scanned_delta, 3);
        assert_eq!(trend.estimated_annualized_avoidable_runtime_cost_delta, 2.5);
    }

    #[test]
    fn test_runs_keyed_per_repository() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("history.db");
        let repo_a = dir.path().join("a");
        let repo_b = dir.path().join("b");
        std::fs::create_dir_all(&repo_a).expect("mkdir");
        std::fs::create_dir_all(&repo_b).expect("mkdir");
        let cfg = AnalysisConfig::default();

        record_run(&db, &repo_a, &summary(10, 0.0), &[], &cfg).expect("a1");
        let other = record_run(&db, &repo_b, &summary(4, 0.0), &[], &cfg).expect("b1");
        assert!(other.trend.is_none());

        let again = record_run(&db, &repo_a, &summary(11, 0.0), &[], &cfg).expect("a2");
        let trend = again.trend.expect("trend for same repo");
        assert_eq!(trend.functions_scanned_delta, 1);
    }

    #[test]
    fn test_finding_counts_persisted() {
        use crate::models::{Finding, Severity};
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("history.db");
        let findings = vec![
            Finding {
                finding_type: "runtime_unused_review".to_string(),
                severity: Severity::Low,
                title: "t".to_string(),
                entity_ids: vec!["abc".to_string()],
                evidence: vec![],
                estimated_annual_cost: None,
            },
            Finding {
                finding_type: "runtime_unused_review".to_string(),
                severity: Severity::Low,
                title: "t".to_string(),
                entity_ids: vec!["def".to_string()],
                evidence: vec![],
                estimated_annual_cost: None,
            },
        ];
        let receipt = record_run(
            &db,
            dir.path(),
            &summary(2, 0.0),
            &findings,
            &AnalysisConfig::default(),
        )
        .expect("recorded");

        let connection = Connection::open(&db).expect("open");
        let count: i64 = connection
            .query_row(
                "SELECT finding_count FROM finding_counts
                 WHERE run_id = ?1 AND finding_type = 'runtime_unused_review'",
                params![receipt.run_id],
                |row| row.get(0),
            )
            .expect("row");
        assert_eq!(count, 2);
    }
}
