//! CLI definition and entry point

use crate::config::AnalysisConfig;
use crate::engine;
use crate::history;
use crate::reporters::{self, OutputFormat, ReportContext};
use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// Read-only diagnostic analyzer for AI code waste signals.
///
/// Scans a repository for probable AI-generated functions, structural
/// duplication, and runtime-unused code, then writes an evidence report.
/// Never mutates the analyzed code.
#[derive(Parser, Debug)]
#[command(name = "codewaste")]
#[command(
    version,
    about = "Detect probable AI-generated code, duplication, and runtime waste",
    after_help = "\
Examples:
  codewaste --repo .                                Analyze current directory
  codewaste --repo . --runtime runtime.json         Join a runtime profile
  codewaste --repo . --format json -o report.json   Machine-readable output
  codewaste --repo . --cost-per-invocation 0.0001   Estimate annualized cost
  codewaste --repo . --no-git --no-history          Pure structural pass"
)]
pub struct Cli {
    /// Repository path to analyze
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Optional runtime evidence JSON file
    #[arg(long)]
    pub runtime: Option<PathBuf>,

    /// Runtime evidence time window in days (default: 90)
    #[arg(long)]
    pub time_window_days: Option<u32>,

    /// Cost per invocation for annualized cost estimation (default: off)
    #[arg(long)]
    pub cost_per_invocation: Option<f64>,

    /// Minimum AI probability to emit a provenance signal (default: 0.65)
    #[arg(long)]
    pub ai_threshold: Option<f64>,

    /// High-confidence duplication threshold (default: 0.9)
    #[arg(long)]
    pub dup_threshold: Option<f64>,

    /// Medium-confidence duplication threshold (default: 0.75)
    #[arg(long)]
    pub dup_medium_threshold: Option<f64>,

    /// Also report medium-confidence duplicate pairs
    #[arg(long)]
    pub include_medium_duplication: bool,

    /// Minimum function body statements to evaluate duplication (default: 3)
    #[arg(long)]
    pub min_dup_body_statements: Option<usize>,

    /// Minimum canonical signature length to evaluate duplication (default: 160)
    #[arg(long)]
    pub min_dup_signature_chars: Option<usize>,

    /// Include functions under test directories in scan scope
    #[arg(long)]
    pub include_tests: bool,

    /// Skip version control evidence collection
    #[arg(long)]
    pub no_git: bool,

    /// Currency label for cost output
    #[arg(long, default_value = "USD")]
    pub currency: String,

    /// Output format: markdown (or md), json
    #[arg(long, short = 'f', default_value = "markdown", value_parser = ["markdown", "md", "json"])]
    pub format: String,

    /// Output file path (default: reports/diagnostic.md for markdown, stdout for json)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// History database path (default: <repo>/.codewaste/history.db)
    #[arg(long)]
    pub history_db: Option<PathBuf>,

    /// Skip recording this run in the history database
    #[arg(long)]
    pub no_history: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,
}

impl Cli {
    /// Resolve the effective configuration: built-in defaults, then the
    /// repository's `codewaste.toml`, then explicit command-line flags.
    fn resolve_config(&self) -> AnalysisConfig {
        let mut cfg = AnalysisConfig::default();
        cfg.apply_file_overrides(&self.repo);

        if let Some(value) = self.time_window_days {
            cfg.time_window_days = value;
        }
        if let Some(value) = self.cost_per_invocation {
            cfg.cost_per_invocation = value;
        }
        if let Some(value) = self.ai_threshold {
            cfg.ai_threshold = value;
        }
        if let Some(value) = self.dup_threshold {
            cfg.dup_high_threshold = value;
        }
        if let Some(value) = self.dup_medium_threshold {
            cfg.dup_medium_threshold = value;
        }
        if let Some(value) = self.min_dup_body_statements {
            cfg.min_dup_body_statements = value;
        }
        if let Some(value) = self.min_dup_signature_chars {
            cfg.min_dup_signature_chars = value;
        }
        if self.include_medium_duplication {
            cfg.include_medium_duplication = true;
        }
        if self.include_tests {
            cfg.include_tests = true;
        }
        if self.no_git {
            cfg.git_enabled = false;
        }
        cfg
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let cfg = cli.resolve_config();
    let result = engine::analyze(&cli.repo, cli.runtime.as_deref(), &cfg)?;

    let receipt = if cli.no_history {
        None
    } else {
        let db_path = cli
            .history_db
            .clone()
            .unwrap_or_else(|| cli.repo.join(".codewaste").join("history.db"));
        Some(history::record_run(
            &db_path,
            &cli.repo,
            &result.summary,
            &result.findings,
            &cfg,
        )?)
    };

    let format = OutputFormat::from_str(&cli.format)?;
    let ctx = ReportContext {
        repo_path: &cli.repo,
        time_window_days: cfg.time_window_days,
        currency: &cli.currency,
        history: receipt.as_ref(),
    };
    let rendered = reporters::render(&result, &ctx, format)?;

    let output_path = match (&cli.output, format) {
        (Some(path), _) => Some(path.clone()),
        (None, OutputFormat::Markdown) => Some(PathBuf::from("reports/diagnostic.md")),
        (None, OutputFormat::Json) => None,
    };

    match output_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create output directory {}", parent.display())
                    })?;
                }
            }
            fs::write(&path, &rendered)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            print_summary(&result.summary);
            println!("Report written: {}", path.display());
        }
        None => println!("{rendered}"),
    }

    Ok(())
}

fn print_summary(summary: &crate::models::Summary) {
    println!("Functions scanned: {}", summary.functions_scanned);
    println!("Probable AI functions: {}", summary.probable_ai_functions);
    println!(
        "High-confidence duplicate pairs: {}",
        summary.high_confidence_duplication_pairs
    );
    println!(
        "Probable AI + zero invocations: {}",
        summary.probable_ai_zero_invocations
    );
}
