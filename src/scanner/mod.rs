//! Repository scanner
//!
//! Walks the repository tree, prunes non-source directories, and dispatches
//! each supported file to a per-language extractor. Python files go through
//! the full-AST path; JavaScript/TypeScript files go through a best-effort
//! lexical path. One bad file never aborts the scan: unreadable, undecodable,
//! or unparseable files simply contribute zero entities.

pub mod javascript;
pub mod python;

use crate::models::Entity;
use anyhow::Result;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Directories never descended into: VCS metadata, dependency caches, build
/// output.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".venv",
    "venv",
    "node_modules",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    "dist",
    "build",
    "target",
];

/// How a file's entities are extracted (and later canonicalized/scored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// Full syntax tree via rustpython-parser
    Python,
    /// Regex + brace-matching heuristics (JavaScript/TypeScript)
    Lexical,
}

impl Language {
    /// Classify a repo-relative path by extension. `None` means unsupported.
    pub fn from_path(path: &str) -> Option<Language> {
        let ext = Path::new(path).extension()?.to_str()?;
        match ext {
            "py" => Some(Language::Python),
            "js" | "jsx" | "ts" | "tsx" => Some(Language::Lexical),
            _ => None,
        }
    }
}

fn is_pruned_dir(name: &str, include_tests: bool) -> bool {
    IGNORED_DIRS.contains(&name) || (!include_tests && name == "tests")
}

/// Extract all entities under `root`, ordered by (file path, start line).
///
/// The stable ordering is load-bearing: downstream pairwise algorithms key
/// pair identity off scan order, so two runs over the same tree must produce
/// the same sequence.
pub fn scan_repository(root: &Path, include_tests: bool) -> Result<Vec<Entity>> {
    let root = root.canonicalize()?;
    let mut entities: Vec<Entity> = Vec::new();

    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            // Never prune the root itself, even if it is named "tests".
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !is_pruned_dir(&name, include_tests)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("skipping unreadable directory entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel_path = match entry.path().strip_prefix(&root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        let Some(language) = Language::from_path(&rel_path) else {
            continue;
        };

        // Binary or non-UTF-8 content degrades to zero entities.
        let source = match std::fs::read_to_string(entry.path()) {
            Ok(source) => source,
            Err(err) => {
                debug!("skipping unreadable file {rel_path}: {err}");
                continue;
            }
        };

        match language {
            Language::Python => match python::extract(&source, &rel_path) {
                Some(found) => entities.extend(found),
                None => debug!("skipping {rel_path}: python syntax error"),
            },
            Language::Lexical => entities.extend(javascript::extract(&source, &rel_path)),
        }
    }

    entities.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then(a.line_start.cmp(&b.line_start))
    });
    Ok(entities)
}

/// Slice the exact text of 1-based inclusive lines `[start, end]`.
pub(crate) fn slice_lines(source: &str, start: u32, end: u32) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let start_index = (start.saturating_sub(1)) as usize;
    let end_index = (end as usize).min(lines.len());
    if start_index >= end_index {
        return String::new();
    }
    lines[start_index..end_index].join("\n")
}
