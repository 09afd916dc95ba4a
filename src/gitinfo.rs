//! Version control evidence via libgit2
//!
//! Blames each entity's line range to count distinct commits and authors and
//! to measure how concentrated the range is in a single commit, and walks the
//! history once per file for file-level commit and author counts. Evidence
//! collection is best-effort: a directory that is not a repository yields an
//! empty evidence map, and a file blame that fails (untracked or freshly
//! added files) yields an unavailable record that still carries file counts.

use crate::models::{Entity, GitEvidence};
use chrono::Utc;
use git2::{BlameOptions, DiffOptions, Repository, Sort};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

#[derive(Default)]
struct FileHistory {
    commit_count: usize,
    author_count: usize,
}

/// One blamed line: owning commit, author, author timestamp (seconds).
struct LineOwner {
    commit: String,
    author: String,
    time_secs: i64,
}

fn blame_entity_lines(
    repo: &Repository,
    file_path: &str,
    line_start: u32,
    line_end: u32,
) -> Result<Vec<LineOwner>, git2::Error> {
    let mut opts = BlameOptions::new();
    opts.min_line(line_start as usize);
    opts.max_line(line_end as usize);

    let blame = repo.blame_file(Path::new(file_path), Some(&mut opts))?;

    let mut owners = Vec::new();
    for hunk in blame.iter() {
        let commit_id = hunk.final_commit_id();
        let sig = hunk.final_signature();
        let author = sig.name().unwrap_or("Unknown").to_string();
        // Author time, not committer time: rebases and cherry-picks must not
        // make old code look freshly introduced.
        let time_secs = sig.when().seconds();
        for _ in 0..hunk.lines_in_hunk() {
            owners.push(LineOwner {
                commit: commit_id.to_string(),
                author: author.clone(),
                time_secs,
            });
        }
    }
    Ok(owners)
}

/// Walk history once and count commits/authors per file touched, restricted
/// to the files the scanned entities live in.
fn collect_file_histories(
    repo: &Repository,
    files: &[&str],
) -> Result<HashMap<String, FileHistory>, git2::Error> {
    let mut histories: HashMap<String, FileHistory> = HashMap::new();
    let mut authors_per_file: HashMap<String, HashSet<String>> = HashMap::new();

    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TIME)?;
    revwalk.push_head()?;

    for oid_result in revwalk {
        let oid = oid_result?;
        let commit = repo.find_commit(oid)?;

        let parent = commit.parent(0).ok();
        let tree = commit.tree()?;
        let parent_tree = parent.as_ref().map(|p| p.tree()).transpose()?;

        let author = commit
            .author()
            .name()
            .unwrap_or("Unknown")
            .to_string();

        for file_path in files {
            let mut diff_opts = DiffOptions::new();
            diff_opts.pathspec(file_path);

            let diff =
                repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;
            if diff.deltas().len() == 0 {
                continue;
            }

            let history = histories.entry(file_path.to_string()).or_default();
            history.commit_count += 1;
            authors_per_file
                .entry(file_path.to_string())
                .or_default()
                .insert(author.clone());
        }
    }

    for (file_path, authors) in authors_per_file {
        if let Some(history) = histories.get_mut(&file_path) {
            history.author_count = authors.len();
        }
    }
    Ok(histories)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn evidence_from_owners(
    entity: &Entity,
    owners: &[LineOwner],
    file_history: &FileHistory,
) -> GitEvidence {
    let commits: HashSet<&str> = owners.iter().map(|owner| owner.commit.as_str()).collect();
    let authors: HashSet<&str> = owners.iter().map(|owner| owner.author.as_str()).collect();

    let mut per_commit: HashMap<&str, usize> = HashMap::new();
    for owner in owners {
        *per_commit.entry(owner.commit.as_str()).or_insert(0) += 1;
    }
    let dominant = per_commit.values().copied().max().unwrap_or(0);
    let concentration = if owners.is_empty() {
        None
    } else {
        Some(round3(dominant as f64 / owners.len() as f64))
    };

    let last_commit_age_days = owners
        .iter()
        .map(|owner| owner.time_secs)
        .max()
        .map(|last| ((Utc::now().timestamp() - last) / 86_400).max(0));

    GitEvidence {
        entity_id: entity.id.clone(),
        available: true,
        commit_count: Some(commits.len()),
        author_count: Some(authors.len()),
        concentration,
        last_commit_age_days,
        file_commit_count: file_history.commit_count,
        file_author_count: file_history.author_count,
    }
}

/// Collect per-entity git evidence for a repository root.
///
/// Returns an empty map when `root` is not inside a git repository; callers
/// treat a missing entry as no evidence.
pub fn collect(root: &Path, entities: &[Entity]) -> BTreeMap<String, GitEvidence> {
    let mut evidence = BTreeMap::new();

    let repo = match Repository::discover(root) {
        Ok(repo) => repo,
        Err(err) => {
            debug!(?root, %err, "no git repository found, skipping evidence");
            return evidence;
        }
    };

    let mut files: Vec<&str> = entities
        .iter()
        .map(|entity| entity.file_path.as_str())
        .collect();
    files.sort_unstable();
    files.dedup();

    let histories = match collect_file_histories(&repo, &files) {
        Ok(histories) => histories,
        Err(err) => {
            debug!(%err, "history walk failed, continuing with blame only");
            HashMap::new()
        }
    };
    let empty = FileHistory::default();

    for entity in entities {
        let file_history = histories.get(&entity.file_path).unwrap_or(&empty);
        match blame_entity_lines(&repo, &entity.file_path, entity.line_start, entity.line_end) {
            Ok(owners) if !owners.is_empty() => {
                evidence.insert(
                    entity.id.clone(),
                    evidence_from_owners(entity, &owners, file_history),
                );
            }
            Ok(_) | Err(_) => {
                // Untracked or uncommitted files blame to nothing; keep the
                // file-level counts so downstream rules still see them.
                evidence.insert(
                    entity.id.clone(),
                    GitEvidence {
                        entity_id: entity.id.clone(),
                        available: false,
                        commit_count: None,
                        author_count: None,
                        concentration: None,
                        last_commit_age_days: None,
                        file_commit_count: file_history.commit_count,
                        file_author_count: file_history.author_count,
                    },
                );
            }
        }
    }

    evidence
}
