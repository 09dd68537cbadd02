//! Repository investigator: checkout, file catalog, history and regex probes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};
use tribunal_common::{truncate_to_char_boundary, Artifact, Criterion, Evidence, Probe};

use super::{git, unavailable};
use crate::state::RunState;
use crate::traits::{FactFinder, Findings};

const MAX_FILES: usize = 5_000;
const MAX_FILE_BYTES: u64 = 1_000_000;
const MAX_HITS: usize = 10;
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", ".venv", "venv", "__pycache__", "dist"];

pub struct RepositoryInvestigator {
    clone_timeout: Duration,
}

impl RepositoryInvestigator {
    pub fn new(clone_timeout: Duration) -> Self {
        Self { clone_timeout }
    }
}

#[async_trait]
impl FactFinder for RepositoryInvestigator {
    fn name(&self) -> &str {
        "repository_investigator"
    }

    fn artifact(&self) -> Artifact {
        Artifact::Repository
    }

    async fn investigate(&self, state: &RunState) -> Result<Findings> {
        let owned: Vec<Criterion> = state
            .criteria
            .iter()
            .filter(|c| c.target_artifact == Artifact::Repository)
            .cloned()
            .collect();
        if owned.is_empty() {
            return Ok(Findings::default());
        }

        // Local directories are examined in place; anything else is cloned
        // into a throwaway directory that is removed on drop.
        let local = PathBuf::from(&state.repo_url);
        let _sandbox;
        let root = if local.is_dir() {
            local
        } else {
            let sandbox = tempfile::tempdir().context("failed to create checkout directory")?;
            let dest = sandbox.path().join("repo");
            if let Err(err) = git::clone(&state.repo_url, &dest, self.clone_timeout).await {
                warn!(url = state.repo_url.as_str(), error = %err, "Repository unavailable");
                return Ok(Findings {
                    evidence: unavailable(&owned, &state.repo_url, &format!("Repository could not be cloned: {err:#}")),
                    repo_files: Vec::new(),
                });
            }
            _sandbox = sandbox;
            dest
        };

        let mut evidence = Vec::new();
        for criterion in &owned {
            for probe in &criterion.probes {
                if let Probe::GitHistory { min_commits } = probe {
                    evidence.push(history_evidence(&root, criterion, *min_commits).await);
                }
            }
        }

        let scan_root = root.clone();
        let (repo_files, scanned) = tokio::task::spawn_blocking(move || -> Result<_> {
            let files = catalog(&scan_root);
            let mut out = Vec::new();
            for criterion in &owned {
                for probe in &criterion.probes {
                    if let Probe::Pattern { goal, pattern, extensions } = probe {
                        out.push(pattern_evidence(&scan_root, &files, criterion, goal, pattern, extensions)?);
                    }
                }
            }
            Ok((files, out))
        })
        .await
        .map_err(|e| anyhow!("repository scan aborted: {e}"))??;
        evidence.extend(scanned);

        info!(
            root = %root.display(),
            files = repo_files.len(),
            records = evidence.len(),
            "Repository investigated"
        );
        Ok(Findings { evidence, repo_files })
    }
}

async fn history_evidence(root: &Path, criterion: &Criterion, min_commits: usize) -> Evidence {
    let builder = Evidence::builder()
        .goal("Commit history shows iterative development")
        .criterion_id(criterion.id.clone());

    let commits = match git::log(root).await {
        Ok(commits) => commits,
        Err(err) => {
            return builder
                .found(false)
                .location("git log")
                .rationale(format!("History unavailable: {err:#}"))
                .confidence(1.0)
                .build();
        }
    };

    let report = git::analyze(&commits);
    let passed = report.commit_count >= min_commits && !report.bulk_upload;
    let listing = commits
        .iter()
        .take(20)
        .map(|c| {
            format!(
                "{} {} {}",
                truncate_to_char_boundary(&c.hash, 7),
                c.timestamp.format("%Y-%m-%d %H:%M"),
                c.subject
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    builder
        .found(passed)
        .content(listing)
        .location(commits.last().map(|c| c.hash.clone()).unwrap_or_else(|| "git log".to_string()))
        .rationale(format!(
            "{} commits over {} minutes; bulk upload: {}; progression: {} (early: {:?}, late: {:?})",
            report.commit_count,
            report.span_secs / 60,
            if report.bulk_upload { "yes" } else { "no" },
            if report.progression { "yes" } else { "no" },
            report.early_themes,
            report.late_themes,
        ))
        .confidence(if passed { 0.95 } else { 0.70 })
        .build()
}

/// Repository-relative file paths with `/` separators, sorted.
fn catalog(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                let name = entry.file_name();
                if !SKIP_DIRS.iter().any(|skip| name == *skip) {
                    stack.push(path);
                }
            } else if file_type.is_file() {
                if let Ok(rel) = path.strip_prefix(root) {
                    let rel = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    files.push(rel);
                }
                if files.len() >= MAX_FILES {
                    warn!(limit = MAX_FILES, "File catalog truncated");
                    files.sort();
                    return files;
                }
            }
        }
    }
    files.sort();
    files
}

fn pattern_evidence(
    root: &Path,
    files: &[String],
    criterion: &Criterion,
    goal: &str,
    pattern: &str,
    extensions: &[String],
) -> Result<Evidence> {
    let regex = Regex::new(pattern)
        .with_context(|| format!("criterion `{}` has an invalid pattern", criterion.id))?;

    let mut hits = Vec::new();
    let mut matched_files = 0;
    for rel in files {
        if !extensions.is_empty() {
            let ext = Path::new(rel).extension().and_then(|e| e.to_str()).unwrap_or_default();
            if !extensions.iter().any(|wanted| wanted == ext) {
                continue;
            }
        }
        let path = root.join(rel);
        if std::fs::metadata(&path).map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };

        let mut file_matched = false;
        for (number, line) in text.lines().enumerate() {
            if regex.is_match(line) {
                file_matched = true;
                if hits.len() < MAX_HITS {
                    hits.push(format!(
                        "{rel}:{}: {}",
                        number + 1,
                        truncate_to_char_boundary(line.trim(), 160)
                    ));
                }
            }
        }
        if file_matched {
            matched_files += 1;
        }
    }

    let builder = Evidence::builder()
        .goal(goal)
        .criterion_id(criterion.id.clone())
        .rationale(format!(
            "/{pattern}/ matched in {matched_files} file(s) out of {} scanned",
            files.len()
        ));
    Ok(match hits.first() {
        Some(first) => {
            let location = first.splitn(3, ':').take(2).collect::<Vec<_>>().join(":");
            builder
                .found(true)
                .content(hits.join("\n"))
                .location(location)
                .confidence(0.9)
                .build()
        }
        None => builder
            .found(false)
            .location("repository")
            .confidence(0.8)
            .build(),
    })
}
