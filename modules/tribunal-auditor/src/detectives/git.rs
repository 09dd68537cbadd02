//! Git plumbing and commit-history forensics.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, FixedOffset};
use tokio::process::Command;
use tracing::{debug, info};

/// Commits made within this window are treated as a single upload.
pub const BULK_UPLOAD_WINDOW_SECS: i64 = 600;
const CLONE_DEPTH: &str = "100";

const SETUP_KEYWORDS: &[&str] = &["init", "setup", "scaffold", "bootstrap", "config", "skeleton"];
const TOOL_KEYWORDS: &[&str] = &["tool", "clone", "parse", "ast", "pdf", "detective", "scan"];
const GRAPH_KEYWORDS: &[&str] = &[
    "graph", "node", "edge", "judge", "justice", "orchestrat", "fan-", "parallel", "synthesis",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub hash: String,
    pub timestamp: DateTime<FixedOffset>,
    pub subject: String,
}

/// Reject anything that is not a recognisable remote repository URL.
pub fn validate_url(url: &str) -> Result<()> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| anyhow!("`{url}` is not a URL"))?;
    if !matches!(scheme, "https" | "http" | "git" | "ssh") {
        bail!("unsupported URL scheme `{scheme}`");
    }
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    let host = host.rsplit('@').next().unwrap_or_default();
    if host.is_empty() {
        bail!("`{url}` has no host");
    }
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        bail!("`{url}` contains whitespace or control characters");
    }
    Ok(())
}

/// Shallow-clone `url` into `dest`. Arguments go straight to `git`, never
/// through a shell.
pub async fn clone(url: &str, dest: &Path, timeout: Duration) -> Result<()> {
    validate_url(url)?;
    info!(url, dest = %dest.display(), "Cloning repository");

    let child = Command::new("git")
        .args(["clone", "--quiet", "--depth", CLONE_DEPTH, "--", url])
        .arg(dest)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn git")?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| anyhow!("git clone timed out after {}s", timeout.as_secs()))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed ({}): {}", output.status, stderr.trim());
    }
    Ok(())
}

/// Full history of the checkout at `repo`, oldest first.
pub async fn log(repo: &Path) -> Result<Vec<Commit>> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["log", "--reverse", "--format=%H|%aI|%s"])
        .stdin(Stdio::null())
        .output()
        .await
        .context("failed to run git log")?;

    if !output.status.success() {
        bail!(
            "git log failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let commits = parse_log(&String::from_utf8_lossy(&output.stdout));
    debug!(commits = commits.len(), "Read commit history");
    Ok(commits)
}

/// Parse `%H|%aI|%s` lines. Malformed lines are skipped.
pub fn parse_log(output: &str) -> Vec<Commit> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '|');
            let hash = parts.next()?.trim();
            let timestamp = DateTime::parse_from_rfc3339(parts.next()?.trim()).ok()?;
            let subject = parts.next().unwrap_or_default().trim();
            (!hash.is_empty()).then(|| Commit {
                hash: hash.to_string(),
                timestamp,
                subject: subject.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryReport {
    pub commit_count: usize,
    pub span_secs: i64,
    pub bulk_upload: bool,
    /// Setup work early, tool or orchestration work late.
    pub progression: bool,
    pub early_themes: Vec<&'static str>,
    pub late_themes: Vec<&'static str>,
}

pub fn analyze(commits: &[Commit]) -> HistoryReport {
    let span_secs = match (commits.first(), commits.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_seconds().abs(),
        _ => 0,
    };
    let bulk_upload = commits.len() <= 1 || span_secs < BULK_UPLOAD_WINDOW_SECS;

    let third = (commits.len() / 3).max(1).min(commits.len());
    let early_themes = themes(&commits[..third]);
    let late_themes = themes(&commits[commits.len() - third..]);
    let progression = commits.len() >= 3
        && early_themes.contains(&"setup")
        && (late_themes.contains(&"tools") || late_themes.contains(&"graph"));

    HistoryReport {
        commit_count: commits.len(),
        span_secs,
        bulk_upload,
        progression,
        early_themes,
        late_themes,
    }
}

fn themes(commits: &[Commit]) -> Vec<&'static str> {
    let subjects: Vec<String> = commits.iter().map(|c| c.subject.to_lowercase()).collect();
    let mentions = |keywords: &[&str]| subjects.iter().any(|s| keywords.iter().any(|k| s.contains(k)));

    [("setup", SETUP_KEYWORDS), ("tools", TOOL_KEYWORDS), ("graph", GRAPH_KEYWORDS)]
        .into_iter()
        .filter(|(_, keywords)| mentions(*keywords))
        .map(|(theme, _)| theme)
        .collect()
}
