//! Document analyst: term depth and claimed file paths in a plain-text or
//! Markdown design document.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};
use tribunal_common::{excerpt, Artifact, Criterion, Evidence, Probe};

use super::unavailable;
use crate::state::RunState;
use crate::traits::{FactFinder, Findings};

/// Words that suggest a paragraph explains a concept rather than name-drops it.
const SUBSTANTIVE_INDICATORS: &[&str] = &[
    "implemented", "implement", "using", "through", "via", "by", "which", "because", "enables",
    "ensures", "allows", "fan-out", "fan-in", "parallel", "graph", "node", "reducer", "state",
];

static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z][a-z\-]*").expect("valid regex"));
static CLAIMED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\./)?(?:src|tests?|docs?|scripts?|modules|crates)/[\w./\-]+\.(?:py|rs|ts|json|toml|md|txt|ya?ml)")
        .expect("valid regex")
});

pub struct DocumentAnalyst;

#[async_trait]
impl FactFinder for DocumentAnalyst {
    fn name(&self) -> &str {
        "document_analyst"
    }

    fn artifact(&self) -> Artifact {
        Artifact::Document
    }

    async fn investigate(&self, state: &RunState) -> Result<Findings> {
        let owned: Vec<&Criterion> = state
            .criteria
            .iter()
            .filter(|c| c.target_artifact == Artifact::Document)
            .collect();
        if owned.is_empty() {
            return Ok(Findings::default());
        }

        let bytes = match tokio::fs::read(Path::new(&state.doc_path)).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = state.doc_path.as_str(), error = %err, "Document unavailable");
                return Ok(Findings {
                    evidence: unavailable(owned, &state.doc_path, &format!("Document could not be read: {err}")),
                    ..Default::default()
                });
            }
        };
        let Ok(text) = String::from_utf8(bytes) else {
            warn!(path = state.doc_path.as_str(), "Document is not UTF-8 text");
            return Ok(Findings {
                evidence: unavailable(
                    owned,
                    &state.doc_path,
                    "Document is not plain text; only Markdown and text reports can be analysed",
                ),
                ..Default::default()
            });
        };

        let paragraphs = paragraphs(&text);
        let mut evidence = Vec::new();
        for criterion in owned {
            for probe in &criterion.probes {
                match probe {
                    Probe::Terms { goal, terms, min_substantive } => evidence.push(term_evidence(
                        &state.doc_path,
                        &paragraphs,
                        criterion,
                        goal,
                        terms,
                        *min_substantive,
                    )),
                    Probe::PathClaims { goal } => {
                        evidence.push(path_claim_evidence(&state.doc_path, &text, criterion, goal))
                    }
                    Probe::GitHistory { .. } | Probe::Pattern { .. } => {}
                }
            }
        }

        info!(
            path = state.doc_path.as_str(),
            paragraphs = paragraphs.len(),
            records = evidence.len(),
            "Document analysed"
        );
        Ok(Findings {
            evidence,
            ..Default::default()
        })
    }
}

fn paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn is_substantive(paragraph_lower: &str) -> bool {
    WORD.find_iter(paragraph_lower)
        .any(|w| SUBSTANTIVE_INDICATORS.contains(&w.as_str()))
}

fn term_evidence(
    doc_path: &str,
    paragraphs: &[&str],
    criterion: &Criterion,
    goal: &str,
    terms: &[String],
    min_substantive: usize,
) -> Evidence {
    let lowered: Vec<String> = paragraphs.iter().map(|p| p.to_lowercase()).collect();
    let mut lines = Vec::new();
    let mut found_terms = 0;
    let mut substantive_terms = 0;
    let mut first_location = None;

    for term in terms {
        let needle = term.to_lowercase();
        let hits: Vec<usize> = lowered
            .iter()
            .enumerate()
            .filter(|(_, p)| p.contains(&needle))
            .map(|(i, _)| i)
            .collect();
        let substantive = hits.iter().copied().find(|&i| is_substantive(&lowered[i]));

        if !hits.is_empty() {
            found_terms += 1;
        }
        match substantive {
            Some(i) => {
                substantive_terms += 1;
                first_location.get_or_insert(i);
                lines.push(format!(
                    "{term}: {} paragraph(s), explained in paragraph {}: \"{}\"",
                    hits.len(),
                    i + 1,
                    excerpt(paragraphs[i], 200)
                ));
            }
            None if !hits.is_empty() => {
                lines.push(format!("{term}: {} paragraph(s), mentioned without explanation", hits.len()))
            }
            None => lines.push(format!("{term}: not mentioned")),
        }
    }

    Evidence::builder()
        .goal(goal)
        .found(found_terms > 0 && substantive_terms >= min_substantive)
        .content(lines.join("\n"))
        .location(match first_location {
            Some(i) => format!("{doc_path}#paragraph-{}", i + 1),
            None => doc_path.to_string(),
        })
        .rationale(format!(
            "{found_terms} of {} terms present, {substantive_terms} explained (need {min_substantive})",
            terms.len()
        ))
        .confidence(if found_terms > 0 { 0.90 } else { 0.95 })
        .criterion_id(criterion.id.clone())
        .build()
}

fn path_claim_evidence(doc_path: &str, text: &str, criterion: &Criterion, goal: &str) -> Evidence {
    let claimed: BTreeSet<&str> = CLAIMED_PATH
        .find_iter(text)
        .map(|m| m.as_str().trim_start_matches("./"))
        .collect();
    let claimed: Vec<&str> = claimed.into_iter().collect();

    let builder = Evidence::builder()
        .goal(goal)
        .found(!claimed.is_empty())
        .location(doc_path)
        .rationale(format!("{} file path(s) referenced by the document", claimed.len()))
        .confidence(0.85)
        .criterion_id(criterion.id.clone());
    if claimed.is_empty() {
        builder.build()
    } else {
        builder.content(claimed.join("\n")).build()
    }
}
