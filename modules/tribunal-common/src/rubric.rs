//! Evaluation criteria and the probes fact finders run for them.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which part of the submission a criterion is judged against. Each fact
/// finder owns exactly one artifact, which keeps their writes disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    #[serde(alias = "github_repo")]
    Repository,
    #[serde(alias = "pdf_report")]
    Document,
}

/// A fact-finding instruction attached to a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Probe {
    /// Inspect commit history: count, time span, and progression.
    GitHistory {
        #[serde(default = "default_min_commits")]
        min_commits: usize,
    },
    /// Regex scan over repository files.
    Pattern {
        goal: String,
        pattern: String,
        /// File extensions to scan, without the dot. Empty means all text files.
        #[serde(default)]
        extensions: Vec<String>,
    },
    /// Look for key terms used in explanatory prose, not just name-dropped.
    Terms {
        goal: String,
        terms: Vec<String>,
        #[serde(default = "default_min_substantive")]
        min_substantive: usize,
    },
    /// Extract repository paths the document claims exist.
    PathClaims { goal: String },
}

impl Probe {
    /// The artifact this probe inspects.
    pub fn artifact(&self) -> Artifact {
        match self {
            Probe::GitHistory { .. } | Probe::Pattern { .. } => Artifact::Repository,
            Probe::Terms { .. } | Probe::PathClaims { .. } => Artifact::Document,
        }
    }

    fn validate_for(&self, criterion_id: &str, artifact: Artifact) -> Result<(), ConfigError> {
        if self.artifact() != artifact {
            return Err(ConfigError::Rubric(format!(
                "criterion `{criterion_id}` targets {artifact:?} but has a {:?} probe",
                self.artifact()
            )));
        }
        if let Probe::Pattern { pattern, .. } = self {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Rubric(format!("criterion `{criterion_id}` has an invalid pattern: {e}"))
            })?;
        }
        Ok(())
    }
}

fn default_min_commits() -> usize {
    4
}

fn default_min_substantive() -> usize {
    3
}

fn default_weight() -> f64 {
    1.0
}

/// One rubric dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub name: String,
    pub target_artifact: Artifact,
    #[serde(default)]
    pub forensic_instruction: String,
    #[serde(default)]
    pub success_pattern: String,
    #[serde(default)]
    pub failure_pattern: String,
    /// Weight in the overall score.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub probes: Vec<Probe>,
}

impl Criterion {
    pub fn new(id: impl Into<String>, name: impl Into<String>, target_artifact: Artifact) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            target_artifact,
            forensic_instruction: String::new(),
            success_pattern: String::new(),
            failure_pattern: String::new(),
            weight: default_weight(),
            probes: Vec::new(),
        }
    }

    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_patterns(
        mut self,
        instruction: impl Into<String>,
        success: impl Into<String>,
        failure: impl Into<String>,
    ) -> Self {
        self.forensic_instruction = instruction.into();
        self.success_pattern = success.into();
        self.failure_pattern = failure.into();
        self
    }
}

/// Ordered list of criteria. Declaration order drives report ordering and
/// remediation tie-breaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub dimensions: Vec<Criterion>,
}

impl Rubric {
    pub fn new(dimensions: Vec<Criterion>) -> Result<Self, ConfigError> {
        let rubric = Self { dimensions };
        rubric.validate()?;
        Ok(rubric)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let rubric: Rubric = serde_json::from_str(json)?;
        rubric.validate()?;
        Ok(rubric)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimensions.is_empty() {
            return Err(ConfigError::Rubric("rubric declares no criteria".into()));
        }
        let mut seen = HashSet::new();
        for criterion in &self.dimensions {
            if criterion.id.trim().is_empty() {
                return Err(ConfigError::Rubric("criterion with empty id".into()));
            }
            if !seen.insert(criterion.id.as_str()) {
                return Err(ConfigError::Rubric(format!(
                    "duplicate criterion id `{}`",
                    criterion.id
                )));
            }
            if !(criterion.weight.is_finite() && criterion.weight > 0.0) {
                return Err(ConfigError::Rubric(format!(
                    "criterion `{}` has non-positive weight {}",
                    criterion.id, criterion.weight
                )));
            }
            for probe in &criterion.probes {
                probe.validate_for(&criterion.id, criterion.target_artifact)?;
            }
        }
        Ok(())
    }

    pub fn criteria_for(&self, artifact: Artifact) -> impl Iterator<Item = &Criterion> {
        self.dimensions
            .iter()
            .filter(move |c| c.target_artifact == artifact)
    }

    /// The built-in rubric for auditing multi-agent orchestration projects.
    pub fn builtin() -> Self {
        let source = ["py", "rs", "ts"].map(String::from).to_vec();
        Self {
            dimensions: vec![
                Criterion::new("git_forensic_analysis", "Git Forensic Analysis", Artifact::Repository)
                    .with_patterns(
                        "Read the full commit history; check count, time span, and whether work progressed from setup to tools to orchestration.",
                        "More than three commits spread over time with a visible progression.",
                        "A single bulk upload or a handful of commits made within minutes.",
                    )
                    .with_probe(Probe::GitHistory { min_commits: 4 }),
                Criterion::new("state_management_rigor", "State Management Rigor", Artifact::Repository)
                    .with_patterns(
                        "Locate the shared state definition and the reducers that merge parallel writes.",
                        "Typed state models with explicit reducers for concurrently written fields.",
                        "Plain dictionaries mutated in place, no reducers.",
                    )
                    .with_probe(Probe::Pattern {
                        goal: "Typed state with reducers".into(),
                        pattern: r"(TypedDict|BaseModel|operator\.(add|ior)|Annotated\[|impl\s+Reducer)".into(),
                        extensions: source.clone(),
                    }),
                Criterion::new("graph_orchestration", "Graph Orchestration Architecture", Artifact::Repository)
                    .with_patterns(
                        "Inspect the graph wiring: parallel fan-out, fan-in barriers, and conditional routing.",
                        "Parallel branches joined by a barrier, with conditional error routing.",
                        "A purely linear pipeline.",
                    )
                    .with_probe(Probe::Pattern {
                        goal: "Graph wiring with fan-out and conditional edges".into(),
                        pattern: r"(StateGraph|add_conditional_edges?|add_edge)".into(),
                        extensions: source.clone(),
                    }),
                Criterion::new("safe_tool_engineering", "Safe Tool Engineering", Artifact::Repository)
                    .with_patterns(
                        "Inspect how external tools are invoked and where checkouts are written.",
                        "Subprocess calls with argument lists, sandboxed temporary directories, error handling.",
                        "Raw shell strings, os.system, or cloning into the working directory.",
                    )
                    .with_probe(Probe::Pattern {
                        goal: "Shell execution sites".into(),
                        pattern: r"(os\.system|subprocess\.(run|Popen|call)|shell\s*=\s*True|Command::new)".into(),
                        extensions: source.clone(),
                    })
                    .with_probe(Probe::Pattern {
                        goal: "Sandboxed temporary checkouts".into(),
                        pattern: r"(tempfile|TemporaryDirectory|TempDir)".into(),
                        extensions: source.clone(),
                    }),
                Criterion::new("structured_output_enforcement", "Structured Output Enforcement", Artifact::Repository)
                    .with_patterns(
                        "Check that reviewer output is bound to a schema and validated.",
                        "Schema-bound model calls with validation and retry.",
                        "Free-text model output parsed by hand.",
                    )
                    .with_probe(Probe::Pattern {
                        goal: "Schema-bound model output".into(),
                        pattern: r"(with_structured_output|bind_tools|JsonSchema|tool_choice)".into(),
                        extensions: source,
                    }),
                Criterion::new("theoretical_depth", "Theoretical Depth", Artifact::Document)
                    .with_patterns(
                        "Find where the report explains its core concepts rather than name-dropping them.",
                        "Key concepts explained in connection with the implementation.",
                        "Buzzwords with no explanation.",
                    )
                    .with_probe(Probe::Terms {
                        goal: "Substantive use of orchestration concepts".into(),
                        terms: [
                            "Dialectical Synthesis",
                            "Fan-In",
                            "Fan-Out",
                            "Metacognition",
                            "State Synchronization",
                        ]
                        .map(String::from)
                        .to_vec(),
                        min_substantive: 3,
                    }),
                Criterion::new("report_accuracy", "Report Accuracy", Artifact::Document)
                    .with_patterns(
                        "Cross-reference every file path the report mentions against the repository.",
                        "All claimed paths exist.",
                        "The report references files that do not exist.",
                    )
                    .with_probe(Probe::PathClaims {
                        goal: "File paths claimed by the report".into(),
                    }),
            ],
        }
    }
}
