pub mod config;
pub mod error;
pub mod evidence;
pub mod rubric;
pub mod util;
pub mod verdict;

pub use config::{Config, DEFAULT_API_URL};
pub use error::{ConfigError, InvalidScore};
pub use evidence::{Evidence, JudicialOpinion, ReviewerRole, Score};
pub use rubric::{Artifact, Criterion, Probe, Rubric};
pub use util::{excerpt, truncate_to_char_boundary};
pub use verdict::{
    CriterionResult, Dissent, DissentPosition, FinalReport, RemediationItem, ResolutionRule, Tier,
};
