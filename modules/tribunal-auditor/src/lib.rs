//! Adversarial code-audit courtroom.
//!
//! Fact finders gather evidence from a repository and its design document,
//! three reviewers with opposing mandates score each criterion, and a
//! deterministic Chief Justice resolves their disagreement into a report.

pub mod detectives;
pub mod error;
pub mod joins;
pub mod judges;
pub mod justice;
pub mod reducer;
pub mod report;
pub mod state;
pub mod traits;
pub mod workflow;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::TribunalError;
pub use justice::{ChiefJustice, SynthesisConfig, SynthesisError};
pub use state::{RunState, StateUpdate};
pub use traits::{FactFinder, Findings, OpinionDraft, ReviewError, Reviewer, Sleeper, TokioSleeper};
pub use workflow::{CourtDeps, Tribunal};
