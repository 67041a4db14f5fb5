//! The scoring pipeline: normalize → score → flag → persist → audit.

pub mod flag;
pub mod normalize;
pub mod orchestrator;
pub mod scoring;

pub use flag::FlagClient;
pub use orchestrator::{Orchestrator, ScoreOutcome, ScoreRequest};
pub use scoring::{SCORE_NOT_AN_INTEGER, SCORE_PROVIDER_FAILURE, ScoringClient};
