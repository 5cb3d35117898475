//! LLM-as-judge scoring with deterministic fallbacks.
//!
//! The judge coerces an unreliable free-text model response into a strict
//! score schema. A separate fully-local scorer provides a model-free
//! cross-check of the same rubric.

mod agent;
pub mod deterministic;

pub use agent::{
    FlatScores, FormatIssues, Judge, JudgeAgent, JudgeOutcome, JudgeVerdict, ParsedResponse,
    Scores, fallback_precision_recall, normalize_verdict, parse_response,
};
