//! The LLM judge: prompt, response repair, and score normalization.
//!
//! The judging model is *supposed* to return strict JSON but routinely
//! does not. Everything here is built so a malformed response degrades to
//! an all-zero FAIL verdict instead of an error; only the transport call
//! itself can fail.

use crate::error::Result;
use crate::generator::resolve_model;
use crate::llm::{ChatClient, ChatOptions, Message};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Provider tag recorded on judge outcomes.
const PROVIDER: &str = "groq";

const SYSTEM_PROMPT: &str = r#"You are an evaluation judge for a RAG system.
You MUST return a strictly-valid JSON object with EXACTLY this schema (all keys present):

{
  "scores": {
    "faithfulness": <float 0..1>,
    "relevance": <float 0..1>,
    "precision": <float 0..1>,
    "recall": <float 0..1>,
    "correctness_det": <float 0..1>
  },
  "format_issues": {
    "too_short": <0 or 1>,
    "contains_forbidden": <0 or 1>
  },
  "verdict": "<PASS or FAIL>",
  "reasons": [<short strings>]
}

Definitions:
- faithfulness: answer is supported by contexts (no hallucinations).
- relevance: answer addresses the question.
- precision: answer avoids extra info not supported by contexts/ground truth.
- recall: answer covers key facts from ground truth.
- correctness_det: overall correctness when objective (0..1).

Rules:
- Output ONLY the JSON. No prose, no backticks, no extra keys.
- If ground truth is empty, set recall=0.0 but still fill other fields.
"#;

/// Canonical score field names and the flat spellings accepted for each.
const SCORE_ALIASES: &[(&str, &[&str])] = &[
    ("faithfulness", &["faith"]),
    ("relevance", &["relev"]),
    ("precision", &["prec"]),
    ("recall", &[]),
    ("correctness_det", &[]),
];

/// The five rubric scores, each a finite float in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub faithfulness: f64,
    pub relevance: f64,
    pub precision: f64,
    pub recall: f64,
    pub correctness_det: f64,
}

/// Binary format-violation flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatIssues {
    pub too_short: u8,
    pub contains_forbidden: u8,
}

impl Default for FormatIssues {
    fn default() -> Self {
        Self {
            too_short: 0,
            contains_forbidden: 0,
        }
    }
}

/// Canonical structured verdict, suitable for audit/trace attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub scores: Scores,
    pub format_issues: FormatIssues,
    pub verdict: String,
    pub reasons: Vec<String>,
}

/// Flattened numeric view for tabular reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatScores {
    pub faith: f64,
    pub relev: f64,
    pub prec: f64,
    pub recall: f64,
    pub verdict: String,
}

impl From<&JudgeVerdict> for FlatScores {
    fn from(v: &JudgeVerdict) -> Self {
        Self {
            faith: v.scores.faithfulness,
            relev: v.scores.relevance,
            prec: v.scores.precision,
            recall: v.scores.recall,
            verdict: v.verdict.clone(),
        }
    }
}

/// Everything one judging call produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeOutcome {
    /// Canonical structured verdict.
    pub verdict: JudgeVerdict,
    /// Flattened view of the same scores.
    pub flat: FlatScores,
    /// Resolved judging model name.
    pub model: String,
    /// Provider tag.
    pub provider: String,
}

/// Outcome of the three-step response repair ladder.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    /// The raw text parsed as a JSON object directly.
    Direct(Map<String, Value>),
    /// Parsing succeeded only on the first-`{`-to-last-`}` substring.
    Recovered(Map<String, Value>),
    /// Neither attempt produced an object.
    Malformed,
}

impl ParsedResponse {
    /// The parsed object, or an empty one for malformed input.
    pub fn into_object(self) -> Map<String, Value> {
        match self {
            ParsedResponse::Direct(obj) | ParsedResponse::Recovered(obj) => obj,
            ParsedResponse::Malformed => Map::new(),
        }
    }
}

/// Parse a judge response. Never errors: direct parse, then the substring
/// between the first `{` and the last `}`, then give up.
pub fn parse_response(raw: &str) -> ParsedResponse {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
        return ParsedResponse::Direct(obj);
    }

    let start = raw.find('{');
    let end = raw.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if end > start {
            if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&raw[start..=end]) {
                return ParsedResponse::Recovered(obj);
            }
        }
    }

    ParsedResponse::Malformed
}

/// Case-insensitive whitespace tokenization restricted to ASCII tokens.
fn token_set(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split_whitespace()
        .filter(|t| t.is_ascii())
        .map(|t| t.to_string())
        .collect()
}

/// Deterministic precision/recall used when the judging model omits them.
///
/// precision = answer tokens present in contexts / answer tokens (0 for an
/// empty answer); recall = ground-truth tokens present in the answer /
/// ground-truth tokens (0 for empty ground truth).
pub fn fallback_precision_recall(
    contexts: &[String],
    answer: &str,
    ground_truth: &str,
) -> (f64, f64) {
    let ans = token_set(answer);
    if ans.is_empty() {
        return (0.0, 0.0);
    }

    let ctx = token_set(&contexts.join(" "));
    let gt = token_set(ground_truth);

    let precision = ans.intersection(&ctx).count() as f64 / ans.len() as f64;
    let recall = if gt.is_empty() {
        0.0
    } else {
        gt.intersection(&ans).count() as f64 / gt.len() as f64
    };

    (precision, recall)
}

/// Coerce a JSON value to a score. `None` means missing: absent, null, or
/// an empty/unparseable string.
fn coerce_score(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 }
}

fn coerce_flag(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Number(n)) => {
            if n.as_f64().unwrap_or(0.0) != 0.0 {
                1
            } else {
                0
            }
        }
        Some(Value::Bool(true)) => 1,
        _ => 0,
    }
}

/// Look a field up by its canonical name, then its accepted aliases.
fn lookup<'v>(obj: &'v Map<String, Value>, canonical: &str) -> Option<&'v Value> {
    if let Some(v) = obj.get(canonical) {
        return Some(v);
    }
    for (name, aliases) in SCORE_ALIASES {
        if *name == canonical {
            for alias in *aliases {
                if let Some(v) = obj.get(*alias) {
                    return Some(v);
                }
            }
        }
    }
    None
}

/// Normalize a parsed judge object into the canonical verdict.
///
/// - Flat spellings (`faith`, `relev`, `prec`) are lifted into the nested
///   schema via the alias table.
/// - Missing numeric fields default to 0.0; missing precision/recall are
///   replaced by the deterministic fallback.
/// - Missing `format_issues`/`verdict`/`reasons` default to
///   `{0,0}`/`"FAIL"`/`[]`.
///
/// Running this on an already-canonical object is a no-op.
pub fn normalize_verdict(
    obj: &Map<String, Value>,
    contexts: &[String],
    answer: &str,
    ground_truth: &str,
) -> JudgeVerdict {
    // Nested schema when present, otherwise the object itself carries
    // flat keys at the top level.
    let scores_obj: &Map<String, Value> = match obj.get("scores") {
        Some(Value::Object(nested)) => nested,
        _ => obj,
    };

    let (fallback_p, fallback_r) = fallback_precision_recall(contexts, answer, ground_truth);

    let faithfulness = coerce_score(lookup(scores_obj, "faithfulness")).unwrap_or(0.0);
    let relevance = coerce_score(lookup(scores_obj, "relevance")).unwrap_or(0.0);
    let correctness_det = coerce_score(lookup(scores_obj, "correctness_det")).unwrap_or(0.0);
    let precision = coerce_score(lookup(scores_obj, "precision")).unwrap_or(fallback_p);
    let recall = coerce_score(lookup(scores_obj, "recall")).unwrap_or(fallback_r);

    let format_issues = match obj.get("format_issues") {
        Some(Value::Object(fi)) => FormatIssues {
            too_short: coerce_flag(fi.get("too_short")),
            contains_forbidden: coerce_flag(fi.get("contains_forbidden")),
        },
        _ => FormatIssues::default(),
    };

    let verdict = match obj.get("verdict") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => "FAIL".to_string(),
    };

    let reasons = match obj.get("reasons") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    };

    JudgeVerdict {
        scores: Scores {
            faithfulness: clamp_unit(faithfulness),
            relevance: clamp_unit(relevance),
            precision: clamp_unit(precision),
            recall: clamp_unit(recall),
            correctness_det: clamp_unit(correctness_det),
        },
        format_issues,
        verdict,
        reasons,
    }
}

/// Stage seam used by the evaluation harness; lets tests run the harness
/// against a fake judge.
pub trait Judge {
    async fn evaluate(
        &self,
        question: &str,
        contexts: &[String],
        answer: &str,
        ground_truth: &str,
    ) -> Result<JudgeOutcome>;
}

/// LLM-backed judge.
pub struct JudgeAgent<'a> {
    client: &'a ChatClient,
    model: String,
}

impl<'a> JudgeAgent<'a> {
    pub fn new(client: &'a ChatClient) -> Self {
        let model = resolve_model(None, client.configured_model());
        Self { client, model }
    }

    /// Force a specific judging model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = resolve_model(Some(&model.into()), self.client.configured_model());
        self
    }

    /// The resolved judging model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages(
        question: &str,
        contexts: &[String],
        answer: &str,
        ground_truth: &str,
    ) -> Vec<Message> {
        let ctx_joined = contexts.join("\n---\n");
        let user = format!(
            "Question:\n{}\n\nContexts:\n{}\n\nGround truth (may be empty):\n{}\n\nAssistant answer:\n{}\n",
            question, ctx_joined, ground_truth, answer
        );
        vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
    }
}

impl Judge for JudgeAgent<'_> {
    /// Score an answer against the rubric.
    ///
    /// The judging call itself can fail and propagates; a successful but
    /// malformed response is always repaired, worst case into an all-zero
    /// FAIL verdict.
    async fn evaluate(
        &self,
        question: &str,
        contexts: &[String],
        answer: &str,
        ground_truth: &str,
    ) -> Result<JudgeOutcome> {
        let messages = Self::build_messages(question, contexts, answer, ground_truth);
        let options = ChatOptions {
            model: self.model.clone(),
            temperature: 0.0,
            max_tokens: 256,
        };

        let response = self.client.chat_with(messages, &options).await?;
        let obj = parse_response(response.content.trim()).into_object();
        let verdict = normalize_verdict(&obj, contexts, answer, ground_truth);
        let flat = FlatScores::from(&verdict);

        Ok(JudgeOutcome {
            verdict,
            flat,
            model: self.model.clone(),
            provider: PROVIDER.to_string(),
        })
    }
}
