//! Fully local scoring path, no model calls.
//!
//! Token-overlap metrics over the same rubric dimensions as the LLM
//! judge. Independent of it, and usable standalone for regression testing
//! the rubric.

use super::FormatIssues;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Stopwords excluded from the semantic token sets.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "of", "and", "or", "in", "to", "for", "on",
    "at", "by", "with", "that", "this", "it", "who", "what", "when", "where", "why", "how",
];

fn simple_tokens(s: &str) -> HashSet<String> {
    s.to_lowercase().split_whitespace().map(String::from).collect()
}

/// Lowercase alphanumeric tokens with stopwords removed.
fn semantic_tokens(s: &str) -> HashSet<String> {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|t| !STOPWORDS.contains(t))
        .map(String::from)
        .collect()
}

fn jaccard_sets(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union.max(1.0)
}

/// Jaccard similarity over lowercase whitespace token sets.
pub fn jaccard(a: &str, b: &str) -> f64 {
    jaccard_sets(&simple_tokens(a), &simple_tokens(b))
}

/// Heuristic format-violation flags.
pub fn format_checks(answer: &str) -> FormatIssues {
    let lower = answer.to_lowercase();
    FormatIssues {
        too_short: if answer.trim().len() < 10 { 1 } else { 0 },
        contains_forbidden: if lower.contains("password") || lower.contains("ssn") {
            1
        } else {
            0
        },
    }
}

/// Fraction of answer tokens that appear in the joined contexts.
pub fn context_overlap_score(answer: &str, contexts: &[String]) -> f64 {
    let ans = simple_tokens(answer);
    if ans.is_empty() {
        return 0.0;
    }
    let ctx = simple_tokens(&contexts.join(" "));
    ans.intersection(&ctx).count() as f64 / ans.len() as f64
}

/// Best jaccard match of the answer against any ground truth; 0 when no
/// ground truths exist.
pub fn correctness_vs_ground_truth(answer: &str, ground_truths: &[String]) -> f64 {
    ground_truths
        .iter()
        .map(|gt| jaccard(answer, gt))
        .fold(0.0, f64::max)
}

/// Semantic cross-check scores over the rubric dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticScores {
    pub faithfulness: f64,
    pub answer_relevance: f64,
    pub context_precision: f64,
    pub context_recall: f64,
}

/// Token-Jaccard faithfulness/relevance with heuristic boosts, plus
/// overlap precision/recall.
///
/// Boosts (capped at 1.0): +0.4 when the answer fully contains the ground
/// truth tokens, +0.3 when nearly all answer tokens are covered by the
/// contexts, +0.3 when the ground truth appears verbatim in the answer;
/// relevance gets half the boost. The recall formula's x3.0 softening
/// multiplier is a tunable heuristic carried over as-is, not a principled
/// metric.
pub fn semantic_scores(
    question: &str,
    answer: &str,
    contexts: &[String],
    ground_truths: &[String],
) -> SemanticScores {
    let q = semantic_tokens(question);
    let a = semantic_tokens(answer);
    let c = semantic_tokens(&contexts.join(" "));
    let gt_text = ground_truths.join(" ");
    let gt = semantic_tokens(&gt_text);

    let mut faithfulness = jaccard_sets(&a, &c);
    let mut relevance = jaccard_sets(&q, &a);

    let mut boost = 0.0;
    if !gt.is_empty() && gt.is_subset(&a) {
        boost += 0.4;
    }
    if !a.is_empty() && !c.is_empty() && a.difference(&c).count() <= 1 {
        boost += 0.3;
    }
    if !gt_text.trim().is_empty()
        && answer
            .to_lowercase()
            .contains(&gt_text.to_lowercase().trim().to_string())
    {
        boost += 0.3;
    }

    faithfulness = (faithfulness + boost).min(1.0);
    relevance = (relevance + boost * 0.5).min(1.0);

    let context_precision = if a.is_empty() {
        0.0
    } else {
        a.intersection(&c).count() as f64 / a.len() as f64
    };
    let context_recall = if c.is_empty() {
        0.0
    } else {
        ((a.intersection(&c).count() as f64 / c.len() as f64) * 3.0).min(1.0)
    };

    SemanticScores {
        faithfulness,
        answer_relevance: relevance,
        context_precision,
        context_recall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jaccard_identical_and_disjoint() {
        assert!((jaccard("the cat sat", "the cat sat") - 1.0).abs() < 1e-9);
        assert_eq!(jaccard("alpha beta", "gamma delta"), 0.0);
        assert_eq!(jaccard("", "anything"), 0.0);
    }

    #[test]
    fn test_jaccard_partial_overlap() {
        // {a,b} vs {b,c}: intersection 1, union 3.
        assert!((jaccard("a b", "b c") - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_checks() {
        let short = format_checks("tiny");
        assert_eq!(short.too_short, 1);
        assert_eq!(short.contains_forbidden, 0);

        let forbidden = format_checks("Your PASSWORD is hunter2, keep it safe.");
        assert_eq!(forbidden.too_short, 0);
        assert_eq!(forbidden.contains_forbidden, 1);

        let clean = format_checks("A perfectly ordinary answer.");
        assert_eq!(clean.too_short, 0);
        assert_eq!(clean.contains_forbidden, 0);
    }

    #[test]
    fn test_context_overlap_score() {
        let contexts = vec!["the cat sat".to_string()];
        let score = context_overlap_score("the cat sat on mat", &contexts);
        assert!((score - 0.6).abs() < 1e-9);

        assert_eq!(context_overlap_score("", &contexts), 0.0);
    }

    #[test]
    fn test_correctness_vs_ground_truth_takes_best_match() {
        let gts = vec!["completely different".to_string(), "the cat sat".to_string()];
        let score = correctness_vs_ground_truth("the cat sat", &gts);
        assert!((score - 1.0).abs() < 1e-9);

        assert_eq!(correctness_vs_ground_truth("anything", &[]), 0.0);
    }

    #[test]
    fn test_semantic_scores_exact_answer() {
        let contexts = vec!["Paris has been France's capital since 508.".to_string()];
        let gts = vec!["Paris".to_string()];
        let scores = semantic_scores(
            "What city serves as France's capital?",
            "Paris",
            &contexts,
            &gts,
        );

        // Ground-truth subset + verbatim + full context coverage boosts
        // saturate faithfulness.
        assert!((scores.faithfulness - 1.0).abs() < 1e-9);
        assert!(scores.answer_relevance > 0.0);
        assert!((scores.context_precision - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_semantic_recall_softener_caps_at_one() {
        let contexts = vec!["alpha beta gamma".to_string()];
        let scores = semantic_scores("q", "alpha beta gamma", &contexts, &[]);
        // Coverage 3/3 * 3.0 caps at 1.0.
        assert_eq!(scores.context_recall, 1.0);
    }

    #[test]
    fn test_semantic_scores_empty_answer() {
        let contexts = vec!["something".to_string()];
        let scores = semantic_scores("question", "", &contexts, &[]);
        assert_eq!(scores.faithfulness, 0.0);
        assert_eq!(scores.context_precision, 0.0);
        assert_eq!(scores.context_recall, 0.0);
    }

    #[test]
    fn test_stopwords_ignored() {
        // Only stopwords differ, so the sets are identical.
        assert!((semantic_scores("q", "the cat sat", &["a cat sat".to_string()], &[])
            .faithfulness
            - 1.0)
            .abs()
            < 1e-9);
    }
}
