//! Batch evaluation harness.
//!
//! Drives retrieve -> generate -> judge for every dataset row and
//! aggregates a report. Rows are independent: one malformed or failing
//! row degrades the report, never the run.

use crate::error::{RagJudgeError, Result};
use crate::generator::{AnswerGenerator, UsageInfo};
use crate::judge::{Judge, JudgeOutcome};
use crate::llm::EmbeddingClient;
use crate::retriever::{RetrievedPassage, Retriever};
use crate::trace::Tracer;
use comfy_table::Table;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

/// One dataset row. Unknown keys are ignored; both `ground_truth` and the
/// plural spelling are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetRow {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub ground_truth: String,
    #[serde(default)]
    pub ground_truths: String,
    #[serde(default)]
    pub contexts: Option<Vec<String>>,
}

impl DatasetRow {
    /// The row's ground truth under either accepted spelling.
    pub fn ground_truth(&self) -> &str {
        if !self.ground_truth.is_empty() {
            &self.ground_truth
        } else {
            &self.ground_truths
        }
    }
}

/// Load a dataset: either a JSON list of rows or an object with a `rows`
/// key holding that list. A row that fails to deserialize is skipped with
/// a warning; it degrades the report, not the run.
pub fn load_dataset(path: &Path) -> Result<Vec<DatasetRow>> {
    let content = fs::read_to_string(path).map_err(|e| RagJudgeError::io(path, e))?;
    let value: Value = serde_json::from_str(&content)?;

    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(mut obj) => match obj.remove("rows") {
            Some(Value::Array(rows)) => rows,
            _ => {
                return Err(RagJudgeError::InvalidDataset(
                    "expected a JSON list or an object with a 'rows' key".to_string(),
                ));
            }
        },
        _ => {
            return Err(RagJudgeError::InvalidDataset(
                "expected a JSON list or an object with a 'rows' key".to_string(),
            ));
        }
    };

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| match serde_json::from_value(row) {
            Ok(row) => row,
            Err(e) => {
                warn!(row = i + 1, error = %e, "skipping malformed dataset row");
                DatasetRow::default()
            }
        })
        .collect())
}

/// How a row's contexts were obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextsUsed {
    /// "provided" (row-supplied gold contexts) or "retrieved".
    pub used: String,
    pub count: usize,
    pub idx: Vec<usize>,
    pub preview: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<f32>>,
}

fn preview(text: &str) -> String {
    text.chars().take(160).collect()
}

/// Stage seam for context retrieval, so harness tests can run without an
/// index on disk.
pub trait ContextSource {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedPassage>>;
}

/// [`ContextSource`] backed by the persisted vector index.
pub struct IndexContextSource<'a> {
    retriever: Retriever<'a>,
    index_dir: PathBuf,
}

impl<'a> IndexContextSource<'a> {
    pub fn new(embedder: &'a EmbeddingClient, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            retriever: Retriever::new(embedder),
            index_dir: index_dir.into(),
        }
    }
}

impl ContextSource for IndexContextSource<'_> {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedPassage>> {
        self.retriever.retrieve(query, &self.index_dir, top_k).await
    }
}

/// Per-row latency, milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Latency {
    pub gen_ms: u64,
    pub judge_ms: u64,
}

/// One recorded report item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportItem {
    /// 1-based position in the original dataset.
    pub idx: usize,
    pub question: String,
    pub contexts_used: ContextsUsed,
    pub answer: String,
    pub usage: UsageInfo,
    pub scores: JudgeOutcome,
    pub latency: Latency,
}

/// Report-level aggregates, computed only over recorded items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub avg_faith: Option<f64>,
    pub avg_relev: Option<f64>,
}

/// The full evaluation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub trace_id: String,
    pub summary: Summary,
    pub items: Vec<ReportItem>,
}

/// Evaluation harness settings.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub top_k: usize,
    pub trace_name: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            trace_name: "online_evaluation".to_string(),
        }
    }
}

/// Run the full pipeline over a dataset.
///
/// Rows without a question are silently skipped. A row whose stage fails
/// is logged and dropped; subsequent rows still run. The report is always
/// produced, even with zero items.
pub async fn run<R, G, J>(
    rows: &[DatasetRow],
    contexts: &R,
    generator: &G,
    judge: &J,
    tracer: &Tracer,
    config: &HarnessConfig,
) -> EvaluationReport
where
    R: ContextSource,
    G: AnswerGenerator,
    J: Judge,
{
    let root = tracer.start(
        &config.trace_name,
        json!({ "rows": rows.len(), "top_k": config.top_k }),
    );

    let mut items: Vec<ReportItem> = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let idx = i + 1;
        let question = row.question.trim();
        if question.is_empty() {
            continue;
        }

        match process_row(idx, question, row, contexts, generator, judge, tracer, &root, config)
            .await
        {
            Ok(item) => items.push(item),
            Err(e) => {
                warn!(row = idx, error = %e, "row failed; continuing");
            }
        }
    }

    let summary = summarize(&items);
    let trace_id = tracer
        .end(
            root,
            json!({
                "items_evaluated": summary.count,
                "avg_faith": summary.avg_faith,
                "avg_relev": summary.avg_relev,
            }),
        )
        .await;

    EvaluationReport {
        trace_id,
        summary,
        items,
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_row<R, G, J>(
    idx: usize,
    question: &str,
    row: &DatasetRow,
    contexts: &R,
    generator: &G,
    judge: &J,
    tracer: &Tracer,
    root: &crate::trace::SpanHandle,
    config: &HarnessConfig,
) -> Result<ReportItem>
where
    R: ContextSource,
    G: AnswerGenerator,
    J: Judge,
{
    // Row-supplied gold contexts bypass retrieval.
    let (ctx, used) = match &row.contexts {
        Some(provided) if !provided.is_empty() => {
            let used = ContextsUsed {
                used: "provided".to_string(),
                count: provided.len(),
                idx: Vec::new(),
                preview: provided.iter().take(3).map(|c| preview(c)).collect(),
                scores: None,
            };
            (provided.clone(), used)
        }
        _ => {
            let span = tracer.child(
                root,
                "retrieval",
                json!({ "question": question, "idx": idx, "top_k": config.top_k }),
            );
            // The span is closed on both outcomes so failed rows still
            // show up in the trace.
            let results = match contexts.retrieve(question, config.top_k).await {
                Ok(results) => results,
                Err(e) => {
                    tracer.end(span, json!({ "error": e.to_string() })).await;
                    return Err(e);
                }
            };
            let used = ContextsUsed {
                used: "retrieved".to_string(),
                count: results.len(),
                idx: results.iter().map(|r| r.index).collect(),
                preview: results.iter().map(|r| preview(&r.text)).collect(),
                scores: Some(results.iter().map(|r| r.score).collect()),
            };
            tracer
                .end(
                    span,
                    json!({ "count": used.count, "idx": used.idx, "preview": used.preview }),
                )
                .await;
            (results.into_iter().map(|r| r.text).collect(), used)
        }
    };

    let gen_span = tracer.child(
        root,
        "generator.answer",
        json!({ "question": question, "contexts_count": ctx.len() }),
    );
    let gen_start = Instant::now();
    let outcome = match generator.generate(question, &ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracer
                .end(gen_span, json!({ "error": e.to_string() }))
                .await;
            return Err(e);
        }
    };
    let gen_ms = gen_start.elapsed().as_millis() as u64;
    tracer
        .end(
            gen_span,
            json!({
                "question": question,
                "contexts": ctx,
                "answer": outcome.answer,
                "usage": outcome.usage,
                "latency_ms": gen_ms,
            }),
        )
        .await;

    let ground_truth = row.ground_truth();
    let judge_span = tracer.child(
        root,
        "judge.verdict",
        json!({
            "question": question,
            "answer": preview(&outcome.answer),
            "ground_truth": preview(ground_truth),
        }),
    );
    let judge_start = Instant::now();
    let scores = match judge
        .evaluate(question, &ctx, &outcome.answer, ground_truth)
        .await
    {
        Ok(scores) => scores,
        Err(e) => {
            tracer
                .end(judge_span, json!({ "error": e.to_string() }))
                .await;
            return Err(e);
        }
    };
    let judge_ms = judge_start.elapsed().as_millis() as u64;
    tracer
        .end(judge_span, serde_json::to_value(&scores).unwrap_or(Value::Null))
        .await;

    Ok(ReportItem {
        idx,
        question: question.to_string(),
        contexts_used: used,
        answer: outcome.answer,
        usage: outcome.usage,
        scores,
        latency: Latency { gen_ms, judge_ms },
    })
}

/// Aggregate report-level averages; `None` over an empty item set.
fn summarize(items: &[ReportItem]) -> Summary {
    let count = items.len();
    if count == 0 {
        return Summary {
            count,
            avg_faith: None,
            avg_relev: None,
        };
    }

    let avg_faith = items.iter().map(|i| i.scores.flat.faith).sum::<f64>() / count as f64;
    let avg_relev = items.iter().map(|i| i.scores.flat.relev).sum::<f64>() / count as f64;

    Summary {
        count,
        avg_faith: Some(avg_faith),
        avg_relev: Some(avg_relev),
    }
}

/// Write the report as pretty JSON, creating parent directories.
pub fn write_report(report: &EvaluationReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| RagJudgeError::io(parent, e))?;
        }
    }
    let content = serde_json::to_string_pretty(report)?;
    fs::write(path, content).map_err(|e| RagJudgeError::io(path, e))?;
    Ok(())
}

/// Render the per-row score table.
pub fn format_table(items: &[ReportItem]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["question", "faith", "relev", "prec", "recall", "verdict"]);

    for item in items {
        let mut question: String = item.question.chars().take(28).collect();
        if item.question.chars().count() > 28 {
            question.push('…');
        }
        table.add_row(vec![
            question,
            format!("{:.2}", item.scores.flat.faith),
            format!("{:.2}", item.scores.flat.relev),
            format!("{:.2}", item.scores.flat.prec),
            format!("{:.2}", item.scores.flat.recall),
            item.scores.flat.verdict.clone(),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GenerationOutcome, REFUSAL};
    use crate::judge::{FlatScores, FormatIssues, JudgeVerdict, Scores};
    use crate::trace::Tracer;
    use tempfile::TempDir;

    struct FakeContexts;

    impl ContextSource for FakeContexts {
        async fn retrieve(&self, _query: &str, top_k: usize) -> Result<Vec<RetrievedPassage>> {
            Ok((0..top_k)
                .map(|i| RetrievedPassage {
                    index: i,
                    score: 1.0 - i as f32 * 0.1,
                    text: format!("passage {}", i),
                })
                .collect())
        }
    }

    struct FakeGenerator {
        fail_on: Option<&'static str>,
    }

    impl AnswerGenerator for FakeGenerator {
        async fn generate(&self, question: &str, contexts: &[String]) -> Result<GenerationOutcome> {
            if self.fail_on == Some(question) {
                return Err(RagJudgeError::LlmApi("boom".to_string()));
            }
            let answer = if contexts.is_empty() {
                REFUSAL.to_string()
            } else {
                format!("answer to {}", question)
            };
            Ok(GenerationOutcome {
                answer,
                usage: UsageInfo {
                    prompt_tokens: Some(10),
                    completion_tokens: Some(5),
                    total_tokens: Some(15),
                    model: "fake-model".to_string(),
                    provider: "test".to_string(),
                },
            })
        }
    }

    struct FailingContexts;

    impl ContextSource for FailingContexts {
        async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedPassage>> {
            Err(RagJudgeError::IndexCorrupt("broken index".to_string()))
        }
    }

    struct FailingJudge;

    impl Judge for FailingJudge {
        async fn evaluate(
            &self,
            _question: &str,
            _contexts: &[String],
            _answer: &str,
            _ground_truth: &str,
        ) -> Result<JudgeOutcome> {
            Err(RagJudgeError::LlmApi("judge down".to_string()))
        }
    }

    struct FakeJudge;

    impl Judge for FakeJudge {
        async fn evaluate(
            &self,
            _question: &str,
            _contexts: &[String],
            _answer: &str,
            _ground_truth: &str,
        ) -> Result<JudgeOutcome> {
            let verdict = JudgeVerdict {
                scores: Scores {
                    faithfulness: 0.8,
                    relevance: 0.6,
                    precision: 0.7,
                    recall: 0.5,
                    correctness_det: 0.9,
                },
                format_issues: FormatIssues::default(),
                verdict: "PASS".to_string(),
                reasons: vec![],
            };
            let flat = FlatScores::from(&verdict);
            Ok(JudgeOutcome {
                verdict,
                flat,
                model: "fake-judge".to_string(),
                provider: "test".to_string(),
            })
        }
    }

    fn row(question: &str) -> DatasetRow {
        DatasetRow {
            question: question.to_string(),
            ..Default::default()
        }
    }

    fn quiet_tracer() -> Tracer {
        Tracer::new(Default::default())
    }

    #[tokio::test]
    async fn test_rows_without_question_are_skipped() {
        let rows = vec![row("first?"), row(""), row("third?")];
        let report = run(
            &rows,
            &FakeContexts,
            &FakeGenerator { fail_on: None },
            &FakeJudge,
            &quiet_tracer(),
            &HarnessConfig::default(),
        )
        .await;

        assert_eq!(report.summary.count, 2);
        let indices: Vec<usize> = report.items.iter().map(|i| i.idx).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_row_failure_does_not_abort_run() {
        let rows = vec![row("ok one?"), row("bad row?"), row("ok two?")];
        let report = run(
            &rows,
            &FakeContexts,
            &FakeGenerator {
                fail_on: Some("bad row?"),
            },
            &FakeJudge,
            &quiet_tracer(),
            &HarnessConfig::default(),
        )
        .await;

        assert_eq!(report.summary.count, 2);
        let indices: Vec<usize> = report.items.iter().map(|i| i.idx).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_retrieval_failure_skips_row_and_run_continues() {
        let mut gold = row("gold?");
        gold.contexts = Some(vec!["curated context".to_string()]);
        let rows = vec![row("needs retrieval?"), gold];

        let report = run(
            &rows,
            &FailingContexts,
            &FakeGenerator { fail_on: None },
            &FakeJudge,
            &quiet_tracer(),
            &HarnessConfig::default(),
        )
        .await;

        // Only the row with provided contexts survives a broken index.
        assert_eq!(report.summary.count, 1);
        assert_eq!(report.items[0].idx, 2);
    }

    #[tokio::test]
    async fn test_judge_failure_skips_row_and_run_continues() {
        let report = run(
            &[row("a?"), row("b?")],
            &FakeContexts,
            &FakeGenerator { fail_on: None },
            &FailingJudge,
            &quiet_tracer(),
            &HarnessConfig::default(),
        )
        .await;

        assert_eq!(report.summary.count, 0);
        assert!(report.summary.avg_faith.is_none());
        assert!(!report.trace_id.is_empty());
    }

    #[tokio::test]
    async fn test_provided_contexts_bypass_retrieval() {
        let mut gold = row("gold?");
        gold.contexts = Some(vec!["curated context".to_string()]);

        let report = run(
            &[gold],
            &FakeContexts,
            &FakeGenerator { fail_on: None },
            &FakeJudge,
            &quiet_tracer(),
            &HarnessConfig::default(),
        )
        .await;

        let item = &report.items[0];
        assert_eq!(item.contexts_used.used, "provided");
        assert_eq!(item.contexts_used.count, 1);
        assert!(item.contexts_used.idx.is_empty());
        assert!(item.contexts_used.scores.is_none());
    }

    #[tokio::test]
    async fn test_retrieved_contexts_record_scores() {
        let report = run(
            &[row("retrieved?")],
            &FakeContexts,
            &FakeGenerator { fail_on: None },
            &FakeJudge,
            &quiet_tracer(),
            &HarnessConfig::default(),
        )
        .await;

        let item = &report.items[0];
        assert_eq!(item.contexts_used.used, "retrieved");
        assert_eq!(item.contexts_used.count, 3);
        assert_eq!(item.contexts_used.idx, vec![0, 1, 2]);
        assert!(item.contexts_used.scores.is_some());
    }

    #[tokio::test]
    async fn test_empty_dataset_yields_null_averages() {
        let report = run(
            &[],
            &FakeContexts,
            &FakeGenerator { fail_on: None },
            &FakeJudge,
            &quiet_tracer(),
            &HarnessConfig::default(),
        )
        .await;

        assert_eq!(report.summary.count, 0);
        assert!(report.summary.avg_faith.is_none());
        assert!(report.summary.avg_relev.is_none());
        assert!(!report.trace_id.is_empty());
    }

    #[tokio::test]
    async fn test_averages_over_recorded_items() {
        let report = run(
            &[row("a?"), row("b?")],
            &FakeContexts,
            &FakeGenerator { fail_on: None },
            &FakeJudge,
            &quiet_tracer(),
            &HarnessConfig::default(),
        )
        .await;

        assert!((report.summary.avg_faith.unwrap() - 0.8).abs() < 1e-9);
        assert!((report.summary.avg_relev.unwrap() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_load_dataset_list_and_rows_object() {
        let dir = TempDir::new().unwrap();

        let list_path = dir.path().join("list.json");
        fs::write(
            &list_path,
            r#"[{"question": "q1"}, {"question": "q2", "ground_truth": "gt"}]"#,
        )
        .unwrap();
        let rows = load_dataset(&list_path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].ground_truth(), "gt");

        let obj_path = dir.path().join("obj.json");
        fs::write(
            &obj_path,
            r#"{"rows": [{"question": "q1", "contexts": ["c"]}]}"#,
        )
        .unwrap();
        let rows = load_dataset(&obj_path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].contexts.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_load_dataset_rejects_other_shapes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#""just a string""#).unwrap();
        assert!(matches!(
            load_dataset(&path),
            Err(RagJudgeError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_malformed_row_becomes_skippable_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.json");
        fs::write(&path, r#"[{"question": "ok"}, 42, {"question": "also ok"}]"#).unwrap();

        let rows = load_dataset(&path).unwrap();
        assert_eq!(rows.len(), 3);
        // The malformed middle row has no question and will be skipped.
        assert!(rows[1].question.is_empty());
    }

    #[test]
    fn test_plural_ground_truth_spelling() {
        let row: DatasetRow =
            serde_json::from_str(r#"{"question": "q", "ground_truths": "plural"}"#).unwrap();
        assert_eq!(row.ground_truth(), "plural");
    }

    #[test]
    fn test_write_report_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deep/report.json");

        let report = EvaluationReport {
            trace_id: "t".to_string(),
            summary: Summary {
                count: 0,
                avg_faith: None,
                avg_relev: None,
            },
            items: vec![],
        };
        write_report(&report, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"trace_id\""));
    }

    #[test]
    fn test_table_truncates_long_questions() {
        let verdict = JudgeVerdict {
            scores: Scores {
                faithfulness: 1.0,
                relevance: 1.0,
                precision: 1.0,
                recall: 1.0,
                correctness_det: 1.0,
            },
            format_issues: FormatIssues::default(),
            verdict: "PASS".to_string(),
            reasons: vec![],
        };
        let flat = FlatScores::from(&verdict);
        let item = ReportItem {
            idx: 1,
            question: "x".repeat(64),
            contexts_used: ContextsUsed {
                used: "provided".to_string(),
                count: 0,
                idx: vec![],
                preview: vec![],
                scores: None,
            },
            answer: "a".to_string(),
            usage: UsageInfo {
                prompt_tokens: None,
                completion_tokens: None,
                total_tokens: None,
                model: "m".to_string(),
                provider: "p".to_string(),
            },
            scores: JudgeOutcome {
                verdict,
                flat,
                model: "m".to_string(),
                provider: "p".to_string(),
            },
            latency: Latency {
                gen_ms: 0,
                judge_ms: 0,
            },
        };

        let rendered = format_table(&[item]).to_string();
        assert!(rendered.contains('…'));
        assert!(rendered.contains("1.00"));
        assert!(rendered.contains("PASS"));
    }
}
