//! Top-K passage retrieval over the persisted vector index.

use crate::error::{RagJudgeError, Result};
use crate::index::VectorIndex;
use crate::llm::EmbeddingClient;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One retrieved passage, identified by its index row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub index: usize,
    pub score: f32,
    pub text: String,
}

/// Retrieves passages by cosine similarity against the flat index.
pub struct Retriever<'a> {
    embedder: &'a EmbeddingClient,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a EmbeddingClient) -> Self {
        Self { embedder }
    }

    /// Load the index at `index_dir`, embed `query`, and return the
    /// `top_k` most similar passages.
    ///
    /// The query is embedded with the model recorded in the index
    /// metadata; the embedder's configured model is only a fallback for
    /// metadata that omits it. Mixing embedding spaces silently would
    /// make every score meaningless.
    pub async fn retrieve(
        &self,
        query: &str,
        index_dir: &Path,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        let index = VectorIndex::load(index_dir)?;

        let model = index
            .meta()
            .embed_model
            .clone()
            .unwrap_or_else(|| self.embedder.configured_model().to_string());

        let query_vec = self.embedder.embed(&model, query).await?;
        debug!(rows = index.len(), model = %model, "scanning index");

        rank(&index, &query_vec, top_k)
    }
}

/// Brute-force similarity scan: dot product of the query vector against
/// every row (cosine similarity, both sides unit-normalized), sorted by
/// descending score. The sort is stable, so tied scores keep original
/// index order. O(N * dim) per query; fine for an in-memory corpus.
///
/// A query vector whose dimension differs from the index rows is an
/// embedding-space mismatch; scoring it would be meaningless, so it is
/// rejected instead.
pub fn rank(index: &VectorIndex, query_vec: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>> {
    if query_vec.len() != index.dim() {
        return Err(RagJudgeError::IndexCorrupt(format!(
            "query vector has {} dims, index rows have {}",
            query_vec.len(),
            index.dim()
        )));
    }

    let mut scored: Vec<(usize, f32)> = (0..index.len())
        .map(|i| (i, dot(index.row(i), query_vec)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    Ok(scored
        .into_iter()
        .take(top_k)
        .map(|(i, score)| RetrievedPassage {
            index: i,
            score,
            text: index.text(i).to_string(),
        })
        .collect())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexMeta;

    fn unit_index() -> VectorIndex {
        let vectors = vec![
            1.0, 0.0, 0.0, // row 0
            0.0, 1.0, 0.0, // row 1
            0.0, 0.0, 1.0, // row 2
        ];
        let texts = vec!["zero".to_string(), "one".to_string(), "two".to_string()];
        let meta = IndexMeta {
            embed_model: Some("test-embedder".to_string()),
            dim: 3,
            count: 3,
            batch_size: 64,
            max_chars: 600,
            overlap: 60,
        };
        VectorIndex::from_parts(vectors, texts, meta).unwrap()
    }

    #[test]
    fn test_query_matching_row_scores_one() {
        let index = unit_index();
        let results = rank(&index, &[0.0, 1.0, 0.0], 1).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 1);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results[0].text, "one");
    }

    #[test]
    fn test_descending_order() {
        let index = unit_index();
        let results = rank(&index, &[0.8, 0.6, 0.0], 3).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].index, 0);
        assert_eq!(results[1].index, 1);
        assert_eq!(results[2].index, 2);
        assert!(results[0].score >= results[1].score);
        assert!(results[1].score >= results[2].score);
    }

    #[test]
    fn test_ties_keep_original_index_order() {
        let vectors = vec![
            1.0, 0.0, //
            1.0, 0.0, //
            0.0, 1.0,
        ];
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let meta = IndexMeta {
            embed_model: None,
            dim: 2,
            count: 3,
            batch_size: 64,
            max_chars: 600,
            overlap: 60,
        };
        let index = VectorIndex::from_parts(vectors, texts, meta).unwrap();

        let results = rank(&index, &[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].index, 0);
        assert_eq!(results[1].index, 1);
    }

    #[test]
    fn test_top_k_larger_than_index() {
        let index = unit_index();
        let results = rank(&index, &[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_query_dimension_mismatch_rejected() {
        // A 2-dim query against 3-dim rows must error, not score.
        let index = unit_index();
        let result = rank(&index, &[0.0, 1.0], 1);
        assert!(matches!(result, Err(RagJudgeError::IndexCorrupt(_))));
    }
}
