//! Flat vector index: build, persist, and load.
//!
//! The index is three artifacts in one directory:
//! - `embeddings.bin` — raw little-endian f32 matrix, row-major
//!   `[count, dim]`, no header (shape comes from the metadata sidecar)
//! - `texts.json` — JSON array of passage strings, one per matrix row
//! - `meta.json` — embedding model, shape, and the chunking/batching
//!   parameters used for the build
//!
//! Rebuilding overwrites the whole artifact; there is no incremental
//! update. Row position is a passage's identity.

use crate::chunk::chunk_text;
use crate::error::{RagJudgeError, Result};
use crate::llm::EmbeddingClient;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Raw embedding matrix filename.
pub const EMBEDDINGS_FILE: &str = "embeddings.bin";
/// Passage texts sidecar filename.
pub const TEXTS_FILE: &str = "texts.json";
/// Metadata sidecar filename.
pub const META_FILE: &str = "meta.json";

/// Metadata sidecar describing the persisted matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Embedding model the passages were embedded with. Queries must use
    /// the same model or similarities are meaningless.
    #[serde(default)]
    pub embed_model: Option<String>,
    pub dim: usize,
    pub count: usize,
    pub batch_size: usize,
    pub max_chars: i64,
    pub overlap: i64,
}

/// Chunking and batching parameters for an index build.
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub max_chars: i64,
    pub overlap: i64,
    pub batch_size: usize,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            max_chars: 600,
            overlap: 60,
            batch_size: 64,
        }
    }
}

/// Structured result of an index build. Degenerate inputs produce an
/// `empty` status instead of an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStatus {
    pub status: String,
    pub indexed_chunks: usize,
    pub dim: usize,
}

impl IngestStatus {
    pub fn empty() -> Self {
        Self {
            status: "empty".to_string(),
            indexed_chunks: 0,
            dim: 0,
        }
    }

    pub fn ok(indexed_chunks: usize, dim: usize) -> Self {
        Self {
            status: "ok".to_string(),
            indexed_chunks,
            dim,
        }
    }
}

/// A loaded vector index.
///
/// Invariant: `vectors.len() == meta.count * meta.dim` and
/// `texts.len() == meta.count`; every row has unit L2 norm, so dot
/// product equals cosine similarity.
pub struct VectorIndex {
    vectors: Vec<f32>,
    texts: Vec<String>,
    meta: IndexMeta,
}

impl VectorIndex {
    /// Assemble an index from parts, checking shape consistency.
    pub fn from_parts(vectors: Vec<f32>, texts: Vec<String>, meta: IndexMeta) -> Result<Self> {
        if vectors.len() != meta.count * meta.dim {
            return Err(RagJudgeError::IndexCorrupt(format!(
                "embedding buffer holds {} floats, expected {} ({} rows x {} dims)",
                vectors.len(),
                meta.count * meta.dim,
                meta.count,
                meta.dim
            )));
        }
        if texts.len() != meta.count {
            return Err(RagJudgeError::IndexCorrupt(format!(
                "texts sidecar holds {} entries, expected {}",
                texts.len(),
                meta.count
            )));
        }
        Ok(Self {
            vectors,
            texts,
            meta,
        })
    }

    /// Load all three artifacts from a directory.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let embeddings_path = index_dir.join(EMBEDDINGS_FILE);
        let texts_path = index_dir.join(TEXTS_FILE);
        let meta_path = index_dir.join(META_FILE);

        for path in [&embeddings_path, &texts_path, &meta_path] {
            if !path.exists() {
                return Err(RagJudgeError::IndexNotFound(path.clone()));
            }
        }

        let meta: IndexMeta = serde_json::from_str(
            &fs::read_to_string(&meta_path).map_err(|e| RagJudgeError::io(&meta_path, e))?,
        )?;

        let texts: Vec<String> = serde_json::from_str(
            &fs::read_to_string(&texts_path).map_err(|e| RagJudgeError::io(&texts_path, e))?,
        )?;

        let bytes = fs::read(&embeddings_path).map_err(|e| RagJudgeError::io(&embeddings_path, e))?;
        if bytes.len() % 4 != 0 {
            return Err(RagJudgeError::IndexCorrupt(format!(
                "embedding file length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let vectors: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Self::from_parts(vectors, texts, meta)
    }

    /// Write all three artifacts to a directory, creating it if needed.
    pub fn save(&self, index_dir: &Path) -> Result<()> {
        fs::create_dir_all(index_dir).map_err(|e| RagJudgeError::io(index_dir, e))?;

        let mut bytes = Vec::with_capacity(self.vectors.len() * 4);
        for x in &self.vectors {
            bytes.extend_from_slice(&x.to_le_bytes());
        }
        let embeddings_path = index_dir.join(EMBEDDINGS_FILE);
        fs::write(&embeddings_path, &bytes).map_err(|e| RagJudgeError::io(&embeddings_path, e))?;

        let texts_path = index_dir.join(TEXTS_FILE);
        fs::write(&texts_path, serde_json::to_string_pretty(&self.texts)?)
            .map_err(|e| RagJudgeError::io(&texts_path, e))?;

        let meta_path = index_dir.join(META_FILE);
        fs::write(&meta_path, serde_json::to_string_pretty(&self.meta)?)
            .map_err(|e| RagJudgeError::io(&meta_path, e))?;

        Ok(())
    }

    /// Number of passages in the index.
    pub fn len(&self) -> usize {
        self.meta.count
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.meta.count == 0
    }

    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.meta.dim
    }

    /// Index metadata.
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// One matrix row.
    pub fn row(&self, i: usize) -> &[f32] {
        let dim = self.meta.dim;
        &self.vectors[i * dim..(i + 1) * dim]
    }

    /// The passage text at row `i`.
    pub fn text(&self, i: usize) -> &str {
        &self.texts[i]
    }
}

/// Builds a [`VectorIndex`] from a directory of plain-text documents.
pub struct IndexBuilder<'a> {
    embedder: &'a EmbeddingClient,
    params: BuildParams,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a EmbeddingClient, params: BuildParams) -> Self {
        Self { embedder, params }
    }

    /// Build the index from every `.txt`/`.md` file under `docs_dir`
    /// (sorted path order; chunk order within a document) and persist it
    /// to `out_dir`.
    ///
    /// When no documents or no non-empty chunks are found, nothing is
    /// written and an `empty` status is returned.
    pub async fn build(&self, docs_dir: &Path, out_dir: &Path) -> Result<IngestStatus> {
        if !docs_dir.is_dir() {
            return Err(RagJudgeError::InvalidCorpusPath(docs_dir.to_path_buf()));
        }

        let docs = collect_documents(docs_dir);
        if docs.is_empty() {
            warn!(dir = %docs_dir.display(), "no documents found");
            return Ok(IngestStatus::empty());
        }

        let model = self.embedder.configured_model().to_string();
        debug!(docs = docs.len(), model = %model, "starting ingest");

        let mut all_texts: Vec<String> = Vec::new();
        let mut all_vectors: Vec<f32> = Vec::new();
        let mut dim = 0usize;

        let mut batch: Vec<String> = Vec::new();
        for doc in &docs {
            // A document that fails to read contributes zero chunks
            // rather than aborting the run.
            let text = match fs::read_to_string(doc) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %doc.display(), error = %e, "skipping unreadable document");
                    continue;
                }
            };

            for chunk in chunk_text(&text, self.params.max_chars, self.params.overlap) {
                batch.push(chunk);
                if batch.len() >= self.params.batch_size {
                    self.flush_batch(&model, &mut batch, &mut all_texts, &mut all_vectors, &mut dim)
                        .await?;
                }
            }
        }

        // Final partial batch.
        if !batch.is_empty() {
            self.flush_batch(&model, &mut batch, &mut all_texts, &mut all_vectors, &mut dim)
                .await?;
        }

        if all_texts.is_empty() {
            return Ok(IngestStatus::empty());
        }

        let count = all_texts.len();
        let meta = IndexMeta {
            embed_model: Some(model),
            dim,
            count,
            batch_size: self.params.batch_size,
            max_chars: self.params.max_chars,
            overlap: self.params.overlap,
        };

        let index = VectorIndex::from_parts(all_vectors, all_texts, meta)?;
        index.save(out_dir)?;

        Ok(IngestStatus::ok(count, dim))
    }

    /// Embed the buffered batch and append vectors and texts in order.
    /// Batch N lands before batch N+1 starts, keeping row/text alignment.
    async fn flush_batch(
        &self,
        model: &str,
        batch: &mut Vec<String>,
        all_texts: &mut Vec<String>,
        all_vectors: &mut Vec<f32>,
        dim: &mut usize,
    ) -> Result<()> {
        let vectors = self.embedder.embed_batch(model, batch).await?;

        for v in vectors {
            if *dim == 0 {
                *dim = v.len();
            } else if v.len() != *dim {
                return Err(RagJudgeError::IndexCorrupt(format!(
                    "embedding dimension changed mid-build: {} then {}",
                    dim,
                    v.len()
                )));
            }
            all_vectors.extend_from_slice(&v);
        }

        all_texts.append(batch);
        debug!(total = all_texts.len(), "embedded batch");
        Ok(())
    }
}

/// Collect `.txt` and `.md` files under a directory in sorted path order.
fn collect_documents(dir: &Path) -> Vec<PathBuf> {
    let mut docs: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("txt") | Some("md")
            )
        })
        .collect();
    docs.sort();
    docs
}
