//! RAG Judge - a retrieval-augmented-generation pipeline with automated
//! rubric scoring.
//!
//! Three interlocking stages:
//! 1. Build a flat vector index from source documents (chunk, embed,
//!    persist vectors + texts + meta).
//! 2. Answer a question from retrieved context through a chat-completion
//!    model, under a context-only prompt contract.
//! 3. Score the answer with an LLM judge that coerces unreliable model
//!    output into a strict schema, with deterministic token-overlap
//!    fallbacks, and aggregate per-row results into a report.
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_judge::{
//!     config::Config,
//!     generator::{AnswerGenerator, Generator},
//!     judge::{Judge, JudgeAgent},
//!     llm::{ChatClient, EmbeddingClient},
//!     retriever::Retriever,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let chat = ChatClient::new(config.llm.clone());
//!     let embedder = EmbeddingClient::new(config.embedding.clone());
//!
//!     // Retrieve top-K passages from a previously built index
//!     let retriever = Retriever::new(&embedder);
//!     let results = retriever
//!         .retrieve("your question", Path::new("data/index"), 3)
//!         .await?;
//!     let contexts: Vec<String> = results.into_iter().map(|r| r.text).collect();
//!
//!     // Generate an answer constrained to those contexts
//!     let generator = Generator::new(&chat);
//!     let outcome = generator.generate("your question", &contexts).await?;
//!
//!     // Judge it against the rubric
//!     let judge = JudgeAgent::new(&chat);
//!     let scored = judge
//!         .evaluate("your question", &contexts, &outcome.answer, "")
//!         .await?;
//!
//!     println!("{}: {}", scored.flat.verdict, outcome.answer);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **chunk**: overlapping fixed-size passage splitting
//! - **index**: build/persist/load the three-artifact vector index
//! - **retriever**: brute-force cosine top-K over the index
//! - **generator**: context-constrained answer generation
//! - **judge**: LLM judge with schema repair, plus a fully local scorer
//! - **harness**: batch evaluation with per-row failure isolation
//! - **trace**: best-effort observability sink

pub mod chunk;
pub mod config;
pub mod error;
pub mod generator;
pub mod harness;
pub mod index;
pub mod judge;
pub mod llm;
pub mod retriever;
pub mod trace;

// Re-export commonly used types
pub use config::Config;
pub use error::{RagJudgeError, Result};
pub use generator::{GenerationOutcome, Generator};
pub use harness::{EvaluationReport, load_dataset};
pub use index::{IndexBuilder, IngestStatus, VectorIndex};
pub use judge::{JudgeAgent, JudgeOutcome};
pub use llm::{ChatClient, EmbeddingClient};
pub use retriever::{RetrievedPassage, Retriever};
pub use trace::Tracer;
