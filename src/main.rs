//! RAG Judge CLI
//!
//! Build a vector index, ask questions against it, and run judged batch
//! evaluations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_judge::{
    config::Config,
    generator::{AnswerGenerator, Generator},
    harness::{self, HarnessConfig, IndexContextSource},
    index::{BuildParams, IndexBuilder},
    judge::JudgeAgent,
    llm::{ChatClient, EmbeddingClient},
    retriever::Retriever,
    trace::Tracer,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;

/// RAG Judge - retrieval, generation, and judged evaluation
#[derive(Parser)]
#[command(name = "rag-judge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from a directory of text documents
    Ingest {
        /// Directory containing .txt/.md documents
        docs_dir: PathBuf,

        /// Output directory for the index artifacts
        #[arg(short, long, default_value = "data/index")]
        out_dir: PathBuf,

        /// Embedding batch size
        #[arg(long, default_value_t = 64)]
        batch_size: usize,

        /// Chunk size in characters
        #[arg(long, default_value_t = 600)]
        max_chars: i64,

        /// Chunk overlap in characters
        #[arg(long, default_value_t = 60)]
        overlap: i64,
    },

    /// Retrieve contexts and generate an answer for one question
    Ask {
        /// The question to answer
        question: String,

        /// Vector index directory
        #[arg(short, long, default_value = "data/index")]
        index_dir: PathBuf,

        /// Number of passages to retrieve
        #[arg(short = 'k', long, env = "TOP_K", default_value_t = 3)]
        top_k: usize,
    },

    /// Run a judged evaluation over a JSON dataset
    Evaluate {
        /// Path to the JSON dataset (a list of rows, or {"rows": [...]})
        data: PathBuf,

        /// Path to write the JSON report
        #[arg(short, long, default_value = "data/report.json")]
        report: PathBuf,

        /// Vector index directory
        #[arg(short, long, default_value = "data/index")]
        index_dir: PathBuf,

        /// Number of passages to retrieve per question
        #[arg(short = 'k', long, env = "TOP_K", default_value_t = 3)]
        top_k: usize,

        /// Trace name for the run
        #[arg(long, default_value = "online_evaluation")]
        trace_name: String,
    },

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            docs_dir,
            out_dir,
            batch_size,
            max_chars,
            overlap,
        } => cmd_ingest(docs_dir, out_dir, batch_size, max_chars, overlap).await,
        Commands::Ask {
            question,
            index_dir,
            top_k,
        } => cmd_ask(question, index_dir, top_k).await,
        Commands::Evaluate {
            data,
            report,
            index_dir,
            top_k,
            trace_name,
        } => cmd_evaluate(data, report, index_dir, top_k, trace_name).await,
        Commands::Test => cmd_test().await,
    }
}

async fn cmd_ingest(
    docs_dir: PathBuf,
    out_dir: PathBuf,
    batch_size: usize,
    max_chars: i64,
    overlap: i64,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate_embedding()
        .context("Invalid configuration")?;

    let embedder = EmbeddingClient::new(config.embedding);
    let params = BuildParams {
        max_chars,
        overlap,
        batch_size,
    };
    let builder = IndexBuilder::new(&embedder, params);

    let status = builder
        .build(&docs_dir, &out_dir)
        .await
        .context("Failed to build index")?;

    // Structured status even for degenerate input.
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn cmd_ask(question: String, index_dir: PathBuf, top_k: usize) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    config
        .validate_embedding()
        .context("Invalid configuration")?;

    let embedder = EmbeddingClient::new(config.embedding);
    let chat = ChatClient::new(config.llm);
    let tracer = Tracer::new(config.trace);

    let root = tracer.start(
        "playground_generate",
        json!({ "question": question, "index_dir": index_dir.display().to_string(), "top_k": top_k }),
    );

    let retriever = Retriever::new(&embedder);
    let results = retriever
        .retrieve(&question, &index_dir, top_k)
        .await
        .context("Retrieval failed")?;

    let contexts: Vec<String> = results.iter().map(|r| r.text.clone()).collect();
    let ctx_idx: Vec<usize> = results.iter().map(|r| r.index).collect();
    let ctx_preview: Vec<String> = results
        .iter()
        .map(|r| r.text.chars().take(160).collect())
        .collect();

    let generator = Generator::new(&chat);
    let start = Instant::now();
    let outcome = generator
        .generate(&question, &contexts)
        .await
        .context("Generation failed")?;
    let latency_ms = start.elapsed().as_millis() as u64;

    let trace_id = tracer
        .end(
            root,
            json!({
                "question": question,
                "contexts": contexts,
                "answer": outcome.answer,
                "usage": outcome.usage,
            }),
        )
        .await;

    let out = json!({
        "trace_id": trace_id,
        "question": question,
        "contexts_idx": ctx_idx,
        "contexts_preview": ctx_preview,
        "answer": outcome.answer,
        "usage": outcome.usage,
        "latency_ms": latency_ms,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(())
}

async fn cmd_evaluate(
    data: PathBuf,
    report_path: PathBuf,
    index_dir: PathBuf,
    top_k: usize,
    trace_name: String,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    config
        .validate_embedding()
        .context("Invalid configuration")?;

    let rows = harness::load_dataset(&data).context("Failed to load dataset")?;

    let embedder = EmbeddingClient::new(config.embedding);
    let chat = ChatClient::new(config.llm);
    let tracer = Tracer::new(config.trace);

    let contexts = IndexContextSource::new(&embedder, &index_dir);
    let generator = Generator::new(&chat);
    let judge = JudgeAgent::new(&chat);

    let harness_config = HarnessConfig { top_k, trace_name };
    let report = harness::run(&rows, &contexts, &generator, &judge, &tracer, &harness_config).await;

    if report.items.is_empty() {
        println!("[warn] No rows evaluated.");
    } else {
        println!("{}", harness::format_table(&report.items));
    }

    harness::write_report(&report, &report_path).context("Failed to write report")?;
    println!("\n[ok] Report written to {}", report_path.display());

    if let (Some(avg_faith), Some(avg_relev)) = (report.summary.avg_faith, report.summary.avg_relev)
    {
        println!(
            "[ok] {} items | avg_faith={:.2} avg_relev={:.2}",
            report.summary.count, avg_faith, avg_relev
        );
    }

    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!(
        "  API Key:   {}...",
        &config.llm.api_key[..config.llm.api_key.len().min(8)]
    );
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = ChatClient::new(config.llm);

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => {
            println!("Connection successful!");
        }
        Err(e) => {
            println!("Connection failed: {}", e);
        }
    }

    Ok(())
}
