//! Optional observability sink.
//!
//! Records start/end spans with input/output payloads against an external
//! trace service. The sink is best-effort by contract: a failure to ship
//! a span is logged and ignored, never surfaced to the pipeline.

use crate::config::TraceConfig;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Which ingestion surface the sink exposes. Resolved once at
/// construction; no per-call probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    /// The sink accepts trace-level objects with nested observations.
    Trace,
    /// Older deployments only accept flat span events.
    Span,
    /// Credentials or host missing; spans stay local.
    Unavailable,
}

/// An in-flight span.
#[derive(Debug)]
pub struct SpanHandle {
    /// Opaque trace identifier shared by the span and its children.
    pub trace_id: String,
    name: String,
    input: Value,
    started: Instant,
}

/// Best-effort trace recorder.
pub struct Tracer {
    client: Client,
    config: TraceConfig,
    mode: ClientMode,
}

impl Tracer {
    /// Build a tracer from configuration, resolving the client mode once.
    pub fn new(config: TraceConfig) -> Self {
        let mode = if config.public_key.is_empty()
            || config.secret_key.is_empty()
            || config.host.is_empty()
        {
            ClientMode::Unavailable
        } else if config.api == "span" {
            ClientMode::Span
        } else {
            ClientMode::Trace
        };

        if mode == ClientMode::Unavailable {
            debug!("trace sink not configured; trace ids stay local");
        }

        Self {
            client: Client::new(),
            config,
            mode,
        }
    }

    /// The resolved client mode.
    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    /// Open a root span. Always succeeds; the trace id is generated
    /// locally and is valid even when the sink is unavailable.
    pub fn start(&self, name: &str, input: Value) -> SpanHandle {
        SpanHandle {
            trace_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            input,
            started: Instant::now(),
        }
    }

    /// Open a child span sharing the parent's trace id.
    pub fn child(&self, parent: &SpanHandle, name: &str, input: Value) -> SpanHandle {
        SpanHandle {
            trace_id: parent.trace_id.clone(),
            name: name.to_string(),
            input,
            started: Instant::now(),
        }
    }

    /// Close a span, shipping it to the sink when one is configured.
    /// Returns the opaque trace id. Sink failures are logged and ignored.
    pub async fn end(&self, span: SpanHandle, output: Value) -> String {
        let elapsed_ms = span.started.elapsed().as_millis() as u64;
        let trace_id = span.trace_id.clone();

        let (endpoint, body) = match self.mode {
            ClientMode::Unavailable => return trace_id,
            ClientMode::Trace => (
                format!("{}/api/public/traces", self.config.host.trim_end_matches('/')),
                json!({
                    "id": &span.trace_id,
                    "name": &span.name,
                    "input": &span.input,
                    "output": output,
                    "tags": [&self.config.tag],
                    "latency_ms": elapsed_ms,
                }),
            ),
            ClientMode::Span => (
                format!("{}/api/public/spans", self.config.host.trim_end_matches('/')),
                json!({
                    "traceId": &span.trace_id,
                    "name": &span.name,
                    "input": &span.input,
                    "output": output,
                    "latency_ms": elapsed_ms,
                }),
            ),
        };

        let result = self
            .client
            .post(&endpoint)
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), span = %span.name, "trace sink rejected span");
            }
            Err(e) => {
                warn!(error = %e, span = %span.name, "failed to ship span");
            }
            Ok(_) => {}
        }

        trace_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_unavailable_without_credentials() {
        let tracer = Tracer::new(TraceConfig::default());
        assert_eq!(tracer.mode(), ClientMode::Unavailable);
    }

    #[test]
    fn test_mode_resolution() {
        let config = TraceConfig {
            public_key: "pk".to_string(),
            secret_key: "sk".to_string(),
            host: "https://trace.example.com".to_string(),
            api: String::new(),
            tag: "provider:test".to_string(),
        };
        assert_eq!(Tracer::new(config.clone()).mode(), ClientMode::Trace);

        let span_config = TraceConfig {
            api: "span".to_string(),
            ..config
        };
        assert_eq!(Tracer::new(span_config).mode(), ClientMode::Span);
    }

    #[tokio::test]
    async fn test_unavailable_tracer_still_yields_ids() {
        let tracer = Tracer::new(TraceConfig::default());
        let root = tracer.start("run", json!({"top_k": 3}));
        let child = tracer.child(&root, "retrieval", json!({}));

        assert_eq!(child.trace_id, root.trace_id);

        let root_id = root.trace_id.clone();
        let ended = tracer.end(root, json!({"items": 0})).await;
        assert_eq!(ended, root_id);
        assert!(!ended.is_empty());
    }
}
