//! Log-only mirror of a response body.
//!
//! Reads its own copy of the stream, classifies every event in diagnostic
//! mode and logs what it sees. Nothing here touches session state.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::streaming::{
    AssemblyMode, EventInterpreter, FragmentReassembler, InterpreterMode, LifecycleStage,
    StreamEvent, frames,
};

const PAYLOAD_PREVIEW: usize = 160;
const SOURCES_PREVIEW: usize = 120;
const RAW_PREVIEW: usize = 200;

/// Counts and assembled answers gathered by [`mirror`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DiagnosticsReport {
    pub frames: usize,
    pub deltas: usize,
    pub lifecycle: usize,
    pub fragments: usize,
    pub duplicates: usize,
    pub unknown: usize,
    pub raw: usize,
    /// Saw a terminal marker before the stream ended
    pub terminated: bool,
    pub error: Option<String>,
    /// Final text per stream id, in first-seen order
    pub assembled: Vec<(String, String)>,
}

/// Consume `source` and log every event. Never fails: a read error is
/// recorded in the report and ends the mirror.
pub async fn mirror<S>(source: S) -> DiagnosticsReport
where
    S: Stream<Item = Result<Bytes>> + Send,
{
    let mut report = DiagnosticsReport::default();
    let mut interpreter = EventInterpreter::new(InterpreterMode::Diagnostic);
    let mut reassembler = FragmentReassembler::new();
    let mut events = std::pin::pin!(frames(source));

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Diagnostics stream failed");
                report.error = Some(e.to_string());
                break;
            }
        };
        report.frames += 1;

        let Some(classified) = interpreter.interpret(&event) else {
            report.duplicates += 1;
            continue;
        };

        match classified {
            StreamEvent::TokenDelta(delta) => {
                report.deltas += 1;
                debug!(len = delta.len(), "DELTA");
            }
            StreamEvent::Terminal => {
                report.terminated = true;
                break;
            }
            StreamEvent::Lifecycle(lifecycle) => {
                report.lifecycle += 1;
                log_lifecycle(lifecycle.stage, &lifecycle.payload);
            }
            StreamEvent::FinalChunk {
                stream_id,
                fragment_id,
                text,
                ..
            } => {
                report.fragments += 1;
                reassembler.apply(&stream_id, fragment_id.as_deref(), &text, AssemblyMode::Chunked);
            }
            StreamEvent::FinalAtomic { stream_id, text } => {
                report.fragments += 1;
                reassembler.apply(&stream_id, None, &text, AssemblyMode::Atomic);
            }
            StreamEvent::Unknown { event_name } => {
                report.unknown += 1;
                debug!(event = ?event_name, "Unclassified event");
            }
            StreamEvent::Raw(payload) => {
                report.raw += 1;
                debug!(raw = %preview(&payload, RAW_PREVIEW), "RAW");
            }
        }
    }

    for (stream_id, text) in reassembler.assembled() {
        let shown = if text.is_empty() {
            "(empty)".to_string()
        } else {
            preview(&text, PAYLOAD_PREVIEW)
        };
        info!(
            stream_id = %stream_id,
            len = text.len(),
            text = %shown,
            "FINAL_RESPONSE"
        );
    }
    report.assembled = reassembler.assembled();

    info!(
        frames = report.frames,
        deltas = report.deltas,
        lifecycle = report.lifecycle,
        fragments = report.fragments,
        duplicates = report.duplicates,
        terminated = report.terminated,
        "Diagnostics stream closed"
    );
    report
}

fn log_lifecycle(stage: LifecycleStage, payload: &Value) {
    match stage {
        LifecycleStage::Start => info!(content = %render(payload, PAYLOAD_PREVIEW), "START"),
        LifecycleStage::Fetch => info!(content = %render(payload, PAYLOAD_PREVIEW), "FETCH"),
        LifecycleStage::Sources => {
            let field = |name: &str| {
                payload
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or("-")
                    .to_string()
            };
            let data = payload.get("data").unwrap_or(&Value::Null);
            info!(
                provider = %field("provider"),
                kind = %field("type"),
                data = %render(data, SOURCES_PREVIEW),
                "SOURCES"
            );
        }
        LifecycleStage::Metrics => info!(metrics = %render(payload, PAYLOAD_PREVIEW), "METRICS"),
    }
}

fn render(value: &Value, max: usize) -> String {
    match value {
        Value::String(s) => preview(s, max),
        other => preview(&other.to_string(), max),
    }
}

/// First `max` characters of `text`, with an ellipsis when truncated.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
