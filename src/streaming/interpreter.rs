use serde_json::Value;
use std::collections::HashSet;

use super::envelope::{Decoded, Envelope, EventTag};
use super::frame::{DONE_SENTINEL, WireEvent};

/// Which consumer an interpreter serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterMode {
    /// Drives the visible answer
    Primary,
    /// Mirrors the stream for logs; additionally recognizes metrics events
    Diagnostic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Start,
    Fetch,
    Sources,
    Metrics,
}

/// A progress report from upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Lifecycle {
    pub stage: LifecycleStage,
    /// Raw `content` (or `metrics`) payload; `Null` when absent
    pub payload: Value,
}

impl Lifecycle {
    /// Short human-readable status for this stage, if any.
    pub fn status_line(&self) -> Option<String> {
        match self.stage {
            LifecycleStage::Start => self
                .payload
                .as_str()
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            LifecycleStage::Fetch => self
                .payload
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| format!("Fetching: {}", s)),
            LifecycleStage::Sources => match self.payload.as_object() {
                Some(src) => {
                    let provider = src
                        .get("provider")
                        .or_else(|| src.get("source"))
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .unwrap_or("sources");
                    match src.get("type").and_then(Value::as_str) {
                        Some(kind) if !kind.is_empty() => {
                            Some(format!("Sources: {} {}", provider, kind))
                        }
                        _ => Some(format!("Sources: {}", provider)),
                    }
                }
                None => Some("Gathering sources…".to_string()),
            },
            LifecycleStage::Metrics => None,
        }
    }

    /// Minimum progress percentage this stage implies during bootstrap.
    pub fn progress_floor(&self) -> Option<u8> {
        match self.stage {
            LifecycleStage::Start => Some(10),
            LifecycleStage::Fetch => Some(35),
            LifecycleStage::Sources => Some(60),
            LifecycleStage::Metrics => None,
        }
    }
}

/// Classification of one wire event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Text to append to the in-progress answer
    TokenDelta(String),
    /// End of the response
    Terminal,
    Lifecycle(Lifecycle),
    /// One fragment of a chunked final response. `fragment_id` is `None`
    /// when the envelope has no id or no chunked content type; the
    /// reassembler numbers it.
    FinalChunk {
        stream_id: String,
        fragment_id: Option<String>,
        text: String,
        is_complete: bool,
    },
    /// A whole final response that replaces anything assembled so far
    FinalAtomic { stream_id: String, text: String },
    /// Valid envelope with no visible meaning
    Unknown { event_name: Option<String> },
    /// Payload that did not decode as JSON
    Raw(String),
}

/// Ids of every envelope seen in the current session.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`; returns false if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// Turns wire events into [`StreamEvent`]s, dropping re-delivered envelopes.
pub struct EventInterpreter {
    mode: InterpreterMode,
    dedup: DedupSet,
}

impl EventInterpreter {
    pub fn new(mode: InterpreterMode) -> Self {
        Self {
            mode,
            dedup: DedupSet::new(),
        }
    }

    /// Forget every id seen; called when a new session starts.
    pub fn reset(&mut self) {
        self.dedup.clear();
    }

    pub fn seen_ids(&self) -> usize {
        self.dedup.len()
    }

    /// Classify one event. Returns `None` for an exact re-delivery.
    pub fn interpret(&mut self, event: &WireEvent) -> Option<StreamEvent> {
        if event.data == DONE_SENTINEL {
            return Some(StreamEvent::Terminal);
        }

        let envelope = match Envelope::decode(&event.data) {
            Decoded::Envelope(envelope) => envelope,
            Decoded::Unrecognized(_) => {
                if event.event.as_deref() == Some("done") {
                    return Some(StreamEvent::Terminal);
                }
                return Some(StreamEvent::Unknown {
                    event_name: event.event.clone(),
                });
            }
            Decoded::Malformed(e) => {
                if event.event.as_deref() == Some("done") {
                    return Some(StreamEvent::Terminal);
                }
                tracing::debug!(error = %e, "Payload is not an envelope");
                return Some(StreamEvent::Raw(event.data.clone()));
            }
        };

        if let Some(id) = envelope.id.as_deref()
            && !self.dedup.insert(id)
        {
            tracing::debug!(id, "Skipping duplicate envelope");
            return None;
        }

        Some(self.classify(&envelope, event.event.as_deref()))
    }

    fn classify(&self, envelope: &Envelope, wire_event: Option<&str>) -> StreamEvent {
        if let Some(delta) = envelope.delta_content() {
            return StreamEvent::TokenDelta(delta.to_string());
        }

        let event_name = envelope.event_name.as_deref().or(wire_event);
        let tag = event_name.and_then(EventTag::parse);

        if wire_event == Some("done")
            || envelope.event_name.as_deref() == Some("done")
            || envelope.content_type.as_deref() == Some("atomic.done")
        {
            return StreamEvent::Terminal;
        }

        let diagnostic = self.mode == InterpreterMode::Diagnostic;
        let stage = match tag {
            Some(EventTag::Start) => Some(LifecycleStage::Start),
            Some(EventTag::Fetch) => Some(LifecycleStage::Fetch),
            Some(EventTag::Sources) => Some(LifecycleStage::Sources),
            Some(EventTag::Metrics) if diagnostic => Some(LifecycleStage::Metrics),
            _ if diagnostic && envelope.content_type_starts_with("metrics") => {
                Some(LifecycleStage::Metrics)
            }
            _ => None,
        };

        if let Some(stage) = stage {
            let payload = match stage {
                LifecycleStage::Metrics => envelope
                    .content
                    .clone()
                    .or_else(|| envelope.metrics.clone())
                    .unwrap_or(Value::Null),
                _ => envelope.content.clone().unwrap_or(Value::Null),
            };
            return StreamEvent::Lifecycle(Lifecycle { stage, payload });
        }

        if tag == Some(EventTag::FinalResponse)
            && let Some(text) = envelope.content_str()
        {
            let stream_id = envelope.stream_id().to_string();

            if envelope.content_type_starts_with("atomic") {
                return StreamEvent::FinalAtomic {
                    stream_id,
                    text: text.to_string(),
                };
            }

            // Without a chunked content type the envelope id is not a fragment id
            let fragment_id = envelope
                .id
                .clone()
                .filter(|_| envelope.content_type_starts_with("chunked"));

            return StreamEvent::FinalChunk {
                stream_id,
                fragment_id,
                text: text.to_string(),
                is_complete: envelope.is_complete(),
            };
        }

        if let Some(text) = envelope.text_str() {
            return StreamEvent::TokenDelta(text.to_string());
        }

        StreamEvent::Unknown {
            event_name: event_name.map(str::to_string),
        }
    }
}
