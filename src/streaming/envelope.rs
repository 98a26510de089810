use crate::error::AssistError;
use serde::Deserialize;
use serde_json::Value;

/// Stream id used when an envelope does not name one.
pub const DEFAULT_STREAM_ID: &str = "default";

/// Structured payload carried in `WireEvent::data`.
///
/// Only the fields needed to classify and assemble an answer are modelled;
/// unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    pub id: Option<String>,
    pub stream_id: Option<String>,
    pub event_name: Option<String>,
    pub content_type: Option<String>,
    pub content: Option<Value>,
    pub is_complete: Option<Value>,
    /// Legacy plain-text delta
    pub text: Option<Value>,
    pub metrics: Option<Value>,
    pub choices: Option<Vec<Choice>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    pub delta: Option<ChoiceDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceDelta {
    pub content: Option<String>,
}

/// Outcome of decoding a data payload.
#[derive(Debug)]
pub enum Decoded {
    Envelope(Box<Envelope>),
    /// Well-formed JSON that does not fit the envelope schema
    Unrecognized(Value),
    /// Not JSON at all
    Malformed(AssistError),
}

impl Envelope {
    pub fn decode(data: &str) -> Decoded {
        let value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return Decoded::Malformed(AssistError::MalformedEnvelope(e.to_string())),
        };

        if !value.is_object() {
            return Decoded::Unrecognized(value);
        }

        match Envelope::deserialize(&value) {
            Ok(envelope) => Decoded::Envelope(Box::new(envelope)),
            Err(e) => {
                tracing::debug!(error = %e, "Envelope failed schema validation");
                Decoded::Unrecognized(value)
            }
        }
    }

    /// `choices[0].delta.content` when it is a non-empty string.
    pub fn delta_content(&self) -> Option<&str> {
        self.choices
            .as_ref()?
            .first()?
            .delta
            .as_ref()?
            .content
            .as_deref()
            .filter(|s| !s.is_empty())
    }

    pub fn stream_id(&self) -> &str {
        self.stream_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STREAM_ID)
    }

    pub fn content_str(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }

    pub fn text_str(&self) -> Option<&str> {
        self.text.as_ref().and_then(Value::as_str)
    }

    /// Only a literal `true` counts.
    pub fn is_complete(&self) -> bool {
        matches!(self.is_complete, Some(Value::Bool(true)))
    }

    pub fn content_type_starts_with(&self, prefix: &str) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|t| t.starts_with(prefix))
    }
}

/// Semantic tag of an event, from `event_name` or the wire `event` field.
/// Termination is not a tag: only an exact `done` ends a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTag {
    Start,
    Fetch,
    Sources,
    Metrics,
    FinalResponse,
}

impl EventTag {
    /// Accepts both `EventName.START` and bare `START`, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        let bare = name.strip_prefix("EventName.").unwrap_or(name);
        let tags = [
            ("START", EventTag::Start),
            ("FETCH", EventTag::Fetch),
            ("SOURCES", EventTag::Sources),
            ("METRICS", EventTag::Metrics),
            ("FINAL_RESPONSE", EventTag::FinalResponse),
        ];

        tags.iter()
            .find(|(label, _)| bare.eq_ignore_ascii_case(label))
            .map(|(_, tag)| *tag)
    }
}
