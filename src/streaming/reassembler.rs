use std::collections::HashMap;

/// How a final response is delivered for one stream id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyMode {
    /// Ordered fragments keyed by opaque ids
    Chunked,
    /// One value that replaces everything before it
    Atomic,
}

/// Fragments received for one stream id.
#[derive(Debug, Clone)]
pub struct StreamAccumulator {
    ids: Vec<String>,
    chunks: HashMap<String, String>,
    mode: AssemblyMode,
    atomic: Option<String>,
}

impl StreamAccumulator {
    pub fn chunked() -> Self {
        Self {
            ids: Vec::new(),
            chunks: HashMap::new(),
            mode: AssemblyMode::Chunked,
            atomic: None,
        }
    }

    pub fn atomic(text: &str) -> Self {
        Self {
            ids: Vec::new(),
            chunks: HashMap::new(),
            mode: AssemblyMode::Atomic,
            atomic: Some(text.to_string()),
        }
    }

    pub fn mode(&self) -> AssemblyMode {
        self.mode
    }

    /// Number of fragments recorded
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.atomic.is_none()
    }

    pub fn contains(&self, fragment_id: &str) -> bool {
        self.chunks.contains_key(fragment_id)
    }

    /// Record a fragment; returns false if the id was already present.
    pub fn push(&mut self, fragment_id: String, text: &str) -> bool {
        if self.contains(&fragment_id) {
            return false;
        }
        self.chunks.insert(fragment_id.clone(), text.to_string());
        self.ids.push(fragment_id);
        true
    }

    /// Fragments concatenated in first-seen order, or the atomic value.
    pub fn text(&self) -> String {
        match self.mode {
            AssemblyMode::Atomic => self.atomic.clone().unwrap_or_default(),
            AssemblyMode::Chunked => self
                .ids
                .iter()
                .filter_map(|id| self.chunks.get(id))
                .map(String::as_str)
                .collect(),
        }
    }
}

/// Per-stream-id assembly of final responses.
///
/// Fragment ids are opaque: text is ordered by arrival, never by id value.
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    /// Stream ids in first-seen order
    order: Vec<String>,
    streams: HashMap<String, StreamAccumulator>,
    active: Option<String>,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one update and return the full text for `stream_id`.
    ///
    /// In chunked mode a missing `fragment_id` is replaced by the current
    /// fragment count, zero-padded to eight digits. Moving to a different
    /// stream id starts a fresh accumulator for it; an atomic update always
    /// replaces the accumulator wholesale.
    pub fn apply(
        &mut self,
        stream_id: &str,
        fragment_id: Option<&str>,
        text: &str,
        mode: AssemblyMode,
    ) -> String {
        let switched = self.active.as_deref() != Some(stream_id);
        if switched {
            tracing::debug!(from = ?self.active, to = stream_id, "Switching stream id");
            self.active = Some(stream_id.to_string());
        }
        if !self.streams.contains_key(stream_id) {
            self.order.push(stream_id.to_string());
        }

        match mode {
            AssemblyMode::Atomic => {
                self.streams
                    .insert(stream_id.to_string(), StreamAccumulator::atomic(text));
                text.to_string()
            }
            AssemblyMode::Chunked => {
                let acc = self
                    .streams
                    .entry(stream_id.to_string())
                    .or_insert_with(StreamAccumulator::chunked);

                if switched || acc.mode() == AssemblyMode::Atomic {
                    *acc = StreamAccumulator::chunked();
                }

                let fragment_id = fragment_id
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{:08}", acc.len()));

                if !acc.push(fragment_id, text) {
                    tracing::debug!(stream_id, "Fragment already applied");
                }

                acc.text()
            }
        }
    }

    /// Current full text for `stream_id`, if anything was received for it.
    pub fn text(&self, stream_id: &str) -> Option<String> {
        self.streams.get(stream_id).map(StreamAccumulator::text)
    }

    pub fn active_stream(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn get(&self, stream_id: &str) -> Option<&StreamAccumulator> {
        self.streams.get(stream_id)
    }

    /// Every stream's text in first-seen order.
    pub fn assembled(&self) -> Vec<(String, String)> {
        self.order
            .iter()
            .filter_map(|sid| self.streams.get(sid).map(|acc| (sid.clone(), acc.text())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn reset(&mut self) {
        self.order.clear();
        self.streams.clear();
        self.active = None;
    }
}
