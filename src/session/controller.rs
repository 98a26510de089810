use bytes::Bytes;
use futures::StreamExt;
use futures::future::{AbortHandle, Abortable};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::flight::{GLOBAL_FLIGHT, SingleFlight};
use super::transcript::{FALLBACK_ANSWER, Progress, Transcript};
use crate::config::SessionConfig;
use crate::diagnostics;
use crate::error::Result;
use crate::ids::{IdGenerator, UlidGenerator};
use crate::models::{AssistQuery, AssistRequest, AssistSession, ChatMessage};
use crate::streaming::{
    AssemblyMode, EventInterpreter, FragmentReassembler, InterpreterMode, StreamEvent, frames, tee,
};
use crate::transport::{AssistTransport, ByteStream};

const STREAMING_STATUS: &str = "Streaming final response…";
const FINAL_RESPONSE_PROGRESS: u8 = 85;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Terminal marker or end of stream
    Normal,
    /// A chunked fragment carried `is_complete: true`
    IsComplete,
    /// An atomic final response arrived
    Atomic,
    /// Cancelled by the consumer
    Aborted,
    /// The request or the stream failed
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Normal => "normal",
            FinishReason::IsComplete => "is_complete",
            FinishReason::Atomic => "atomic",
            FinishReason::Aborted => "aborted",
            FinishReason::Error => "error",
        }
    }
}

/// Result of asking a controller to start a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// Another stream was in flight; nothing happened
    Rejected,
    Finished(FinishReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Append the prompt to the transcript as a user message
    pub render_user_message: bool,
    /// Initialization session: drives the progress indicator
    pub bootstrap: bool,
}

impl SessionOptions {
    pub fn prompt() -> Self {
        Self {
            render_user_message: true,
            bootstrap: false,
        }
    }

    pub fn bootstrap() -> Self {
        Self {
            render_user_message: false,
            bootstrap: true,
        }
    }
}

/// Consumer-facing notifications. All methods default to doing nothing.
pub trait SessionObserver: Send + Sync {
    /// The in-progress answer now reads `text` in full
    fn on_answer(&self, _text: &str) {}

    fn on_status(&self, _status: Option<&str>) {}

    fn on_progress(&self, _percent: u8) {}

    fn on_finished(&self, _reason: FinishReason) {}
}

pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

struct SessionView {
    generation: u64,
    active: bool,
    bootstrap: bool,
    transcript: Transcript,
    status: Option<String>,
    progress: Progress,
    abort: Option<AbortHandle>,
    source: Option<tokio::task::AbortHandle>,
}

enum Step {
    Continue,
    Finish(FinishReason),
}

/// Owns one request/response cycle at a time and the transcript it writes.
///
/// Every write made on behalf of a session carries that session's
/// generation; writes from a session that has already finished are dropped.
pub struct SessionController {
    transport: Arc<dyn AssistTransport>,
    flight: Arc<SingleFlight>,
    ids: Arc<dyn IdGenerator>,
    observer: Arc<dyn SessionObserver>,
    config: SessionConfig,
    identity: AssistSession,
    view: Mutex<SessionView>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn AssistTransport>, config: SessionConfig) -> Self {
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator);
        let identity = Self::new_identity(&config, ids.as_ref());

        Self {
            transport,
            flight: GLOBAL_FLIGHT.clone(),
            ids,
            observer: Arc::new(NoopObserver),
            config,
            identity,
            view: Mutex::new(SessionView {
                generation: 0,
                active: false,
                bootstrap: false,
                transcript: Transcript::new(),
                status: None,
                progress: Progress::default(),
                abort: None,
                source: None,
            }),
        }
    }

    /// Use a specific single-flight coordinator instead of the process-wide one.
    pub fn with_flight(mut self, flight: Arc<SingleFlight>) -> Self {
        self.flight = flight;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.identity = Self::new_identity(&self.config, ids.as_ref());
        self.ids = ids;
        self
    }

    fn new_identity(config: &SessionConfig, ids: &dyn IdGenerator) -> AssistSession {
        AssistSession {
            processor_id: config.processor_id.clone(),
            activity_id: ids.next_id(),
            request_id: ids.next_id(),
            interactions: Vec::new(),
        }
    }

    pub fn identity(&self) -> &AssistSession {
        &self.identity
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.view.lock().transcript.messages().to_vec()
    }

    pub fn answer(&self) -> Option<String> {
        self.view.lock().transcript.answer().map(str::to_string)
    }

    pub fn status(&self) -> Option<String> {
        self.view.lock().status.clone()
    }

    pub fn progress(&self) -> u8 {
        self.view.lock().progress.value()
    }

    pub fn is_active(&self) -> bool {
        self.view.lock().active
    }

    /// Index of the user message that may be edited and resubmitted.
    pub fn editable_user(&self) -> Option<usize> {
        self.view.lock().transcript.editable_user()
    }

    /// Send a user prompt.
    pub async fn send(&self, prompt: &str) -> InvokeOutcome {
        self.invoke(prompt, SessionOptions::prompt()).await
    }

    /// Run the initialization session, at most once per coordinator.
    pub async fn bootstrap(&self) -> InvokeOutcome {
        if !self.flight.claim_bootstrap() {
            debug!("Bootstrap already ran");
            return InvokeOutcome::Rejected;
        }
        self.invoke("", SessionOptions::bootstrap()).await
    }

    /// Resend an edited version of the prompt that was cancelled.
    pub async fn resubmit_edited(&self, prompt: &str) -> InvokeOutcome {
        if !self.config.editable_retry {
            debug!("Editable retry is disabled");
            return InvokeOutcome::Rejected;
        }

        let editable = {
            let mut view = self.view.lock();
            if view.active {
                None
            } else {
                view.transcript.take_editable()
            }
        };

        if editable.is_none() {
            debug!("No cancelled prompt to resubmit");
            return InvokeOutcome::Rejected;
        }

        self.invoke(prompt, SessionOptions::prompt()).await
    }

    /// Start a session and drive it to completion.
    ///
    /// Rejected without side effects when this controller, or any controller
    /// sharing its coordinator, already has a stream in flight.
    pub async fn invoke(&self, prompt: &str, options: SessionOptions) -> InvokeOutcome {
        let (abort, registration) = AbortHandle::new_pair();

        let Some(generation) = self.begin(prompt, options, abort) else {
            info!("Invoke ignored: stream already active");
            return InvokeOutcome::Rejected;
        };

        let body = match self.request_body(prompt) {
            Ok(body) => body,
            Err(e) => return InvokeOutcome::Finished(self.fail(generation, e)),
        };

        let reason = match Abortable::new(self.run(generation, body), registration).await {
            Ok(Ok(reason)) => reason,
            Ok(Err(e)) => return InvokeOutcome::Finished(self.fail(generation, e)),
            Err(_) => FinishReason::Aborted,
        };

        if self.finalize(generation, reason) {
            InvokeOutcome::Finished(reason)
        } else {
            InvokeOutcome::Finished(FinishReason::Aborted)
        }
    }

    /// Abort the active session. Text received so far stays in place.
    pub fn cancel(&self) -> bool {
        let (generation, abort) = {
            let mut view = self.view.lock();
            if !view.active {
                return false;
            }
            (view.generation, view.abort.take())
        };

        if let Some(abort) = abort {
            abort.abort();
        }

        self.finalize(generation, FinishReason::Aborted)
    }

    fn begin(&self, prompt: &str, options: SessionOptions, abort: AbortHandle) -> Option<u64> {
        let mut view = self.view.lock();
        if view.active || !self.flight.try_acquire() {
            return None;
        }

        view.active = true;
        view.generation += 1;
        view.bootstrap = options.bootstrap;
        view.status = None;
        view.abort = Some(abort);
        view.source = None;
        view.transcript.clear_editable();
        if options.render_user_message {
            view.transcript.push_user(prompt);
        }

        info!(
            generation = view.generation,
            prompt_len = prompt.len(),
            bootstrap = options.bootstrap,
            "Session started"
        );
        Some(view.generation)
    }

    fn request_body(&self, prompt: &str) -> Result<Bytes> {
        let request = AssistRequest {
            query: AssistQuery {
                id: self.ids.next_id(),
                prompt: prompt.to_string(),
            },
            session: self.identity.clone(),
        };
        Ok(Bytes::from(serde_json::to_vec(&request)?))
    }

    async fn run(&self, generation: u64, body: Bytes) -> Result<FinishReason> {
        let response = self.transport.send(body).await?;
        let status = response.status;
        let body = response.into_body()?;
        debug!(generation, status, transport = self.transport.name(), "Upstream accepted request");

        if self
            .update(generation, |view| view.transcript.push_placeholder())
            .is_none()
        {
            return Ok(FinishReason::Aborted);
        }

        let primary: ByteStream = if self.config.diagnostics {
            let (primary, mirror) = tee(body, self.config.tee_capacity);
            let source = primary.source_handle();
            if self
                .update(generation, |view| view.source = Some(source.clone()))
                .is_none()
            {
                source.abort();
                return Ok(FinishReason::Aborted);
            }
            tokio::spawn(diagnostics::mirror(mirror));
            Box::pin(primary)
        } else {
            body
        };

        let mut interpreter = EventInterpreter::new(InterpreterMode::Primary);
        let mut reassembler = FragmentReassembler::new();
        let mut frames = std::pin::pin!(frames(primary));

        while let Some(frame) = frames.next().await {
            let frame = frame?;
            let Some(event) = interpreter.interpret(&frame) else {
                continue;
            };

            if let Step::Finish(reason) = self.apply(generation, event, &mut reassembler) {
                return Ok(reason);
            }
        }

        debug!(generation, "Stream ended");
        Ok(FinishReason::Normal)
    }

    fn apply(
        &self,
        generation: u64,
        event: StreamEvent,
        reassembler: &mut FragmentReassembler,
    ) -> Step {
        match event {
            StreamEvent::TokenDelta(delta) => {
                match self.update(generation, |view| view.transcript.append_answer(&delta)) {
                    Some(Some(text)) => self.observer.on_answer(&text),
                    Some(None) => {}
                    None => return Step::Finish(FinishReason::Aborted),
                }
                Step::Continue
            }
            StreamEvent::Terminal => Step::Finish(FinishReason::Normal),
            StreamEvent::Lifecycle(lifecycle) => {
                let status = lifecycle.status_line();
                let floor = lifecycle.progress_floor();

                let Some(progress) = self.update(generation, |view| {
                    if let Some(status) = &status {
                        view.status = Some(status.clone());
                    }
                    match floor {
                        Some(floor) if view.bootstrap && view.progress.raise(floor) => {
                            Some(view.progress.value())
                        }
                        _ => None,
                    }
                }) else {
                    return Step::Finish(FinishReason::Aborted);
                };

                if let Some(status) = &status {
                    self.observer.on_status(Some(status));
                }
                if let Some(progress) = progress {
                    self.observer.on_progress(progress);
                }
                Step::Continue
            }
            StreamEvent::FinalChunk {
                stream_id,
                fragment_id,
                text,
                is_complete,
            } => {
                let full = reassembler.apply(
                    &stream_id,
                    fragment_id.as_deref(),
                    &text,
                    AssemblyMode::Chunked,
                );

                let Some((status, progress)) = self.update(generation, |view| {
                    let status = if view.status.as_deref().is_none_or(is_working_status) {
                        view.status = Some(STREAMING_STATUS.to_string());
                        view.status.clone()
                    } else {
                        None
                    };
                    let progress = (view.bootstrap && view.progress.raise(FINAL_RESPONSE_PROGRESS))
                        .then(|| view.progress.value());
                    view.transcript.set_answer(&full);
                    (status, progress)
                }) else {
                    return Step::Finish(FinishReason::Aborted);
                };

                if let Some(status) = &status {
                    self.observer.on_status(Some(status));
                }
                if let Some(progress) = progress {
                    self.observer.on_progress(progress);
                }
                self.observer.on_answer(&full);

                if is_complete {
                    Step::Finish(FinishReason::IsComplete)
                } else {
                    Step::Continue
                }
            }
            StreamEvent::FinalAtomic { stream_id, text } => {
                let full = reassembler.apply(&stream_id, None, &text, AssemblyMode::Atomic);
                if self
                    .update(generation, |view| view.transcript.set_answer(&full))
                    .is_none()
                {
                    return Step::Finish(FinishReason::Aborted);
                }
                self.observer.on_answer(&full);
                Step::Finish(FinishReason::Atomic)
            }
            StreamEvent::Unknown { event_name } => {
                debug!(generation, event = ?event_name, "Ignoring unclassified event");
                Step::Continue
            }
            StreamEvent::Raw(payload) => {
                debug!(generation, len = payload.len(), "Ignoring non-JSON payload");
                Step::Continue
            }
        }
    }

    /// Run `f` against the view if `generation` is still the active session.
    fn update<R>(&self, generation: u64, f: impl FnOnce(&mut SessionView) -> R) -> Option<R> {
        let mut view = self.view.lock();
        if !view.active || view.generation != generation {
            debug!(generation, "Dropping write from finished session");
            return None;
        }
        Some(f(&mut view))
    }

    fn fail(&self, generation: u64, e: crate::error::AssistError) -> FinishReason {
        error!(generation, error = %e, "Session failed");
        if self.finalize(generation, FinishReason::Error) {
            FinishReason::Error
        } else {
            FinishReason::Aborted
        }
    }

    /// Move `generation` back to idle. Returns false when that session had
    /// already finished.
    fn finalize(&self, generation: u64, reason: FinishReason) -> bool {
        let progress = {
            let mut view = self.view.lock();
            if !view.active || view.generation != generation {
                debug!(generation, reason = reason.as_str(), "Ignoring finalize of finished session");
                return false;
            }

            view.active = false;
            view.status = None;
            view.abort = None;
            if let Some(source) = view.source.take()
                && reason == FinishReason::Aborted
            {
                source.abort();
            }

            match reason {
                FinishReason::Aborted if self.config.editable_retry => {
                    view.transcript.mark_last_user_editable();
                }
                FinishReason::Error => view.transcript.push_fallback(),
                _ => {}
            }

            let progress = (view.bootstrap && view.progress.complete()).then_some(100u8);
            view.bootstrap = false;
            progress
        };

        self.flight.release();
        info!(generation, reason = reason.as_str(), "Session finished");

        if reason == FinishReason::Error {
            self.observer.on_answer(FALLBACK_ANSWER);
        }
        self.observer.on_status(None);
        if let Some(progress) = progress {
            self.observer.on_progress(progress);
        }
        self.observer.on_finished(reason);
        true
    }
}

fn is_working_status(status: &str) -> bool {
    let status = status.to_lowercase();
    status.contains("synthesizing") || status.contains("analyzing")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_labels() {
        assert_eq!(FinishReason::Normal.as_str(), "normal");
        assert_eq!(FinishReason::IsComplete.as_str(), "is_complete");
        assert_eq!(FinishReason::Atomic.as_str(), "atomic");
        assert_eq!(FinishReason::Aborted.as_str(), "aborted");
        assert_eq!(FinishReason::Error.as_str(), "error");
    }

    #[test]
    fn test_working_status_detection() {
        assert!(is_working_status("Synthesizing answer"));
        assert!(is_working_status("now ANALYZING data"));
        assert!(!is_working_status("Fetching: prices"));
    }
}
