//! Session lifecycle: one request/response cycle at a time per controller,
//! at most one in flight per coordinator.

mod controller;
mod flight;
mod transcript;

pub use controller::{
    FinishReason, InvokeOutcome, NoopObserver, SessionController, SessionObserver, SessionOptions,
};
pub use flight::{GLOBAL_FLIGHT, SingleFlight};
pub use transcript::{FALLBACK_ANSWER, Progress, Transcript};
