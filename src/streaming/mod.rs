pub mod envelope;
pub mod frame;
pub mod interpreter;
pub mod reassembler;
pub mod tee;

pub use envelope::{DEFAULT_STREAM_ID, Decoded, Envelope, EventTag};
pub use frame::{DONE_SENTINEL, SseFrameParser, WireEvent, frames};
pub use interpreter::{
    DedupSet, EventInterpreter, InterpreterMode, Lifecycle, LifecycleStage, StreamEvent,
};
pub use reassembler::{AssemblyMode, FragmentReassembler, StreamAccumulator};
pub use tee::{TeeBranch, tee};
