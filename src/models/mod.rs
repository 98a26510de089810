pub mod assist;

pub use assist::{AssistQuery, AssistRequest, AssistSession, ChatMessage, Role};
