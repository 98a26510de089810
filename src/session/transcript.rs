use crate::models::{ChatMessage, Role};

/// Answer shown when a session fails.
pub const FALLBACK_ANSWER: &str = "Sorry, an error occurred while processing.";

/// Ordered chat history owned by one controller.
///
/// During a session the last message is the in-progress assistant answer;
/// only that message is ever rewritten.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    /// Index of the user message that may be edited and resubmitted
    editable_user: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, prompt: &str) {
        self.messages.push(ChatMessage::user(prompt));
    }

    /// Start an empty assistant answer.
    pub fn push_placeholder(&mut self) {
        self.messages.push(ChatMessage::assistant(""));
    }

    fn answer_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant)
    }

    /// Append to the in-progress answer; returns its new content.
    pub fn append_answer(&mut self, delta: &str) -> Option<String> {
        let answer = self.answer_mut()?;
        answer.content.push_str(delta);
        Some(answer.content.clone())
    }

    /// Replace the in-progress answer wholesale.
    pub fn set_answer(&mut self, text: &str) -> bool {
        match self.answer_mut() {
            Some(answer) => {
                answer.content = text.to_string();
                true
            }
            None => false,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Surface the failure message without touching earlier answers: an
    /// empty placeholder is filled in, otherwise a new message is added.
    pub fn push_fallback(&mut self) {
        match self.answer_mut() {
            Some(answer) if answer.content.is_empty() => {
                answer.content = FALLBACK_ANSWER.to_string();
            }
            _ => self.messages.push(ChatMessage::assistant(FALLBACK_ANSWER)),
        }
    }

    pub fn mark_last_user_editable(&mut self) {
        self.editable_user = self.messages.iter().rposition(|m| m.role == Role::User);
    }

    pub fn editable_user(&self) -> Option<usize> {
        self.editable_user
    }

    pub fn clear_editable(&mut self) {
        self.editable_user = None;
    }

    pub fn take_editable(&mut self) -> Option<usize> {
        self.editable_user.take()
    }
}

/// Bootstrap progress percentage that never moves backwards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Progress(u8);

impl Progress {
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Raise to at least `floor`; returns true if the value changed.
    pub fn raise(&mut self, floor: u8) -> bool {
        let floor = floor.min(100);
        if floor > self.0 {
            self.0 = floor;
            true
        } else {
            false
        }
    }

    pub fn complete(&mut self) -> bool {
        self.raise(100)
    }
}
