//! Orchestration loop state machine and transcript.

use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;

/// State of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Waiting on the reasoning service or dispatching its calls.
    Running,
    /// A terminal answer was produced.
    Done,
    /// Budget exhausted or the reasoning service failed.
    Failed,
}

impl LoopState {
    pub fn can_transition_to(&self, target: LoopState) -> bool {
        use LoopState::*;

        matches!(
            (self, target),
            (Running, Running) | (Running, Done) | (Running, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Append-only conversation log; the sole input to each reasoning call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new(initial: Vec<ChatMessage>) -> Self {
        Self { messages: initial }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
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
}
