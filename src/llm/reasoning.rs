//! Reasoning layer: wraps an LLM provider with tool calling support.
//!
//! The orchestration loop only ever asks one question: given the transcript
//! so far and the capability signatures, what next? This module turns the
//! provider reply into that answer.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{ChatMessage, LlmProvider, ToolCall, ToolCompletionRequest, ToolDefinition};

/// Tokens spent across one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// What the model asked for on one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Free text and no calls.
    Text(String),
    /// Capability calls, possibly with text alongside.
    ToolCalls {
        tool_calls: Vec<ToolCall>,
        content: Option<String>,
    },
    /// Neither text nor calls.
    Empty,
}

/// One step's reply and what it cost.
#[derive(Debug, Clone)]
pub struct Step {
    pub reply: Reply,
    pub usage: TokenUsage,
}

/// Reasoning layer that wraps an LLM provider.
#[derive(Clone)]
pub struct Reasoning {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl Reasoning {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Ask the model for its next step. Blank text counts as no text.
    pub async fn next_step(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Step, LlmError> {
        let mut request = ToolCompletionRequest::new(messages.to_vec(), tools.to_vec())
            .with_temperature(self.temperature);
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self.llm.complete_with_tools(request).await?;
        let usage = TokenUsage {
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        };
        let content = response.content.filter(|c| !c.trim().is_empty());

        let reply = match (response.tool_calls.is_empty(), content) {
            (false, content) => Reply::ToolCalls {
                tool_calls: response.tool_calls,
                content,
            },
            (true, Some(text)) => Reply::Text(text),
            (true, None) => Reply::Empty,
        };
        Ok(Step { reply, usage })
    }
}
