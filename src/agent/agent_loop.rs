//! Orchestration loop: drives the reasoning service through one analysis.
//!
//! Each step sends the transcript and capability signatures to the model,
//! then either dispatches the calls it asked for or takes its text as the
//! final answer. The loop ends on `finalAnswer` or free text. It fails when
//! the step budget runs out, when the model replies with nothing, or when
//! the reasoning service errors.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::Instrument;
use uuid::Uuid;

use crate::agent::assembler::{AnalysisOutcome, TerminalAnswer, assemble, partial_verdict};
use crate::agent::prompts::initial_messages;
use crate::agent::state::{LoopState, Transcript};
use crate::config::AgentConfig;
use crate::email::Email;
use crate::error::AnalysisError;
use crate::llm::{ChatMessage, LlmProvider, Reasoning, Reply, TokenUsage, ToolCall};
use crate::tools::{Capability, CapabilityRegistry, ToolResultStore};

/// Outcome of handling one requested call.
enum CallOutcome {
    /// Result merged into the store; the loop continues.
    Recorded(Value),
    /// `finalAnswer` was called with this payload.
    Terminal(Value),
    /// Unknown capability or failed dispatch; only the model sees it.
    Rejected(Value),
}

impl CallOutcome {
    fn content(&self) -> String {
        match self {
            Self::Recorded(v) | Self::Terminal(v) | Self::Rejected(v) => v.to_string(),
        }
    }
}

/// Per-run mutable state. Nothing here outlives one `analyze` call.
struct Run<'a> {
    email: &'a Email,
    state: LoopState,
    transcript: Transcript,
    store: ToolResultStore,
    terminal: Option<TerminalAnswer>,
    partial: Option<Value>,
    usage: TokenUsage,
}

impl<'a> Run<'a> {
    fn new(email: &'a Email) -> Self {
        Self {
            email,
            state: LoopState::Running,
            transcript: Transcript::new(initial_messages(email)),
            store: ToolResultStore::with_defaults(),
            terminal: None,
            partial: None,
            usage: TokenUsage::default(),
        }
    }

    fn transition(&mut self, to: LoopState) {
        if !self.state.can_transition_to(to) {
            tracing::warn!(from = %self.state, to = %to, "Ignoring invalid loop state transition");
            return;
        }
        self.state = to;
    }

    /// Assemble the last verdict-shaped text seen alongside calls, if any.
    fn partial_outcome(&self) -> Option<AnalysisOutcome> {
        let partial = self.partial.clone()?;
        Some(AnalysisOutcome::Completed(Box::new(assemble(
            &TerminalAnswer::Structured(partial),
            &self.store,
        ))))
    }
}

/// Analyzes single emails for phishing by driving the reasoning service.
///
/// Cheap to share: the registry and provider sit behind `Arc`, and each
/// call to [`analyze`](Self::analyze) owns its transcript and result store.
#[derive(Clone)]
pub struct PhishingAnalyzer {
    reasoning: Reasoning,
    registry: Arc<CapabilityRegistry>,
    max_steps: usize,
    timeout: Option<Duration>,
}

impl PhishingAnalyzer {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        registry: Arc<CapabilityRegistry>,
        config: &AgentConfig,
    ) -> Self {
        let reasoning = Reasoning::new(llm)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);
        Self {
            reasoning,
            registry,
            max_steps: config.max_steps.max(1),
            timeout: config.analysis_timeout,
        }
    }

    /// Analyze one email.
    ///
    /// Errors only when the reasoning service fails before any verdict was
    /// seen, or when the whole run exceeds the configured timeout. Running
    /// out of steps is not an error: it yields `{"error": …}`.
    pub async fn analyze(&self, email: &Email) -> Result<AnalysisOutcome, AnalysisError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("analysis", %run_id, email_id = %email.id);
        let run = self.run(email).instrument(span);

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .map_err(|_| AnalysisError::TimedOut { timeout })?,
            None => run.await,
        }
    }

    async fn run(&self, email: &Email) -> Result<AnalysisOutcome, AnalysisError> {
        tracing::info!(
            model = %self.reasoning.model_name(),
            max_steps = self.max_steps,
            links = email.links.len(),
            "Starting analysis"
        );

        let mut run = Run::new(email);
        let tools = self.registry.definitions();

        for step in 1..=self.max_steps {
            let next = self
                .reasoning
                .next_step(run.transcript.messages(), &tools)
                .await;
            let output = match next {
                Ok(output) => output,
                Err(e) => {
                    run.transition(LoopState::Failed);
                    if let Some(outcome) = run.partial_outcome() {
                        tracing::warn!(
                            step,
                            error = %e,
                            "Reasoning failed, returning partial verdict"
                        );
                        return Ok(outcome);
                    }
                    tracing::error!(step, error = %e, "Reasoning failed with no verdict");
                    return Err(e.into());
                }
            };
            run.usage.add(output.usage);

            match output.reply {
                Reply::Text(text) => {
                    tracing::debug!(step, chars = text.len(), "Model answered in free text");
                    run.transcript.push(ChatMessage::assistant(text.clone()));
                    run.terminal = Some(TerminalAnswer::FreeText(text));
                    run.transition(LoopState::Done);
                }
                Reply::ToolCalls {
                    tool_calls,
                    content,
                } => {
                    tracing::debug!(step, calls = tool_calls.len(), "Model requested capabilities");
                    if let Some(verdict) = content.as_deref().and_then(partial_verdict) {
                        run.partial = Some(verdict);
                    }
                    run.transcript.push(ChatMessage::assistant_with_tool_calls(
                        content,
                        tool_calls.clone(),
                    ));

                    for call in &tool_calls {
                        let outcome = self.execute_call(call, run.email, &mut run.store).await;
                        run.transcript.push(ChatMessage::tool_result(
                            &call.id,
                            &call.name,
                            outcome.content(),
                        ));
                        if let CallOutcome::Terminal(payload) = outcome {
                            run.terminal = Some(TerminalAnswer::Structured(payload));
                            run.transition(LoopState::Done);
                            break;
                        }
                    }
                }
                Reply::Empty => {
                    tracing::warn!(step, "Model returned neither text nor calls, stopping");
                    run.transition(LoopState::Failed);
                }
            }

            if run.state.is_terminal() {
                break;
            }
            run.transition(LoopState::Running);
        }

        let outcome = match run.terminal.take() {
            Some(answer) => AnalysisOutcome::Completed(Box::new(assemble(&answer, &run.store))),
            None => {
                if !run.state.is_terminal() {
                    tracing::warn!(max_steps = self.max_steps, "Step budget exhausted");
                    run.transition(LoopState::Failed);
                }
                match run.partial_outcome() {
                    Some(outcome) => {
                        tracing::warn!("Run failed, returning partial verdict");
                        outcome
                    }
                    None => {
                        tracing::warn!("Run failed with no verdict");
                        AnalysisOutcome::no_analysis()
                    }
                }
            }
        };

        tracing::info!(
            state = %run.state,
            turns = run.transcript.len(),
            capabilities = run.store.len(),
            input_tokens = run.usage.input_tokens,
            output_tokens = run.usage.output_tokens,
            risk_score = outcome.analysis().map(|a| a.risk_score),
            "Analysis finished"
        );
        Ok(outcome)
    }

    /// Resolve, dispatch and merge one call.
    async fn execute_call(
        &self,
        call: &ToolCall,
        email: &Email,
        store: &mut ToolResultStore,
    ) -> CallOutcome {
        let arguments = call.parsed_arguments().unwrap_or_else(|e| {
            tracing::warn!(
                tool = %call.name,
                error = %e,
                raw = %call.arguments,
                "Unparseable capability arguments, using empty arguments"
            );
            json!({})
        });

        let capability = match Capability::from_call(&call.name, arguments) {
            Ok(capability) => capability,
            Err(e) => {
                tracing::warn!(
                    tool = %call.name,
                    error = %e,
                    "Unknown capability requested, skipping"
                );
                return CallOutcome::Rejected(json!({
                    "error": format!("Unknown capability: {}", call.name)
                }));
            }
        };

        match self.registry.dispatch(&capability, email, store).await {
            Ok(output) => {
                let value = output.value.clone();
                store.merge(capability.name(), output);
                tracing::debug!(tool = capability.name(), "Capability result recorded");
                if capability.is_terminal() {
                    CallOutcome::Terminal(value)
                } else {
                    CallOutcome::Recorded(value)
                }
            }
            Err(e) => {
                tracing::warn!(tool = capability.name(), error = %e, "Capability failed");
                CallOutcome::Rejected(json!({
                    "error": format!("Tool execution failed: {e}")
                }))
            }
        }
    }
}
