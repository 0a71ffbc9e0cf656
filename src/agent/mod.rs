//! Agent module: the orchestration loop, its state, prompts, and the
//! assembler that turns the model's last word into an `Analysis`.

pub mod agent_loop;
pub mod assembler;
pub mod prompts;
pub mod state;

pub use agent_loop::PhishingAnalyzer;
pub use assembler::{Analysis, AnalysisOutcome, LinkAnalysis, TerminalAnswer, assemble};
pub use state::{LoopState, Transcript};
