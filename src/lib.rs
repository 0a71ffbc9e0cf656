//! Phish Agent: LLM-driven phishing analysis for email.

pub mod agent;
pub mod config;
pub mod email;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod scoring;
pub mod tools;

pub use agent::{Analysis, AnalysisOutcome, PhishingAnalyzer};
pub use email::Email;
