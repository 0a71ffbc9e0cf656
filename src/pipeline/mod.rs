//! Batch pipeline.
//!
//! Emails flow through:
//! 1. `EmailSource::fetch()` (files, dumps, anything else)
//! 2. `retain_complete()`, which drops records missing required fields
//! 3. `PhishingAnalyzer::analyze()`, per email, a bounded number at a time

pub mod batch;

pub use batch::{
    AnalyzedEmail, BatchAnalyzer, BatchItem, BatchSummary, NoProgress, ProgressObserver,
};
