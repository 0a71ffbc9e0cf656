//! Batch analysis: runs the analyzer over many emails.
//!
//! 1. `retain_complete()` drops records missing required fields
//! 2. Up to `concurrency` analyses run at once (`buffered`, input order kept)
//! 3. A failing email is reported and logged; the batch carries on

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use tracing::{error, info};

use crate::agent::{AnalysisOutcome, PhishingAnalyzer};
use crate::email::{Email, EmailSource, retain_complete};
use crate::error::{AnalysisError, IngestError};

/// Receives batch progress. All methods default to no-ops.
pub trait ProgressObserver: Send + Sync {
    fn on_start(&self, _total: usize) {}
    fn on_progress(&self, _done: usize, _total: usize, _email_id: &str) {}
    fn on_error(&self, _email_id: &str, _error: &AnalysisError) {}
    fn on_complete(&self, _summary: &BatchSummary) {}
}

/// Observer that ignores everything.
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// One email's result within a batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedEmail {
    pub email_id: String,
    pub from: String,
    pub subject: String,
    pub analyzed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: BatchItem,
}

/// Either an outcome or the error that prevented one.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Analyzed { analysis: AnalysisOutcome },
    Errored { error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Records handed to the batch.
    pub received: usize,
    /// Records dropped for missing required fields.
    pub skipped: usize,
    pub analyzed: usize,
    /// Analyses that reached a verdict flagged as phishing.
    pub phishing: usize,
    pub failed: usize,
}

/// Runs a [`PhishingAnalyzer`] over batches of emails.
pub struct BatchAnalyzer {
    analyzer: Arc<PhishingAnalyzer>,
    concurrency: usize,
    observer: Arc<dyn ProgressObserver>,
}

impl BatchAnalyzer {
    pub fn new(analyzer: Arc<PhishingAnalyzer>, concurrency: usize) -> Self {
        Self {
            analyzer,
            concurrency: concurrency.max(1),
            observer: Arc::new(NoProgress),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Fetch from `source` and analyze everything it yields.
    pub async fn run_source(
        &self,
        source: &dyn EmailSource,
    ) -> Result<(Vec<AnalyzedEmail>, BatchSummary), IngestError> {
        let emails = source.fetch().await?;
        info!(source = source.name(), count = emails.len(), "Fetched emails");
        Ok(self.analyze_all(emails).await)
    }

    /// Analyze `emails`, returning results in input order.
    pub async fn analyze_all(&self, emails: Vec<Email>) -> (Vec<AnalyzedEmail>, BatchSummary) {
        let received = emails.len();
        let emails = retain_complete(emails);
        let total = emails.len();
        self.observer.on_start(total);

        let mut summary = BatchSummary {
            received,
            skipped: received - total,
            ..BatchSummary::default()
        };

        let mut results = Vec::with_capacity(total);
        let mut analyses = stream::iter(emails)
            .map(|email| {
                let analyzer = Arc::clone(&self.analyzer);
                async move {
                    let outcome = analyzer.analyze(&email).await;
                    (email, outcome)
                }
            })
            .buffered(self.concurrency);

        while let Some((email, outcome)) = analyses.next().await {
            let result = match outcome {
                Ok(analysis) => {
                    summary.analyzed += 1;
                    if analysis.analysis().is_some_and(|a| a.is_phishing) {
                        summary.phishing += 1;
                    }
                    BatchItem::Analyzed { analysis }
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(email_id = %email.id, error = %e, "Analysis failed");
                    self.observer.on_error(&email.id, &e);
                    BatchItem::Errored {
                        error: e.to_string(),
                    }
                }
            };

            results.push(AnalyzedEmail {
                email_id: email.id.clone(),
                from: email.from,
                subject: email.subject,
                analyzed_at: Utc::now(),
                result,
            });
            self.observer.on_progress(results.len(), total, &email.id);
        }

        info!(
            received = summary.received,
            skipped = summary.skipped,
            analyzed = summary.analyzed,
            phishing = summary.phishing,
            failed = summary.failed,
            "Batch complete"
        );
        self.observer.on_complete(&summary);
        (results, summary)
    }
}
