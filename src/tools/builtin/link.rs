//! Link reputation with per-link isolation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::tools::capability::LINK_REPUTATION;

/// URL shorteners treated as known phishing carriers.
const SHORTENERS: &[&str] = &["bit.ly", "tinyurl"];

/// Reputation of a single URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReport {
    pub url: String,
    pub is_known_phishing: bool,
    pub ssl: bool,
    pub redirects: u32,
    /// Domain age in years.
    pub domain_age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LinkReport {
    /// Worst-case report used when a link could not be analyzed.
    pub fn conservative(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_known_phishing: true,
            ssl: false,
            redirects: 0,
            domain_age: 0,
            error: Some(error.into()),
        }
    }
}

/// Looks up a single URL.
#[async_trait]
pub trait LinkAnalyzer: Send + Sync {
    async fn analyze(&self, url: &str) -> Result<LinkReport, ToolError>;
}

/// Deterministic rules, no network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubLinkAnalyzer;

#[async_trait]
impl LinkAnalyzer for StubLinkAnalyzer {
    async fn analyze(&self, url: &str) -> Result<LinkReport, ToolError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ToolError::InvalidParameters {
                name: LINK_REPUTATION.into(),
                reason: "empty url".into(),
            });
        }

        let report = if SHORTENERS.iter().any(|s| url.contains(s)) {
            LinkReport {
                url: url.into(),
                is_known_phishing: true,
                ssl: false,
                redirects: 2,
                domain_age: 0,
                error: None,
            }
        } else if url.starts_with("https://") {
            LinkReport {
                url: url.into(),
                is_known_phishing: false,
                ssl: true,
                redirects: 0,
                domain_age: 5,
                error: None,
            }
        } else {
            LinkReport {
                url: url.into(),
                is_known_phishing: false,
                ssl: false,
                redirects: 0,
                domain_age: 1,
                error: None,
            }
        };
        Ok(report)
    }
}

/// Analyze each distinct URL in its own task.
///
/// A link that errors, panics, or exceeds `timeout` gets
/// [`LinkReport::conservative`]; the others are unaffected. Output follows
/// first-appearance order of the input.
pub async fn analyze_links(
    analyzer: Arc<dyn LinkAnalyzer>,
    urls: &[String],
    timeout: Duration,
) -> Vec<LinkReport> {
    let mut distinct: Vec<String> = Vec::new();
    for url in urls {
        if !distinct.contains(url) {
            distinct.push(url.clone());
        }
    }

    let handles = distinct.iter().cloned().map(|url| {
        let analyzer = Arc::clone(&analyzer);
        tokio::spawn(async move { tokio::time::timeout(timeout, analyzer.analyze(&url)).await })
    });

    join_all(handles)
        .await
        .into_iter()
        .zip(distinct)
        .map(|(outcome, url)| {
            let failure = match outcome {
                Ok(Ok(Ok(report))) => return report,
                Ok(Ok(Err(e))) => e.to_string(),
                Ok(Err(_)) => ToolError::Timeout {
                    name: LINK_REPUTATION.into(),
                    timeout,
                }
                .to_string(),
                Err(join) => format!("link analysis aborted: {join}"),
            };
            warn!(url = %url, error = %failure, "Link analysis failed, using conservative result");
            LinkReport::conservative(url, failure)
        })
        .collect()
}

/// Combine per-URL reports into the stored `linkReputation` entry.
///
/// Phishing if any link is, SSL only if all are, worst-case redirects and
/// youngest domain. Per-URL entries are kept under `links`.
pub fn aggregate(reports: &[LinkReport]) -> Value {
    let is_known_phishing = reports.iter().any(|r| r.is_known_phishing);
    let ssl = reports.iter().all(|r| r.ssl);
    let redirects = reports.iter().map(|r| r.redirects).max().unwrap_or(0);
    let domain_age = reports.iter().map(|r| r.domain_age).min().unwrap_or(0);
    debug!(count = reports.len(), is_known_phishing, ssl, "Aggregated link reports");

    json!({
        "isKnownPhishing": is_known_phishing,
        "ssl": ssl,
        "redirects": redirects,
        "domainAge": domain_age,
        "links": reports,
    })
}
