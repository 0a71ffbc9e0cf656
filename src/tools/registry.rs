//! Capability registry: advertises signatures and dispatches calls.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::email::{Email, HeaderValue, header_lookup};
use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::scoring;
use crate::tools::builtin::{
    LinkAnalyzer, StubLinkAnalyzer, aggregate, analyze_headers, analyze_links, detect_patterns,
    domain_reputation,
};
use crate::tools::capability::{self, Capability, CapabilityOutput};
use crate::tools::store::ToolResultStore;

/// Default per-link analysis timeout.
pub const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Dispatches capability calls against one email.
///
/// Arguments the model left out (or sent malformed) are filled from the
/// email itself, so every capability produces a result.
pub struct CapabilityRegistry {
    link_analyzer: Arc<dyn LinkAnalyzer>,
    link_timeout: Duration,
}

impl CapabilityRegistry {
    pub fn new(link_analyzer: Arc<dyn LinkAnalyzer>, link_timeout: Duration) -> Self {
        Self {
            link_analyzer,
            link_timeout,
        }
    }

    /// Signatures advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        capability::definitions()
    }

    /// Run one capability. `store` is only read, by `scoreEmail`.
    pub async fn dispatch(
        &self,
        capability: &Capability,
        email: &Email,
        store: &ToolResultStore,
    ) -> Result<CapabilityOutput, ToolError> {
        let name = capability.name();
        debug!(capability = name, email_id = %email.id, "Dispatching capability");

        let output = match capability {
            Capability::HeaderAnalysis(args) => {
                let mut headers = match &args.headers {
                    Some(headers) if !headers.is_empty() => headers.clone(),
                    _ => email.headers.clone(),
                };
                if header_lookup(&headers, "from").is_none() && !email.from.trim().is_empty() {
                    headers.insert("from".into(), HeaderValue::from(email.from.as_str()));
                }
                CapabilityOutput::new(to_json(name, analyze_headers(&headers))?)
            }
            Capability::DomainReputation(args) => {
                let domain = non_blank(args.domain.as_deref())
                    .map(str::to_string)
                    .or_else(|| email.sender_domain())
                    .unwrap_or_default();
                CapabilityOutput::new(to_json(name, domain_reputation(&domain))?)
            }
            Capability::ContentPattern(args) => {
                let body = non_blank(args.body.as_deref()).unwrap_or(&email.body);
                let subject = non_blank(args.subject.as_deref()).unwrap_or(&email.subject);
                CapabilityOutput::new(to_json(name, detect_patterns(body, subject))?)
            }
            Capability::LinkReputation(args) => {
                let mut urls = args.requested();
                if urls.is_empty() {
                    urls = email.links.clone();
                }
                let reports =
                    analyze_links(Arc::clone(&self.link_analyzer), &urls, self.link_timeout).await;
                CapabilityOutput {
                    value: aggregate(&reports),
                    links: reports,
                }
            }
            Capability::ScoreEmail => CapabilityOutput::new(to_json(name, scoring::score(store))?),
            Capability::FinalAnswer(payload) => CapabilityOutput::new(payload.clone()),
        };

        Ok(output)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(Arc::new(StubLinkAnalyzer), DEFAULT_LINK_TIMEOUT)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn to_json<T: Serialize>(name: &str, value: T) -> Result<serde_json::Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::ExecutionFailed {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
