//! The closed set of capabilities the model may call.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::warn;

use crate::email::Headers;
use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::tools::builtin::link::LinkReport;

pub const HEADER_ANALYSIS: &str = "headerAnalysis";
pub const DOMAIN_REPUTATION: &str = "domainReputation";
pub const CONTENT_PATTERN: &str = "contentPattern";
pub const LINK_REPUTATION: &str = "linkReputation";
pub const SCORE_EMAIL: &str = "scoreEmail";
pub const FINAL_ANSWER: &str = "finalAnswer";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HeaderArgs {
    #[serde(default)]
    pub headers: Option<Headers>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DomainArgs {
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContentArgs {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinkArgs {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub urls: Option<Vec<String>>,
}

impl LinkArgs {
    /// URLs named by the call, `url` first. Empty means "all links".
    pub fn requested(&self) -> Vec<String> {
        self.url
            .iter()
            .chain(self.urls.iter().flatten())
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect()
    }
}

/// A parsed capability invocation.
///
/// `scoreEmail` carries no arguments: it always scores the accumulated
/// results, whatever the model passed.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability {
    HeaderAnalysis(HeaderArgs),
    DomainReputation(DomainArgs),
    ContentPattern(ContentArgs),
    LinkReputation(LinkArgs),
    ScoreEmail,
    FinalAnswer(Value),
}

impl Capability {
    /// Resolve a call by name. Unknown names are `ToolError::NotFound`;
    /// malformed arguments degrade to the capability's defaults.
    pub fn from_call(name: &str, arguments: Value) -> Result<Self, ToolError> {
        let capability = match name {
            HEADER_ANALYSIS => Self::HeaderAnalysis(args_or_default(name, arguments)),
            DOMAIN_REPUTATION => Self::DomainReputation(args_or_default(name, arguments)),
            CONTENT_PATTERN => Self::ContentPattern(args_or_default(name, arguments)),
            LINK_REPUTATION => Self::LinkReputation(args_or_default(name, arguments)),
            SCORE_EMAIL => Self::ScoreEmail,
            FINAL_ANSWER => Self::FinalAnswer(if arguments.is_object() {
                arguments
            } else {
                json!({})
            }),
            other => {
                return Err(ToolError::NotFound {
                    name: other.to_string(),
                });
            }
        };
        Ok(capability)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::HeaderAnalysis(_) => HEADER_ANALYSIS,
            Self::DomainReputation(_) => DOMAIN_REPUTATION,
            Self::ContentPattern(_) => CONTENT_PATTERN,
            Self::LinkReputation(_) => LINK_REPUTATION,
            Self::ScoreEmail => SCORE_EMAIL,
            Self::FinalAnswer(_) => FINAL_ANSWER,
        }
    }

    /// Whether this call ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalAnswer(_))
    }
}

fn args_or_default<T: DeserializeOwned + Default>(name: &str, arguments: Value) -> T {
    if arguments.is_null() {
        return T::default();
    }
    serde_json::from_value(arguments).unwrap_or_else(|e| {
        warn!(capability = name, error = %e, "Malformed capability arguments, using defaults");
        T::default()
    })
}

/// What a dispatched capability produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityOutput {
    /// Stored under the capability name and returned to the model.
    pub value: Value,
    /// Per-URL reports, only for `linkReputation`.
    pub links: Vec<LinkReport>,
}

impl CapabilityOutput {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            links: Vec::new(),
        }
    }
}

/// Signatures advertised to the model.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: HEADER_ANALYSIS.into(),
            description: "Analyze email headers for spoofing, SPF/DKIM/DMARC, and suspicious patterns."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "headers": {
                        "type": "object",
                        "description": "Email headers as key-value pairs"
                    }
                }
            }),
        },
        ToolDefinition {
            name: DOMAIN_REPUTATION.into(),
            description: "Check domain reputation, age, blacklist status, and similarity to known brands."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "domain": { "type": "string", "description": "Domain to check" }
                },
                "required": ["domain"]
            }),
        },
        ToolDefinition {
            name: CONTENT_PATTERN.into(),
            description: "Detect urgency, authority, personal info requests, unnatural grammar, and suspicious phrases in the email body and subject."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "body": { "type": "string", "description": "Email body" },
                    "subject": { "type": "string", "description": "Email subject" }
                },
                "required": ["body"]
            }),
        },
        ToolDefinition {
            name: LINK_REPUTATION.into(),
            description: "Check links for known phishing, SSL status, redirects, and domain age. Omit arguments to check every link in the email."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL to check" },
                    "urls": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "URLs to check"
                    }
                }
            }),
        },
        ToolDefinition {
            name: SCORE_EMAIL.into(),
            description: "Score the email for phishing risk and confidence based on tool results so far."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "toolResults": {
                        "type": "object",
                        "description": "Results from all tools used so far"
                    }
                }
            }),
        },
        ToolDefinition {
            name: FINAL_ANSWER.into(),
            description: "Provide the final phishing risk verdict and reasoning as a structured JSON."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "riskScore": { "type": "number", "description": "Phishing risk score (0-100)" },
                    "confidence": { "type": "number", "description": "Confidence (0-1)" },
                    "isPhishing": { "type": "boolean", "description": "Is this phishing?" },
                    "redFlags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Red flags found"
                    },
                    "recommendations": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Actionable recommendations"
                    },
                    "toolResults": {
                        "type": "object",
                        "description": "All tool results used in the analysis"
                    }
                },
                "required": ["riskScore", "confidence", "isPhishing", "redFlags", "recommendations"]
            }),
        },
    ]
}
