//! Content pattern detection over body and subject.
//!
//! Each family is a set of case-insensitive rules. A family is flagged when
//! any of its rules matches; the rule reasons that fired are reported in
//! `matches` so the model can cite them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static DEFAULT_PATTERNS: LazyLock<ContentPatterns> = LazyLock::new(ContentPatterns::default_rules);

/// Signal family a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternFamily {
    Urgency,
    Authority,
    Personal,
    Suspicious,
    Grammar,
}

impl fmt::Display for PatternFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Urgency => "urgency",
            Self::Authority => "authority",
            Self::Personal => "personal",
            Self::Suspicious => "suspicious",
            Self::Grammar => "grammar",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct PatternRule {
    pub family: PatternFamily,
    pub regex: Regex,
    pub reason: String,
}

/// Result of `contentPattern`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReport {
    pub urgency: bool,
    pub authority: bool,
    pub personal: bool,
    pub suspicious: bool,
    pub grammar: bool,
    /// Family name → reasons of the rules that fired.
    pub matches: BTreeMap<String, Vec<String>>,
}

impl ContentReport {
    fn flag(&mut self, family: PatternFamily, reason: &str) {
        match family {
            PatternFamily::Urgency => self.urgency = true,
            PatternFamily::Authority => self.authority = true,
            PatternFamily::Personal => self.personal = true,
            PatternFamily::Suspicious => self.suspicious = true,
            PatternFamily::Grammar => self.grammar = true,
        }
        let reasons = self.matches.entry(family.to_string()).or_default();
        if !reasons.iter().any(|r| r == reason) {
            reasons.push(reason.to_string());
        }
    }
}

pub struct ContentPatterns {
    rules: Vec<PatternRule>,
}

impl ContentPatterns {
    pub fn default_rules() -> Self {
        use PatternFamily::*;

        let mut engine = Self::empty();
        let table: &[(PatternFamily, &str, &str)] = &[
            (Urgency, r"urgent", "urgent"),
            (Urgency, r"immediately", "immediately"),
            (Urgency, r"asap", "asap"),
            (Urgency, r"last\s+chance", "last chance"),
            (Urgency, r"expir", "expiring"),
            (Urgency, r"limited\s+time", "limited time"),
            (Urgency, r"act\s+now", "act now"),
            (Authority, r"ceo", "ceo"),
            (Authority, r"director", "director"),
            (Authority, r"manager", "manager"),
            (Authority, r"official", "official"),
            (Authority, r"security", "security"),
            (Authority, r"compliance", "compliance"),
            (Authority, r"legal", "legal"),
            (Personal, r"password", "password"),
            (Personal, r"account", "account"),
            (Personal, r"verify", "verify"),
            (Personal, r"confirm", "confirm"),
            (Personal, r"social\s+security", "social security"),
            (Personal, r"credit\s+card", "credit card"),
            (Personal, r"bank\s+account", "bank account"),
            (Suspicious, r"(click|tap)\s+here", "Generic call-to-action"),
            (Suspicious, r"(verify|confirm)\s+your\s+account", "Account verification request"),
            (Suspicious, r"(suspicious|unusual)\s+activity", "Suspicious activity claim"),
            (Suspicious, r"(limited|exclusive)\s+offer", "Limited time offer"),
            (Suspicious, r"free|gift|prize", "Free offer or prize"),
            (Grammar, r"dear\s+valued\s+customer", "Generic greeting"),
            (Grammar, r"kindly\s+verify", "Unnatural language"),
            (Grammar, r"urgent\s+response\s+required", "Overly formal urgency"),
        ];

        for (family, pattern, reason) in table {
            // Table patterns are literals; a bad one is a programming error.
            engine
                .add_rule(*family, pattern, reason)
                .unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"));
        }
        engine
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a rule. The pattern is compiled case-insensitively.
    pub fn add_rule(
        &mut self,
        family: PatternFamily,
        pattern: &str,
        reason: &str,
    ) -> Result<(), regex::Error> {
        self.rules.push(PatternRule {
            family,
            regex: Regex::new(&format!("(?i){pattern}"))?,
            reason: reason.into(),
        });
        Ok(())
    }

    pub fn evaluate(&self, body: &str, subject: &str) -> ContentReport {
        let mut report = ContentReport::default();
        for rule in &self.rules {
            if rule.regex.is_match(body) || rule.regex.is_match(subject) {
                debug!(family = %rule.family, reason = %rule.reason, "Content rule matched");
                report.flag(rule.family, &rule.reason);
            }
        }
        report
    }
}

/// Evaluate the built-in rule set.
pub fn detect_patterns(body: &str, subject: &str) -> ContentReport {
    DEFAULT_PATTERNS.evaluate(body, subject)
}
