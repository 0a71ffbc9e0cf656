//! Heuristic risk scoring over accumulated capability results.
//!
//! Scoring is a pure fold over a fixed rule table. Each rule reads one
//! capability's entry, and a missing entry contributes nothing. Entries are
//! read leniently: the short keys older producers emit (`spoofing`,
//! `blacklist`) are honored, and booleans may arrive as strings, numbers
//! or non-empty lists.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolResultStore;
use crate::tools::capability::{
    CONTENT_PATTERN, DOMAIN_REPUTATION, HEADER_ANALYSIS, LINK_REPUTATION,
};

pub const BASE_RISK: f64 = 10.0;
pub const BASE_CONFIDENCE: f64 = 0.5;

/// Output of the scorer; also the stored `scoreEmail` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub risk_score: f64,
    pub confidence: f64,
    pub notes: Vec<String>,
}

struct Rule {
    risk: f64,
    confidence: f64,
    note: &'static str,
    applies: fn(&ToolResultStore) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        risk: 30.0,
        confidence: 0.2,
        note: "Header spoofing detected.",
        applies: header_spoofing,
    },
    Rule {
        risk: 10.0,
        confidence: 0.1,
        note: "Missing SPF/DKIM/DMARC.",
        applies: missing_auth,
    },
    Rule {
        risk: 30.0,
        confidence: 0.2,
        note: "Poor domain reputation.",
        applies: poor_domain,
    },
    Rule {
        risk: 10.0,
        confidence: 0.05,
        note: "Neutral domain reputation.",
        applies: neutral_domain,
    },
    Rule {
        risk: 30.0,
        confidence: 0.2,
        note: "Domain is blacklisted.",
        applies: blacklisted_domain,
    },
    Rule {
        risk: 10.0,
        confidence: 0.05,
        note: "Urgency detected in content.",
        applies: urgent_content,
    },
    Rule {
        risk: 10.0,
        confidence: 0.05,
        note: "Suspicious content patterns detected.",
        applies: suspicious_content,
    },
    Rule {
        risk: 10.0,
        confidence: 0.05,
        note: "Personal info request detected.",
        applies: personal_info_request,
    },
    Rule {
        risk: 30.0,
        confidence: 0.2,
        note: "Known phishing link detected.",
        applies: phishing_link,
    },
    Rule {
        risk: 5.0,
        confidence: 0.0,
        note: "Link does not use SSL.",
        applies: link_without_ssl,
    },
    Rule {
        risk: 5.0,
        confidence: 0.0,
        note: "Multiple redirects in link.",
        applies: link_with_redirects,
    },
];

/// Score the accumulated results. Both outputs are clamped to their ranges.
pub fn score(results: &ToolResultStore) -> ScoreReport {
    let mut risk_score = BASE_RISK;
    let mut confidence = BASE_CONFIDENCE;
    let mut notes = Vec::new();

    for rule in RULES {
        if (rule.applies)(results) {
            risk_score += rule.risk;
            confidence += rule.confidence;
            notes.push(rule.note.to_string());
        }
    }

    ScoreReport {
        risk_score: clamp_risk(risk_score),
        // Deltas are multiples of 0.05; rounding drops float drift.
        confidence: (clamp_confidence(confidence) * 100.0).round() / 100.0,
        notes,
    }
}

/// Clamp to `[0, 100]`. NaN becomes 0.
pub fn clamp_risk(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Clamp to `[0, 1]`. NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Lenient truthiness: bools, `"true"`/`"yes"`, positive numbers,
/// non-empty lists.
pub(crate) fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" | "" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|n| n > 0.0),
        Value::Array(items) => Some(!items.is_empty()),
        _ => None,
    }
}

/// The store entry for `name`, if it is an object.
fn entry<'a>(results: &'a ToolResultStore, name: &str) -> Option<&'a Value> {
    results.get(name).filter(|v| v.is_object())
}

/// First of `keys` present on `value`, read leniently.
fn flag(value: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter()
        .find_map(|key| value.get(*key).filter(|v| !v.is_null()))
        .and_then(truthy)
}

fn header_spoofing(results: &ToolResultStore) -> bool {
    entry(results, HEADER_ANALYSIS)
        .and_then(|h| flag(h, &["spoofingAttempts", "spoofing"]))
        .unwrap_or(false)
}

fn missing_auth(results: &ToolResultStore) -> bool {
    entry(results, HEADER_ANALYSIS).is_some_and(|h| {
        ["spf", "dkim", "dmarc"]
            .iter()
            .any(|key| flag(h, &[*key]) != Some(true))
    })
}

fn domain_reputation_is(results: &ToolResultStore, expected: &str) -> bool {
    entry(results, DOMAIN_REPUTATION)
        .and_then(|d| d.get("reputation"))
        .and_then(Value::as_str)
        .is_some_and(|r| r.trim().eq_ignore_ascii_case(expected))
}

fn poor_domain(results: &ToolResultStore) -> bool {
    domain_reputation_is(results, "poor")
}

fn neutral_domain(results: &ToolResultStore) -> bool {
    domain_reputation_is(results, "neutral")
}

fn blacklisted_domain(results: &ToolResultStore) -> bool {
    let Some(domain) = entry(results, DOMAIN_REPUTATION) else {
        return false;
    };
    let status = ["blacklistStatus", "blacklist"]
        .iter()
        .find_map(|key| domain.get(*key));
    match status {
        Some(Value::String(s))
            if matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "malicious" | "blacklisted" | "listed"
            ) =>
        {
            true
        }
        Some(v) => truthy(v).unwrap_or(false),
        None => false,
    }
}

fn content_flag(results: &ToolResultStore, keys: &[&str]) -> bool {
    entry(results, CONTENT_PATTERN)
        .and_then(|c| flag(c, keys))
        .unwrap_or(false)
}

fn urgent_content(results: &ToolResultStore) -> bool {
    content_flag(results, &["urgency", "urgencyLevel"])
}

fn suspicious_content(results: &ToolResultStore) -> bool {
    content_flag(results, &["suspicious", "suspiciousPatterns"])
}

fn personal_info_request(results: &ToolResultStore) -> bool {
    content_flag(results, &["personal", "personalInfoRequests"])
}

/// Link entries to inspect: the stored aggregate, or each item if a list
/// was stored.
fn link_entries(results: &ToolResultStore) -> Vec<&Value> {
    match results.get(LINK_REPUTATION) {
        Some(Value::Array(items)) => items.iter().filter(|v| v.is_object()).collect(),
        Some(v @ Value::Object(_)) => vec![v],
        _ => Vec::new(),
    }
}

fn phishing_link(results: &ToolResultStore) -> bool {
    link_entries(results)
        .into_iter()
        .any(|l| flag(l, &["isKnownPhishing"]) == Some(true))
}

fn link_without_ssl(results: &ToolResultStore) -> bool {
    link_entries(results)
        .into_iter()
        .any(|l| flag(l, &["ssl"]) != Some(true))
}

fn link_with_redirects(results: &ToolResultStore) -> bool {
    link_entries(results).into_iter().any(|l| {
        l.get("redirects")
            .and_then(|r| r.as_f64().or_else(|| r.as_str()?.trim().parse().ok()))
            .is_some_and(|r| r > 1.0)
    })
}
