//! Turns the model's terminal answer into a validated `Analysis`.
//!
//! Model output is loose: numbers arrive as strings, lists as single
//! strings, fields go missing. Every coercion here is total and falls back
//! to the scorer, so the result always carries numeric, clamped scores.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scoring::{self, ScoreReport, clamp_confidence, clamp_risk};
use crate::tools::ToolResultStore;
use crate::tools::builtin::LinkReport;
use crate::tools::capability::{FINAL_ANSWER, SCORE_EMAIL};

/// Returned when the step budget runs out with no answer at all.
pub const NO_ANALYSIS_ERROR: &str = "No analysis could be performed.";

/// Risk at or above which an unspecified verdict counts as phishing.
pub const PHISHING_THRESHOLD: f64 = 50.0;

/// What ended the run.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalAnswer {
    /// Arguments of a `finalAnswer` call.
    Structured(Value),
    /// Plain assistant text, possibly holding a JSON verdict.
    FreeText(String),
}

/// Per-URL verdict derived from link reputation results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAnalysis {
    pub url: String,
    pub is_suspicious: bool,
    pub reasons: Vec<String>,
}

impl From<&LinkReport> for LinkAnalysis {
    fn from(report: &LinkReport) -> Self {
        let mut reasons = Vec::new();
        if report.is_known_phishing {
            reasons.push("Known phishing domain".to_string());
        }
        if !report.ssl {
            reasons.push("Invalid SSL certificate".to_string());
        }
        if report.redirects > 2 {
            reasons.push("Multiple redirects".to_string());
        }
        if let Some(error) = &report.error {
            reasons.push(format!("Link could not be analyzed: {error}"));
        }
        Self {
            url: report.url.clone(),
            is_suspicious: report.is_known_phishing || !report.ssl,
            reasons,
        }
    }
}

/// The final verdict for one email.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub is_phishing: bool,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// In `[0, 100]`.
    pub risk_score: f64,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
    pub link_analysis: Vec<LinkAnalysis>,
    /// Every capability result except `finalAnswer`.
    pub tool_results: ToolResultStore,
}

/// Caller-facing result: a verdict, or `{"error": …}` when none was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Completed(Box<Analysis>),
    Failed { error: String },
}

impl AnalysisOutcome {
    pub fn no_analysis() -> Self {
        Self::Failed {
            error: NO_ANALYSIS_ERROR.to_string(),
        }
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        match self {
            Self::Completed(analysis) => Some(analysis),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Build the final `Analysis` from the terminal answer and the run's store.
pub fn assemble(answer: &TerminalAnswer, store: &ToolResultStore) -> Analysis {
    let (payload, free_text) = match answer {
        TerminalAnswer::Structured(Value::Object(map)) => (map.clone(), None),
        TerminalAnswer::Structured(_) => (Map::new(), None),
        TerminalAnswer::FreeText(text) => match extract_json_object(text) {
            Some(map) => (map, None),
            None => (Map::new(), Some(text.trim())),
        },
    };

    let fallback = last_score(store);

    let risk_score = clamp_risk(
        payload
            .get("riskScore")
            .and_then(coerce_number)
            .unwrap_or(fallback.risk_score),
    );
    let confidence = clamp_confidence(
        payload
            .get("confidence")
            .and_then(coerce_number)
            .unwrap_or(fallback.confidence),
    );
    let is_phishing = payload
        .get("isPhishing")
        .and_then(coerce_bool)
        .unwrap_or(risk_score >= PHISHING_THRESHOLD);

    let reasons = coerce_strings(payload.get("reasons"))
        .or_else(|| coerce_strings(payload.get("redFlags")))
        .unwrap_or_else(|| match free_text {
            Some(text) if !text.is_empty() => vec![text.to_string()],
            _ => fallback.notes.clone(),
        });
    let recommendations = coerce_strings(payload.get("recommendations")).unwrap_or_default();

    Analysis {
        is_phishing,
        confidence,
        risk_score,
        reasons,
        recommendations,
        link_analysis: link_analyses(store.link_reports()),
        tool_results: store.without(FINAL_ANSWER),
    }
}

/// The last `scoreEmail` result, or a fresh score if none is usable.
fn last_score(store: &ToolResultStore) -> ScoreReport {
    store
        .get(SCORE_EMAIL)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(|| scoring::score(store))
}

/// One entry per URL, first report wins, order preserved.
pub fn link_analyses(reports: &[LinkReport]) -> Vec<LinkAnalysis> {
    let mut seen = HashSet::new();
    reports
        .iter()
        .filter(|r| seen.insert(r.url.clone()))
        .map(LinkAnalysis::from)
        .collect()
}

/// `true`/`false`, or the same words as a string (trimmed, any case).
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// A finite number, or a string holding one.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// A list of strings. A lone scalar becomes a one-element list and
/// non-string items are stringified. Absent or null gives `None`.
pub fn coerce_strings(value: Option<&Value>) -> Option<Vec<String>> {
    match value? {
        Value::Null => None,
        Value::Array(items) => Some(
            items
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        Value::String(s) if s.trim().is_empty() => Some(Vec::new()),
        Value::String(s) => Some(vec![s.clone()]),
        other => Some(vec![other.to_string()]),
    }
}

/// Pull a JSON object out of model text.
///
/// Accepts a bare object, a ```json fenced block, or the outermost `{…}`
/// span inside surrounding prose.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    let mut candidates: Vec<&str> = vec![trimmed];

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            candidates.push(after[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            candidates.push(after[..end].trim());
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        candidates.push(&trimmed[start..=end]);
    }

    candidates
        .into_iter()
        .filter(|c| c.starts_with('{'))
        .find_map(|c| match serde_json::from_str::<Value>(c) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
}

/// A verdict-shaped object in assistant text, if any.
pub fn partial_verdict(text: &str) -> Option<Value> {
    let map = extract_json_object(text)?;
    ["riskScore", "isPhishing", "confidence"]
        .iter()
        .any(|key| map.contains_key(*key))
        .then_some(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::capability::{DOMAIN_REPUTATION, HEADER_ANALYSIS};
    use serde_json::json;

    fn report(url: &str, phishing: bool, ssl: bool, redirects: u32) -> LinkReport {
        LinkReport {
            url: url.into(),
            is_known_phishing: phishing,
            ssl,
            redirects,
            domain_age: 1,
            error: None,
        }
    }

    #[test]
    fn coerce_bool_table() {
        assert_eq!(coerce_bool(&json!(true)), Some(true));
        assert_eq!(coerce_bool(&json!(" TRUE ")), Some(true));
        assert_eq!(coerce_bool(&json!("False")), Some(false));
        assert_eq!(coerce_bool(&json!("maybe")), None);
        assert_eq!(coerce_bool(&json!(1)), None);
        assert_eq!(coerce_bool(&Value::Null), None);
    }

    #[test]
    fn coerce_number_table() {
        assert_eq!(coerce_number(&json!(85)), Some(85.0));
        assert_eq!(coerce_number(&json!(" 0.9 ")), Some(0.9));
        assert_eq!(coerce_number(&json!("high")), None);
        assert_eq!(coerce_number(&json!("NaN")), None);
        assert_eq!(coerce_number(&json!(true)), None);
    }

    #[test]
    fn coerce_strings_table() {
        assert_eq!(coerce_strings(None), None);
        assert_eq!(coerce_strings(Some(&Value::Null)), None);
        assert_eq!(
            coerce_strings(Some(&json!("one reason"))),
            Some(vec!["one reason".to_string()])
        );
        assert_eq!(
            coerce_strings(Some(&json!(["a", 2, {"k": "v"}]))),
            Some(vec![
                "a".to_string(),
                "2".to_string(),
                r#"{"k":"v"}"#.to_string()
            ])
        );
        assert_eq!(coerce_strings(Some(&json!([]))), Some(vec![]));
    }

    #[test]
    fn string_fields_are_coerced_and_clamped() {
        let answer = TerminalAnswer::Structured(json!({
            "isPhishing": "true",
            "riskScore": "85",
            "confidence": 1.5,
            "reasons": "Spoofed sender",
            "recommendations": ["Do not click"]
        }));
        let analysis = assemble(&answer, &ToolResultStore::with_defaults());
        assert!(analysis.is_phishing);
        assert_eq!(analysis.risk_score, 85.0);
        assert_eq!(analysis.confidence, 1.0);
        assert_eq!(analysis.reasons, vec!["Spoofed sender"]);
        assert_eq!(analysis.recommendations, vec!["Do not click"]);
    }

    #[test]
    fn missing_scores_use_last_scorer_result() {
        let mut store = ToolResultStore::with_defaults();
        store.insert(
            SCORE_EMAIL,
            json!({"riskScore": 70, "confidence": 0.8, "notes": ["Poor domain reputation."]}),
        );
        let analysis = assemble(&TerminalAnswer::Structured(json!({})), &store);
        assert_eq!(analysis.risk_score, 70.0);
        assert_eq!(analysis.confidence, 0.8);
        assert!(analysis.is_phishing);
        assert_eq!(analysis.reasons, vec!["Poor domain reputation."]);
    }

    #[test]
    fn missing_scores_without_scorer_run_it() {
        let mut store = ToolResultStore::with_defaults();
        store.insert(DOMAIN_REPUTATION, json!({"reputation": "neutral"}));
        let analysis = assemble(
            &TerminalAnswer::Structured(json!({"riskScore": "unknown"})),
            &store,
        );
        // base 10 + missing auth 10 + neutral 10
        assert_eq!(analysis.risk_score, 30.0);
        assert!(!analysis.is_phishing);
    }

    #[test]
    fn red_flags_are_accepted_as_reasons() {
        let analysis = assemble(
            &TerminalAnswer::Structured(json!({"redFlags": ["Urgent tone"], "riskScore": 10})),
            &ToolResultStore::new(),
        );
        assert_eq!(analysis.reasons, vec!["Urgent tone"]);
    }

    #[test]
    fn snapshot_excludes_final_answer() {
        let mut store = ToolResultStore::with_defaults();
        store.insert(FINAL_ANSWER, json!({"riskScore": 5}));
        let analysis = assemble(&TerminalAnswer::Structured(json!({"riskScore": 5})), &store);
        assert!(!analysis.tool_results.contains(FINAL_ANSWER));
        assert!(analysis.tool_results.contains(HEADER_ANALYSIS));
    }

    #[test]
    fn links_are_deduplicated_first_wins() {
        let analyses = link_analyses(&[
            report("http://bit.ly/a", true, false, 2),
            report("https://ok.example", false, true, 0),
            report("http://bit.ly/a", false, true, 0),
        ]);
        assert_eq!(analyses.len(), 2);
        let first = &analyses[0];
        assert_eq!(first.url, "http://bit.ly/a");
        assert!(first.is_suspicious);
        assert_eq!(
            first.reasons,
            vec!["Known phishing domain", "Invalid SSL certificate"]
        );
        assert!(!analyses[1].is_suspicious);
    }

    #[test]
    fn store_links_feed_link_analysis() {
        let mut store = ToolResultStore::new();
        store.record_links([report("http://bit.ly/a", true, false, 3)]);
        let analysis = assemble(&TerminalAnswer::Structured(json!({})), &store);
        assert_eq!(analysis.link_analysis.len(), 1);
        assert!(
            analysis.link_analysis[0]
                .reasons
                .iter()
                .any(|r| r == "Multiple redirects")
        );
    }

    #[test]
    fn free_text_with_fenced_json_is_parsed() {
        let text = "Here is my verdict:\n```json\n{\"isPhishing\": false, \"riskScore\": 12, \"confidence\": 0.7}\n```";
        let analysis = assemble(
            &TerminalAnswer::FreeText(text.into()),
            &ToolResultStore::new(),
        );
        assert!(!analysis.is_phishing);
        assert_eq!(analysis.risk_score, 12.0);
        assert_eq!(analysis.confidence, 0.7);
    }

    #[test]
    fn plain_free_text_becomes_the_reason() {
        let analysis = assemble(
            &TerminalAnswer::FreeText("Looks like a routine newsletter.".into()),
            &ToolResultStore::with_defaults(),
        );
        assert_eq!(analysis.reasons, vec!["Looks like a routine newsletter."]);
        assert_eq!(analysis.risk_score, 20.0);
        assert!(!analysis.is_phishing);
    }

    #[test]
    fn extract_json_object_variants() {
        assert!(extract_json_object(r#"{"a": 1}"#).is_some());
        assert!(extract_json_object("```\n{\"a\": 1}\n```").is_some());
        assert!(extract_json_object(r#"Verdict: {"a": 1} done"#).is_some());
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("[1, 2]").is_none());
    }

    #[test]
    fn partial_verdict_requires_verdict_keys() {
        assert!(partial_verdict(r#"{"riskScore": 40}"#).is_some());
        assert!(partial_verdict(r#"{"note": "checking links"}"#).is_none());
        assert!(partial_verdict("Let me check the headers.").is_none());
    }

    #[test]
    fn outcome_serializes_untagged() {
        let json = serde_json::to_value(AnalysisOutcome::no_analysis()).unwrap();
        assert_eq!(json, json!({"error": NO_ANALYSIS_ERROR}));

        let analysis = assemble(
            &TerminalAnswer::Structured(json!({"riskScore": 90, "isPhishing": true})),
            &ToolResultStore::with_defaults(),
        );
        let json = serde_json::to_value(AnalysisOutcome::Completed(Box::new(analysis))).unwrap();
        assert_eq!(json["isPhishing"], true);
        assert_eq!(json["riskScore"], 90.0);
        assert!(json["toolResults"]["headerAnalysis"].is_object());
        assert!(json["linkAnalysis"].as_array().unwrap().is_empty());
    }
}
