//! Integration tests for the orchestration loop and batch pipeline.
//!
//! A scripted provider replays canned model responses so every test runs
//! the real loop, registry, scorer and assembler without network access.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::timeout;

use phish_agent::agent::{AnalysisOutcome, PhishingAnalyzer};
use phish_agent::config::AgentConfig;
use phish_agent::email::Email;
use phish_agent::error::{AnalysisError, LlmError, ToolError};
use phish_agent::llm::{
    LlmProvider, ToolCall, ToolCompletionRequest, ToolCompletionResponse,
};
use phish_agent::pipeline::{BatchAnalyzer, BatchItem, ProgressObserver};
use phish_agent::tools::CapabilityRegistry;
use phish_agent::tools::builtin::{LinkAnalyzer, LinkReport, StubLinkAnalyzer};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

type Scripted = Result<ToolCompletionResponse, LlmError>;

/// Stub provider replaying a fixed script; falls back to `fallback`.
struct ScriptedLlm {
    script: Mutex<VecDeque<Scripted>>,
    fallback: fn() -> Scripted,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(script: Vec<Scripted>) -> Arc<Self> {
        Self::with_fallback(script, || {
            Err(LlmError::InvalidResponse {
                provider: "scripted".into(),
                reason: "script exhausted".into(),
            })
        })
    }

    fn with_fallback(script: Vec<Scripted>, fallback: fn() -> Scripted) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete_with_tools(
        &self,
        _request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| (self.fallback)())
    }
}

/// Fails any URL containing "broken".
struct FlakyLinks;

#[async_trait]
impl LinkAnalyzer for FlakyLinks {
    async fn analyze(&self, url: &str) -> Result<LinkReport, ToolError> {
        if url.contains("broken") {
            return Err(ToolError::ExecutionFailed {
                name: "linkReputation".into(),
                reason: "resolver unavailable".into(),
            });
        }
        StubLinkAnalyzer.analyze(url).await
    }
}

fn calls(list: &[(&str, &str)]) -> Scripted {
    Ok(ToolCompletionResponse::calls(
        list.iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall::new(format!("call_{i}_{name}"), *name, *args))
            .collect(),
    ))
}

fn transport_error() -> Scripted {
    Err(LlmError::RequestFailed {
        provider: "scripted".into(),
        reason: "connection reset".into(),
    })
}

fn phishing_email() -> Email {
    Email {
        id: "phish-1".into(),
        from: "PayPal Security <security@temp-mail.org>".into(),
        subject: "Urgent: account suspended".into(),
        body: "Dear valued customer, click here to verify your account immediately: http://bit.ly/abc"
            .into(),
        date: "2025-04-26T07:18:00Z".into(),
        headers: [
            ("from".to_string(), "security@temp-mail.org".into()),
            ("reply-to".to_string(), "collect@evil.example".into()),
            ("authentication-results".to_string(), "spf=pass".into()),
        ]
        .into_iter()
        .collect(),
        links: vec!["http://bit.ly/abc".into()],
    }
}

fn analyzer_with(llm: Arc<ScriptedLlm>, registry: CapabilityRegistry) -> PhishingAnalyzer {
    PhishingAnalyzer::new(llm, Arc::new(registry), &AgentConfig::default())
}

fn analyzer(llm: Arc<ScriptedLlm>) -> PhishingAnalyzer {
    analyzer_with(llm, CapabilityRegistry::default())
}

async fn run(analyzer: &PhishingAnalyzer, email: &Email) -> Result<AnalysisOutcome, AnalysisError> {
    timeout(TEST_TIMEOUT, analyzer.analyze(email))
        .await
        .expect("analysis hung")
}

// ── Full runs ───────────────────────────────────────────────────────────

#[tokio::test]
async fn full_mandated_sequence_produces_verdict() {
    let llm = ScriptedLlm::new(vec![
        calls(&[("headerAnalysis", "{}")]),
        calls(&[("domainReputation", r#"{"domain": "temp-mail.org"}"#)]),
        calls(&[("contentPattern", "{}")]),
        calls(&[("linkReputation", r#"{"url": "http://bit.ly/abc"}"#)]),
        calls(&[("scoreEmail", "{}")]),
        calls(&[(
            "finalAnswer",
            r#"{"riskScore": 95, "confidence": 0.9, "isPhishing": true,
                "redFlags": ["Reply-To mismatch", "Shortened link"],
                "recommendations": ["Delete the email"]}"#,
        )]),
    ]);
    let outcome = run(&analyzer(llm.clone()), &phishing_email()).await.unwrap();
    let analysis = outcome.analysis().expect("verdict");

    assert!(analysis.is_phishing);
    assert_eq!(analysis.risk_score, 95.0);
    assert_eq!(analysis.confidence, 0.9);
    assert_eq!(analysis.reasons, vec!["Reply-To mismatch", "Shortened link"]);
    assert_eq!(analysis.recommendations, vec!["Delete the email"]);
    assert_eq!(
        analysis.tool_results.names().collect::<Vec<_>>(),
        vec![
            "headerAnalysis",
            "domainReputation",
            "contentPattern",
            "linkReputation",
            "scoreEmail",
        ]
    );
    assert_eq!(analysis.link_analysis.len(), 1);
    assert!(analysis.link_analysis[0].is_suspicious);

    let header = analysis.tool_results.get("headerAnalysis").unwrap();
    assert_eq!(header["spoofingAttempts"], true);
    assert_eq!(header["spf"], true);
    assert_eq!(header["dkim"], false);

    // Everything fires except neutral domain: clamped to 100
    let score = analysis.tool_results.get("scoreEmail").unwrap();
    assert_eq!(score["riskScore"], 100.0);
    assert_eq!(llm.calls(), 6);
}

#[tokio::test]
async fn malformed_arguments_still_reach_final_answer() {
    let llm = ScriptedLlm::new(vec![
        calls(&[("headerAnalysis", "{headers: not json")]),
        calls(&[("contentPattern", r#"{"body": 42}"#)]),
        calls(&[("finalAnswer", r#"{"isPhishing": "true", "riskScore": "88"}"#)]),
    ]);
    let outcome = run(&analyzer(llm.clone()), &phishing_email()).await.unwrap();
    let analysis = outcome.analysis().expect("verdict");

    assert_eq!(llm.calls(), 3);
    assert!(analysis.is_phishing);
    assert_eq!(analysis.risk_score, 88.0);
    // Both capabilities fell back to the email's own fields
    assert_eq!(
        analysis.tool_results.get("headerAnalysis").unwrap()["spoofingAttempts"],
        true
    );
    assert_eq!(
        analysis.tool_results.get("contentPattern").unwrap()["urgency"],
        true
    );
}

#[tokio::test]
async fn consecutive_unparseable_arguments_then_final_answer() {
    let llm = ScriptedLlm::new(vec![
        calls(&[("domainReputation", "{\"domain\": ")]),
        calls(&[("contentPattern", "not json at all")]),
        calls(&[("finalAnswer", r#"{"isPhishing": true, "riskScore": 70}"#)]),
    ]);
    let outcome = run(&analyzer(llm.clone()), &phishing_email()).await.unwrap();
    let analysis = outcome.analysis().expect("verdict");

    assert_eq!(llm.calls(), 3);
    assert!(analysis.is_phishing);
    assert_eq!(analysis.risk_score, 70.0);
    // Empty arguments fall back to the sender domain and the email content
    let domain = analysis.tool_results.get("domainReputation").unwrap();
    assert_eq!(domain["reputation"], "poor");
    assert_eq!(
        analysis.tool_results.get("contentPattern").unwrap()["urgency"],
        true
    );
}

#[tokio::test]
async fn empty_reply_yields_no_analysis() {
    let llm = ScriptedLlm::new(vec![
        calls(&[("headerAnalysis", "{}")]),
        calls(&[("scoreEmail", "{}")]),
        Ok(ToolCompletionResponse {
            content: None,
            ..ToolCompletionResponse::calls(Vec::new())
        }),
    ]);
    let outcome = run(&analyzer(llm.clone()), &phishing_email()).await.unwrap();

    assert_eq!(llm.calls(), 3);
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({"error": "No analysis could be performed."})
    );
}

#[tokio::test]
async fn unknown_capabilities_exhaust_budget() {
    let llm = ScriptedLlm::with_fallback(vec![], || calls(&[("summonKraken", "{}")]));
    let outcome = run(&analyzer(llm.clone()), &phishing_email()).await.unwrap();

    assert_eq!(llm.calls(), 8);
    assert!(outcome.is_error());
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({"error": "No analysis could be performed."})
    );
}

#[tokio::test]
async fn failing_link_gets_conservative_entry() {
    let mut email = phishing_email();
    email.links = vec![
        "https://good.example/a".into(),
        "https://broken.example/b".into(),
        "http://plain.example/c".into(),
    ];
    let llm = ScriptedLlm::new(vec![
        calls(&[("linkReputation", "{}")]),
        calls(&[("finalAnswer", r#"{"isPhishing": true}"#)]),
    ]);
    let registry = CapabilityRegistry::new(Arc::new(FlakyLinks), Duration::from_secs(1));
    let outcome = run(&analyzer_with(llm, registry), &email).await.unwrap();
    let analysis = outcome.analysis().expect("verdict");

    let links: Vec<Value> = analysis.tool_results.get("linkReputation").unwrap()["links"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(links.len(), 3);

    let broken = &links[1];
    assert_eq!(broken["url"], "https://broken.example/b");
    assert_eq!(broken["isKnownPhishing"], true);
    assert_eq!(broken["ssl"], false);
    assert_eq!(broken["redirects"], 0);
    assert_eq!(broken["domainAge"], 0);
    assert!(broken["error"].as_str().unwrap().contains("resolver unavailable"));

    assert_eq!(links[0]["ssl"], true);
    assert!(links[0].get("error").is_none());

    assert_eq!(analysis.link_analysis.len(), 3);
    assert!(!analysis.link_analysis[0].is_suspicious);
    assert!(analysis.link_analysis[1].is_suspicious);
    assert!(analysis.link_analysis[2].is_suspicious);
}

#[tokio::test]
async fn score_email_ignores_model_supplied_results() {
    let llm = ScriptedLlm::new(vec![
        calls(&[(
            "scoreEmail",
            r#"{"toolResults": {"domainReputation": {"reputation": "poor", "blacklistStatus": true}}}"#,
        )]),
        calls(&[("finalAnswer", "{}")]),
    ]);
    let outcome = run(&analyzer(llm), &phishing_email()).await.unwrap();
    let analysis = outcome.analysis().expect("verdict");

    // Only the seeded header default is scored: missing auth
    assert_eq!(analysis.risk_score, 20.0);
    assert_eq!(analysis.reasons, vec!["Missing SPF/DKIM/DMARC."]);
    assert!(!analysis.is_phishing);
}

// ── Free text ───────────────────────────────────────────────────────────

#[tokio::test]
async fn free_text_with_embedded_json_is_terminal() {
    let llm = ScriptedLlm::new(vec![Ok(ToolCompletionResponse::text(
        "Analysis complete.\n```json\n{\"isPhishing\": true, \"riskScore\": 77, \"confidence\": \"0.6\", \"reasons\": \"Spoofed sender\"}\n```",
    ))]);
    let outcome = run(&analyzer(llm.clone()), &phishing_email()).await.unwrap();
    let analysis = outcome.analysis().expect("verdict");

    assert_eq!(llm.calls(), 1);
    assert!(analysis.is_phishing);
    assert_eq!(analysis.risk_score, 77.0);
    assert_eq!(analysis.confidence, 0.6);
    assert_eq!(analysis.reasons, vec!["Spoofed sender"]);
}

#[tokio::test]
async fn plain_free_text_is_not_an_error() {
    let llm = ScriptedLlm::new(vec![Ok(ToolCompletionResponse::text(
        "This looks like an ordinary newsletter.",
    ))]);
    let outcome = run(&analyzer(llm), &phishing_email()).await.unwrap();
    let analysis = outcome.analysis().expect("verdict");

    assert_eq!(analysis.reasons, vec!["This looks like an ordinary newsletter."]);
    assert_eq!(analysis.risk_score, 20.0);
    assert_eq!(analysis.confidence, 0.6);
}

// ── Transport failures ─────────────────────────────────────────────────

#[tokio::test]
async fn transport_failure_without_verdict_propagates() {
    let llm = ScriptedLlm::new(vec![calls(&[("headerAnalysis", "{}")]), transport_error()]);
    let err = run(&analyzer(llm), &phishing_email()).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Llm(LlmError::RequestFailed { .. })));
}

#[tokio::test]
async fn transport_failure_after_partial_verdict_returns_it() {
    let mut with_text = ToolCompletionResponse::calls(vec![ToolCall::new(
        "c1",
        "domainReputation",
        "{}",
    )]);
    with_text.content = Some(r#"Interim: {"riskScore": 72, "isPhishing": true}"#.into());

    let llm = ScriptedLlm::new(vec![Ok(with_text), transport_error()]);
    let outcome = run(&analyzer(llm), &phishing_email()).await.unwrap();
    let analysis = outcome.analysis().expect("partial verdict");

    assert_eq!(analysis.risk_score, 72.0);
    assert!(analysis.is_phishing);
    assert!(analysis.tool_results.contains("domainReputation"));
}

// ── Batch ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct CountingObserver {
    started: AtomicUsize,
    progressed: AtomicUsize,
    errors: AtomicUsize,
}

impl ProgressObserver for CountingObserver {
    fn on_start(&self, total: usize) {
        self.started.store(total, Ordering::SeqCst);
    }
    fn on_progress(&self, _done: usize, _total: usize, _email_id: &str) {
        self.progressed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_error(&self, _email_id: &str, _error: &AnalysisError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn batch_skips_incomplete_and_isolates_failures() {
    // Sequential so the script lines up with the input order
    let llm = ScriptedLlm::new(vec![
        calls(&[("finalAnswer", r#"{"riskScore": 90, "isPhishing": true}"#)]),
        transport_error(),
        calls(&[("finalAnswer", r#"{"riskScore": 5, "isPhishing": false}"#)]),
    ]);
    let analyzer = Arc::new(analyzer(llm.clone()));
    let observer = Arc::new(CountingObserver::default());
    let batch = BatchAnalyzer::new(analyzer, 1).with_observer(observer.clone());

    let mut second = phishing_email();
    second.id = "phish-2".into();
    let mut third = phishing_email();
    third.id = "phish-3".into();
    let incomplete = Email {
        id: "no-date".into(),
        date: String::new(),
        ..phishing_email()
    };

    let (results, summary) = timeout(
        TEST_TIMEOUT,
        batch.analyze_all(vec![phishing_email(), incomplete, second, third]),
    )
    .await
    .expect("batch hung");

    assert_eq!(summary.received, 4);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.analyzed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.phishing, 1);
    assert_eq!(llm.calls(), 3);

    let ids: Vec<_> = results.iter().map(|r| r.email_id.as_str()).collect();
    assert_eq!(ids, vec!["phish-1", "phish-2", "phish-3"]);
    assert!(matches!(results[1].result, BatchItem::Errored { .. }));
    assert!(matches!(results[2].result, BatchItem::Analyzed { .. }));

    assert_eq!(observer.started.load(Ordering::SeqCst), 3);
    assert_eq!(observer.progressed.load(Ordering::SeqCst), 3);
    assert_eq!(observer.errors.load(Ordering::SeqCst), 1);

    let json = serde_json::to_value(&results[0]).unwrap();
    assert_eq!(json["emailId"], "phish-1");
    assert_eq!(json["analysis"]["isPhishing"], true);
}
