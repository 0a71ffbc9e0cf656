//! Header analysis: Reply-To spoofing and SPF/DKIM/DMARC results.

use serde::{Deserialize, Serialize};

use crate::email::{Headers, domain_of, header_lookup};

/// Result of `headerAnalysis`.
///
/// The default value is the "nothing detected, nothing authenticated"
/// report the result store is seeded with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderReport {
    pub spoofing_attempts: bool,
    pub suspicious_headers: Vec<String>,
    pub spf: bool,
    pub dkim: bool,
    pub dmarc: bool,
}

/// Analyze a header map. Header names are matched case-insensitively.
pub fn analyze_headers(headers: &Headers) -> HeaderReport {
    let mut report = HeaderReport::default();

    let from = header_lookup(headers, "from")
        .map(|v| v.joined())
        .unwrap_or_default();
    let reply_to = header_lookup(headers, "reply-to")
        .map(|v| v.joined())
        .unwrap_or_default();

    if !reply_to.trim().is_empty() && normalize_address(&reply_to) != normalize_address(&from) {
        report.spoofing_attempts = true;
        report
            .suspicious_headers
            .push("Reply-To differs from From".to_string());
    }

    if let Some(auth) = header_lookup(headers, "authentication-results") {
        let auth = auth.joined().to_ascii_lowercase();
        report.spf = auth.contains("spf=pass");
        report.dkim = auth.contains("dkim=pass");
        report.dmarc = auth.contains("dmarc=pass");
    }

    report
}

/// `"Name <User@Host>"` and `"user@host"` compare equal.
fn normalize_address(raw: &str) -> String {
    let addr = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if end > start => &raw[start + 1..end],
        _ => raw,
    };
    let addr = addr.trim().to_ascii_lowercase();
    match (addr.rsplit_once('@'), domain_of(&addr)) {
        (Some((local, _)), Some(domain)) => format!("{local}@{domain}"),
        _ => addr,
    }
}
