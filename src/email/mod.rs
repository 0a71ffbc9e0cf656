//! Email model and ingestion.
//!
//! `Email` is what the orchestrator analyzes. It is produced by an
//! [`EmailSource`] (raw RFC 822 files, JSON dumps, or anything else) and
//! never mutated once handed over.

pub mod parse;
pub mod source;

pub use parse::parse_raw;
pub use source::{EmailSource, FileSource, retain_complete};

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s<>\x22']+").unwrap());

/// A header value as delivered by the ingestion layer: single or repeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    One(String),
    Many(Vec<String>),
}

impl HeaderValue {
    /// First value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(v) => Some(v),
            Self::Many(vs) => vs.first().map(String::as_str),
        }
    }

    /// All values joined with `"; "`.
    pub fn joined(&self) -> String {
        match self {
            Self::One(v) => v.clone(),
            Self::Many(vs) => vs.join("; "),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

/// Header map keyed by header name.
pub type Headers = BTreeMap<String, HeaderValue>;

/// An email message ready for analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Email {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub links: Vec<String>,
}

impl Email {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        header_lookup(&self.headers, name)
    }

    /// Domain part of the `From` address, lowercased.
    pub fn sender_domain(&self) -> Option<String> {
        domain_of(&self.from)
    }

    /// Required fields (`from`, `subject`, `date`, `body`) that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("from", &self.from),
            ("subject", &self.subject),
            ("date", &self.date),
            ("body", &self.body),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Whether this record may be handed to the orchestrator.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Fill `links` from the body when the source did not supply any.
    pub fn with_extracted_links(mut self) -> Self {
        if self.links.is_empty() {
            self.links = extract_links(&self.body);
        }
        self
    }
}

/// Case-insensitive lookup in a header map.
pub fn header_lookup<'a>(headers: &'a Headers, name: &str) -> Option<&'a HeaderValue> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

/// Extract the domain from an address or a `Name <addr>` string.
///
/// A bare domain (no `@`) is returned as-is.
pub fn domain_of(address: &str) -> Option<String> {
    let addr = match (address.rfind('<'), address.rfind('>')) {
        (Some(start), Some(end)) if end > start => &address[start + 1..end],
        _ => address,
    };
    let domain = match addr.rsplit_once('@') {
        Some((_, domain)) => domain,
        None => addr,
    };
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    (!domain.is_empty()).then_some(domain)
}

/// Extract http(s) URLs from free text, in order of appearance.
pub fn extract_links(text: &str) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']'])
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Email {
        Email {
            id: "1".into(),
            from: "PayPal Support <support@paypa1-secure.com>".into(),
            subject: "Action required".into(),
            body: "Verify at https://paypa1-secure.com/login. Or http://bit.ly/x1)".into(),
            date: "2025-04-26T07:18:00Z".into(),
            ..Default::default()
        }
    }

    #[test]
    fn sender_domain_from_display_name() {
        assert_eq!(sample().sender_domain().as_deref(), Some("paypa1-secure.com"));
    }

    #[test]
    fn domain_of_bare_domain() {
        assert_eq!(domain_of("Example.COM").as_deref(), Some("example.com"));
        assert_eq!(domain_of("a@x.com").as_deref(), Some("x.com"));
        assert!(domain_of("  ").is_none());
    }

    #[test]
    fn extract_links_trims_trailing_punctuation() {
        let links = extract_links(&sample().body);
        assert_eq!(
            links,
            vec!["https://paypa1-secure.com/login", "http://bit.ly/x1"]
        );
    }

    #[test]
    fn with_extracted_links_keeps_supplied_links() {
        let email = Email {
            links: vec!["https://given.example".into()],
            ..sample()
        }
        .with_extracted_links();
        assert_eq!(email.links, vec!["https://given.example"]);
    }

    #[test]
    fn missing_fields_reports_blank_values() {
        let email = Email {
            subject: "  ".into(),
            date: String::new(),
            ..sample()
        };
        assert_eq!(email.missing_fields(), vec!["subject", "date"]);
        assert!(!email.is_complete());
        assert!(sample().is_complete());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut email = sample();
        email
            .headers
            .insert("Reply-To".into(), HeaderValue::from("b@y.com"));
        assert_eq!(
            email.header("reply-to").and_then(HeaderValue::first),
            Some("b@y.com")
        );
    }

    #[test]
    fn header_value_deserializes_string_or_list() {
        let json = r#"{"from":"a@x.com","headers":{"received":["one","two"],"subject":"hi"}}"#;
        let email: Email = serde_json::from_str(json).unwrap();
        assert_eq!(
            email.headers["received"],
            HeaderValue::Many(vec!["one".into(), "two".into()])
        );
        assert_eq!(email.headers["received"].joined(), "one; two");
        assert_eq!(email.headers["subject"].first(), Some("hi"));
    }
}
