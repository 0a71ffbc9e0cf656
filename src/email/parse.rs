//! Raw RFC 822 parsing via mail_parser.
//!
//! Decoded fields (from, subject, date, body) come from `mail_parser`.
//! The header map is built from the raw header values instead, so they keep
//! the exact text the analyzers match against (e.g. `Authentication-Results`).

use mail_parser::{Message, MessageParser};

use crate::email::{Email, HeaderValue, Headers};
use crate::error::IngestError;

/// Parse a raw message into an `Email`. Links are extracted from the body.
pub fn parse_raw(id: impl Into<String>, raw: &[u8]) -> Result<Email, IngestError> {
    let id = id.into();
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| IngestError::Parse {
            id: id.clone(),
            reason: "not a valid RFC 822 message".into(),
        })?;

    let from = message
        .from()
        .and_then(|addr| addr.first())
        .map(|a| {
            let address = a.address().unwrap_or_default();
            match a.name() {
                Some(name) if !name.is_empty() && !address.is_empty() => {
                    format!("{name} <{address}>")
                }
                Some(name) if address.is_empty() => name.to_string(),
                _ => address.to_string(),
            }
        })
        .unwrap_or_default();

    let email = Email {
        id,
        from,
        subject: message.subject().unwrap_or_default().to_string(),
        body: message
            .body_text(0)
            .map(|b| b.into_owned())
            .unwrap_or_default(),
        date: message.date().map(|d| d.to_rfc3339()).unwrap_or_default(),
        headers: raw_headers(&message),
        links: Vec::new(),
    };

    Ok(email.with_extracted_links())
}

/// Collect raw header values into a map with lowercased names.
///
/// Folded values are unfolded. Repeated headers become `HeaderValue::Many`
/// in order of appearance.
fn raw_headers(message: &Message<'_>) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in message.headers_raw() {
        let value = value
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let name = name.to_ascii_lowercase();

        let merged = match headers.remove(&name) {
            None => HeaderValue::One(value),
            Some(HeaderValue::One(prev)) => HeaderValue::Many(vec![prev, value]),
            Some(HeaderValue::Many(mut values)) => {
                values.push(value);
                HeaderValue::Many(values)
            }
        };
        headers.insert(name, merged);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "From: Security Team <security@temp-mail.org>\r\n\
Reply-To: collect@evil.example\r\n\
To: victim@example.com\r\n\
Subject: Urgent: verify your account\r\n\
Date: Sat, 26 Apr 2025 07:18:00 +0000\r\n\
Authentication-Results: mx.example.com;\r\n\
 spf=pass smtp.mailfrom=temp-mail.org;\r\n\
 dkim=fail\r\n\
Received: from a\r\n\
Received: from b\r\n\
\r\n\
Dear valued customer, click here: http://bit.ly/abc123 immediately.\r\n";

    #[test]
    fn parses_decoded_fields() {
        let email = parse_raw("msg-1", RAW.as_bytes()).unwrap();
        assert_eq!(email.id, "msg-1");
        assert_eq!(email.from, "Security Team <security@temp-mail.org>");
        assert_eq!(email.subject, "Urgent: verify your account");
        assert!(email.date.starts_with("2025-04-26T07:18:00"));
        assert!(email.body.contains("Dear valued customer"));
        assert_eq!(email.links, vec!["http://bit.ly/abc123"]);
    }

    fn headers() -> Headers {
        parse_raw("msg-1", RAW.as_bytes()).unwrap().headers
    }

    #[test]
    fn headers_are_lowercased_and_unfolded() {
        let headers = headers();
        assert_eq!(
            headers["reply-to"],
            HeaderValue::One("collect@evil.example".into())
        );
        let auth = headers["authentication-results"].joined();
        assert!(auth.contains("spf=pass"));
        assert!(auth.contains("dkim=fail"));
    }

    #[test]
    fn repeated_headers_become_lists() {
        let headers = headers();
        assert_eq!(
            headers["received"],
            HeaderValue::Many(vec!["from a".into(), "from b".into()])
        );
    }

    #[test]
    fn body_is_not_read_as_headers() {
        let headers = headers();
        assert!(!headers.keys().any(|k| k.starts_with("dear")));
        assert_eq!(
            headers["subject"],
            HeaderValue::One("Urgent: verify your account".into())
        );
    }

    #[test]
    fn unfolding_keeps_auth_results_on_one_line() {
        let auth = headers()["authentication-results"].joined();
        assert_eq!(
            auth,
            "mx.example.com; spf=pass smtp.mailfrom=temp-mail.org; dkim=fail"
        );
    }
}
