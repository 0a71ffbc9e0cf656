//! Prompt text and the initial transcript for an analysis run.

use serde_json::json;

use crate::email::Email;
use crate::llm::ChatMessage;

pub const SYSTEM_PROMPT: &str = "\
You are a phishing email analysis agent. Follow these steps in order:
1. Call headerAnalysis on the headers
2. Call domainReputation on the domain from the email address
3. Call contentPattern on the email body and subject
4. Call linkReputation on any links
5. Call scoreEmail with the collected toolResults
6. Finally, call finalAnswer with the complete analysis

You MUST follow this order and MUST always finish by calling the finalAnswer function, even if you are unsure.";

/// The email as the JSON payload of the first user turn.
pub fn analysis_request(email: &Email) -> String {
    json!({
        "action": "analyzeEmail",
        "from": email.from,
        "subject": email.subject,
        "date": email.date,
        "body": email.body,
        "headers": email.headers,
        "links": email.links,
    })
    .to_string()
}

/// System instruction followed by the email payload.
pub fn initial_messages(email: &Email) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(analysis_request(email)),
    ]
}
