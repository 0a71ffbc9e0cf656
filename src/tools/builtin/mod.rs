//! Built-in analyzers behind each capability.

pub mod content;
pub mod domain;
pub mod header;
pub mod link;

pub use content::{ContentPatterns, ContentReport, PatternFamily, detect_patterns};
pub use domain::{DomainReport, Reputation, domain_reputation};
pub use header::{HeaderReport, analyze_headers};
pub use link::{LinkAnalyzer, LinkReport, StubLinkAnalyzer, aggregate, analyze_links};
