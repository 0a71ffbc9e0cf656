//! Sender domain reputation (deterministic stub).

use serde::{Deserialize, Serialize};

use crate::email::domain_of;

/// Consumer mail providers treated as reputable.
const KNOWN_GOOD_DOMAINS: &[&str] = &["gmail.com", "outlook.com"];

/// Substrings that mark disposable mail services.
const DISPOSABLE_MARKERS: &[&str] = &["temp-mail", "throwaway"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reputation {
    Good,
    Neutral,
    Poor,
}

/// Result of `domainReputation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainReport {
    pub domain: String,
    pub reputation: Reputation,
    /// Domain age in years.
    pub age: u32,
    /// Whether the domain is on a blocklist.
    pub blacklist_status: bool,
    pub is_known_brand: bool,
}

/// Look up a domain. Accepts a bare domain or a full address.
pub fn domain_reputation(input: &str) -> DomainReport {
    let domain = domain_of(input).unwrap_or_default();

    let known_good = KNOWN_GOOD_DOMAINS
        .iter()
        .any(|good| domain == *good || domain.ends_with(&format!(".{good}")));
    let disposable = DISPOSABLE_MARKERS.iter().any(|m| domain.contains(m));

    let (reputation, age, blacklist_status, is_known_brand) = if known_good {
        (Reputation::Good, 20, false, true)
    } else if disposable {
        (Reputation::Poor, 0, true, false)
    } else {
        (Reputation::Neutral, 2, false, false)
    };

    DomainReport {
        domain,
        reputation,
        age,
        blacklist_status,
        is_known_brand,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_mail_is_good() {
        let report = domain_reputation("someone@Gmail.com");
        assert_eq!(report.domain, "gmail.com");
        assert_eq!(report.reputation, Reputation::Good);
        assert!(report.is_known_brand);
        assert!(!report.blacklist_status);
    }

    #[test]
    fn disposable_mail_is_poor_and_blacklisted() {
        let report = domain_reputation("temp-mail.org");
        assert_eq!(report.reputation, Reputation::Poor);
        assert!(report.blacklist_status);
        assert_eq!(report.age, 0);

        assert_eq!(
            domain_reputation("x@throwaway.email").reputation,
            Reputation::Poor
        );
    }

    #[test]
    fn lookalike_suffix_is_not_good() {
        let report = domain_reputation("evilgmail.com");
        assert_eq!(report.reputation, Reputation::Neutral);
        assert!(!report.is_known_brand);
    }

    #[test]
    fn subdomain_of_known_provider_is_good() {
        let report = domain_reputation("alerts@mail.outlook.com");
        assert_eq!(report.reputation, Reputation::Good);
        assert_eq!(report.age, 20);
        // A bare suffix match would also accept this one
        assert_eq!(
            domain_reputation("notoutlook.com").reputation,
            Reputation::Neutral
        );
    }

    #[test]
    fn everything_else_is_neutral() {
        let report = domain_reputation("Billing <billing@vendor.example>");
        assert_eq!(report.domain, "vendor.example");
        assert_eq!(report.reputation, Reputation::Neutral);
        assert_eq!(report.age, 2);
    }

    #[test]
    fn serializes_with_wire_names() {
        let json = serde_json::to_value(domain_reputation("temp-mail.org")).unwrap();
        assert_eq!(json["reputation"], "poor");
        assert_eq!(json["blacklistStatus"], true);
        assert_eq!(json["isKnownBrand"], false);
    }
}
