//! Heuristic triage of E2E failure messages
//!
//! The label is a triage aid, not ground truth: the confidence always
//! travels with it so consumers can discount weak matches.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Flaky,
    DataDependency,
    UiChange,
    Bug,
    Unknown,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Classification::Flaky => "flaky",
            Classification::DataDependency => "data-dependency",
            Classification::UiChange => "ui-change",
            Classification::Bug => "bug",
            Classification::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub classification: Classification,
    pub confidence: f64,
}

struct Rule {
    matches: fn(&str) -> bool,
    classification: Classification,
    confidence: f64,
}

fn any_of(msg: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| msg.contains(n))
}

/// Evaluated top to bottom against the lower-cased message; first match wins.
const RULES: &[Rule] = &[
    Rule {
        matches: |m| any_of(m, &["timeout", "timed out", "net::err", "page closed"]),
        classification: Classification::Flaky,
        confidence: 0.6,
    },
    Rule {
        matches: |m| m.contains("not found") && any_of(m, &["seed", "prisma", "company", "vehicle"]),
        classification: Classification::DataDependency,
        confidence: 0.55,
    },
    Rule {
        matches: |m| m.contains("expected") && m.contains("to contain text"),
        classification: Classification::UiChange,
        confidence: 0.45,
    },
    Rule {
        matches: |m| any_of(m, &["500", "internal server error"]),
        classification: Classification::Bug,
        confidence: 0.55,
    },
];

const FALLBACK: Verdict = Verdict {
    classification: Classification::Unknown,
    confidence: 0.3,
};

pub fn classify(error_message: &str) -> Verdict {
    let msg = error_message.to_lowercase();
    RULES
        .iter()
        .find(|rule| (rule.matches)(&msg))
        .map(|rule| Verdict {
            classification: rule.classification,
            confidence: rule.confidence,
        })
        .unwrap_or(FALLBACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_flaky() {
        let v = classify("Timeout 30000ms exceeded");
        assert_eq!(v.classification, Classification::Flaky);
        assert_eq!(v.confidence, 0.6);
        assert_eq!(
            classify("page.goto: net::ERR_CONNECTION_REFUSED").classification,
            Classification::Flaky
        );
    }

    #[test]
    fn test_contain_text_is_ui_change() {
        let v = classify("Error: expected 'Active' to contain text 'ACTIVE'");
        assert_eq!(v.classification, Classification::UiChange);
        assert_eq!(v.confidence, 0.45);
    }

    #[test]
    fn test_server_error_is_bug() {
        let v = classify("Request failed with status of 500 (Internal Server Error)");
        assert_eq!(v.classification, Classification::Bug);
        assert_eq!(v.confidence, 0.55);
    }

    #[test]
    fn test_missing_seed_is_data_dependency() {
        let v = classify("Vehicle not found for company seed-co");
        assert_eq!(v.classification, Classification::DataDependency);
        // "not found" alone is not enough
        assert_eq!(classify("Element not found").classification, Classification::Unknown);
    }

    #[test]
    fn test_rule_order_timeout_wins_over_bug() {
        let v = classify("Timed out waiting for response with status 500");
        assert_eq!(v.classification, Classification::Flaky);
    }

    #[test]
    fn test_unknown_fallback() {
        let v = classify("");
        assert_eq!(v, FALLBACK);
    }

    #[test]
    fn test_classification_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Classification::DataDependency).unwrap(),
            "\"data-dependency\""
        );
    }
}
