//! Triple extraction.
//!
//! Decomposes a natural-language statement into an (entity, attribute,
//! value) triple using an ordered list of patterns; the first match wins.
//! Statements that fit no pattern yield no triple.

use std::sync::LazyLock;

use regex::Regex;

/// An (entity, attribute, value) decomposition of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub entity: String,
    pub attribute: String,
    pub value: String,
}

// "Sam's birthday is March 3rd" → (Sam, birthday, March 3rd)
static POSSESSIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(.+?)'s\s+([\w\s-]+?)\s+is\s+(.+?)\s*$").unwrap()
});

// "I prefer dark mode" → (user, prefer, dark mode)
static PREFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bI\s+(?:really\s+)?(?:prefer|like|love|hate|want)\s+(.+?)\s*$").unwrap()
});

// "We decided to use tokio because of the ecosystem" → (decision, tokio, because of the ecosystem)
static DECISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bwe\s+(?:decided|chose|agreed)\s+(?:on\s+|to\s+(?:use\s+)?)?(.+?)(?:\s+(?:because|for)\s+(.+?))?\s*$",
    )
    .unwrap()
});

// "Always run the linter first" → (convention, run the linter first, always)
static CONVENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(always|never)\s+(.+?)\s*$").unwrap());

/// Try to extract a triple from free text.
pub fn extract_triple(text: &str) -> Option<Triple> {
    if let Some(caps) = POSSESSIVE.captures(text) {
        return Some(Triple {
            entity: caps[1].trim().to_string(),
            attribute: caps[2].trim().to_string(),
            value: caps[3].trim().to_string(),
        });
    }

    if let Some(caps) = PREFERENCE.captures(text) {
        return Some(Triple {
            entity: "user".to_string(),
            attribute: "prefer".to_string(),
            value: caps[1].trim().to_string(),
        });
    }

    if let Some(caps) = DECISION.captures(text) {
        return Some(Triple {
            entity: "decision".to_string(),
            attribute: caps[1].trim().to_string(),
            value: caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        });
    }

    if let Some(caps) = CONVENTION.captures(text) {
        return Some(Triple {
            entity: "convention".to_string(),
            attribute: caps[2].trim().to_string(),
            value: caps[1].to_lowercase(),
        });
    }

    None
}
