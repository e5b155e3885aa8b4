//! Decay policy classification.
//!
//! Assigns each fact a decay class from its text and extracted triple. The
//! rules are an ordered list of keyword patterns evaluated first-match-wins;
//! each class maps to a fixed time-to-live.

use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How long a fact remains valid and whether access renews it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayClass {
    /// Identity, contact details, standing conventions. Never expires.
    Permanent,
    /// Project and relationship facts, technology preferences. 90 days.
    Stable,
    /// Current tasks and goals. 14 days.
    Active,
    /// Debug state, things true "right now". 24 hours.
    Session,
    /// Pre-flight snapshots. 4 hours.
    Checkpoint,
}

impl DecayClass {
    /// Time-to-live from creation (or last refresh). `None` means the fact
    /// never expires.
    pub fn ttl(self) -> Option<Duration> {
        match self {
            DecayClass::Permanent => None,
            DecayClass::Stable => Some(Duration::days(90)),
            DecayClass::Active => Some(Duration::days(14)),
            DecayClass::Session => Some(Duration::hours(24)),
            DecayClass::Checkpoint => Some(Duration::hours(4)),
        }
    }

    /// Whether access-refresh extends this class's expiry.
    pub fn refresh_on_access(self) -> bool {
        matches!(self, DecayClass::Stable | DecayClass::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DecayClass::Permanent => "permanent",
            DecayClass::Stable => "stable",
            DecayClass::Active => "active",
            DecayClass::Session => "session",
            DecayClass::Checkpoint => "checkpoint",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "permanent" => Some(DecayClass::Permanent),
            "stable" => Some(DecayClass::Stable),
            "active" => Some(DecayClass::Active),
            "session" => Some(DecayClass::Session),
            "checkpoint" => Some(DecayClass::Checkpoint),
            _ => None,
        }
    }
}

static DECAY_RULES: LazyLock<Vec<(Regex, DecayClass)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(
                r"(?x)
                \b(
                    birthday | born\s+on | name\s+is | email | e-mail |
                    phone | address | api\s*key | credentials? |
                    always | never | decided | convention | policy
                )\b",
            )
            .unwrap(),
            DecayClass::Permanent,
        ),
        (
            Regex::new(
                r"(?x)
                \b(
                    project | repo(sitory)? | codebase | architecture |
                    prefer(s|red|ence)? | likes? | loves? | hates? |
                    wife | husband | partner | friend | colleague | boss |
                    uses? | stack | framework | language | database | tool
                )\b",
            )
            .unwrap(),
            DecayClass::Stable,
        ),
        (
            Regex::new(
                r"(?x)
                \b(
                    task | sprint | goal | milestone | deadline |
                    currently | working\s+on | this\s+week | in\s+progress
                )\b",
            )
            .unwrap(),
            DecayClass::Active,
        ),
        (
            Regex::new(
                r"(?x)
                \b(
                    debug(ging)? | temporar(y|ily) | right\s+now |
                    for\s+now | at\s+the\s+moment | just\s+for\s+this
                )\b",
            )
            .unwrap(),
            DecayClass::Session,
        ),
        (
            Regex::new(r"(?x)\b( checkpoint | pre-?flight | before\s+(deploy|restart) )\b")
                .unwrap(),
            DecayClass::Checkpoint,
        ),
    ]
});

/// Classify a fact's decay policy from its extracted triple and full text.
///
/// Inputs are concatenated (missing parts as empty), lower-cased, and tested
/// against the ordered rule list; the first matching rule wins. Facts that
/// match nothing default to [`DecayClass::Stable`].
pub fn classify_decay(
    entity: Option<&str>,
    attribute: Option<&str>,
    value: Option<&str>,
    text: &str,
) -> DecayClass {
    let haystack = format!(
        "{} {} {} {}",
        entity.unwrap_or(""),
        attribute.unwrap_or(""),
        value.unwrap_or(""),
        text
    )
    .to_lowercase();

    for (pattern, class) in DECAY_RULES.iter() {
        if pattern.is_match(&haystack) {
            return *class;
        }
    }
    DecayClass::Stable
}
