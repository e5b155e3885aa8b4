//! Capture gate.
//!
//! Decides whether a candidate utterance may be persisted as a memory.
//! Injection screening is a hard veto; the memorability triggers are the
//! admission criterion. Both are ordered regex lists compiled once.

use std::sync::LazyLock;

use regex::Regex;

use crate::recall::format::{CONTEXT_CLOSE_TAG, CONTEXT_OPEN_TAG};

/// Minimum candidate length in characters.
pub const MIN_CAPTURE_LEN: usize = 10;

/// Default maximum candidate length, overridable via configuration.
pub const DEFAULT_MAX_CAPTURE_LEN: usize = 500;

/// Outcome of gating a capture candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDecision {
    Accept,
    Reject(RejectReason),
}

/// Why a candidate was rejected. Routine filtering, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    TooLong,
    /// Contains the context-block delimiter, i.e. a recalled block leaking
    /// back through capture.
    SelfReference,
    /// Markup-like payload (matching open/close tags).
    Markup,
    /// Matched a prompt-injection pattern.
    Injection,
    /// Passed every screen but matched no memorability trigger.
    NoTrigger,
}

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+instructions").unwrap(),
        Regex::new(r"(?i)disregard\s+(all\s+)?(previous|prior)\s+(instructions|context)").unwrap(),
        Regex::new(r"(?i)forget\s+(everything|all)\s+(you|that)\s+(know|learned|were\s+told)")
            .unwrap(),
        Regex::new(r"(?i)new\s+instructions?\s*:").unwrap(),
        Regex::new(r"(?i)you\s+are\s+now\s+(a|an|the)\s+").unwrap(),
        // Impersonation of privileged message roles.
        Regex::new(r"(?i)^\s*(system|assistant|developer)\s*:").unwrap(),
        Regex::new(r"(?i)\[\s*(system|assistant)\s*\]").unwrap(),
        // Fabricated context delimiters, opening or closing.
        Regex::new(r"(?i)</?\s*relevant-memories").unwrap(),
    ]
});

static TRIGGER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Explicit requests to remember.
        Regex::new(r"(?i)\b(remember|memorize|don't\s+forget|keep\s+in\s+mind|note\s+that)\b")
            .unwrap(),
        // Preference statements.
        Regex::new(r"(?i)\bI\s+(really\s+)?(prefer|like|love|hate|want|need|use)\b").unwrap(),
        Regex::new(r"(?i)\bmy\s+\w+([\w\s]*)\s+is\b").unwrap(),
        Regex::new(r"(?i)\w's\s+[\w\s-]+\s+is\b").unwrap(),
        // Decision statements.
        Regex::new(r"(?i)\bwe\s+(decided|chose|agreed|settled\s+on)\b").unwrap(),
        // Contact-info-shaped strings.
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
        Regex::new(r"\+?\d[\d\s().-]{7,}\d").unwrap(),
        // Absolute and importance markers.
        Regex::new(r"(?i)\b(always|never)\b").unwrap(),
        Regex::new(r"(?i)\b(important|critical|crucial)\b").unwrap(),
    ]
});

// Markup-like leading tag: `<tag ...>` at the start of the candidate.
static OPENING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<([A-Za-z][\w-]*)[^>]*>").unwrap());

/// Gate a candidate utterance.
///
/// Rejection checks run in order; the trigger check runs last and only
/// admits text matching at least one memorability pattern.
pub fn evaluate_capture(text: &str, max_len: usize) -> CaptureDecision {
    let trimmed = text.trim();

    if trimmed.chars().count() < MIN_CAPTURE_LEN {
        return CaptureDecision::Reject(RejectReason::TooShort);
    }
    if trimmed.chars().count() > max_len {
        return CaptureDecision::Reject(RejectReason::TooLong);
    }

    if trimmed.contains(CONTEXT_OPEN_TAG) || trimmed.contains(CONTEXT_CLOSE_TAG) {
        return CaptureDecision::Reject(RejectReason::SelfReference);
    }

    if let Some(caps) = OPENING_TAG.captures(trimmed) {
        let closing = format!("</{}>", &caps[1]);
        if trimmed.contains(&closing) {
            return CaptureDecision::Reject(RejectReason::Markup);
        }
    }

    if INJECTION_PATTERNS.iter().any(|re| re.is_match(trimmed)) {
        return CaptureDecision::Reject(RejectReason::Injection);
    }

    if TRIGGER_PATTERNS.iter().any(|re| re.is_match(trimmed)) {
        CaptureDecision::Accept
    } else {
        CaptureDecision::Reject(RejectReason::NoTrigger)
    }
}
