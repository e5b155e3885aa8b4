//! Fact Classification
//!
//! Pure rule-based classifiers applied to candidate memory text: decay
//! policy assignment, (entity, attribute, value) triple extraction, and the
//! capture gate that screens what is allowed into the stores.

pub mod decay;
pub mod gate;
pub mod triple;

pub use decay::{classify_decay, DecayClass};
pub use gate::{evaluate_capture, CaptureDecision, RejectReason, DEFAULT_MAX_CAPTURE_LEN};
pub use triple::{extract_triple, Triple};
