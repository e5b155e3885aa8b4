//! Recall Pipeline
//!
//! Fuses lexical and vector search results into one ranked list and renders
//! it as a delimited context block safe to prepend to a conversation.

pub mod format;
pub mod merge;

pub use format::render_context_block;
pub use merge::{merge_results, Backend, RecalledMemory};
