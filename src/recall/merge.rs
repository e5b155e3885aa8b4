//! Merge-and-rank fusion of lexical and vector results.

use std::collections::HashSet;

use crate::store::FactCategory;

/// Which index produced a recalled memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Lexical,
    Vector,
}

/// One entry in a merged recall result.
#[derive(Debug, Clone)]
pub struct RecalledMemory {
    pub text: String,
    pub category: FactCategory,
    pub score: f64,
    pub backend: Backend,
}

/// Fuse two already-scored result lists into one deduplicated ranking.
///
/// Lexical results seed the output and the seen-set (keyed by exact text),
/// so an exact-match hit is never displaced by a duplicate-text vector hit.
/// The final sort is stable, descending by score; on an exact score tie the
/// lexical entry keeps its earlier position.
pub fn merge_results(
    lexical: Vec<RecalledMemory>,
    vector: Vec<RecalledMemory>,
) -> Vec<RecalledMemory> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(lexical.len() + vector.len());

    for hit in lexical {
        seen.insert(hit.text.clone());
        merged.push(hit);
    }
    for hit in vector {
        if seen.insert(hit.text.clone()) {
            merged.push(hit);
        }
    }

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, score: f64, backend: Backend) -> RecalledMemory {
        RecalledMemory {
            text: text.to_string(),
            category: FactCategory::Fact,
            score,
            backend,
        }
    }

    #[test]
    fn dedupes_by_exact_text_keeping_lexical() {
        let lexical = vec![hit("dark mode", 0.6, Backend::Lexical)];
        // Higher raw score, same text: must not displace the lexical entry.
        let vector = vec![hit("dark mode", 0.9, Backend::Vector)];

        let merged = merge_results(lexical, vector);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].backend, Backend::Lexical);
        assert_eq!(merged[0].score, 0.6);
    }

    #[test]
    fn sorts_descending_by_score() {
        let lexical = vec![hit("a", 0.3, Backend::Lexical)];
        let vector = vec![hit("b", 0.8, Backend::Vector), hit("c", 0.5, Backend::Vector)];

        let merged = merge_results(lexical, vector);
        let scores: Vec<f64> = merged.iter().map(|m| m.score).collect();
        assert_eq!(scores, vec![0.8, 0.5, 0.3]);
    }

    #[test]
    fn tie_keeps_lexical_before_vector() {
        let lexical = vec![hit("a", 0.5, Backend::Lexical)];
        let vector = vec![hit("b", 0.5, Backend::Vector)];

        let merged = merge_results(lexical, vector);
        assert_eq!(merged[0].backend, Backend::Lexical);
        assert_eq!(merged[1].backend, Backend::Vector);
    }

    #[test]
    fn distinct_texts_from_both_backends_survive() {
        let lexical = vec![hit("a", 0.4, Backend::Lexical)];
        let vector = vec![hit("b", 0.6, Backend::Vector)];

        assert_eq!(merge_results(lexical, vector).len(), 2);
    }

    #[test]
    fn empty_inputs() {
        assert!(merge_results(vec![], vec![]).is_empty());
    }
}
