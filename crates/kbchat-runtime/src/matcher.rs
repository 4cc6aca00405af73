//! Knowledge-base matcher.
//!
//! Scores a normalised question against every stored question and returns
//! the best entry. The raw [`similarity::ratio`] is boosted by how often the
//! entry has been used and how much it is trusted:
//!
//! ```text
//! boosted = similarity × (1 + usage_count × usage_weight)
//!                      × (1 + confidence_score × confidence_weight)
//! ```
//!
//! The scan is linear over every entry with no early exit. Only a strictly
//! greater score replaces the running best, so on ties the entry seen first
//! wins; stores list entries in ascending id order, which makes the oldest
//! entry the tie-breaker.

use kbchat_types::KnowledgeEntry;

use crate::normalize::normalize;
use crate::similarity;

/// Multiplier applied per recorded use.
pub const USAGE_WEIGHT: f64 = 0.1;
/// Multiplier applied to the entry's confidence score.
pub const CONFIDENCE_WEIGHT: f64 = 0.2;

/// Weights used to turn raw similarity into a boosted score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostWeights {
    pub usage: f64,
    pub confidence: f64,
}

impl Default for BoostWeights {
    fn default() -> Self {
        Self {
            usage: USAGE_WEIGHT,
            confidence: CONFIDENCE_WEIGHT,
        }
    }
}

impl BoostWeights {
    pub fn boost(&self, similarity: f64, entry: &KnowledgeEntry) -> f64 {
        similarity
            * (1.0 + entry.usage_count as f64 * self.usage)
            * (1.0 + entry.confidence_score * self.confidence)
    }
}

/// The best-scoring entry for a question.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub entry: &'a KnowledgeEntry,
    /// Unboosted similarity of the normalised questions.
    pub similarity: f64,
    pub score: f64,
}

/// Find the entry whose boosted score against `normalized_question` is
/// highest. Returns `None` only when `entries` is empty.
pub fn find_best_match<'a>(
    normalized_question: &str,
    entries: &'a [KnowledgeEntry],
    weights: &BoostWeights,
) -> Option<Match<'a>> {
    let mut best: Option<Match<'a>> = None;
    for entry in entries {
        let similarity = similarity::ratio(normalized_question, &normalize(&entry.question));
        let score = weights.boost(similarity, entry);
        if best.is_none_or(|b| score > b.score) {
            best = Some(Match {
                entry,
                similarity,
                score,
            });
        }
    }
    best
}

/// Every entry whose unboosted similarity to `normalized_question` is
/// strictly greater than `threshold`, in store order.
pub fn similar_entries<'a>(
    normalized_question: &str,
    entries: &'a [KnowledgeEntry],
    threshold: f64,
) -> Vec<(&'a KnowledgeEntry, f64)> {
    entries
        .iter()
        .map(|e| (e, similarity::ratio(normalized_question, &normalize(&e.question))))
        .filter(|(_, s)| *s > threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, question: &str, confidence: f64, usage: u64) -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new(question, format!("answer {id}"), "", vec![], confidence);
        e.id = Some(id);
        e.usage_count = usage;
        e
    }

    #[test]
    fn empty_collection_has_no_match() {
        assert!(find_best_match("hello", &[], &BoostWeights::default()).is_none());
    }

    #[test]
    fn verbatim_question_has_similarity_one() {
        let entries = vec![entry(1, "What services do you offer?", 0.7, 0)];
        let m = find_best_match(
            &normalize("What services do you offer?"),
            &entries,
            &BoostWeights::default(),
        )
        .unwrap();
        assert_eq!(m.similarity, 1.0);
        assert!((m.score - 1.14).abs() < 1e-9);
    }

    #[test]
    fn case_and_punctuation_do_not_matter() {
        let entries = vec![entry(1, "hi", 0.9, 0)];
        let m = find_best_match(&normalize("Hi!"), &entries, &BoostWeights::default()).unwrap();
        assert_eq!(m.similarity, 1.0);
        assert_eq!(m.entry.id, Some(1));
    }

    #[test]
    fn usage_boost_outranks_similar_text() {
        let entries = vec![entry(1, "pricing", 0.5, 100), entry(2, "princess", 0.5, 0)];
        let m = find_best_match("pricing", &entries, &BoostWeights::default()).unwrap();
        assert_eq!(m.entry.id, Some(1));
        assert!((m.score - 12.1).abs() < 1e-9);
    }

    #[test]
    fn usage_boost_can_beat_a_better_textual_match() {
        // "prices" is closer textually to "price" than "pricing", but the
        // heavily used entry still wins.
        let entries = vec![entry(1, "prices", 0.5, 0), entry(2, "pricing", 0.5, 50)];
        let m = find_best_match("price", &entries, &BoostWeights::default()).unwrap();
        assert_eq!(m.entry.id, Some(2));
    }

    #[test]
    fn ties_go_to_the_first_entry() {
        let entries = vec![entry(3, "hello", 0.5, 0), entry(4, "hello", 0.5, 0)];
        let m = find_best_match("hello", &entries, &BoostWeights::default()).unwrap();
        assert_eq!(m.entry.id, Some(3));
    }

    #[test]
    fn zero_similarity_still_returns_first_entry() {
        let entries = vec![entry(1, "abc", 0.5, 0), entry(2, "def", 0.5, 0)];
        let m = find_best_match("xyz", &entries, &BoostWeights::default()).unwrap();
        assert_eq!(m.entry.id, Some(1));
        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn stored_questions_are_normalised_before_scoring() {
        let entries = vec![entry(1, "  HOW can I   Contact you?? ", 0.0, 0)];
        let m = find_best_match("how can i contact you", &entries, &BoostWeights::default())
            .unwrap();
        assert_eq!(m.similarity, 1.0);
    }

    #[test]
    fn custom_weights_change_the_score() {
        let e = entry(1, "hi", 1.0, 10);
        let none = BoostWeights { usage: 0.0, confidence: 0.0 };
        assert_eq!(none.boost(0.5, &e), 0.5);
        let defaults = BoostWeights::default();
        assert!((defaults.boost(0.5, &e) - 0.5 * 2.0 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn similar_entries_filters_by_raw_similarity() {
        let entries = vec![
            entry(1, "what services do you offer", 0.5, 1000),
            entry(2, "what services do you provide", 0.5, 0),
            entry(3, "contact details", 0.5, 0),
        ];
        let hits = similar_entries("what services do you offer", &entries, 0.7);
        let ids: Vec<_> = hits.iter().map(|(e, _)| e.id.unwrap()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(hits[0].1, 1.0);
    }
}
