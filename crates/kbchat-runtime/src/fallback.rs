//! Canned replies for questions the knowledge base cannot answer.
//!
//! The reply is picked by hashing the raw question with SHA-256 and reducing
//! the whole digest modulo the number of templates, so a given question
//! always receives the same reply.

use sha2::{Digest, Sha256};

/// Default "contact us" replies used when nothing in the knowledge base
/// scores above the confidence threshold.
pub const DEFAULT_FALLBACK_RESPONSES: [&str; 5] = [
    "I don't have specific information about that right now. For detailed assistance, please contact our team at info@eclick.co.za or call +27 76 740 1777.",
    "That's a great question! For personalized answers, I recommend reaching out to our team directly at info@eclick.co.za or +27 76 740 1777.",
    "I'd like to give you the most accurate information. Please contact our team at info@eclick.co.za or call +27 76 740 1777, and they'll be happy to help!",
    "For specific details about that, our team can provide the best assistance. Reach us at info@eclick.co.za or +27 76 740 1777.",
    "I want to make sure you get the right information. Please contact our team at info@eclick.co.za or call +27 76 740 1777 for detailed assistance.",
];

/// Reply returned when the responder itself fails.
pub const APOLOGY_RESPONSE: &str =
    "I'm having trouble right now, but I'm here to help! Please try again.";

/// Stable index in `0..count` derived from `question`.
///
/// Returns `0` when `count` is `0`.
pub fn fallback_index(question: &str, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    let digest = Sha256::digest(question.as_bytes());
    // Big-endian digest value mod count, one byte at a time.
    let modulus = count as u128;
    let rem = digest
        .iter()
        .fold(0u128, |acc, &byte| (acc * 256 + byte as u128) % modulus);
    rem as usize
}

/// Pick the reply for `question` from `templates`.
///
/// Falls back to [`APOLOGY_RESPONSE`] if `templates` is empty.
pub fn select<'a, S: AsRef<str>>(question: &str, templates: &'a [S]) -> &'a str {
    templates
        .get(fallback_index(question, templates.len()))
        .map(|s| s.as_ref())
        .unwrap_or(APOLOGY_RESPONSE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_question_same_reply() {
        let a = select("anything", &DEFAULT_FALLBACK_RESPONSES);
        let b = select("anything", &DEFAULT_FALLBACK_RESPONSES);
        assert_eq!(a, b);
        assert!(DEFAULT_FALLBACK_RESPONSES.contains(&a));
    }

    #[test]
    fn index_is_within_bounds() {
        for q in ["", "a", "What is the meaning of life?", "ünïcödé"] {
            for n in 1..10 {
                assert!(fallback_index(q, n) < n);
            }
        }
    }

    #[test]
    fn single_template_always_selected() {
        assert_eq!(fallback_index("whatever", 1), 0);
        assert_eq!(select("whatever", &["only"]), "only");
    }

    #[test]
    fn hash_is_over_raw_text() {
        // Case is significant for selection even though matching ignores it.
        let lower = fallback_index("hello there", 1_000_003);
        let upper = fallback_index("HELLO THERE", 1_000_003);
        assert_ne!(lower, upper);
    }

    #[test]
    fn empty_templates_fall_back_to_apology() {
        let none: [&str; 0] = [];
        assert_eq!(select("q", &none), APOLOGY_RESPONSE);
        assert_eq!(fallback_index("q", 0), 0);
    }

    #[test]
    fn questions_spread_across_templates() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            seen.insert(fallback_index(&format!("question {i}"), 5));
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn works_with_owned_templates() {
        let owned: Vec<String> = DEFAULT_FALLBACK_RESPONSES.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            select("pricing?", &owned),
            select("pricing?", &DEFAULT_FALLBACK_RESPONSES)
        );
    }
}
