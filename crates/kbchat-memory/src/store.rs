//! [`KnowledgeStore`] – storage seam for the responder.
//!
//! The responder never talks to SQLite directly; it only needs the
//! operations below. Counter updates (`increment_usage`, `bump_confidence`)
//! and the metrics recomputation (`refresh_metrics`) are expressed as single
//! atomic operations so concurrent callers cannot lose increments or publish
//! a stale snapshot over a newer one.

use kbchat_types::{ConversationRecord, KbError, KnowledgeEntry, LearningMetrics};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from knowledge store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Seed file parse error: {0}")]
    SeedParse(#[from] toml::de::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
    #[error("Store lock poisoned")]
    Poisoned,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for KbError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => KbError::NotFound { kind, id },
            StoreError::SeedParse(e) => KbError::Seed(e.to_string()),
            StoreError::Io(e) => KbError::Seed(e.to_string()),
            other => KbError::Storage(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KnowledgeStore
// ─────────────────────────────────────────────────────────────────────────────

/// Persistence operations required by the knowledge-base responder.
pub trait KnowledgeStore: Send + Sync {
    /// Every knowledge entry in ascending id order.
    fn list_all_entries(&self) -> Result<Vec<KnowledgeEntry>, StoreError>;

    /// Up to `limit` entries ordered by confidence then usage (highest first).
    fn list_ranked(&self, limit: usize) -> Result<Vec<KnowledgeEntry>, StoreError>;

    fn get_entry(&self, id: i64) -> Result<KnowledgeEntry, StoreError>;

    /// Insert `entry` when it has no id, otherwise overwrite the stored row's
    /// question, answer, category and tags.
    ///
    /// On insert the assigned id is written back into `entry`. Updates never
    /// touch `usage_count` or `confidence_score`; those only move through
    /// [`increment_usage`](Self::increment_usage) and
    /// [`bump_confidence`](Self::bump_confidence).
    fn save_entry(&self, entry: &mut KnowledgeEntry) -> Result<i64, StoreError>;

    /// Atomically add one to an entry's usage count and return the new value.
    fn increment_usage(&self, id: i64) -> Result<u64, StoreError>;

    /// Atomically raise an entry's confidence by `delta`, capped at `1.0`.
    /// Returns the new confidence.
    fn bump_confidence(&self, id: i64, delta: f64) -> Result<f64, StoreError>;

    /// Returns `true` if a row was removed.
    fn delete_entry(&self, id: i64) -> Result<bool, StoreError>;

    /// Remove every knowledge entry, returning how many were removed.
    fn clear_entries(&self) -> Result<usize, StoreError>;

    fn count_entries(&self) -> Result<u64, StoreError>;

    /// Append a conversation to the log. The assigned id is written back.
    fn insert_conversation(&self, record: &mut ConversationRecord) -> Result<i64, StoreError>;

    fn get_conversation(&self, id: i64) -> Result<Option<ConversationRecord>, StoreError>;

    /// Record user feedback. Returns `false` if no such conversation exists.
    fn set_feedback(&self, id: i64, was_helpful: bool) -> Result<bool, StoreError>;

    /// Recompute the singleton metrics row from the conversation log and the
    /// knowledge base, store it, and return what was stored.
    ///
    /// Reading the log and writing the row happen as one atomic step: the
    /// stored row always reflects every conversation committed before it.
    fn refresh_metrics(&self, max_response_time: f64) -> Result<LearningMetrics, StoreError>;

    fn load_metrics(&self) -> Result<Option<LearningMetrics>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_kb_not_found() {
        let err: KbError = StoreError::NotFound { kind: "knowledge entry", id: 3 }.into();
        assert!(matches!(err, KbError::NotFound { id: 3, .. }));
    }

    #[test]
    fn seed_parse_maps_to_kb_seed() {
        let parse_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: KbError = StoreError::SeedParse(parse_err).into();
        assert!(matches!(err, KbError::Seed(_)));
    }

    #[test]
    fn other_errors_map_to_storage() {
        let err: KbError = StoreError::Unavailable("offline".into()).into();
        match err {
            KbError::Storage(msg) => assert!(msg.contains("offline")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
