//! SQLite-backed Knowledge Store.
//!
//! # Storage layout
//!
//! Three tables are created (if they do not already exist):
//!
//! | table               | contents                                           |
//! |---------------------|----------------------------------------------------|
//! | `knowledge_entries` | question/answer pairs, tags as a JSON array        |
//! | `conversations`     | one row per answered question, plus feedback       |
//! | `learning_metrics`  | a single aggregate row (`id = 1`)                  |
//!
//! Timestamps are RFC-3339 text (UTC). Ids are `AUTOINCREMENT`, so a lower id
//! always means an older entry even after deletions.
//!
//! # Example
//!
//! ```rust
//! use kbchat_memory::{KnowledgeStore, SqliteStore};
//! use kbchat_types::KnowledgeEntry;
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//!
//! let mut entry = KnowledgeEntry::new("hi", "Hello!", "greeting", vec![], 0.9);
//! let id = store.save_entry(&mut entry).unwrap();
//!
//! assert_eq!(store.increment_usage(id).unwrap(), 1);
//! assert_eq!(store.list_all_entries().unwrap().len(), 1);
//! ```

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use kbchat_types::{ConversationRecord, KnowledgeEntry, LearningMetrics};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::store::{KnowledgeStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS knowledge_entries (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    question         TEXT    NOT NULL,
    answer           TEXT    NOT NULL,
    category         TEXT    NOT NULL DEFAULT '',
    tags             TEXT    NOT NULL DEFAULT '[]',
    confidence_score REAL    NOT NULL DEFAULT 0.0,
    usage_count      INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT    NOT NULL,
    updated_at       TEXT    NOT NULL
);
CREATE TABLE IF NOT EXISTS conversations (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       TEXT    NOT NULL DEFAULT '',
    session_id    TEXT    NOT NULL,
    question      TEXT    NOT NULL,
    answer        TEXT    NOT NULL,
    was_helpful   INTEGER,
    response_time REAL    NOT NULL DEFAULT 0.0,
    created_at    TEXT    NOT NULL
);
CREATE TABLE IF NOT EXISTS learning_metrics (
    id                    INTEGER PRIMARY KEY CHECK (id = 1),
    total_conversations   INTEGER NOT NULL,
    successful_responses  INTEGER NOT NULL,
    average_response_time REAL    NOT NULL,
    knowledge_base_size   INTEGER NOT NULL,
    last_updated          TEXT    NOT NULL
);";

const ENTRY_COLUMNS: &str =
    "id, question, answer, category, tags, confidence_score, usage_count, created_at, updated_at";

const CONVERSATION_COLUMNS: &str =
    "id, user_id, session_id, question, answer, was_helpful, response_time, created_at";

// ─────────────────────────────────────────────────────────────────────────────
// SqliteStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite implementation of [`KnowledgeStore`].
///
/// The connection sits behind a [`Mutex`] so a single store can be shared by
/// reference between request handlers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        debug!(path, "opening knowledge store");
        Self::with_connection(Connection::open(path)?)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl KnowledgeStore for SqliteStore {
    fn list_all_entries(&self) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM knowledge_entries ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_entry)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn list_ranked(&self, limit: usize) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM knowledge_entries
             ORDER BY confidence_score DESC, usage_count DESC, id ASC
             LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], row_to_entry)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_entry(&self, id: i64) -> Result<KnowledgeEntry, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM knowledge_entries WHERE id = ?1"),
            params![id],
            row_to_entry,
        )
        .optional()?
        .ok_or(StoreError::NotFound {
            kind: "knowledge entry",
            id,
        })
    }

    fn save_entry(&self, entry: &mut KnowledgeEntry) -> Result<i64, StoreError> {
        let tags = serde_json::to_string(&entry.tags)?;
        let conn = self.conn()?;
        match entry.id {
            Some(id) => {
                entry.updated_at = Utc::now();
                let changed = conn.execute(
                    "UPDATE knowledge_entries
                     SET question = ?1, answer = ?2, category = ?3, tags = ?4, updated_at = ?5
                     WHERE id = ?6",
                    params![
                        entry.question,
                        entry.answer,
                        entry.category,
                        tags,
                        entry.updated_at.to_rfc3339(),
                        id,
                    ],
                )?;
                if changed == 0 {
                    return Err(StoreError::NotFound {
                        kind: "knowledge entry",
                        id,
                    });
                }
                Ok(id)
            }
            None => {
                conn.execute(
                    "INSERT INTO knowledge_entries
                         (question, answer, category, tags, confidence_score,
                          usage_count, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        entry.question,
                        entry.answer,
                        entry.category,
                        tags,
                        entry.confidence_score,
                        to_sql_count(entry.usage_count),
                        entry.created_at.to_rfc3339(),
                        entry.updated_at.to_rfc3339(),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                entry.id = Some(id);
                Ok(id)
            }
        }
    }

    fn increment_usage(&self, id: i64) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: Option<i64> = conn
            .query_row(
                "UPDATE knowledge_entries
                 SET usage_count = usage_count + 1, updated_at = ?1
                 WHERE id = ?2
                 RETURNING usage_count",
                params![Utc::now().to_rfc3339(), id],
                |row| row.get(0),
            )
            .optional()?;
        count.map(from_sql_count).ok_or(StoreError::NotFound {
            kind: "knowledge entry",
            id,
        })
    }

    fn bump_confidence(&self, id: i64, delta: f64) -> Result<f64, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "UPDATE knowledge_entries
             SET confidence_score = MIN(1.0, MAX(0.0, confidence_score + ?1)),
                 updated_at = ?2
             WHERE id = ?3
             RETURNING confidence_score",
            params![delta, Utc::now().to_rfc3339(), id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(StoreError::NotFound {
            kind: "knowledge entry",
            id,
        })
    }

    fn delete_entry(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM knowledge_entries WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn clear_entries(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM knowledge_entries", [])?)
    }

    fn count_entries(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM knowledge_entries", [], |row| row.get(0))?;
        Ok(from_sql_count(count))
    }

    fn insert_conversation(&self, record: &mut ConversationRecord) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO conversations
                 (user_id, session_id, question, answer, was_helpful, response_time, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.user_id,
                record.session_id,
                record.question,
                record.answer,
                record.was_helpful,
                record.response_time,
                record.created_at.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        record.id = Some(id);
        Ok(id)
    }

    fn get_conversation(&self, id: i64) -> Result<Option<ConversationRecord>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id],
                row_to_conversation,
            )
            .optional()?)
    }

    fn set_feedback(&self, id: i64, was_helpful: bool) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE conversations SET was_helpful = ?1 WHERE id = ?2",
            params![was_helpful, id],
        )?;
        Ok(changed > 0)
    }

    fn refresh_metrics(&self, max_response_time: f64) -> Result<LearningMetrics, StoreError> {
        // The guard is held from the first read to the commit, so no other
        // caller on this store can log a conversation in between.
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let (total, within_budget, average): (i64, i64, f64) = tx.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN response_time <= ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(AVG(response_time), 0.0)
             FROM conversations",
            params![max_response_time],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let kb_size: i64 =
            tx.query_row("SELECT COUNT(*) FROM knowledge_entries", [], |row| row.get(0))?;
        let metrics = LearningMetrics {
            total_conversations: from_sql_count(total),
            successful_responses: from_sql_count(within_budget),
            average_response_time: average,
            knowledge_base_size: from_sql_count(kb_size),
            last_updated: Utc::now(),
        };
        tx.execute(
            "INSERT OR REPLACE INTO learning_metrics
                 (id, total_conversations, successful_responses, average_response_time,
                  knowledge_base_size, last_updated)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            params![
                total,
                within_budget,
                average,
                kb_size,
                metrics.last_updated.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(metrics)
    }

    fn load_metrics(&self) -> Result<Option<LearningMetrics>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT total_conversations, successful_responses, average_response_time,
                        knowledge_base_size, last_updated
                 FROM learning_metrics WHERE id = 1",
                [],
                |row| {
                    let last_updated: String = row.get(4)?;
                    Ok(LearningMetrics {
                        total_conversations: from_sql_count(row.get(0)?),
                        successful_responses: from_sql_count(row.get(1)?),
                        average_response_time: row.get(2)?,
                        knowledge_base_size: from_sql_count(row.get(3)?),
                        last_updated: parse_timestamp(4, &last_updated)?,
                    })
                },
            )
            .optional()?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping helpers
// ─────────────────────────────────────────────────────────────────────────────

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeEntry> {
    let tags_json: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(KnowledgeEntry {
        id: Some(row.get(0)?),
        question: row.get(1)?,
        answer: row.get(2)?,
        category: row.get(3)?,
        tags,
        confidence_score: row.get(5)?,
        usage_count: from_sql_count(row.get(6)?),
        created_at: parse_timestamp(7, &created_at)?,
        updated_at: parse_timestamp(8, &updated_at)?,
    })
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRecord> {
    let created_at: String = row.get(7)?;
    Ok(ConversationRecord {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        question: row.get(3)?,
        answer: row.get(4)?,
        was_helpful: row.get(5)?,
        response_time: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| rusqlite::Error::InvalidColumnType(idx, e.to_string(), Type::Text))
}

// SQLite integers are signed; counters never go negative.
fn from_sql_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn insert(store: &SqliteStore, question: &str, confidence: f64) -> i64 {
        let mut e = KnowledgeEntry::new(question, format!("answer to {question}"), "", vec![], confidence);
        store.save_entry(&mut e).unwrap()
    }

    // ── knowledge entries ────────────────────────────────────────────────────

    #[test]
    fn save_assigns_id_and_roundtrips_fields() {
        let store = make_store();
        let mut e = KnowledgeEntry::new(
            "What is E-Click?",
            "A software company.",
            "company",
            vec!["company".into(), "about".into()],
            0.7,
        );
        let id = store.save_entry(&mut e).unwrap();
        assert_eq!(e.id, Some(id));

        let loaded = store.get_entry(id).unwrap();
        assert_eq!(loaded.question, "What is E-Click?");
        assert_eq!(loaded.category, "company");
        assert_eq!(loaded.tags, vec!["company".to_string(), "about".to_string()]);
        assert!((loaded.confidence_score - 0.7).abs() < 1e-9);
        assert_eq!(loaded.usage_count, 0);
    }

    #[test]
    fn save_existing_entry_updates_in_place() {
        let store = make_store();
        let id = insert(&store, "pricing", 0.5);
        let mut e = store.get_entry(id).unwrap();
        e.answer = "new answer".into();
        e.tags = vec!["pricing".into()];
        store.save_entry(&mut e).unwrap();

        let all = store.list_all_entries().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].answer, "new answer");
        assert_eq!(all[0].tags, vec!["pricing".to_string()]);
    }

    #[test]
    fn save_existing_entry_leaves_counters_alone() {
        let store = make_store();
        let id = insert(&store, "pricing", 0.5);
        store.increment_usage(id).unwrap();
        let mut e = store.get_entry(id).unwrap();
        e.usage_count = 0;
        e.confidence_score = 0.0;
        store.save_entry(&mut e).unwrap();

        let loaded = store.get_entry(id).unwrap();
        assert_eq!(loaded.usage_count, 1);
        assert!((loaded.confidence_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn save_with_unknown_id_returns_not_found() {
        let store = make_store();
        let mut e = KnowledgeEntry::new("q", "a", "", vec![], 0.5);
        e.id = Some(99);
        let err = store.save_entry(&mut e).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 99, .. }));
    }

    #[test]
    fn list_all_entries_is_in_id_order() {
        let store = make_store();
        let a = insert(&store, "a", 0.1);
        let b = insert(&store, "b", 0.9);
        let ids: Vec<_> = store.list_all_entries().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![Some(a), Some(b)]);
    }

    #[test]
    fn list_ranked_orders_by_confidence_then_usage() {
        let store = make_store();
        let low = insert(&store, "low", 0.2);
        let high = insert(&store, "high", 0.9);
        let busy = insert(&store, "busy", 0.2);
        store.increment_usage(busy).unwrap();

        let ranked = store.list_ranked(10).unwrap();
        let ids: Vec<_> = ranked.iter().map(|e| e.id.unwrap()).collect();
        assert_eq!(ids, vec![high, busy, low]);

        assert_eq!(store.list_ranked(1).unwrap().len(), 1);
    }

    #[test]
    fn increment_usage_is_cumulative() {
        let store = make_store();
        let id = insert(&store, "hi", 0.9);
        assert_eq!(store.increment_usage(id).unwrap(), 1);
        assert_eq!(store.increment_usage(id).unwrap(), 2);
        assert_eq!(store.get_entry(id).unwrap().usage_count, 2);
    }

    #[test]
    fn increment_usage_unknown_id_returns_not_found() {
        let store = make_store();
        let err = store.increment_usage(42).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn bump_confidence_caps_at_one() {
        let store = make_store();
        let id = insert(&store, "hi", 0.85);
        let c = store.bump_confidence(id, 0.1).unwrap();
        assert!((c - 0.95).abs() < 1e-9);
        for _ in 0..5 {
            store.bump_confidence(id, 0.1).unwrap();
        }
        assert_eq!(store.get_entry(id).unwrap().confidence_score, 1.0);
    }

    #[test]
    fn delete_and_clear_entries() {
        let store = make_store();
        let a = insert(&store, "a", 0.5);
        insert(&store, "b", 0.5);
        insert(&store, "c", 0.5);

        assert!(store.delete_entry(a).unwrap());
        assert!(!store.delete_entry(a).unwrap());
        assert_eq!(store.count_entries().unwrap(), 2);

        assert_eq!(store.clear_entries().unwrap(), 2);
        assert_eq!(store.count_entries().unwrap(), 0);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let store = make_store();
        let a = insert(&store, "a", 0.5);
        store.delete_entry(a).unwrap();
        let b = insert(&store, "b", 0.5);
        assert!(b > a);
    }

    // ── conversations ────────────────────────────────────────────────────────

    #[test]
    fn insert_and_get_conversation() {
        let store = make_store();
        let mut rec = ConversationRecord::new("hi", "Hello!", Some("u1"), Some("s1"), 0.25);
        let id = store.insert_conversation(&mut rec).unwrap();
        assert_eq!(rec.id, Some(id));

        let loaded = store.get_conversation(id).unwrap().unwrap();
        assert_eq!(loaded.user_id, "u1");
        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.answer, "Hello!");
        assert!(loaded.was_helpful.is_none());
    }

    #[test]
    fn get_missing_conversation_is_none() {
        let store = make_store();
        assert!(store.get_conversation(5).unwrap().is_none());
    }

    #[test]
    fn set_feedback_updates_only_existing_rows() {
        let store = make_store();
        let mut rec = ConversationRecord::new("q", "a", None, None, 0.1);
        let id = store.insert_conversation(&mut rec).unwrap();

        assert!(store.set_feedback(id, true).unwrap());
        assert_eq!(store.get_conversation(id).unwrap().unwrap().was_helpful, Some(true));
        assert!(!store.set_feedback(id + 100, false).unwrap());
    }

    #[test]
    fn refresh_on_empty_log_stores_zeroes() {
        let store = make_store();
        assert!(store.load_metrics().unwrap().is_none());

        let m = store.refresh_metrics(2.0).unwrap();
        assert_eq!(m.total_conversations, 0);
        assert_eq!(m.successful_responses, 0);
        assert_eq!(m.average_response_time, 0.0);
        assert_eq!(store.load_metrics().unwrap(), Some(m));
    }

    #[test]
    fn refresh_buckets_by_response_time_and_counts_entries() {
        let store = make_store();
        insert(&store, "one", 0.5);
        insert(&store, "two", 0.5);
        for t in [0.5, 1.5, 2.0, 3.0] {
            let mut rec = ConversationRecord::new("q", "a", None, None, t);
            store.insert_conversation(&mut rec).unwrap();
        }
        let m = store.refresh_metrics(2.0).unwrap();
        assert_eq!(m.total_conversations, 4);
        assert_eq!(m.successful_responses, 3);
        assert!((m.average_response_time - 1.75).abs() < 1e-9);
        assert_eq!(m.knowledge_base_size, 2);
    }

    #[test]
    fn refresh_replaces_the_single_metrics_row() {
        let store = make_store();
        let mut rec = ConversationRecord::new("q", "a", None, None, 0.2);
        store.insert_conversation(&mut rec).unwrap();
        store.refresh_metrics(2.0).unwrap();

        let mut rec = ConversationRecord::new("q", "a", None, None, 0.4);
        store.insert_conversation(&mut rec).unwrap();
        let latest = store.refresh_metrics(2.0).unwrap();

        let loaded = store.load_metrics().unwrap().unwrap();
        assert_eq!(loaded.total_conversations, 2);
        assert_eq!(loaded, latest);
        let rows: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM learning_metrics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn concurrent_refreshes_leave_the_latest_totals() {
        let store = std::sync::Arc::new(make_store());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let mut rec = ConversationRecord::new("q", "a", None, None, 0.1);
                        store.insert_conversation(&mut rec).unwrap();
                        store.refresh_metrics(2.0).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stored = store.load_metrics().unwrap().unwrap();
        assert_eq!(stored.total_conversations, 100);
        assert_eq!(stored.successful_responses, 100);
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.sqlite3");
        let path = path.to_string_lossy();
        {
            let store = SqliteStore::open(&path).unwrap();
            insert(&store, "persisted", 0.7);
        }
        let store = SqliteStore::open(&path).unwrap();
        let all = store.list_all_entries().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].question, "persisted");
    }
}
