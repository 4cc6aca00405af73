use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored question/answer pair together with the metadata the matcher
/// uses to rank it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Store-assigned identifier. `None` until the entry has been saved.
    pub id: Option<i64>,
    pub question: String,
    pub answer: String,
    /// Short grouping label (e.g. `"pricing"`). Empty when unset.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Trust in this answer, always within `[0.0, 1.0]`.
    pub confidence_score: f64,
    /// Number of times this entry answered a question. Never decreases.
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    /// Build an unsaved entry with zero usage. `confidence_score` is clamped
    /// to `[0, 1]`.
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        category: impl Into<String>,
        tags: Vec<String>,
        confidence_score: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            question: question.into(),
            answer: answer.into(),
            category: category.into(),
            tags,
            confidence_score: clamp_confidence(confidence_score),
            usage_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Clamp a confidence value into the unit interval. NaN maps to `0.0`.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// One question/answer exchange handled by the responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: Option<i64>,
    /// Empty for anonymous callers.
    pub user_id: String,
    pub session_id: String,
    pub question: String,
    pub answer: String,
    /// User feedback, `None` until feedback arrives.
    pub was_helpful: Option<bool>,
    /// Seconds spent producing the answer.
    pub response_time: f64,
    pub created_at: DateTime<Utc>,
}

/// Session label used when the caller does not supply one.
pub const ANONYMOUS_SESSION: &str = "anonymous";

impl ConversationRecord {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        user_id: Option<&str>,
        session_id: Option<&str>,
        response_time: f64,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.unwrap_or_default().to_string(),
            session_id: session_id
                .filter(|s| !s.is_empty())
                .unwrap_or(ANONYMOUS_SESSION)
                .to_string(),
            question: question.into(),
            answer: answer.into(),
            was_helpful: None,
            response_time,
            created_at: Utc::now(),
        }
    }
}

/// Aggregate counters over every recorded conversation.
///
/// A single row of this exists per store; it is recomputed after each
/// conversation is logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub total_conversations: u64,
    /// Conversations answered within the response-time budget.
    pub successful_responses: u64,
    pub average_response_time: f64,
    pub knowledge_base_size: u64,
    pub last_updated: DateTime<Utc>,
}

/// Read-side view of [`LearningMetrics`] for reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub total_conversations: u64,
    pub successful_responses: u64,
    /// Percentage of successful responses, `0.0` when nothing was recorded.
    pub success_rate: f64,
    /// Rounded to two decimals.
    pub average_response_time: f64,
    pub knowledge_base_size: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<Option<LearningMetrics>> for LearningStats {
    fn from(metrics: Option<LearningMetrics>) -> Self {
        let Some(m) = metrics else {
            return Self::default();
        };
        let success_rate = if m.total_conversations > 0 {
            m.successful_responses as f64 / m.total_conversations as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_conversations: m.total_conversations,
            successful_responses: m.successful_responses,
            success_rate,
            average_response_time: (m.average_response_time * 100.0).round() / 100.0,
            knowledge_base_size: m.knowledge_base_size,
            last_updated: Some(m.last_updated),
        }
    }
}

/// Workspace-wide error type for knowledge-base operations.
#[derive(Error, Debug)]
pub enum KbError {
    #[error("Knowledge store unavailable: {0}")]
    Storage(String),

    #[error("Invalid seed data: {0}")]
    Seed(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_clamps_confidence() {
        let e = KnowledgeEntry::new("q", "a", "", vec![], 1.7);
        assert_eq!(e.confidence_score, 1.0);
        let e = KnowledgeEntry::new("q", "a", "", vec![], -0.2);
        assert_eq!(e.confidence_score, 0.0);
        assert!(e.id.is_none());
        assert_eq!(e.usage_count, 0);
    }

    #[test]
    fn clamp_confidence_maps_nan_to_zero() {
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn conversation_defaults_to_anonymous_session() {
        let c = ConversationRecord::new("q", "a", None, None, 0.01);
        assert_eq!(c.session_id, ANONYMOUS_SESSION);
        assert_eq!(c.user_id, "");
        assert!(c.was_helpful.is_none());

        let c = ConversationRecord::new("q", "a", Some("u1"), Some(""), 0.01);
        assert_eq!(c.session_id, ANONYMOUS_SESSION);
        assert_eq!(c.user_id, "u1");
    }

    #[test]
    fn stats_without_metrics_are_zeroed() {
        let stats = LearningStats::from(None);
        assert_eq!(stats.total_conversations, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.last_updated.is_none());
    }

    #[test]
    fn stats_compute_success_rate_and_round_time() {
        let stats = LearningStats::from(Some(LearningMetrics {
            total_conversations: 4,
            successful_responses: 3,
            average_response_time: 0.123456,
            knowledge_base_size: 10,
            last_updated: Utc::now(),
        }));
        assert!((stats.success_rate - 75.0).abs() < 1e-9);
        assert!((stats.average_response_time - 0.12).abs() < 1e-9);
        assert_eq!(stats.knowledge_base_size, 10);
        assert!(stats.last_updated.is_some());
    }

    #[test]
    fn knowledge_entry_serialization_roundtrip() {
        let e = KnowledgeEntry::new("hi", "Hello!", "greeting", vec!["hi".into()], 0.9);
        let json = serde_json::to_string(&e).unwrap();
        let back: KnowledgeEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(e, back);
    }

    #[test]
    fn kb_error_display() {
        let err = KbError::NotFound { kind: "conversation", id: 7 };
        assert_eq!(err.to_string(), "conversation 7 not found");
        assert!(KbError::Storage("disk".into()).to_string().contains("unavailable"));
    }
}
