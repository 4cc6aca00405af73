//! [`KnowledgeService`] – the knowledge-base responder.
//!
//! Answers questions from the knowledge store, falls back to canned replies
//! when nothing matches well enough, logs every exchange, and learns from
//! ingestion and user feedback.
//!
//! # Failure contract
//!
//! Every operation returns `Result<_, KbError>` internally.
//! [`KnowledgeService::get_response`] is the one place that never fails: any
//! error becomes [`APOLOGY_RESPONSE`] with [`FAILURE_CONFIDENCE`], and
//! failures while logging the conversation or refreshing metrics are only
//! reported through `tracing`.
//!
//! # Example
//!
//! ```rust
//! use kbchat_memory::SqliteStore;
//! use kbchat_runtime::service::{KnowledgeService, ResponseSource};
//!
//! let service = KnowledgeService::new(SqliteStore::open_in_memory().unwrap());
//! service.add_knowledge("hi", "Hello!", "greeting", &[]).unwrap();
//!
//! let reply = service.get_response("Hi", None, None);
//! assert_eq!(reply.answer, "Hello!");
//! assert!(matches!(reply.source, ResponseSource::Matched { .. }));
//! ```

use std::time::Instant;

use kbchat_memory::{KnowledgeStore, SeedFile};
use kbchat_types::{ConversationRecord, KbError, KnowledgeEntry, LearningMetrics, LearningStats};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::fallback::{self, APOLOGY_RESPONSE, DEFAULT_FALLBACK_RESPONSES};
use crate::matcher::{self, BoostWeights};
use crate::normalize::normalize;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Boosted score an entry needs before its answer is returned.
pub const MIN_CONFIDENCE_THRESHOLD: f64 = 0.6;
/// Responses at or under this many seconds count as successful in metrics.
pub const MAX_RESPONSE_TIME: f64 = 2.0;
/// Boosted score above which `add_knowledge` updates instead of inserting.
pub const DUPLICATE_THRESHOLD: f64 = 0.8;
/// Raw similarity above which helpful feedback raises an entry's confidence.
pub const FEEDBACK_SIMILARITY_THRESHOLD: f64 = 0.7;
/// Confidence given to newly added knowledge.
pub const INITIAL_CONFIDENCE: f64 = 0.7;
/// Confidence added per upsert or helpful feedback.
pub const CONFIDENCE_STEP: f64 = 0.1;
/// Confidence reported with a fallback reply.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;
/// Confidence reported with the apology reply.
pub const FAILURE_CONFIDENCE: f64 = 0.1;

/// Starter knowledge loaded by [`KnowledgeService::initialize_knowledge_base`]:
/// `(question, answer, category, tags)`.
const STARTER_KNOWLEDGE: [(&str, &str, &str, &[&str]); 3] = [
    (
        "What services do you offer?",
        "We offer custom web development, mobile apps, cloud solutions, and AI consulting. How can I help you with your project?",
        "services",
        &["services", "web development", "mobile apps"],
    ),
    (
        "How can I contact you?",
        "You can reach us through our contact form, email at info@eclick.co.za, or by phone. I'm here to help answer any questions!",
        "contact",
        &["contact", "email", "phone"],
    ),
    (
        "What is E-Click?",
        "E-Click is a software development company specializing in custom solutions. We help businesses transform their ideas into powerful digital experiences.",
        "company",
        &["company", "about", "software development"],
    ),
];

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for [`KnowledgeService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResponderConfig {
    pub min_confidence_threshold: f64,
    pub max_response_time: f64,
    pub duplicate_threshold: f64,
    pub feedback_similarity_threshold: f64,
    pub initial_confidence: f64,
    pub confidence_step: f64,
    pub fallback_confidence: f64,
    pub failure_confidence: f64,
    pub weights: BoostWeights,
    /// Replies chosen from when nothing matches. Must not be empty for the
    /// fallback path to be meaningful; an empty list yields the apology.
    pub fallback_responses: Vec<String>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            min_confidence_threshold: MIN_CONFIDENCE_THRESHOLD,
            max_response_time: MAX_RESPONSE_TIME,
            duplicate_threshold: DUPLICATE_THRESHOLD,
            feedback_similarity_threshold: FEEDBACK_SIMILARITY_THRESHOLD,
            initial_confidence: INITIAL_CONFIDENCE,
            confidence_step: CONFIDENCE_STEP,
            fallback_confidence: FALLBACK_CONFIDENCE,
            failure_confidence: FAILURE_CONFIDENCE,
            weights: BoostWeights::default(),
            fallback_responses: DEFAULT_FALLBACK_RESPONSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseSource {
    /// A knowledge entry scored above the threshold.
    Matched { entry_id: i64 },
    /// Nothing scored high enough; a canned reply was chosen.
    Fallback,
    /// The responder failed and returned the apology.
    Failure,
}

/// Reply to a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    /// Boosted match score, or the fixed fallback/failure confidence.
    pub confidence: f64,
    /// Seconds taken to produce the answer.
    pub response_time: f64,
    pub source: ResponseSource,
    /// Id of the logged conversation, usable for feedback. `None` when the
    /// exchange could not be logged.
    pub conversation_id: Option<i64>,
}

/// What [`KnowledgeService::add_knowledge`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddOutcome {
    Inserted { id: i64 },
    /// An existing entry matched with `score` above the duplicate threshold.
    Updated { id: i64, score: f64 },
}

impl AddOutcome {
    pub fn id(&self) -> i64 {
        match self {
            AddOutcome::Inserted { id } | AddOutcome::Updated { id, .. } => *id,
        }
    }
}

/// What [`KnowledgeService::learn_from_feedback`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// Feedback stored; `boosted` entries had their confidence raised.
    Recorded { boosted: usize },
    UnknownConversation,
}

/// Counts from [`KnowledgeService::import_seed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// KnowledgeService
// ─────────────────────────────────────────────────────────────────────────────

/// The knowledge-base responder.
///
/// Construct once at startup and share by reference; all methods take
/// `&self` and the store handles its own synchronisation.
pub struct KnowledgeService<S> {
    store: S,
    config: ResponderConfig,
}

impl<S: KnowledgeStore> KnowledgeService<S> {
    /// Create a service with the default [`ResponderConfig`].
    pub fn new(store: S) -> Self {
        Self::with_config(store, ResponderConfig::default())
    }

    pub fn with_config(store: S, config: ResponderConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    // ── Answering ────────────────────────────────────────────────────────────

    /// Answer `question`, log the exchange, and refresh the metrics.
    ///
    /// Never fails: storage errors produce the apology reply.
    pub fn get_response(
        &self,
        question: &str,
        user_id: Option<&str>,
        session_id: Option<&str>,
    ) -> ChatResponse {
        let started = Instant::now();
        match self.answer(question) {
            Ok((answer, confidence, source)) => {
                let response_time = started.elapsed().as_secs_f64();
                let conversation_id =
                    self.record_conversation(question, &answer, user_id, session_id, response_time);
                ChatResponse {
                    answer,
                    confidence,
                    response_time,
                    source,
                    conversation_id,
                }
            }
            Err(e) => {
                warn!(error = %e, "responder failed; returning apology");
                ChatResponse {
                    answer: APOLOGY_RESPONSE.to_string(),
                    confidence: self.config.failure_confidence,
                    response_time: started.elapsed().as_secs_f64(),
                    source: ResponseSource::Failure,
                    conversation_id: None,
                }
            }
        }
    }

    fn answer(&self, question: &str) -> Result<(String, f64, ResponseSource), KbError> {
        let normalized = normalize(question);
        let entries = self.store.list_all_entries()?;
        match matcher::find_best_match(&normalized, &entries, &self.config.weights) {
            Some(m) if m.score >= self.config.min_confidence_threshold => {
                let id = stored_id(m.entry)?;
                let usage = self.store.increment_usage(id)?;
                info!(entry_id = id, score = m.score, usage, "answered from knowledge base");
                Ok((m.entry.answer.clone(), m.score, ResponseSource::Matched { entry_id: id }))
            }
            best => {
                debug!(
                    best_score = ?best.map(|m| m.score),
                    threshold = self.config.min_confidence_threshold,
                    "no entry above threshold; using fallback"
                );
                let reply = fallback::select(question, &self.config.fallback_responses);
                Ok((reply.to_string(), self.config.fallback_confidence, ResponseSource::Fallback))
            }
        }
    }

    /// Store the exchange and refresh metrics. Failures are logged, never
    /// returned.
    fn record_conversation(
        &self,
        question: &str,
        answer: &str,
        user_id: Option<&str>,
        session_id: Option<&str>,
        response_time: f64,
    ) -> Option<i64> {
        let mut record = ConversationRecord::new(question, answer, user_id, session_id, response_time);
        let id = match self.store.insert_conversation(&mut record) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "failed to store conversation");
                return None;
            }
        };
        if let Err(e) = self.refresh_metrics() {
            warn!(error = %e, "failed to refresh learning metrics");
        }
        Some(id)
    }

    /// Recompute the metrics aggregate from the conversation log and persist
    /// it.
    ///
    /// The store performs the read and the write as one step, so concurrent
    /// callers cannot overwrite a newer snapshot with an older one.
    pub fn refresh_metrics(&self) -> Result<LearningMetrics, KbError> {
        Ok(self.store.refresh_metrics(self.config.max_response_time)?)
    }

    pub fn learning_stats(&self) -> Result<LearningStats, KbError> {
        Ok(LearningStats::from(self.store.load_metrics()?))
    }

    // ── Learning ─────────────────────────────────────────────────────────────

    /// Upsert by similarity.
    ///
    /// If the best existing entry scores above the duplicate threshold its
    /// answer is replaced (category and tags too, when non-empty), its
    /// confidence rises by one step and its usage by one. Otherwise a new
    /// entry is inserted at the initial confidence.
    pub fn add_knowledge(
        &self,
        question: &str,
        answer: &str,
        category: &str,
        tags: &[String],
    ) -> Result<AddOutcome, KbError> {
        let normalized = normalize(question);
        let entries = self.store.list_all_entries()?;
        let duplicate = matcher::find_best_match(&normalized, &entries, &self.config.weights)
            .filter(|m| m.score > self.config.duplicate_threshold);

        if let Some(m) = duplicate {
            let id = stored_id(m.entry)?;
            let mut entry = m.entry.clone();
            entry.answer = answer.to_string();
            if !category.is_empty() {
                entry.category = category.to_string();
            }
            if !tags.is_empty() {
                entry.tags = tags.to_vec();
            }
            self.store.save_entry(&mut entry)?;
            self.store.bump_confidence(id, self.config.confidence_step)?;
            self.store.increment_usage(id)?;
            info!(entry_id = id, score = m.score, "updated existing knowledge");
            return Ok(AddOutcome::Updated { id, score: m.score });
        }

        let mut entry = KnowledgeEntry::new(
            question,
            answer,
            category,
            tags.to_vec(),
            self.config.initial_confidence,
        );
        let id = self.store.save_entry(&mut entry)?;
        info!(entry_id = id, "added new knowledge");
        Ok(AddOutcome::Inserted { id })
    }

    /// Record feedback on a logged conversation.
    ///
    /// Helpful feedback raises the confidence of every entry whose raw
    /// similarity to the conversation's question exceeds the feedback
    /// threshold.
    pub fn learn_from_feedback(
        &self,
        conversation_id: i64,
        was_helpful: bool,
    ) -> Result<FeedbackOutcome, KbError> {
        let Some(record) = self.store.get_conversation(conversation_id)? else {
            debug!(conversation_id, "feedback for unknown conversation ignored");
            return Ok(FeedbackOutcome::UnknownConversation);
        };
        self.store.set_feedback(conversation_id, was_helpful)?;
        if !was_helpful {
            return Ok(FeedbackOutcome::Recorded { boosted: 0 });
        }

        let normalized = normalize(&record.question);
        let entries = self.store.list_all_entries()?;
        let mut boosted = 0;
        for (entry, similarity) in matcher::similar_entries(
            &normalized,
            &entries,
            self.config.feedback_similarity_threshold,
        ) {
            let id = stored_id(entry)?;
            let confidence = self.store.bump_confidence(id, self.config.confidence_step)?;
            debug!(entry_id = id, similarity, confidence, "confidence raised by feedback");
            boosted += 1;
        }
        info!(conversation_id, boosted, "helpful feedback recorded");
        Ok(FeedbackOutcome::Recorded { boosted })
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// Add the built-in starter entries through [`add_knowledge`](Self::add_knowledge).
    /// Returns how many entries were processed.
    pub fn initialize_knowledge_base(&self) -> Result<usize, KbError> {
        for (question, answer, category, tags) in STARTER_KNOWLEDGE {
            let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
            self.add_knowledge(question, answer, category, &tags)?;
        }
        Ok(STARTER_KNOWLEDGE.len())
    }

    /// Merge a seed file into the knowledge base through
    /// [`add_knowledge`](Self::add_knowledge).
    pub fn import_seed(&self, seed: &SeedFile) -> Result<ImportSummary, KbError> {
        let mut summary = ImportSummary::default();
        for item in &seed.entries {
            match self.add_knowledge(&item.question, &item.answer, &item.category, &item.tags)? {
                AddOutcome::Inserted { .. } => summary.inserted += 1,
                AddOutcome::Updated { .. } => summary.updated += 1,
            }
        }
        info!(inserted = summary.inserted, updated = summary.updated, "seed imported");
        Ok(summary)
    }

    /// Replace the whole knowledge base with the seed file's entries,
    /// stored verbatim with their declared confidence.
    pub fn sync_seed(&self, seed: &SeedFile) -> Result<usize, KbError> {
        let removed = self.store.clear_entries()?;
        warn!(removed, "cleared knowledge base for sync");
        for item in &seed.entries {
            let mut entry = item.to_entry(self.config.initial_confidence);
            self.store.save_entry(&mut entry)?;
        }
        info!(added = seed.len(), "knowledge base synchronised");
        Ok(seed.len())
    }

    /// Up to `limit` entries, most trusted first.
    pub fn list_entries(&self, limit: usize) -> Result<Vec<KnowledgeEntry>, KbError> {
        Ok(self.store.list_ranked(limit)?)
    }

    /// Remove a single entry. Returns `false` if it did not exist.
    pub fn delete_entry(&self, id: i64) -> Result<bool, KbError> {
        let removed = self.store.delete_entry(id)?;
        if removed {
            info!(entry_id = id, "knowledge entry deleted");
        }
        Ok(removed)
    }
}

fn stored_id(entry: &KnowledgeEntry) -> Result<i64, KbError> {
    entry
        .id
        .ok_or_else(|| KbError::Storage("store returned an entry without an id".to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
