//! `kbchat-runtime` – the knowledge-base responder.
//!
//! Turns a question into an answer using the knowledge store, and feeds
//! conversations and feedback back into the store.
//!
//! # Modules
//!
//! - [`normalize`] – lowercase, strip punctuation, collapse whitespace.
//! - [`similarity`] – [`ratio`][similarity::ratio]: Ratcliff/Obershelp
//!   similarity of two strings in `[0, 1]`.
//! - [`matcher`] – [`find_best_match`][matcher::find_best_match]: scores
//!   every entry with similarity boosted by usage and confidence.
//! - [`fallback`] – deterministic canned replies for unanswerable questions.
//! - [`service`] – [`KnowledgeService`]: answering, conversation logging,
//!   metrics, upsert ingestion, feedback learning and seed maintenance.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP export.
//!
//! # Flow of a question
//!
//! ```text
//! question ─► normalize ─► matcher (all entries) ─► score ≥ threshold?
//!                                                     │yes        │no
//!                                          entry answer,    fallback reply,
//!                                          usage += 1       confidence 0.3
//!                                                     └────┬────┘
//!                                         log conversation, refresh metrics
//! ```

pub mod fallback;
pub mod matcher;
pub mod normalize;
pub mod service;
pub mod similarity;
pub mod telemetry;

pub use matcher::{BoostWeights, Match};
pub use service::{
    AddOutcome, ChatResponse, FeedbackOutcome, ImportSummary, KnowledgeService, ResponderConfig,
    ResponseSource,
};
pub use telemetry::{init_tracing, LogSettings, TracerProviderGuard};
