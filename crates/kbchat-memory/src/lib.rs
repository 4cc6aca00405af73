//! `kbchat-memory` – The Knowledge Store.
//!
//! Persists knowledge entries, the conversation log, and the learning-metrics
//! aggregate, utilizing a local SQLite substrate.
//!
//! # Modules
//!
//! - [`store`] – the [`KnowledgeStore`][store::KnowledgeStore] trait, the
//!   seam between the responder and whatever holds its data.
//! - [`sqlite`] – [`SqliteStore`][sqlite::SqliteStore]: the SQLite-backed
//!   implementation, safe to share across threads.
//! - [`seed`] – [`SeedFile`][seed::SeedFile]: TOML seed files used to
//!   bootstrap or resynchronise a knowledge base.

pub mod seed;
pub mod sqlite;
pub mod store;

pub use seed::{SeedEntry, SeedFile};
pub use sqlite::SqliteStore;
pub use store::{KnowledgeStore, StoreError};
