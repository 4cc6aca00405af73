//! TOML seed files for bootstrapping a knowledge base.
//!
//! A seed file is a list of `[[entry]]` tables:
//!
//! ```toml
//! [[entry]]
//! question = "What services do you offer?"
//! answer = "Custom web development, mobile apps and cloud solutions."
//! category = "services"
//! tags = ["services", "web development"]
//! confidence_score = 0.95   # optional
//! ```

use std::fs;
use std::path::Path;

use kbchat_types::KnowledgeEntry;
use serde::Deserialize;

use crate::store::StoreError;

/// One knowledge entry as declared in a seed file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedEntry {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Confidence to store when the entry is inserted verbatim.
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

impl SeedEntry {
    /// Convert into an unsaved [`KnowledgeEntry`], using `default_confidence`
    /// when the seed does not declare one.
    pub fn to_entry(&self, default_confidence: f64) -> KnowledgeEntry {
        KnowledgeEntry::new(
            self.question.clone(),
            self.answer.clone(),
            self.category.clone(),
            self.tags.clone(),
            self.confidence_score.unwrap_or(default_confidence),
        )
    }
}

/// A parsed seed file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SeedFile {
    #[serde(rename = "entry", default)]
    pub entries: Vec<SeedEntry>,
}

impl SeedFile {
    pub fn from_toml_str(raw: &str) -> Result<Self, StoreError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse the seed file at `path`.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[entry]]
question = "hi"
answer = "Hello! Welcome to E-Click."
category = "greeting"
tags = ["greeting", "hello"]
confidence_score = 0.95

[[entry]]
question = "How can I contact you?"
answer = "Email info@eclick.co.za."
"#;

    #[test]
    fn parses_entries_with_defaults() {
        let seed = SeedFile::from_toml_str(SAMPLE).unwrap();
        assert_eq!(seed.len(), 2);
        assert_eq!(seed.entries[0].tags, vec!["greeting".to_string(), "hello".to_string()]);
        assert_eq!(seed.entries[0].confidence_score, Some(0.95));
        assert_eq!(seed.entries[1].category, "");
        assert!(seed.entries[1].tags.is_empty());
        assert!(seed.entries[1].confidence_score.is_none());
    }

    #[test]
    fn to_entry_uses_default_confidence_when_absent() {
        let seed = SeedFile::from_toml_str(SAMPLE).unwrap();
        let declared = seed.entries[0].to_entry(0.7);
        let defaulted = seed.entries[1].to_entry(0.7);
        assert!((declared.confidence_score - 0.95).abs() < 1e-9);
        assert!((defaulted.confidence_score - 0.7).abs() < 1e-9);
        assert!(defaulted.id.is_none());
    }

    #[test]
    fn empty_document_is_empty_seed() {
        let seed = SeedFile::from_toml_str("").unwrap();
        assert!(seed.is_empty());
    }

    #[test]
    fn missing_answer_is_a_parse_error() {
        let err = SeedFile::from_toml_str("[[entry]]\nquestion = \"q\"\n").unwrap_err();
        assert!(matches!(err, StoreError::SeedParse(_)));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let seed = SeedFile::load(&path).unwrap();
        assert_eq!(seed.len(), 2);
    }

    #[test]
    fn bundled_sample_parses() {
        let seed = SeedFile::from_toml_str(include_str!("../../../data/seed_knowledge.toml")).unwrap();
        assert!(seed.len() >= 5);
        assert!(seed.entries.iter().all(|e| !e.question.is_empty() && !e.answer.is_empty()));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SeedFile::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
