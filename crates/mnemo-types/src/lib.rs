use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque, never-reused identifier of a [`MemoryEntry`].
///
/// Freshly minted ids look like `mem_<uuid-v4>`; ids read back from a snapshot
/// or echoed by the generator are accepted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Mint a new unique id.
    pub fn generate() -> Self {
        Self(format!("mem_{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Emotional colouring of a memory, as judged when it was curated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Valence {
    Positive,
    Negative,
    Neutral,
}

impl Valence {
    /// `true` for positive and negative memories.
    pub fn is_salient(self) -> bool {
        !matches!(self, Valence::Neutral)
    }
}

impl fmt::Display for Valence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Valence::Positive => write!(f, "positive"),
            Valence::Negative => write!(f, "negative"),
            Valence::Neutral => write!(f, "neutral"),
        }
    }
}

impl FromStr for Valence {
    type Err = MnemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Valence::Positive),
            "negative" => Ok(Valence::Negative),
            "neutral" => Ok(Valence::Neutral),
            other => Err(MnemoError::InvalidValence(other.to_string())),
        }
    }
}

/// The unit of episodic storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    /// Standalone, third-person memory statement.
    pub content: String,
    /// Dense embedding of `content`. Empty means "unsearchable but retained".
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    /// Conversation turn the memory was curated from, if known.
    #[serde(default)]
    pub source_turn: Option<u64>,
    #[serde(default)]
    pub valence: Option<Valence>,
}

impl MemoryEntry {
    /// Construct a new entry with a fresh id and the current UTC timestamp.
    pub fn new(content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: MemoryId::generate(),
            content: content.into(),
            embedding,
            created_at: Utc::now(),
            source_turn: None,
            valence: None,
        }
    }

    pub fn with_source_turn(mut self, turn: Option<u64>) -> Self {
        self.source_turn = turn;
        self
    }

    pub fn with_valence(mut self, valence: Option<Valence>) -> Self {
        self.valence = valence;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// `false` when the entry has no embedding and can never match a query.
    pub fn is_searchable(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// Who said a line of dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "User"),
            Speaker::Agent => write!(f, "Agent"),
        }
    }
}

/// One line of dialogue. Ephemeral; never persisted by the memory engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub message: String,
}

impl ConversationTurn {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            message: message.into(),
        }
    }

    pub fn agent(message: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent,
            message: message.into(),
        }
    }
}

/// The atomic delta a curation decision applies to a memory store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurationResult {
    pub entries_to_add: Vec<MemoryEntry>,
    pub ids_to_remove: BTreeSet<MemoryId>,
}

impl CurationResult {
    /// The safe no-op decision.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries_to_add.is_empty() && self.ids_to_remove.is_empty()
    }
}

/// A single targeted edit to one persona belief, proposed by reflection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeliefRevision {
    pub belief_to_replace: String,
    pub replacement: String,
    pub rationale: String,
}

impl BeliefRevision {
    /// Substitute `replacement` for the first belief equal to
    /// `belief_to_replace`. Returns `false` when no belief matched.
    pub fn apply_to(&self, beliefs: &mut [String]) -> bool {
        match beliefs.iter_mut().find(|b| **b == self.belief_to_replace) {
            Some(slot) => {
                *slot = self.replacement.clone();
                true
            }
            None => false,
        }
    }
}

/// Error type shared across the memory engine crates.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum MnemoError {
    #[error("Unknown valence label: {0}")]
    InvalidValence(String),

    #[error("Embedding Error: {0}")]
    EmbeddingFailed(String),

    #[error("Memory Search Error: {0}")]
    SearchFailed(String),

    #[error("Snapshot Error: {0}")]
    PersistFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = MemoryId::generate();
        let b = MemoryId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("mem_"));
    }

    #[test]
    fn memory_id_serializes_as_plain_string() {
        let id = MemoryId::from("mem_42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"mem_42\"");
    }

    #[test]
    fn valence_parses_case_insensitively() {
        assert_eq!("Positive".parse::<Valence>().unwrap(), Valence::Positive);
        assert_eq!(" NEGATIVE ".parse::<Valence>().unwrap(), Valence::Negative);
        assert!(matches!(
            "ecstatic".parse::<Valence>(),
            Err(MnemoError::InvalidValence(_))
        ));
    }

    #[test]
    fn neutral_is_not_salient() {
        assert!(!Valence::Neutral.is_salient());
        assert!(Valence::Negative.is_salient());
    }

    #[test]
    fn memory_entry_roundtrip_keeps_every_field() {
        let entry = MemoryEntry::new("User prefers dark mode.", vec![0.1, -0.333_333_34, 7.5e-8])
            .with_source_turn(Some(4))
            .with_valence(Some(Valence::Positive));
        let json = serde_json::to_string(&entry).unwrap();
        let back: MemoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn memory_entry_without_embedding_is_unsearchable() {
        let entry = MemoryEntry::new("orphan", vec![]);
        assert!(!entry.is_searchable());
    }

    #[test]
    fn empty_curation_result_is_empty() {
        assert!(CurationResult::empty().is_empty());
    }

    #[test]
    fn belief_revision_replaces_matching_belief() {
        let mut beliefs = vec!["People rarely listen.".to_string(), "Rain is calming.".to_string()];
        let rev = BeliefRevision {
            belief_to_replace: "People rarely listen.".into(),
            replacement: "People rarely listen, but some do.".into(),
            rationale: "The user listened attentively across several turns.".into(),
        };
        assert!(rev.apply_to(&mut beliefs));
        assert_eq!(beliefs[0], "People rarely listen, but some do.");
        assert_eq!(beliefs[1], "Rain is calming.");
    }

    #[test]
    fn belief_revision_reports_missing_belief() {
        let mut beliefs = vec!["Rain is calming.".to_string()];
        let rev = BeliefRevision {
            belief_to_replace: "Nothing matters.".into(),
            replacement: "Some things matter.".into(),
            rationale: "n/a".into(),
        };
        assert!(!rev.apply_to(&mut beliefs));
        assert_eq!(beliefs, vec!["Rain is calming.".to_string()]);
    }

    #[test]
    fn mnemo_error_display() {
        let err = MnemoError::EmbeddingFailed("backend down".into());
        assert!(err.to_string().contains("backend down"));
    }
}
