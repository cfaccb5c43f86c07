//! [`MemoryEngine`] – the per-turn memory pipeline.
//!
//! One call to [`MemoryEngine::process_turn`] runs the full cycle for a
//! conversational turn:
//!
//! 1. **Retrieve** – embed the turn and search the [`MemoryStore`].
//! 2. **Curate** – ask the [`Curator`] what to add and retract.
//! 3. **Commit** – apply the decision and persist the snapshot.
//! 4. **Reflect** – every `reflection_interval` turns, ask the [`Reflector`]
//!    for a belief revision over the most recent memories.
//!
//! Turns are processed one at a time; the engine takes `&mut self`, so a
//! deployment that serves several conversations must put it behind a single
//! lock. Every failure inside the pipeline degrades to "memory unchanged
//! this turn" and is reported through `tracing`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mnemo_memory::MemoryStore;
//! use mnemo_runtime::{EmbeddingDriver, EngineConfig, LlmDriver, MemoryEngine};
//! use mnemo_types::ConversationTurn;
//!
//! # async fn demo() {
//! let store = MemoryStore::load("/tmp/mnemo/memories.json");
//! let generator = Arc::new(LlmDriver::new("http://localhost:11434", "llama3"));
//! let embedder = Arc::new(EmbeddingDriver::new("http://localhost:11434", "nomic-embed-text"));
//! let mut engine = MemoryEngine::new(store, generator, embedder, EngineConfig::default());
//!
//! let beliefs = vec!["I enjoy helping people.".to_string()];
//! let turn = [
//!     ConversationTurn::user("I moved to Lisbon last month."),
//!     ConversationTurn::agent("How exciting! How are you finding it?"),
//! ];
//! let report = engine.process_turn(&turn, &beliefs).await;
//! println!("added {} memories", report.applied.added);
//! # }
//! ```

use std::sync::Arc;

use mnemo_memory::{
    ApplyReport, LinearIndex, MemoryStore, RankerConfig, ScoredMemory, VectorIndex,
};
use mnemo_types::{
    BeliefRevision, ConversationTurn, CurationResult, MemoryEntry, MemoryId, MnemoError, Speaker,
};
use tracing::{debug, info, instrument, warn};

use crate::curator::{Curator, CuratorConfig};
use crate::embedding::Embedder;
use crate::llm_driver::Generator;
use crate::reflector::{Reflector, ReflectorConfig};

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_REFLECTION_INTERVAL: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Memories retrieved per turn.
    pub top_k: usize,
    /// Raw cosine similarity a memory must exceed to be retrieved.
    pub min_similarity: f32,
    pub ranker: RankerConfig,
    /// Reflect every this many turns; `0` disables reflection.
    pub reflection_interval: u64,
    pub curator: CuratorConfig,
    pub reflector: ReflectorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: 0.0,
            ranker: RankerConfig::default(),
            reflection_interval: DEFAULT_REFLECTION_INTERVAL,
            curator: CuratorConfig::default(),
            reflector: ReflectorConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn report
// ─────────────────────────────────────────────────────────────────────────────

/// What one pass of [`MemoryEngine::process_turn`] did.
#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    /// 1-based turn number.
    pub turn: u64,
    /// Memories shown to the curator, best first.
    pub retrieved: Vec<ScoredMemory>,
    pub applied: ApplyReport,
    /// Whether a changed store reached disk.
    pub persisted: bool,
    /// A belief revision, when this turn triggered reflection and it found one.
    pub revision: Option<BeliefRevision>,
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryEngine
// ─────────────────────────────────────────────────────────────────────────────

pub struct MemoryEngine<I: VectorIndex = LinearIndex> {
    store: MemoryStore<I>,
    embedder: Arc<dyn Embedder>,
    curator: Curator,
    reflector: Reflector,
    config: EngineConfig,
    turns: u64,
}

impl<I: VectorIndex> MemoryEngine<I> {
    /// Wire the pipeline around `store`. The ranker weights in `config`
    /// replace the store's, and turn numbering resumes after the highest
    /// `source_turn` already stored.
    pub fn new(
        mut store: MemoryStore<I>,
        generator: Arc<dyn Generator>,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
    ) -> Self {
        store.set_ranker(config.ranker);
        let turns = store
            .entries()
            .iter()
            .filter_map(|e| e.source_turn)
            .max()
            .unwrap_or(0);
        Self {
            curator: Curator::new(generator.clone(), embedder.clone(), config.curator),
            reflector: Reflector::new(generator, config.reflector.clone()),
            store,
            embedder,
            config,
            turns,
        }
    }

    pub fn store(&self) -> &MemoryStore<I> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Turns processed so far, including those recorded in the snapshot.
    pub fn turn_count(&self) -> u64 {
        self.turns
    }

    /// Retrieve the memories most relevant to `query`.
    ///
    /// # Errors
    ///
    /// [`MnemoError::EmbeddingFailed`] when the query cannot be embedded and
    /// [`MnemoError::SearchFailed`] when the search is rejected, e.g. on a
    /// dimension mismatch.
    pub async fn recall(&self, query: &str) -> Result<Vec<ScoredMemory>, MnemoError> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| MnemoError::EmbeddingFailed(e.to_string()))?;
        self.store
            .search(&embedding, self.config.top_k, self.config.min_similarity)
            .map_err(|e| MnemoError::SearchFailed(e.to_string()))
    }

    /// Run retrieve, curate, commit and (on cadence) reflect for one turn.
    ///
    /// `beliefs` is the persona's current belief list; a returned revision
    /// refers to one of them.
    #[instrument(skip_all, fields(turn = self.turns + 1))]
    pub async fn process_turn(
        &mut self,
        turn: &[ConversationTurn],
        beliefs: &[String],
    ) -> TurnReport {
        self.turns += 1;
        let mut report = TurnReport {
            turn: self.turns,
            ..TurnReport::default()
        };

        report.retrieved = match self.recall(&query_text(turn)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "memory retrieval failed; curating without context");
                Vec::new()
            }
        };
        debug!(retrieved = report.retrieved.len(), "memories retrieved for turn");

        let retrieved: Vec<MemoryEntry> =
            report.retrieved.iter().map(|m| m.entry.clone()).collect();
        let decision = self.curator.decide(turn, &retrieved, Some(self.turns)).await;
        if !decision.is_empty() {
            report.applied = self.store.apply(decision);
            report.persisted = self.persist();
        }

        if self.reflection_due() {
            report.revision = self.reflect(beliefs).await;
        }
        report
    }

    /// Ask the reflector about the last `reflection_interval` memories.
    pub async fn reflect(&self, beliefs: &[String]) -> Option<BeliefRevision> {
        let window = usize::try_from(self.config.reflection_interval.max(1)).unwrap_or(usize::MAX);
        let recent = self.store.recent(window);
        info!(entries = recent.len(), "reflecting on recent memories");
        self.reflector.evaluate(beliefs, recent).await
    }

    /// Retract one memory by id and persist. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// [`MnemoError::PersistFailed`] when the snapshot cannot be written; the
    /// in-memory removal still stands and the store stays dirty.
    pub fn forget(&mut self, id: &MemoryId) -> Result<bool, MnemoError> {
        if self.store.get(id).is_none() {
            return Ok(false);
        }
        let report = self.store.apply(CurationResult {
            entries_to_add: Vec::new(),
            ids_to_remove: [id.clone()].into(),
        });
        self.store
            .persist()
            .map_err(|e| MnemoError::PersistFailed(e.to_string()))?;
        Ok(report.removed > 0)
    }

    /// Persist unsaved changes, e.g. at shutdown.
    ///
    /// # Errors
    ///
    /// [`MnemoError::PersistFailed`] when the snapshot cannot be written.
    pub fn flush(&mut self) -> Result<(), MnemoError> {
        self.store
            .persist_if_dirty()
            .map_err(|e| MnemoError::PersistFailed(e.to_string()))
    }

    fn reflection_due(&self) -> bool {
        let interval = self.config.reflection_interval;
        interval > 0 && self.turns % interval == 0
    }

    fn persist(&mut self) -> bool {
        match self.store.persist() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "memory snapshot write failed; changes kept in memory");
                false
            }
        }
    }
}

/// Retrieval query for a turn: the user's lines, or every line when the user
/// said nothing.
fn query_text(turn: &[ConversationTurn]) -> String {
    let user: Vec<&str> = turn
        .iter()
        .filter(|t| t.speaker == Speaker::User)
        .map(|t| t.message.as_str())
        .collect();
    if user.is_empty() {
        turn.iter().map(|t| t.message.as_str()).collect::<Vec<_>>().join("\n")
    } else {
        user.join("\n")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
