//! `mnemo-memory` – The Episodic Memory Engine.
//!
//! Holds the agent's curated memories in process memory, ranks them against a
//! query embedding, and snapshots them durably to disk.
//!
//! # Modules
//!
//! - [`index`] – [`VectorIndex`][index::VectorIndex]: the similarity-search
//!   seam, with [`LinearIndex`][index::LinearIndex] as the exhaustive-scan
//!   implementation and [`cosine_similarity`][index::cosine_similarity].
//! - [`ranker`] – [`RetrievalRanker`][ranker::RetrievalRanker]: blends
//!   min-max normalised similarity and recency (weighted by `alpha`) into the
//!   final retrieval order, with an optional salience bonus.
//! - [`store`] – [`MemoryStore`][store::MemoryStore]: the ordered entry
//!   collection with `search`, `apply`, `recent`, and crash-safe `persist`
//!   (temp file + atomic rename). Missing or corrupt snapshots start an empty
//!   store instead of failing.

pub mod index;
pub mod ranker;
pub mod store;

pub use index::{IndexError, LinearIndex, VectorIndex, cosine_similarity};
pub use ranker::{RankerConfig, RetrievalRanker};
pub use store::{ApplyReport, MemoryError, MemoryStore, ScoredMemory};
