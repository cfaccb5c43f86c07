//! Memory Store.
//!
//! Owns the ordered collection of [`MemoryEntry`] records (insertion order is
//! chronological order), keeps a [`VectorIndex`] in step with it, and writes
//! durable JSON snapshots.
//!
//! # Snapshot layout
//!
//! ```json
//! { "version": 1, "entries": [ { "id": "...", "content": "...", "embedding": [...],
//!                               "created_at": "...", "source_turn": 3, "valence": "positive" } ] }
//! ```
//!
//! Snapshots are written to a sibling temporary file, fsynced, then renamed
//! over the target, so a reader sees either the previous snapshot or the new
//! one. A missing snapshot starts an empty store; an unreadable or corrupt one
//! is moved aside to `<path>.corrupt` and the store starts empty.
//!
//! There is no background flush: call [`MemoryStore::persist`] after every
//! [`MemoryStore::apply`] that must survive a crash.
//!
//! # Example
//!
//! ```rust
//! use mnemo_memory::store::MemoryStore;
//! use mnemo_types::{CurationResult, MemoryEntry};
//!
//! let mut store = MemoryStore::in_memory();
//! let entry = MemoryEntry::new("The user's cat is called Miso.", vec![0.1, 0.9, 0.3]);
//! store.apply(CurationResult { entries_to_add: vec![entry.clone()], ..Default::default() });
//!
//! let results = store.search(&[0.1, 0.9, 0.3], 5, 0.0).unwrap();
//! assert_eq!(results[0].entry.id, entry.id);
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use mnemo_types::{CurationResult, MemoryEntry, MemoryId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::index::{IndexError, LinearIndex, VectorIndex};
use crate::ranker::{RankerConfig, RetrievalRanker};

/// Current on-disk snapshot format.
const SNAPSHOT_VERSION: u32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from memory store operations.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Index(#[from] IndexError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Result types
// ─────────────────────────────────────────────────────────────────────────────

/// A search hit.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    /// Raw cosine similarity to the query.
    pub similarity: f32,
    /// Final relevance/recency score used for ordering.
    pub score: f32,
}

/// What an [`MemoryStore::apply`] call actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub added: usize,
    pub removed: usize,
    /// Entries refused because of a reused id or a mismatched embedding dimension.
    pub rejected: usize,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    entries: &'a [MemoryEntry],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    entries: Vec<MemoryEntry>,
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ─────────────────────────────────────────────────────────────────────────────

/// Durable owner of the episodic memory collection.
pub struct MemoryStore<I: VectorIndex = LinearIndex> {
    entries: Vec<MemoryEntry>,
    index: I,
    ranker: RetrievalRanker,
    snapshot_path: Option<PathBuf>,
    dirty: bool,
}

impl MemoryStore<LinearIndex> {
    /// Load the snapshot at `path`, or start empty if it is missing or corrupt.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        Self::load_with_index(path, LinearIndex::new())
    }

    /// A store that never touches disk; `persist` only clears the dirty flag.
    pub fn in_memory() -> Self {
        Self::with_index(None, LinearIndex::new())
    }
}

impl<I: VectorIndex> MemoryStore<I> {
    /// Like [`MemoryStore::load`], with a caller-supplied index implementation.
    pub fn load_with_index(path: impl Into<PathBuf>, index: I) -> Self {
        let path = path.into();
        let entries = read_snapshot(&path);
        let mut store = Self::with_index(Some(path), index);
        for entry in entries {
            store.index_entry(&entry);
            store.entries.push(entry);
        }
        store
    }

    fn with_index(snapshot_path: Option<PathBuf>, index: I) -> Self {
        Self {
            entries: Vec::new(),
            index,
            ranker: RetrievalRanker::default(),
            snapshot_path,
            dirty: false,
        }
    }

    /// Index a loaded entry. Entries whose dimension disagrees with the rest of
    /// the snapshot are kept but stay unsearchable.
    fn index_entry(&mut self, entry: &MemoryEntry) {
        if let Err(e) = self.index.insert(&entry.id, &entry.embedding) {
            warn!(id = %entry.id, error = %e, "snapshot entry kept but not searchable");
        }
    }

    // -------------------------------------------------------------------------
    // Ranking configuration
    // -------------------------------------------------------------------------

    /// Change the ranking weights used by subsequent searches.
    pub fn set_ranker(&mut self, config: RankerConfig) {
        self.ranker = RetrievalRanker::new(config);
    }

    pub fn ranker(&self) -> &RetrievalRanker {
        &self.ranker
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Return at most `top_k` entries relevant to `query_embedding`, best first.
    ///
    /// Only entries whose raw cosine similarity is strictly positive and
    /// strictly above `min_similarity` are candidates; candidates are then
    /// ordered by the store's [`RetrievalRanker`]. An empty store yields an
    /// empty result.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Index`] when the query dimension differs from
    /// the stored embeddings. The store itself is left untouched.
    pub fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        if self.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let scores = self.index.score_all(query_embedding)?;

        let candidates: Vec<(&MemoryEntry, f32)> = self
            .entries
            .iter()
            .filter_map(|e| {
                let similarity = scores.get(&e.id).copied().unwrap_or(0.0);
                (similarity > 0.0 && similarity > min_similarity).then_some((e, similarity))
            })
            .collect();

        let mut ranked = self.ranker.rank(&candidates, Utc::now());
        ranked.truncate(top_k);
        debug!(
            candidates = candidates.len(),
            returned = ranked.len(),
            "memory search complete"
        );
        Ok(ranked
            .into_iter()
            .map(|r| ScoredMemory {
                entry: r.entry.clone(),
                similarity: r.similarity,
                score: r.score,
            })
            .collect())
    }

    /// The `n` most recently appended entries, oldest first.
    pub fn recent(&self, n: usize) -> &[MemoryEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn get(&self, id: &MemoryId) -> Option<&MemoryEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// All entries in chronological order.
    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension of this store, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    /// `true` when in-memory state differs from the last durable snapshot.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Apply a curation delta: retract every id in `ids_to_remove` (absent ids
    /// are ignored), then append `entries_to_add`. Marks the store dirty.
    pub fn apply(&mut self, result: CurationResult) -> ApplyReport {
        let mut report = ApplyReport::default();

        if !result.ids_to_remove.is_empty() {
            let before = self.entries.len();
            self.entries.retain(|e| !result.ids_to_remove.contains(&e.id));
            report.removed = before - self.entries.len();
            for id in &result.ids_to_remove {
                self.index.remove(id);
            }
        }

        for entry in result.entries_to_add {
            if self.get(&entry.id).is_some() {
                warn!(id = %entry.id, "refusing to add entry with an id already in use");
                report.rejected += 1;
                continue;
            }
            if let Err(e) = self.index.insert(&entry.id, &entry.embedding) {
                warn!(id = %entry.id, error = %e, "refusing to add entry");
                report.rejected += 1;
                continue;
            }
            self.entries.push(entry);
            report.added += 1;
        }

        self.dirty = true;
        info!(
            added = report.added,
            removed = report.removed,
            rejected = report.rejected,
            total = self.entries.len(),
            "memory updates applied"
        );
        report
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Write the full collection to the snapshot path atomically and clear the
    /// dirty flag. On failure the previous snapshot is left intact and the
    /// store stays dirty.
    pub fn persist(&mut self) -> Result<(), MemoryError> {
        let Some(path) = self.snapshot_path.clone() else {
            self.dirty = false;
            return Ok(());
        };
        let bytes = serde_json::to_vec(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            entries: &self.entries,
        })?;
        write_atomic(&path, &bytes)?;
        self.dirty = false;
        info!(path = %path.display(), entries = self.entries.len(), "memory snapshot saved");
        Ok(())
    }

    /// [`persist`][Self::persist] only when there are unsaved changes.
    pub fn persist_if_dirty(&mut self) -> Result<(), MemoryError> {
        if self.dirty { self.persist() } else { Ok(()) }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Read the snapshot at `path`. Never fails: every problem is logged and
/// results in an empty collection.
fn read_snapshot(path: &Path) -> Vec<MemoryEntry> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no memory snapshot found; starting empty");
            return Vec::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "memory snapshot unreadable; starting empty");
            return Vec::new();
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        info!(path = %path.display(), "memory snapshot is empty; starting empty");
        return Vec::new();
    }

    match serde_json::from_slice::<Snapshot>(&bytes) {
        Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => {
            info!(path = %path.display(), entries = snapshot.entries.len(), "memory snapshot loaded");
            snapshot.entries
        }
        Ok(snapshot) => {
            warn!(
                path = %path.display(),
                version = snapshot.version,
                "unsupported memory snapshot version; starting empty"
            );
            quarantine(path);
            Vec::new()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "memory snapshot corrupt; starting empty");
            quarantine(path);
            Vec::new()
        }
    }
}

/// Move a bad snapshot to `<path>.corrupt` so the next persist cannot erase it.
fn quarantine(path: &Path) {
    let target = sibling(path, "corrupt");
    match fs::rename(path, &target) {
        Ok(()) => warn!(from = %path.display(), to = %target.display(), "corrupt snapshot moved aside"),
        Err(e) => warn!(path = %path.display(), error = %e, "could not move corrupt snapshot aside"),
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Write `bytes` to a unique temp file next to `path`, fsync it, then rename
/// it over `path`. The directory is synced after the rename so the new name
/// survives a power loss.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp = sibling(path, &format!("{}.tmp", Uuid::new_v4().simple()));
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result?;
    sync_dir(parent)
}

/// fsync a directory so renames inside it are durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

/// Directory handles cannot be synced here; the rename is still atomic.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mnemo_types::Valence;
    use std::collections::BTreeSet;

    fn add(store: &mut MemoryStore, entries: Vec<MemoryEntry>) -> ApplyReport {
        store.apply(CurationResult {
            entries_to_add: entries,
            ids_to_remove: BTreeSet::new(),
        })
    }

    fn remove(store: &mut MemoryStore, ids: &[&MemoryId]) -> ApplyReport {
        store.apply(CurationResult {
            entries_to_add: vec![],
            ids_to_remove: ids.iter().map(|id| (*id).clone()).collect(),
        })
    }

    fn snapshot_in(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("episodic_memory.json")
    }

    // ── search ───────────────────────────────────────────────────────────────

    #[test]
    fn empty_store_search_returns_empty() {
        let store = MemoryStore::in_memory();
        assert!(store.search(&[0.3, 0.1, 0.9], 5, 0.0).unwrap().is_empty());
    }

    #[test]
    fn search_returns_best_match() {
        let mut store = MemoryStore::in_memory();
        let near = MemoryEntry::new("near", vec![1.0, 0.0, 0.0]);
        let far = MemoryEntry::new("far", vec![0.2, 0.0, 1.0]);
        add(&mut store, vec![near.clone(), far]);

        let results = store.search(&[1.0, 0.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.id, near.id);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn top_k_and_threshold_select_only_strong_match() {
        let mut store = MemoryStore::in_memory();
        let strong = MemoryEntry::new("strong", vec![0.95, (1.0f32 - 0.95 * 0.95).sqrt()]);
        let weak = MemoryEntry::new("weak", vec![0.40, (1.0f32 - 0.40 * 0.40).sqrt()]);
        add(&mut store, vec![strong.clone(), weak]);

        let results = store.search(&[1.0, 0.0], 1, 0.5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.id, strong.id);
        assert!((results[0].similarity - 0.95).abs() < 1e-4);
    }

    #[test]
    fn search_never_returns_non_positive_similarity() {
        let mut store = MemoryStore::in_memory();
        add(
            &mut store,
            vec![
                MemoryEntry::new("aligned", vec![1.0, 0.0]),
                MemoryEntry::new("orthogonal", vec![0.0, 1.0]),
                MemoryEntry::new("opposite", vec![-1.0, 0.0]),
                MemoryEntry::new("zero", vec![0.0, 0.0]),
                MemoryEntry::new("unembedded", vec![]),
            ],
        );
        let results = store.search(&[1.0, 0.0], 10, -1.0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.content, "aligned");
        assert!(results.iter().all(|r| r.similarity > 0.0));
    }

    #[test]
    fn alpha_extremes_match_pure_orderings() {
        let now = Utc::now();
        // Similarity order: a > b > c. Recency order: c > b > a.
        let a = MemoryEntry::new("a", vec![1.0, 0.05]).with_created_at(now - Duration::hours(3));
        let b = MemoryEntry::new("b", vec![1.0, 0.5]).with_created_at(now - Duration::hours(2));
        let c = MemoryEntry::new("c", vec![1.0, 2.0]).with_created_at(now - Duration::hours(1));
        let mut store = MemoryStore::in_memory();
        add(&mut store, vec![a, b, c]);

        store.set_ranker(RankerConfig { alpha: 1.0, salience_weight: 0.0 });
        let by_sim: Vec<String> = store
            .search(&[1.0, 0.0], 3, 0.0)
            .unwrap()
            .into_iter()
            .map(|r| r.entry.content)
            .collect();
        assert_eq!(by_sim, vec!["a", "b", "c"]);

        store.set_ranker(RankerConfig { alpha: 0.0, salience_weight: 0.0 });
        let by_recency: Vec<String> = store
            .search(&[1.0, 0.0], 3, 0.0)
            .unwrap()
            .into_iter()
            .map(|r| r.entry.content)
            .collect();
        assert_eq!(by_recency, vec!["c", "b", "a"]);
    }

    #[test]
    fn search_with_wrong_dimension_is_rejected_without_damage() {
        let mut store = MemoryStore::in_memory();
        add(&mut store, vec![MemoryEntry::new("3d", vec![1.0, 0.0, 0.0])]);
        let err = store.search(&[1.0, 0.0], 5, 0.0).unwrap_err();
        assert!(matches!(err, MemoryError::Index(IndexError::DimensionMismatch { .. })));
        assert_eq!(store.search(&[1.0, 0.0, 0.0], 5, 0.0).unwrap().len(), 1);
    }

    // ── apply ────────────────────────────────────────────────────────────────

    #[test]
    fn apply_removes_then_appends_and_marks_dirty() {
        let mut store = MemoryStore::in_memory();
        let old = MemoryEntry::new("User prefers light mode.", vec![1.0, 0.0]);
        add(&mut store, vec![old.clone()]);
        store.persist().unwrap();
        assert!(!store.is_dirty());

        let new = MemoryEntry::new("User prefers dark mode.", vec![0.9, 0.1]);
        let report = store.apply(CurationResult {
            entries_to_add: vec![new.clone()],
            ids_to_remove: [old.id.clone()].into_iter().collect(),
        });
        assert_eq!(report, ApplyReport { added: 1, removed: 1, rejected: 0 });
        assert!(store.is_dirty());
        assert!(store.get(&old.id).is_none());
        let hits = store.search(&[1.0, 0.0], 5, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.id, new.id);
    }

    #[test]
    fn removing_absent_id_is_a_no_op() {
        let mut store = MemoryStore::in_memory();
        let kept = MemoryEntry::new("kept", vec![1.0, 0.0]);
        add(&mut store, vec![kept.clone()]);
        let before = store.entries().to_vec();

        let ghost = MemoryId::from("mem_does_not_exist");
        let report = remove(&mut store, &[&ghost]);
        assert_eq!(report.removed, 0);
        assert_eq!(store.entries(), before.as_slice());

        // And a second time, for good measure.
        remove(&mut store, &[&ghost]);
        assert_eq!(store.entries(), before.as_slice());
    }

    #[test]
    fn apply_rejects_mismatched_dimension_and_reused_id() {
        let mut store = MemoryStore::in_memory();
        let first = MemoryEntry::new("first", vec![1.0, 0.0, 0.0]);
        add(&mut store, vec![first.clone()]);
        let report = add(
            &mut store,
            vec![
                MemoryEntry::new("wrong shape", vec![1.0, 0.0]),
                first.clone(),
                MemoryEntry::new("unembedded", vec![]),
            ],
        );
        assert_eq!(report, ApplyReport { added: 1, removed: 0, rejected: 2 });
        assert_eq!(store.len(), 2);
        assert_eq!(store.dimension(), Some(3));
    }

    #[test]
    fn recent_returns_latest_in_insertion_order() {
        let mut store = MemoryStore::in_memory();
        for i in 0..5 {
            add(&mut store, vec![MemoryEntry::new(format!("m{i}"), vec![1.0, i as f32])]);
        }
        let recent: Vec<&str> = store.recent(2).iter().map(|e| e.content.as_str()).collect();
        assert_eq!(recent, vec!["m3", "m4"]);
        assert_eq!(store.recent(50).len(), 5);
        assert!(store.recent(0).is_empty());
    }

    // ── persistence ──────────────────────────────────────────────────────────

    #[test]
    fn persist_then_load_roundtrips_every_field() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = snapshot_in(&dir);

        let mut store = MemoryStore::load(&path);
        assert!(store.is_empty());
        add(
            &mut store,
            vec![
                MemoryEntry::new("User's favourite food is tonkotsu ramen.", vec![0.123_456_79, -1.0e-7, 6.022_140_8e23])
                    .with_source_turn(Some(7))
                    .with_valence(Some(Valence::Positive)),
                MemoryEntry::new("The agent admitted it felt low.", vec![0.333_333_34, 0.25, -0.5]),
                MemoryEntry::new("retained but unsearchable", vec![]),
            ],
        );
        store.persist().unwrap();
        assert!(!store.is_dirty());

        let reloaded = MemoryStore::load(&path);
        assert_eq!(reloaded.entries(), store.entries());
        assert!(!reloaded.is_dirty());
        assert_eq!(reloaded.dimension(), Some(3));
    }

    #[test]
    fn reload_reproduces_ranking() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = snapshot_in(&dir);
        let mut store = MemoryStore::load(&path);
        for i in 1..6 {
            add(&mut store, vec![MemoryEntry::new(format!("m{i}"), vec![i as f32 * 0.1, 1.0, 0.3])]);
        }
        store.persist().unwrap();
        let query = [0.4, 0.8, 0.1];
        let before: Vec<MemoryId> = store.search(&query, 5, 0.0).unwrap().into_iter().map(|r| r.entry.id).collect();

        let reloaded = MemoryStore::load(&path);
        let after: Vec<MemoryId> = reloaded.search(&query, 5, 0.0).unwrap().into_iter().map(|r| r.entry.id).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn persist_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = snapshot_in(&dir);
        let mut store = MemoryStore::load(&path);
        add(&mut store, vec![MemoryEntry::new("x", vec![1.0])]);
        store.persist().unwrap();
        store.persist().unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["episodic_memory.json".to_string()]);
    }

    #[test]
    fn persist_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nested").join("deeper").join("memory.json");
        let mut store = MemoryStore::load(&path);
        add(&mut store, vec![MemoryEntry::new("x", vec![1.0])]);
        store.persist().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn failed_persist_keeps_store_dirty() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"").unwrap();
        let mut store = MemoryStore::load(blocker.join("memory.json"));
        add(&mut store, vec![MemoryEntry::new("x", vec![1.0])]);

        assert!(store.persist().is_err());
        assert!(store.is_dirty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn atomic_write_replaces_and_syncs_directory() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("fresh").join("memory.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        sync_dir(dir.path()).unwrap();
    }

    #[test]
    fn corrupt_snapshot_starts_empty_and_is_moved_aside() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = snapshot_in(&dir);
        fs::write(&path, b"{ this is not json").unwrap();

        let store = MemoryStore::load(&path);
        assert!(store.is_empty());
        assert!(!path.exists());
        assert!(dir.path().join("episodic_memory.json.corrupt").exists());
    }

    #[test]
    fn truncated_snapshot_starts_empty() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = snapshot_in(&dir);
        let mut store = MemoryStore::load(&path);
        add(&mut store, vec![MemoryEntry::new("whole", vec![1.0, 2.0])]);
        store.persist().unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let reloaded = MemoryStore::load(&path);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn empty_snapshot_file_starts_empty_without_quarantine() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = snapshot_in(&dir);
        fs::write(&path, b"").unwrap();
        let store = MemoryStore::load(&path);
        assert!(store.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn unknown_snapshot_version_starts_empty() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = snapshot_in(&dir);
        fs::write(&path, br#"{"version": 99, "entries": []}"#).unwrap();
        let store = MemoryStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn persist_if_dirty_skips_clean_store() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = snapshot_in(&dir);
        let mut store = MemoryStore::load(&path);
        store.persist_if_dirty().unwrap();
        assert!(!path.exists());
        add(&mut store, vec![MemoryEntry::new("x", vec![1.0])]);
        store.persist_if_dirty().unwrap();
        assert!(path.exists());
    }
}
