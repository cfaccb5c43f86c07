//! [`Curator`] – decides how one conversational turn changes the memory set.
//!
//! The curator shows the generator the turn together with the memories
//! retrieved for it and asks for two things: new standalone memory
//! statements, and the ids of retrieved memories those statements contradict
//! or subsume. The reply is validated structurally only. The generator is the
//! judge of what contradicts what.
//!
//! Curation is best-effort. Any generation or decoding failure yields
//! [`CurationResult::empty`], and a statement that cannot be embedded is
//! dropped on its own.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use mnemo_types::{ConversationTurn, CurationResult, MemoryEntry, MemoryId, Valence};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::llm_driver::{GenerationOptions, Generator};
use crate::structured::{Decoded, decode_reply};

/// Default sampling temperature for curation; low, since the output is
/// bookkeeping rather than prose.
pub const DEFAULT_CURATOR_TEMPERATURE: f32 = 0.2;

const CURATOR_INSTRUCTIONS: &str = "\
You maintain the long-term memory of a conversational agent.

You receive the latest conversation turn and the existing memories that were \
retrieved for it, each with its ID.

1. Extract every new fact worth remembering from the turn. Write each one as a \
short standalone statement in the third person (\"The user prefers dark mode.\"). \
Never copy dialogue verbatim. Skip small talk.
2. Optionally label each statement with its emotional valence: \
\"positive\", \"negative\" or \"neutral\".
3. If a new statement updates, contradicts or subsumes an existing memory, put \
that memory's ID in ids_to_remove. Only use IDs from the list you were given.
4. If nothing should change, return empty lists.

Reply with a JSON object of the form:
{\"memories_to_add\": [{\"content\": \"...\", \"valence\": \"neutral\"}], \"ids_to_remove\": [\"...\"]}";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuratorConfig {
    pub temperature: f32,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_CURATOR_TEMPERATURE,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reply shape
// ─────────────────────────────────────────────────────────────────────────────

/// A field that may arrive as a list, a single item, an object of items, or
/// `null`. Variants are tried in order, so a lone item wins over a map.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
enum ListOrMap<T> {
    List(Vec<T>),
    One(T),
    Map(BTreeMap<String, T>),
    Nothing(()),
}

impl<T> ListOrMap<T> {
    /// The items, taking values from an object.
    fn into_values(self) -> Vec<T> {
        match self {
            Self::List(items) => items,
            Self::One(item) => vec![item],
            Self::Map(map) => map.into_values().collect(),
            Self::Nothing(()) => Vec::new(),
        }
    }
}

/// A proposed statement: bare text, or text with a valence label.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
enum NewMemory {
    Text(String),
    Detailed {
        #[serde(alias = "statement", alias = "memory")]
        content: String,
        #[serde(default)]
        valence: Option<String>,
    },
}

impl NewMemory {
    fn into_parts(self) -> (String, Option<String>) {
        match self {
            Self::Text(content) => (content, None),
            Self::Detailed { content, valence } => (content, valence),
        }
    }
}

/// What the generator is asked to return. Both fields are required.
#[derive(Debug, Deserialize, JsonSchema)]
struct CuratorReply {
    memories_to_add: ListOrMap<NewMemory>,
    ids_to_remove: ListOrMap<serde_json::Value>,
}

/// A statement that survived hygiene checks, awaiting its embedding.
#[derive(Debug, PartialEq)]
struct Proposal {
    content: String,
    valence: Option<Valence>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Curator
// ─────────────────────────────────────────────────────────────────────────────

/// Consolidation policy for the episodic memory store.
pub struct Curator {
    generator: Arc<dyn Generator>,
    embedder: Arc<dyn Embedder>,
    config: CuratorConfig,
}

impl Curator {
    pub fn new(
        generator: Arc<dyn Generator>,
        embedder: Arc<dyn Embedder>,
        config: CuratorConfig,
    ) -> Self {
        Self {
            generator,
            embedder,
            config,
        }
    }

    /// Decide how `turn` changes the memory set, given the memories
    /// `retrieved` for it. New entries are stamped with `source_turn`.
    ///
    /// Never fails: a generation error or malformed reply yields an empty
    /// [`CurationResult`].
    pub async fn decide(
        &self,
        turn: &[ConversationTurn],
        retrieved: &[MemoryEntry],
        source_turn: Option<u64>,
    ) -> CurationResult {
        let context = build_context(turn, retrieved);
        let options = GenerationOptions::with_temperature(self.config.temperature);
        let options = match reply_schema() {
            Some(schema) => options.schema(schema),
            None => options,
        };

        let raw = match self
            .generator
            .generate(CURATOR_INSTRUCTIONS, &context, options)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "curator generation failed; memory unchanged");
                return CurationResult::empty();
            }
        };

        let reply: CuratorReply = match decode_reply(&raw) {
            Decoded::Parsed(reply) => reply,
            Decoded::Malformed(reason) => {
                warn!(%reason, "curator reply malformed; memory unchanged");
                return CurationResult::empty();
            }
        };

        let proposals = proposals_from(reply.memories_to_add.into_values());
        let ids_to_remove = known_ids(reply_ids(reply.ids_to_remove), retrieved);

        let proposed = proposals.len();
        let mut entries_to_add = Vec::with_capacity(proposed);
        for proposal in proposals {
            match self.embedder.embed(&proposal.content).await {
                Ok(embedding) if !embedding.is_empty() => entries_to_add.push(
                    MemoryEntry::new(proposal.content, embedding)
                        .with_source_turn(source_turn)
                        .with_valence(proposal.valence),
                ),
                Ok(_) => warn!(content = %proposal.content, "empty embedding; statement dropped"),
                Err(e) => {
                    warn!(content = %proposal.content, error = %e, "embedding failed; statement dropped")
                }
            }
        }

        if proposed > 0 && entries_to_add.is_empty() && !ids_to_remove.is_empty() {
            warn!(
                withheld = ids_to_remove.len(),
                "no replacement statement could be embedded; retractions withheld"
            );
            return CurationResult::empty();
        }

        info!(
            added = entries_to_add.len(),
            dropped = proposed - entries_to_add.len(),
            removed = ids_to_remove.len(),
            "curation decided"
        );
        CurationResult {
            entries_to_add,
            ids_to_remove,
        }
    }
}

fn reply_schema() -> Option<serde_json::Value> {
    serde_json::to_value(schemars::schema_for!(CuratorReply)).ok()
}

/// Candidate retraction ids: every string, number and object key in the
/// field. Objects may be keyed by id or by position, so both keys and values
/// are offered; [`known_ids`] keeps the ones that name a retrieved memory.
fn reply_ids(field: ListOrMap<serde_json::Value>) -> Vec<String> {
    let mut ids = Vec::new();
    match field {
        ListOrMap::Map(map) => {
            for (key, value) in map {
                ids.push(key);
                collect_ids(value, &mut ids);
            }
        }
        other => {
            for value in other.into_values() {
                collect_ids(value, &mut ids);
            }
        }
    }
    ids
}

fn collect_ids(value: serde_json::Value, ids: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => ids.push(s),
        serde_json::Value::Number(n) => ids.push(n.to_string()),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_ids(item, ids);
            }
        }
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                ids.push(key);
                collect_ids(value, ids);
            }
        }
        serde_json::Value::Null | serde_json::Value::Bool(_) => {}
    }
}

/// The user-context block: the turn, then every retrieved memory with its id.
fn build_context(turn: &[ConversationTurn], retrieved: &[MemoryEntry]) -> String {
    let mut context = String::from("## Conversation turn\n");
    for line in turn {
        context.push_str(&format!("{}: {}\n", line.speaker, line.message.trim()));
    }
    context.push_str("\n## Existing memories\n");
    if retrieved.is_empty() {
        context.push_str("(none)\n");
    }
    for entry in retrieved {
        context.push_str(&format!("- ID: {}, Content: \"{}\"\n", entry.id, entry.content));
    }
    context
}

/// Trim statements, drop blanks and repeats, and parse valence labels.
fn proposals_from(raw: Vec<NewMemory>) -> Vec<Proposal> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|m| {
            let (content, valence) = m.into_parts();
            let content = content.trim().to_string();
            if content.is_empty() || !seen.insert(content.to_lowercase()) {
                return None;
            }
            let valence = valence.and_then(|label| match label.parse::<Valence>() {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!(error = %e, "ignoring valence label");
                    None
                }
            });
            Some(Proposal { content, valence })
        })
        .collect()
}

/// Keep only ids present in `retrieved`.
fn known_ids(ids: Vec<String>, retrieved: &[MemoryEntry]) -> BTreeSet<MemoryId> {
    ids.into_iter()
        .map(|id| MemoryId::from(id.trim()))
        .filter(|id| {
            let known = retrieved.iter().any(|e| &e.id == id);
            if !known {
                debug!(id = %id, "retraction candidate not among retrieved memories; ignored");
            }
            known
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
