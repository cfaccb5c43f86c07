//! [`Reflector`] – slow-cadence revision of persona beliefs.
//!
//! Every so often the engine hands the reflector the persona's current
//! beliefs and a batch of recent memories. The generator is asked whether a
//! trend across several memories justifies rewriting exactly one belief. The
//! reflector only proposes; applying a [`BeliefRevision`] is up to whoever
//! owns the persona.

use std::sync::Arc;

use mnemo_types::{BeliefRevision, MemoryEntry, Valence};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::llm_driver::{GenerationOptions, Generator};
use crate::structured::{Decoded, decode_reply};

pub const DEFAULT_REFLECTOR_TEMPERATURE: f32 = 0.4;
pub const DEFAULT_MIN_ENTRIES: usize = 3;

const REFLECTOR_INSTRUCTIONS: &str = "\
You are the reflective part of a persona's mind. You review the persona's core \
beliefs against a batch of recent memories.

Decide whether the memories show a consistent trend, across several separate \
interactions, that contradicts or meaningfully refines exactly one belief. A \
single interaction is never enough.

If so, rewrite that one belief as an incremental edit. Copy belief_to_update \
exactly as it appears in the list. Never rewrite several beliefs, never add new \
ones.

If no change is warranted, set change_needed to false.

Reply with a JSON object of the form:
{\"change_needed\": true, \"belief_to_update\": \"...\", \"new_belief\": \"...\", \"rationale\": \"...\"}";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ReflectorConfig {
    pub temperature: f32,
    /// Fewer relevant entries than this and reflection is skipped. Values
    /// below 1 behave as 1.
    pub min_entries: usize,
    /// When set, only entries carrying one of these valences are relevant.
    pub valence_filter: Option<Vec<Valence>>,
}

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_REFLECTOR_TEMPERATURE,
            min_entries: DEFAULT_MIN_ENTRIES,
            valence_filter: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reply shape
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct ReflectorReply {
    #[serde(default)]
    change_needed: Option<bool>,
    #[serde(default)]
    belief_to_update: Option<String>,
    #[serde(default)]
    new_belief: Option<String>,
    #[serde(default, alias = "reasoning")]
    rationale: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reflector
// ─────────────────────────────────────────────────────────────────────────────

pub struct Reflector {
    generator: Arc<dyn Generator>,
    config: ReflectorConfig,
}

impl Reflector {
    pub fn new(generator: Arc<dyn Generator>, config: ReflectorConfig) -> Self {
        Self { generator, config }
    }

    pub fn config(&self) -> &ReflectorConfig {
        &self.config
    }

    /// Propose at most one revision of `current_beliefs` grounded in
    /// `recent_entries`.
    ///
    /// Returns `None` without calling the generator when there are too few
    /// relevant entries, and `None` for any failed, declined or incomplete
    /// reply.
    pub async fn evaluate(
        &self,
        current_beliefs: &[String],
        recent_entries: &[MemoryEntry],
    ) -> Option<BeliefRevision> {
        if current_beliefs.is_empty() {
            debug!("no beliefs to revise; reflection skipped");
            return None;
        }
        let relevant: Vec<&MemoryEntry> = recent_entries
            .iter()
            .filter(|e| self.is_relevant(e))
            .collect();
        let needed = self.config.min_entries.max(1);
        if relevant.len() < needed {
            debug!(relevant = relevant.len(), needed, "too few memories; reflection skipped");
            return None;
        }

        let context = build_context(current_beliefs, &relevant);
        let mut options = GenerationOptions::with_temperature(self.config.temperature);
        if let Ok(schema) = serde_json::to_value(schemars::schema_for!(ReflectorReply)) {
            options = options.schema(schema);
        }

        let raw = match self
            .generator
            .generate(REFLECTOR_INSTRUCTIONS, &context, options)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "reflection generation failed; beliefs unchanged");
                return None;
            }
        };

        let reply: ReflectorReply = match decode_reply(&raw) {
            Decoded::Parsed(reply) => reply,
            Decoded::Malformed(reason) => {
                warn!(%reason, "reflection reply malformed; beliefs unchanged");
                return None;
            }
        };

        let revision = validate(reply, current_beliefs)?;
        info!(
            belief = %revision.belief_to_replace,
            replacement = %revision.replacement,
            "belief revision proposed"
        );
        Some(revision)
    }

    fn is_relevant(&self, entry: &MemoryEntry) -> bool {
        match &self.config.valence_filter {
            None => true,
            Some(allowed) => entry.valence.is_some_and(|v| allowed.contains(&v)),
        }
    }
}

fn build_context(beliefs: &[String], entries: &[&MemoryEntry]) -> String {
    let mut context = String::from("## Current beliefs\n");
    for belief in beliefs {
        context.push_str(&format!("- {belief}\n"));
    }
    context.push_str("\n## Recent memories\n");
    for entry in entries {
        match entry.valence {
            Some(v) => context.push_str(&format!("- [{v}] {}\n", entry.content)),
            None => context.push_str(&format!("- {}\n", entry.content)),
        }
    }
    context
}

/// Turn a reply into a revision, or `None` if it declines, is incomplete,
/// names an unknown belief or changes nothing.
fn validate(reply: ReflectorReply, beliefs: &[String]) -> Option<BeliefRevision> {
    if reply.change_needed == Some(false) {
        debug!("reflection found no change needed");
        return None;
    }
    let non_blank = |field: Option<String>| field.filter(|s| !s.trim().is_empty());
    let (Some(target), Some(replacement), Some(rationale)) = (
        non_blank(reply.belief_to_update),
        non_blank(reply.new_belief),
        non_blank(reply.rationale),
    ) else {
        warn!("reflection reply missing required fields; ignored");
        return None;
    };

    let Some(existing) = beliefs.iter().find(|b| b.trim() == target.trim()) else {
        warn!(belief = %target, "reflection targeted an unknown belief; ignored");
        return None;
    };
    let replacement = replacement.trim().to_string();
    if replacement == existing.trim() {
        debug!("reflection proposed an identical belief; ignored");
        return None;
    }

    Some(BeliefRevision {
        belief_to_replace: existing.clone(),
        replacement,
        rationale: rationale.trim().to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    fn beliefs() -> Vec<String> {
        vec![
            "I am a helpful assistant.".to_string(),
            "People generally prefer bright interfaces.".to_string(),
        ]
    }

    fn memories(n: usize, valence: Option<Valence>) -> Vec<MemoryEntry> {
        (0..n)
            .map(|i| MemoryEntry::new(format!("Memory {i}"), vec![1.0]).with_valence(valence))
            .collect()
    }

    const GOOD_REPLY: &str = r#"{"change_needed": true,
        "belief_to_update": "People generally prefer bright interfaces.",
        "new_belief": "Many people prefer dark interfaces.",
        "reasoning": "Several users switched to dark mode."}"#;

    #[tokio::test]
    async fn empty_batch_skips_generation() {
        let generator = Arc::new(ScriptedGenerator::new([GOOD_REPLY]));
        let reflector = Reflector::new(generator.clone(), ReflectorConfig::default());
        assert!(reflector.evaluate(&beliefs(), &[]).await.is_none());
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn too_few_entries_skips_generation() {
        let generator = Arc::new(ScriptedGenerator::new([GOOD_REPLY]));
        let reflector = Reflector::new(generator.clone(), ReflectorConfig::default());
        assert!(reflector.evaluate(&beliefs(), &memories(2, None)).await.is_none());
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn valence_filter_counts_only_matching_entries() {
        let generator = Arc::new(ScriptedGenerator::new([GOOD_REPLY]));
        let config = ReflectorConfig {
            valence_filter: Some(vec![Valence::Positive]),
            ..ReflectorConfig::default()
        };
        let reflector = Reflector::new(generator.clone(), config);
        let mut batch = memories(2, Some(Valence::Positive));
        batch.extend(memories(5, Some(Valence::Negative)));
        batch.extend(memories(5, None));
        assert!(reflector.evaluate(&beliefs(), &batch).await.is_none());
        assert!(generator.calls().is_empty());

        batch.extend(memories(1, Some(Valence::Positive)));
        assert!(reflector.evaluate(&beliefs(), &batch).await.is_some());
        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].context.contains("[positive] Memory 0"));
        assert!(!calls[0].context.contains("[negative]"));
    }

    #[tokio::test]
    async fn valid_reply_becomes_revision() {
        let generator = Arc::new(ScriptedGenerator::new([GOOD_REPLY]));
        let reflector = Reflector::new(generator.clone(), ReflectorConfig::default());
        let revision = reflector.evaluate(&beliefs(), &memories(3, None)).await.unwrap();
        assert_eq!(revision.belief_to_replace, "People generally prefer bright interfaces.");
        assert_eq!(revision.replacement, "Many people prefer dark interfaces.");
        assert_eq!(revision.rationale, "Several users switched to dark mode.");

        let call = &generator.calls()[0];
        assert!(call.context.contains("- I am a helpful assistant."));
        assert!(call.context.contains("- Memory 2"));
        assert!((call.temperature - DEFAULT_REFLECTOR_TEMPERATURE).abs() < f32::EPSILON);

        let mut persona = beliefs();
        assert!(revision.apply_to(&mut persona));
        assert_eq!(persona[1], "Many people prefer dark interfaces.");
    }

    #[tokio::test]
    async fn declined_or_incomplete_replies_yield_nothing() {
        for raw in [
            r#"{"change_needed": false}"#,
            r#"{"change_needed": true, "belief_to_update": "I am a helpful assistant.", "new_belief": "I am terse."}"#,
            r#"{"change_needed": true, "belief_to_update": "I am a helpful assistant.", "new_belief": "  ", "rationale": "x"}"#,
            r#"{"change_needed": true, "belief_to_update": "I love jazz.", "new_belief": "I love rock.", "rationale": "x"}"#,
            r#"{"belief_to_update": "I am a helpful assistant.", "new_belief": "I am a helpful assistant.", "rationale": "x"}"#,
            "no json at all",
        ] {
            let reflector = Reflector::new(
                Arc::new(ScriptedGenerator::new([raw])),
                ReflectorConfig::default(),
            );
            assert!(
                reflector.evaluate(&beliefs(), &memories(3, None)).await.is_none(),
                "expected no revision for {raw:?}"
            );
        }
    }

    #[tokio::test]
    async fn target_is_matched_after_trimming() {
        let raw = r#"{"belief_to_update": "  I am a helpful assistant. ", "new_belief": "I am a candid assistant.", "rationale": "Users asked for blunt answers."}"#;
        let reflector = Reflector::new(
            Arc::new(ScriptedGenerator::new([raw])),
            ReflectorConfig::default(),
        );
        let revision = reflector.evaluate(&beliefs(), &memories(3, None)).await.unwrap();
        assert_eq!(revision.belief_to_replace, "I am a helpful assistant.");
    }

    #[tokio::test]
    async fn generation_failure_yields_nothing() {
        let reflector = Reflector::new(Arc::new(ScriptedGenerator::failing()), ReflectorConfig::default());
        assert!(reflector.evaluate(&beliefs(), &memories(3, None)).await.is_none());
    }

    #[tokio::test]
    async fn zero_min_entries_still_needs_one() {
        let generator = Arc::new(ScriptedGenerator::new([GOOD_REPLY]));
        let config = ReflectorConfig { min_entries: 0, ..ReflectorConfig::default() };
        let reflector = Reflector::new(generator.clone(), config);
        assert!(reflector.evaluate(&beliefs(), &[]).await.is_none());
        assert!(reflector.evaluate(&beliefs(), &memories(1, None)).await.is_some());
    }
}
