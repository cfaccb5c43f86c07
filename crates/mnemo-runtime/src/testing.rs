//! In-crate fakes for the generation and embedding collaborators.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::{Embedder, EmbeddingError};
use crate::llm_driver::{GenerationOptions, Generator, LlmError};

/// One recorded call to [`ScriptedGenerator::generate`].
#[derive(Debug, Clone)]
pub struct Call {
    pub system: String,
    pub context: String,
    pub temperature: f32,
    pub has_schema: bool,
}

/// Replies with canned text in order; errors once the script runs out.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::default(),
        }
    }

    pub fn failing() -> Self {
        let generator = Self::default();
        generator
            .replies
            .lock()
            .unwrap()
            .push_back(Err(LlmError::BadResponse("backend offline".into())));
        generator
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        system_instructions: &str,
        user_context: &str,
        options: GenerationOptions,
    ) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(Call {
            system: system_instructions.to_string(),
            context: user_context.to_string(),
            temperature: options.temperature,
            has_schema: options.schema.is_some(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::BadResponse("script exhausted".into())))
    }
}

/// Topic axes for [`KeywordEmbedder`]; a word matching any keyword lights
/// up that axis.
const TOPICS: &[&[&str]] = &[
    &["ui", "mode", "theme", "interface", "preference", "prefers"],
    &["light"],
    &["dark"],
    &["coffee", "tea", "drink", "drinks"],
    &["dog", "dogs", "cat", "cats", "pet", "pets"],
];

/// Deterministic bag-of-topics embedder.
///
/// Text containing `FAIL` errors, text with no known topic lands on a
/// catch-all axis so every vector has a non-zero norm.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub const DIMENSION: usize = TOPICS.len() + 1;

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; Self::DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
        {
            for (axis, keywords) in TOPICS.iter().enumerate() {
                if keywords.contains(&word.as_str()) {
                    v[axis] = 1.0;
                }
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v[TOPICS.len()] = 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.contains("FAIL") {
            return Err(EmbeddingError::BadResponse("simulated failure".into()));
        }
        Ok(Self::vector(text))
    }
}

/// Embedder whose backend is always down.
pub struct OfflineEmbedder;

#[async_trait]
impl Embedder for OfflineEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::BadResponse("embedding backend offline".into()))
    }
}
