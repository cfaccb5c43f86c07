//! `mnemo-runtime` – The Memory Pipeline
//!
//! Everything that talks to a model lives here: the generation and embedding
//! collaborators, the curation and reflection protocols built on them, and
//! the [`MemoryEngine`] that strings them together turn by turn.
//!
//! # Modules
//!
//! - [`llm_driver`] – the [`Generator`] seam and
//!   [`LlmDriver`], an async OpenAI-compatible client for local models such as
//!   [Ollama](https://ollama.com). A JSON schema derived from each reply type
//!   is sent via `response_format` to steer the model toward parseable output.
//! - [`embedding`] – the [`Embedder`] seam and [`EmbeddingDriver`].
//! - [`structured`] – pulls the first balanced JSON object out of free text
//!   and decodes it into a typed reply or an explicit malformed marker.
//! - [`curator`] – [`Curator`]: decides which memories a turn adds and which
//!   it retracts.
//! - [`reflector`] – [`Reflector`]: proposes a single belief revision from a
//!   trend in recent memories.
//! - [`engine`] – [`MemoryEngine`]: retrieve, curate, commit, reflect.
//! - [`telemetry`] – [`init_tracing`]: console logs plus an optional OTLP span
//!   exporter enabled by `OTEL_EXPORTER_OTLP_ENDPOINT`.
//!
//! # Failure model
//!
//! Nothing in the pipeline aborts a conversation. Generation, decoding,
//! embedding and snapshot failures are logged and the turn continues with
//! memory unchanged.

pub mod curator;
pub mod embedding;
pub mod engine;
pub mod llm_driver;
pub mod reflector;
pub mod structured;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use curator::{Curator, CuratorConfig};
pub use embedding::{Embedder, EmbeddingDriver, EmbeddingError};
pub use engine::{EngineConfig, MemoryEngine, TurnReport};
pub use llm_driver::{GenerationOptions, Generator, LlmDriver, LlmError};
pub use reflector::{Reflector, ReflectorConfig};
pub use structured::{Decoded, decode_reply, extract_json_object};
pub use telemetry::{TracerProviderGuard, init_tracing};
