//! [`LlmDriver`] – OpenAI-compatible text generation.
//!
//! The memory engine only depends on the [`Generator`] trait: hand it system
//! instructions and a user context, get back raw text that should contain one
//! JSON object. [`LlmDriver`] is the production implementation and talks to a
//! model server exposing `/v1/chat/completions`, such as
//! [Ollama](https://ollama.com) (`http://localhost:11434`).
//!
//! # Example
//!
//! ```rust,no_run
//! use mnemo_runtime::llm_driver::{GenerationOptions, Generator, LlmDriver};
//!
//! # async fn demo() -> Result<(), mnemo_runtime::LlmError> {
//! let driver = LlmDriver::new("http://localhost:11434", "llama3");
//! let raw = driver
//!     .generate(
//!         "You summarise conversations.",
//!         "User: hi\nAgent: hello",
//!         GenerationOptions::with_temperature(0.2),
//!     )
//!     .await?;
//! # let _ = raw;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Output guidelines
// ─────────────────────────────────────────────────────────────────────────────

/// Output rules appended to every system message sent by [`LlmDriver`].
pub const JSON_OUTPUT_GUIDELINES: &str = "\
## Output Rules
- Respond with exactly one JSON object.
- Do not wrap the object in prose or markdown.
- Use only the keys described above.";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from text generation.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be parsed.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Generator seam
// ─────────────────────────────────────────────────────────────────────────────

/// Per-call generation settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    /// JSON Schema the reply object should follow, when the backend supports
    /// constrained decoding.
    pub schema: Option<serde_json::Value>,
}

impl GenerationOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            schema: None,
        }
    }

    pub fn schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// The external text-generation collaborator.
///
/// Implementations return the model's raw text. Callers must tolerate prose
/// around the JSON object and treat a missing or malformed object as a
/// recoverable condition.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        system_instructions: &str,
        user_context: &str,
        options: GenerationOptions,
    ) -> Result<String, LlmError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a participant in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
    JsonObject,
    JsonSchema { json_schema: JsonSchemaFormat },
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    schema: serde_json::Value,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Build the two-message conversation for one generation call, with
/// [`JSON_OUTPUT_GUIDELINES`] appended to the system instructions.
fn build_messages(system_instructions: &str, user_context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: Role::System,
            content: format!("{}\n\n{}", system_instructions.trim_end(), JSON_OUTPUT_GUIDELINES),
        },
        ChatMessage {
            role: Role::User,
            content: user_context.to_string(),
        },
    ]
}

fn response_format(schema: Option<serde_json::Value>) -> ResponseFormat {
    match schema {
        Some(schema) => ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat {
                name: "reply",
                schema,
            },
        },
        None => ResponseFormat::JsonObject,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// An async client for an OpenAI-compatible chat-completions endpoint.
///
/// Construct once and pass it (behind an `Arc`) to every component that
/// needs generation.
pub struct LlmDriver {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmDriver {
    /// Create a new driver pointing at `base_url` (e.g. `"http://localhost:11434"`)
    /// and using `model` (e.g. `"llama3"`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for LlmDriver {
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the request fails, or
    /// [`LlmError::BadResponse`] if the response shape is unexpected.
    async fn generate(
        &self,
        system_instructions: &str,
        user_context: &str,
        options: GenerationOptions,
    ) -> Result<String, LlmError> {
        let messages = build_messages(system_instructions, user_context);
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
            temperature: options.temperature,
            response_format: response_format(options.schema),
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: ChatResponse = request.send().await?.error_for_status()?.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_serializes_role() {
        let msg = ChatMessage {
            role: Role::System,
            content: "hello".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"system\""));
    }

    #[test]
    fn output_guidelines_are_appended_to_system_message() {
        let messages = build_messages("You curate memories.\n", "User: hi");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("You curate memories."));
        assert!(messages[0].content.contains("Output Rules"));
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "User: hi");
    }

    #[test]
    fn request_without_schema_asks_for_json_object() {
        let messages = build_messages("sys", "ctx");
        let body = ChatRequest {
            model: "llama3",
            messages: &messages,
            stream: false,
            temperature: 0.2,
            response_format: response_format(None),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!((json["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn request_with_schema_embeds_it() {
        let messages = build_messages("sys", "ctx");
        let schema = serde_json::json!({ "type": "object" });
        let body = ChatRequest {
            model: "llama3",
            messages: &messages,
            stream: false,
            temperature: 0.4,
            response_format: response_format(Some(schema.clone())),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["schema"], schema);
    }

    #[test]
    fn empty_api_key_is_ignored() {
        let driver = LlmDriver::new("http://localhost:11434", "llama3").with_api_key("");
        assert!(driver.api_key.is_none());
        let driver = driver.with_api_key("sk-test");
        assert_eq!(driver.api_key.as_deref(), Some("sk-test"));
    }

    #[tokio::test]
    async fn generate_returns_http_error_when_server_unavailable() {
        // Port 9 (discard) is not an HTTP server; the call must fail cleanly.
        let driver = LlmDriver::new("http://127.0.0.1:9", "llama3");
        let result = driver
            .generate("sys", "ctx", GenerationOptions::with_temperature(0.2))
            .await;
        assert!(matches!(result, Err(LlmError::Http(_))));
    }
}
