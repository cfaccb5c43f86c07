//! Ollama discovery helpers.
//!
//! Pings the configured model server's `/api/tags` endpoint to list locally
//! downloaded models, so the CLI can warn before the first turn when the chat
//! or embedding model has not been pulled.

use serde::Deserialize;

/// A single model entry returned by Ollama's `/api/tags` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

/// Ping the Ollama server and return the list of available models.
///
/// Returns `Err(reason)` when the server is offline or answers with
/// something other than a tag list.
pub fn fetch_models(base_url: &str) -> Result<Vec<OllamaModel>, String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let response =
        reqwest::blocking::get(&url).map_err(|e| format!("Ollama unreachable at {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("Ollama returned HTTP {}", response.status()));
    }

    let tags: TagsResponse = response
        .json()
        .map_err(|e| format!("Failed to parse Ollama response: {}", e))?;

    Ok(tags.models)
}

/// Whether `wanted` is among `models`. A name without a tag matches its
/// `:latest` variant, as `ollama run` does.
pub fn has_model(models: &[OllamaModel], wanted: &str) -> bool {
    models.iter().any(|m| {
        m.name == wanted
            || (!wanted.contains(':')
                && m.name.strip_suffix(":latest").is_some_and(|base| base == wanted))
    })
}
