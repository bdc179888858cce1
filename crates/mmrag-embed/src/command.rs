use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use mmrag_core::command::ToolCommand;
use mmrag_core::error::{Error, Result};
use mmrag_core::traits::Embedder;

/// Embeds by running an external model runner once per text, e.g.
/// `ollama run {model} {text}`. Stdout must be a JSON array of numbers, or an
/// object carrying one under `embedding` (or the first row of `embeddings`).
#[derive(Debug, Clone)]
pub struct CommandEmbedder {
    command: ToolCommand,
    timeout: Duration,
}

impl CommandEmbedder {
    pub fn new(command: ToolCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

impl Embedder for CommandEmbedder {
    fn name(&self) -> &str {
        &self.command.program
    }

    fn embed(&self, model_id: &str, text: &str) -> Result<Vec<f32>> {
        let vars = HashMap::from([("model", model_id), ("text", text)]);
        let output = self.command.run(&vars, self.timeout).map_err(|e| Error::Embedding(e.to_string()))?;
        if !output.status.success() {
            return Err(Error::Embedding(format!(
                "{} exited with {}: {}",
                self.command.program,
                output.status,
                output.stderr.trim()
            )));
        }
        debug!(model = model_id, bytes = output.stdout.len(), "embedding output received");
        parse_vector(&output.stdout)
    }
}

/// Decode a model runner's stdout into a vector.
#[allow(clippy::cast_possible_truncation)]
pub fn parse_vector(raw: &str) -> Result<Vec<f32>> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| Error::Embedding(format!("output is not JSON ({e}): {}", preview(raw))))?;
    let array = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match (map.get("embedding"), map.get("embeddings")) {
            (Some(Value::Array(items)), _) => items,
            (None, Some(Value::Array(rows))) => match rows.first() {
                Some(Value::Array(items)) => items,
                _ => return Err(Error::Embedding("`embeddings` holds no vector".into())),
            },
            _ => return Err(Error::Embedding(format!("no embedding field in output: {}", preview(raw)))),
        },
        _ => return Err(Error::Embedding(format!("expected a numeric array, got: {}", preview(raw)))),
    };
    array
        .iter()
        .map(|item| {
            item.as_f64()
                .map(|x| x as f32)
                .ok_or_else(|| Error::Embedding(format!("non-numeric vector element: {item}")))
        })
        .collect()
}

fn preview(raw: &str) -> String {
    const LIMIT: usize = 120;
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
