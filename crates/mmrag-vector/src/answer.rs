//! Single-shot question answering: retrieve the nearest chunks, then hand
//! them to a language model as context.
use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use mmrag_core::command::{render, ToolCommand};
use mmrag_core::config::AnswerSettings;
use mmrag_core::error::{Error, Result};
use mmrag_core::types::SearchHit;

use crate::search::SearchEngine;

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    /// Empty when nothing was retrieved and the model was not asked.
    pub answer: String,
    pub sources: Vec<SearchHit>,
}

#[derive(Debug, Clone)]
pub struct Answerer {
    command: ToolCommand,
    model: String,
    prompt: String,
    timeout: Duration,
}

impl Answerer {
    pub fn from_settings(settings: &AnswerSettings) -> Self {
        Self {
            command: settings.command.clone(),
            model: settings.model.clone(),
            prompt: settings.prompt.clone(),
            timeout: settings.timeout(),
        }
    }

    pub fn answer(&self, engine: &SearchEngine, question: &str, top_k: usize) -> Result<Answer> {
        let sources = engine.search(question, top_k)?;
        if sources.is_empty() {
            info!("no chunks retrieved; not asking the model");
            return Ok(Answer { question: question.to_string(), answer: String::new(), sources });
        }

        let prompt = build_prompt(&self.prompt, question, &sources);
        debug!(model = %self.model, context_chunks = sources.len(), prompt_chars = prompt.len(), "asking model");
        let vars = HashMap::from([("model", self.model.as_str()), ("prompt", prompt.as_str())]);
        let answer = self.command.run_stdout(&vars, self.timeout)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::Tool { program: self.command.program.clone(), message: "model returned no text".into() });
        }
        Ok(Answer { question: question.to_string(), answer: answer.to_string(), sources })
    }
}

/// Fill `{context}` and `{question}`. Each hit becomes a numbered block
/// headed by its source file and chunk index.
pub fn build_prompt(template: &str, question: &str, hits: &[SearchHit]) -> String {
    let context = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let m = &hit.metadata;
            format!("[{}] {} (chunk {})\n{}", i + 1, m.source_file, m.chunk_index, m.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    render(template, &HashMap::from([("context", context.as_str()), ("question", question)]))
}
