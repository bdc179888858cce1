//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_EMBEDDING__MODEL`).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::chunker::ChunkingConfig;
use crate::command::ToolCommand;
use crate::error::{Error, Result};
use crate::types::{DocumentKind, SourceDirs};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Config(format!("Failed to get '{key}': {e}")))
    }

    /// The full typed settings tree, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingConfig,
    pub store: StoreSettings,
    pub caption: CaptionSettings,
    pub answer: AnswerSettings,
    pub loaders: LoaderSettings,
    pub ingest: IngestSettings,
}

impl Settings {
    /// `config.toml` + `config.<env>.toml` + `APP_*` overrides.
    pub fn load() -> Result<Self> {
        Config::load()?.settings()
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfiguration("embedding.dimension must be greater than zero".into()));
        }
        if self.ingest.workers == 0 {
            return Err(Error::InvalidConfiguration("ingest.workers must be at least 1".into()));
        }
        if self.answer.top_k == 0 {
            return Err(Error::InvalidConfiguration("answer.top_k must be at least 1".into()));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(Error::InvalidConfiguration("embedding.model must not be empty".into()));
        }
        Ok(())
    }
}

/// One directory per document kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub images: String,
    pub pdf: String,
    pub docx: String,
    pub markdown: String,
    pub excel: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            images: "data/images".into(),
            pdf: "data/pdf".into(),
            docx: "data/docx".into(),
            markdown: "data/markdown".into(),
            excel: "data/excel".into(),
        }
    }
}

impl DataSettings {
    pub fn dir(&self, kind: DocumentKind) -> PathBuf {
        let raw = match kind {
            DocumentKind::Image => &self.images,
            DocumentKind::Pdf => &self.pdf,
            DocumentKind::Docx => &self.docx,
            DocumentKind::Markdown => &self.markdown,
            DocumentKind::Excel => &self.excel,
        };
        expand_path(raw)
    }

    pub fn source_dirs(&self) -> SourceDirs {
        DocumentKind::ALL.into_iter().map(|k| (k, self.dir(k))).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// External model runner invoked per call.
    Command,
    /// Deterministic hashing embedder, for tests and offline runs.
    Fake,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub dimension: usize,
    pub command: ToolCommand,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Command,
            model: "nomic-embed-text:v1.5".into(),
            dimension: 768,
            command: ToolCommand::new("ollama", ["run", "{model}", "{text}"]),
            timeout_secs: 120,
        }
    }
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Base path; the index writes `<path>.index` and `<path>.meta`.
    pub path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { path: "storage/vector_store".into() }
    }
}

impl StoreSettings {
    pub fn base_path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionSettings {
    pub model: String,
    pub command: ToolCommand,
    /// `{ocr_text}` is replaced with the text recognised in the image.
    pub prompt: String,
    pub timeout_secs: u64,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            model: "gemma3:12b".into(),
            command: ToolCommand::new("ollama", ["run", "{model}", "{prompt}"]),
            prompt: "Describe the following instructional image based on its OCR text:\n\n{ocr_text}\n\nCaption:".into(),
            timeout_secs: 300,
        }
    }
}

impl CaptionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Question answering over retrieved chunks. The prompt template takes
/// `{context}` (the retrieved chunk texts) and `{question}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerSettings {
    pub model: String,
    pub command: ToolCommand,
    pub prompt: String,
    /// Chunks retrieved as context.
    pub top_k: usize,
    pub timeout_secs: u64,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            model: "gemma3:12b".into(),
            command: ToolCommand::new("ollama", ["run", "{model}", "{prompt}"]),
            prompt: "Answer the question using only the context below. If the context does not contain \
                     the answer, say so.\n\nContext:\n{context}\n\nQuestion: {question}\n\nAnswer:"
                .into(),
            top_k: 5,
            timeout_secs: 300,
        }
    }
}

impl AnswerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Converters for the formats mmrag does not parse itself. `{path}` is the
/// absolute path of the input file; each must print plain text to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    pub ocr: ToolCommand,
    pub pdf: ToolCommand,
    pub docx: ToolCommand,
    pub excel: ToolCommand,
    pub timeout_secs: u64,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            ocr: ToolCommand::new("tesseract", ["{path}", "stdout"]),
            pdf: ToolCommand::new("pdftotext", ["-layout", "{path}", "-"]),
            docx: ToolCommand::new("pandoc", ["-t", "plain", "{path}"]),
            excel: ToolCommand::new("xlsx2csv", ["-a", "{path}"]),
            timeout_secs: 120,
        }
    }
}

impl LoaderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Concurrent embedding calls during ingestion.
    pub workers: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
