use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use mmrag_core::chunker::ChunkingConfig;
use mmrag_core::error::{Error, Result};
use mmrag_core::traits::Embedder;
use mmrag_core::types::{DocumentKind, SourceDirs};
use mmrag_embed::{EmbeddingClient, FakeEmbedder};
use mmrag_ingest::loaders::MarkdownLoader;
use mmrag_ingest::{IngestOptions, Ingestor, LoaderRegistry};
use mmrag_vector::{vectors_path, VectorIndex};

const DIM: usize = 32;

fn sources(root: &Path) -> SourceDirs {
    DocumentKind::ALL.iter().map(|k| (*k, root.join(k.as_str()))).collect()
}

fn options(root: &Path, workers: usize) -> IngestOptions {
    IngestOptions {
        model_id: "test-model".into(),
        chunking: ChunkingConfig::new(8, 2).expect("chunking"),
        workers,
        store_path: root.join("storage/vector_store"),
        show_progress: false,
    }
}

fn markdown_ingestor(root: &Path, embedder: Arc<dyn Embedder>, workers: usize) -> Ingestor {
    let mut registry = LoaderRegistry::new();
    registry.register(MarkdownLoader);
    Ingestor::new(registry, EmbeddingClient::new(embedder), options(root, workers)).expect("ingestor")
}

fn write_md(root: &Path, name: &str, body: &str) {
    let dir = root.join("markdown");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join(name), body).expect("write");
}

fn words(prefix: &str, n: usize) -> String {
    (0..n).map(|i| format!("{prefix}{i}")).collect::<Vec<_>>().join(" ")
}

/// Fails on any chunk containing the word "poison".
struct Poisoned(FakeEmbedder);

impl Embedder for Poisoned {
    fn name(&self) -> &str {
        "poisoned"
    }

    fn embed(&self, model_id: &str, text: &str) -> Result<Vec<f32>> {
        if text.split_whitespace().any(|w| w == "poison") {
            return Err(Error::Embedding("model refused input".into()));
        }
        self.0.embed(model_id, text)
    }
}

/// Slower for earlier chunks, so completion order is the reverse of submission.
struct Staggered(FakeEmbedder);

impl Embedder for Staggered {
    fn name(&self) -> &str {
        "staggered"
    }

    fn embed(&self, model_id: &str, text: &str) -> Result<Vec<f32>> {
        let delay = if text.contains("first0") { 120 } else if text.contains("second0") { 60 } else { 0 };
        thread::sleep(Duration::from_millis(delay));
        self.0.embed(model_id, text)
    }
}

struct WrongDimension;

impl Embedder for WrongDimension {
    fn name(&self) -> &str {
        "wrong-dimension"
    }

    fn embed(&self, _model_id: &str, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.5; DIM + 1])
    }
}

#[tokio::test]
async fn markdown_directory_is_indexed_and_saved() {
    let tmp = TempDir::new().expect("tmp");
    let data = tmp.path().join("data");
    write_md(&data, "b.md", &words("bee", 12));
    write_md(&data, "a.md", &words("ant", 5));
    write_md(&data, "notes.txt", "ignored");

    let ingestor = markdown_ingestor(tmp.path(), Arc::new(FakeEmbedder::new(DIM)), 2);
    let mut index = VectorIndex::create(DIM).expect("create");
    let report = ingestor.ingest(&sources(&data), &mut index).await.expect("ingest");

    assert_eq!(report.documents_loaded, 2);
    // a.md: 5 words -> 1 chunk; b.md: 12 words, size 8 step 6 -> 0..8, 6..12.
    assert_eq!(report.chunks_total, 3);
    assert_eq!(report.chunks_embedded, 3);
    assert!(report.is_clean());
    assert_eq!(report.store_path, tmp.path().join("storage/vector_store"));

    let rows: Vec<(String, usize)> =
        index.metadata().iter().map(|m| (m.source_file.clone(), m.chunk_index)).collect();
    assert_eq!(rows, vec![("a.md".into(), 0), ("b.md".into(), 0), ("b.md".into(), 1)]);
    assert_eq!(index.metadata()[2].text, words("bee", 12).split(' ').skip(6).collect::<Vec<_>>().join(" "));
    assert!(index.metadata().iter().all(|m| m.filetype == "md"));

    let loaded = VectorIndex::load(&report.store_path).expect("load saved store");
    assert_eq!(loaded, index);
}

#[tokio::test]
async fn failed_chunks_are_reported_and_the_rest_indexed() {
    let tmp = TempDir::new().expect("tmp");
    let data = tmp.path().join("data");
    write_md(&data, "good.md", "sharpen the axe before winter");
    write_md(&data, "bad.md", "this chunk is poison to the model");
    fs::write(data.join("markdown/broken.md"), [0xff, 0xfe]).expect("write");

    let ingestor = markdown_ingestor(tmp.path(), Arc::new(Poisoned(FakeEmbedder::new(DIM))), 3);
    let mut index = VectorIndex::create(DIM).expect("create");
    let report = ingestor.ingest(&sources(&data), &mut index).await.expect("ingest");

    assert!(!report.is_clean());
    assert_eq!(report.documents_loaded, 2);
    assert_eq!(report.load_failures.len(), 1);
    assert!(report.load_failures[0].path.ends_with("broken.md"));
    assert_eq!(report.chunks_total, 2);
    assert_eq!(report.chunks_embedded, 1);
    assert_eq!(report.chunk_failures.len(), 1);
    assert_eq!(report.chunk_failures[0].source_file, "bad.md");
    assert_eq!(report.chunk_failures[0].chunk_index, 0);
    assert!(report.chunk_failures[0].error.contains("model refused input"));

    assert_eq!(index.len(), 1);
    assert_eq!(index.metadata()[0].source_file, "good.md");
}

#[tokio::test]
async fn rows_follow_submission_order_under_concurrency() {
    let tmp = TempDir::new().expect("tmp");
    let data = tmp.path().join("data");
    write_md(&data, "1.md", &words("first", 4));
    write_md(&data, "2.md", &words("second", 4));
    write_md(&data, "3.md", &words("third", 4));

    let ingestor = markdown_ingestor(tmp.path(), Arc::new(Staggered(FakeEmbedder::new(DIM))), 3);
    let mut index = VectorIndex::create(DIM).expect("create");
    ingestor.ingest(&sources(&data), &mut index).await.expect("ingest");

    let order: Vec<&str> = index.metadata().iter().map(|m| m.source_file.as_str()).collect();
    assert_eq!(order, vec!["1.md", "2.md", "3.md"]);
}

#[tokio::test]
async fn ingest_rebuilds_instead_of_appending() {
    let tmp = TempDir::new().expect("tmp");
    let data = tmp.path().join("data");
    write_md(&data, "only.md", "rotate the compost pile weekly");

    let ingestor = markdown_ingestor(tmp.path(), Arc::new(FakeEmbedder::new(DIM)), 2);
    let mut index = VectorIndex::create(DIM).expect("create");
    ingestor.ingest(&sources(&data), &mut index).await.expect("first run");
    ingestor.ingest(&sources(&data), &mut index).await.expect("second run");
    assert_eq!(index.len(), 1);

    fs::remove_file(data.join("markdown/only.md")).expect("remove");
    let report = ingestor.ingest(&sources(&data), &mut index).await.expect("third run");
    assert_eq!(report.chunks_total, 0);
    assert!(index.is_empty());
    assert!(VectorIndex::load(&report.store_path).expect("load").is_empty());
}

#[tokio::test]
async fn missing_directories_produce_an_empty_store() {
    let tmp = TempDir::new().expect("tmp");
    let ingestor = markdown_ingestor(tmp.path(), Arc::new(FakeEmbedder::new(DIM)), 1);
    let mut index = VectorIndex::create(DIM).expect("create");
    let report = ingestor.ingest(&sources(&tmp.path().join("nowhere")), &mut index).await.expect("ingest");

    assert!(report.is_clean());
    assert_eq!(report.documents_loaded, 0);
    assert!(vectors_path(&report.store_path).is_file());
}

#[tokio::test]
async fn dimension_mismatch_aborts_without_saving() {
    let tmp = TempDir::new().expect("tmp");
    let data = tmp.path().join("data");
    write_md(&data, "a.md", "one two three");

    let ingestor = markdown_ingestor(tmp.path(), Arc::new(WrongDimension), 1);
    let mut index = VectorIndex::create(DIM).expect("create");
    let err = ingestor.ingest(&sources(&data), &mut index).await.expect_err("mismatch");

    assert!(matches!(err, Error::DimensionMismatch { expected, actual, .. } if expected == DIM && actual == DIM + 1));
    assert!(!VectorIndex::exists(&tmp.path().join("storage/vector_store")));
}

#[cfg(unix)]
#[tokio::test]
async fn every_kind_flows_through_its_loader() {
    use mmrag_core::command::ToolCommand;
    use mmrag_core::config::Settings;

    let tmp = TempDir::new().expect("tmp");
    let data = tmp.path().join("data");
    for (dir, file) in
        [("image", "valve.png"), ("pdf", "pump.pdf"), ("docx", "coop.docx"), ("excel", "seeds.xlsx")]
    {
        fs::create_dir_all(data.join(dir)).expect("mkdir");
        fs::write(data.join(dir).join(file), "binary").expect("write");
    }
    write_md(&data, "garden.md", "water tomatoes at dawn");

    let converter = ToolCommand::new("sh", ["-c", r#"echo "converted $(basename "$1")""#, "sh", "{path}"]);
    let mut settings = Settings::default();
    settings.loaders.ocr = ToolCommand::new("sh", ["-c", "echo OPEN", "sh", "{path}"]);
    settings.loaders.pdf = converter.clone();
    settings.loaders.docx = converter.clone();
    settings.loaders.excel = converter;
    settings.caption.command = ToolCommand::new("sh", ["-c", r#"echo "caption for $1""#, "sh", "{model}", "{prompt}"]);

    let registry = LoaderRegistry::from_settings(&settings);
    let client = EmbeddingClient::new(Arc::new(FakeEmbedder::new(DIM)));
    let ingestor = Ingestor::new(registry, client, options(tmp.path(), 4)).expect("ingestor");
    let mut index = VectorIndex::create(DIM).expect("create");
    let report = ingestor.ingest(&sources(&data), &mut index).await.expect("ingest");

    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.documents_loaded, 5);
    let sources: Vec<&str> = index.metadata().iter().map(|m| m.source_file.as_str()).collect();
    assert_eq!(sources, vec!["valve.png", "pump.pdf", "coop.docx", "garden.md", "seeds.xlsx"]);

    let image = &index.metadata()[0];
    assert_eq!(image.filetype, "png");
    assert_eq!(image.text, "caption for gemma3:12b");
    assert_eq!(image.extra["ocr_text"], "OPEN");
    assert!(image.extra["image_path"].as_str().is_some_and(|p| p.ends_with("valve.png")));
    assert_eq!(index.metadata()[1].text, "converted pump.pdf");
}
