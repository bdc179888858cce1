//! `mmrag`: rebuild the vector store from the data directories, search it,
//! answer questions from it, add files to it, and inspect it.
//!
//! Configuration comes from `config.toml`, `config.<RUST_ENV>.toml` and
//! `APP_*` environment variables. Logs go to stderr (`RUST_LOG`, default
//! `info`); results go to stdout.
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mmrag_core::config::Settings;
use mmrag_core::types::{DocumentKind, SearchHit};
use mmrag_embed::{get_default_embedder, EmbeddingClient};
use mmrag_ingest::{upload, IngestionReport, Ingestor};
use mmrag_vector::{Answer, Answerer, SearchEngine, VectorIndex};

#[derive(Parser)]
#[command(name = "mmrag", version, about = "Local multimodal retrieval over images, PDFs, DOCX, Markdown and Excel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector store from every data directory
    Ingest {
        /// Concurrent embedding calls (default: ingest.workers)
        #[arg(long)]
        workers: Option<usize>,
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Nearest stored chunks for a query
    Search {
        query: String,
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
        #[arg(long)]
        json: bool,
    },
    /// Answer a question from the nearest stored chunks
    Ask {
        question: String,
        /// Chunks given to the model as context (default: answer.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Copy a file into the data directory for its kind
    Upload {
        file: PathBuf,
        /// image, pdf, docx, markdown or excel
        #[arg(long)]
        filetype: String,
    },
    /// Show configuration and store contents
    Status,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::load().context("loading configuration")?;

    match cli.command {
        Commands::Ingest { workers, no_progress, json } => {
            let mut ingestor = Ingestor::from_settings(&settings)?;
            if let Some(n) = workers {
                anyhow::ensure!(n > 0, "--workers must be at least 1");
                ingestor.options_mut().workers = n;
            }
            ingestor.options_mut().show_progress = !no_progress;

            let mut index = VectorIndex::create(settings.embedding.dimension)?;
            let report = ingestor.ingest(&settings.data.source_dirs(), &mut index).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Search { query, top_k, json } => {
            let engine = open_engine(&settings)?;
            let hits = engine.search(&query, top_k)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                print_hits(&hits);
            }
        }
        Commands::Ask { question, top_k, json } => {
            let engine = open_engine(&settings)?;
            let top_k = top_k.unwrap_or(settings.answer.top_k);
            let answer = Answerer::from_settings(&settings.answer).answer(&engine, &question, top_k)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Commands::Upload { file, filetype } => {
            let dest = upload(&file, &filetype, &settings.data.source_dirs())?;
            println!("Uploaded {} -> {}", file.display(), dest.display());
            println!("Run `mmrag ingest` to index it.");
        }
        Commands::Status => print_status(&settings)?,
    }
    Ok(())
}

fn open_engine(settings: &Settings) -> anyhow::Result<SearchEngine> {
    let client = EmbeddingClient::new(get_default_embedder(&settings.embedding));
    let engine = SearchEngine::open(
        &settings.store.base_path(),
        settings.embedding.dimension,
        client,
        settings.embedding.model.clone(),
    )?;
    if engine.index().is_empty() {
        info!("store is empty; run `mmrag ingest` first");
    }
    Ok(engine)
}

fn print_report(report: &IngestionReport) {
    println!(
        "Ingested {} documents into {} chunks ({} embedded)",
        report.documents_loaded, report.chunks_total, report.chunks_embedded
    );
    for f in &report.load_failures {
        println!("  load failed   [{}] {}: {}", f.kind, f.path, f.error);
    }
    for f in &report.chunk_failures {
        println!("  embed failed  {}#{}: {}", f.source_file, f.chunk_index, f.error);
    }
    println!("Store: {}", report.store_path.display());
    if !report.is_clean() {
        println!("Completed with {} failures", report.load_failures.len() + report.chunk_failures.len());
    }
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }
    for (rank, hit) in hits.iter().enumerate() {
        let m = &hit.metadata;
        println!("{}. {} [chunk {}] ({}) distance={:.4}", rank + 1, m.source_file, m.chunk_index, m.filetype, hit.distance);
        let preview: String = m.text.chars().take(200).collect();
        println!("   {}", preview.replace('\n', " "));
    }
}

fn print_answer(answer: &Answer) {
    if answer.sources.is_empty() {
        println!("Nothing indexed to answer from.");
        return;
    }
    println!("{}", answer.answer);
    println!();
    println!("Sources:");
    for (rank, hit) in answer.sources.iter().enumerate() {
        println!("  [{}] {} (chunk {})", rank + 1, hit.metadata.source_file, hit.metadata.chunk_index);
    }
}

fn print_status(settings: &Settings) -> anyhow::Result<()> {
    let base = settings.store.base_path();
    println!("Embedding: {:?} backend, model {} (dim {})", settings.embedding.backend, settings.embedding.model, settings.embedding.dimension);
    println!("Chunking:  {} words, {} overlap", settings.chunking.chunk_size, settings.chunking.overlap);
    println!("Answering: model {} (top {} chunks)", settings.answer.model, settings.answer.top_k);
    if VectorIndex::exists(&base) {
        let index = VectorIndex::load(&base)?;
        println!("Store:     {} ({} rows, dim {})", base.display(), index.len(), index.dimension());
    } else {
        println!("Store:     {} (not built)", base.display());
    }
    println!("Data directories:");
    for kind in DocumentKind::ALL {
        let dir = settings.data.dir(kind);
        let files = std::fs::read_dir(&dir)
            .map(|entries| entries.filter_map(Result::ok).filter(|e| kind.matches(&e.path())).count())
            .ok();
        match files {
            Some(n) => println!("  {:<9} {} ({n} files)", kind.as_str(), dir.display()),
            None => println!("  {:<9} {} (missing)", kind.as_str(), dir.display()),
        }
    }
    Ok(())
}
