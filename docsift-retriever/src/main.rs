use clap::{Parser, Subcommand, ValueEnum};
use docsift_embed::FastEmbedProvider;
use docsift_retriever::{
    DocsiftConfig, EntryStore, Fingerprint, ProgressEvent, RetrievalPipeline, SqliteEntryStore,
    fingerprint::fingerprint_file, storage::sqlite_store::DB_FILE_NAME,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Ask questions of documents; each document is chunked and embedded once and cached by content.
#[derive(Parser, Debug)]
#[command(name = "docsift", author, version, about, long_about = None)]
struct Args {
    /// Directory holding the cache database (overrides the config file)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Configuration file (defaults to ./docsift.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the content fingerprint of a document
    Fingerprint {
        path: PathBuf,
    },
    /// Chunk, embed and cache a document without querying it
    Ingest {
        path: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Find the chunks of a document closest to a question
    Query {
        path: PathBuf,
        question: String,
        /// Number of chunks to return (defaults to `top_k` from the config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// List cached documents, most recently used first
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Show cache size statistics
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Remove one cached document by fingerprint (hex)
    Invalidate {
        fingerprint: String,
    },
    /// Remove every cached document
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

#[derive(Serialize)]
struct IngestOutput<'a> {
    fingerprint: Fingerprint,
    was_cache_hit: bool,
    chunk_count: usize,
    dimension: usize,
    steps: &'a [String],
}

#[derive(Serialize)]
struct CacheSummary {
    database: PathBuf,
    documents: usize,
    total_chunks: usize,
    total_document_bytes: u64,
    database_bytes: u64,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = DocsiftConfig::load(args.config.as_deref())?;
    if let Some(cache_dir) = args.cache_dir {
        config = config.with_cache_dir(cache_dir);
    }

    match args.command {
        Commands::Fingerprint { path } => {
            let fingerprint = fingerprint_file(&path).await?;
            println!("{fingerprint}  {}", path.display());
            Ok(())
        }
        Commands::Ingest { path, format } => {
            let document = read_document(&path).await?;
            let (pipeline, printer) = open_pipeline(&config).await?;
            let prepared = pipeline.prepare(&document).await;
            finish_progress(pipeline, printer).await;
            let prepared = prepared?;

            if let Some(report) = &prepared.persist_error {
                eprintln!("Warning: result was not cached: {report}");
            }
            let output = IngestOutput {
                fingerprint: prepared.fingerprint,
                was_cache_hit: prepared.was_cache_hit,
                chunk_count: prepared.entry.chunk_count(),
                dimension: prepared.entry.index.dimension(),
                steps: &prepared.steps,
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                OutputFormat::Summary | OutputFormat::Full => {
                    println!("Document: {}", path.display());
                    println!("Fingerprint: {}", output.fingerprint);
                    println!(
                        "Cache: {}",
                        if output.was_cache_hit { "hit" } else { "miss (built)" }
                    );
                    println!("Chunks: {} (dimension {})", output.chunk_count, output.dimension);
                }
            }
            Ok(())
        }
        Commands::Query {
            path,
            question,
            top_k,
            format,
        } => {
            let top_k = top_k.unwrap_or(config.top_k);
            let document = read_document(&path).await?;
            let (pipeline, printer) = open_pipeline(&config).await?;
            let outcome = pipeline
                .retrieve_or_report(&document, &question, top_k)
                .await;
            finish_progress(pipeline, printer).await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(report) => {
                    if format == OutputFormat::Json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    }
                    return Err(anyhow::anyhow!(report.to_string()));
                }
            };
            if let Some(report) = &outcome.persist_error {
                eprintln!("Warning: result was not cached: {report}");
            }

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                OutputFormat::Summary => {
                    println!(
                        "Top {} chunks for {:?} ({}):",
                        outcome.results.len(),
                        question,
                        if outcome.was_cache_hit { "cached" } else { "built" }
                    );
                    for (rank, hit) in outcome.results.iter().enumerate() {
                        println!(
                            "  {}. [chunk {}] distance {:.4} | {}",
                            rank + 1,
                            hit.position,
                            hit.distance,
                            preview(&hit.text, 80)
                        );
                    }
                }
                OutputFormat::Full => {
                    for (rank, hit) in outcome.results.iter().enumerate() {
                        println!("Rank: {}", rank + 1);
                        println!("Chunk: {}", hit.position);
                        println!("Distance: {:.6}", hit.distance);
                        println!("Content:\n{}", hit.text);
                        println!("{}", "-".repeat(80));
                    }
                }
            }
            Ok(())
        }
        Commands::List { format } => {
            let store = SqliteEntryStore::open(&config.cache_dir).await?;
            let entries = store.list().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
                OutputFormat::Summary | OutputFormat::Full => {
                    println!("Found {} cached documents:", entries.len());
                    for entry in entries {
                        let fingerprint = if format == OutputFormat::Full {
                            entry.fingerprint.to_hex()
                        } else {
                            entry.fingerprint.short()
                        };
                        println!(
                            "  {} | chunks: {} | dim: {} | {} bytes | created {}",
                            fingerprint,
                            entry.chunk_count,
                            entry.dimension,
                            entry.byte_len,
                            entry.created_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Stats { format } => {
            let store = SqliteEntryStore::open(&config.cache_dir).await?;
            let entries = store.list().await?;
            let database = config.cache_dir.join(DB_FILE_NAME);
            let database_bytes = tokio::fs::metadata(&database)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            let summary = CacheSummary {
                documents: entries.len(),
                total_chunks: entries.iter().map(|e| e.chunk_count).sum(),
                total_document_bytes: entries.iter().map(|e| e.byte_len).sum(),
                database,
                database_bytes,
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Summary | OutputFormat::Full => {
                    println!("Cache Statistics:");
                    println!("  Database: {}", summary.database.display());
                    println!("  Documents: {}", summary.documents);
                    println!("  Chunks: {}", summary.total_chunks);
                    println!("  Source bytes: {}", summary.total_document_bytes);
                    println!("  Database size: {} bytes", summary.database_bytes);
                }
            }
            Ok(())
        }
        Commands::Invalidate { fingerprint } => {
            let fingerprint: Fingerprint = fingerprint.parse()?;
            let store = SqliteEntryStore::open(&config.cache_dir).await?;
            if store.remove(&fingerprint).await? {
                println!("Removed {fingerprint}");
            } else {
                println!("No cached document with fingerprint {fingerprint}");
            }
            Ok(())
        }
        Commands::Clear => {
            let store = SqliteEntryStore::open(&config.cache_dir).await?;
            let removed = store.clear().await?;
            println!("Removed {removed} cached documents");
            Ok(())
        }
    }
}

async fn read_document(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))
}

/// Load the embedding model and open the pipeline, printing progress messages to stderr.
async fn open_pipeline(
    config: &DocsiftConfig,
) -> anyhow::Result<(RetrievalPipeline, tokio::task::JoinHandle<()>)> {
    let embedder = FastEmbedProvider::create(config.embed_config()).await?;
    let (tx, rx) = flume::unbounded::<ProgressEvent>();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv_async().await {
            if let Some(message) = event.message() {
                eprintln!("{message}");
            } else if let Some(detail) = event.detail {
                eprintln!("Failed: {detail}");
            }
        }
    });
    let pipeline = RetrievalPipeline::open(config, Arc::new(embedder))
        .await?
        .with_progress(tx);
    Ok((pipeline, printer))
}

/// Close the progress channel and wait for pending messages to be printed.
async fn finish_progress(pipeline: RetrievalPipeline, printer: tokio::task::JoinHandle<()>) {
    drop(pipeline);
    if let Err(e) = printer.await {
        tracing::debug!("Progress printer stopped: {}", e);
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
