use clap::{Parser, ValueEnum};
use docsift_chunk::{ChunkingConfig, RuleBasedSentenceSplitter};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::sync::Arc;

/// A CLI tool to chunk text files into JSON output using docsift-chunk.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Chunking strategy.
    #[arg(short, long, value_enum, default_value_t = Strategy::SlidingWindow)]
    strategy: Strategy,

    /// Window size in words (sliding-window strategy).
    #[arg(short, long, default_value_t = 150)]
    window: usize,

    /// Overlap between windows in words (sliding-window strategy).
    #[arg(short, long, default_value_t = 30)]
    overlap: usize,

    /// Sections up to this many characters stay whole (sections strategy).
    #[arg(long, default_value_t = 1500)]
    max_section_chars: usize,

    /// Character budget for chunks packed from long sections (sections strategy).
    #[arg(long, default_value_t = 1000)]
    max_subchunk_chars: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    SlidingWindow,
    Sections,
}

#[derive(Serialize)]
struct SerializableChunk<'a> {
    sequence: usize,
    chars: usize,
    words: usize,
    chunk_text: &'a str,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let file_content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let config = match args.strategy {
        Strategy::SlidingWindow => ChunkingConfig::SlidingWindow {
            window: args.window,
            overlap: args.overlap,
        },
        Strategy::Sections => ChunkingConfig::Sections {
            max_section_chars: args.max_section_chars,
            max_subchunk_chars: args.max_subchunk_chars,
        },
    };

    let chunker = config
        .build(Arc::new(RuleBasedSentenceSplitter::default()))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let chunks = chunker.chunk(&file_content);

    let serializable_chunks: Vec<SerializableChunk> = chunks
        .iter()
        .enumerate()
        .map(|(sequence, chunk)| SerializableChunk {
            sequence,
            chars: chunk.chars().count(),
            words: chunk.split_whitespace().count(),
            chunk_text: chunk,
        })
        .collect();

    let json_output = serde_json::to_string_pretty(&serializable_chunks)?;
    println!("{}", json_output);

    Ok(())
}
