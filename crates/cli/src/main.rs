use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::commands;
use retrieval_core::config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load(cli.config.as_deref())?;

    let output = match cli.command {
        Commands::Ingest { raw, out, json } => {
            if let Some(raw) = raw {
                cfg.paths.raw_dir = raw;
            }
            if let Some(out) = out {
                cfg.paths.knowledge_base = out;
            }
            commands::run_ingest(&cfg, json)?
        }
        Commands::Build { kb, index, json } => {
            if let Some(kb) = kb {
                cfg.paths.knowledge_base = kb;
            }
            if let Some(index) = index {
                cfg.paths.index_dir = index;
            }
            commands::run_build(&cfg, json).await?
        }
        Commands::Query {
            query,
            top_k,
            index,
            json,
        } => {
            if let Some(index) = index {
                cfg.paths.index_dir = index;
            }
            commands::run_query(&cfg, &query, top_k, json).await?
        }
    };

    if output.is_empty() {
        eprintln!("No matching chunks in {}.", cfg.paths.index_dir);
    } else {
        println!("{}", output);
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "kbindex")]
#[command(about = "Chunk, index and search a document knowledge base", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert raw .txt/.md files into JSONL document records
    Ingest {
        /// Directory of raw documents
        #[arg(long)]
        raw: Option<String>,
        /// Output JSONL path
        #[arg(long)]
        out: Option<String>,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Rebuild the vector index and metadata from document records
    Build {
        /// Input JSONL path
        #[arg(long)]
        kb: Option<String>,
        /// Index directory to replace
        #[arg(long)]
        index: Option<String>,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Retrieve the chunks most similar to a query
    Query {
        /// Query text to embed and search
        query: String,
        /// Number of results (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Index directory to search
        #[arg(long)]
        index: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}
