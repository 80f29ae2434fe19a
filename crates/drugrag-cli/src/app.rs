//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "drugrag")]
#[command(
    author,
    version,
    about = "Answer drug-information questions from an indexed reference corpus"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, env = "DRUGRAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP query service
    Serve(ServeArgs),

    /// Answer one question
    Query(QueryArgs),

    /// Build an index snapshot from a corpus
    Index(IndexArgs),

    /// Show snapshot status
    Status(SnapshotArgs),
}

#[derive(Args)]
pub struct SnapshotArgs {
    /// Index snapshot (overrides the configured path)
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<String>,

    #[command(flatten)]
    pub snapshot: SnapshotArgs,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Question text
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Chunks retrieved per sub-question
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Upper bound on sub-questions
    #[arg(long)]
    pub max_subqueries: Option<usize>,

    #[command(flatten)]
    pub snapshot: SnapshotArgs,
}

#[derive(Args)]
pub struct IndexArgs {
    /// Metadata CSV with drug_name, drugbank_id, chunk_index, chunk_text
    #[arg(long, conflicts_with = "dir", required_unless_present = "dir")]
    pub csv: Option<PathBuf>,

    /// Directory of text documents
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Glob for files under --dir
    #[arg(long, default_value = "**/*.txt")]
    pub pattern: String,

    /// Where to write the snapshot (defaults to the configured path)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Texts per embedding request
    #[arg(long, default_value = "32")]
    pub batch_size: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}
