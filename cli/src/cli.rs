use std::path::PathBuf;

use clap::{Parser, Subcommand};
use digest_flow_shared::{config::DEFAULT_CONFIG_FILE, QueryKind};

#[derive(Parser)]
#[command(name = "df-cli", version, about = "Catalog analytics digest CLI")]
pub struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
    /// Directory for daily-rolling log files (overrides `log_dir` in the
    /// configuration).
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assemble the digest and publish it into the configured article.
    Run {
        /// Print the assembled HTML instead of publishing it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Assemble the digest and print it without publishing.
    Preview {
        /// Only render the configured query of this kind.
        #[arg(long)]
        kind: Option<QueryKind>,
    },
    /// Resolve a query id to its latest result reference.
    Resolve {
        /// Query id on the catalog platform.
        #[arg(long)]
        query_id: u64,
    },
    /// Download a result set and print its rows.
    Fetch {
        /// Result id on the catalog platform.
        #[arg(long)]
        result_id: u64,
        /// Print at most this many rows, header included.
        #[arg(long)]
        limit: Option<usize>,
    },
}
