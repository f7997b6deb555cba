//! `df-cli`: builds the catalog analytics digest and publishes it into an
//! article custom field.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use digest_flow_runtime::{init_tracing, LoggingOptions};
use digest_flow_shared::config::FeedConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let config = FeedConfig::load(&cli.config)?;

    let _logging = init_tracing(&LoggingOptions {
        log_dir: cli.log_dir.clone().or_else(|| config.log_dir.clone()),
        file_prefix: "df-cli.log".to_string(),
    })?;

    commands::run(cli.command, &config).await
}
