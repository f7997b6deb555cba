pub mod fetch;
pub mod preview;
pub mod resolve;
pub mod run;

use anyhow::Result;
use digest_flow_shared::config::FeedConfig;
use serde::Serialize;

use crate::cli::Commands;

pub async fn run(command: Commands, config: &FeedConfig) -> Result<()> {
    match command {
        Commands::Run {
            dry_run,
        } => run::run(config, dry_run).await,
        Commands::Preview {
            kind,
        } => preview::run(config, kind).await,
        Commands::Resolve {
            query_id,
        } => resolve::run(config, query_id).await,
        Commands::Fetch {
            result_id,
            limit,
        } => fetch::run(config, result_id, limit).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
