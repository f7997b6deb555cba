use anyhow::{Context, Result};
use digest_flow_shared::{config::FeedConfig, digest::connect, resolver::ExecutionResolver};

use super::print_json;

pub async fn run(config: &FeedConfig, query_id: u64) -> Result<()> {
    let client = connect(config).await?;
    let reference = ExecutionResolver::new(&client)
        .resolve(query_id)
        .await
        .with_context(|| format!("failed to resolve query {query_id}"))?;
    print_json(&reference)
}
