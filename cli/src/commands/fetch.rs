use anyhow::{Context, Result};
use digest_flow_shared::{config::FeedConfig, digest::connect, fetcher::ResultFetcher};

use super::print_json;

pub async fn run(config: &FeedConfig, result_id: u64, limit: Option<usize>) -> Result<()> {
    let client = connect(config).await?;
    let mut result = ResultFetcher::new(&client)
        .fetch(result_id)
        .await
        .with_context(|| format!("failed to fetch result {result_id}"))?;

    if let Some(limit) = limit {
        result.rows.truncate(limit);
    }
    print_json(&result.rows)
}
