use anyhow::{Context, Result};
use digest_flow_shared::{config::FeedConfig, digest::run_digest};

pub async fn run(config: &FeedConfig, dry_run: bool) -> Result<()> {
    let outcome = run_digest(config, !dry_run)
        .await
        .context("digest run failed")?;

    match outcome.receipt {
        Some(receipt) => tracing::info!(
            "published into article {} ({} of {} objects updated)",
            receipt.article_id,
            receipt.outcome.updated_objects,
            receipt.outcome.number_received
        ),
        None => println!("{}", outcome.report.html),
    }
    Ok(())
}
