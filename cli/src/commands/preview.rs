use anyhow::{bail, Result};
use digest_flow_shared::{
    assembler::ReportAssembler, config::FeedConfig, digest::connect, QueryDescriptor, QueryKind,
};

pub async fn run(config: &FeedConfig, kind: Option<QueryKind>) -> Result<()> {
    let queries: Vec<QueryDescriptor> = config
        .queries
        .iter()
        .filter(|query| kind.map_or(true, |kind| query.kind == kind))
        .copied()
        .collect();
    if let Some(kind) = kind.filter(|_| queries.is_empty()) {
        bail!("no query of kind `{kind}` is configured");
    }

    let client = connect(config).await?;
    let report = ReportAssembler::new(&client).assemble(&queries).await;
    if report.is_empty() {
        bail!("no query produced a fragment; see the log for skip reasons");
    }

    println!("{}", report.html);
    Ok(())
}
