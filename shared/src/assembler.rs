//! Sequential report assembly across all configured queries.

use thiserror::Error;

use crate::{
    api_client::CatalogClient,
    fetcher::{FetchError, ResultFetcher},
    formatter::format_fragment,
    resolver::{ExecutionResolver, ResolveError},
    QueryDescriptor,
};

/// Appended after every fragment.
pub const FRAGMENT_SEPARATOR: &str = "<br>";

/// Why one query contributed nothing to the report.
#[derive(Debug, Error)]
pub enum QueryError {
    /// No result reference could be located.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The result set could not be downloaded.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The result set has no rows at all.
    #[error("result {result_id} is empty; check that the query is published and its schedule ran")]
    EmptyResult {
        /// Result that came back empty.
        result_id: u64,
    },
}

/// A query left out of the report.
#[derive(Debug)]
pub struct SkippedQuery {
    /// The query.
    pub query: QueryDescriptor,
    /// What went wrong.
    pub error: QueryError,
}

/// The concatenated report plus which queries made it in.
#[derive(Debug, Default)]
pub struct AssembledReport {
    /// Fragments in configuration order, each followed by
    /// [`FRAGMENT_SEPARATOR`].
    pub html: String,
    /// Queries whose fragment is part of `html`.
    pub included: Vec<QueryDescriptor>,
    /// Queries that were skipped.
    pub skipped: Vec<SkippedQuery>,
}

impl AssembledReport {
    /// True when no query contributed a fragment.
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }
}

/// Resolves, fetches and formats queries one after another.
#[derive(Debug, Clone, Copy)]
pub struct ReportAssembler<'a> {
    resolver: ExecutionResolver<'a>,
    fetcher: ResultFetcher<'a>,
}

impl<'a> ReportAssembler<'a> {
    /// Assembler with the default resolver and fetcher over `client`.
    pub fn new(client: &'a CatalogClient) -> Self {
        Self::with_parts(ExecutionResolver::new(client), ResultFetcher::new(client))
    }

    /// Assembler from explicit parts.
    pub fn with_parts(resolver: ExecutionResolver<'a>, fetcher: ResultFetcher<'a>) -> Self {
        Self {
            resolver,
            fetcher,
        }
    }

    /// Build the report. Failing queries are logged and left out; they never
    /// abort the remaining ones.
    pub async fn assemble(&self, queries: &[QueryDescriptor]) -> AssembledReport {
        let mut report = AssembledReport::default();

        for query in queries {
            tracing::info!("getting results for query {} ({})", query.id, query.kind);
            match self.build_fragment(query).await {
                Ok(fragment) => {
                    report.html.push_str(&fragment);
                    report.html.push_str(FRAGMENT_SEPARATOR);
                    report.included.push(*query);
                },
                Err(error) => {
                    tracing::warn!("skipping query {} ({}): {error}", query.id, query.kind);
                    report.skipped.push(SkippedQuery {
                        query: *query,
                        error,
                    });
                },
            }
        }

        tracing::info!(
            "report assembled: included={} skipped={} bytes={}",
            report.included.len(),
            report.skipped.len(),
            report.html.len()
        );
        report
    }

    /// Resolve, fetch and format a single query.
    pub async fn build_fragment(&self, query: &QueryDescriptor) -> Result<String, QueryError> {
        let reference = self.resolver.resolve(query.id).await?;
        tracing::debug!("query {} schema: {:?}", query.id, reference.schema);

        let result = self.fetcher.fetch(reference.result_id).await?;
        if result.is_empty() {
            return Err(QueryError::EmptyResult {
                result_id: reference.result_id,
            });
        }
        Ok(format_fragment(query.kind, &result))
    }
}
