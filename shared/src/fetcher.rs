//! Result set download.

use bytes::Bytes;
use thiserror::Error;

use crate::{
    api_client::{ApiResponse, CatalogClient, ClientError},
    ResultSet,
};

/// Why a result set could not be downloaded. An empty download is not an
/// error; it yields an empty [`ResultSet`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The export endpoint answered with a non-success status.
    #[error("result {result_id}: export returned http {status}: {body}")]
    HttpStatus {
        /// Result being fetched.
        result_id: u64,
        /// HTTP status code.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },
    /// The export is not UTF-8 text.
    #[error("result {result_id}: export is not valid UTF-8: {source}")]
    Decode {
        /// Result being fetched.
        result_id: u64,
        /// Decoding error.
        #[source]
        source: std::str::Utf8Error,
    },
    /// The export is not parseable as comma-separated values.
    #[error("result {result_id}: malformed csv export: {source}")]
    Csv {
        /// Result being fetched.
        result_id: u64,
        /// Parser error.
        #[source]
        source: csv::Error,
    },
    /// Transport failure.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Downloads result sets through the per-result CSV export.
#[derive(Debug, Clone, Copy)]
pub struct ResultFetcher<'a> {
    client: &'a CatalogClient,
}

impl<'a> ResultFetcher<'a> {
    /// Fetcher bound to `client`.
    pub fn new(client: &'a CatalogClient) -> Self {
        Self {
            client,
        }
    }

    /// Download and parse result `result_id`.
    pub async fn fetch(&self, result_id: u64) -> Result<ResultSet, FetchError> {
        let response = self.client.get_raw(&result_csv_path(result_id), &[]).await?;
        let body = match response {
            ApiResponse::Raw(body) => body,
            ApiResponse::Ok(value) => Bytes::from(value.to_string()),
            ApiResponse::HttpError {
                status,
                body,
            } => {
                return Err(FetchError::HttpStatus {
                    result_id,
                    status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            },
        };

        let text = std::str::from_utf8(&body).map_err(|source| FetchError::Decode {
            result_id,
            source,
        })?;
        let rows = parse_result_csv(text).map_err(|source| FetchError::Csv {
            result_id,
            source,
        })?;
        tracing::info!("result {result_id}: fetched {} rows", rows.len());
        Ok(ResultSet::new(rows))
    }
}

/// Split a CSV export into rows of text cells.
///
/// Row widths may differ from each other and from the result schema. A
/// leading byte-order mark is dropped.
pub fn parse_result_csv(text: &str) -> Result<Vec<Vec<String>>, csv::Error> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn result_csv_path(result_id: u64) -> String {
    format!("/integration/v1/result/{result_id}/csv/")
}
