//! Custom template discovery.

use serde::Deserialize;
use thiserror::Error;

use crate::{
    api_client::{CatalogClient, ClientError},
    config::FeedConfig,
};

/// Lists every custom template visible to the user.
pub const CUSTOM_TEMPLATE_PATH: &str = "/integration/v1/custom_template/";

/// The custom template the digest article is filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomTemplate {
    /// Template id, used to filter article lookups.
    pub id: u64,
    /// Template title, used to address the bulk update endpoint.
    pub title: String,
}

/// Why no template could be resolved. Always fatal for the run.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template listing was not a non-empty array.
    #[error("could not list custom templates: {0}")]
    ListingUnavailable(String),
    /// No listed template carries the configured title.
    #[error("custom template `{0}` not found")]
    NotFound(String),
    /// Transport failure while listing.
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Deserialize)]
struct TemplateEntry {
    id: u64,
    title: String,
}

/// Use the configured template id, or look the id up by exact title.
pub async fn resolve_template(
    client: &CatalogClient,
    config: &FeedConfig,
) -> Result<CustomTemplate, TemplateError> {
    let title = config.custom_template_title.clone();
    if let Some(id) = config.custom_template_id {
        return Ok(CustomTemplate {
            id,
            title,
        });
    }

    tracing::info!("no custom template id configured, looking up `{title}`");
    let response = client.get(CUSTOM_TEMPLATE_PATH, &[]).await?;
    let entries = match response.as_array() {
        Some(entries) if !entries.is_empty() => entries,
        _ => return Err(TemplateError::ListingUnavailable(response.describe())),
    };

    let id = entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<TemplateEntry>(entry.clone()).ok())
        .find(|entry| entry.title == title)
        .map(|entry| entry.id)
        .ok_or_else(|| TemplateError::NotFound(title.clone()))?;

    tracing::info!("custom template `{title}` resolved to id {id}");
    Ok(CustomTemplate {
        id,
        title,
    })
}
