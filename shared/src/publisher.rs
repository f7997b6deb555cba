//! Idempotent publication of the report into an existing article.
//!
//! The article is addressed by exact title under the digest's custom
//! template. Publication only ever updates custom fields in place; a missing
//! article is reported, never created.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::{
    api_client::{ApiResponse, CatalogClient, ClientError},
    templates::CustomTemplate,
};

/// Article listing endpoint.
pub const ARTICLE_PATH: &str = "/integration/v1/article/";
/// Bulk custom field update endpoint; template title and object type follow.
pub const CUSTOM_FIELDS_BULK_PATH: &str = "/api/v1/bulk_metadata/custom_fields";
/// Object type segment for articles.
pub const ARTICLE_OBJECT_TYPE: &str = "article";

/// Article as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Article {
    /// Article id.
    pub id: u64,
    /// Article title; the article's identity for publication.
    pub title: String,
    /// Custom field values as returned by the platform.
    #[serde(default)]
    pub custom_fields: Value,
}

/// A fully built bulk update call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertRequest {
    /// Path including the encoded template title and object type.
    pub path: String,
    /// Query parameters.
    pub params: Vec<(&'static str, String)>,
    /// JSON body.
    pub body: Value,
}

/// Counters reported by the bulk update endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpsertOutcome {
    /// Objects actually updated.
    #[serde(default)]
    pub updated_objects: u64,
    /// Objects the server received.
    #[serde(default)]
    pub number_received: u64,
    /// Server-side error summary.
    #[serde(default)]
    pub error: Option<String>,
}

impl UpsertOutcome {
    /// Everything received was updated, and that was at least one object.
    pub fn is_success(&self) -> bool {
        self.updated_objects != 0 && self.updated_objects == self.number_received
    }

    fn failure_message(&self) -> String {
        match self.error.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => message.to_string(),
            _ => format!(
                "updated_objects={} number_received={}",
                self.updated_objects, self.number_received
            ),
        }
    }
}

/// Proof of a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Id of the updated article.
    pub article_id: u64,
    /// Server counters.
    pub outcome: UpsertOutcome,
}

/// Why the report was not published.
#[derive(Debug, Error)]
pub enum PublishError {
    /// No article with the exact title exists under the template.
    #[error("article `{title}` not found under custom template {template_id}; create it first")]
    ArticleNotFound {
        /// Title looked up.
        title: String,
        /// Template filter used.
        template_id: u64,
    },
    /// The server processed the update but did not apply it.
    #[error("error updating article `{title}`: {message}")]
    UpdateRejected {
        /// Article title.
        title: String,
        /// Server error message, or the counters when none was given.
        message: String,
    },
    /// The update response was not a counters object.
    #[error("unexpected response updating article `{title}`: {detail}")]
    UnexpectedResponse {
        /// Article title.
        title: String,
        /// Description of what came back.
        detail: String,
    },
    /// Transport or job polling failure.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Publishes report HTML into one custom field of one article.
#[derive(Debug, Clone, Copy)]
pub struct ArticlePublisher<'a> {
    client: &'a CatalogClient,
    template: &'a CustomTemplate,
    article_title: &'a str,
    field_name: &'a str,
}

impl<'a> ArticlePublisher<'a> {
    /// Publisher targeting `article_title` / `field_name` under `template`.
    pub fn new(
        client: &'a CatalogClient,
        template: &'a CustomTemplate,
        article_title: &'a str,
        field_name: &'a str,
    ) -> Self {
        Self {
            client,
            template,
            article_title,
            field_name,
        }
    }

    /// Look the article up by exact, case-sensitive title.
    pub async fn find_article(&self) -> Result<Option<Article>, PublishError> {
        let params = [
            ("title", self.article_title.to_string()),
            ("custom_field_templates", format!("[{}]", self.template.id)),
        ];
        let response = self.client.get(ARTICLE_PATH, &params).await?;
        let Some(items) = response.as_array() else {
            tracing::warn!("article lookup returned {}", response.describe());
            return Ok(None);
        };

        let article = items
            .iter()
            .filter_map(|item| serde_json::from_value::<Article>(item.clone()).ok())
            .find(|article| article.title == self.article_title);
        Ok(article)
    }

    /// The bulk update call that writes `html` into the configured field.
    pub fn build_upsert_request(&self, html: &str) -> UpsertRequest {
        let mut body = json!({ "key": self.article_title });
        body[self.field_name] = Value::String(html.to_string());

        UpsertRequest {
            path: format!(
                "{CUSTOM_FIELDS_BULK_PATH}/{}/{ARTICLE_OBJECT_TYPE}",
                urlencoding::encode(&self.template.title)
            ),
            params: vec![("create_new", "false".to_string()), ("replace_values", "true".to_string())],
            body,
        }
    }

    /// Find the article and overwrite its report field.
    pub async fn publish(&self, html: &str) -> Result<PublishReceipt, PublishError> {
        let article = self
            .find_article()
            .await?
            .ok_or_else(|| PublishError::ArticleNotFound {
                title: self.article_title.to_string(),
                template_id: self.template.id,
            })?;
        tracing::info!("article `{}` exists with id {}", article.title, article.id);

        let request = self.build_upsert_request(html);
        let response = self
            .client
            .post(&request.path, &request.params, &request.body)
            .await?;

        let outcome = parse_outcome(&response).ok_or_else(|| PublishError::UnexpectedResponse {
            title: self.article_title.to_string(),
            detail: response.describe(),
        })?;
        if !outcome.is_success() {
            return Err(PublishError::UpdateRejected {
                title: self.article_title.to_string(),
                message: outcome.failure_message(),
            });
        }

        tracing::info!("updated custom fields for article `{}`", self.article_title);
        Ok(PublishReceipt {
            article_id: article.id,
            outcome,
        })
    }
}

// Job responses may nest the counters under `result`.
fn parse_outcome(response: &ApiResponse) -> Option<UpsertOutcome> {
    let map = response.as_object()?;
    let source = if map.contains_key("updated_objects") {
        Value::Object(map.clone())
    } else {
        match map.get("result") {
            Some(nested @ Value::Object(inner)) if inner.contains_key("updated_objects") => nested.clone(),
            _ => Value::Object(map.clone()),
        }
    };
    serde_json::from_value(source).ok()
}
