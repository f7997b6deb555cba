//! One end-to-end digest run.

use thiserror::Error;

use crate::{
    api_client::{CatalogClient, ClientError},
    assembler::{AssembledReport, ReportAssembler},
    auth::{create_access_token, AuthError},
    config::FeedConfig,
    publisher::{ArticlePublisher, PublishError, PublishReceipt},
    templates::{resolve_template, CustomTemplate, TemplateError},
};

/// Fatal failures of a run. Per-query problems never show up here; they are
/// recorded in [`AssembledReport::skipped`].
#[derive(Debug, Error)]
pub enum RunError {
    /// No access token could be obtained.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    /// The HTTP client could not be set up.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// The custom template could not be resolved.
    #[error("custom template unavailable: {0}")]
    Template(#[from] TemplateError),
    /// The report could not be written to the article.
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

/// What a run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Template the run targeted.
    pub template: CustomTemplate,
    /// Assembled report.
    pub report: AssembledReport,
    /// Present when the report was published.
    pub receipt: Option<PublishReceipt>,
}

/// Exchange the refresh token and build the authenticated client.
pub async fn connect(config: &FeedConfig) -> Result<CatalogClient, RunError> {
    let token = create_access_token(config).await?;
    Ok(CatalogClient::new(config, &token)?)
}

/// Run the whole pipeline: token, template, report, and (when `publish` is
/// set) the article update.
///
/// An empty report is still published so the field reflects the latest run.
pub async fn run_digest(config: &FeedConfig, publish: bool) -> Result<RunOutcome, RunError> {
    let client = connect(config).await?;
    let template = resolve_template(&client, config).await?;
    tracing::info!("using custom template `{}` (id {})", template.title, template.id);

    let report = ReportAssembler::new(&client).assemble(&config.queries).await;
    if report.is_empty() {
        tracing::warn!("no query produced a fragment; the report is empty");
    }

    if !publish {
        return Ok(RunOutcome {
            template,
            report,
            receipt: None,
        });
    }

    let publisher =
        ArticlePublisher::new(&client, &template, &config.article_title, &config.field_name);
    let receipt = match publisher.publish(&report.html).await {
        Ok(receipt) => receipt,
        Err(err) => {
            tracing::error!("{err}");
            return Err(err.into());
        },
    };

    Ok(RunOutcome {
        template,
        report,
        receipt: Some(receipt),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::{run_digest, RunError};
    use crate::{
        api_client::test_support::test_config, auth::ACCESS_TOKEN_PATH, resolver::EXECUTION_SESSION_PATH,
        QueryDescriptor, QueryKind,
    };

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(ACCESS_TOKEN_PATH))
            .and(body_string_contains("refresh_token=refresh"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"api_access_token": "access"})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn rejected_refresh_token_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ACCESS_TOKEN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = run_digest(&test_config(&server.uri()), false)
            .await
            .expect_err("auth must fail");
        assert!(matches!(err, RunError::Auth(_)));
    }

    #[tokio::test]
    async fn dry_run_assembles_without_publishing() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path(EXECUTION_SESSION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/bulk_metadata/custom_fields/Home%20Feed/article"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.queries = vec![QueryDescriptor {
            id: 62,
            kind: QueryKind::TopArticles,
        }];
        let outcome = run_digest(&config, false).await.expect("dry run");
        assert_eq!(outcome.template.id, 5);
        assert!(outcome.report.is_empty());
        assert_eq!(outcome.report.skipped.len(), 1);
        assert!(outcome.receipt.is_none());
    }
}
