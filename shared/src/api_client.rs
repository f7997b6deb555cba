//! Thin request/response wrapper over the catalog platform HTTP API.
//!
//! HTTP-level failures are data, not errors: every call returns an
//! [`ApiResponse`] that the caller has to match on. Only transport failures
//! and job polling limits surface as [`ClientError`].

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, CONTENT_TYPE},
    Method, StatusCode,
};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    auth::AccessToken,
    config::{FeedConfig, JobPollSettings},
};

/// Status endpoint for asynchronous bulk jobs.
pub const JOB_STATUS_PATH: &str = "/api/v1/bulk_metadata/job/";

const JOB_STATUS_RUNNING: &str = "running";
const JOB_STATUS_SUCCESSFUL: &str = "successful";
const TOKEN_HEADER: &str = "token";
const BODY_PREVIEW_CHARS: usize = 300;

/// Outcome of one API call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// Successful call whose body decoded to a JSON object or array.
    Ok(Value),
    /// Successful call whose body is not a JSON object or array.
    Raw(Bytes),
    /// Non-success status; the body is kept for diagnostics.
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Response body as received.
        body: Bytes,
    },
}

impl ApiResponse {
    /// The decoded array, when the call returned one.
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            ApiResponse::Ok(Value::Array(items)) => Some(items),
            _ => None,
        }
    }

    /// The decoded object, when the call returned one.
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            ApiResponse::Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Short human-readable description for log lines.
    pub fn describe(&self) -> String {
        match self {
            ApiResponse::Ok(value) => preview(&value.to_string()),
            ApiResponse::Raw(body) => format!("raw body: {}", preview(&String::from_utf8_lossy(body))),
            ApiResponse::HttpError {
                status,
                body,
            } => format!("http {status}: {}", preview(&String::from_utf8_lossy(body))),
        }
    }
}

/// Failures that prevent an [`ApiResponse`] from being produced.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The access token cannot be sent as a header value.
    #[error("access token is not a valid header value: {0}")]
    InvalidToken(#[from] InvalidHeaderValue),
    /// The underlying HTTP client could not be constructed.
    #[error("failed to build catalog http client: {0}")]
    Build(#[source] reqwest::Error),
    /// The request never produced a response.
    #[error("{method} {path} failed: {source}")]
    Transport {
        /// Request method.
        method: Method,
        /// Request path relative to the base URL.
        path: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// A bulk job was still running when the polling bounds ran out.
    #[error("job {job_id} still running after {attempts} polls ({elapsed_ms} ms)")]
    JobTimeout {
        /// Job id returned by the initial post.
        job_id: String,
        /// Status polls performed.
        attempts: u32,
        /// Time spent waiting.
        elapsed_ms: u128,
    },
    /// A job status poll returned something other than a status object.
    #[error("job {job_id} status poll failed: {reason}")]
    JobFailed {
        /// Job id returned by the initial post.
        job_id: String,
        /// What was wrong with the poll response.
        reason: String,
    },
}

/// Authenticated client for one run.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    base_url: String,
    client: reqwest::Client,
    poll: JobPollSettings,
}

impl CatalogClient {
    /// Build a client that sends `token` with every request.
    pub fn new(config: &FeedConfig, token: &AccessToken) -> Result<Self, ClientError> {
        let mut token_value = HeaderValue::from_str(token.as_str())?;
        token_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(TOKEN_HEADER), token_value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = build_http_client(config)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
            poll: config.job_poll.clone(),
        })
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET and decode. Succeeds only on 200 and 201.
    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse, ClientError> {
        let (status, body) = self.send(Method::GET, path, params, None).await?;
        Ok(classify(status, body, is_get_success(status), true))
    }

    /// GET without decoding; the body of a successful call is always
    /// [`ApiResponse::Raw`].
    pub async fn get_raw(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse, ClientError> {
        let (status, body) = self.send(Method::GET, path, params, None).await?;
        Ok(classify(status, body, is_get_success(status), false))
    }

    /// POST a JSON body.
    ///
    /// When the decoded response names a `job_id`, the job is polled until it
    /// leaves the `running` state and the final status response is returned
    /// instead of the original one.
    pub async fn post(
        &self,
        path: &str,
        params: &[(&str, String)],
        body: &Value,
    ) -> Result<ApiResponse, ClientError> {
        let (status, raw) = self.send(Method::POST, path, params, Some(body)).await?;
        let response = classify(status, raw, status.is_success(), true);

        let job_id = response
            .as_object()
            .and_then(|map| map.get("job_id"))
            .and_then(job_id_text);
        match job_id {
            Some(job_id) => self.wait_for_job(job_id).await,
            None => Ok(response),
        }
    }

    /// DELETE. Succeeds on any 2xx status.
    pub async fn delete(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResponse, ClientError> {
        let (status, body) = self.send(Method::DELETE, path, params, None).await?;
        Ok(classify(status, body, status.is_success(), true))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<(StatusCode, Bytes), ClientError> {
        let url = join_url(&self.base_url, path);
        let mut request = self.client.request(method.clone(), &url);
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let transport_error = |source| ClientError::Transport {
            method: method.clone(),
            path: path.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        tracing::debug!("{method} {path} -> {status} ({} bytes)", body.len());
        Ok((status, body))
    }

    async fn wait_for_job(&self, job_id: String) -> Result<ApiResponse, ClientError> {
        let started = Instant::now();
        let deadline = Duration::from_secs(self.poll.deadline_seconds);
        let params = [("id", job_id.clone())];
        let mut attempts = 0;

        tracing::info!("waiting for bulk job {job_id}");
        while attempts < self.poll.max_attempts {
            let response = self.get(JOB_STATUS_PATH, &params).await?;
            attempts += 1;

            let status = response
                .as_object()
                .and_then(|map| map.get("status"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let Some(status) = status else {
                return Err(ClientError::JobFailed {
                    job_id,
                    reason: format!("unexpected status response: {}", response.describe()),
                });
            };

            if status != JOB_STATUS_RUNNING {
                // Any terminal status counts as completion; the platform does not
                // distinguish failed jobs at this level.
                if status != JOB_STATUS_SUCCESSFUL {
                    tracing::warn!("bulk job {job_id} finished with status `{status}`");
                } else {
                    tracing::info!("bulk job {job_id} finished after {attempts} polls");
                }
                return Ok(response);
            }

            let delay = backoff_delay(&self.poll, attempts - 1);
            if attempts >= self.poll.max_attempts || started.elapsed() + delay > deadline {
                break;
            }
            tokio::time::sleep(delay).await;
        }

        Err(ClientError::JobTimeout {
            job_id,
            attempts,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }
}

/// Delay after the `attempt`-th poll (0-based), growing geometrically and
/// capped at `max_interval_ms`.
pub fn backoff_delay(settings: &JobPollSettings, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let scaled = settings.initial_interval_ms as f64 * settings.multiplier.powi(exponent);
    let capped = scaled.min(settings.max_interval_ms as f64);
    Duration::from_millis(capped as u64)
}

pub(crate) fn build_http_client(config: &FeedConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_seconds.max(1)))
        .danger_accept_invalid_certs(config.http.accept_invalid_certs)
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn is_get_success(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::CREATED
}

fn classify(status: StatusCode, body: Bytes, success: bool, decode: bool) -> ApiResponse {
    if !success {
        return ApiResponse::HttpError {
            status: status.as_u16(),
            body,
        };
    }
    if decode {
        if let Ok(value @ (Value::Object(_) | Value::Array(_))) = serde_json::from_slice::<Value>(&body) {
            return ApiResponse::Ok(value);
        }
    }
    ApiResponse::Raw(body)
}

fn job_id_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}

fn preview(text: &str) -> String {
    let mut preview = text.chars().take(BODY_PREVIEW_CHARS).collect::<String>();
    if text.chars().count() > BODY_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{
        auth::AccessToken,
        config::{FeedConfig, HttpSettings, JobPollSettings},
    };

    use super::CatalogClient;

    pub(crate) fn test_config(base_url: &str) -> FeedConfig {
        FeedConfig {
            base_url: base_url.to_string(),
            refresh_token: "refresh".to_string(),
            user_id: 1,
            custom_template_id: Some(5),
            custom_template_title: "Home Feed".to_string(),
            article_title: "What's happening in Alation?".to_string(),
            field_name: "Recent Updates".to_string(),
            queries: Vec::new(),
            http: HttpSettings {
                timeout_seconds: 5,
                accept_invalid_certs: false,
            },
            job_poll: JobPollSettings {
                initial_interval_ms: 5,
                max_interval_ms: 20,
                multiplier: 2.0,
                max_attempts: 4,
                deadline_seconds: 5,
            },
            log_dir: None,
        }
    }

    pub(crate) fn test_client(base_url: &str) -> CatalogClient {
        CatalogClient::new(&test_config(base_url), &AccessToken::new("secret-token"))
            .expect("build client")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::{backoff_delay, join_url, test_support::test_client, ApiResponse, ClientError, JOB_STATUS_PATH};
    use crate::config::JobPollSettings;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("https://host/", "/api/v1/x/"), "https://host/api/v1/x/");
        assert_eq!(join_url("https://host", "api/v1/x"), "https://host/api/v1/x");
    }

    #[test]
    fn backoff_delay_grows_and_caps() {
        let settings = JobPollSettings {
            initial_interval_ms: 100,
            max_interval_ms: 1_000,
            multiplier: 2.0,
            max_attempts: 10,
            deadline_seconds: 60,
        };
        assert_eq!(backoff_delay(&settings, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&settings, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&settings, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(&settings, 4), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&settings, 40), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn get_decodes_json_and_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/integration/v1/article/"))
            .and(header("token", "secret-token"))
            .and(query_param("title", "Weekly"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let response = client
            .get("/integration/v1/article/", &[("title", "Weekly".to_string())])
            .await
            .expect("get article");
        assert_eq!(response.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn get_keeps_non_json_body_raw() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plain/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("title,url\n"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let response = client.get("/plain/", &[]).await.expect("get plain");
        assert_eq!(response, ApiResponse::Raw("title,url\n".into()));
    }

    #[tokio::test]
    async fn get_treats_accepted_status_as_error_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accepted/"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"detail": "later"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing/"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let accepted = client.get("/accepted/", &[]).await.expect("get accepted");
        assert!(matches!(accepted, ApiResponse::HttpError { status: 202, .. }));

        let missing = client.get("/missing/", &[]).await.expect("get missing");
        match missing {
            ApiResponse::HttpError {
                status,
                body,
            } => {
                assert_eq!(status, 404);
                assert_eq!(body.as_ref(), b"not found");
            },
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_without_job_returns_original_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bulk/"))
            .and(body_json(json!({"key": "value"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updated_objects": 1})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let response = client
            .post("/bulk/", &[], &json!({"key": "value"}))
            .await
            .expect("post");
        assert_eq!(response, ApiResponse::Ok(json!({"updated_objects": 1})));
    }

    #[tokio::test]
    async fn post_with_job_returns_final_poll_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bulk/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": 77})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB_STATUS_PATH))
            .and(query_param("id", "77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB_STATUS_PATH))
            .and(query_param("id", "77"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "successful", "updated_objects": 1, "number_received": 1})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let response = client.post("/bulk/", &[], &json!({})).await.expect("post job");
        let status = response
            .as_object()
            .and_then(|map| map.get("status"))
            .and_then(|value| value.as_str());
        assert_eq!(status, Some("successful"));
    }

    #[tokio::test]
    async fn job_with_failed_status_is_still_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bulk/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "abc"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB_STATUS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "failed"})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let response = client.post("/bulk/", &[], &json!({})).await.expect("post job");
        assert_eq!(response, ApiResponse::Ok(json!({"status": "failed"})));
    }

    #[tokio::test]
    async fn delete_accepts_any_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/integration/v1/article/11/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/integration/v1/article/12/"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let deleted = client
            .delete("/integration/v1/article/11/", &[])
            .await
            .expect("delete article");
        assert_eq!(deleted, ApiResponse::Raw(Default::default()));

        let denied = client
            .delete("/integration/v1/article/12/", &[])
            .await
            .expect("delete denied");
        assert!(matches!(denied, ApiResponse::HttpError { status: 403, .. }));
    }

    #[tokio::test]
    async fn job_still_running_times_out_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bulk/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": 5})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB_STATUS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
            .expect(4)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .post("/bulk/", &[], &json!({}))
            .await
            .expect_err("job should time out");
        match err {
            ClientError::JobTimeout {
                job_id,
                attempts,
                ..
            } => {
                assert_eq!(job_id, "5");
                assert_eq!(attempts, 4);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn job_poll_without_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bulk/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": 5})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(JOB_STATUS_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .post("/bulk/", &[], &json!({}))
            .await
            .expect_err("job poll should fail");
        assert!(matches!(err, ClientError::JobFailed { .. }));
        assert!(err.to_string().contains("http 500"));
    }
}
