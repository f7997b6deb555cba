//! Run configuration.
//!
//! The configuration is read once at process entry from a JSON file, patched
//! with environment overrides, validated, and then only ever passed by
//! reference.

use std::{
    collections::HashSet,
    env,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{QueryDescriptor, QueryKind};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "feed_config.json";

const ENV_BASE_URL: &str = "DIGEST_FLOW_BASE_URL";
const ENV_REFRESH_TOKEN: &str = "DIGEST_FLOW_REFRESH_TOKEN";
const ENV_USER_ID: &str = "DIGEST_FLOW_USER_ID";
const ENV_TEMPLATE_ID: &str = "DIGEST_FLOW_TEMPLATE_ID";

const DEFAULT_ARTICLE_TITLE: &str = "What's happening in Alation?";
const DEFAULT_FIELD_NAME: &str = "Recent Updates";

/// Everything one digest run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Platform base URL, e.g. `https://catalog.example.com`.
    pub base_url: String,
    /// Long-lived refresh token exchanged for an access token each run.
    #[serde(default)]
    pub refresh_token: String,
    /// Id of the user the refresh token belongs to.
    #[serde(default)]
    pub user_id: u64,
    /// Custom template id. Looked up by title when absent.
    #[serde(default)]
    pub custom_template_id: Option<u64>,
    /// Custom template title; also addresses the bulk update endpoint.
    pub custom_template_title: String,
    /// Title of the article that receives the digest.
    #[serde(default = "default_article_title")]
    pub article_title: String,
    /// Custom field that receives the report HTML.
    #[serde(default = "default_field_name")]
    pub field_name: String,
    /// Queries in report order.
    #[serde(default = "default_queries")]
    pub queries: Vec<QueryDescriptor>,
    /// Transport settings.
    #[serde(default)]
    pub http: HttpSettings,
    /// Asynchronous job polling settings.
    #[serde(default)]
    pub job_poll: JobPollSettings,
    /// Directory for rolling log files.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// Transport settings shared by every request of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Per-request timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Skip TLS certificate verification. On by default because catalog
    /// instances commonly run with self-signed certificates.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            accept_invalid_certs: default_accept_invalid_certs(),
        }
    }
}

/// Bounds for waiting on an asynchronous bulk job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPollSettings {
    /// Delay before the second poll.
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    /// Upper bound for a single delay.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Growth factor applied after each poll.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Maximum number of status polls.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Overall wall-clock limit for one job.
    #[serde(default = "default_deadline_seconds")]
    pub deadline_seconds: u64,
}

impl Default for JobPollSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
            deadline_seconds: default_deadline_seconds(),
        }
    }
}

impl FeedConfig {
    /// Read, override from the process environment, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: FeedConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config JSON: {}", path.display()))?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        tracing::debug!(
            "config loaded from {}: {} queries, template {:?}",
            path.display(),
            config.queries.len(),
            config.custom_template_id
        );
        Ok(config)
    }

    /// Apply `DIGEST_FLOW_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(base_url) = read(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(token) = read(ENV_REFRESH_TOKEN) {
            self.refresh_token = token;
        }
        if let Some(user_id) = read(ENV_USER_ID) {
            self.user_id = user_id
                .parse()
                .with_context(|| format!("{ENV_USER_ID} must be an integer, got `{user_id}`"))?;
        }
        if let Some(template_id) = read(ENV_TEMPLATE_ID) {
            self.custom_template_id = Some(template_id.parse().with_context(|| {
                format!("{ENV_TEMPLATE_ID} must be an integer, got `{template_id}`")
            })?);
        }
        Ok(())
    }

    /// Reject configurations a run cannot succeed with.
    pub fn validate(&self) -> Result<()> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            bail!("`base_url` is required");
        }
        let parsed = Url::parse(base_url).with_context(|| format!("invalid `base_url`: {base_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("`base_url` must use http or https");
        }
        if self.refresh_token.trim().is_empty() {
            bail!("`refresh_token` is required (config file or {ENV_REFRESH_TOKEN})");
        }
        if self.custom_template_title.trim().is_empty() {
            bail!("`custom_template_title` is required");
        }
        if self.article_title.trim().is_empty() {
            bail!("`article_title` must not be empty");
        }
        if self.field_name.trim().is_empty() {
            bail!("`field_name` must not be empty");
        }
        if self.queries.is_empty() {
            bail!("at least one query must be configured");
        }
        let mut seen = HashSet::new();
        for query in &self.queries {
            if !seen.insert(query.kind) {
                bail!("query kind `{}` is configured more than once", query.kind);
            }
        }

        let poll = &self.job_poll;
        if poll.max_attempts == 0 || poll.deadline_seconds == 0 || poll.initial_interval_ms == 0 {
            bail!("`job_poll` attempts, deadline and interval must be positive");
        }
        if !(poll.multiplier.is_finite() && poll.multiplier >= 1.0) {
            bail!("`job_poll.multiplier` must be >= 1.0");
        }
        if poll.max_interval_ms < poll.initial_interval_ms {
            bail!("`job_poll.max_interval_ms` must be >= `initial_interval_ms`");
        }
        Ok(())
    }
}

fn default_article_title() -> String {
    DEFAULT_ARTICLE_TITLE.to_string()
}

fn default_field_name() -> String {
    DEFAULT_FIELD_NAME.to_string()
}

fn default_queries() -> Vec<QueryDescriptor> {
    vec![
        QueryDescriptor {
            id: 62,
            kind: QueryKind::TopArticles,
        },
        QueryDescriptor {
            id: 63,
            kind: QueryKind::NewArticles,
        },
        QueryDescriptor {
            id: 64,
            kind: QueryKind::UnansweredQuestions,
        },
        QueryDescriptor {
            id: 68,
            kind: QueryKind::NewQueries,
        },
    ]
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_initial_interval_ms() -> u64 {
    500
}

fn default_max_interval_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    60
}

fn default_deadline_seconds() -> u64 {
    300
}
