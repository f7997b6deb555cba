//! Walks a query's execution hierarchy down to its latest result reference.
//!
//! The platform records every run of a scheduled query as a session holding
//! batches, each batch holding events, and a terminal event pointing at the
//! materialized result. Which element is taken at each level is decided by a
//! [`SelectionPolicy`]; everything beyond the selected element is ignored.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    api_client::{ApiResponse, CatalogClient, ClientError},
    ResultReference,
};

/// Lists execution sessions, filtered by `query_id`.
pub const EXECUTION_SESSION_PATH: &str = "/integration/v1/query/execution_session/";

/// One recorded run of a query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutionSession {
    /// Batches in creation order.
    #[serde(default)]
    pub batch_ids: Vec<u64>,
}

/// A batch of execution events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutionBatch {
    /// Events in creation order.
    #[serde(default)]
    pub events: Vec<EventHandle>,
}

/// Event reference inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EventHandle {
    /// Event id.
    pub id: u64,
}

/// One execution event. Terminal events may carry a result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionEvent {
    /// Execution status, `running` until the event is terminal.
    #[serde(default)]
    pub status: Option<String>,
    /// Result reference; null or empty when nothing was materialized.
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct EventResult {
    id: u64,
    #[serde(default)]
    data_schema: Vec<SchemaColumn>,
}

#[derive(Debug, Deserialize)]
struct SchemaColumn {
    name: String,
}

impl ExecutionEvent {
    /// The result reference, when the event carries a non-empty one.
    pub fn result_reference(&self) -> Option<ResultReference> {
        let result = self.result.as_ref()?;
        if result.as_object().map_or(true, |map| map.is_empty()) {
            return None;
        }
        let parsed = serde_json::from_value::<EventResult>(result.clone()).ok()?;
        Some(ResultReference {
            result_id: parsed.id,
            schema: parsed
                .data_schema
                .into_iter()
                .map(|column| column.name)
                .collect(),
        })
    }
}

/// Tie-break rule for picking one element per hierarchy level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Most recent session (the platform lists sessions oldest first), then
    /// its first batch, then that batch's first event.
    #[default]
    LatestSessionFirstBatchFirstEvent,
}

impl SelectionPolicy {
    /// Pick the session to follow.
    pub fn select_session<'a>(&self, sessions: &'a [ExecutionSession]) -> Option<&'a ExecutionSession> {
        match self {
            SelectionPolicy::LatestSessionFirstBatchFirstEvent => sessions.last(),
        }
    }

    /// Pick the batch to follow within a session.
    pub fn select_batch(&self, session: &ExecutionSession) -> Option<u64> {
        match self {
            SelectionPolicy::LatestSessionFirstBatchFirstEvent => session.batch_ids.first().copied(),
        }
    }

    /// Pick the event to follow within a batch.
    pub fn select_event(&self, batch: &ExecutionBatch) -> Option<u64> {
        match self {
            SelectionPolicy::LatestSessionFirstBatchFirstEvent => batch.events.first().map(|event| event.id),
        }
    }
}

/// Hierarchy level at which resolution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// The query has never been executed, or the session listing failed.
    NoExecutionSession,
    /// The selected session has no batch, or the batch could not be read.
    NoBatch,
    /// The selected batch has no event, or the event could not be read.
    NoEvent,
    /// The event carries no result.
    NoResult,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NotFoundReason::NoExecutionSession => {
                "no execution session; make sure the query has been executed at least once"
            },
            NotFoundReason::NoBatch => "no execution batch",
            NotFoundReason::NoEvent => "no execution event",
            NotFoundReason::NoResult => "query has no result; republish and reschedule it",
        };
        f.write_str(text)
    }
}

/// Why a query produced no result reference.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The hierarchy ended before reaching a result.
    #[error("query {query_id}: {reason}")]
    NotFound {
        /// Query being resolved.
        query_id: u64,
        /// Level at which resolution stopped.
        reason: NotFoundReason,
    },
    /// A payload had the right shape but unexpected fields.
    #[error("query {query_id}: malformed {stage} payload: {source}")]
    Malformed {
        /// Query being resolved.
        query_id: u64,
        /// Hierarchy level of the payload.
        stage: &'static str,
        /// Decoding error.
        #[source]
        source: serde_json::Error,
    },
    /// Transport failure.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Resolves query ids to result references.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionResolver<'a> {
    client: &'a CatalogClient,
    policy: SelectionPolicy,
}

impl<'a> ExecutionResolver<'a> {
    /// Resolver using the default selection policy.
    pub fn new(client: &'a CatalogClient) -> Self {
        Self::with_policy(client, SelectionPolicy::default())
    }

    /// Resolver using an explicit selection policy.
    pub fn with_policy(client: &'a CatalogClient, policy: SelectionPolicy) -> Self {
        Self {
            client,
            policy,
        }
    }

    /// Locate the latest result of `query_id`.
    pub async fn resolve(&self, query_id: u64) -> Result<ResultReference, ResolveError> {
        let not_found = |reason| ResolveError::NotFound {
            query_id,
            reason,
        };

        let response = self
            .client
            .get(EXECUTION_SESSION_PATH, &[("query_id", query_id.to_string())])
            .await?;
        let sessions: Vec<ExecutionSession> = match response.as_array() {
            Some(items) if !items.is_empty() => decode(query_id, "execution session", &response)?,
            _ => {
                tracing::debug!("query {query_id}: session listing returned {}", response.describe());
                return Err(not_found(NotFoundReason::NoExecutionSession));
            },
        };

        let session = self
            .policy
            .select_session(&sessions)
            .ok_or_else(|| not_found(NotFoundReason::NoExecutionSession))?;
        let batch_id = self
            .policy
            .select_batch(session)
            .ok_or_else(|| not_found(NotFoundReason::NoBatch))?;

        let response = self.client.get(&batch_path(batch_id), &[]).await?;
        if response.as_object().is_none() {
            tracing::debug!("query {query_id}: batch {batch_id} returned {}", response.describe());
            return Err(not_found(NotFoundReason::NoBatch));
        }
        let batch: ExecutionBatch = decode(query_id, "execution batch", &response)?;
        let event_id = self
            .policy
            .select_event(&batch)
            .ok_or_else(|| not_found(NotFoundReason::NoEvent))?;

        let response = self.client.get(&event_path(event_id), &[]).await?;
        if response.as_object().is_none() {
            tracing::debug!("query {query_id}: event {event_id} returned {}", response.describe());
            return Err(not_found(NotFoundReason::NoEvent));
        }
        let event: ExecutionEvent = decode(query_id, "execution event", &response)?;
        let reference = event.result_reference().ok_or_else(|| {
            tracing::debug!(
                "query {query_id}: event {event_id} has no result (status {:?})",
                event.status
            );
            not_found(NotFoundReason::NoResult)
        })?;

        tracing::info!(
            "query {query_id}: batch {batch_id} event {event_id} -> result {} ({} columns)",
            reference.result_id,
            reference.schema.len()
        );
        Ok(reference)
    }
}

fn batch_path(batch_id: u64) -> String {
    format!("/integration/v1/query/execution_batch/{batch_id}/")
}

fn event_path(event_id: u64) -> String {
    format!("/integration/v1/query/execution_event/{event_id}/")
}

fn decode<T>(query_id: u64, stage: &'static str, response: &ApiResponse) -> Result<T, ResolveError>
where
    T: serde::de::DeserializeOwned,
{
    let value = match response {
        ApiResponse::Ok(value) => value.clone(),
        _ => Value::Null,
    };
    serde_json::from_value(value).map_err(|source| ResolveError::Malformed {
        query_id,
        stage,
        source,
    })
}
