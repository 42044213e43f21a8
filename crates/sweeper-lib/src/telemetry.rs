//! Telemetry query provider
//!
//! Resolves "when was this VM last started" from a Log Analytics
//! workspace. The answer is best effort by contract: no data, a missing
//! workspace id, and query failures of any kind all come back as `None`,
//! so the rule engine degrades to no-op instead of guessing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

const TIME_GENERATED: &str = "TimeGenerated";

/// Query window for the last-start lookup, ISO 8601 duration
const QUERY_TIMESPAN: &str = "P30D";

/// Source of "most recent start time" for a VM.
///
/// Expected absence is not an error; implementations log failures and
/// return `None` rather than surfacing them to the evaluator.
#[async_trait]
pub trait StartTimeSource: Send + Sync {
    async fn last_start_time(
        &self,
        workspace_id: &str,
        vm_resource_id: &str,
    ) -> Option<DateTime<Utc>>;
}

/// Errors from the underlying Log Analytics query, before they are
/// collapsed to `None` at the trait boundary
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("query returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed query response: {0}")]
    Malformed(String),
}

/// REST client for the Log Analytics query endpoint
pub struct LogAnalyticsClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default = "Vec::new")]
    tables: Vec<QueryTable>,
}

#[derive(Debug, Deserialize)]
struct QueryTable {
    #[serde(default = "Vec::new")]
    columns: Vec<QueryColumn>,
    #[serde(default = "Vec::new")]
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct QueryColumn {
    name: String,
}

impl LogAnalyticsClient {
    /// Create a client against the given query endpoint
    /// (`https://api.loganalytics.io` outside of tests).
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        let mut endpoint = endpoint.into();
        while endpoint.ends_with('/') {
            endpoint.pop();
        }
        Self {
            http,
            endpoint,
            token: token.into(),
        }
    }

    fn build_query(vm_resource_id: &str) -> String {
        format!(
            "AzureActivity \
             | where ResourceId == '{vm_resource_id}' \
             | where OperationNameValue == 'Microsoft.Compute/virtualMachines/start/action' \
             | order by TimeGenerated desc \
             | take 1 \
             | project TimeGenerated"
        )
    }

    /// Run the last-start query. `Ok(None)` means the workspace has no
    /// matching activity; errors are for the caller to collapse.
    pub async fn query_last_start(
        &self,
        workspace_id: &str,
        vm_resource_id: &str,
    ) -> Result<Option<DateTime<Utc>>, TelemetryError> {
        let url = format!("{}/v1/workspaces/{}/query", self.endpoint, workspace_id);
        let body = serde_json::json!({
            "query": Self::build_query(vm_resource_id),
            "timespan": QUERY_TIMESPAN,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryResponse = response.json().await?;
        let Some(table) = parsed.tables.first() else {
            return Ok(None);
        };
        let Some(column) = table
            .columns
            .iter()
            .position(|column| column.name == TIME_GENERATED)
        else {
            return Ok(None);
        };
        let Some(row) = table.rows.first() else {
            return Ok(None);
        };

        let cell = row
            .get(column)
            .and_then(Value::as_str)
            .ok_or_else(|| TelemetryError::Malformed("non-string TimeGenerated cell".into()))?;
        let timestamp = DateTime::parse_from_rfc3339(cell)
            .map_err(|e| TelemetryError::Malformed(format!("bad TimeGenerated value: {e}")))?;
        Ok(Some(timestamp.with_timezone(&Utc)))
    }
}

#[async_trait]
impl StartTimeSource for LogAnalyticsClient {
    async fn last_start_time(
        &self,
        workspace_id: &str,
        vm_resource_id: &str,
    ) -> Option<DateTime<Utc>> {
        if workspace_id.trim().is_empty() {
            return None;
        }

        match self.query_last_start(workspace_id, vm_resource_id).await {
            Ok(start_time) => start_time,
            Err(error) => {
                warn!(
                    vm = %vm_resource_id,
                    error = %error,
                    "Failed to query Log Analytics for VM start time"
                );
                None
            }
        }
    }
}
