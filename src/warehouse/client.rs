//! Snowflake SQL API client.
//!
//! Submits parameterized statements to `/api/v2/statements`, polls statements
//! that are still running, gathers every result partition and decodes the
//! string cells into typed rows using the result set metadata.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::statement::{Binding, Statement};
use crate::config::WarehouseConfig;
use crate::db::{Row, Value};
use crate::error::{DashError, Result};
use crate::query::QueryFetcher;
use crate::safety::SqlClassifier;

/// Path of the statements endpoint.
const STATEMENTS_PATH: &str = "/api/v2/statements";

/// Maximum number of attempts for transient errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Request body for statement submission.
#[derive(Debug, Serialize)]
pub(crate) struct StatementRequest {
    statement: String,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bindings: Option<BTreeMap<String, Binding>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatementResponse {
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResultSetMetaData {
    #[serde(default)]
    num_rows: Option<u64>,
    row_type: Vec<ColumnType>,
    #[serde(default)]
    partition_info: Vec<PartitionInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ColumnType {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    scale: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PartitionInfo {
    #[serde(default)]
    row_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Outcome of one HTTP exchange.
enum Exchange {
    Done(StatementResponse),
    Running(String),
}

/// Client for the Snowflake SQL API.
#[derive(Debug)]
pub struct WarehouseClient {
    config: WarehouseConfig,
    base_url: Url,
    token: String,
    client: Client,
    classifier: SqlClassifier,
}

impl WarehouseClient {
    /// Creates a client; fails if the account URL or token is missing.
    pub fn new(config: WarehouseConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let token = config.require_token()?.to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs + 10))
            .user_agent(concat!("dash-query/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DashError::warehouse(format!("Failed to create HTTP client: {}", e)))?;

        info!("Warehouse client ready: {}", config.display_string());
        Ok(Self {
            config,
            base_url,
            token,
            client,
            classifier: SqlClassifier::new(),
        })
    }

    /// Runs a read-only statement and returns its rows.
    pub async fn execute(&self, statement: &Statement) -> Result<Vec<Row>> {
        let classification = self.classifier.classify(statement.sql());
        if !classification.is_read_only() {
            warn!(kind = %classification.kind, "refusing non read-only statement");
            return Err(DashError::query(format!(
                "Refusing to run {} statement ({}) from a dashboard",
                classification.kind, classification.level
            )));
        }

        let request = self.build_request(statement);
        let url = self.endpoint(STATEMENTS_PATH)?;
        debug!("Submitting statement: {}", statement);

        let mut response = match self.send(|| self.client.post(url.clone()).json(&request)).await? {
            Exchange::Done(response) => response,
            Exchange::Running(handle) => self.poll(&handle).await?,
        };

        let meta = response
            .result_set_meta_data
            .take()
            .ok_or_else(|| DashError::warehouse("Response has no result set metadata"))?;
        let mut data = response.data.take().unwrap_or_default();
        if let Some(message) = response.message.as_deref() {
            debug!("Warehouse: {}", message);
        }

        if meta.partition_info.len() > 1 {
            let expected: u64 = meta.partition_info.iter().filter_map(|p| p.row_count).sum();
            debug!(
                "Result spans {} partitions ({} rows)",
                meta.partition_info.len(),
                expected
            );
            let handle = response
                .statement_handle
                .as_deref()
                .ok_or_else(|| DashError::warehouse("Partitioned response has no statement handle"))?;
            for partition in 1..meta.partition_info.len() {
                data.extend(self.fetch_partition(handle, partition).await?);
            }
        }

        if let Some(expected) = meta.num_rows {
            if expected != data.len() as u64 {
                warn!("Warehouse reported {} rows, received {}", expected, data.len());
            }
        }

        decode_rows(&meta.row_type, data)
    }

    pub(crate) fn build_request(&self, statement: &Statement) -> StatementRequest {
        StatementRequest {
            statement: statement.sql().to_string(),
            timeout: self.config.timeout_secs,
            database: self.config.database.clone(),
            schema: self.config.schema.clone(),
            warehouse: self.config.warehouse.clone(),
            role: self.config.role.clone(),
            bindings: statement.numbered_bindings(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DashError::config(format!("Invalid warehouse path '{path}': {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("X-Snowflake-Authorization-Token-Type", &self.config.token_type)
            .header("Accept", "application/json")
    }

    /// Polls a running statement until it finishes or the timeout elapses.
    async fn poll(&self, handle: &str) -> Result<StatementResponse> {
        let url = self.endpoint(&format!("{STATEMENTS_PATH}/{handle}"))?;
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs);

        loop {
            if Instant::now() >= deadline {
                return Err(DashError::warehouse(format!(
                    "Statement {handle} still running after {}s",
                    self.config.timeout_secs
                )));
            }
            tokio::time::sleep(interval).await;

            debug!("Polling statement {}", handle);
            if let Exchange::Done(response) = self.send(|| self.client.get(url.clone())).await? {
                return Ok(response);
            }
        }
    }

    async fn fetch_partition(
        &self,
        handle: &str,
        partition: usize,
    ) -> Result<Vec<Vec<Option<String>>>> {
        let mut url = self.endpoint(&format!("{STATEMENTS_PATH}/{handle}"))?;
        url.query_pairs_mut()
            .append_pair("partition", &partition.to_string());

        debug!("Fetching partition {} of {}", partition, handle);
        match self.send(|| self.client.get(url.clone())).await? {
            Exchange::Done(response) => Ok(response.data.unwrap_or_default()),
            Exchange::Running(_) => Err(DashError::warehouse(format!(
                "Partition {partition} of {handle} is not ready"
            ))),
        }
    }

    /// Sends a request, retrying rate limits, server errors and timeouts.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Exchange> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            match self.authorize(build()).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(|e| {
                        DashError::warehouse(format!("Failed to read response: {}", e))
                    })?;

                    match status {
                        StatusCode::OK => return parse_body(&body).map(Exchange::Done),
                        StatusCode::ACCEPTED => {
                            let response = parse_body(&body)?;
                            let handle = response.statement_handle.ok_or_else(|| {
                                DashError::warehouse("Running statement has no handle")
                            })?;
                            return Ok(Exchange::Running(handle));
                        }
                        _ => {}
                    }

                    let (error, retryable) = parse_error(status, &body);
                    if !retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        return Err(error);
                    }
                    warn!(
                        "Warehouse request failed (attempt {}), retrying in {:?}: {}",
                        attempt, delay, status
                    );
                    last_error = Some(error);
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    let error = DashError::warehouse(format!("Request failed: {}", e));
                    if !retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        return Err(error);
                    }
                    warn!(
                        "Warehouse request error (attempt {}), retrying in {:?}: {}",
                        attempt, delay, e
                    );
                    last_error = Some(error);
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(last_error.unwrap_or_else(|| DashError::warehouse("Request failed")))
    }
}

#[async_trait]
impl QueryFetcher<Statement> for WarehouseClient {
    async fn fetch(&self, query: &Statement) -> Result<Vec<Row>> {
        self.execute(query).await
    }
}

fn parse_body(body: &str) -> Result<StatementResponse> {
    serde_json::from_str(body)
        .map_err(|e| DashError::warehouse(format!("Failed to parse response: {}", e)))
}

/// Maps an error response to an error and whether it is worth retrying.
fn parse_error(status: StatusCode, body: &str) -> (DashError, bool) {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return (
            DashError::warehouse("Authentication failed. Check SNOWFLAKE_TOKEN."),
            false,
        );
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return (
            DashError::warehouse("Rate limited. Please wait and try again."),
            true,
        );
    }

    let retryable = status.is_server_error();

    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(body) {
        let message = match api_error.code {
            Some(code) => format!("{} ({})", api_error.message, code),
            None => api_error.message,
        };
        return (DashError::warehouse(message), retryable);
    }

    (
        DashError::warehouse(format!("Warehouse API error ({}): {}", status, body)),
        retryable,
    )
}

/// Converts raw string cells into rows keyed by column name.
pub(crate) fn decode_rows(
    columns: &[ColumnType],
    data: Vec<Vec<Option<String>>>,
) -> Result<Vec<Row>> {
    data.into_iter()
        .map(|cells| {
            columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let raw = cells.get(i).and_then(|cell| cell.as_deref());
                    decode_value(column, raw).map(|value| (column.name.clone(), value))
                })
                .collect()
        })
        .collect()
}

/// Decodes one cell using the column's declared type.
///
/// DATE cells arrive as days since the Unix epoch and TIMESTAMP cells as
/// `seconds.fraction`; the metadata says which is which.
fn decode_value(column: &ColumnType, raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    let bad = || {
        DashError::warehouse(format!(
            "Cannot decode '{}' as {} in column {}",
            raw, column.kind, column.name
        ))
    };

    let value = match column.kind.to_ascii_lowercase().as_str() {
        "fixed" if column.scale.unwrap_or(0) == 0 => match raw.parse::<i64>() {
            Ok(i) => Value::Int(i),
            // NUMBER(38, 0) can exceed i64
            Err(_) => Value::String(raw.to_string()),
        },
        "fixed" | "real" => Value::Float(raw.parse().map_err(|_| bad())?),
        "boolean" => match raw {
            "true" | "TRUE" | "1" => Value::Bool(true),
            "false" | "FALSE" | "0" => Value::Bool(false),
            _ => return Err(bad()),
        },
        "date" => {
            let days: i32 = raw.parse().map_err(|_| bad())?;
            let date = days
                .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .ok_or_else(bad)?;
            Value::Date(date)
        }
        "timestamp_ntz" | "timestamp_ltz" | "timestamp_tz" => {
            // TIMESTAMP_TZ appends the offset after a space; the instant comes first.
            let instant = raw.split_whitespace().next().ok_or_else(bad)?;
            Value::Timestamp(parse_epoch_seconds(instant).ok_or_else(bad)?)
        }
        _ => Value::String(raw.to_string()),
    };
    Ok(value)
}

/// Parses `[-]seconds[.fraction]` into a UTC timestamp.
///
/// The fraction carries the sign of the whole value, so `-1.5` is one and a
/// half seconds before the epoch.
fn parse_epoch_seconds(raw: &str) -> Option<chrono::NaiveDateTime> {
    let (negative, magnitude) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (secs, frac) = magnitude.split_once('.').unwrap_or((magnitude, ""));
    let secs: i64 = secs.parse().ok()?;
    let nanos: u32 = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
        digits.parse().ok()?
    };

    let (secs, nanos) = match (negative, nanos) {
        (false, _) => (secs, nanos),
        (true, 0) => (-secs, 0),
        (true, _) => (-secs - 1, 1_000_000_000 - nanos),
    };
    DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
}
