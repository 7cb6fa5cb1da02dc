//! Google Sheets API client
//!
//! Implements [`TabularSource`] and [`TabularSink`] over the Sheets v4 REST
//! API. Every mutation (create, write rows, write cell) waits on a rate
//! limiter so consecutive mutations are at least `mutation_delay_ms` apart;
//! reads are not throttled. Transient failures are retried per
//! [`RetryPolicy`], except spreadsheet creation, which is sent once.
//!
//! Authentication is a bearer access token taken from the environment.

use crate::retry::{retry_transient, RetryPolicy};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use pkr_common::config::TomlConfig;
use pkr_common::sink::{a1_range, TableHandle, TabularSink, TabularSource};
use pkr_common::{Error, Result};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const USER_AGENT: &str = concat!("pkr-sync/", env!("CARGO_PKG_VERSION"));
const CREATE_TABLE: &str = "create_table";
/// Tab written to in destination spreadsheets
pub const DEFAULT_SHEET: &str = "Sheet1";

type MutationLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// `values.get` response
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// `spreadsheets.create` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
    spreadsheet_url: String,
}

/// Sheets API client
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    limiter: Option<MutationLimiter>,
    retry: RetryPolicy,
}

impl SheetsClient {
    /// Build a client with an explicit token
    pub fn new(token: String, mutation_delay: Duration, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        let base_url = Url::parse(SHEETS_API_BASE)
            .map_err(|e| Error::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token,
            limiter: mutation_limiter(mutation_delay),
            retry,
        })
    }

    /// Build a client from config, reading the access token from the
    /// configured environment variable
    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        let var = &config.auth.access_token_env;
        let token = std::env::var(var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("Access token not set: ${var}")))?;

        Self::new(
            token,
            Duration::from_millis(config.throttle.mutation_delay_ms),
            RetryPolicy::from_config(&config.retry),
        )
    }

    /// `{base}/{segments...}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("API base URL cannot take path segments".to_string()))?
            .extend(segments);
        Ok(url)
    }

    /// Policy for one operation
    ///
    /// `create_table` is not idempotent: a request that timed out may still
    /// have created the spreadsheet, and resending it leaves an orphan.
    fn retry_policy(&self, operation: &str) -> RetryPolicy {
        match operation {
            CREATE_TABLE => RetryPolicy::none(),
            _ => self.retry,
        }
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(operation, status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::Sink {
                operation: operation.to_string(),
                message: format!("unreadable response: {e}"),
            })
    }

    async fn get_values(&self, url: &Url) -> Result<ValueRange> {
        self.send_json("fetch", self.http.get(url.clone())).await
    }

    async fn post_create(&self, body: &Value) -> Result<CreatedSpreadsheet> {
        self.throttle().await;
        self.send_json(CREATE_TABLE, self.http.post(self.base_url.clone()).json(body))
            .await
    }

    async fn put_values(&self, operation: &str, url: &Url, body: &Value) -> Result<()> {
        self.throttle().await;
        let request = self
            .http
            .put(url.clone())
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(body);
        let _: Value = self.send_json(operation, request).await?;
        Ok(())
    }
}

#[async_trait]
impl TabularSource for SheetsClient {
    async fn fetch(&mut self, table_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.endpoint(&[table_id, "values", range])?;
        debug!(table_id = %table_id, range = %range, "Fetching range");

        let this = &*self;
        let url = &url;
        let policy = this.retry_policy("fetch");
        let values = retry_transient("fetch", &policy, move || this.get_values(url)).await?;
        debug!(rows = values.values.len(), "Fetched range");
        Ok(values.values)
    }
}

#[async_trait]
impl TabularSink for SheetsClient {
    async fn create_table(&mut self, name: &str, header: Option<&[String]>) -> Result<TableHandle> {
        let body = create_body(name, header);

        let this = &*self;
        let body = &body;
        let policy = this.retry_policy(CREATE_TABLE);
        let created = retry_transient(CREATE_TABLE, &policy, move || this.post_create(body)).await?;

        info!(name = %name, url = %created.spreadsheet_url, "Created spreadsheet");
        Ok(TableHandle {
            id: created.spreadsheet_id,
            url: created.spreadsheet_url,
        })
    }

    async fn write_rows(
        &mut self,
        table_id: &str,
        start_row: usize,
        start_col: usize,
        rows: &[Vec<String>],
    ) -> Result<()> {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let range = format!("{}!{}", DEFAULT_SHEET, a1_range(start_row, start_col, rows.len(), width));
        let url = self.endpoint(&[table_id, "values", &range])?;
        let body = values_body(&range, rows);
        debug!(table_id = %table_id, range = %range, rows = rows.len(), "Writing rows");

        let this = &*self;
        let (url, body) = (&url, &body);
        let policy = this.retry_policy("write_rows");
        retry_transient("write_rows", &policy, move || this.put_values("write_rows", url, body)).await
    }

    async fn write_cell(&mut self, table_id: &str, cell: &str, value: &str) -> Result<()> {
        let range = format!("{DEFAULT_SHEET}!{cell}");
        let url = self.endpoint(&[table_id, "values", &range])?;
        let body = values_body(&range, &[vec![value.to_string()]]);
        debug!(table_id = %table_id, range = %range, "Writing cell");

        let this = &*self;
        let (url, body) = (&url, &body);
        let policy = this.retry_policy("write_cell");
        retry_transient("write_cell", &policy, move || this.put_values("write_cell", url, body)).await
    }
}

/// Limiter allowing one mutation per `delay`; `None` when delay is zero
fn mutation_limiter(delay: Duration) -> Option<MutationLimiter> {
    let quota = Quota::with_period(delay)?.allow_burst(NonZeroU32::MIN);
    Some(RateLimiter::direct(quota))
}

/// `spreadsheets.create` body: title, plus the header seeded into row 1
fn create_body(name: &str, header: Option<&[String]>) -> Value {
    let mut sheet = json!({ "properties": { "title": DEFAULT_SHEET } });
    if let Some(header) = header {
        let cells: Vec<Value> = header
            .iter()
            .map(|h| json!({ "userEnteredValue": { "stringValue": h } }))
            .collect();
        sheet["data"] = json!([{
            "startRow": 0,
            "startColumn": 0,
            "rowData": [{ "values": cells }],
        }]);
    }
    json!({
        "properties": { "title": name },
        "sheets": [sheet],
    })
}

fn values_body(range: &str, rows: &[Vec<String>]) -> Value {
    json!({
        "range": range,
        "majorDimension": "ROWS",
        "values": rows,
    })
}

/// Quota and server-side failures are worth retrying; the rest are not
fn status_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let message = format!("{status}: {}", body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::Transient {
            operation: operation.to_string(),
            message,
        }
    } else {
        Error::Sink {
            operation: operation.to_string(),
            message,
        }
    }
}

fn transport_error(operation: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::Transient {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    } else {
        Error::Sink {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }
}
