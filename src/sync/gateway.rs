// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::utils::http_client;

/// One remote row: scalar cells, first cell is the source record's id.
pub type RemoteRow = Vec<String>;

/// Retry policy class for gateway failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Errors crossing the remote table boundary. Transport problems are kept
/// distinct from API rejections so callers can tell "could not ask" apart
/// from "asked and was told no".
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The service could not be reached at all (timeout, DNS, connect).
    #[error("remote service unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("remote API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The service answered with success but the body did not parse. Not
    /// transient; retrying would replay the same broken payload.
    #[error("malformed response body: {0}")]
    Decode(String),

    /// Missing or rejected credential.
    #[error("authentication error: {0}")]
    Auth(String),
}

impl GatewayError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => RetryClass::ReauthRequired,
                408 | 429 => RetryClass::Retryable,
                500..=599 => RetryClass::Retryable,
                _ => RetryClass::Permanent,
            },
            Self::Unreachable(_) => RetryClass::Retryable,
            Self::Decode(_) => RetryClass::Permanent,
            Self::Auth(_) => RetryClass::ReauthRequired,
        }
    }
}

/// Capability set of the remote tabular store. Non-transactional, no upsert:
/// the reconciliation engine composes these into an update/append scheme.
pub trait RemoteTableGateway {
    /// `Ok(false)` means the table is confirmed absent; an `Err` means the
    /// check itself could not be performed.
    fn table_exists(&self, table_id: &str) -> Result<bool, GatewayError>;

    fn create_table(&self, title: &str) -> Result<String, GatewayError>;

    /// Idempotently guarantee the named sub-tables exist inside the table.
    fn ensure_named_sheets(&self, table_id: &str, names: &[&str]) -> Result<(), GatewayError>;

    /// Empty Vec (not an error) when the range holds no data yet.
    fn read_range(&self, table_id: &str, range: &str) -> Result<Vec<RemoteRow>, GatewayError>;

    /// Overwrite exactly the addressed cells.
    fn write_range(
        &self,
        table_id: &str,
        range: &str,
        rows: &[RemoteRow],
    ) -> Result<(), GatewayError>;

    /// Insert-only: always grows the table, never overwrites.
    fn append_rows(
        &self,
        table_id: &str,
        range: &str,
        rows: &[RemoteRow],
    ) -> Result<(), GatewayError>;
}

const MAX_ATTEMPTS: usize = 3;
const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8_000;

fn backoff_ms(attempt: usize) -> u64 {
    let exp = (attempt.saturating_sub(1) as u32).min(6);
    (BASE_BACKOFF_MS << exp).min(MAX_BACKOFF_MS)
}

/// Gateway implementation over the Google Sheets v4 REST API using a bearer
/// token from the external auth flow. Every call is wrapped in a short
/// capped-exponential retry for retryable classes; anything that survives the
/// retries is the caller's problem.
pub struct SheetsGateway {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
}

impl SheetsGateway {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, "https://sheets.googleapis.com")
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        Ok(SheetsGateway {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn values_url(&self, table_id: &str, range: &str, suffix: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}{}",
            self.base_url,
            table_id,
            urlencoding::encode(range),
            suffix
        )
    }

    fn with_retry<T>(
        &self,
        op_name: &str,
        op: impl Fn() -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < MAX_ATTEMPTS && e.retry_class() == RetryClass::Retryable => {
                    let delay = backoff_ms(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {}ms: {}",
                        op_name, attempt, MAX_ATTEMPTS, delay, e
                    );
                    std::thread::sleep(std::time::Duration::from_millis(delay));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Map a non-success response into the error taxonomy.
    fn check(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, GatewayError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let code = status.as_u16();
        let body = resp.text().unwrap_or_default();
        let mut preview = body.chars().take(512).collect::<String>();
        if body.chars().count() > 512 {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", code, preview);
        if code == 401 || code == 403 {
            return Err(GatewayError::Auth(format!(
                "rejected with status {}: {}",
                code, preview
            )));
        }
        Err(GatewayError::api(code, preview))
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    #[serde(rename = "spreadsheetId")]
    spreadsheet_id: String,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetInfo {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetInfo>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

fn cell_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl RemoteTableGateway for SheetsGateway {
    fn table_exists(&self, table_id: &str) -> Result<bool, GatewayError> {
        self.with_retry("table_exists", || {
            let url = format!(
                "{}/v4/spreadsheets/{}?fields=spreadsheetId",
                self.base_url, table_id
            );
            let resp = self.client.get(&url).bearer_auth(&self.token).send()?;
            if resp.status().as_u16() == 404 {
                return Ok(false);
            }
            Self::check(resp)?;
            Ok(true)
        })
    }

    fn create_table(&self, title: &str) -> Result<String, GatewayError> {
        self.with_retry("create_table", || {
            let url = format!("{}/v4/spreadsheets", self.base_url);
            let body = serde_json::json!({ "properties": { "title": title } });
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .json(&body)
                .send()?;
            let created: SpreadsheetResponse = Self::check(resp)?
                .json()
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            debug!("created spreadsheet {}", created.spreadsheet_id);
            Ok(created.spreadsheet_id)
        })
    }

    fn ensure_named_sheets(&self, table_id: &str, names: &[&str]) -> Result<(), GatewayError> {
        self.with_retry("ensure_named_sheets", || {
            let url = format!(
                "{}/v4/spreadsheets/{}?fields=sheets.properties.title",
                self.base_url, table_id
            );
            let resp = self.client.get(&url).bearer_auth(&self.token).send()?;
            let meta: SpreadsheetMeta = Self::check(resp)?
                .json()
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            let existing: Vec<&str> = meta
                .sheets
                .iter()
                .map(|s| s.properties.title.as_str())
                .collect();

            let requests: Vec<serde_json::Value> = names
                .iter()
                .filter(|n| !existing.contains(*n))
                .map(|n| serde_json::json!({ "addSheet": { "properties": { "title": n } } }))
                .collect();
            if requests.is_empty() {
                return Ok(());
            }

            let url = format!("{}/v4/spreadsheets/{}:batchUpdate", self.base_url, table_id);
            let body = serde_json::json!({ "requests": requests });
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .json(&body)
                .send()?;
            Self::check(resp)?;
            Ok(())
        })
    }

    fn read_range(&self, table_id: &str, range: &str) -> Result<Vec<RemoteRow>, GatewayError> {
        self.with_retry("read_range", || {
            let url = self.values_url(table_id, range, "");
            let resp = self.client.get(&url).bearer_auth(&self.token).send()?;
            let vr: ValueRange = Self::check(resp)?
                .json()
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            Ok(vr
                .values
                .iter()
                .map(|row| row.iter().map(cell_to_string).collect())
                .collect())
        })
    }

    fn write_range(
        &self,
        table_id: &str,
        range: &str,
        rows: &[RemoteRow],
    ) -> Result<(), GatewayError> {
        self.with_retry("write_range", || {
            let url = self.values_url(table_id, range, "?valueInputOption=RAW");
            let body = serde_json::json!({ "range": range, "values": rows });
            let resp = self
                .client
                .put(&url)
                .bearer_auth(&self.token)
                .json(&body)
                .send()?;
            Self::check(resp)?;
            Ok(())
        })
    }

    fn append_rows(
        &self,
        table_id: &str,
        range: &str,
        rows: &[RemoteRow],
    ) -> Result<(), GatewayError> {
        self.with_retry("append_rows", || {
            let url = self.values_url(
                table_id,
                range,
                ":append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            );
            let body = serde_json::json!({ "values": rows });
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .json(&body)
                .send()?;
            Self::check(resp)?;
            Ok(())
        })
    }
}
