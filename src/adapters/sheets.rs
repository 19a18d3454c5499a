//! Google Sheets adapter.
//!
//! Reads choose between displayed text and stored formulas per request, so
//! link cells can come back as the stored `=HYPERLINK(...)` formula. Writes
//! use USER_ENTERED so the document parses formulas instead of storing them
//! as text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use super::{SheetClient, ValueRender};

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

/// Sheets v4 client
pub struct SheetsClient {
    /// Bearer token
    access_token: String,
    /// Scheme and host
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

/// values.get response
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// spreadsheets.get response restricted to tab titles
#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

impl SheetsClient {
    /// Create a client talking to the public Google endpoint
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    /// Create a client for a different endpoint (used against mock servers)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build `<base>/v4/spreadsheets/<segments...>` with each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid Sheets base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Sheets base URL cannot have a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets"])
            .extend(segments);
        Ok(url)
    }

    /// List the tab titles of a spreadsheet, in document order
    pub async fn list_tabs(&self, document_id: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url(&[document_id])?)
            .bearer_auth(&self.access_token)
            .query(&[("fields", "sheets.properties.title")])
            .send()
            .await
            .with_context(|| format!("Failed to read spreadsheet {}", document_id))?;

        let meta: SpreadsheetMeta = error_for_status(response, document_id)
            .await?
            .json()
            .await
            .context("Failed to parse spreadsheet metadata")?;

        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn put_values(&self, document_id: &str, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let response = self
            .client
            .put(self.url(&[document_id, "values", range])?)
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&serde_json::json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": rows,
            }))
            .send()
            .await
            .with_context(|| format!("Failed to write {} in {}", range, document_id))?;

        error_for_status(response, document_id).await?;
        Ok(())
    }
}

#[async_trait]
impl SheetClient for SheetsClient {
    async fn read_range(
        &self,
        document_id: &str,
        range: &str,
        render: ValueRender,
    ) -> Result<Vec<Vec<String>>> {
        let render = match render {
            ValueRender::Formatted => "FORMATTED_VALUE",
            ValueRender::Formula => "FORMULA",
        };

        let response = self
            .client
            .get(self.url(&[document_id, "values", range])?)
            .bearer_auth(&self.access_token)
            .query(&[("valueRenderOption", render), ("majorDimension", "ROWS")])
            .send()
            .await
            .with_context(|| format!("Failed to read {} from {}", range, document_id))?;

        let body: ValueRange = error_for_status(response, document_id)
            .await?
            .json()
            .await
            .context("Failed to parse Sheets values")?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn write_cell(&self, document_id: &str, cell: &str, value: &str) -> Result<()> {
        self.put_values(document_id, cell, &[vec![value.to_string()]])
            .await
    }

    async fn write_range(
        &self,
        document_id: &str,
        start: &str,
        rows: &[Vec<String>],
    ) -> Result<()> {
        self.put_values(document_id, start, rows).await
    }
}

/// Cells can come back as numbers or booleans under formula rendering
fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn error_for_status(response: reqwest::Response, document_id: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!(
        "Sheets request for {} failed with status {}: {}",
        document_id,
        status,
        body.trim()
    )
}
