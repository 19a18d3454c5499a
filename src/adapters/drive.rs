//! Google Drive adapter: resumable uploads and folder/spreadsheet listing.
//!
//! Uses the Drive v3 REST API with an already-issued OAuth access token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{ChunkAck, NamedItem, RemoteStorage, UploadSession};
use crate::domain::RemoteFile;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Drive v3 client
pub struct DriveClient {
    /// Bearer token
    access_token: String,
    /// Scheme and host, without trailing slash
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

/// File resource returned when an upload completes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

/// One page of a files.list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<NamedItem>,
    next_page_token: Option<String>,
}

impl DriveClient {
    /// Create a client talking to the public Google endpoint
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    /// Create a client for a different endpoint (used against mock servers)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        // 308 means "resume incomplete" here, never a redirect
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();

        Self {
            access_token: access_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/drive/v3/{}", self.base_url, path)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/drive/v3/files", self.base_url)
    }

    /// List non-trashed folders, sorted by name (case-insensitive)
    pub async fn list_folders(&self) -> Result<Vec<NamedItem>> {
        let query = format!("mimeType='{}' and trashed=false", FOLDER_MIME);
        let mut folders = self.list_files(&query).await?;
        folders.sort_by_key(|f| f.name.to_lowercase());
        Ok(folders)
    }

    /// List spreadsheets visible to the token
    pub async fn list_spreadsheets(&self) -> Result<Vec<NamedItem>> {
        let query = format!("mimeType='{}' and trashed=false", SPREADSHEET_MIME);
        self.list_files(&query).await
    }

    async fn list_files(&self, query: &str) -> Result<Vec<NamedItem>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.api_url("files"))
                .bearer_auth(&self.access_token)
                .query(&[
                    ("q", query),
                    ("spaces", "drive"),
                    ("fields", "nextPageToken, files(id, name)"),
                    ("pageSize", "100"),
                ]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .context("Failed to list Drive files")?;
            let page: FileList = error_for_status(response, "files.list")
                .await?
                .json()
                .await
                .context("Failed to parse Drive file list")?;

            items.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl RemoteStorage for DriveClient {
    async fn create_resumable_upload(
        &self,
        name: &str,
        parent_folder_id: &str,
        total_bytes: u64,
        mime_type: &str,
    ) -> Result<UploadSession> {
        let response = self
            .client
            .post(self.upload_url())
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "resumable"), ("fields", "id,webViewLink")])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", total_bytes)
            .json(&serde_json::json!({
                "name": name,
                "parents": [parent_folder_id],
            }))
            .send()
            .await
            .with_context(|| format!("Failed to start resumable upload of {}", name))?;

        let response = error_for_status(response, "resumable upload start").await?;
        let uri = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .context("Resumable upload response has no session URI")?;

        Ok(UploadSession {
            uri,
            name: name.to_string(),
            total_bytes,
            completed: None,
        })
    }

    async fn send_chunk(
        &self,
        session: &mut UploadSession,
        offset: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck> {
        let content_range = content_range(offset, bytes.len() as u64, session.total_bytes);

        let response = self
            .client
            .put(&session.uri)
            .bearer_auth(&self.access_token)
            .header(CONTENT_RANGE, content_range)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("Failed to send chunk of {} at offset {}", session.name, offset))?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let file: DriveFile = response
                    .json()
                    .await
                    .context("Failed to parse completed upload response")?;
                let link = file
                    .web_view_link
                    .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id));
                session.completed = Some(RemoteFile { id: file.id, link });
                Ok(ChunkAck {
                    done: true,
                    bytes_acked: session.total_bytes,
                })
            }
            StatusCode::PERMANENT_REDIRECT => {
                let bytes_acked = response
                    .headers()
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_range_end)
                    .map(|end| end + 1)
                    .unwrap_or(0);
                Ok(ChunkAck {
                    done: false,
                    bytes_acked,
                })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!(
                    "Chunk upload of {} failed with status {}: {}",
                    session.name,
                    status,
                    body.trim()
                )
            }
        }
    }

    async fn finalize(&self, session: UploadSession) -> Result<RemoteFile> {
        session
            .completed
            .with_context(|| format!("Upload of {} has not completed", session.name))
    }
}

/// `Content-Range` for a chunk; an empty chunk only states the total
fn content_range(offset: u64, len: u64, total: u64) -> String {
    if len == 0 {
        format!("bytes */{}", total)
    } else {
        format!("bytes {}-{}/{}", offset, offset + len - 1, total)
    }
}

/// Parse the last persisted byte from a `Range: bytes=0-N` header
fn parse_range_end(value: &str) -> Option<u64> {
    value
        .trim()
        .strip_prefix("bytes=")?
        .split('-')
        .nth(1)?
        .trim()
        .parse()
        .ok()
}

async fn error_for_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("Drive {} failed with status {}: {}", what, status, body.trim())
}
