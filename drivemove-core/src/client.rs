use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::batch::{self, BatchChunkResult, BatchRequest, BatchResponse, MAX_BATCH_REQUESTS};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const FILES_PATH: &str = "/drive/v3/files";
const BATCH_PATH: &str = "/batch/drive/v3";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed batch response: {0}")]
    MalformedBatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    NotFound,
    RateLimit,
    Quota,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn get_file(
        &self,
        id: &str,
        fields: Option<&[&str]>,
    ) -> Result<DriveFile, DriveError> {
        let mut url = self.file_endpoint(id)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("supportsAllDrives", "true");
            if let Some(fields) = fields.filter(|f| !f.is_empty()) {
                query.append_pair("fields", &fields.join(","));
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_files(
        &self,
        q: &str,
        page_size: u32,
        page_token: Option<&str>,
        fields: Option<&[&str]>,
    ) -> Result<FileList, DriveError> {
        let mut url = self.endpoint(FILES_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", q);
            query.append_pair("pageSize", &page_size.to_string());
            query.append_pair("supportsAllDrives", "true");
            query.append_pair("includeItemsFromAllDrives", "true");
            if let Some(token) = page_token.filter(|t| !t.is_empty()) {
                query.append_pair("pageToken", token);
            }
            if let Some(fields) = fields.filter(|f| !f.is_empty()) {
                query.append_pair(
                    "fields",
                    &format!("nextPageToken,files({})", fields.join(",")),
                );
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_files_all(
        &self,
        q: &str,
        page_size: u32,
        fields: Option<&[&str]>,
    ) -> Result<Vec<DriveFile>, DriveError> {
        let page_size = page_size.clamp(1, 1000);
        let mut page_token: Option<String> = None;
        let mut files = Vec::new();
        loop {
            let page = self
                .list_files(q, page_size, page_token.as_deref(), fields)
                .await?;
            files.extend(page.files);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(files)
    }

    pub async fn create_folder(&self, name: &str, parent: &str) -> Result<DriveFile, DriveError> {
        let mut url = self.endpoint(FILES_PATH)?;
        url.query_pairs_mut()
            .append_pair("supportsAllDrives", "true")
            .append_pair("fields", "id,name,mimeType,parents");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({
                "name": name,
                "parents": [parent],
                "mimeType": FOLDER_MIME_TYPE,
            }))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn update_parents(
        &self,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<DriveFile, DriveError> {
        let url = self.update_parents_url(id, add, remove)?;
        let response = self
            .http
            .patch(url)
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn delete_file(&self, id: &str) -> Result<(), DriveError> {
        let url = self.delete_url(id)?;
        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(DriveError::Api { status, body })
    }

    /// Builds a batch sub-request for `update_parents` without sending it.
    pub fn update_parents_request(
        &self,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<BatchRequest, DriveError> {
        let url = self.update_parents_url(id, add, remove)?;
        Ok(BatchRequest::new(Method::PATCH, &url).with_body(json!({})))
    }

    pub fn delete_request(&self, id: &str) -> Result<BatchRequest, DriveError> {
        let url = self.delete_url(id)?;
        Ok(BatchRequest::new(Method::DELETE, &url))
    }

    /// Sends `requests` through the batch endpoint in chunks of at most
    /// [`MAX_BATCH_REQUESTS`]. Yields one result per chunk in input order; a
    /// chunk that fails as a whole leaves the others untouched.
    pub async fn execute_batch(&self, requests: &[BatchRequest]) -> Vec<BatchChunkResult> {
        let mut chunks = Vec::with_capacity(requests.len().div_ceil(MAX_BATCH_REQUESTS));
        for chunk in requests.chunks(MAX_BATCH_REQUESTS) {
            chunks.push(self.execute_batch_chunk(chunk).await);
        }
        chunks
    }

    async fn execute_batch_chunk(
        &self,
        requests: &[BatchRequest],
    ) -> Result<Vec<BatchResponse>, DriveError> {
        let url = self.endpoint(BATCH_PATH)?;
        let body = batch::encode_body(requests);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/mixed; boundary={}", batch::BOUNDARY),
            )
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api { status, body });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let boundary = batch::boundary_from_content_type(&content_type).ok_or_else(|| {
            DriveError::MalformedBatch(format!("missing boundary in {content_type:?}"))
        })?;
        let text = response.text().await?;
        batch::decode_body(&text, &boundary, requests.len())
    }

    fn update_parents_url(
        &self,
        id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<Url, DriveError> {
        let mut url = self.file_endpoint(id)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("supportsAllDrives", "true");
            if !add.is_empty() {
                query.append_pair("addParents", &add.join(","));
            }
            if !remove.is_empty() {
                query.append_pair("removeParents", &remove.join(","));
            }
        }
        Ok(url)
    }

    fn delete_url(&self, id: &str) -> Result<Url, DriveError> {
        let mut url = self.file_endpoint(id)?;
        url.query_pairs_mut().append_pair("supportsAllDrives", "true");
        Ok(url)
    }

    fn file_endpoint(&self, id: &str) -> Result<Url, DriveError> {
        let mut url = self.endpoint(FILES_PATH)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(id);
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}

/// Drive search query for the non-trashed children of `parent`.
pub fn children_query(parent: &str, folders_only: bool) -> String {
    let escaped = parent.replace('\\', "\\\\").replace('\'', "\\'");
    let mut q = format!("'{escaped}' in parents and trashed=false");
    if folders_only {
        q.push_str(&format!(" and mimeType='{FOLDER_MIME_TYPE}'"));
    }
    q
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, body } => Some(classify_api_status(*status, body)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

impl ApiErrorClass {
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        classify_api_status(status, body)
    }
}

fn classify_api_status(status: StatusCode, body: &str) -> ApiErrorClass {
    // Drive reports quota and rate limits as 403 with a reason in the body.
    let reason_is = |needle: &str| body.contains(needle);
    if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (reason_is("rateLimitExceeded") || reason_is("userRateLimitExceeded")))
    {
        ApiErrorClass::RateLimit
    } else if status == StatusCode::FORBIDDEN
        && (reason_is("storageQuotaExceeded")
            || reason_is("teamDriveFileLimitExceeded")
            || reason_is("quotaExceeded"))
    {
        ApiErrorClass::Quota
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub drive_id: Option<String>,
    #[serde(default)]
    pub trashed: bool,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}
