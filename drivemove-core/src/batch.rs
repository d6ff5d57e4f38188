//! `multipart/mixed` codec for the Drive batch endpoint.
//!
//! Every sub-request is wrapped in an `application/http` part tagged with
//! `Content-ID: <item-N>`. The server answers with `<response-item-N>` parts in
//! any order, so decoding maps them back by index.

use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::{Position, Url};

use crate::client::DriveError;

pub const MAX_BATCH_REQUESTS: usize = 100;

pub(crate) const BOUNDARY: &str = "drivemove_batch_boundary";

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub method: Method,
    /// Path and query relative to the API host, e.g. `/drive/v3/files/abc?supportsAllDrives=true`.
    pub path_and_query: String,
    pub body: Option<Value>,
}

impl BatchRequest {
    pub fn new(method: Method, url: &Url) -> Self {
        Self {
            method,
            path_and_query: url[Position::BeforePath..].to_string(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Responses for one chunk, or the error that failed the whole chunk.
pub type BatchChunkResult = Result<Vec<BatchResponse>, DriveError>;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    pub status: StatusCode,
    pub body: String,
}

impl BatchResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

pub(crate) fn encode_body(requests: &[BatchRequest]) -> String {
    let mut out = String::new();
    for (index, request) in requests.iter().enumerate() {
        out.push_str(&format!("--{BOUNDARY}\r\n"));
        out.push_str("Content-Type: application/http\r\n");
        out.push_str(&format!("Content-ID: <item-{index}>\r\n\r\n"));
        out.push_str(&format!("{} {}\r\n", request.method, request.path_and_query));
        match &request.body {
            Some(body) => {
                let json = body.to_string();
                out.push_str("Content-Type: application/json; charset=UTF-8\r\n");
                out.push_str(&format!("Content-Length: {}\r\n\r\n", json.len()));
                out.push_str(&json);
                out.push_str("\r\n");
            }
            None => out.push_str("\r\n"),
        }
    }
    out.push_str(&format!("--{BOUNDARY}--\r\n"));
    out
}

pub(crate) fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.eq_ignore_ascii_case("boundary")
            .then(|| value.trim_matches('"').to_string())
    })
}

pub(crate) fn decode_body(
    body: &str,
    boundary: &str,
    expected: usize,
) -> Result<Vec<BatchResponse>, DriveError> {
    let normalized = body.replace("\r\n", "\n");
    let delimiter = format!("--{boundary}");
    let mut slots: Vec<Option<BatchResponse>> = vec![None; expected];
    let mut position = 0usize;

    for part in normalized.split(delimiter.as_str()).skip(1) {
        if part.starts_with("--") {
            break;
        }
        let part = part.trim_start_matches('\n');
        let (outer_headers, http) = split_head(part)
            .ok_or_else(|| DriveError::MalformedBatch("part without http payload".into()))?;
        let index = content_id_index(outer_headers).unwrap_or(position);
        position += 1;
        let response = parse_http_response(http)?;
        let slot = slots.get_mut(index).ok_or_else(|| {
            DriveError::MalformedBatch(format!("response index {index} out of range"))
        })?;
        *slot = Some(response);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| DriveError::MalformedBatch(format!("missing response {index}")))
        })
        .collect()
}

fn split_head(text: &str) -> Option<(&str, &str)> {
    text.split_once("\n\n")
}

fn content_id_index(headers: &str) -> Option<usize> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("content-id") {
            return None;
        }
        let value = value.trim().trim_start_matches('<').trim_end_matches('>');
        value.rsplit('-').next()?.parse().ok()
    })
}

fn parse_http_response(http: &str) -> Result<BatchResponse, DriveError> {
    let http = http.trim_start_matches('\n');
    let status_line = http
        .lines()
        .next()
        .ok_or_else(|| DriveError::MalformedBatch("empty part".into()))?;
    let code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| DriveError::MalformedBatch(format!("bad status line {status_line:?}")))?;
    let body = split_head(http)
        .map(|(_, body)| body.trim_end().to_string())
        .unwrap_or_default();
    Ok(BatchResponse { status: code, body })
}
