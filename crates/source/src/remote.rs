use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;

use crate::error::SourceError;

/// Page size used when listing a novel's chapters.
const CHAPTER_LIST_LIMIT: &str = "100";
/// Longest slice of an error body kept in `RemoteError`.
const ERROR_BODY_LIMIT: usize = 200;

/// A backend that serves chapter analysis payloads.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Raw payload for one chapter
    async fn fetch_chapter(&self, chapter_id: &str) -> Result<Value, SourceError>;

    /// Raw chapter records for one novel
    async fn list_chapters(&self, novel_id: &str) -> Result<Vec<Value>, SourceError>;
}

#[derive(Clone)]
pub struct HttpRemoteSource {
    base_url: Url,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpRemoteSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid remote base address: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Remote base address cannot carry a path: {}", base_url);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base address, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json(&self, url: Url) -> Result<Value, SourceError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SourceError::RemoteError {
                status: status.as_u16(),
                message: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::RemoteTimeout(self.timeout)
            } else {
                SourceError::MalformedDocument(format!("invalid JSON from {}: {}", url, e))
            }
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::RemoteTimeout(self.timeout)
        } else {
            SourceError::RemoteUnreachable(e.to_string())
        }
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn fetch_chapter(&self, chapter_id: &str) -> Result<Value, SourceError> {
        let url = self.endpoint(&["api", "chapters", chapter_id]);
        self.get_json(url).await
    }

    async fn list_chapters(&self, novel_id: &str) -> Result<Vec<Value>, SourceError> {
        let mut url = self.endpoint(&["api", "novels", novel_id, "chapters"]);
        url.query_pairs_mut().append_pair("limit", CHAPTER_LIST_LIMIT);

        match self.get_json(url).await? {
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => match map.remove("chapters").or_else(|| map.remove("items")) {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(SourceError::MalformedDocument(
                    "chapter listing is not a list".to_string(),
                )),
            },
            _ => Err(SourceError::MalformedDocument(
                "chapter listing is not a list".to_string(),
            )),
        }
    }
}
