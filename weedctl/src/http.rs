//! HTTP client abstraction for the form submissions.
//!
//! Handlers describe the request they want as an [`HttpRequest`] and hand it to an [`HttpClient`].
//! The production implementation uses reqwest; [`MockHttpClient`] replays canned responses so the
//! handler logic can be exercised without a server.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A single named field of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        content_type: String,
        bytes: Bytes,
    },
}

impl FormField {
    pub fn name(&self) -> &str {
        match self {
            FormField::Text { name, .. } | FormField::File { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<FormField>),
}

/// Description of a request a handler wants to issue.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn post(url: Url, body: RequestBody) -> Self {
        Self {
            method: "POST".to_string(),
            url,
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Look up a multipart field by name.
    pub fn field(&self, name: &str) -> Option<&FormField> {
        match &self.body {
            RequestBody::Multipart(fields) => fields.iter().find(|f| f.name() == name),
            _ => None,
        }
    }
}

/// Text describing `status`.
///
/// Prefers the reason phrase the server sent, then the canonical reason for the code, then the bare
/// code, so the result is never empty.
pub fn status_text(status: u16, reason: Option<&str>) -> String {
    if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
        return reason.to_string();
    }
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}

/// Response from an HTTP request, with the body fully materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status_text(status, None),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_status_text(mut self, text: &str) -> Self {
        self.status_text = status_text(self.status, Some(text));
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// A response whose status line and headers have arrived. The body is read on demand.
pub struct PendingResponse {
    pub status: u16,
    pub status_text: String,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    body: BoxFuture<'static, Result<Bytes>>,
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse")
            .field("status", &self.status)
            .field("status_text", &self.status_text)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl PendingResponse {
    pub fn new(
        status: u16,
        status_text: String,
        headers: HashMap<String, String>,
        body: impl Future<Output = Result<Bytes>> + Send + 'static,
    ) -> Self {
        Self {
            status,
            status_text,
            headers,
            body: body.boxed(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub async fn read_body(self) -> Result<Bytes> {
        self.body.await
    }

    pub async fn into_response(self) -> Result<HttpResponse> {
        let Self {
            status,
            status_text,
            headers,
            body,
        } = self;
        Ok(HttpResponse {
            status,
            status_text,
            headers,
            body: body.await?,
        })
    }
}

/// Trait for executing HTTP requests.
///
/// Implementations return `Ok` for every response the server sends, whatever its status; only
/// transport failures are errors.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send `request`, returning as soon as the status line and headers arrive.
    async fn send(&self, request: &HttpRequest) -> Result<PendingResponse>;

    /// Send `request` and read the whole body.
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.send(request).await?.into_response().await
    }
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self { client: builder.build()? })
    }

    fn multipart(fields: &[FormField]) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for field in fields {
            form = match field {
                FormField::Text { name, value } => form.text(name.clone(), value.clone()),
                FormField::File {
                    name,
                    filename,
                    content_type,
                    bytes,
                } => {
                    let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                        .file_name(filename.clone())
                        .mime_str(content_type)?;
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: &HttpRequest) -> Result<PendingResponse> {
        let method = request.method.parse::<reqwest::Method>().map_err(|e| {
            tracing::error!(method = %request.method, error = %e, "Invalid HTTP method");
            anyhow::anyhow!("Invalid HTTP method '{}': {}", request.method, e)
        })?;

        let mut req = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        req = match &request.body {
            RequestBody::Empty => req,
            RequestBody::Json(value) => req.json(value),
            RequestBody::Multipart(fields) => req.multipart(Self::multipart(fields)?),
        };

        let response = req.send().await.map_err(|e| {
            tracing::error!(url = %request.url, error = %e, "HTTP request failed");
            e
        })?;

        let status = response.status().as_u16();
        // hyper only records the reason phrase when it differs from the canonical one
        let reason = response
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned());
        let status_text = status_text(status, reason.as_deref());
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        tracing::info!(status, status_text = %status_text, "HTTP response received");

        let url = request.url.clone();
        let body = async move {
            let body = response.bytes().await.map_err(|e| {
                tracing::error!(url = %url, error = %e, "Failed to read response body");
                e
            })?;
            tracing::debug!(response_len = body.len(), "Response body read");
            Ok::<_, Error>(body)
        };

        Ok(PendingResponse::new(status, status_text, headers, body))
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

/// Mock HTTP client for testing.
///
/// Responses are keyed by `"{method} {path}"` and returned in FIFO order.
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<Result<HttpResponse>>>>>,
    calls: Arc<Mutex<Vec<HttpRequest>>>,
    delay: Option<Duration>,
    body_delay: Option<Duration>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every response for `delay` before returning it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold every response body for `delay` after its head has been returned.
    pub fn with_body_delay(mut self, delay: Duration) -> Self {
        self.body_delay = Some(delay);
        self
    }

    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(response);
    }

    pub fn get_calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: &HttpRequest) -> Result<PendingResponse> {
        self.calls.lock().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = format!("{} {}", request.method, request.url.path());
        let next = {
            let mut responses = self.responses.lock();
            responses
                .get_mut(&key)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0))
        };

        let HttpResponse {
            status,
            status_text,
            headers,
            body,
        } = next.unwrap_or_else(|| {
            Err(Error::Other(anyhow::anyhow!(
                "No mock response configured for {}",
                key
            )))
        })?;

        let body_delay = self.body_delay;
        Ok(PendingResponse::new(status, status_text, headers, async move {
            if let Some(delay) = body_delay {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, Error>(body)
        }))
    }
}
