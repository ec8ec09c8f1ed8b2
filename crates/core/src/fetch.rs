//! The authenticated fetch capability.
//!
//! The core never performs the identity handshake. Hosts obtain a credential however they like
//! and hand the core an [`AuthenticatedFetch`] bound to the resulting identity. The contract
//! mirrors HTTP fetch: every HTTP status, including 4xx/5xx, is a successful [`FetchResponse`];
//! only failure to obtain a response at all is a [`FetchError`].

use async_trait::async_trait;
use pod_types::WebId;
use std::fmt;

/// Errors from the transport itself (no HTTP response was obtained).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request could not be built: {0}")]
    InvalidRequest(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// HTTP methods used against pod storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Put => f.write_str("PUT"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn put(url: impl Into<String>, content_type: &str, body: impl Into<String>) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            headers: vec![("Content-Type".into(), content_type.into())],
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_owned),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A fetch function bound to one authenticated identity.
#[async_trait]
pub trait AuthenticatedFetch: Send + Sync {
    /// The identity every request is made as.
    fn web_id(&self) -> &WebId;

    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// [`AuthenticatedFetch`] over HTTP, presenting a bearer access token.
#[derive(Clone)]
pub struct ReqwestFetch {
    client: reqwest::Client,
    web_id: WebId,
    access_token: Option<String>,
}

impl ReqwestFetch {
    pub fn new(web_id: WebId, access_token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), web_id, access_token)
    }

    pub fn with_client(client: reqwest::Client, web_id: WebId, access_token: Option<String>) -> Self {
        Self {
            client,
            web_id,
            access_token,
        }
    }
}

impl fmt::Debug for ReqwestFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestFetch")
            .field("web_id", &self.web_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl AuthenticatedFetch for ReqwestFetch {
    fn web_id(&self) -> &WebId {
        &self.web_id
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                FetchError::InvalidRequest(e.to_string())
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}
