//! HTTP transport abstraction.
//!
//! The marketplace and mail clients never talk to `reqwest` directly; they
//! build an [`HttpRequest`] and hand it to an [`HttpTransport`]. Production
//! code uses [`reqwest_transport::ReqwestTransport`], tests substitute a mock
//! so every network call can be counted.

pub mod reqwest_transport;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;

use crate::types::LendError;

pub use reqwest_transport::ReqwestTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// A fully-described outbound request.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// `(username, password)` for HTTP basic auth.
    pub basic_auth: Option<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            basic_auth: None,
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            basic_auth: None,
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    /// Value of the first header with this name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Credentials travel in headers and basic auth; keep them out of logs.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<String> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if is_sensitive_header(name) {
                    format!("{name}: <redacted>")
                } else {
                    format!("{name}: {value}")
                }
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("basic_auth", &self.basic_auth.as_ref().map(|(u, _)| u))
            .field("body", &self.body)
            .finish()
    }
}

fn is_sensitive_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case("x-lc-application-key")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// No response was received (DNS, connect, TLS, timeout, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Perform one request and return whatever the server answered.
///
/// Implementations must not retry and must not interpret the status code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Send a request and map the three failure kinds onto [`LendError`].
pub async fn send_checked(
    transport: &dyn HttpTransport,
    operation: &'static str,
    request: HttpRequest,
) -> Result<String, LendError> {
    let response = transport
        .send(request)
        .await
        .map_err(|e| LendError::Transport {
            operation,
            message: e.to_string(),
        })?;

    if !response.is_success() {
        return Err(LendError::Api {
            operation,
            status: response.status,
        });
    }

    Ok(response.body)
}

/// Deserialize a JSON body, reporting failures as `LendError::Parse`.
pub fn parse_json<T: DeserializeOwned>(operation: &'static str, body: &str) -> Result<T, LendError> {
    serde_json::from_str(body).map_err(|e| LendError::Parse {
        operation,
        message: e.to_string(),
    })
}
