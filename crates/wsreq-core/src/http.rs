//! HTTP call descriptions shared by the request client and the bridge.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Supported HTTP methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Upper-case method name as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

/// Authorization attached to a single request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP basic auth.
    Basic {
        /// User name.
        username: String,
        /// Optional password.
        password: Option<String>,
    },
    /// `Authorization: Bearer <token>`.
    Bearer(String),
}

/// Per-call overrides for the request client.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
    /// Per-call timeout.
    pub timeout: Option<Duration>,
    /// Reject the call before sending when the serialized body is larger than this.
    pub max_body_length: Option<usize>,
    /// Maximum redirects to follow; `Some(0)` disables redirects.
    pub max_redirects: Option<usize>,
    /// Authorization for this call.
    pub credentials: Option<Credentials>,
    /// Proxy URL used for this call only.
    pub proxy: Option<String>,
}

impl RequestOptions {
    /// Options carrying only a JSON body.
    pub fn with_body(body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether a call with these options needs its own HTTP client
    /// (proxy and redirect policy are client-level settings).
    pub fn needs_dedicated_client(&self) -> bool {
        self.proxy.is_some() || self.max_redirects.is_some()
    }
}

/// The HTTP half of a combined wait: which endpoint to hit, and how.
#[derive(Clone, Debug)]
pub struct HttpTrigger {
    /// Path resolved against the bridge's HTTP base URL.
    pub url: String,
    /// Method to use.
    pub method: HttpMethod,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl HttpTrigger {
    /// Trigger without body or headers.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    /// `GET url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// `POST url` with a JSON body.
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, url).body(body)
    }

    /// `PUT url` with a JSON body.
    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, url).body(body)
    }

    /// `DELETE url` with a JSON body.
    pub fn delete(url: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Delete, url).body(body)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Request options equivalent to this trigger.
    pub fn options(&self) -> RequestOptions {
        RequestOptions {
            headers: self.headers.clone(),
            body: self.body.clone(),
            ..RequestOptions::default()
        }
    }
}
