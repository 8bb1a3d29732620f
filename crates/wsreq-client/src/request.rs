//! Thin HTTP client bound to a base URL.
//!
//! No retries and no message rewriting: transport, status and timeout
//! failures surface as [`HttpError`] with the transport's own wording.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use wsreq_core::{Credentials, HttpError, HttpErrorKind, HttpMethod, RequestOptions};

/// HTTP client for one base URL.
#[derive(Clone, Debug)]
pub struct RequestClient {
    base_url: String,
    client: reqwest::Client,
}

impl RequestClient {
    /// Client for `base_url` with a default `reqwest` client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Client for `base_url` reusing an existing `reqwest` client.
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Base URL relative paths resolve against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve `path`; absolute `http(s)` URLs are used as-is.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else {
            wsreq_core::url::join(&self.base_url, path)
        }
    }

    /// `GET`
    pub async fn get<T: DeserializeOwned>(&self, url: &str, options: RequestOptions) -> Result<T, HttpError> {
        self.request(HttpMethod::Get, url, options).await
    }

    /// `POST`
    pub async fn post<T: DeserializeOwned>(&self, url: &str, options: RequestOptions) -> Result<T, HttpError> {
        self.request(HttpMethod::Post, url, options).await
    }

    /// `PUT`
    pub async fn put<T: DeserializeOwned>(&self, url: &str, options: RequestOptions) -> Result<T, HttpError> {
        self.request(HttpMethod::Put, url, options).await
    }

    /// `DELETE`
    pub async fn delete<T: DeserializeOwned>(&self, url: &str, options: RequestOptions) -> Result<T, HttpError> {
        self.request(HttpMethod::Delete, url, options).await
    }

    /// Issue one call and decode the response body into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        url: &str,
        options: RequestOptions,
    ) -> Result<T, HttpError> {
        let value = self.request_value(method, url, options).await?;
        serde_json::from_value(value).map_err(|e| {
            HttpError::new(HttpErrorKind::Decode, format!("failed to decode response: {e}"))
        })
    }

    /// Issue one call and return the response body as JSON.
    ///
    /// Empty bodies are `null`; bodies that are not JSON come back as strings.
    pub async fn request_value(
        &self,
        method: HttpMethod,
        url: &str,
        options: RequestOptions,
    ) -> Result<Value, HttpError> {
        let url = self.url(url);

        let body = match &options.body {
            Some(body) => Some(serde_json::to_vec(body).map_err(|e| {
                HttpError::new(HttpErrorKind::InvalidRequest, format!("invalid request body: {e}"))
            })?),
            None => None,
        };
        if let (Some(limit), Some(bytes)) = (options.max_body_length, &body) {
            if bytes.len() > limit {
                return Err(HttpError::body_too_large(limit));
            }
        }

        let client = if options.needs_dedicated_client() {
            dedicated_client(&options)?
        } else {
            self.client.clone()
        };

        let mut builder = client.request(to_reqwest(method), &url);
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(bytes) = body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(bytes);
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        builder = match &options.credentials {
            Some(Credentials::Basic { username, password }) => builder.basic_auth(username, password.as_ref()),
            Some(Credentials::Bearer(token)) => builder.bearer_auth(token),
            None => builder,
        };

        debug!(%method, %url, "http request");
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&e, options.timeout))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(&e, options.timeout))?;
        let value = parse_body(&bytes);

        if !status.is_success() {
            debug!(%method, %url, status = status.as_u16(), "http request failed");
            let body = (!value.is_null()).then_some(value);
            return Err(HttpError::status(status.as_u16(), body));
        }
        Ok(value)
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Proxy and redirect policy are client-level, so calls that set them get their own client.
fn dedicated_client(options: &RequestOptions) -> Result<reqwest::Client, HttpError> {
    let mut builder = reqwest::Client::builder();
    if let Some(max) = options.max_redirects {
        builder = builder.redirect(if max == 0 { Policy::none() } else { Policy::limited(max) });
    }
    if let Some(proxy) = &options.proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| HttpError::new(HttpErrorKind::InvalidRequest, e.to_string()))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| HttpError::new(HttpErrorKind::InvalidRequest, e.to_string()))
}

fn transport_error(e: &reqwest::Error, timeout: Option<Duration>) -> HttpError {
    if e.is_timeout() {
        HttpError::timeout(timeout.map_or(0, |t| t.as_millis()))
    } else if e.is_builder() {
        HttpError::new(HttpErrorKind::InvalidRequest, e.to_string())
    } else {
        HttpError::new(HttpErrorKind::Network, e.to_string())
    }
}

fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde::Deserialize;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, bearer_token, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn url_resolution() {
        let client = RequestClient::new("http://localhost:45000");
        assert_eq!(client.url("/api/get"), "http://localhost:45000/api/get");
        assert_eq!(client.url("api"), "http://localhost:45000/api");
        assert_eq!(client.url("https://other/x"), "https://other/x");
    }

    #[test]
    fn body_parsing() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_body(b"plain text"), json!("plain text"));
    }

    #[tokio::test]
    async fn get_returns_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"msg": "Hello"})))
            .mount(&server)
            .await;

        let client = RequestClient::new(server.uri());
        let body: Value = client.get("/api", RequestOptions::default()).await.unwrap();
        assert_eq!(body, json!({"msg": "Hello"}));
    }

    #[tokio::test]
    async fn post_sends_json_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/post"))
            .and(body_json(json!({"test": "x"})))
            .and(header("x-trace", "abc"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"msg": "x"})))
            .expect(1)
            .mount(&server)
            .await;

        #[derive(Deserialize)]
        struct Reply {
            msg: String,
        }

        let client = RequestClient::new(server.uri());
        let reply: Reply = client
            .post(
                "/api/post",
                RequestOptions::with_body(json!({"test": "x"})).header("x-trace", "abc"),
            )
            .await
            .unwrap();
        assert_eq!(reply.msg, "x");
    }

    #[tokio::test]
    async fn non_success_status_is_status_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "missing"})))
            .mount(&server)
            .await;

        let client = RequestClient::new(server.uri());
        let err = client
            .delete::<Value>("/nope", RequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request failed with status code 404");
        assert_eq!(err.status, Some(404));
        assert_eq!(err.body, Some(json!({"error": "missing"})));
    }

    #[tokio::test]
    async fn per_call_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = RequestClient::new(server.uri());
        let err = client
            .get::<Value>("/slow", RequestOptions::default().timeout(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::Timeout);
        assert_eq!(err.to_string(), "timeout of 50ms exceeded");
    }

    #[tokio::test]
    async fn oversized_body_rejected_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = RequestClient::new(server.uri());
        let options = RequestOptions {
            max_body_length: Some(4),
            ..RequestOptions::with_body(json!({"test": "too long"}))
        };
        let err = client.put::<Value>("/api/put", options).await.unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::BodyTooLarge);
    }

    #[tokio::test]
    async fn credentials_are_attached() {
        let server = MockServer::start().await;
        Mock::given(basic_auth("user", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("basic"))
            .mount(&server)
            .await;
        Mock::given(bearer_token("tok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("bearer"))
            .mount(&server)
            .await;

        let client = RequestClient::new(server.uri());
        let basic: Value = client
            .get(
                "/",
                RequestOptions {
                    credentials: Some(Credentials::Basic {
                        username: "user".into(),
                        password: Some("secret".into()),
                    }),
                    ..RequestOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(basic, json!("basic"));

        let bearer: Value = client
            .get(
                "/",
                RequestOptions {
                    credentials: Some(Credentials::Bearer("tok".into())),
                    ..RequestOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(bearer, json!("bearer"));
    }

    #[tokio::test]
    async fn zero_redirects_surfaces_redirect_status() {
        let server = MockServer::start().await;
        Mock::given(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
            .mount(&server)
            .await;

        let client = RequestClient::new(server.uri());
        let options = RequestOptions {
            max_redirects: Some(0),
            ..RequestOptions::default()
        };
        let err = client.get::<Value>("/old", options).await.unwrap_err();
        assert_eq!(err.status, Some(302));
    }

    #[tokio::test]
    async fn empty_body_is_null_and_decode_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = RequestClient::new(server.uri());
        let body: Value = client.get("/", RequestOptions::default()).await.unwrap();
        assert!(body.is_null());

        let err = client
            .get::<Vec<u32>>("/", RequestOptions::default())
            .await
            .unwrap_err();
        assert_matches!(err.kind, HttpErrorKind::Decode);
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RequestClient::new(format!("http://{addr}"));
        let err = client.get::<Value>("/", RequestOptions::default()).await.unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::Network);
    }
}
