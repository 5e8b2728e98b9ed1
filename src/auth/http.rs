//! HTTP client capability used by discovery and the callback handler
//!
//! The handshake only ever needs two operations: a plain `GET` for endpoint
//! discovery and a form-encoded `POST` for code verification and token
//! exchange. [`HttpClient`] captures exactly that so hosts can swap in their
//! own client; [`ReqwestHttpClient`] is the default implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::HttpConfig;
use crate::error::{IndieAuthError, Result};

/// A fully buffered HTTP response.
///
/// # Examples
///
/// ```
/// use indieauth_client::auth::http::HttpResponse;
///
/// let resp = HttpResponse {
///     status: 200,
///     headers: vec![("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string())],
///     body: "me=https%3A%2F%2Falice.example%2F".to_string(),
/// };
///
/// assert!(resp.is_success());
/// assert_eq!(resp.form().get("me").map(String::as_str), Some("https://alice.example/"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Numeric status code.
    pub status: u16,

    /// Response headers in arrival order. Repeated headers appear once per
    /// occurrence.
    pub headers: Vec<(String, String)>,

    /// Response body decoded as text.
    pub body: String,
}

impl HttpResponse {
    /// Returns `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns every value of the named header, matched case-insensitively.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Parses the body into a flat key/value map.
    ///
    /// Form-encoded bodies are the protocol default. Some endpoints answer
    /// with JSON when asked nicely, so a JSON content type is honoured too;
    /// non-string JSON values are kept in their serialized form. The first
    /// occurrence of a repeated form key wins. Unparsable bodies yield an
    /// empty map.
    pub fn form(&self) -> HashMap<String, String> {
        let is_json = self
            .header_values("content-type")
            .iter()
            .any(|v| v.to_ascii_lowercase().contains("json"));

        if is_json {
            return match serde_json::from_str::<serde_json::Value>(&self.body) {
                Ok(serde_json::Value::Object(map)) => map
                    .into_iter()
                    .map(|(k, v)| {
                        let value = match v {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, value)
                    })
                    .collect(),
                _ => HashMap::new(),
            };
        }

        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(self.body.trim()).unwrap_or_default();
        let mut map = HashMap::with_capacity(pairs.len());
        for (k, v) in pairs {
            map.entry(k).or_insert(v);
        }
        map
    }
}

/// Outbound HTTP capability.
///
/// Transport failures are returned as `Err`; non-2xx statuses are returned as
/// ordinary responses so callers can inspect error payloads.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues a `GET` request.
    async fn get(&self, url: &str) -> Result<HttpResponse>;

    /// Issues a `POST` request with an `application/x-www-form-urlencoded`
    /// body.
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    http: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Wraps an existing client.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Builds a client with the timeout and user agent from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`IndieAuthError::Http`] if the TLS backend cannot be
    /// initialized.
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(IndieAuthError::Http)?;
        Ok(Self { http })
    }

    async fn buffer(resp: reqwest::Response) -> Result<HttpResponse> {
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.text().await.map_err(IndieAuthError::Http)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(IndieAuthError::Http)?;
        Self::buffer(resp).await
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        let resp = self
            .http
            .post(url)
            .header(
                reqwest::header::ACCEPT,
                "application/x-www-form-urlencoded, application/json;q=0.9",
            )
            .form(form)
            .send()
            .await
            .map_err(IndieAuthError::Http)?;
        Self::buffer(resp).await
    }
}
