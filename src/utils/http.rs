// src/utils/http.rs

//! HTTP client utilities.
//!
//! Every outbound request goes through [`HttpTransport`] so the pipeline can
//! be driven by a scripted transport in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};
use crate::models::HttpConfig;

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`AppError::Status`].
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AppError::status(super::redact_url(url), self.status))
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Minimal request surface used by fetchers and the notifier.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET request and read the whole body.
    async fn get(&self, url: &str) -> Result<HttpResponse>;

    /// POST a JSON document and read the whole body.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse>;
}

/// Production transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await.map_err(strip_url)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(strip_url)?;
        Ok(HttpResponse { status, body })
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse> {
        let bytes = serde_json::to_vec(body)?;
        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .header(header::ACCEPT, "application/json")
            .body(bytes)
            .send()
            .await
            .map_err(strip_url)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(strip_url)?;
        Ok(HttpResponse { status, body })
    }
}

/// Request URLs can carry the webhook token, so errors never keep them.
fn strip_url(e: reqwest::Error) -> reqwest::Error {
    e.without_url()
}

/// Browser-like headers sent with every request.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7"),
    );
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(browser_headers())
        .timeout(Duration::from_secs(config.timeout_secs));

    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        log::debug!("Routing requests through proxy {}", super::redact_url(proxy));
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_for_status() {
        let ok = HttpResponse {
            status: 204,
            body: String::new(),
        };
        assert!(ok.error_for_status("https://a.example").is_ok());

        let bad = HttpResponse {
            status: 429,
            body: "slow down".into(),
        };
        let err = bad
            .error_for_status("https://a.example/x?access_token=t")
            .unwrap_err();
        assert!(matches!(err, AppError::Status { status: 429, .. }));
        assert!(!err.to_string().contains("access_token"));
    }

    #[test]
    fn test_json_decode() {
        let response = HttpResponse {
            status: 200,
            body: r#"{"errcode":0,"errmsg":"ok"}"#.into(),
        };
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["errcode"], 0);
    }

    #[test]
    fn test_client_builds_with_proxy() {
        let config = HttpConfig {
            proxy: Some("http://127.0.0.1:7890".into()),
            ..HttpConfig::default()
        };
        assert!(create_async_client(&config).is_ok());
    }

    #[test]
    fn test_browser_headers() {
        let headers = browser_headers();
        assert!(headers.contains_key(header::ACCEPT));
        assert!(headers.contains_key(header::ACCEPT_LANGUAGE));
    }
}
