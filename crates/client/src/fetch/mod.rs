//! HTTP fetch pipeline.
//!
//! ### Identity
//! - Every request carries the configured `User-Agent`; some origins refuse
//!   the default client identity.
//!
//! ### Safety Gates
//! - Only `http` and `https` URLs are fetched.
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - Non-success status codes are errors.
//!
//! No retries: a failed fetch is reported to the caller, which skips the URL
//! for the current run.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url, header};
use std::time::{Duration, Instant};

use feedwatch_core::{AppConfig, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: desktop browser identity)
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: feedwatch_core::config::DEFAULT_USER_AGENT.to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// Source of raw document bytes.
///
/// The change detection run only depends on this trait, so tests can serve
/// canned pages instead of hitting the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` and return the response body.
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, Error>;
}

/// HTTP fetch client.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Fetch a URL and return the response body.
    ///
    /// Response metadata (final URL, content type, timing) is logged, not returned.
    pub async fn fetch(&self, url_str: &str) -> Result<Bytes, Error> {
        let start = Instant::now();
        let url = parse_http_url(url_str)?;

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| transport_error(&url, &e))?;

        let status = response.status();

        if !status.is_success() {
            return Err(Error::HttpError(format!("status {} for {}", status.as_u16(), url)));
        }

        if let Some(len) = response.content_length()
            && exceeds_limit(len, self.config.max_bytes)
        {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                len, self.config.max_bytes
            )));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let bytes = response.bytes().await.map_err(|e| transport_error(&url, &e))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!(
                "{} bytes exceeds {}",
                bytes.len(),
                self.config.max_bytes
            )));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            status = status.as_u16(),
            content_type = %content_type,
            "fetched {} -> {} in {}ms ({} bytes)",
            url,
            final_url,
            fetch_ms,
            bytes.len()
        );

        Ok(bytes)
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, Error> {
        self.fetch(url).await
    }
}

/// Parse `input` as an absolute http(s) URL.
fn parse_http_url(input: &str) -> Result<Url, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".into()));
    }

    let url = Url::parse(trimmed).map_err(|e| Error::InvalidUrl(format!("{trimmed}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }
}

/// Whether a declared `Content-Length` is over `max_bytes`.
///
/// A length that does not fit in `usize` is over any limit.
fn exceeds_limit(len: u64, max_bytes: usize) -> bool {
    usize::try_from(len).map_or(true, |n| n > max_bytes)
}

fn transport_error(url: &Url, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::HttpError(format!("network error for {url}: {err}"))
    }
}
