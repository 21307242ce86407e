//! Order feed client.
//!
//! The feed is a read-only external collaborator: a periodic `GET`
//! returning the current order summaries. Failures map to
//! [`PrintError::FeedFetch`] with operator-friendly messages; the watcher
//! logs them and keeps its previous state.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::{PrintError, PrintResult};
use crate::order::Order;

/// The polled order feed, as seen by the watcher.
#[async_trait]
pub trait OrderFeed: Send + Sync {
    async fn fetch_orders(&self) -> PrintResult<Vec<Order>>;
}

/// Timeout for feed requests.
const FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalise the storefront base URL: ensure a scheme, strip trailing
/// slashes and a trailing `/api` segment.
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach storefront at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid storefront URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Feed key is invalid or expired".to_string(),
        403 => "Terminal not authorized for the order feed".to_string(),
        404 => "Order feed endpoint not found".to_string(),
        s if s >= 500 => format!("Storefront server error (HTTP {s})"),
        s => format!("Unexpected response from storefront (HTTP {s})"),
    }
}

/// HTTP client for the polled order feed.
#[derive(Clone)]
pub struct FeedClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl FeedClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> PrintResult<Self> {
        let client = Client::builder()
            .timeout(FEED_TIMEOUT)
            .build()
            .map_err(|e| PrintError::FeedFetch(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            api_key,
            client,
        })
    }

    async fn fetch_orders_inner(&self) -> PrintResult<Vec<Order>> {
        let url = format!("{}/api/orders", self.base_url);

        let mut req = self.client.get(&url);
        if let Some(key) = &self.api_key {
            req = req.header("X-Storefront-Key", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PrintError::FeedFetch(friendly_error(&self.base_url, &e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PrintError::FeedFetch(status_error(status)));
        }

        resp.json::<Vec<Order>>()
            .await
            .map_err(|e| PrintError::FeedFetch(format!("Invalid JSON from order feed: {e}")))
    }
}

#[async_trait]
impl OrderFeed for FeedClient {
    /// Fetch the current order list.
    async fn fetch_orders(&self) -> PrintResult<Vec<Order>> {
        self.fetch_orders_inner().await
    }
}
