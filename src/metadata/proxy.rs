use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::metadata::head_scan;
use crate::metadata::types::{BodyKind, FetchError};

pub const READABILITY_PROXY_KEY: &str = "jina";
pub const RAW_HTML_PROXY_KEY: &str = "ao";

const READABILITY_PROXY_BASE: &str = "https://r.jina.ai/";
const RAW_HTML_PROXY_BASE: &str = "https://api.allorigins.win/raw";

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";

/// One CORS-proxy strategy. `fetch_text` must honor the token at every
/// network boundary; `scan_head` reads only up to `</head>` where the
/// transport allows it (the default just reads the full body).
#[async_trait]
pub trait ProxyEndpoint: Send + Sync {
    fn key(&self) -> &'static str;
    fn kind(&self) -> BodyKind;

    async fn fetch_text(&self, target: &Url, token: &CancellationToken)
        -> Result<String, FetchError>;

    async fn scan_head(
        &self,
        target: &Url,
        token: &CancellationToken,
    ) -> Result<String, FetchError> {
        self.fetch_text(target, token).await
    }
}

pub fn default_client() -> Client {
    // No per-request timeout: slow proxies are bounded by the race (a faster
    // sibling wins) or by the head-scanner's byte cap, per the caller.
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// Appends a timestamp query parameter so the proxy cannot serve a stale
/// cached copy of the page.
fn with_no_cache(request_url: &str) -> String {
    let sep = if request_url.contains('?') { '&' } else { '?' };
    let now = chrono::Utc::now().timestamp_millis();
    format!("{request_url}{sep}nocache={now}")
}

fn raw_html_request_url(target: &Url) -> String {
    Url::parse_with_params(RAW_HTML_PROXY_BASE, &[("url", target.as_str())])
        .map(|u| u.to_string())
        // RAW_HTML_PROXY_BASE is a valid constant; this arm is unreachable
        .unwrap_or_else(|_| RAW_HTML_PROXY_BASE.to_string())
}

/// GET with cooperative cancellation at both the send and body-read
/// boundaries. Non-success statuses become `ProxyHttp`.
async fn get_text(
    client: &Client,
    request_url: &str,
    token: &CancellationToken,
) -> Result<String, FetchError> {
    if token.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    let response = tokio::select! {
        _ = token.cancelled() => return Err(FetchError::Cancelled),
        result = client.get(request_url).send() => {
            result.map_err(|err| FetchError::Network(err.to_string()))?
        }
    };

    let status = response.status();
    if !status.is_success() {
        log::warn!("proxy non-success response url={request_url} status={status}");
        return Err(FetchError::ProxyHttp {
            status: status.as_u16(),
        });
    }

    tokio::select! {
        _ = token.cancelled() => Err(FetchError::Cancelled),
        result = response.text() => {
            result.map_err(|err| FetchError::Network(err.to_string()))
        }
    }
}

/// Readability proxy: returns extracted page text, not HTML. Cheap and fast
/// for titles, useless for `<link rel>` icon tags.
pub struct ReadabilityProxy {
    client: Client,
}

impl ReadabilityProxy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProxyEndpoint for ReadabilityProxy {
    fn key(&self) -> &'static str {
        READABILITY_PROXY_KEY
    }

    fn kind(&self) -> BodyKind {
        BodyKind::ReadableText
    }

    async fn fetch_text(
        &self,
        target: &Url,
        token: &CancellationToken,
    ) -> Result<String, FetchError> {
        let request_url = with_no_cache(&format!("{READABILITY_PROXY_BASE}{target}"));
        get_text(&self.client, &request_url, token).await
    }
}

/// Raw-HTML CORS proxy: relays the page body untouched.
pub struct RawHtmlProxy {
    client: Client,
}

impl RawHtmlProxy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProxyEndpoint for RawHtmlProxy {
    fn key(&self) -> &'static str {
        RAW_HTML_PROXY_KEY
    }

    fn kind(&self) -> BodyKind {
        BodyKind::Html
    }

    async fn fetch_text(
        &self,
        target: &Url,
        token: &CancellationToken,
    ) -> Result<String, FetchError> {
        let request_url = with_no_cache(&raw_html_request_url(target));
        get_text(&self.client, &request_url, token).await
    }

    /// Streams the body and stops at `</head>`. No cache-busting here: a
    /// cached copy of the head is fine, and the proxy cache saves a transfer.
    async fn scan_head(
        &self,
        target: &Url,
        token: &CancellationToken,
    ) -> Result<String, FetchError> {
        let request_url = raw_html_request_url(target);
        head_scan::scan_head(&self.client, &request_url, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cache_appends_first_query_param() {
        let busted = with_no_cache("https://r.jina.ai/https://example.com");
        assert!(busted.contains("?nocache="));
    }

    #[test]
    fn no_cache_appends_to_existing_query() {
        let busted = with_no_cache("https://api.allorigins.win/raw?url=x");
        assert!(busted.contains("&nocache="));
        assert_eq!(busted.matches('?').count(), 1);
    }

    #[test]
    fn raw_request_url_encodes_target() {
        let target = Url::parse("https://example.com/path?q=1").unwrap();
        let request_url = raw_html_request_url(&target);
        assert!(request_url.starts_with("https://api.allorigins.win/raw?url="));
        assert!(!request_url[RAW_HTML_PROXY_BASE.len()..].contains("?q=1"));
    }
}
