pub mod extract;
pub mod head_scan;
pub mod proxy;
pub mod race;
pub mod types;

pub use types::{BodyKind, FetchError, ProxyPrefs, ResolutionResult};

use std::sync::Arc;

use scraper::Html;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use proxy::ProxyEndpoint;
use race::ProxyRace;
use types::IconCandidate;

/// Prepends `https://` to schemeless input. Idempotent: an already-absolute
/// URL passes through untouched.
pub fn ensure_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

pub fn normalize_input_url(raw: &str) -> Result<Url, FetchError> {
    Url::parse(&ensure_scheme(raw)).map_err(|err| FetchError::InvalidUrl(err.to_string()))
}

/// Turns a URL into a display title and an icon URL by racing CORS proxies
/// and walking the icon-candidate tiers. `resolve` never fails: every
/// internal error degrades to a hostname-derived title and a favicon-service
/// icon, and unparsable input echoes back as the title.
pub struct Resolver {
    race: ProxyRace,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        let client = proxy::default_client();
        let endpoints: Vec<Arc<dyn ProxyEndpoint>> = vec![
            Arc::new(proxy::ReadabilityProxy::new(client.clone())),
            Arc::new(proxy::RawHtmlProxy::new(client)),
        ];
        Self::with_endpoints(endpoints, ProxyPrefs::new())
    }

    pub fn with_endpoints(endpoints: Vec<Arc<dyn ProxyEndpoint>>, prefs: ProxyPrefs) -> Self {
        Self {
            race: ProxyRace::new(endpoints, prefs),
        }
    }

    pub async fn resolve(&self, raw_url: &str, token: &CancellationToken) -> ResolutionResult {
        match self.try_resolve(raw_url, token).await {
            Ok(result) => {
                log::debug!(
                    "resolved {raw_url}: title={:?} icon={}",
                    result.title,
                    result.icon
                );
                result
            }
            Err(err) => {
                log::debug!("resolution failed for {raw_url} ({err}), using fallback");
                fallback_result(raw_url)
            }
        }
    }

    async fn try_resolve(
        &self,
        raw_url: &str,
        token: &CancellationToken,
    ) -> Result<ResolutionResult, FetchError> {
        let page_url = normalize_input_url(raw_url)?;
        if token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let outcome = self.race.race_any(&page_url, token).await?;

        // scraper documents are not Send; pull everything out before awaiting
        let (title, manifest, link_candidates) = {
            let doc = Html::parse_document(&outcome.body.text);
            (
                extract::extract_title(&doc, &page_url, &outcome.body.text, outcome.body.kind),
                extract::manifest_url(&doc, &page_url),
                extract::link_icon_candidates(&doc, &page_url),
            )
        };

        let mut pool: Vec<IconCandidate> = Vec::new();

        // tier 1: web-app manifest icons
        if let Some(manifest_url) = manifest {
            match self.manifest_candidates(&manifest_url, token).await {
                Ok(mut icons) => pool.append(&mut icons),
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(err) => log::debug!("manifest tier contributed nothing: {err}"),
            }
        }

        // tier 2: <link rel> icons from the raced document
        pool.extend(link_candidates);

        // tier 3: a readable-text body has no link tags; pull them from raw
        // HTML, reusing the still-running secondary attempt when possible
        if pool.is_empty() && outcome.body.kind == BodyKind::ReadableText {
            let rescanned = self
                .rescan_head(&page_url, outcome.pending_secondary, token)
                .await?;
            pool.extend(rescanned);
        }

        // tier 4: conventional filenames at the site root
        if pool.is_empty() {
            pool.extend(extract::conventional_candidates(&page_url));
        }

        let host = page_url.host_str().unwrap_or_default();
        let icon = extract::select_best(pool)
            .unwrap_or_else(|| extract::favicon_service_url(host, extract::FAVICON_SERVICE_SIZE));

        Ok(ResolutionResult { title, icon })
    }

    async fn manifest_candidates(
        &self,
        manifest_url: &Url,
        token: &CancellationToken,
    ) -> Result<Vec<IconCandidate>, FetchError> {
        let outcome = self.race.race_any(manifest_url, token).await?;
        // no later stage wants a second copy of the manifest
        if let Some(handle) = outcome.pending_secondary {
            handle.abort();
        }
        extract::manifest_icon_candidates(&outcome.body.text, manifest_url)
    }

    /// Link-tag extraction against raw HTML for pages fetched as readable
    /// text. Prefers the raw-HTML attempt the race left running; falls back
    /// to a head-only streaming scan. Failures here (other than
    /// cancellation) just mean zero candidates.
    async fn rescan_head(
        &self,
        page_url: &Url,
        pending_secondary: Option<JoinHandle<Result<String, FetchError>>>,
        token: &CancellationToken,
    ) -> Result<Vec<IconCandidate>, FetchError> {
        if let Some(handle) = pending_secondary {
            match handle.await {
                Ok(Ok(html)) => {
                    let candidates = {
                        let doc = Html::parse_document(&html);
                        extract::link_icon_candidates(&doc, page_url)
                    };
                    if !candidates.is_empty() {
                        log::debug!("reused pending raw-html body for {page_url} icons");
                        return Ok(candidates);
                    }
                }
                Ok(Err(err)) => log::debug!("pending raw-html attempt failed: {err}"),
                Err(join_err) => log::warn!("pending raw-html task failed: {join_err}"),
            }
        }

        if token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let Some(endpoint) = self.race.html_endpoint() else {
            return Ok(Vec::new());
        };
        match endpoint.scan_head(page_url, token).await {
            Ok(head_html) => {
                let doc = Html::parse_document(&head_html);
                Ok(extract::link_icon_candidates(&doc, page_url))
            }
            Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
            Err(err) => {
                log::debug!("head-only scan failed for {page_url}: {err}");
                Ok(Vec::new())
            }
        }
    }
}

/// Hostname-derived title and favicon-service icon; if even URL parsing
/// fails, echo the raw input with an empty icon. Never panics, never errs.
fn fallback_result(raw_url: &str) -> ResolutionResult {
    match normalize_input_url(raw_url) {
        Ok(url) => {
            let host = url.host_str().unwrap_or_default();
            ResolutionResult {
                title: extract::pretty_title_from_hostname(host),
                icon: extract::favicon_service_url(host, extract::FAVICON_SERVICE_SIZE),
            }
        }
        Err(_) => ResolutionResult {
            title: raw_url.to_string(),
            icon: String::new(),
        },
    }
}
