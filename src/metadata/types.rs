use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Error taxonomy for one resolution pass. Everything here is recoverable
/// somewhere: a single proxy failure by the race, a race failure by the
/// orchestrator's fallback tiers, and the whole pass by the last-resort
/// result in [`crate::metadata::Resolver::resolve`].
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("proxy returned http status {status}")]
    ProxyHttp { status: u16 },

    #[error("all proxy attempts failed")]
    AllProxiesFailed,

    #[error("manifest fetch or parse failed: {0}")]
    ManifestParse(String),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::ProxyHttp {
                status: status.as_u16(),
            },
            None => FetchError::Network(err.to_string()),
        }
    }
}

/// What the resolver promises to produce for every input: both fields
/// populated, worst case through the fallback tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub title: String,
    pub icon: String,
}

/// Whether a proxy hands back raw HTML or readability-extracted text.
/// Extraction dispatches on this tag, never on the endpoint URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Html,
    ReadableText,
}

#[derive(Debug, Clone)]
pub struct PageBody {
    pub kind: BodyKind,
    pub text: String,
}

/// A scored, not-yet-chosen icon URL. `url` is always absolute: relative
/// references that fail to resolve against their base are dropped before a
/// candidate is ever constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconCandidate {
    pub url: String,
    pub size: u32,
    pub rel_score: u32,
    pub file_type_score: u32,
}

impl IconCandidate {
    pub fn score(&self) -> u32 {
        self.rel_score + self.file_type_score
    }
}

/// Last-winning proxy key per hostname. Purely a latency hint: reordering
/// future races, overwritten on every win, never expired, safe to lose.
/// Injected into the race coordinator so tests get a fresh instance.
#[derive(Debug, Clone, Default)]
pub struct ProxyPrefs {
    inner: Arc<Mutex<HashMap<String, &'static str>>>,
}

impl ProxyPrefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fastest_for(&self, host: &str) -> Option<&'static str> {
        self.inner
            .lock()
            .ok()
            .and_then(|map| map.get(host).copied())
    }

    pub fn record_win(&self, host: &str, key: &'static str) {
        if host.is_empty() {
            return;
        }
        if let Ok(mut map) = self.inner.lock() {
            map.insert(host.to_string(), key);
        }
    }
}
