use std::sync::Arc;

use futures::future::select_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::metadata::proxy::ProxyEndpoint;
use crate::metadata::types::{BodyKind, FetchError, PageBody, ProxyPrefs};

/// Outcome of a first-success race. When the text-extraction proxy wins,
/// the raw-HTML attempt is left running and handed back: later stages may
/// need the link tags the text proxy discards.
pub struct RaceOutcome {
    pub body: PageBody,
    pub winner: &'static str,
    pub pending_secondary: Option<JoinHandle<Result<String, FetchError>>>,
}

struct Attempt {
    key: &'static str,
    kind: BodyKind,
    cancel: CancellationToken,
}

/// Runs every configured proxy concurrently for one logical resource and
/// resolves with the first success. Proxies are third-party and individually
/// unreliable; racing bounds worst-case latency to the fastest responder.
pub struct ProxyRace {
    endpoints: Vec<Arc<dyn ProxyEndpoint>>,
    prefs: ProxyPrefs,
}

impl ProxyRace {
    pub fn new(endpoints: Vec<Arc<dyn ProxyEndpoint>>, prefs: ProxyPrefs) -> Self {
        Self { endpoints, prefs }
    }

    pub fn prefs(&self) -> &ProxyPrefs {
        &self.prefs
    }

    /// The raw-HTML endpoint, used by the head-only rescan.
    pub fn html_endpoint(&self) -> Option<Arc<dyn ProxyEndpoint>> {
        self.endpoints
            .iter()
            .find(|e| e.kind() == BodyKind::Html)
            .cloned()
    }

    /// Endpoints in attempt order: the last winner for this host first.
    fn ordered_for(&self, host: &str) -> Vec<Arc<dyn ProxyEndpoint>> {
        let mut ordered = self.endpoints.clone();
        if let Some(preferred) = self.prefs.fastest_for(host) {
            // stable: relative order of the rest is preserved
            ordered.sort_by_key(|e| if e.key() == preferred { 0 } else { 1 });
        }
        ordered
    }

    pub async fn race_any(
        &self,
        target: &Url,
        token: &CancellationToken,
    ) -> Result<RaceOutcome, FetchError> {
        if token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let host = target.host_str().unwrap_or_default().to_string();
        let ordered = self.ordered_for(&host);
        if ordered.is_empty() {
            return Err(FetchError::AllProxiesFailed);
        }

        let mut attempts: Vec<Attempt> = Vec::with_capacity(ordered.len());
        let mut handles: Vec<JoinHandle<Result<String, FetchError>>> =
            Vec::with_capacity(ordered.len());
        for endpoint in &ordered {
            let cancel = token.child_token();
            attempts.push(Attempt {
                key: endpoint.key(),
                kind: endpoint.kind(),
                cancel: cancel.clone(),
            });
            let endpoint = endpoint.clone();
            let target = target.clone();
            handles.push(tokio::spawn(async move {
                log::debug!("trying proxy {} for {target}", endpoint.key());
                endpoint.fetch_text(&target, &cancel).await
            }));
        }

        while !handles.is_empty() {
            let (joined, idx, rest) = select_all(handles).await;
            handles = rest;
            let finished = attempts.remove(idx);

            match joined {
                Ok(Ok(text)) => {
                    log::debug!(
                        "proxy {} won for {host} ({} bytes)",
                        finished.key,
                        text.len()
                    );
                    return Ok(self.settle(finished, text, &host, attempts, handles));
                }
                Ok(Err(err)) => {
                    log::debug!("proxy {} failed for {host}: {err}", finished.key);
                }
                Err(join_err) => {
                    log::warn!("proxy {} task failed for {host}: {join_err}", finished.key);
                }
            }
        }

        if token.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Err(FetchError::AllProxiesFailed)
        }
    }

    /// Cancels the losers, keeps the raw-HTML attempt alive when a non-HTML
    /// body won, and records the winner for this host.
    fn settle(
        &self,
        winner: Attempt,
        text: String,
        host: &str,
        losers: Vec<Attempt>,
        loser_handles: Vec<JoinHandle<Result<String, FetchError>>>,
    ) -> RaceOutcome {
        let mut pending_secondary = None;
        for (attempt, handle) in losers.into_iter().zip(loser_handles) {
            let keep_running =
                winner.kind == BodyKind::ReadableText && attempt.kind == BodyKind::Html;
            if keep_running && pending_secondary.is_none() {
                pending_secondary = Some(handle);
            } else {
                attempt.cancel.cancel();
            }
        }

        self.prefs.record_win(host, winner.key);

        RaceOutcome {
            body: PageBody {
                kind: winner.kind,
                text,
            },
            winner: winner.key,
            pending_secondary,
        }
    }
}
