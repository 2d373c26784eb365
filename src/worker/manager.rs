//! The offline cache manager: install, activate and fetch hooks.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{
  live_response, CacheLayer, CacheResult, CacheStorage, CachedResponse, StorePolicy,
};
use crate::event::{Event, EventOutcome};
use crate::http::{Network, Request, Response};

use super::classify::RequestClass;
use super::lifecycle::{Lifecycle, WorkerState};
use super::policy::CachePolicy;

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub namespace: String,
  /// Number of manifest entries cached
  pub entries: usize,
  /// Stale namespaces removed before populating
  pub purged: Vec<String>,
}

/// Outcome of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
  pub purged: Vec<String>,
  pub clients_claimed: bool,
}

/// Intercepts requests from controlled pages and serves them from a
/// versioned cache namespace or the network.
///
/// Install is all-or-nothing: every manifest entry is fetched before any is
/// written, and the whole manifest is written in one storage transaction. A
/// single failed entry fails the install and leaves the worker redundant.
pub struct OfflineCacheManager<S: CacheStorage, N: Network> {
  policy: CachePolicy,
  cache: CacheLayer<S>,
  network: N,
  lifecycle: Lifecycle,
}

impl<S: CacheStorage, N: Network> OfflineCacheManager<S, N> {
  pub fn new(policy: CachePolicy, storage: S, network: N) -> Self {
    Self {
      policy,
      cache: CacheLayer::new(storage),
      network,
      lifecycle: Lifecycle::new(),
    }
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  pub fn storage(&self) -> &S {
    self.cache.storage()
  }

  pub fn lifecycle(&self) -> &Lifecycle {
    &self.lifecycle
  }

  pub fn state(&self) -> WorkerState {
    self.lifecycle.state()
  }

  /// Route a runtime event to its hook.
  pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
    match event {
      Event::Install => self.install().await.map(EventOutcome::Installed),
      Event::Activate => self.activate().await.map(EventOutcome::Activated),
      Event::Fetch(request) => Ok(EventOutcome::Responded(
        self.handle_fetch(&request).await,
      )),
    }
  }

  /// Install hook: take over eagerly, clear stale namespaces, precache the manifest.
  pub async fn install(&self) -> Result<InstallReport> {
    self.lifecycle.begin_install()?;
    self.lifecycle.skip_waiting();
    info!(namespace = %self.policy.namespace, "installing");

    let result = self.try_install().await;
    match &result {
      Ok(report) => {
        self.lifecycle.finish_install(true)?;
        info!(
          namespace = %report.namespace,
          entries = report.entries,
          purged = report.purged.len(),
          "install complete"
        );
      }
      Err(e) => {
        self.lifecycle.finish_install(false)?;
        error!(namespace = %self.policy.namespace, error = %e, "install failed");
      }
    }
    result
  }

  async fn try_install(&self) -> Result<InstallReport> {
    let purged = self.purge_stale()?;
    let entries = self.precache().await?;

    Ok(InstallReport {
      namespace: self.policy.namespace.clone(),
      entries,
      purged,
    })
  }

  /// Fetch every manifest entry, then write them all at once.
  async fn precache(&self) -> Result<usize> {
    let entries = try_join_all(
      self
        .policy
        .manifest
        .iter()
        .map(|url| self.fetch_manifest_entry(url)),
    )
    .await?;

    self
      .storage()
      .put_all(&self.policy.namespace, &entries)
      .map_err(|e| eyre!("Failed to populate {}: {}", self.policy.namespace, e))?;

    Ok(entries.len())
  }

  async fn fetch_manifest_entry(&self, url: &Url) -> Result<(Request, Response)> {
    let request = Request::get(url.clone());
    let response = self
      .network
      .fetch(&request)
      .await
      .map_err(|e| eyre!("Failed to fetch manifest entry {}: {}", url, e))?;

    if !response.ok() {
      return Err(eyre!(
        "Manifest entry {} returned {} {}",
        url,
        response.status,
        response.status_text
      ));
    }
    Ok((request, response))
  }

  /// Adopt an installation completed by an earlier process, if the current
  /// namespace holds the whole manifest.
  pub fn resume(&self) -> Result<bool> {
    let namespace = &self.policy.namespace;
    if !self.storage().has(namespace)? {
      return Ok(false);
    }

    for url in &self.policy.manifest {
      if self
        .storage()
        .match_request(namespace, &Request::get(url.clone()))?
        .is_none()
      {
        debug!(namespace = %namespace, missing = %url, "namespace incomplete");
        return Ok(false);
      }
    }

    self.lifecycle.adopt_install()?;
    Ok(true)
  }

  /// Activate hook: drop every namespace outside the whitelist, then claim clients.
  pub async fn activate(&self) -> Result<ActivateReport> {
    self.lifecycle.begin_activate()?;

    let purged = match self.purge_stale() {
      Ok(purged) => purged,
      Err(e) => {
        self.lifecycle.finish_activate(false)?;
        error!(error = %e, "activation failed");
        return Err(e);
      }
    };

    self.lifecycle.claim_clients();
    self.lifecycle.finish_activate(true)?;
    info!(
      namespace = %self.policy.namespace,
      purged = purged.len(),
      "activated"
    );

    Ok(ActivateReport {
      purged,
      clients_claimed: self.lifecycle.controls_clients(),
    })
  }

  fn purge_stale(&self) -> Result<Vec<String>> {
    let mut purged = Vec::new();
    for name in self.storage().keys()? {
      if self.policy.is_whitelisted(&name) {
        continue;
      }
      self.storage().delete(&name)?;
      info!(namespace = %name, "deleted stale cache namespace");
      purged.push(name);
    }
    Ok(purged)
  }

  /// Fetch hook. Always produces a response.
  pub async fn handle_fetch(&self, request: &Request) -> CacheResult<Response> {
    let class = RequestClass::of(&self.policy, request);
    debug!(url = %request.url, class = %class, "intercepted fetch");

    match self.route(class, request).await {
      Ok(result) => {
        debug!(
          url = %request.url,
          source = %result.source,
          status = result.data.status,
          "served"
        );
        result
      }
      Err(e) => {
        warn!(
          url = %request.url,
          class = %class,
          error = %e,
          "network and cache both unavailable"
        );
        self.error_fallback(class, request)
      }
    }
  }

  async fn route(&self, class: RequestClass, request: &Request) -> Result<CacheResult<Response>> {
    let fetch = || self.network.fetch(request);
    let namespace = self.policy.namespace.as_str();

    match class {
      RequestClass::Navigation => self.navigate(request).await,
      RequestClass::ApiCall => {
        let target = self.policy.api_cache();
        self
          .cache
          .network_first(target.namespace, request, target.store, target.max_age, fetch)
          .await
      }
      RequestClass::VersionedResource => {
        self
          .cache
          .network_first(namespace, request, StorePolicy::Ok200, None, fetch)
          .await
      }
      RequestClass::StaticAsset => {
        self
          .cache
          .cache_first(namespace, request, StorePolicy::SameOrigin200, fetch)
          .await
      }
    }
  }

  /// Live HTML whenever the network answers with a success status; otherwise
  /// the shell, then the offline page.
  async fn navigate(&self, request: &Request) -> Result<CacheResult<Response>> {
    let err = match live_response(self.network.fetch(request).await) {
      Ok(response) => return Ok(CacheResult::from_network(response)),
      Err(e) => e,
    };

    debug!(url = %request.url, error = %err, "navigation failed, serving cached shell");
    for page in [&self.policy.shell_page, &self.policy.offline_page] {
      if let Some(cached) = self.cached_page(page) {
        return Ok(CacheResult::fallback(cached.response, cached.cached_at));
      }
    }

    Err(err)
  }

  fn cached_page(&self, page: &Url) -> Option<CachedResponse> {
    self
      .cache
      .lookup(&self.policy.namespace, &Request::get(page.clone()), None)
  }

  fn error_fallback(&self, class: RequestClass, request: &Request) -> CacheResult<Response> {
    if class == RequestClass::ApiCall {
      return CacheResult::synthesized(Response::text(
        408,
        "Network error: the metadata API is unreachable and no cached response exists",
      ));
    }

    if request.is_navigation() {
      if let Some(cached) = self.cached_page(&self.policy.offline_page) {
        return CacheResult::fallback(cached.response, cached.cached_at);
      }
    }

    CacheResult::synthesized(Response::text(
      503,
      "Offline: this resource is not available without a network connection",
    ))
  }
}
