use std::fmt;

use crate::http::Request;

use super::policy::CachePolicy;

/// Routing category of an intercepted request. Recomputed per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  Navigation,
  ApiCall,
  VersionedResource,
  StaticAsset,
}

impl RequestClass {
  /// Classify in priority order: navigation, API host, versioned query, static.
  pub fn of(policy: &CachePolicy, request: &Request) -> Self {
    if request.is_navigation() {
      return RequestClass::Navigation;
    }

    if is_api_host(policy, request) {
      return RequestClass::ApiCall;
    }

    if request
      .url
      .query_pairs()
      .any(|(key, _)| key == policy.version_param.as_str())
    {
      return RequestClass::VersionedResource;
    }

    RequestClass::StaticAsset
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      RequestClass::Navigation => "navigation",
      RequestClass::ApiCall => "api-call",
      RequestClass::VersionedResource => "versioned-resource",
      RequestClass::StaticAsset => "static-asset",
    }
  }
}

impl fmt::Display for RequestClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

/// Exact host match, or a subdomain of a configured host.
fn is_api_host(policy: &CachePolicy, request: &Request) -> bool {
  let Some(host) = request.url.host_str() else {
    return false;
  };
  let host = host.to_ascii_lowercase();

  policy.api_hosts.iter().any(|api| {
    host == *api
      || host
        .strip_suffix(api.as_str())
        .is_some_and(|prefix| prefix.ends_with('.'))
  })
}
