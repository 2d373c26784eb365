//! Deployment-specific inputs of the cache manager, resolved once from config.

use chrono::Duration;
use color_eyre::Result;
use url::Url;

use crate::cache::StorePolicy;
use crate::config::Config;

/// Everything that varies between deployments: names, manifest, hosts.
#[derive(Debug, Clone)]
pub struct CachePolicy {
  /// Current namespace, `{app}-cache-v{version}`
  pub namespace: String,
  /// Auxiliary namespace for API responses, when API caching is enabled
  pub api_namespace: Option<String>,
  pub api_max_age: Option<Duration>,
  pub manifest: Vec<Url>,
  pub shell_page: Url,
  pub offline_page: Url,
  pub api_hosts: Vec<String>,
  pub version_param: String,
}

/// Where API responses are read from and written to.
#[derive(Debug, Clone, Copy)]
pub struct ApiCacheTarget<'a> {
  pub namespace: &'a str,
  pub store: StorePolicy,
  pub max_age: Option<Duration>,
}

impl CachePolicy {
  pub fn from_config(config: &Config) -> Result<Self> {
    let manifest = config
      .manifest
      .iter()
      .map(|path| config.resolve(path))
      .collect::<Result<Vec<_>>>()?;

    let api_max_age = config.api_cache.map(|c| {
      Duration::try_seconds(i64::try_from(c.max_age_secs).unwrap_or(i64::MAX))
        .unwrap_or(Duration::MAX)
    });

    Ok(Self {
      namespace: namespace_name(&config.app, &config.version),
      api_namespace: config
        .api_cache
        .map(|_| api_namespace_name(&config.app, &config.version)),
      api_max_age,
      manifest,
      shell_page: config.resolve(&config.shell_page)?,
      offline_page: config.resolve(&config.offline_page)?,
      api_hosts: config
        .api_hosts
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect(),
      version_param: config.version_param.clone(),
    })
  }

  /// Namespaces that survive install and activation.
  pub fn whitelist(&self) -> Vec<&str> {
    let mut names = vec![self.namespace.as_str()];
    if let Some(api) = &self.api_namespace {
      names.push(api.as_str());
    }
    names
  }

  pub fn is_whitelisted(&self, namespace: &str) -> bool {
    self.whitelist().contains(&namespace)
  }

  /// API responses go to the API namespace when one is configured. Otherwise
  /// they are never written and fallback reads use the general namespace.
  pub fn api_cache(&self) -> ApiCacheTarget<'_> {
    match &self.api_namespace {
      Some(namespace) => ApiCacheTarget {
        namespace,
        store: StorePolicy::Ok200,
        max_age: self.api_max_age,
      },
      None => ApiCacheTarget {
        namespace: &self.namespace,
        store: StorePolicy::Never,
        max_age: None,
      },
    }
  }
}

pub fn namespace_name(app: &str, version: &str) -> String {
  format!("{}-cache-v{}", app, version)
}

pub fn api_namespace_name(app: &str, version: &str) -> String {
  format!("{}-api-cache-v{}", app, version)
}

#[cfg(test)]
pub(crate) fn test_policy(version: &str, api_max_age_secs: Option<u64>) -> CachePolicy {
  let mut yaml = format!(
    r#"
app: freeflix
version: "{}"
origin: https://freeflix.test/
manifest:
  - /
  - /index.html
  - /offline.html
  - /css/style.css
  - /js/main.js
api_hosts:
  - api.themoviedb.org
"#,
    version
  );
  if let Some(secs) = api_max_age_secs {
    yaml.push_str(&format!("api_cache:\n  max_age_secs: {}\n", secs));
  }
  CachePolicy::from_config(&Config::from_yaml(&yaml).unwrap()).unwrap()
}
