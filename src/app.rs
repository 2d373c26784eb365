use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use tracing::info;

use crate::cache::CacheStorage;
use crate::commands::{self, Command};
use crate::config::Config;
use crate::event::{Event, EventOutcome};
use crate::http::HttpClient;
use crate::worker::{CachePolicy, OfflineCacheManager, RequestClass};

/// Acts as the hosting runtime: turns commands into lifecycle and fetch events.
pub struct App<S: CacheStorage> {
  config: Config,
  manager: OfflineCacheManager<S, HttpClient>,
}

impl<S: CacheStorage> App<S> {
  pub fn new(config: Config, storage: S) -> Result<Self> {
    let policy = CachePolicy::from_config(&config)?;
    let network = HttpClient::new(&config)?;
    let manager = OfflineCacheManager::new(policy, storage, network);

    Ok(Self { config, manager })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Install => self.install().await,
      Command::Activate => self.activate().await,
      Command::Fetch {
        targets,
        navigate,
        no_cors,
        method,
        headers,
        output,
      } => {
        self
          .fetch(&targets, navigate, no_cors, &method, headers, output)
          .await
      }
      Command::Classify { targets } => self.classify(&targets),
      Command::Namespaces => self.namespaces(),
      Command::Entries { namespace } => self.entries(namespace.as_deref()),
    }
  }

  async fn install(&self) -> Result<()> {
    let EventOutcome::Installed(report) = self.manager.dispatch(Event::Install).await? else {
      return Err(eyre!("Install produced no report"));
    };
    println!(
      "installed {} ({} entries)",
      report.namespace, report.entries
    );
    for name in &report.purged {
      println!("  purged {}", name);
    }

    self.activate_installed().await
  }

  async fn activate(&self) -> Result<()> {
    if !self.manager.resume()? {
      return Err(eyre!(
        "{} is not installed. Run `swcache install` first.",
        self.manager.policy().namespace
      ));
    }
    self.activate_installed().await
  }

  async fn activate_installed(&self) -> Result<()> {
    let EventOutcome::Activated(report) = self.manager.dispatch(Event::Activate).await? else {
      return Err(eyre!("Activate produced no report"));
    };
    info!(state = %self.manager.state(), "worker ready");
    println!("activated {}", self.manager.policy().namespace);
    for name in &report.purged {
      println!("  purged {}", name);
    }
    Ok(())
  }

  async fn fetch(
    &self,
    targets: &[String],
    navigate: bool,
    no_cors: bool,
    method: &str,
    show_headers: bool,
    output: Option<std::path::PathBuf>,
  ) -> Result<()> {
    if output.is_some() && targets.len() != 1 {
      return Err(eyre!("--output needs exactly one target"));
    }

    if self.manager.resume()? {
      info!(namespace = %self.manager.policy().namespace, "using installed namespace");
    }

    let requests = targets
      .iter()
      .map(|t| commands::build_request(&self.config, t, navigate, no_cors, method))
      .collect::<Result<Vec<_>>>()?;

    let outcomes = join_all(
      requests
        .iter()
        .map(|r| self.manager.dispatch(Event::Fetch(r.clone()))),
    )
    .await;

    for (request, outcome) in requests.iter().zip(outcomes) {
      let Some(result) = outcome?.into_response() else {
        continue;
      };
      let response = &result.data;
      println!(
        "{} {:<22} {:<18} {:<11} {} ({} bytes)",
        response.status,
        response.status_text,
        RequestClass::of(self.manager.policy(), request),
        result.source,
        request.url,
        response.body.len()
      );
      if show_headers {
        for (name, value) in &response.headers {
          println!("    {}: {}", name, value);
        }
      }
      if let Some(path) = &output {
        std::fs::write(path, &response.body)
          .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
      }
    }

    Ok(())
  }

  fn classify(&self, targets: &[String]) -> Result<()> {
    for target in targets {
      let request = commands::build_request(&self.config, target, false, false, "GET")?;
      println!(
        "{:<18} {}",
        RequestClass::of(self.manager.policy(), &request),
        request.url
      );
    }
    Ok(())
  }

  fn namespaces(&self) -> Result<()> {
    let policy = self.manager.policy();
    for name in self.manager.storage().keys()? {
      let marker = if policy.is_whitelisted(&name) { "*" } else { " " };
      let count = self.manager.storage().entries(&name)?.len();
      println!("{} {} ({} entries)", marker, name, count);
    }
    Ok(())
  }

  fn entries(&self, namespace: Option<&str>) -> Result<()> {
    let namespace = namespace.unwrap_or(&self.manager.policy().namespace);
    if !self.manager.storage().has(namespace)? {
      return Err(eyre!("No such namespace: {}", namespace));
    }
    for key in self.manager.storage().entries(namespace)? {
      println!("{}", key);
    }
    Ok(())
  }
}
