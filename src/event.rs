use crate::cache::CacheResult;
use crate::http::{Request, Response};
use crate::worker::{ActivateReport, InstallReport};

/// Events the hosting runtime dispatches to the cache manager
#[derive(Debug, Clone)]
pub enum Event {
  /// A new version is being registered
  Install,
  /// The installed version is taking control
  Activate,
  /// A controlled page issued a request
  Fetch(Request),
}

/// What handling an event produced
#[derive(Debug, Clone)]
pub enum EventOutcome {
  Installed(InstallReport),
  Activated(ActivateReport),
  Responded(CacheResult<Response>),
}

impl EventOutcome {
  /// The response, for fetch events.
  pub fn into_response(self) -> Option<CacheResult<Response>> {
    match self {
      EventOutcome::Responded(result) => Some(result),
      _ => None,
    }
  }
}
