//! Scripted network for exercising fetch strategies without sockets.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::client::Network;
use super::types::{Request, Response};

#[derive(Default)]
pub struct MockNetwork {
  routes: Mutex<HashMap<String, Response>>,
  failing: Mutex<Vec<String>>,
  offline: AtomicBool,
  calls: AtomicUsize,
}

impl MockNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  /// Serve `response` for `url`. Unrouted URLs answer 404.
  pub fn route(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  /// Make requests to `url` fail at the network layer.
  pub fn fail(&self, url: &str) {
    self.failing.lock().unwrap().push(url.to_string());
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Network for MockNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let url = request.url.as_str();

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable: {}", url));
    }
    if self.failing.lock().unwrap().iter().any(|u| u == url) {
      return Err(eyre!("connection reset: {}", url));
    }

    let routed = self.routes.lock().unwrap().get(url).cloned();
    Ok(routed.unwrap_or_else(|| Response::text(404, "Not Found")))
  }
}
