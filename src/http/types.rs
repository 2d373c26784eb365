//! Request and response values exchanged between pages, the cache and the network.

use color_eyre::{eyre::eyre, Result};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// How the page issued the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level document load
  Navigate,
  SameOrigin,
  #[default]
  Cors,
  /// Cross-origin fetch whose response the page may not read
  NoCors,
}

/// An outgoing request intercepted from a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub mode: RequestMode,
}

impl Request {
  /// A plain `GET` sub-resource request.
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      mode: RequestMode::default(),
    }
  }

  /// A top-level navigation request.
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_method(mut self, method: &str) -> Self {
    self.method = method.to_uppercase();
    self
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  /// Key used for cache lookups: method plus the full URL, query string included.
  ///
  /// Fragments never reach the network, so they are not part of the key.
  pub fn cache_key(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);
    format!("{} {}", self.method.to_uppercase(), url)
  }
}

/// Where a response came from, from the page's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin response
  Basic,
  /// Readable cross-origin response
  Cors,
  /// Cross-origin `no-cors` response: status 0, no headers, no body
  Opaque,
  /// Network error placeholder
  Error,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseType::Basic => "basic",
      ResponseType::Cors => "cors",
      ResponseType::Opaque => "opaque",
      ResponseType::Error => "error",
    }
  }
}

impl fmt::Display for ResponseType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ResponseType {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "basic" => Ok(ResponseType::Basic),
      "cors" => Ok(ResponseType::Cors),
      "opaque" => Ok(ResponseType::Opaque),
      "error" => Ok(ResponseType::Error),
      other => Err(eyre!("Unknown response type '{}'", other)),
    }
  }
}

/// A response served to the page, either live or from cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub response_type: ResponseType,
  pub redirected: bool,
  /// Final URL after redirects. `None` for synthesized responses.
  pub url: Option<Url>,
}

impl Response {
  /// A same-origin response with the given status and body.
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: reason_phrase(status).to_string(),
      headers: Vec::new(),
      body: body.into(),
      response_type: ResponseType::Basic,
      redirected: false,
      url: None,
    }
  }

  /// A locally generated plain-text response.
  pub fn text(status: u16, body: &str) -> Self {
    Self::new(status, body).with_header("Content-Type", "text/plain")
  }

  /// The response a `no-cors` cross-origin fetch yields.
  pub fn opaque() -> Self {
    Self {
      status: 0,
      status_text: String::new(),
      headers: Vec::new(),
      body: Vec::new(),
      response_type: ResponseType::Opaque,
      redirected: false,
      url: None,
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn with_type(mut self, response_type: ResponseType) -> Self {
    self.response_type = response_type;
    self
  }

  pub fn with_url(mut self, url: Url) -> Self {
    self.url = Some(url);
    self
  }

  pub fn redirected(mut self, redirected: bool) -> Self {
    self.redirected = redirected;
    self
  }

  /// Header lookup, case-insensitive on the name.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// 2xx status.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Upstream answered with an error status. Opaque responses hide their
  /// status and never count.
  pub fn is_upstream_error(&self) -> bool {
    self.response_type != ResponseType::Opaque && !self.ok()
  }

  /// Same-origin, non-redirected `200`.
  pub fn is_same_origin_ok(&self) -> bool {
    self.status == 200 && self.response_type == ResponseType::Basic && !self.redirected
  }
}

/// Reason phrase for the statuses this crate synthesizes or commonly sees.
pub fn reason_phrase(status: u16) -> &'static str {
  match status {
    200 => "OK",
    204 => "No Content",
    301 => "Moved Permanently",
    302 => "Found",
    304 => "Not Modified",
    400 => "Bad Request",
    403 => "Forbidden",
    404 => "Not Found",
    408 => "Request Timeout",
    500 => "Internal Server Error",
    502 => "Bad Gateway",
    503 => "Service Unavailable",
    504 => "Gateway Timeout",
    _ => "",
  }
}
