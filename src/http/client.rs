use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;

use super::types::{Request, RequestMode, Response, ResponseType};

/// The network primitive the cache manager fetches through.
///
/// An `Err` means the request never produced a response (DNS, refused
/// connection, timeout). HTTP error statuses are `Ok` responses.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

impl<N: Network> Network for Arc<N> {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    (**self).fetch(request)
  }
}

/// HTTP client with browser-like response typing
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
  origin: Url,
  external_timeout: Duration,
}

impl HttpClient {
  pub fn new(config: &Config) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("swcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin: config.origin.clone(),
      external_timeout: config.external_timeout(),
    })
  }

  fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }
}

impl Network for HttpClient {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let same_origin = self.is_same_origin(&request.url);

    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method '{}': {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    if !same_origin {
      builder = builder.timeout(self.external_timeout);
    }

    let resp = builder
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

    if !same_origin && request.mode == RequestMode::NoCors {
      debug!(url = %request.url, "cross-origin no-cors fetch, returning opaque response");
      return Ok(Response::opaque());
    }

    let status = resp.status();
    let final_url = resp.url().clone();
    let mut requested = request.url.clone();
    requested.set_fragment(None);
    let redirected = final_url != requested;

    let headers = resp
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|v| (k.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = resp
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", request.url, e))?
      .to_vec();

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body,
      response_type: if same_origin {
        ResponseType::Basic
      } else {
        ResponseType::Cors
      },
      redirected,
      url: Some(final_url),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn config_for(origin: &str) -> Config {
    Config::from_yaml(&format!(
      "app: t\nversion: '1'\norigin: {}\nmanifest: [/index.html, /offline.html]\nexternal_timeout_secs: 1\n",
      origin
    ))
    .unwrap()
  }

  #[tokio::test]
  async fn test_same_origin_response_is_basic() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/app.js"))
      .respond_with(
        ResponseTemplate::new(200).set_body_raw("console.log(1)", "application/javascript"),
      )
      .mount(&server)
      .await;

    let client = HttpClient::new(&config_for(&server.uri())).unwrap();
    let url = Url::parse(&format!("{}/app.js", server.uri())).unwrap();
    let response = client.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.response_type, ResponseType::Basic);
    assert!(!response.redirected);
    assert_eq!(response.body, b"console.log(1)");
    assert_eq!(
      response.header("Content-Type"),
      Some("application/javascript")
    );
  }

  #[tokio::test]
  async fn test_cross_origin_types() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/poster.jpg"))
      .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
      .mount(&server)
      .await;

    let client = HttpClient::new(&config_for("https://site.invalid")).unwrap();
    let url = Url::parse(&format!("{}/poster.jpg", server.uri())).unwrap();

    let cors = client.fetch(&Request::get(url.clone())).await.unwrap();
    assert_eq!(cors.response_type, ResponseType::Cors);
    assert_eq!(cors.body, vec![1, 2, 3]);

    let opaque = client
      .fetch(&Request::get(url).with_mode(RequestMode::NoCors))
      .await
      .unwrap();
    assert_eq!(opaque.response_type, ResponseType::Opaque);
    assert_eq!(opaque.status, 0);
    assert!(opaque.body.is_empty());
  }

  #[tokio::test]
  async fn test_redirect_is_flagged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/old"))
      .respond_with(
        ResponseTemplate::new(302).insert_header("location", format!("{}/new", server.uri())),
      )
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/new"))
      .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
      .mount(&server)
      .await;

    let client = HttpClient::new(&config_for(&server.uri())).unwrap();
    let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
    let response = client.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.status, 200);
    assert!(response.redirected);
    assert!(!response.is_same_origin_ok());
  }

  #[tokio::test]
  async fn test_http_error_status_is_not_a_network_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let client = HttpClient::new(&config_for(&server.uri())).unwrap();
    let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
    let response = client.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.status, 404);
    assert_eq!(response.status_text, "Not Found");
  }

  #[tokio::test]
  async fn test_cross_origin_timeout_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
      .mount(&server)
      .await;

    let client = HttpClient::new(&config_for("https://site.invalid")).unwrap();
    let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();

    assert!(client.fetch(&Request::get(url)).await.is_err());
  }

  #[tokio::test]
  async fn test_connection_refused_is_error() {
    let client = HttpClient::new(&config_for("http://127.0.0.1:9")).unwrap();
    let url = Url::parse("http://127.0.0.1:9/index.html").unwrap();

    assert!(client.fetch(&Request::get(url)).await.is_err());
  }
}
