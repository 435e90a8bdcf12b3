use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "ozon-ads-rust";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Bytes,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).to_string()
  }
}

pub struct OutgoingRequest<'a> {
  pub method: Method,
  pub url: &'a str,
  pub headers: Vec<(&'static str, String)>,
  pub body: Option<(String, Bytes)>,
  pub timeout: Duration,
}

impl<'a> OutgoingRequest<'a> {
  pub fn get(url: &'a str) -> Self {
    Self {
      method: Method::GET,
      url,
      headers: Vec::new(),
      body: None,
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn post(url: &'a str, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
    Self {
      method: Method::POST,
      url,
      headers: Vec::new(),
      body: Some((content_type.into(), body.into())),
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn post_json(url: &'a str, body: &serde_json::Value) -> Self {
    Self::post(url, "application/json", body.to_string())
  }

  pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
    self.headers.push((name, value.into()));
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

fn transport(e: impl std::fmt::Display) -> TransportError {
  TransportError(e.to_string())
}

/// Sends one request and buffers the whole response body.
///
/// `https://` goes through rustls with native roots; plain `http://` (local mocks, proxies)
/// uses a bare connector.
pub async fn send(req: OutgoingRequest<'_>) -> Result<HttpResponse, TransportError> {
  let mut builder = Request::builder()
    .method(req.method)
    .uri(req.url)
    .header("user-agent", USER_AGENT)
    .header("accept", "application/json");
  for (name, value) in &req.headers {
    builder = builder.header(*name, value.as_str());
  }

  let body = match req.body {
    Some((content_type, bytes)) => {
      builder = builder.header("content-type", content_type);
      Full::new(bytes)
    }
    None => Full::new(Bytes::new()),
  };
  let request = builder.body(body).map_err(transport)?;

  let call = async {
    let resp = if req.url.starts_with("https://") {
      let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(transport)?
        .https_or_http()
        .enable_http1()
        .build();
      Client::builder(TokioExecutor::new())
        .build(connector)
        .request(request)
        .await
    } else {
      Client::builder(TokioExecutor::new())
        .build_http()
        .request(request)
        .await
    }
    .map_err(transport)?;

    let status = resp.status().as_u16();
    let body = resp.into_body().collect().await.map_err(transport)?.to_bytes();
    Ok::<_, TransportError>(HttpResponse { status, body })
  };

  tokio::time::timeout(req.timeout, call)
    .await
    .map_err(|_| TransportError(format!("request timed out after {}s", req.timeout.as_secs())))?
}
