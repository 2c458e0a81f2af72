use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;

use crate::error::TransportError;

/// One outbound request. The credential travels in `query`, never in `url`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: String,
  pub query: Vec<(String, String)>,
  pub headers: Vec<(String, String)>,
  pub body: serde_json::Value,
}

impl HttpRequest {
  pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
    Self {
      method: Method::POST,
      url: url.into(),
      query: Vec::new(),
      headers: vec![(CONTENT_TYPE.as_str().to_string(), "application/json".to_string())],
      body,
    }
  }

  pub fn with_query(mut self, key: &str, value: &str) -> Self {
    self.query.push((key.to_string(), value.to_string()));
    self
  }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
    }
  }
}

impl Default for ReqwestTransport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| TransportError::Network(err.to_string()))?;
      let value =
        HeaderValue::from_str(value).map_err(|err| TransportError::Network(err.to_string()))?;
      headers.insert(name, value);
    }

    let resp = self
      .client
      .request(request.method.clone(), &request.url)
      .query(&request.query)
      .headers(headers)
      .json(&request.body)
      .send()
      .await?;

    let status = resp.status().as_u16();
    let body = resp.bytes().await?.to_vec();
    Ok(HttpResponse { status, body })
  }
}
