use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::error::ProviderError;
use crate::metrics::{CampaignDailyStat, DateRange, KeywordStatRecord};
use crate::providers::{AdsProvider, Campaign, ProductInfo};

pub struct MockRequest {
  pub path: String,
  pub query: String,
  pub headers: HeaderMap,
  pub body: Bytes,
}

impl MockRequest {
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(name).and_then(|v| v.to_str().ok())
  }

  pub fn json(&self) -> Value {
    serde_json::from_slice(&self.body).unwrap_or(Value::Null)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).to_string()
  }
}

pub type Responder = Arc<dyn Fn(&MockRequest) -> (u16, String) + Send + Sync>;

/// Serves `max_connections` connections one after another, answering every request with `responder`.
pub async fn serve(listener: TcpListener, max_connections: usize, responder: Responder) {
  for _ in 0..max_connections {
    let (stream, _) = listener.accept().await.unwrap();
    let responder = responder.clone();
    http1::Builder::new()
      .serve_connection(
        TokioIo::new(stream),
        service_fn(move |req: Request<Incoming>| {
          let responder = responder.clone();
          async move {
            let path = req.uri().path().to_string();
            let query = req.uri().query().unwrap_or("").to_string();
            let headers = req.headers().clone();
            let body = req.into_body().collect().await?.to_bytes();
            let (status, text) = responder(&MockRequest {
              path,
              query,
              headers,
              body,
            });
            Ok::<_, hyper::Error>(
              Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Full::new(Bytes::from(text)))
                .unwrap(),
            )
          }
        }),
      )
      .await
      .unwrap();
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
  Bid { campaign_id: String, keyword: String, bid: f64 },
  Pause { campaign_id: String, keywords: Vec<String> },
  Negatives { campaign_id: String, keywords: Vec<String> },
}

/// In-memory account used by applier and agent tests.
#[derive(Default)]
pub struct FakeProvider {
  pub campaigns: Vec<Campaign>,
  pub daily: HashMap<String, Vec<CampaignDailyStat>>,
  pub keywords: HashMap<String, Vec<KeywordStatRecord>>,
  pub bids: HashMap<String, HashMap<String, f64>>,
  pub products: HashMap<String, ProductInfo>,
  /// Keywords whose bid updates fail.
  pub failing_bids: Vec<String>,
  pub fail_pause: bool,
  pub writes: Mutex<Vec<Write>>,
}

impl FakeProvider {
  pub fn writes(&self) -> Vec<Write> {
    self.writes.lock().unwrap().clone()
  }

  fn record(&self, w: Write) {
    self.writes.lock().unwrap().push(w);
  }
}

impl AdsProvider for FakeProvider {
  async fn list_campaigns(&self) -> Result<Vec<Campaign>, ProviderError> {
    Ok(self.campaigns.clone())
  }

  async fn campaign_daily_stats(&self, campaign_id: &str, _range: DateRange) -> Result<Vec<CampaignDailyStat>, ProviderError> {
    Ok(self.daily.get(campaign_id).cloned().unwrap_or_default())
  }

  async fn keyword_stats(&self, campaign_id: &str, _range: DateRange) -> Result<Vec<KeywordStatRecord>, ProviderError> {
    Ok(self.keywords.get(campaign_id).cloned().unwrap_or_default())
  }

  async fn keyword_bids(&self, campaign_id: &str) -> Result<HashMap<String, f64>, ProviderError> {
    Ok(self.bids.get(campaign_id).cloned().unwrap_or_default())
  }

  async fn product_info(&self, product_id: &str) -> Result<ProductInfo, ProviderError> {
    self
      .products
      .get(product_id)
      .cloned()
      .ok_or_else(|| ProviderError::http(404, format!("product {product_id} not found")))
  }

  async fn set_keyword_bid(&self, campaign_id: &str, keyword: &str, bid: f64) -> Result<(), ProviderError> {
    if self.failing_bids.iter().any(|k| k == keyword) {
      return Err(ProviderError::http(500, format!("bid update failed for {keyword}")));
    }
    self.record(Write::Bid {
      campaign_id: campaign_id.to_string(),
      keyword: keyword.to_string(),
      bid,
    });
    Ok(())
  }

  async fn pause_keywords(&self, campaign_id: &str, keywords: &[String]) -> Result<(), ProviderError> {
    if self.fail_pause {
      return Err(ProviderError::transport("connection reset"));
    }
    self.record(Write::Pause {
      campaign_id: campaign_id.to_string(),
      keywords: keywords.to_vec(),
    });
    Ok(())
  }

  async fn add_negative_keywords(&self, campaign_id: &str, keywords: &[String]) -> Result<(), ProviderError> {
    self.record(Write::Negatives {
      campaign_id: campaign_id.to_string(),
      keywords: keywords.to_vec(),
    });
    Ok(())
  }
}
