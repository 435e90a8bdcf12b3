use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::ProviderError;
use crate::http_client::{send, OutgoingRequest, DEFAULT_TIMEOUT};
use crate::metrics::{CampaignDailyStat, DateRange, KeywordStatRecord, RawMetric};
use crate::providers::{AdsProvider, Campaign, ProductInfo};

const CAMPAIGN_LIST: [&str; 4] = [
  "/v2/performance/campaign/list",
  "/v1/performance/campaign/list",
  "/v1/campaign/list",
  "/v2/campaign/list",
];
const CAMPAIGN_STATISTICS: [&str; 4] = [
  "/v2/performance/campaign/statistics",
  "/v1/performance/campaign/statistics",
  "/v1/campaign/statistics",
  "/v2/campaign/statistics",
];
const KEYWORD_LIST: [&str; 4] = [
  "/v2/performance/keyword/list",
  "/v1/performance/keyword/list",
  "/v1/keyword/list",
  "/v2/keyword/list",
];
const KEYWORD_STATISTICS: [&str; 1] = ["/v1/performance/keyword/statistics"];
const PRODUCT_INFO: [&str; 1] = ["/v2/product/info"];
const KEYWORD_BID_SET: [&str; 1] = ["/v1/performance/keyword/bid/set"];
const KEYWORD_STATUS_SET: [&str; 1] = ["/v1/performance/keyword/status/set"];
const NEGATIVE_KEYWORDS_ADD: [&str; 1] = ["/v1/performance/keyword/negative/add"];

/// Ozon Performance API client.
///
/// Each call walks its endpoint variants in order and, for each, every configured base URL
/// starting from the one that last answered.
pub struct OzonClient {
  client_id: String,
  api_key: String,
  base_urls: Vec<String>,
  preferred: AtomicUsize,
  timeout: Duration,
}

impl OzonClient {
  pub fn new(client_id: impl Into<String>, api_key: impl Into<String>, base_urls: Vec<String>) -> Self {
    Self {
      client_id: client_id.into(),
      api_key: api_key.into(),
      base_urls: base_urls
        .into_iter()
        .map(|u| u.trim_end_matches('/').to_string())
        .collect(),
      preferred: AtomicUsize::new(0),
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn from_settings(settings: &Settings) -> Self {
    Self::new(
      settings.ozon_client_id.clone(),
      settings.ozon_api_key.clone(),
      settings.ozon_base_urls.clone(),
    )
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn preferred_base_url(&self) -> Option<&str> {
    let n = self.base_urls.len();
    if n == 0 {
      return None;
    }
    self
      .base_urls
      .get(self.preferred.load(Ordering::Relaxed) % n)
      .map(String::as_str)
  }

  async fn post_any(&self, endpoints: &[&str], body: &Value) -> Result<Value, ProviderError> {
    let n = self.base_urls.len();
    if n == 0 {
      return Err(ProviderError::transport("no Ozon base URLs configured"));
    }

    let start = self.preferred.load(Ordering::Relaxed) % n;
    let mut last_err = None;

    for endpoint in endpoints {
      for offset in 0..n {
        let idx = (start + offset) % n;
        let url = format!("{}{}", self.base_urls[idx], endpoint);
        debug!(%url, "ozon request");

        let req = OutgoingRequest::post_json(&url, body)
          .header("client-id", self.client_id.clone())
          .header("api-key", self.api_key.clone())
          .timeout(self.timeout);

        match send(req).await {
          Ok(resp) if resp.is_success() => match serde_json::from_slice::<Value>(&resp.body) {
            Ok(json) => {
              if idx != start {
                info!(base_url = %self.base_urls[idx], "switching preferred Ozon base URL");
              }
              self.preferred.store(idx, Ordering::Relaxed);
              return Ok(json);
            }
            Err(e) => {
              warn!(%url, error = %e, "ozon returned invalid json");
              last_err = Some(ProviderError::http(resp.status, format!("invalid json response: {e}")));
            }
          },
          Ok(resp) => {
            warn!(%url, status = resp.status, "ozon request rejected");
            last_err = Some(ProviderError::http(resp.status, resp.text()));
          }
          Err(e) => {
            warn!(%url, error = %e, "ozon request failed");
            last_err = Some(ProviderError::transport(e.to_string()));
          }
        }
      }
    }

    Err(last_err.unwrap_or_else(|| ProviderError::transport("no endpoints to try")))
  }

  async fn post_write(&self, endpoints: &[&str], body: &Value) -> Result<(), ProviderError> {
    let json = self.post_any(endpoints, body).await?;
    match json.get("result") {
      None | Some(Value::Null) | Some(Value::Bool(false)) => Err(ProviderError::http(
        200,
        format!("write was not acknowledged: {json}"),
      )),
      Some(_) => Ok(()),
    }
  }
}

fn campaign_number(campaign_id: &str) -> Result<i64, ProviderError> {
  numeric_id("campaign", campaign_id)
}

fn numeric_id(what: &str, raw: &str) -> Result<i64, ProviderError> {
  raw
    .trim()
    .parse::<i64>()
    .map_err(|_| ProviderError::transport(format!("{what} id must be numeric, got {raw:?}")))
}

fn number(v: Option<&Value>) -> f64 {
  let n = match v {
    Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
    Some(Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().unwrap_or(0.0),
    _ => 0.0,
  };
  if n.is_finite() {
    n
  } else {
    0.0
  }
}

fn count(v: Option<&Value>) -> u64 {
  let n = number(v);
  if n.is_finite() && n > 0.0 {
    n.round() as u64
  } else {
    0
  }
}

fn id_string(v: Option<&Value>) -> Option<String> {
  match v? {
    Value::Number(n) => Some(n.to_string()),
    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
    _ => None,
  }
}

fn statistics_rows(json: &Value) -> impl Iterator<Item = &Value> {
  json
    .pointer("/result/campaigns")
    .and_then(Value::as_array)
    .into_iter()
    .flatten()
    .filter_map(|c| c.get("statistics").and_then(Value::as_array))
    .flatten()
}

pub fn parse_campaigns(json: &Value) -> Vec<Campaign> {
  json
    .pointer("/result/campaigns")
    .and_then(Value::as_array)
    .into_iter()
    .flatten()
    .filter_map(|c| {
      let id = id_string(c.get("id"))?;
      let name = c
        .get("title")
        .or_else(|| c.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
      let state = c.get("state").and_then(Value::as_str).map(|s| s.to_string());
      Some(Campaign { id, name, state })
    })
    .collect()
}

pub fn parse_daily_stats(json: &Value) -> Vec<CampaignDailyStat> {
  statistics_rows(json)
    .filter_map(|row| {
      let raw_date = row.get("date").and_then(Value::as_str)?;
      let date = match NaiveDate::parse_from_str(raw_date.get(..10).unwrap_or(raw_date), "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => {
          warn!(date = raw_date, "skipping statistics row with unparseable date");
          return None;
        }
      };
      Some(CampaignDailyStat {
        date,
        impressions: count(row.get("impressions")),
        clicks: count(row.get("clicks")),
        orders: count(row.get("orders")),
        spend: number(row.get("spend")),
        revenue: number(row.get("revenue")),
      })
    })
    .collect()
}

fn raw_metric(v: Option<&Value>) -> Option<RawMetric> {
  match v? {
    Value::Number(n) => n.as_f64().map(RawMetric::Number),
    Value::String(s) => Some(RawMetric::Text(s.clone())),
    _ => None,
  }
}

/// Keeps values as sent; validation happens in the decision engine.
pub fn parse_keyword_stats(json: &Value) -> Vec<KeywordStatRecord> {
  statistics_rows(json)
    .map(|row| KeywordStatRecord {
      keyword: row.get("keyword").and_then(Value::as_str).map(|s| s.to_string()),
      match_type: row
        .get("matchType")
        .or_else(|| row.get("match_type"))
        .and_then(Value::as_str)
        .map(|s| s.to_string()),
      impressions: raw_metric(row.get("impressions")),
      clicks: raw_metric(row.get("clicks")),
      orders: raw_metric(row.get("orders")),
      spend: raw_metric(row.get("spend")),
      revenue: raw_metric(row.get("revenue")),
    })
    .collect()
}

pub fn parse_keyword_bids(json: &Value) -> HashMap<String, f64> {
  json
    .pointer("/result/keywords")
    .and_then(Value::as_array)
    .into_iter()
    .flatten()
    .filter_map(|k| {
      let keyword = k.get("keyword").and_then(Value::as_str)?;
      let bid = k.get("bid")?;
      let bid = number(Some(bid));
      (bid > 0.0).then(|| (keyword.to_string(), bid))
    })
    .collect()
}

fn text(v: Option<&Value>) -> String {
  v.and_then(Value::as_str).map(|s| s.trim().to_string()).unwrap_or_default()
}

pub fn parse_product_info(product_id: &str, json: &Value) -> Option<ProductInfo> {
  let result = json.get("result").filter(|r| r.is_object())?;
  let name = text(result.get("name"));
  if name.is_empty() {
    return None;
  }
  Some(ProductInfo {
    id: id_string(result.get("id")).unwrap_or_else(|| product_id.to_string()),
    name,
    description: text(result.get("description")),
    category: text(result.get("category_name").or_else(|| result.get("category"))),
    brand: text(result.get("brand")),
  })
}

impl AdsProvider for OzonClient {
  async fn list_campaigns(&self) -> Result<Vec<Campaign>, ProviderError> {
    let mut last_err = None;
    let mut answered = false;
    for endpoint in CAMPAIGN_LIST {
      match self.post_any(&[endpoint], &json!({})).await {
        Ok(json) => {
          answered = true;
          let campaigns = parse_campaigns(&json);
          if !campaigns.is_empty() {
            info!(count = campaigns.len(), endpoint, "fetched campaigns");
            return Ok(campaigns);
          }
        }
        Err(e) => last_err = Some(e),
      }
    }

    match last_err {
      Some(e) if !answered => Err(e),
      _ => Ok(Vec::new()),
    }
  }

  async fn campaign_daily_stats(
    &self,
    campaign_id: &str,
    range: DateRange,
  ) -> Result<Vec<CampaignDailyStat>, ProviderError> {
    let id = campaign_number(campaign_id)?;
    let body = json!({
      "campaigns": [{"id": id}],
      "dateFrom": range.from.to_string(),
      "dateTo": range.to.to_string(),
      "groupBy": ["DATE"],
    });
    let json = self.post_any(&CAMPAIGN_STATISTICS, &body).await?;
    let rows = parse_daily_stats(&json);
    if rows.is_empty() {
      warn!(campaign_id, %range, "no campaign statistics returned");
    }
    Ok(rows)
  }

  async fn keyword_stats(&self, campaign_id: &str, range: DateRange) -> Result<Vec<KeywordStatRecord>, ProviderError> {
    let id = campaign_number(campaign_id)?;
    let body = json!({
      "campaigns": [{"id": id}],
      "dateFrom": range.from.to_string(),
      "dateTo": range.to.to_string(),
      "groupBy": ["KEYWORD"],
    });
    let json = self.post_any(&KEYWORD_STATISTICS, &body).await?;
    let records = parse_keyword_stats(&json);
    debug!(campaign_id, count = records.len(), "fetched keyword statistics");
    Ok(records)
  }

  async fn keyword_bids(&self, campaign_id: &str) -> Result<HashMap<String, f64>, ProviderError> {
    let id = campaign_number(campaign_id)?;
    let json = self.post_any(&KEYWORD_LIST, &json!({ "campaignId": id })).await?;
    Ok(parse_keyword_bids(&json))
  }

  async fn product_info(&self, product_id: &str) -> Result<ProductInfo, ProviderError> {
    let id = numeric_id("product", product_id)?;
    let json = self.post_any(&PRODUCT_INFO, &json!({ "product_id": id })).await?;
    let product = parse_product_info(product_id, &json)
      .ok_or_else(|| ProviderError::http(200, format!("no product info returned for {product_id}")))?;
    debug!(product_id, name = %product.name, "fetched product info");
    Ok(product)
  }

  async fn set_keyword_bid(&self, campaign_id: &str, keyword: &str, bid: f64) -> Result<(), ProviderError> {
    let id = campaign_number(campaign_id)?;
    let body = json!({
      "campaignId": id,
      "keywords": [{"keyword": keyword, "bid": bid}],
    });
    self.post_write(&KEYWORD_BID_SET, &body).await?;
    info!(campaign_id, keyword, bid, "keyword bid updated");
    Ok(())
  }

  async fn pause_keywords(&self, campaign_id: &str, keywords: &[String]) -> Result<(), ProviderError> {
    let id = campaign_number(campaign_id)?;
    let body = json!({
      "campaignId": id,
      "keywords": keywords
        .iter()
        .map(|k| json!({"keyword": k, "status": "PAUSED"}))
        .collect::<Vec<_>>(),
    });
    self.post_write(&KEYWORD_STATUS_SET, &body).await?;
    info!(campaign_id, count = keywords.len(), "keywords paused");
    Ok(())
  }

  async fn add_negative_keywords(&self, campaign_id: &str, keywords: &[String]) -> Result<(), ProviderError> {
    let id = campaign_number(campaign_id)?;
    let body = json!({
      "campaignId": id,
      "negativeKeywords": keywords,
    });
    self.post_write(&NEGATIVE_KEYWORDS_ADD, &body).await?;
    info!(campaign_id, count = keywords.len(), "negative keywords added");
    Ok(())
  }
}
