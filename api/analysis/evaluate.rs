use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{HeaderMap, Method, StatusCode};
use serde::Deserialize;
use tracing::info;
use vercel_runtime::{run, service_fn, Error, Request, Response, ResponseBody};

use ozon_ads_rust::config::PartialThresholds;
use ozon_ads_rust::decision_engine::evaluate;
use ozon_ads_rust::error::ConfigError;
use ozon_ads_rust::metrics::KeywordStatRecord;
use ozon_ads_rust::telemetry;

fn bearer_token(header_value: Option<&str>) -> Option<&str> {
  let value = header_value?;
  value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))
}

fn json_response(status: StatusCode, value: serde_json::Value) -> Result<Response<ResponseBody>, Error> {
  Ok(
    Response::builder()
      .status(status)
      .header("content-type", "application/json; charset=utf-8")
      .body(ResponseBody::from(value))?,
  )
}

fn bad_request(message: String) -> Result<Response<ResponseBody>, Error> {
  json_response(
    StatusCode::BAD_REQUEST,
    serde_json::json!({"ok": false, "error": "bad_request", "message": message}),
  )
}

#[derive(Deserialize)]
struct EvaluateRequest {
  stats: Vec<KeywordStatRecord>,
  #[serde(default)]
  thresholds: PartialThresholds,
}

async fn handle_evaluate(method: &Method, headers: &HeaderMap, body: Bytes) -> Result<Response<ResponseBody>, Error> {
  if method != Method::POST {
    return json_response(
      StatusCode::METHOD_NOT_ALLOWED,
      serde_json::json!({"ok": false, "error": "method_not_allowed"}),
    );
  }

  let expected = std::env::var("RUST_INTERNAL_TOKEN").unwrap_or_default();
  let provided = bearer_token(headers.get("authorization").and_then(|v| v.to_str().ok())).unwrap_or("");

  if expected.is_empty() || provided != expected {
    return json_response(
      StatusCode::UNAUTHORIZED,
      serde_json::json!({"ok": false, "error": "unauthorized"}),
    );
  }

  let parsed: EvaluateRequest = match serde_json::from_slice(&body) {
    Ok(p) => p,
    Err(e) => return bad_request(format!("invalid json body: {e}")),
  };

  let thresholds = match parsed.thresholds.complete() {
    Ok(t) => t,
    Err(ConfigError::MissingThresholds(fields)) => {
      return json_response(
        StatusCode::BAD_REQUEST,
        serde_json::json!({"ok": false, "error": "missing_thresholds", "fields": fields}),
      );
    }
    Err(e) => return bad_request(e.to_string()),
  };
  if let Err(e) = thresholds.validate() {
    return bad_request(e.to_string());
  }

  let outcome = evaluate(&parsed.stats, &thresholds);
  info!(
    records = parsed.stats.len(),
    recommendations = outcome.recommendations.len(),
    skipped = outcome.skipped.skipped,
    "stats evaluated"
  );

  json_response(
    StatusCode::OK,
    serde_json::json!({
      "ok": true,
      "recommendations": outcome.recommendations,
      "needing_attention": outcome.needing_attention(),
      "insufficient_sample": outcome.insufficient_sample,
      "skipped": outcome.skipped,
    }),
  )
}

async fn handler(req: Request) -> Result<Response<ResponseBody>, Error> {
  let method = req.method().clone();
  let headers = req.headers().clone();
  let bytes = req.into_body().collect().await?.to_bytes();
  handle_evaluate(&method, &headers, bytes).await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
  telemetry::init_stdout(&std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()));
  run(service_fn(handler)).await
}

#[cfg(test)]
mod tests {
  use super::*;

  const FULL_THRESHOLDS: &str = r#"{
    "min_ctr": 0.5, "max_drr": 15, "high_ctr": 3, "high_cr": 4, "max_acceptable_drr": 25,
    "critical_drr": 50, "min_clicks_for_analysis": 30, "bid_increase_percent": 20, "bid_decrease_percent": 30
  }"#;

  fn authorized() -> HeaderMap {
    std::env::set_var("RUST_INTERNAL_TOKEN", "secret");
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer secret".parse().unwrap());
    headers
  }

  async fn body_json(response: Response<ResponseBody>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn returns_unauthorized_without_token() {
    std::env::set_var("RUST_INTERNAL_TOKEN", "secret");
    let response = handle_evaluate(&Method::POST, &HeaderMap::new(), Bytes::new()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn lists_missing_threshold_fields() {
    let body = Bytes::from(r#"{"stats": [], "thresholds": {"min_ctr": 0.5}}"#);
    let response = handle_evaluate(&Method::POST, &authorized(), body).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "missing_thresholds");
    let fields: Vec<&str> = json["fields"].as_array().unwrap().iter().filter_map(|v| v.as_str()).collect();
    assert!(fields.contains(&"critical_drr"));
    assert!(!fields.contains(&"min_ctr"));
  }

  #[tokio::test]
  async fn rejects_inconsistent_thresholds() {
    let thresholds = FULL_THRESHOLDS.replace("\"critical_drr\": 50", "\"critical_drr\": 10");
    let body = Bytes::from(format!(r#"{{"stats": [], "thresholds": {thresholds}}}"#));
    let response = handle_evaluate(&Method::POST, &authorized(), body).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn evaluates_records_and_reports_skips() {
    let body = Bytes::from(format!(
      r#"{{"thresholds": {FULL_THRESHOLDS}, "stats": [
        {{"keyword": "кеды дешевые", "impressions": 2000, "clicks": 50, "orders": 0, "spend": 100, "revenue": 0}},
        {{"keyword": "кеды", "impressions": 2000, "clicks": "abc", "orders": 1, "spend": 10, "revenue": 100}},
        {{"keyword": "кроссовки", "impressions": 100, "clicks": 3, "orders": 0, "spend": 10, "revenue": 0}}
      ]}}"#
    ));
    let response = handle_evaluate(&Method::POST, &authorized(), body).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["recommendations"][0]["action"], "disable");
    assert_eq!(json["recommendations"][0]["priority"], 100);
    assert_eq!(json["insufficient_sample"], 1);
    assert_eq!(json["skipped"]["skipped"], 1);
  }
}
