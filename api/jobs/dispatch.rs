use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{HeaderMap, Method, StatusCode};
use tracing::{info, warn};
use vercel_runtime::{run, service_fn, Error, Request, Response, ResponseBody};

use ozon_ads_rust::agent::AdsAgent;
use ozon_ads_rust::config::Settings;
use ozon_ads_rust::error::AgentError;
use ozon_ads_rust::scheduler::JobKind;
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

fn query_value<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
  let query = query?;
  for part in query.split('&') {
    let Some((k, v)) = part.split_once('=') else {
      continue;
    };
    if k == key {
      return Some(v);
    }
  }
  None
}

async fn handle_dispatch(
  job: Option<&str>,
  method: &Method,
  headers: &HeaderMap,
  _body: Bytes,
) -> Result<Response<ResponseBody>, Error> {
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

  let kind = match job.map(str::parse::<JobKind>) {
    Some(Ok(kind)) => kind,
    Some(Err(message)) => {
      return json_response(
        StatusCode::BAD_REQUEST,
        serde_json::json!({"ok": false, "error": "bad_request", "message": message}),
      );
    }
    None => {
      return json_response(
        StatusCode::BAD_REQUEST,
        serde_json::json!({"ok": false, "error": "bad_request", "message": "job is required"}),
      );
    }
  };

  let settings = match Settings::from_env() {
    Ok(s) => s,
    Err(e) => {
      return json_response(
        StatusCode::NOT_IMPLEMENTED,
        serde_json::json!({"ok": false, "error": "not_configured", "message": e.to_string()}),
      );
    }
  };

  let agent = AdsAgent::from_settings(&settings);
  info!(job = %kind, "dispatching job");

  match agent.run_job(kind).await {
    Ok(outcome) => json_response(
      StatusCode::OK,
      serde_json::json!({"ok": true, "job": kind.as_str(), "outcome": outcome}),
    ),
    Err(AgentError::NoCampaigns) => json_response(
      StatusCode::OK,
      serde_json::json!({"ok": true, "job": kind.as_str(), "skipped": "no_campaigns"}),
    ),
    Err(AgentError::AutoOptimizationDisabled) => json_response(
      StatusCode::CONFLICT,
      serde_json::json!({"ok": false, "error": "auto_optimization_disabled"}),
    ),
    Err(e) => {
      warn!(job = %kind, error = %e, "dispatched job failed");
      json_response(
        StatusCode::BAD_GATEWAY,
        serde_json::json!({"ok": false, "error": "job_failed", "message": e.to_string()}),
      )
    }
  }
}

async fn handler(req: Request) -> Result<Response<ResponseBody>, Error> {
  let job = query_value(req.uri().query(), "job").map(str::to_string);
  let method = req.method().clone();
  let headers = req.headers().clone();
  let bytes = req.into_body().collect().await?.to_bytes();
  handle_dispatch(job.as_deref(), &method, &headers, bytes).await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
  telemetry::init_stdout(&std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()));
  run(service_fn(handler)).await
}
