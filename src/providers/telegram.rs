use std::path::Path;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::applier::{ApplyMode, OptimizationReport};
use crate::config::{TelegramSettings, ThresholdConfig};
use crate::decision_engine::Recommendation;
use crate::error::NotifyError;
use crate::http_client::{send, OutgoingRequest};
use crate::metrics::DateRange;
use crate::monitoring::CampaignAlert;
use crate::summary::CampaignSummary;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const MULTIPART_BOUNDARY: &str = "----ozon-ads-rust-boundary";
const TOP_ISSUES_IN_MESSAGE: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
  pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
  pub chat: Chat,
  #[serde(default)]
  pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
  pub update_id: i64,
  #[serde(default)]
  pub message: Option<IncomingMessage>,
}

pub struct TelegramNotifier {
  api_base: String,
  bot_token: String,
  chat_id: String,
}

impl TelegramNotifier {
  pub fn new(settings: &TelegramSettings) -> Self {
    Self {
      api_base: TELEGRAM_API_BASE.to_string(),
      bot_token: settings.bot_token.clone(),
      chat_id: settings.chat_id.clone(),
    }
  }

  pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
    self.api_base = api_base.into().trim_end_matches('/').to_string();
    self
  }

  /// The chat notifications go to; the bot serves only this chat.
  pub fn chat_id(&self) -> &str {
    &self.chat_id
  }

  fn method_url(&self, method: &str) -> String {
    format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
  }

  async fn call(&self, method: &str, req: OutgoingRequest<'_>) -> Result<Value, NotifyError> {
    let resp = send(req).await.map_err(|e| NotifyError::transport(e.to_string()))?;
    let json: Value = serde_json::from_slice(&resp.body).map_err(|e| NotifyError {
      status: Some(resp.status),
      message: format!("invalid json response: {e}"),
    })?;

    if !resp.is_success() || json.get("ok").and_then(Value::as_bool) != Some(true) {
      let message = json
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("request rejected")
        .to_string();
      warn!(method, status = resp.status, %message, "telegram call failed");
      return Err(NotifyError {
        status: Some(resp.status),
        message,
      });
    }

    debug!(method, "telegram call ok");
    Ok(json.get("result").cloned().unwrap_or(Value::Null))
  }

  pub async fn send_message(&self, chat_id: Option<&str>, text: &str) -> Result<(), NotifyError> {
    let url = self.method_url("sendMessage");
    let body = json!({
      "chat_id": chat_id.unwrap_or(&self.chat_id),
      "text": text,
      "parse_mode": "HTML",
      "disable_web_page_preview": true,
    });
    self.call("sendMessage", OutgoingRequest::post_json(&url, &body)).await?;
    Ok(())
  }

  pub async fn send_document(&self, chat_id: Option<&str>, path: &Path, caption: &str) -> Result<(), NotifyError> {
    let contents = tokio::fs::read(path)
      .await
      .map_err(|e| NotifyError::transport(format!("cannot read {}: {e}", path.display())))?;
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_else(|| "report".to_string());

    let body = multipart_body(
      &[("chat_id", chat_id.unwrap_or(&self.chat_id)), ("caption", caption)],
      ("document", &file_name, &contents),
    );
    let url = self.method_url("sendDocument");
    let req = OutgoingRequest::post(
      &url,
      format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
      body,
    )
    .timeout(Duration::from_secs(120));
    self.call("sendDocument", req).await?;
    Ok(())
  }

  /// Long-polls for updates newer than `offset`.
  pub async fn get_updates(&self, offset: Option<i64>, poll_secs: u64) -> Result<Vec<Update>, NotifyError> {
    let mut url = format!("{}?timeout={poll_secs}", self.method_url("getUpdates"));
    if let Some(offset) = offset {
      url.push_str(&format!("&offset={offset}"));
    }
    let req = OutgoingRequest::get(&url).timeout(Duration::from_secs(poll_secs + 10));
    let result = self.call("getUpdates", req).await?;
    serde_json::from_value(result).map_err(|e| NotifyError {
      status: None,
      message: format!("invalid updates payload: {e}"),
    })
  }
}

fn multipart_body(fields: &[(&str, &str)], file: (&str, &str, &[u8])) -> Bytes {
  let mut buf = BytesMut::new();
  for (name, value) in fields {
    buf.put_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    buf.put_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
  }
  let (name, file_name, contents) = file;
  buf.put_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
  buf.put_slice(
    format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{}\"\r\n", file_name.replace('"', "")).as_bytes(),
  );
  buf.put_slice(b"Content-Type: application/octet-stream\r\n\r\n");
  buf.put_slice(contents);
  buf.put_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
  buf.freeze()
}

pub fn escape_html(raw: &str) -> String {
  raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn stamp(at: NaiveDateTime) -> String {
  at.format("%d.%m.%Y %H:%M").to_string()
}

fn issue_lines(issues: &[Recommendation]) -> String {
  issues
    .iter()
    .take(TOP_ISSUES_IN_MESSAGE)
    .map(|r| format!("• {}: {}\n", escape_html(&r.keyword), escape_html(&r.reason)))
    .collect()
}

pub fn analysis_message(summary: &CampaignSummary, range: &DateRange) -> String {
  use crate::decision_engine::Action;

  let p = &summary.performance;
  let mut text = format!(
    "📊 <b>Campaign {} analysis</b>\n<i>{}</i>\n\n\
     <b>Performance</b>\n\
     • Spend: {:.2} RUB\n• Revenue: {:.2} RUB\n• CTR: {:.2}%\n• CR: {:.2}%\n• DRR: {:.2}%\n\n\
     <b>Keywords analysed:</b> {}\n",
    escape_html(&summary.campaign_id),
    range,
    p.total_spend,
    p.total_revenue,
    p.overall_ctr,
    p.overall_cr,
    p.overall_drr,
    summary.total_keywords,
  );

  for (action, label) in [
    (Action::Disable, "🔴 Disable"),
    (Action::IncreaseBid, "📈 Raise bid"),
    (Action::DecreaseBid, "📉 Lower bid"),
    (Action::Monitor, "👀 Monitor"),
  ] {
    let n = summary.count(action);
    if n > 0 {
      text.push_str(&format!("• {label}: {n}\n"));
    }
  }

  if !summary.critical_issues.is_empty() {
    text.push_str("\n⚠️ <b>Critical issues</b>\n");
    text.push_str(&issue_lines(&summary.critical_issues));
  }
  text
}

pub fn analysis_complete_message(campaigns: usize, critical: usize, at: NaiveDateTime) -> String {
  format!(
    "📊 <b>Analysis complete</b>\n\n• Campaigns analysed: {campaigns}\n• Critical issues found: {critical}\n\n{}",
    stamp(at)
  )
}

pub fn optimization_message(mode: ApplyMode, reports: &[OptimizationReport], at: NaiveDateTime) -> String {
  let actions: usize = reports.iter().map(|r| r.actions_taken).sum();
  let planned: usize = reports.iter().map(|r| r.planned_actions()).sum();
  let paused: usize = reports.iter().map(|r| r.paused_keywords.len()).sum();
  let failures: usize = reports.iter().map(|r| r.failures.len()).sum();

  let mut text = if mode == ApplyMode::Simulation {
    format!("🧪 <b>Optimization simulated</b>\n\n• Planned actions: {planned}\n")
  } else {
    format!("⚙️ <b>Optimization complete</b>\n\n• Actions taken: {actions}\n")
  };
  text.push_str(&format!(
    "• Keywords paused: {paused}\n• Campaigns processed: {}\n",
    reports.len()
  ));
  if failures > 0 {
    text.push_str(&format!("• Failed writes: {failures}\n"));
  }
  text.push_str(&format!("\n{}", stamp(at)));
  text
}

pub fn critical_issues_message(campaign_id: &str, issues: &[Recommendation], at: NaiveDateTime) -> String {
  format!(
    "🚨 <b>Critical issues</b>\n\nCampaign: {}\nIssues found: {}\n\n<b>Top issues</b>\n{}\n⏰ {}",
    escape_html(campaign_id),
    issues.len(),
    issue_lines(issues),
    stamp(at)
  )
}

pub fn alerts_message(alerts: &[CampaignAlert]) -> String {
  let mut text = format!("🔔 <b>Monitoring alerts</b> ({})\n\n", alerts.len());
  for a in alerts {
    let icon = if a.severity == "critical" { "🔴" } else { "🟡" };
    text.push_str(&format!(
      "{icon} Campaign {}: {}\n",
      escape_html(&a.campaign_id),
      escape_html(&a.message)
    ));
  }
  text
}

/// What the scheduled jobs alert on, for the `/alerts` command.
pub fn alert_settings_message(thresholds: &ThresholdConfig, spend_alert: f64, auto_optimization: bool) -> String {
  let mut text = format!(
    "🔔 <b>Alert settings</b>\n\n\
     <b>Campaign monitoring</b>\n\
     • 🔴 DRR above {:.1}%\n\
     • 🟡 DRR above {:.1}%\n\
     • 🟡 Spend above {:.0} RUB\n\n\
     <b>Daily analysis</b>\n\
     • Keywords without orders after {}+ clicks\n\
     • Keywords with DRR above {:.1}%\n",
    thresholds.critical_drr,
    thresholds.max_drr,
    spend_alert,
    thresholds.min_clicks_for_analysis,
    thresholds.critical_drr,
  );
  if auto_optimization {
    text.push_str("\n⚙️ Auto-optimization results after every run\n");
  }
  text.push_str("\n<b>Weekly reports</b>\n• Spreadsheet and document for every campaign");
  text
}

pub fn report_caption(campaign_id: &str, format_label: &str) -> String {
  format!("📄 {format_label} report for campaign {campaign_id}")
}
