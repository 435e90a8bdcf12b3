use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::decision_engine::Recommendation;
use crate::error::ReportError;
use crate::metrics::DateRange;
use crate::providers::telegram::escape_html;
use crate::summary::CampaignSummary;
use crate::trends::{TrendDirection, TrendReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
  Spreadsheet,
  Document,
  Json,
}

impl ReportFormat {
  pub fn extension(&self) -> &'static str {
    match self {
      ReportFormat::Spreadsheet => "csv",
      ReportFormat::Document => "html",
      ReportFormat::Json => "json",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      ReportFormat::Spreadsheet => "Spreadsheet",
      ReportFormat::Document => "Document",
      ReportFormat::Json => "JSON",
    }
  }
}

impl FromStr for ReportFormat {
  type Err = String;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "spreadsheet" | "excel" | "csv" => Ok(ReportFormat::Spreadsheet),
      "document" | "pdf" | "html" => Ok(ReportFormat::Document),
      "json" => Ok(ReportFormat::Json),
      other => Err(format!("unknown report format {other:?} (expected spreadsheet, document or json)")),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport<'a> {
  pub range: DateRange,
  pub generated_at: NaiveDateTime,
  pub summary: &'a CampaignSummary,
  pub recommendations: &'a [Recommendation],
  #[serde(skip_serializing_if = "Option::is_none")]
  pub trends: Option<&'a TrendReport>,
}

const CSV_HEADER: [&str; 13] = [
  "keyword",
  "match_type",
  "impressions",
  "clicks",
  "ctr_percent",
  "orders",
  "cr_percent",
  "spend",
  "revenue",
  "drr_percent",
  "action",
  "priority",
  "reason",
];

fn render_csv(report: &CampaignReport<'_>) -> Result<Vec<u8>, ReportError> {
  let mut w = csv::Writer::from_writer(Vec::new());
  w.write_record(CSV_HEADER)?;
  for r in report.recommendations {
    w.write_record([
      r.keyword.clone(),
      r.match_type.clone().unwrap_or_default(),
      r.stat.impressions.to_string(),
      r.stat.clicks.to_string(),
      format!("{:.2}", r.ratios.ctr),
      r.stat.orders.to_string(),
      format!("{:.2}", r.ratios.cr),
      format!("{:.2}", r.stat.spend),
      format!("{:.2}", r.stat.revenue),
      format!("{:.2}", r.ratios.drr),
      r.action.to_string(),
      r.priority.to_string(),
      r.reason.clone(),
    ])?;
  }
  w.into_inner()
    .map_err(|e| ReportError::Io(std::io::Error::other(e.to_string())))
}

fn direction_label(d: TrendDirection) -> &'static str {
  match d {
    TrendDirection::Increasing => "increasing",
    TrendDirection::Decreasing => "decreasing",
    TrendDirection::Stable => "stable",
  }
}

fn render_html(report: &CampaignReport<'_>) -> String {
  let s = report.summary;
  let p = &s.performance;
  let mut html = String::new();

  html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
  html.push_str(&format!(
    "<title>Campaign {} report</title>\n",
    escape_html(&s.campaign_id)
  ));
  html.push_str(
    "<style>body{font-family:sans-serif;margin:24px}table{border-collapse:collapse}\
     td,th{border:1px solid #ccc;padding:4px 8px}.disable{background:#ffd6d6}\
     .increase_bid{background:#d6ffd9}.decrease_bid{background:#fff3c4}.monitor{background:#e0f0ff}</style>\n",
  );
  html.push_str("</head>\n<body>\n");
  html.push_str(&format!(
    "<h1>Campaign {}</h1>\n<p>Period: {} &middot; generated {}</p>\n",
    escape_html(&s.campaign_id),
    report.range,
    report.generated_at.format("%Y-%m-%d %H:%M")
  ));

  html.push_str("<h2>Performance</h2>\n<table>\n");
  for (label, value) in [
    ("Spend, RUB", format!("{:.2}", p.total_spend)),
    ("Revenue, RUB", format!("{:.2}", p.total_revenue)),
    ("Impressions", p.total_impressions.to_string()),
    ("Clicks", p.total_clicks.to_string()),
    ("Orders", p.total_orders.to_string()),
    ("CTR", format!("{:.2}%", p.overall_ctr)),
    ("CR", format!("{:.2}%", p.overall_cr)),
    ("DRR", format!("{:.2}%", p.overall_drr)),
    ("ROI", format!("{:.2}", p.overall_roi)),
    ("Potential savings, RUB", format!("{:.2}", s.potential_savings)),
  ] {
    html.push_str(&format!("<tr><th>{label}</th><td>{value}</td></tr>\n"));
  }
  html.push_str("</table>\n");

  if !s.advice.is_empty() {
    html.push_str("<h2>Recommendations</h2>\n<ul>\n");
    for line in &s.advice {
      html.push_str(&format!("<li>{}</li>\n", escape_html(line)));
    }
    html.push_str("</ul>\n");
  }

  if let Some(TrendReport::Trends { metrics }) = report.trends {
    html.push_str("<h2>Trends</h2>\n<table>\n<tr><th>Metric</th><th>Direction</th><th>Change</th></tr>\n");
    for m in metrics {
      html.push_str(&format!(
        "<tr><td>{}</td><td>{}</td><td>{:+.1}%</td></tr>\n",
        m.metric,
        direction_label(m.direction),
        m.change_percent
      ));
    }
    html.push_str("</table>\n");
  }

  html.push_str("<h2>Keywords</h2>\n<table>\n<tr>");
  for h in ["Keyword", "Clicks", "CTR", "CR", "DRR", "Action", "Priority", "Reason"] {
    html.push_str(&format!("<th>{h}</th>"));
  }
  html.push_str("</tr>\n");
  for r in report.recommendations {
    html.push_str(&format!(
      "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{:.2}%</td><td>{:.2}%</td><td>{:.2}%</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
      r.action,
      escape_html(&r.keyword),
      r.stat.clicks,
      r.ratios.ctr,
      r.ratios.cr,
      r.ratios.drr,
      r.action,
      r.priority,
      escape_html(&r.reason)
    ));
  }
  html.push_str("</table>\n</body>\n</html>\n");
  html
}

pub fn render(report: &CampaignReport<'_>, format: ReportFormat) -> Result<Vec<u8>, ReportError> {
  match format {
    ReportFormat::Spreadsheet => render_csv(report),
    ReportFormat::Document => Ok(render_html(report).into_bytes()),
    ReportFormat::Json => Ok(serde_json::to_vec_pretty(report)?),
  }
}

pub fn report_file_name(campaign_id: &str, format: ReportFormat, at: NaiveDateTime) -> String {
  let safe_id: String = campaign_id
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
    .collect();
  format!(
    "campaign_{}_report_{}.{}",
    safe_id,
    at.format("%Y%m%d_%H%M%S"),
    format.extension()
  )
}

/// Renders the report and stores it in `dir`, creating the directory if needed.
pub fn write_report(dir: &Path, report: &CampaignReport<'_>, format: ReportFormat) -> Result<PathBuf, ReportError> {
  let bytes = render(report, format)?;
  std::fs::create_dir_all(dir)?;
  let path = dir.join(report_file_name(
    &report.summary.campaign_id,
    format,
    report.generated_at,
  ));
  std::fs::write(&path, bytes)?;
  info!(path = %path.display(), format = format.extension(), "report written");
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ThresholdConfig;
  use crate::decision_engine::evaluate_stats;
  use crate::metrics::KeywordStat;
  use crate::summary::summarize;
  use chrono::NaiveDate;

  fn stat(keyword: &str, impressions: u64, clicks: u64, orders: u64, spend: f64, revenue: f64) -> KeywordStat {
    KeywordStat {
      keyword: keyword.to_string(),
      match_type: None,
      impressions,
      clicks,
      orders,
      spend,
      revenue,
    }
  }

  fn fixture() -> (Vec<Recommendation>, CampaignSummary) {
    let recs = evaluate_stats(
      &[
        stat("кеды, белые", 1000, 50, 5, 100.0, 1000.0),
        stat("<script>", 2000, 50, 0, 100.0, 0.0),
      ],
      &ThresholdConfig::default(),
    );
    let summary = summarize("77", &recs);
    (recs, summary)
  }

  fn at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 5, 4).unwrap().and_hms_opt(10, 30, 5).unwrap()
  }

  fn range() -> DateRange {
    DateRange::last_days(NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(), 7)
  }

  #[test]
  fn parses_format_aliases() {
    assert_eq!("excel".parse::<ReportFormat>(), Ok(ReportFormat::Spreadsheet));
    assert_eq!("PDF".parse::<ReportFormat>(), Ok(ReportFormat::Document));
    assert_eq!("json".parse::<ReportFormat>(), Ok(ReportFormat::Json));
    assert!("xml".parse::<ReportFormat>().is_err());
  }

  #[test]
  fn csv_quotes_fields_with_commas() {
    let (recs, summary) = fixture();
    let report = CampaignReport {
      range: range(),
      generated_at: at(),
      summary: &summary,
      recommendations: &recs,
      trends: None,
    };
    let csv = String::from_utf8(render(&report, ReportFormat::Spreadsheet).unwrap()).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("keyword,match_type,impressions"));
    assert!(csv.contains("\"кеды, белые\""));
    assert_eq!(csv.lines().count(), 3);
  }

  #[test]
  fn html_escapes_keywords() {
    let (recs, summary) = fixture();
    let report = CampaignReport {
      range: range(),
      generated_at: at(),
      summary: &summary,
      recommendations: &recs,
      trends: None,
    };
    let html = String::from_utf8(render(&report, ReportFormat::Document).unwrap()).unwrap();
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<td><script>"));
    assert!(html.contains("Period: 2026-04-27 - 2026-05-04"));
  }

  #[test]
  fn writes_timestamped_file() {
    let (recs, summary) = fixture();
    let report = CampaignReport {
      range: range(),
      generated_at: at(),
      summary: &summary,
      recommendations: &recs,
      trends: None,
    };
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("reports");

    let path = write_report(&out, &report, ReportFormat::Json).unwrap();
    assert_eq!(
      path.file_name().unwrap().to_str().unwrap(),
      "campaign_77_report_20260504_103005.json"
    );
    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(json["summary"]["campaign_id"], "77");
    assert_eq!(json["recommendations"].as_array().unwrap().len(), 2);
  }
}
