use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ThresholdConfig;
use crate::error::ValidationError;
use crate::metrics::{KeywordStat, KeywordStatRecord, Ratios};

// Fixed rule constants that are not part of the threshold configuration.
const LOW_CTR_MIN_CLICKS: u64 = 10;
const LOW_CTR_WATCH_IMPRESSIONS: u64 = 1000;
const LOW_CTR_WATCH_PERCENT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
  Disable,
  IncreaseBid,
  DecreaseBid,
  Monitor,
  Keep,
}

impl Action {
  pub fn as_str(&self) -> &'static str {
    match self {
      Action::Disable => "disable",
      Action::IncreaseBid => "increase_bid",
      Action::DecreaseBid => "decrease_bid",
      Action::Monitor => "monitor",
      Action::Keep => "keep",
    }
  }
}

impl std::fmt::Display for Action {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Which rule produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Issue {
  NoOrdersWithClicks,
  CriticalDrr,
  LowCtr,
  HighPerformance,
  HighDrr,
  WarningDrr,
  LowCtrHighImpressions,
  None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
  pub keyword: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub match_type: Option<String>,
  pub action: Action,
  pub priority: u8,
  pub reason: String,
  pub issue: Issue,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bid_delta_percent: Option<f64>,
  pub stat: KeywordStat,
  pub ratios: Ratios,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRejection {
  pub index: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub keyword: Option<String>,
  pub reason: &'static str,
  pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkipSummary {
  pub skipped: usize,
  pub by_reason: BTreeMap<&'static str, usize>,
  pub rejections: Vec<RecordRejection>,
}

impl SkipSummary {
  fn record(&mut self, index: usize, keyword: Option<&str>, err: &ValidationError) {
    self.skipped += 1;
    *self.by_reason.entry(err.reason_key()).or_insert(0) += 1;
    self.rejections.push(RecordRejection {
      index,
      keyword: keyword.map(|k| k.to_string()),
      reason: err.reason_key(),
      message: err.to_string(),
    });
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationOutcome {
  pub recommendations: Vec<Recommendation>,
  /// Valid keywords left out because they have fewer clicks than the analysis floor.
  pub insufficient_sample: usize,
  pub skipped: SkipSummary,
}

impl EvaluationOutcome {
  pub fn needing_attention(&self) -> usize {
    self
      .recommendations
      .iter()
      .filter(|r| r.action != Action::Keep)
      .count()
  }
}

struct Verdict {
  action: Action,
  priority: u8,
  issue: Issue,
  reason: String,
  bid_delta_percent: Option<f64>,
}

fn verdict(action: Action, priority: u8, issue: Issue, reason: String) -> Verdict {
  Verdict {
    action,
    priority,
    issue,
    reason,
    bid_delta_percent: None,
  }
}

fn decide(stat: &KeywordStat, r: &Ratios, cfg: &ThresholdConfig) -> Verdict {
  if stat.clicks >= cfg.min_clicks_for_analysis && stat.orders == 0 {
    return verdict(
      Action::Disable,
      100,
      Issue::NoOrdersWithClicks,
      format!("no conversions despite {} clicks", stat.clicks),
    );
  }

  if r.drr > cfg.critical_drr {
    return verdict(
      Action::Disable,
      95,
      Issue::CriticalDrr,
      format!("DRR {:.1}% is above the critical {:.1}%", r.drr, cfg.critical_drr),
    );
  }

  if r.ctr < cfg.min_ctr && stat.clicks > LOW_CTR_MIN_CLICKS {
    return verdict(
      Action::Disable,
      90,
      Issue::LowCtr,
      format!("CTR {:.2}% is below the minimum {:.2}%", r.ctr, cfg.min_ctr),
    );
  }

  if r.ctr > cfg.high_ctr && r.cr > cfg.high_cr && r.drr < cfg.max_acceptable_drr {
    return Verdict {
      bid_delta_percent: Some(cfg.bid_increase_percent),
      ..verdict(
        Action::IncreaseBid,
        70,
        Issue::HighPerformance,
        format!(
          "raise bid by {:.0}%: CTR {:.2}%, CR {:.2}%, DRR {:.1}%",
          cfg.bid_increase_percent, r.ctr, r.cr, r.drr
        ),
      )
    };
  }

  if r.drr > cfg.max_acceptable_drr && r.drr <= cfg.critical_drr {
    return Verdict {
      bid_delta_percent: Some(-cfg.bid_decrease_percent),
      ..verdict(
        Action::DecreaseBid,
        60,
        Issue::HighDrr,
        format!(
          "lower bid by {:.0}%: DRR {:.1}% is above the acceptable {:.1}%",
          cfg.bid_decrease_percent, r.drr, cfg.max_acceptable_drr
        ),
      )
    };
  }

  // Shadowed by rules 2 and 5 for any finite DRR.
  if r.drr > cfg.max_acceptable_drr {
    return verdict(
      Action::Monitor,
      30,
      Issue::WarningDrr,
      format!("DRR {:.1}% exceeds the acceptable {:.1}%", r.drr, cfg.max_acceptable_drr),
    );
  }

  if stat.impressions > LOW_CTR_WATCH_IMPRESSIONS && r.ctr < LOW_CTR_WATCH_PERCENT {
    return verdict(
      Action::Monitor,
      20,
      Issue::LowCtrHighImpressions,
      format!("low CTR {:.2}% at {} impressions", r.ctr, stat.impressions),
    );
  }

  verdict(Action::Keep, 0, Issue::None, "keep monitoring".to_string())
}

/// Presentation order: priority, then worse DRR, then worse CTR.
fn presentation_order(a: &Recommendation, b: &Recommendation) -> Ordering {
  b.priority
    .cmp(&a.priority)
    .then_with(|| b.ratios.drr.partial_cmp(&a.ratios.drr).unwrap_or(Ordering::Equal))
    .then_with(|| a.ratios.ctr.partial_cmp(&b.ratios.ctr).unwrap_or(Ordering::Equal))
    .then_with(|| a.keyword.cmp(&b.keyword))
    .then_with(|| a.match_type.cmp(&b.match_type))
}

pub fn recommend(stat: &KeywordStat, cfg: &ThresholdConfig) -> Option<Recommendation> {
  if stat.clicks < cfg.min_clicks_for_analysis {
    return None;
  }
  let ratios = stat.ratios();
  let v = decide(stat, &ratios, cfg);
  Some(Recommendation {
    keyword: stat.keyword.clone(),
    match_type: stat.match_type.clone(),
    action: v.action,
    priority: v.priority,
    reason: v.reason,
    issue: v.issue,
    bid_delta_percent: v.bid_delta_percent,
    stat: stat.clone(),
    ratios,
  })
}

/// Evaluates already validated stats.
pub fn evaluate_stats(stats: &[KeywordStat], cfg: &ThresholdConfig) -> Vec<Recommendation> {
  let mut out: Vec<Recommendation> = stats.iter().filter_map(|s| recommend(s, cfg)).collect();
  out.sort_by(presentation_order);
  out
}

/// Validates and evaluates raw provider records; bad records are skipped and counted.
pub fn evaluate(records: &[KeywordStatRecord], cfg: &ThresholdConfig) -> EvaluationOutcome {
  let mut outcome = EvaluationOutcome::default();

  for (index, record) in records.iter().enumerate() {
    let stat = match KeywordStat::try_from_record(record) {
      Ok(stat) => stat,
      Err(err) => {
        debug!(index, error = %err, "skipping keyword record");
        outcome.skipped.record(index, record.keyword.as_deref(), &err);
        continue;
      }
    };

    match recommend(&stat, cfg) {
      Some(rec) => outcome.recommendations.push(rec),
      None => outcome.insufficient_sample += 1,
    }
  }

  outcome.recommendations.sort_by(presentation_order);
  debug!(
    evaluated = outcome.recommendations.len(),
    insufficient_sample = outcome.insufficient_sample,
    skipped = outcome.skipped.skipped,
    "keyword evaluation finished"
  );
  outcome
}
