use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::decision_engine::{Action, Issue, Recommendation};
use crate::metrics::CampaignTotals;

const TOP_PERFORMERS: usize = 5;
const CRITICAL_ISSUES: usize = 10;
const CRITICAL_PRIORITY: u8 = 90;

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
  pub total_spend: f64,
  pub total_revenue: f64,
  pub total_clicks: u64,
  pub total_impressions: u64,
  pub total_orders: u64,
  pub overall_ctr: f64,
  pub overall_cr: f64,
  pub overall_drr: f64,
  pub overall_roi: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignSummary {
  pub campaign_id: String,
  pub total_keywords: usize,
  pub actions_needed: BTreeMap<Action, usize>,
  pub performance: PerformanceMetrics,
  pub top_performers: Vec<Recommendation>,
  pub critical_issues: Vec<Recommendation>,
  pub potential_savings: f64,
  pub advice: Vec<String>,
}

impl CampaignSummary {
  pub fn count(&self, action: Action) -> usize {
    self.actions_needed.get(&action).copied().unwrap_or(0)
  }
}

pub fn summarize(campaign_id: &str, recs: &[Recommendation]) -> CampaignSummary {
  let mut actions_needed = BTreeMap::<Action, usize>::new();
  let mut totals = CampaignTotals::default();
  for r in recs {
    *actions_needed.entry(r.action).or_insert(0) += 1;
    totals.impressions = totals.impressions.saturating_add(r.stat.impressions);
    totals.clicks = totals.clicks.saturating_add(r.stat.clicks);
    totals.orders = totals.orders.saturating_add(r.stat.orders);
    totals.spend += r.stat.spend;
    totals.revenue += r.stat.revenue;
  }

  let ratios = totals.ratios();
  let performance = PerformanceMetrics {
    total_spend: totals.spend,
    total_revenue: totals.revenue,
    total_clicks: totals.clicks,
    total_impressions: totals.impressions,
    total_orders: totals.orders,
    overall_ctr: ratios.ctr,
    overall_cr: ratios.cr,
    overall_drr: ratios.drr,
    overall_roi: totals.roi(),
  };

  let mut top_performers: Vec<Recommendation> = recs
    .iter()
    .filter(|r| r.issue == Issue::HighPerformance)
    .cloned()
    .collect();
  top_performers.sort_by(|a, b| b.stat.revenue.partial_cmp(&a.stat.revenue).unwrap_or(Ordering::Equal));
  top_performers.truncate(TOP_PERFORMERS);

  let mut critical_issues: Vec<Recommendation> = recs
    .iter()
    .filter(|r| r.priority >= CRITICAL_PRIORITY)
    .cloned()
    .collect();
  critical_issues.sort_by(|a, b| b.priority.cmp(&a.priority));
  critical_issues.truncate(CRITICAL_ISSUES);

  let potential_savings: f64 = recs
    .iter()
    .filter(|r| r.action == Action::Disable)
    .map(|r| r.stat.spend)
    .sum();

  let mut summary = CampaignSummary {
    campaign_id: campaign_id.to_string(),
    total_keywords: recs.len(),
    actions_needed,
    performance,
    top_performers,
    critical_issues,
    potential_savings,
    advice: Vec::new(),
  };
  summary.advice = campaign_advice(&summary);
  summary
}

fn campaign_advice(summary: &CampaignSummary) -> Vec<String> {
  let mut out = Vec::new();

  let disable = summary.count(Action::Disable);
  if disable > 0 {
    out.push(format!("Disable {disable} underperforming keywords"));
  }
  let raise = summary.count(Action::IncreaseBid);
  if raise > 0 {
    out.push(format!("Raise bids on {raise} high-performing keywords"));
  }
  let lower = summary.count(Action::DecreaseBid);
  if lower > 0 {
    out.push(format!("Lower bids on {lower} keywords with high DRR"));
  }
  if summary.potential_savings > 0.0 {
    out.push(format!(
      "Potential savings from disabling: {:.2} RUB",
      summary.potential_savings
    ));
  }

  out
}

/// Number of recommendations at or above the critical priority.
pub fn critical_count(recs: &[Recommendation]) -> usize {
  recs.iter().filter(|r| r.priority >= CRITICAL_PRIORITY).count()
}
