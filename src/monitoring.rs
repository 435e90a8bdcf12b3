use serde::Serialize;

use crate::config::ThresholdConfig;
use crate::metrics::CampaignTotals;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignAlert {
  pub campaign_id: String,
  pub key: &'static str,
  pub kind: &'static str,
  pub severity: &'static str,
  pub message: String,
}

pub fn evaluate_campaign_alerts(
  campaign_id: &str,
  totals: &CampaignTotals,
  thresholds: &ThresholdConfig,
  spend_alert: f64,
) -> Vec<CampaignAlert> {
  let mut out = Vec::new();

  let drr = totals.ratios().drr;
  if drr > thresholds.critical_drr {
    out.push(CampaignAlert {
      campaign_id: campaign_id.to_string(),
      key: "high_drr",
      kind: "High DRR",
      severity: "critical",
      message: format!("DRR {:.1}% is above the critical {:.1}%", drr, thresholds.critical_drr),
    });
  } else if drr > thresholds.max_drr {
    out.push(CampaignAlert {
      campaign_id: campaign_id.to_string(),
      key: "drr_above_target",
      kind: "DRR above target",
      severity: "warning",
      message: format!("DRR {:.1}% is above the {:.1}% target", drr, thresholds.max_drr),
    });
  }

  if totals.spend > spend_alert {
    out.push(CampaignAlert {
      campaign_id: campaign_id.to_string(),
      key: "high_spend",
      kind: "High spend",
      severity: "warning",
      message: format!("Spend {:.2} RUB exceeds {:.2} RUB", totals.spend, spend_alert),
    });
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn totals(spend: f64, revenue: f64) -> CampaignTotals {
    CampaignTotals {
      impressions: 10_000,
      clicks: 200,
      orders: 10,
      spend,
      revenue,
    }
  }

  #[test]
  fn critical_drr_triggers_critical_alert() {
    let alerts = evaluate_campaign_alerts("7", &totals(600.0, 1000.0), &ThresholdConfig::default(), 10_000.0);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].key, "high_drr");
    assert_eq!(alerts[0].severity, "critical");
    assert_eq!(alerts[0].campaign_id, "7");
  }

  #[test]
  fn spend_over_limit_triggers_warning() {
    let alerts = evaluate_campaign_alerts("7", &totals(12_000.0, 100_000.0), &ThresholdConfig::default(), 10_000.0);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].key, "high_spend");
    assert_eq!(alerts[0].severity, "warning");
  }

  #[test]
  fn drr_between_target_and_critical_warns() {
    // DRR exactly 50%: above target, not critical.
    let alerts = evaluate_campaign_alerts("7", &totals(10_000.0, 20_000.0), &ThresholdConfig::default(), 50_000.0);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].key, "drr_above_target");
    assert_eq!(alerts[0].severity, "warning");
  }

  #[test]
  fn boundaries_do_not_alert() {
    // DRR exactly 15%, spend exactly at the limit.
    let alerts = evaluate_campaign_alerts("7", &totals(1_500.0, 10_000.0), &ThresholdConfig::default(), 1_500.0);
    assert!(alerts.is_empty());
  }
}
