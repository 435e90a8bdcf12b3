use serde::Serialize;

use crate::metrics::CampaignDailyStat;

const STABLE_SLOPE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
  Increasing,
  Decreasing,
  Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTrend {
  pub metric: &'static str,
  pub direction: TrendDirection,
  pub slope: f64,
  pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrendReport {
  InsufficientData,
  Trends { metrics: Vec<MetricTrend> },
}

/// Least-squares slope of `values` against 0..n.
fn slope(values: &[f64]) -> f64 {
  let n = values.len() as f64;
  if values.len() < 2 {
    return 0.0;
  }
  let mean_x = (n - 1.0) / 2.0;
  let mean_y = values.iter().sum::<f64>() / n;
  let mut num = 0.0;
  let mut den = 0.0;
  for (i, y) in values.iter().enumerate() {
    let dx = i as f64 - mean_x;
    num += dx * (y - mean_y);
    den += dx * dx;
  }
  if den > 0.0 {
    num / den
  } else {
    0.0
  }
}

fn trend_for(metric: &'static str, values: &[f64]) -> MetricTrend {
  let s = slope(values);
  let direction = if s.abs() < STABLE_SLOPE {
    TrendDirection::Stable
  } else if s > 0.0 {
    TrendDirection::Increasing
  } else {
    TrendDirection::Decreasing
  };

  let first = values.first().copied().unwrap_or(0.0);
  let last = values.last().copied().unwrap_or(0.0);
  let change_percent = if first != 0.0 {
    (last - first) / first * 100.0
  } else {
    0.0
  };

  MetricTrend {
    metric,
    direction,
    slope: s,
    change_percent,
  }
}

pub fn detect_trends(rows: &[CampaignDailyStat]) -> TrendReport {
  if rows.len() < 2 {
    return TrendReport::InsufficientData;
  }

  let mut sorted: Vec<&CampaignDailyStat> = rows.iter().collect();
  sorted.sort_by_key(|r| r.date);

  let ratios: Vec<_> = sorted.iter().map(|r| r.ratios()).collect();
  let series: [(&'static str, Vec<f64>); 5] = [
    ("ctr", ratios.iter().map(|r| r.ctr).collect()),
    ("cr", ratios.iter().map(|r| r.cr).collect()),
    ("drr", ratios.iter().map(|r| r.drr).collect()),
    ("spend", sorted.iter().map(|r| r.spend).collect()),
    ("revenue", sorted.iter().map(|r| r.revenue).collect()),
  ];

  TrendReport::Trends {
    metrics: series.iter().map(|(m, v)| trend_for(m, v)).collect(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::NaiveDate;

  fn day(offset: u32, spend: f64, revenue: f64) -> CampaignDailyStat {
    CampaignDailyStat {
      date: NaiveDate::from_ymd_opt(2026, 4, 1 + offset).unwrap(),
      impressions: 1000,
      clicks: 20,
      orders: 2,
      spend,
      revenue,
    }
  }

  fn find<'a>(report: &'a TrendReport, metric: &str) -> &'a MetricTrend {
    match report {
      TrendReport::Trends { metrics } => metrics.iter().find(|m| m.metric == metric).unwrap(),
      TrendReport::InsufficientData => panic!("expected trends"),
    }
  }

  #[test]
  fn single_day_is_insufficient() {
    assert_eq!(detect_trends(&[day(0, 1.0, 1.0)]), TrendReport::InsufficientData);
  }

  #[test]
  fn classifies_direction_and_change() {
    // Rows deliberately out of order.
    let rows = vec![day(2, 300.0, 1000.0), day(0, 100.0, 1000.0), day(1, 200.0, 1000.0)];
    let report = detect_trends(&rows);

    let spend = find(&report, "spend");
    assert_eq!(spend.direction, TrendDirection::Increasing);
    assert!((spend.slope - 100.0).abs() < 1e-9);
    assert!((spend.change_percent - 200.0).abs() < 1e-9);

    assert_eq!(find(&report, "revenue").direction, TrendDirection::Stable);
    assert_eq!(find(&report, "ctr").direction, TrendDirection::Stable);
    assert_eq!(find(&report, "drr").direction, TrendDirection::Increasing);
  }

  #[test]
  fn zero_start_has_zero_change_percent() {
    let rows = vec![day(0, 0.0, 100.0), day(1, 50.0, 100.0)];
    let report = detect_trends(&rows);
    assert_eq!(find(&report, "spend").change_percent, 0.0);
    assert_eq!(find(&report, "spend").direction, TrendDirection::Increasing);
  }
}
