use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A metric as the Ozon API sends it: usually a number, sometimes a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMetric {
  Number(f64),
  Text(String),
}

impl From<f64> for RawMetric {
  fn from(value: f64) -> Self {
    RawMetric::Number(value)
  }
}

/// Unvalidated per-keyword statistics for one period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordStatRecord {
  #[serde(default)]
  pub keyword: Option<String>,
  #[serde(default, alias = "matchType")]
  pub match_type: Option<String>,
  #[serde(default)]
  pub impressions: Option<RawMetric>,
  #[serde(default)]
  pub clicks: Option<RawMetric>,
  #[serde(default)]
  pub orders: Option<RawMetric>,
  #[serde(default)]
  pub spend: Option<RawMetric>,
  #[serde(default)]
  pub revenue: Option<RawMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordStat {
  pub keyword: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub match_type: Option<String>,
  pub impressions: u64,
  pub clicks: u64,
  pub orders: u64,
  pub spend: f64,
  pub revenue: f64,
}

/// Derived ratios, all in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ratios {
  pub ctr: f64,
  pub cr: f64,
  pub drr: f64,
}

pub fn percent(numerator: f64, denominator: f64) -> f64 {
  if denominator > 0.0 {
    numerator * 100.0 / denominator
  } else {
    0.0
  }
}

fn metric_value(field: &'static str, raw: Option<&RawMetric>) -> Result<f64, ValidationError> {
  let value = match raw {
    None => return Err(ValidationError::MissingField(field)),
    Some(RawMetric::Number(v)) => *v,
    Some(RawMetric::Text(s)) => {
      let trimmed = s.trim();
      if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
      }
      trimmed
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| ValidationError::NotANumber {
          field,
          value: s.clone(),
        })?
    }
  };

  if !value.is_finite() {
    return Err(ValidationError::NonFiniteMetric(field));
  }
  if value < 0.0 {
    return Err(ValidationError::NegativeMetric { field, value });
  }
  Ok(value)
}

fn count_value(field: &'static str, raw: Option<&RawMetric>) -> Result<u64, ValidationError> {
  let value = metric_value(field, raw)?;
  if value.fract() != 0.0 || value >= u64::MAX as f64 {
    return Err(ValidationError::FractionalCount { field, value });
  }
  Ok(value as u64)
}

impl KeywordStat {
  pub fn try_from_record(record: &KeywordStatRecord) -> Result<Self, ValidationError> {
    let keyword = record
      .keyword
      .as_deref()
      .map(str::trim)
      .filter(|k| !k.is_empty())
      .ok_or(ValidationError::MissingField("keyword"))?
      .to_string();

    let stat = KeywordStat {
      keyword,
      match_type: record
        .match_type
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| m.to_string()),
      impressions: count_value("impressions", record.impressions.as_ref())?,
      clicks: count_value("clicks", record.clicks.as_ref())?,
      orders: count_value("orders", record.orders.as_ref())?,
      spend: metric_value("spend", record.spend.as_ref())?,
      revenue: metric_value("revenue", record.revenue.as_ref())?,
    };

    stat.checked_ratios()?;
    Ok(stat)
  }

  pub fn ratios(&self) -> Ratios {
    Ratios {
      ctr: percent(self.clicks as f64, self.impressions as f64),
      cr: percent(self.orders as f64, self.clicks as f64),
      drr: percent(self.spend, self.revenue),
    }
  }

  /// Ratios, rejecting values that overflowed (e.g. huge spend over a tiny revenue).
  pub fn checked_ratios(&self) -> Result<Ratios, ValidationError> {
    let ratios = self.ratios();
    if !ratios.ctr.is_finite() {
      return Err(ValidationError::NonFiniteRatio("ctr"));
    }
    if !ratios.cr.is_finite() {
      return Err(ValidationError::NonFiniteRatio("cr"));
    }
    if !ratios.drr.is_finite() {
      return Err(ValidationError::NonFiniteRatio("drr"));
    }
    Ok(ratios)
  }
}

/// One day of campaign-level totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignDailyStat {
  pub date: NaiveDate,
  pub impressions: u64,
  pub clicks: u64,
  pub orders: u64,
  pub spend: f64,
  pub revenue: f64,
}

impl CampaignDailyStat {
  pub fn ratios(&self) -> Ratios {
    Ratios {
      ctr: percent(self.clicks as f64, self.impressions as f64),
      cr: percent(self.orders as f64, self.clicks as f64),
      drr: percent(self.spend, self.revenue),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignTotals {
  pub impressions: u64,
  pub clicks: u64,
  pub orders: u64,
  pub spend: f64,
  pub revenue: f64,
}

impl CampaignTotals {
  pub fn from_daily(rows: &[CampaignDailyStat]) -> Self {
    rows.iter().fold(CampaignTotals::default(), |mut acc, r| {
      acc.impressions = acc.impressions.saturating_add(r.impressions);
      acc.clicks = acc.clicks.saturating_add(r.clicks);
      acc.orders = acc.orders.saturating_add(r.orders);
      acc.spend += r.spend;
      acc.revenue += r.revenue;
      acc
    })
  }

  pub fn ratios(&self) -> Ratios {
    Ratios {
      ctr: percent(self.clicks as f64, self.impressions as f64),
      cr: percent(self.orders as f64, self.clicks as f64),
      drr: percent(self.spend, self.revenue),
    }
  }

  pub fn roi(&self) -> f64 {
    if self.spend > 0.0 {
      self.revenue / self.spend
    } else {
      0.0
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
  pub from: NaiveDate,
  pub to: NaiveDate,
}

impl DateRange {
  /// The `days`-long window ending on `today` (inclusive).
  pub fn last_days(today: NaiveDate, days: i64) -> Self {
    Self {
      from: today - Duration::days(days.max(0)),
      to: today,
    }
  }
}

impl std::fmt::Display for DateRange {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} - {}", self.from, self.to)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(keyword: &str, impressions: f64, clicks: f64, orders: f64, spend: f64, revenue: f64) -> KeywordStatRecord {
    KeywordStatRecord {
      keyword: Some(keyword.to_string()),
      match_type: None,
      impressions: Some(impressions.into()),
      clicks: Some(clicks.into()),
      orders: Some(orders.into()),
      spend: Some(spend.into()),
      revenue: Some(revenue.into()),
    }
  }

  #[test]
  fn zero_impressions_yield_zero_ctr() {
    let stat = KeywordStat::try_from_record(&record("сумка", 0.0, 0.0, 0.0, 0.0, 0.0)).unwrap();
    let ratios = stat.ratios();
    assert_eq!(ratios.ctr, 0.0);
    assert_eq!(ratios.cr, 0.0);
    assert_eq!(ratios.drr, 0.0);
  }

  #[test]
  fn ratios_are_percentages() {
    let stat = KeywordStat::try_from_record(&record("сумка", 2000.0, 40.0, 2.0, 50.0, 1000.0)).unwrap();
    let ratios = stat.ratios();
    assert!((ratios.ctr - 2.0).abs() < 1e-9);
    assert!((ratios.cr - 5.0).abs() < 1e-9);
    assert!((ratios.drr - 5.0).abs() < 1e-9);
  }

  #[test]
  fn rejects_negative_and_missing_metrics() {
    let err = KeywordStat::try_from_record(&record("a", 10.0, -1.0, 0.0, 0.0, 0.0)).unwrap_err();
    assert_eq!(err, ValidationError::NegativeMetric { field: "clicks", value: -1.0 });

    let mut missing = record("a", 10.0, 1.0, 0.0, 0.0, 0.0);
    missing.revenue = None;
    assert_eq!(
      KeywordStat::try_from_record(&missing).unwrap_err(),
      ValidationError::MissingField("revenue")
    );

    let mut blank = record("  ", 10.0, 1.0, 0.0, 0.0, 0.0);
    blank.keyword = Some("  ".to_string());
    assert_eq!(
      KeywordStat::try_from_record(&blank).unwrap_err(),
      ValidationError::MissingField("keyword")
    );
  }

  #[test]
  fn rejects_fractional_counts_and_overflowing_ratios() {
    let err = KeywordStat::try_from_record(&record("a", 10.5, 1.0, 0.0, 0.0, 0.0)).unwrap_err();
    assert_eq!(err.reason_key(), "fractional_count");

    let err = KeywordStat::try_from_record(&record("a", 10.0, 1.0, 0.0, f64::MAX, 1e-300)).unwrap_err();
    assert_eq!(err, ValidationError::NonFiniteRatio("drr"));
  }

  #[test]
  fn parses_numeric_strings_from_provider_json() {
    let parsed: KeywordStatRecord = serde_json::from_str(
      r#"{"keyword":"рюкзак","impressions":"1200","clicks":31,"orders":"0","spend":"150,50","revenue":0}"#,
    )
    .unwrap();
    let stat = KeywordStat::try_from_record(&parsed).unwrap();
    assert_eq!(stat.impressions, 1200);
    assert_eq!(stat.clicks, 31);
    assert!((stat.spend - 150.5).abs() < 1e-9);

    let bad: KeywordStatRecord =
      serde_json::from_str(r#"{"keyword":"x","impressions":"n/a","clicks":1,"orders":0,"spend":0,"revenue":0}"#).unwrap();
    assert_eq!(
      KeywordStat::try_from_record(&bad).unwrap_err().reason_key(),
      "not_a_number"
    );
  }

  #[test]
  fn totals_sum_daily_rows() {
    let d = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let rows = vec![
      CampaignDailyStat { date: d, impressions: 100, clicks: 10, orders: 1, spend: 50.0, revenue: 200.0 },
      CampaignDailyStat { date: d.succ_opt().unwrap(), impressions: 300, clicks: 10, orders: 1, spend: 50.0, revenue: 200.0 },
    ];
    let totals = CampaignTotals::from_daily(&rows);
    assert_eq!(totals.impressions, 400);
    assert!((totals.ratios().ctr - 5.0).abs() < 1e-9);
    assert!((totals.ratios().drr - 25.0).abs() < 1e-9);
    assert!((totals.roi() - 4.0).abs() < 1e-9);
  }

  #[test]
  fn totals_saturate_on_huge_daily_counts() {
    let d = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let row = CampaignDailyStat {
      date: d,
      impressions: 10_000_000_000_000_000_000,
      clicks: 10_000_000_000_000_000_000,
      orders: 1,
      spend: 50.0,
      revenue: 200.0,
    };
    let totals = CampaignTotals::from_daily(&[row.clone(), row]);
    assert_eq!(totals.impressions, u64::MAX);
    assert_eq!(totals.clicks, u64::MAX);
    assert_eq!(totals.orders, 2);
  }

  #[test]
  fn last_days_window_is_inclusive() {
    let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
    let range = DateRange::last_days(today, 7);
    assert_eq!(range.from, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    assert_eq!(range.to, today);
    assert_eq!(range.to_string(), "2026-03-03 - 2026-03-10");
  }
}
