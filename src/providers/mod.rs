use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::metrics::{CampaignDailyStat, DateRange, KeywordStatRecord};

pub mod ozon;
pub mod telegram;

#[cfg(test)]
pub mod testing;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state: Option<String>,
}

/// Catalogue fields used to seed keyword suggestions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub brand: String,
}

/// Read and write access to an advertising account.
pub trait AdsProvider: Send + Sync {
  fn list_campaigns(&self) -> impl Future<Output = Result<Vec<Campaign>, ProviderError>> + Send;

  fn campaign_daily_stats(
    &self,
    campaign_id: &str,
    range: DateRange,
  ) -> impl Future<Output = Result<Vec<CampaignDailyStat>, ProviderError>> + Send;

  fn keyword_stats(
    &self,
    campaign_id: &str,
    range: DateRange,
  ) -> impl Future<Output = Result<Vec<KeywordStatRecord>, ProviderError>> + Send;

  /// Current bid per keyword; keywords the account reports without a bid are omitted.
  fn keyword_bids(&self, campaign_id: &str) -> impl Future<Output = Result<HashMap<String, f64>, ProviderError>> + Send;

  fn product_info(&self, product_id: &str) -> impl Future<Output = Result<ProductInfo, ProviderError>> + Send;

  fn set_keyword_bid(
    &self,
    campaign_id: &str,
    keyword: &str,
    bid: f64,
  ) -> impl Future<Output = Result<(), ProviderError>> + Send;

  fn pause_keywords(
    &self,
    campaign_id: &str,
    keywords: &[String],
  ) -> impl Future<Output = Result<(), ProviderError>> + Send;

  fn add_negative_keywords(
    &self,
    campaign_id: &str,
    keywords: &[String],
  ) -> impl Future<Output = Result<(), ProviderError>> + Send;
}
