use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::config::SafetyCaps;
use crate::decision_engine::{Action, Recommendation};
use crate::error::ProviderError;
use crate::keyword_tools::{generate_negative_keywords, plan_bid_adjustments, BidAdjustment};
use crate::metrics::KeywordStat;
use crate::providers::AdsProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
  Simulation,
  Live,
}

impl ApplyMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      ApplyMode::Simulation => "simulation",
      ApplyMode::Live => "live",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteFailure {
  pub operation: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub keyword: Option<String>,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
  pub campaign_id: String,
  pub mode: ApplyMode,
  pub paused_keywords: Vec<String>,
  /// Disable recommendations left out by the per-run cap.
  pub deferred_disables: usize,
  pub bid_changes: Vec<BidAdjustment>,
  pub negative_keywords: Vec<String>,
  pub failures: Vec<WriteFailure>,
  /// Successful provider writes, counted per keyword. Always 0 in simulation.
  pub actions_taken: usize,
}

impl OptimizationReport {
  pub fn planned_actions(&self) -> usize {
    self.paused_keywords.len() + self.bid_changes.len() + self.negative_keywords.len()
  }
}

/// Turns recommendations into provider writes within [`SafetyCaps`].
pub struct ActionApplier {
  caps: SafetyCaps,
  locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ActionApplier {
  pub fn new(caps: SafetyCaps) -> Self {
    Self {
      caps,
      locks: Mutex::new(HashMap::new()),
    }
  }

  pub fn caps(&self) -> &SafetyCaps {
    &self.caps
  }

  fn campaign_lock(&self, campaign_id: &str) -> Arc<AsyncMutex<()>> {
    let mut locks = match self.locks.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    locks
      .entry(campaign_id.to_string())
      .or_insert_with(|| Arc::new(AsyncMutex::new(())))
      .clone()
  }

  pub async fn apply<P: AdsProvider>(
    &self,
    provider: &P,
    campaign_id: &str,
    recs: &[Recommendation],
    mode: ApplyMode,
  ) -> Result<OptimizationReport, ProviderError> {
    let lock = self.campaign_lock(campaign_id);
    let _guard = lock.lock().await;

    let disables: Vec<&Recommendation> = recs.iter().filter(|r| r.action == Action::Disable).collect();
    let deferred_disables = disables.len().saturating_sub(self.caps.max_disables_per_run);
    let paused_keywords: Vec<String> = disables
      .iter()
      .take(self.caps.max_disables_per_run)
      .map(|r| r.keyword.clone())
      .collect();

    let current_bids = provider.keyword_bids(campaign_id).await?;
    let mut bid_changes = plan_bid_adjustments(recs, &current_bids, self.caps.min_bid_priority);
    bid_changes.truncate(self.caps.max_bid_changes_per_run);

    let negative_keywords = if self.caps.apply_negative_keywords && !disables.is_empty() {
      let stats: Vec<KeywordStat> = disables.iter().map(|r| r.stat.clone()).collect();
      generate_negative_keywords(&stats)
    } else {
      Vec::new()
    };

    let mut report = OptimizationReport {
      campaign_id: campaign_id.to_string(),
      mode,
      paused_keywords,
      deferred_disables,
      bid_changes,
      negative_keywords,
      failures: Vec::new(),
      actions_taken: 0,
    };

    if deferred_disables > 0 {
      warn!(campaign_id, deferred_disables, "disable cap reached");
    }

    if mode == ApplyMode::Simulation {
      info!(campaign_id, planned = report.planned_actions(), "optimization simulated");
      return Ok(report);
    }

    if !report.paused_keywords.is_empty() {
      match provider.pause_keywords(campaign_id, &report.paused_keywords).await {
        Ok(()) => report.actions_taken += report.paused_keywords.len(),
        Err(e) => {
          warn!(campaign_id, error = %e, "pausing keywords failed");
          report.failures.push(WriteFailure {
            operation: "pause_keywords",
            keyword: None,
            message: e.to_string(),
          });
        }
      }
    }

    for change in &report.bid_changes {
      match provider.set_keyword_bid(campaign_id, &change.keyword, change.new_bid).await {
        Ok(()) => report.actions_taken += 1,
        Err(e) => {
          warn!(campaign_id, keyword = %change.keyword, error = %e, "bid update failed");
          report.failures.push(WriteFailure {
            operation: "set_keyword_bid",
            keyword: Some(change.keyword.clone()),
            message: e.to_string(),
          });
        }
      }
    }

    if !report.negative_keywords.is_empty() {
      match provider.add_negative_keywords(campaign_id, &report.negative_keywords).await {
        Ok(()) => report.actions_taken += report.negative_keywords.len(),
        Err(e) => {
          warn!(campaign_id, error = %e, "adding negative keywords failed");
          report.failures.push(WriteFailure {
            operation: "add_negative_keywords",
            keyword: None,
            message: e.to_string(),
          });
        }
      }
    }

    info!(
      campaign_id,
      actions_taken = report.actions_taken,
      failures = report.failures.len(),
      "optimization applied"
    );
    Ok(report)
  }
}
