use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Cutoffs for the keyword rules. Ratios are in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdConfig {
  pub min_ctr: f64,
  pub max_drr: f64,
  pub high_ctr: f64,
  pub high_cr: f64,
  pub max_acceptable_drr: f64,
  pub critical_drr: f64,
  pub min_clicks_for_analysis: u64,
  pub bid_increase_percent: f64,
  pub bid_decrease_percent: f64,
}

impl Default for ThresholdConfig {
  fn default() -> Self {
    Self {
      min_ctr: 0.5,
      max_drr: 15.0,
      high_ctr: 3.0,
      high_cr: 4.0,
      max_acceptable_drr: 25.0,
      critical_drr: 50.0,
      min_clicks_for_analysis: 30,
      bid_increase_percent: 20.0,
      bid_decrease_percent: 30.0,
    }
  }
}

/// Threshold set as read from an external source, before completeness checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialThresholds {
  pub min_ctr: Option<f64>,
  pub max_drr: Option<f64>,
  pub high_ctr: Option<f64>,
  pub high_cr: Option<f64>,
  pub max_acceptable_drr: Option<f64>,
  pub critical_drr: Option<f64>,
  pub min_clicks_for_analysis: Option<u64>,
  pub bid_increase_percent: Option<f64>,
  pub bid_decrease_percent: Option<f64>,
}

impl PartialThresholds {
  /// Every field must be present; the error names all absent ones.
  pub fn complete(self) -> Result<ThresholdConfig, ConfigError> {
    let PartialThresholds {
      min_ctr,
      max_drr,
      high_ctr,
      high_cr,
      max_acceptable_drr,
      critical_drr,
      min_clicks_for_analysis,
      bid_increase_percent,
      bid_decrease_percent,
    } = self;

    let mut missing = Vec::new();
    macro_rules! take {
      ($field:ident) => {
        match $field {
          Some(v) => v,
          None => {
            missing.push(stringify!($field));
            Default::default()
          }
        }
      };
    }

    let cfg = ThresholdConfig {
      min_ctr: take!(min_ctr),
      max_drr: take!(max_drr),
      high_ctr: take!(high_ctr),
      high_cr: take!(high_cr),
      max_acceptable_drr: take!(max_acceptable_drr),
      critical_drr: take!(critical_drr),
      min_clicks_for_analysis: take!(min_clicks_for_analysis),
      bid_increase_percent: take!(bid_increase_percent),
      bid_decrease_percent: take!(bid_decrease_percent),
    };

    if !missing.is_empty() {
      return Err(ConfigError::MissingThresholds(missing));
    }
    cfg.validate()?;
    Ok(cfg)
  }
}

impl ThresholdConfig {
  pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
    let partial: PartialThresholds = serde_json::from_str(raw)?;
    partial.complete()
  }

  pub fn from_json_file(path: &str) -> Result<Self, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ThresholdsFile {
      path: path.to_string(),
      source,
    })?;
    Self::from_json_str(&raw)
  }

  /// Defaults overridden by `THRESHOLD_<FIELD>` variables.
  pub fn from_env_overrides(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let mut cfg = ThresholdConfig::default();

    fn parse<T: std::str::FromStr>(name: &str, raw: String) -> Result<T, ConfigError> {
      raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidVar {
        name: name.to_string(),
        value: raw,
      })
    }

    macro_rules! override_field {
      ($field:ident, $var:literal) => {
        if let Some(raw) = lookup($var).filter(|v| !v.trim().is_empty()) {
          cfg.$field = parse($var, raw)?;
        }
      };
    }

    override_field!(min_ctr, "THRESHOLD_MIN_CTR");
    override_field!(max_drr, "THRESHOLD_MAX_DRR");
    override_field!(high_ctr, "THRESHOLD_HIGH_CTR");
    override_field!(high_cr, "THRESHOLD_HIGH_CR");
    override_field!(max_acceptable_drr, "THRESHOLD_MAX_ACCEPTABLE_DRR");
    override_field!(critical_drr, "THRESHOLD_CRITICAL_DRR");
    override_field!(min_clicks_for_analysis, "THRESHOLD_MIN_CLICKS_FOR_ANALYSIS");
    override_field!(bid_increase_percent, "THRESHOLD_BID_INCREASE_PERCENT");
    override_field!(bid_decrease_percent, "THRESHOLD_BID_DECREASE_PERCENT");

    cfg.validate()?;
    Ok(cfg)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let fields = [
      ("min_ctr", self.min_ctr),
      ("max_drr", self.max_drr),
      ("high_ctr", self.high_ctr),
      ("high_cr", self.high_cr),
      ("max_acceptable_drr", self.max_acceptable_drr),
      ("critical_drr", self.critical_drr),
      ("bid_increase_percent", self.bid_increase_percent),
      ("bid_decrease_percent", self.bid_decrease_percent),
    ];
    for (field, value) in fields {
      if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidThreshold {
          field,
          message: format!("must be a finite non-negative number, got {value}"),
        });
      }
    }

    if self.max_drr > self.critical_drr {
      return Err(ConfigError::InvalidThreshold {
        field: "max_drr",
        message: format!("{} exceeds critical_drr {}", self.max_drr, self.critical_drr),
      });
    }
    if self.max_acceptable_drr > self.critical_drr {
      return Err(ConfigError::InvalidThreshold {
        field: "max_acceptable_drr",
        message: format!("{} exceeds critical_drr {}", self.max_acceptable_drr, self.critical_drr),
      });
    }
    if self.bid_decrease_percent >= 100.0 {
      return Err(ConfigError::InvalidThreshold {
        field: "bid_decrease_percent",
        message: "must be below 100".to_string(),
      });
    }
    Ok(())
  }
}

/// Limits the action applier enforces per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyCaps {
  pub max_disables_per_run: usize,
  pub max_bid_changes_per_run: usize,
  pub min_bid_priority: u8,
  pub apply_negative_keywords: bool,
}

impl Default for SafetyCaps {
  fn default() -> Self {
    Self {
      max_disables_per_run: 50,
      max_bid_changes_per_run: 5,
      min_bid_priority: 70,
      apply_negative_keywords: false,
    }
  }
}

pub const DEFAULT_OZON_BASE_URLS: [&str; 3] = [
  "https://api-seller.ozon.ru",
  "https://api.ozon.ru",
  "https://performance.ozon.ru/api",
];

#[derive(Debug, Clone)]
pub struct TelegramSettings {
  pub bot_token: String,
  pub chat_id: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
  pub ozon_client_id: String,
  pub ozon_api_key: String,
  pub ozon_base_urls: Vec<String>,
  pub telegram: Option<TelegramSettings>,
  pub log_level: String,
  pub report_output_dir: String,
  pub auto_optimization_enabled: bool,
  pub spend_alert_threshold: f64,
  pub thresholds: ThresholdConfig,
  pub caps: SafetyCaps,
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
  lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" | "" => Ok(false),
    _ => Err(ConfigError::InvalidVar {
      name: name.to_string(),
      value: raw.to_string(),
    }),
  }
}

impl Settings {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let ozon_client_id = non_empty(&lookup, "OZON_CLIENT_ID").ok_or(ConfigError::MissingVar("OZON_CLIENT_ID"))?;
    let ozon_api_key = non_empty(&lookup, "OZON_API_KEY").ok_or(ConfigError::MissingVar("OZON_API_KEY"))?;

    let ozon_base_urls = non_empty(&lookup, "OZON_BASE_URLS")
      .map(|raw| {
        raw
          .split(',')
          .map(|u| u.trim().trim_end_matches('/').to_string())
          .filter(|u| !u.is_empty())
          .collect::<Vec<_>>()
      })
      .filter(|urls| !urls.is_empty())
      .unwrap_or_else(|| DEFAULT_OZON_BASE_URLS.iter().map(|u| u.to_string()).collect());

    let telegram = match (
      non_empty(&lookup, "TELEGRAM_BOT_TOKEN"),
      non_empty(&lookup, "TELEGRAM_CHAT_ID"),
    ) {
      (Some(bot_token), Some(chat_id)) => Some(TelegramSettings { bot_token, chat_id }),
      _ => None,
    };

    let auto_optimization_enabled = match lookup("AUTO_OPTIMIZATION_ENABLED") {
      Some(raw) => parse_bool("AUTO_OPTIMIZATION_ENABLED", &raw)?,
      None => false,
    };

    let spend_alert_threshold = match non_empty(&lookup, "SPEND_ALERT_THRESHOLD") {
      Some(raw) => raw
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or(ConfigError::InvalidVar {
          name: "SPEND_ALERT_THRESHOLD".to_string(),
          value: raw,
        })?,
      None => 10_000.0,
    };

    let thresholds = match non_empty(&lookup, "THRESHOLDS_PATH") {
      Some(path) => ThresholdConfig::from_json_file(&path)?,
      None => ThresholdConfig::from_env_overrides(&lookup)?,
    };

    Ok(Settings {
      ozon_client_id,
      ozon_api_key,
      ozon_base_urls,
      telegram,
      log_level: non_empty(&lookup, "LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
      report_output_dir: non_empty(&lookup, "REPORT_OUTPUT_DIR").unwrap_or_else(|| "./reports".to_string()),
      auto_optimization_enabled,
      spend_alert_threshold,
      thresholds,
      caps: SafetyCaps::default(),
    })
  }
}
