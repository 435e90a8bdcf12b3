use thiserror::Error;

/// Why a single keyword record was rejected before rule evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
  #[error("missing field `{0}`")]
  MissingField(&'static str),

  #[error("field `{field}` is negative ({value})")]
  NegativeMetric { field: &'static str, value: f64 },

  #[error("field `{field}` is not a number ({value:?})")]
  NotANumber { field: &'static str, value: String },

  #[error("field `{0}` is not a finite number")]
  NonFiniteMetric(&'static str),

  #[error("count `{field}` is not a whole number ({value})")]
  FractionalCount { field: &'static str, value: f64 },

  #[error("derived ratio `{0}` is not finite")]
  NonFiniteRatio(&'static str),
}

impl ValidationError {
  /// Stable tag used to group rejections in skip summaries.
  pub fn reason_key(&self) -> &'static str {
    match self {
      ValidationError::MissingField(_) => "missing_field",
      ValidationError::NegativeMetric { .. } => "negative_metric",
      ValidationError::NotANumber { .. } => "not_a_number",
      ValidationError::NonFiniteMetric(_) => "non_finite_metric",
      ValidationError::FractionalCount { .. } => "fractional_count",
      ValidationError::NonFiniteRatio(_) => "non_finite_ratio",
    }
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("missing required setting {0}")]
  MissingVar(&'static str),

  #[error("invalid value for {name}: {value:?}")]
  InvalidVar { name: String, value: String },

  #[error("threshold configuration is missing fields: {}", .0.join(", "))]
  MissingThresholds(Vec<&'static str>),

  #[error("invalid threshold `{field}`: {message}")]
  InvalidThreshold { field: &'static str, message: String },

  #[error("cannot read thresholds file {path}: {source}")]
  ThresholdsFile {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("cannot parse thresholds: {0}")]
  ThresholdsJson(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct ProviderError {
  pub status: Option<u16>,
  pub message: String,
}

impl std::fmt::Display for ProviderError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if let Some(status) = self.status {
      write!(f, "Ozon API error (status {status}): {}", self.message)
    } else {
      write!(f, "Ozon API error: {}", self.message)
    }
  }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
  pub fn transport(message: impl Into<String>) -> Self {
    Self {
      status: None,
      message: message.into(),
    }
  }

  pub fn http(status: u16, message: impl Into<String>) -> Self {
    Self {
      status: Some(status),
      message: message.into(),
    }
  }
}

#[derive(Debug)]
pub struct NotifyError {
  pub status: Option<u16>,
  pub message: String,
}

impl std::fmt::Display for NotifyError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if let Some(status) = self.status {
      write!(f, "Telegram error (status {status}): {}", self.message)
    } else {
      write!(f, "Telegram error: {}", self.message)
    }
  }
}

impl std::error::Error for NotifyError {}

impl NotifyError {
  pub fn transport(message: impl Into<String>) -> Self {
    Self {
      status: None,
      message: message.into(),
    }
  }
}

#[derive(Debug, Error)]
pub enum ReportError {
  #[error("report i/o failed: {0}")]
  Io(#[from] std::io::Error),

  #[error("report serialization failed: {0}")]
  Json(#[from] serde_json::Error),

  #[error("csv encoding failed: {0}")]
  Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum AgentError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Provider(#[from] ProviderError),

  #[error(transparent)]
  Notify(#[from] NotifyError),

  #[error(transparent)]
  Report(#[from] ReportError),

  #[error("i/o failed: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("auto-optimization is disabled; run in simulation mode or set AUTO_OPTIMIZATION_ENABLED=true")]
  AutoOptimizationDisabled,

  #[error("no campaigns found")]
  NoCampaigns,
}
