use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};
use vercel_runtime::Error;

use ozon_ads_rust::agent::AdsAgent;
use ozon_ads_rust::applier::ApplyMode;
use ozon_ads_rust::bot::DEFAULT_ANALYSIS_DAYS;
use ozon_ads_rust::config::{Settings, ThresholdConfig};
use ozon_ads_rust::decision_engine::evaluate;
use ozon_ads_rust::metrics::KeywordStatRecord;
use ozon_ads_rust::report::ReportFormat;
use ozon_ads_rust::scheduler::{upcoming, Scheduler};
use ozon_ads_rust::telemetry;

#[derive(Parser)]
#[command(name = "ads_agent")]
#[command(version, about = "Ozon Performance keyword analysis and optimization agent")]
struct Cli {
  /// Directory for rolling log files
  #[arg(long, default_value = "logs")]
  log_dir: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Check the Ozon connection and print the effective configuration
  Status,
  /// Evaluate keyword records from a JSON file without touching the API
  Evaluate {
    file: PathBuf,
    /// Path to a JSON file holding a complete threshold set; defaults plus THRESHOLD_* overrides otherwise
    #[arg(long, value_name = "FILE")]
    thresholds: Option<String>,
  },
  /// Analyse one campaign
  Analyze {
    campaign_id: String,
    #[arg(short, long, default_value_t = DEFAULT_ANALYSIS_DAYS)]
    days: i64,
  },
  /// Plan, and with --live apply, keyword changes for one campaign
  Optimize {
    campaign_id: String,
    #[arg(short, long, default_value_t = DEFAULT_ANALYSIS_DAYS)]
    days: i64,
    #[arg(long)]
    live: bool,
  },
  /// Suggest keywords with match types and starting bids for one product
  Suggest { product_id: String },
  /// Write a campaign report to REPORT_OUTPUT_DIR
  Report {
    campaign_id: String,
    #[arg(short, long, default_value = "spreadsheet")]
    format: String,
    #[arg(short, long, default_value_t = DEFAULT_ANALYSIS_DAYS)]
    days: i64,
  },
  /// List scheduled jobs and their next run
  Schedule,
  /// Run the scheduler and the Telegram bot until Ctrl-C
  Daemon,
}

fn boxed(message: impl Into<String>) -> Error {
  Box::new(std::io::Error::other(message.into()))
}

fn print_json(value: &impl Serialize) -> Result<(), Error> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn evaluate_file(file: &Path, thresholds: Option<&str>) -> Result<(), Error> {
  let cfg = match thresholds {
    Some(path) => ThresholdConfig::from_json_file(path)?,
    None => ThresholdConfig::from_env_overrides(|name| std::env::var(name).ok())?,
  };
  let raw = std::fs::read_to_string(file)?;
  let records: Vec<KeywordStatRecord> = serde_json::from_str(&raw)?;

  let outcome = evaluate(&records, &cfg);
  info!(
    records = records.len(),
    recommendations = outcome.recommendations.len(),
    skipped = outcome.skipped.skipped,
    "file evaluated"
  );
  print_json(&outcome)
}

async fn run_daemon(agent: AdsAgent<ozon_ads_rust::providers::ozon::OzonClient>, bot_enabled: bool) {
  let (stop_tx, stop_rx) = watch::channel(false);
  let stopped = |mut rx: watch::Receiver<bool>| async move {
    let _ = rx.wait_for(|stop| *stop).await;
  };

  let scheduler = Scheduler::new(agent.jobs(), Local::now().naive_local());
  let schedule = scheduler.run(|kind| agent.run_job(kind), stopped(stop_rx.clone()));
  let bot = async {
    if !bot_enabled {
      info!("telegram not configured; bot disabled");
      return;
    }
    if let Err(e) = agent.run_bot(stopped(stop_rx.clone())).await {
      warn!(error = %e, "telegram bot exited");
    }
  };
  let signal = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      warn!(error = %e, "ctrl-c handler unavailable");
      return;
    }
    info!("shutdown requested");
    let _ = stop_tx.send(true);
  };

  tokio::join!(schedule, bot, signal);
}

#[tokio::main]
async fn main() -> Result<(), Error> {
  let cli = Cli::parse();

  if let Command::Evaluate { file, thresholds } = &cli.command {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let _guard = telemetry::init_logging(&level, &cli.log_dir);
    return evaluate_file(file, thresholds.as_deref());
  }

  let settings = Settings::from_env()?;
  let _guard = telemetry::init_logging(&settings.log_level, &cli.log_dir);
  let agent = AdsAgent::from_settings(&settings);

  match cli.command {
    Command::Evaluate { .. } => Ok(()),
    Command::Status => print_json(&agent.status().await?),
    Command::Analyze { campaign_id, days } => {
      let analysis = agent.analyze_campaign(&campaign_id, days).await?;
      print_json(&analysis)
    }
    Command::Optimize {
      campaign_id,
      days,
      live,
    } => {
      let mode = if live { ApplyMode::Live } else { ApplyMode::Simulation };
      print_json(&agent.optimize_campaign(&campaign_id, days, mode).await?)
    }
    Command::Suggest { product_id } => {
      let suggestions = agent.suggest_keywords(&product_id).await?;
      info!(product_id = %product_id, count = suggestions.len(), "keyword suggestions ready");
      print_json(&suggestions)
    }
    Command::Report {
      campaign_id,
      format,
      days,
    } => {
      let format: ReportFormat = format.parse().map_err(boxed)?;
      let path = agent.generate_report(&campaign_id, days, format).await?;
      println!("{}", path.display());
      Ok(())
    }
    Command::Schedule => {
      for (job, next) in upcoming(&agent.jobs(), Local::now().naive_local()) {
        println!("{:<16} {:<24} next {}", job.kind.as_str(), job.trigger.to_string(), next.format("%Y-%m-%d %H:%M"));
      }
      Ok(())
    }
    Command::Daemon => {
      info!(
        auto_optimization = settings.auto_optimization_enabled,
        telegram = settings.telegram.is_some(),
        "agent starting"
      );
      run_daemon(agent, settings.telegram.is_some()).await;
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
  }

  #[test]
  fn thresholds_option_takes_a_file_path() {
    let cmd = Cli::command();
    let evaluate = cmd.find_subcommand("evaluate").unwrap();
    let arg = evaluate.get_arguments().find(|a| a.get_id() == "thresholds").unwrap();
    assert!(arg.get_help().unwrap().to_string().starts_with("Path to a JSON file"));

    let cli = Cli::try_parse_from(["ads_agent", "evaluate", "stats.json", "--thresholds", "thresholds.json"]).unwrap();
    match cli.command {
      Command::Evaluate { thresholds, .. } => assert_eq!(thresholds.as_deref(), Some("thresholds.json")),
      _ => panic!("expected evaluate"),
    }
  }

  #[test]
  fn suggest_takes_a_product_id() {
    let cli = Cli::try_parse_from(["ads_agent", "suggest", "555"]).unwrap();
    assert!(matches!(cli.command, Command::Suggest { product_id } if product_id == "555"));
  }
}
