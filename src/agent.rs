use std::future::Future;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{info, warn};

use crate::applier::{ActionApplier, ApplyMode, OptimizationReport};
use crate::bot::{help_text, BotCommand, DEFAULT_ANALYSIS_DAYS};
use crate::config::{SafetyCaps, Settings, ThresholdConfig};
use crate::decision_engine::{evaluate, EvaluationOutcome};
use crate::error::{AgentError, ConfigError};
use crate::keyword_tools::{find_keyword_opportunities, suggest_keywords_from_product, KeywordOpportunity, KeywordSuggestion};
use crate::metrics::{CampaignDailyStat, CampaignTotals, DateRange, KeywordStat};
use crate::monitoring::{evaluate_campaign_alerts, CampaignAlert};
use crate::providers::ozon::OzonClient;
use crate::providers::telegram::{self, TelegramNotifier};
use crate::providers::{AdsProvider, Campaign};
use crate::report::{write_report, CampaignReport, ReportFormat};
use crate::scheduler::{default_jobs, upcoming, JobKind, ScheduledJob};
use crate::summary::{critical_count, summarize, CampaignSummary};
use crate::trends::{detect_trends, TrendReport};

const CAMPAIGNS_IN_LIST: usize = 10;
const BOT_POLL_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct CampaignAnalysis {
  pub campaign_id: String,
  pub range: DateRange,
  pub outcome: EvaluationOutcome,
  pub summary: CampaignSummary,
  pub daily: Vec<CampaignDailyStat>,
  pub trends: TrendReport,
  pub opportunities: Vec<KeywordOpportunity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
  pub campaigns: usize,
  pub auto_optimization_enabled: bool,
  pub notifications_enabled: bool,
  pub thresholds: ThresholdConfig,
  pub checked_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobOutcome {
  DailyAnalysis { campaigns: usize, critical_issues: usize },
  WeeklyReport { reports: Vec<PathBuf> },
  Monitoring { campaigns: usize, alerts: Vec<CampaignAlert> },
  Optimization { reports: Vec<OptimizationReport> },
}

pub struct AdsAgent<P> {
  provider: P,
  thresholds: ThresholdConfig,
  applier: ActionApplier,
  notifier: Option<TelegramNotifier>,
  report_dir: PathBuf,
  auto_optimization_enabled: bool,
  spend_alert_threshold: f64,
}

fn now() -> NaiveDateTime {
  Local::now().naive_local()
}

fn today() -> NaiveDate {
  Local::now().date_naive()
}

impl AdsAgent<OzonClient> {
  pub fn from_settings(settings: &Settings) -> Self {
    let mut agent = AdsAgent::new(
      OzonClient::from_settings(settings),
      settings.thresholds.clone(),
      settings.caps.clone(),
    )
    .with_report_dir(&settings.report_output_dir)
    .with_auto_optimization(settings.auto_optimization_enabled)
    .with_spend_alert(settings.spend_alert_threshold);
    if let Some(tg) = &settings.telegram {
      agent = agent.with_notifier(TelegramNotifier::new(tg));
    }
    agent
  }
}

impl<P: AdsProvider> AdsAgent<P> {
  pub fn new(provider: P, thresholds: ThresholdConfig, caps: SafetyCaps) -> Self {
    Self {
      provider,
      thresholds,
      applier: ActionApplier::new(caps),
      notifier: None,
      report_dir: PathBuf::from("./reports"),
      auto_optimization_enabled: false,
      spend_alert_threshold: 10_000.0,
    }
  }

  pub fn with_notifier(mut self, notifier: TelegramNotifier) -> Self {
    self.notifier = Some(notifier);
    self
  }

  pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.report_dir = dir.into();
    self
  }

  pub fn with_auto_optimization(mut self, enabled: bool) -> Self {
    self.auto_optimization_enabled = enabled;
    self
  }

  pub fn with_spend_alert(mut self, threshold: f64) -> Self {
    self.spend_alert_threshold = threshold;
    self
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  pub fn jobs(&self) -> Vec<ScheduledJob> {
    default_jobs(self.auto_optimization_enabled)
  }

  async fn notify(&self, text: &str) {
    if let Some(n) = &self.notifier {
      if let Err(e) = n.send_message(None, text).await {
        warn!(error = %e, "notification failed");
      }
    }
  }

  async fn campaigns_for(&self, kind: JobKind) -> Result<Vec<Campaign>, AgentError> {
    let mut campaigns = self.provider.list_campaigns().await?;
    if campaigns.is_empty() {
      return Err(AgentError::NoCampaigns);
    }
    if let Some(limit) = kind.campaign_limit() {
      campaigns.truncate(limit);
    }
    Ok(campaigns)
  }

  pub async fn status(&self) -> Result<AgentStatus, AgentError> {
    let campaigns = self.provider.list_campaigns().await?;
    Ok(AgentStatus {
      campaigns: campaigns.len(),
      auto_optimization_enabled: self.auto_optimization_enabled,
      notifications_enabled: self.notifier.is_some(),
      thresholds: self.thresholds.clone(),
      checked_at: now(),
    })
  }

  pub async fn analyze_campaign(&self, campaign_id: &str, days: i64) -> Result<CampaignAnalysis, AgentError> {
    let range = DateRange::last_days(today(), days);
    let daily = self.provider.campaign_daily_stats(campaign_id, range).await?;
    let records = self.provider.keyword_stats(campaign_id, range).await?;

    let outcome = evaluate(&records, &self.thresholds);
    if outcome.skipped.skipped > 0 {
      warn!(
        campaign_id,
        skipped = outcome.skipped.skipped,
        reasons = ?outcome.skipped.by_reason,
        "invalid keyword records skipped"
      );
    }
    let summary = summarize(campaign_id, &outcome.recommendations);
    let trends = detect_trends(&daily);
    let stats: Vec<KeywordStat> = outcome.recommendations.iter().map(|r| r.stat.clone()).collect();
    let opportunities = find_keyword_opportunities(&stats, &self.thresholds);
    info!(
      campaign_id,
      %range,
      keywords = outcome.recommendations.len(),
      needing_attention = outcome.needing_attention(),
      "campaign analysed"
    );

    Ok(CampaignAnalysis {
      campaign_id: campaign_id.to_string(),
      range,
      outcome,
      summary,
      daily,
      trends,
      opportunities,
    })
  }

  pub async fn suggest_keywords(&self, product_id: &str) -> Result<Vec<KeywordSuggestion>, AgentError> {
    let product = self.provider.product_info(product_id).await?;
    Ok(suggest_keywords_from_product(&product))
  }

  pub async fn optimize_campaign(
    &self,
    campaign_id: &str,
    days: i64,
    mode: ApplyMode,
  ) -> Result<OptimizationReport, AgentError> {
    if mode == ApplyMode::Live && !self.auto_optimization_enabled {
      return Err(AgentError::AutoOptimizationDisabled);
    }
    let analysis = self.analyze_campaign(campaign_id, days).await?;
    let report = self
      .applier
      .apply(&self.provider, campaign_id, &analysis.outcome.recommendations, mode)
      .await?;
    Ok(report)
  }

  fn write_analysis_report(&self, analysis: &CampaignAnalysis, format: ReportFormat) -> Result<PathBuf, AgentError> {
    let report = CampaignReport {
      range: analysis.range,
      generated_at: now(),
      summary: &analysis.summary,
      recommendations: &analysis.outcome.recommendations,
      trends: Some(&analysis.trends),
    };
    Ok(write_report(&self.report_dir, &report, format)?)
  }

  pub async fn generate_report(&self, campaign_id: &str, days: i64, format: ReportFormat) -> Result<PathBuf, AgentError> {
    let analysis = self.analyze_campaign(campaign_id, days).await?;
    self.write_analysis_report(&analysis, format)
  }

  pub async fn run_job(&self, kind: JobKind) -> Result<JobOutcome, AgentError> {
    match kind {
      JobKind::DailyAnalysis => self.run_daily_analysis().await,
      JobKind::WeeklyReport => self.run_weekly_report().await,
      JobKind::Monitoring => self.run_monitoring().await,
      JobKind::Optimization => self.run_optimization().await,
    }
  }

  async fn run_daily_analysis(&self) -> Result<JobOutcome, AgentError> {
    let kind = JobKind::DailyAnalysis;
    let mut analysed = 0;
    let mut critical_total = 0;

    for c in self.campaigns_for(kind).await? {
      let analysis = match self.analyze_campaign(&c.id, kind.window_days()).await {
        Ok(a) => a,
        Err(e) => {
          warn!(campaign_id = %c.id, error = %e, "campaign analysis failed");
          continue;
        }
      };
      analysed += 1;

      let critical = critical_count(&analysis.outcome.recommendations);
      if critical > 0 {
        critical_total += critical;
        warn!(campaign_id = %c.id, critical, "critical keyword issues found");
        self
          .notify(&telegram::critical_issues_message(&c.id, &analysis.summary.critical_issues, now()))
          .await;
      }
    }

    self
      .notify(&telegram::analysis_complete_message(analysed, critical_total, now()))
      .await;
    Ok(JobOutcome::DailyAnalysis {
      campaigns: analysed,
      critical_issues: critical_total,
    })
  }

  async fn run_weekly_report(&self) -> Result<JobOutcome, AgentError> {
    let kind = JobKind::WeeklyReport;
    let mut reports = Vec::new();

    for c in self.campaigns_for(kind).await? {
      let analysis = match self.analyze_campaign(&c.id, kind.window_days()).await {
        Ok(a) => a,
        Err(e) => {
          warn!(campaign_id = %c.id, error = %e, "weekly report skipped");
          continue;
        }
      };
      for format in [ReportFormat::Spreadsheet, ReportFormat::Document] {
        let path = match self.write_analysis_report(&analysis, format) {
          Ok(p) => p,
          Err(e) => {
            warn!(campaign_id = %c.id, format = format.label(), error = %e, "weekly report not written");
            continue;
          }
        };
        if let Some(n) = &self.notifier {
          if let Err(e) = n
            .send_document(None, &path, &telegram::report_caption(&c.id, format.label()))
            .await
          {
            warn!(error = %e, path = %path.display(), "report upload failed");
          }
        }
        reports.push(path);
      }
    }

    Ok(JobOutcome::WeeklyReport { reports })
  }

  async fn run_monitoring(&self) -> Result<JobOutcome, AgentError> {
    let kind = JobKind::Monitoring;
    let range = DateRange::last_days(today(), kind.window_days());
    let campaigns = self.campaigns_for(kind).await?;
    let mut alerts = Vec::new();

    for c in &campaigns {
      match self.provider.campaign_daily_stats(&c.id, range).await {
        Ok(rows) => {
          let totals = CampaignTotals::from_daily(&rows);
          alerts.extend(evaluate_campaign_alerts(
            &c.id,
            &totals,
            &self.thresholds,
            self.spend_alert_threshold,
          ));
        }
        Err(e) => warn!(campaign_id = %c.id, error = %e, "monitoring fetch failed"),
      }
    }

    if !alerts.is_empty() {
      warn!(count = alerts.len(), "monitoring alerts raised");
      self.notify(&telegram::alerts_message(&alerts)).await;
    }
    Ok(JobOutcome::Monitoring {
      campaigns: campaigns.len(),
      alerts,
    })
  }

  async fn run_optimization(&self) -> Result<JobOutcome, AgentError> {
    if !self.auto_optimization_enabled {
      return Err(AgentError::AutoOptimizationDisabled);
    }
    let kind = JobKind::Optimization;
    let mut reports = Vec::new();

    for c in self.campaigns_for(kind).await? {
      match self.optimize_campaign(&c.id, kind.window_days(), ApplyMode::Live).await {
        Ok(r) => reports.push(r),
        Err(e) => warn!(campaign_id = %c.id, error = %e, "optimization failed"),
      }
    }

    self
      .notify(&telegram::optimization_message(ApplyMode::Live, &reports, now()))
      .await;
    Ok(JobOutcome::Optimization { reports })
  }

  /// Builds the reply for one bot command. Failures become error replies.
  pub async fn handle_command(&self, chat_id: &str, cmd: BotCommand) -> String {
    let result = match cmd {
      BotCommand::Start | BotCommand::Help => Ok(help_text()),
      BotCommand::Status => self.status().await.map(|s| status_message(&s)),
      BotCommand::Campaigns => self.provider.list_campaigns().await.map_err(AgentError::from).map(|cs| campaigns_message(&cs)),
      BotCommand::Analyze { campaign_id, days } => self
        .analyze_campaign(&campaign_id, days)
        .await
        .map(|a| telegram::analysis_message(&a.summary, &a.range)),
      BotCommand::Optimize { campaign_id, live } => {
        let mode = if live { ApplyMode::Live } else { ApplyMode::Simulation };
        self
          .optimize_campaign(&campaign_id, DEFAULT_ANALYSIS_DAYS, mode)
          .await
          .map(|r| telegram::optimization_message(mode, &[r], now()))
      }
      BotCommand::Report { campaign_id, format } => self.report_to_chat(chat_id, &campaign_id, format).await,
      BotCommand::Schedule => Ok(schedule_message(&self.jobs(), now())),
      BotCommand::Alerts => Ok(telegram::alert_settings_message(
        &self.thresholds,
        self.spend_alert_threshold,
        self.auto_optimization_enabled,
      )),
      BotCommand::Unknown(hint) => Ok(format!("❓ {}\n\n{}", telegram::escape_html(&hint), help_text())),
    };

    result.unwrap_or_else(|e| format!("❌ {}", telegram::escape_html(&e.to_string())))
  }

  async fn report_to_chat(&self, chat_id: &str, campaign_id: &str, format: ReportFormat) -> Result<String, AgentError> {
    let path = self.generate_report(campaign_id, DEFAULT_ANALYSIS_DAYS, format).await?;
    if let Some(n) = &self.notifier {
      n.send_document(Some(chat_id), &path, &telegram::report_caption(campaign_id, format.label()))
        .await?;
    }
    let name = path
      .file_name()
      .map(|f| f.to_string_lossy().to_string())
      .unwrap_or_default();
    Ok(format!("✅ Report ready: {}", telegram::escape_html(&name)))
  }

  /// Long-polls Telegram and answers commands from the configured chat until `shutdown` resolves.
  pub async fn run_bot(&self, shutdown: impl Future<Output = ()>) -> Result<(), AgentError> {
    let notifier = self
      .notifier
      .as_ref()
      .ok_or(ConfigError::MissingVar("TELEGRAM_BOT_TOKEN"))?;
    tokio::pin!(shutdown);
    let mut offset = None;
    info!("telegram bot polling started");

    loop {
      let polled = tokio::select! {
        _ = &mut shutdown => {
          info!("telegram bot stopping");
          return Ok(());
        }
        r = notifier.get_updates(offset, BOT_POLL_SECS) => r,
      };

      let updates = match polled {
        Ok(u) => u,
        Err(e) => {
          warn!(error = %e, "telegram polling failed");
          tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = tokio::time::sleep(StdDuration::from_secs(5)) => {}
          }
          continue;
        }
      };

      for update in updates {
        offset = Some(update.update_id + 1);
        let Some(message) = update.message else {
          continue;
        };
        let chat = message.chat.id.to_string();
        if chat != notifier.chat_id() {
          warn!(chat = %chat, "ignoring message from unknown chat");
          continue;
        }
        let Some(text) = message.text else {
          continue;
        };

        let cmd = BotCommand::parse(&text);
        info!(?cmd, "bot command");
        let reply = self.handle_command(&chat, cmd).await;
        if let Err(e) = notifier.send_message(Some(&chat), &reply).await {
          warn!(error = %e, "bot reply failed");
        }
      }
    }
  }
}

pub fn status_message(s: &AgentStatus) -> String {
  format!(
    "✅ <b>System is up</b>\n\n• Campaigns: {}\n• Auto-optimization: {}\n• Notifications: {}\n\n🕐 {}",
    s.campaigns,
    if s.auto_optimization_enabled { "on" } else { "off" },
    if s.notifications_enabled { "on" } else { "off" },
    s.checked_at.format("%d.%m.%Y %H:%M")
  )
}

fn campaigns_message(campaigns: &[Campaign]) -> String {
  if campaigns.is_empty() {
    return "📭 No campaigns found".to_string();
  }
  let mut text = format!("<b>📊 Campaigns</b> ({})\n\n", campaigns.len());
  for c in campaigns.iter().take(CAMPAIGNS_IN_LIST) {
    let state = c.state.as_deref().unwrap_or("unknown");
    text.push_str(&format!(
      "• <b>{}</b>\n   ID: {} · {}\n",
      telegram::escape_html(&c.name),
      c.id,
      telegram::escape_html(state)
    ));
  }
  text
}

pub fn schedule_message(jobs: &[ScheduledJob], at: NaiveDateTime) -> String {
  let mut text = "<b>📅 Scheduled jobs</b>\n\n".to_string();
  for (job, next) in upcoming(jobs, at) {
    text.push_str(&format!(
      "🔧 <b>{}</b> ({})\n   next run: {}\n",
      job.kind,
      job.trigger,
      next.format("%d.%m.%Y %H:%M")
    ));
  }
  text
}
