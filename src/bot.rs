use crate::report::ReportFormat;

pub const DEFAULT_ANALYSIS_DAYS: i64 = 7;
const MAX_ANALYSIS_DAYS: i64 = 90;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
  Start,
  Help,
  Status,
  Campaigns,
  Analyze { campaign_id: String, days: i64 },
  Optimize { campaign_id: String, live: bool },
  Report { campaign_id: String, format: ReportFormat },
  Schedule,
  Alerts,
  /// Anything not understood, with a hint for the user.
  Unknown(String),
}

fn numeric_id(raw: Option<&str>, usage: &str) -> Result<String, BotCommand> {
  match raw {
    Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => Ok(id.to_string()),
    _ => Err(BotCommand::Unknown(format!("usage: {usage}"))),
  }
}

impl BotCommand {
  /// Parses a chat message. `/cmd@botname` forms are accepted.
  pub fn parse(text: &str) -> BotCommand {
    let mut parts = text.split_whitespace();
    let Some(head) = parts.next() else {
      return BotCommand::Unknown("empty message".to_string());
    };
    let Some(name) = head.strip_prefix('/') else {
      return BotCommand::Unknown(format!("not a command: {head}"));
    };
    let name = name.split('@').next().unwrap_or(name).to_ascii_lowercase();
    let arg1 = parts.next();
    let arg2 = parts.next();

    let parsed = match name.as_str() {
      "start" => Ok(BotCommand::Start),
      "help" => Ok(BotCommand::Help),
      "status" => Ok(BotCommand::Status),
      "campaigns" => Ok(BotCommand::Campaigns),
      "schedule" => Ok(BotCommand::Schedule),
      "alerts" => Ok(BotCommand::Alerts),
      "analyze" => numeric_id(arg1, "/analyze <campaign_id> [days]").and_then(|campaign_id| {
        let days = match arg2 {
          None => DEFAULT_ANALYSIS_DAYS,
          Some(raw) => match raw.parse::<i64>() {
            Ok(d) if (1..=MAX_ANALYSIS_DAYS).contains(&d) => d,
            _ => return Err(BotCommand::Unknown(format!("days must be between 1 and {MAX_ANALYSIS_DAYS}"))),
          },
        };
        Ok(BotCommand::Analyze { campaign_id, days })
      }),
      "optimize" => numeric_id(arg1, "/optimize <campaign_id> [live]").and_then(|campaign_id| match arg2 {
        None => Ok(BotCommand::Optimize {
          campaign_id,
          live: false,
        }),
        Some(flag) if flag.eq_ignore_ascii_case("live") => Ok(BotCommand::Optimize {
          campaign_id,
          live: true,
        }),
        Some(other) => Err(BotCommand::Unknown(format!("unknown optimize mode {other:?}"))),
      }),
      "report" => numeric_id(arg1, "/report <campaign_id> [spreadsheet|document|json]").and_then(|campaign_id| {
        let format = match arg2 {
          None => ReportFormat::Spreadsheet,
          Some(raw) => raw.parse::<ReportFormat>().map_err(BotCommand::Unknown)?,
        };
        Ok(BotCommand::Report { campaign_id, format })
      }),
      other => Err(BotCommand::Unknown(format!("unknown command /{other}"))),
    };

    match parsed {
      Ok(cmd) => cmd,
      Err(unknown) => unknown,
    }
  }
}

pub fn help_text() -> String {
  [
    "🤖 <b>Ozon Ads bot</b>",
    "",
    "/status - connection status",
    "/campaigns - list campaigns",
    "/analyze &lt;id&gt; [days] - analyse a campaign",
    "/optimize &lt;id&gt; [live] - optimise a campaign (simulation unless live)",
    "/report &lt;id&gt; [spreadsheet|document|json] - generate a report",
    "/schedule - show scheduled jobs",
    "/alerts - alert thresholds and notification schedule",
    "/help - this message",
  ]
  .join("\n")
}
