use std::fmt::Display;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{Datelike, Duration, Local, NaiveDateTime, NaiveTime, Weekday};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
  DailyAnalysis,
  WeeklyReport,
  Monitoring,
  Optimization,
}

impl JobKind {
  pub const ALL: [JobKind; 4] = [
    JobKind::DailyAnalysis,
    JobKind::WeeklyReport,
    JobKind::Monitoring,
    JobKind::Optimization,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      JobKind::DailyAnalysis => "daily_analysis",
      JobKind::WeeklyReport => "weekly_report",
      JobKind::Monitoring => "monitoring",
      JobKind::Optimization => "optimization",
    }
  }

  /// How many campaigns one run covers; `None` means all.
  pub fn campaign_limit(&self) -> Option<usize> {
    match self {
      JobKind::DailyAnalysis => Some(5),
      JobKind::WeeklyReport => Some(3),
      JobKind::Monitoring => None,
      JobKind::Optimization => Some(2),
    }
  }

  pub fn window_days(&self) -> i64 {
    match self {
      JobKind::DailyAnalysis | JobKind::WeeklyReport => 7,
      JobKind::Monitoring => 1,
      JobKind::Optimization => 3,
    }
  }
}

impl Display for JobKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for JobKind {
  type Err = String;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
    JobKind::ALL
      .into_iter()
      .find(|k| k.as_str() == normalized)
      .ok_or_else(|| format!("unknown job {raw:?}"))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  Daily { at: NaiveTime },
  Weekly { weekday: Weekday, at: NaiveTime },
  Interval { every: Duration },
}

impl Display for Trigger {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Trigger::Daily { at } => write!(f, "daily at {}", at.format("%H:%M")),
      Trigger::Weekly { weekday, at } => write!(f, "every {weekday} at {}", at.format("%H:%M")),
      Trigger::Interval { every } => write!(f, "every {} min", every.num_minutes()),
    }
  }
}

/// Next instant strictly after `now` at which `trigger` fires.
///
/// Interval triggers count from the last run, or from `now` if the job never ran.
pub fn next_fire(trigger: &Trigger, now: NaiveDateTime, last_run: Option<NaiveDateTime>) -> NaiveDateTime {
  match *trigger {
    Trigger::Daily { at } => {
      let today = now.date().and_time(at);
      if today > now {
        today
      } else {
        today + Duration::days(1)
      }
    }
    Trigger::Weekly { weekday, at } => {
      let ahead = (7 + weekday.num_days_from_monday() as i64 - now.weekday().num_days_from_monday() as i64) % 7;
      let candidate = (now.date() + Duration::days(ahead)).and_time(at);
      if candidate > now {
        candidate
      } else {
        candidate + Duration::days(7)
      }
    }
    Trigger::Interval { every } => {
      let next = last_run.unwrap_or(now) + every;
      if next > now {
        next
      } else {
        now + every
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledJob {
  pub kind: JobKind,
  pub trigger: Trigger,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
  NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

pub fn default_jobs(auto_optimization_enabled: bool) -> Vec<ScheduledJob> {
  let mut jobs = vec![
    ScheduledJob {
      kind: JobKind::DailyAnalysis,
      trigger: Trigger::Daily { at: hm(9, 0) },
    },
    ScheduledJob {
      kind: JobKind::WeeklyReport,
      trigger: Trigger::Weekly {
        weekday: Weekday::Mon,
        at: hm(10, 0),
      },
    },
    ScheduledJob {
      kind: JobKind::Monitoring,
      trigger: Trigger::Interval { every: Duration::hours(1) },
    },
  ];
  if auto_optimization_enabled {
    jobs.push(ScheduledJob {
      kind: JobKind::Optimization,
      trigger: Trigger::Daily { at: hm(11, 0) },
    });
  }
  jobs
}

/// Jobs with their next fire time, soonest first.
pub fn upcoming(jobs: &[ScheduledJob], now: NaiveDateTime) -> Vec<(ScheduledJob, NaiveDateTime)> {
  let mut out: Vec<_> = jobs.iter().map(|j| (*j, next_fire(&j.trigger, now, None))).collect();
  out.sort_by_key(|(_, at)| *at);
  out
}

struct Slot {
  job: ScheduledJob,
  next: NaiveDateTime,
}

pub struct Scheduler {
  slots: Vec<Slot>,
}

impl Scheduler {
  pub fn new(jobs: Vec<ScheduledJob>, now: NaiveDateTime) -> Self {
    Self {
      slots: jobs
        .into_iter()
        .map(|job| Slot {
          next: next_fire(&job.trigger, now, None),
          job,
        })
        .collect(),
    }
  }

  fn earliest(&self) -> Option<usize> {
    self
      .slots
      .iter()
      .enumerate()
      .min_by_key(|(_, s)| s.next)
      .map(|(i, _)| i)
  }

  /// Runs due jobs one at a time until `shutdown` resolves. Job failures are logged and the loop continues.
  pub async fn run<F, Fut, T, E>(mut self, mut run_job: F, shutdown: impl Future<Output = ()>)
  where
    F: FnMut(JobKind) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
  {
    tokio::pin!(shutdown);
    for s in &self.slots {
      info!(job = %s.job.kind, trigger = %s.job.trigger, next = %s.next, "job scheduled");
    }

    loop {
      let Some(idx) = self.earliest() else {
        info!("no jobs scheduled; scheduler exiting");
        return;
      };
      let wait = (self.slots[idx].next - Local::now().naive_local())
        .to_std()
        .unwrap_or(StdDuration::ZERO);

      tokio::select! {
        _ = &mut shutdown => {
          info!("scheduler stopping");
          return;
        }
        _ = tokio::time::sleep(wait) => {}
      }

      let kind = self.slots[idx].job.kind;
      info!(job = %kind, "running scheduled job");
      match run_job(kind).await {
        Ok(_) => info!(job = %kind, "scheduled job finished"),
        Err(e) => error!(job = %kind, error = %e, "scheduled job failed"),
      }

      let finished = Local::now().naive_local();
      let slot = &mut self.slots[idx];
      slot.next = next_fire(&slot.job.trigger, finished, Some(finished));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::NaiveDate;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
  }

  #[test]
  fn daily_fires_today_or_tomorrow() {
    let trigger = Trigger::Daily { at: hm(9, 0) };
    // 2026-05-06 is a Wednesday.
    assert_eq!(next_fire(&trigger, dt(2026, 5, 6, 8, 59), None), dt(2026, 5, 6, 9, 0));
    assert_eq!(next_fire(&trigger, dt(2026, 5, 6, 9, 0), None), dt(2026, 5, 7, 9, 0));
    assert_eq!(next_fire(&trigger, dt(2026, 12, 31, 23, 0), None), dt(2027, 1, 1, 9, 0));
  }

  #[test]
  fn weekly_fires_next_monday() {
    let trigger = Trigger::Weekly {
      weekday: Weekday::Mon,
      at: hm(10, 0),
    };
    assert_eq!(next_fire(&trigger, dt(2026, 5, 6, 12, 0), None), dt(2026, 5, 11, 10, 0));
    assert_eq!(next_fire(&trigger, dt(2026, 5, 11, 9, 0), None), dt(2026, 5, 11, 10, 0));
    assert_eq!(next_fire(&trigger, dt(2026, 5, 11, 10, 0), None), dt(2026, 5, 18, 10, 0));
  }

  #[test]
  fn interval_counts_from_last_run() {
    let trigger = Trigger::Interval { every: Duration::hours(1) };
    let now = dt(2026, 5, 6, 12, 0);
    assert_eq!(next_fire(&trigger, now, None), dt(2026, 5, 6, 13, 0));
    assert_eq!(next_fire(&trigger, now, Some(dt(2026, 5, 6, 11, 30))), dt(2026, 5, 6, 12, 30));
    // Overdue runs are not replayed.
    assert_eq!(next_fire(&trigger, now, Some(dt(2026, 5, 6, 8, 0))), dt(2026, 5, 6, 13, 0));
  }

  #[test]
  fn optimization_job_only_when_enabled() {
    assert_eq!(default_jobs(false).len(), 3);
    let jobs = default_jobs(true);
    assert_eq!(jobs.len(), 4);
    assert_eq!(jobs[3].kind, JobKind::Optimization);
    assert_eq!(jobs[3].trigger, Trigger::Daily { at: hm(11, 0) });
  }

  #[test]
  fn upcoming_is_sorted() {
    let list = upcoming(&default_jobs(true), dt(2026, 5, 6, 9, 30));
    let kinds: Vec<JobKind> = list.iter().map(|(j, _)| j.kind).collect();
    assert_eq!(
      kinds,
      vec![
        JobKind::Monitoring,
        JobKind::Optimization,
        JobKind::DailyAnalysis,
        JobKind::WeeklyReport
      ]
    );
  }

  #[test]
  fn job_kind_round_trips_through_names() {
    for kind in JobKind::ALL {
      assert_eq!(kind.as_str().parse::<JobKind>(), Ok(kind));
    }
    assert_eq!("weekly-report".parse::<JobKind>(), Ok(JobKind::WeeklyReport));
    assert!("hourly".parse::<JobKind>().is_err());
    assert_eq!(JobKind::Monitoring.campaign_limit(), None);
    assert_eq!(JobKind::Optimization.window_days(), 3);
  }

  #[tokio::test]
  async fn loop_survives_failures_and_stops_on_shutdown() {
    let jobs = vec![ScheduledJob {
      kind: JobKind::Monitoring,
      trigger: Trigger::Interval {
        every: Duration::milliseconds(10),
      },
    }];
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let watcher = runs.clone();

    let scheduler = Scheduler::new(jobs, Local::now().naive_local());
    scheduler
      .run(
        move |kind| {
          let counter = counter.clone();
          async move {
            assert_eq!(kind, JobKind::Monitoring);
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
              Err("first run fails".to_string())
            } else {
              Ok(())
            }
          }
        },
        async move {
          while watcher.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(StdDuration::from_millis(5)).await;
          }
        },
      )
      .await;

    assert!(runs.load(Ordering::SeqCst) >= 3);
  }
}
