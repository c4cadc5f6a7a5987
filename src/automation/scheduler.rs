use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::automation::engine::{AutomationEngine, SweepReport};
use crate::errors::{AppError, AppResult};
use crate::utils::utc_now;

pub const DUE_DATE_JOB: &str = "due_date_sweep";

/// Upper bound on a single sleep so clock jumps are noticed.
const MAX_SLEEP: Duration = Duration::from_secs(15 * 60);

/// A fixed UTC time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    pub fn midnight() -> Self {
        Self { at: NaiveTime::MIN }
    }

    /// Parses `HH:MM`.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M")
            .map(Self::new)
            .map_err(|err| AppError::configuration(format!("invalid schedule time '{value}': {err}")))
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    pub fn occurrence_on(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(self.at).and_utc()
    }

    /// First occurrence strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.occurrence_on(now.date_naive());
        if today > now {
            return today;
        }
        let tomorrow = now.date_naive().checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
        self.occurrence_on(tomorrow)
    }

    /// Today's occurrence has passed and no run was recorded for today.
    /// Covers the catch-up case where the process was down at the scheduled time.
    pub fn is_due(&self, now: DateTime<Utc>, last_run: Option<NaiveDate>) -> bool {
        let today = now.date_naive();
        now >= self.occurrence_on(today) && last_run.map_or(true, |date| date < today)
    }
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self::midnight()
    }
}

pub async fn last_run_date(pool: &SqlitePool, job: &str) -> AppResult<Option<NaiveDate>> {
    let raw: Option<String> = sqlx::query_scalar("SELECT last_run_date FROM sweep_runs WHERE job = ?")
        .bind(job)
        .fetch_optional(pool)
        .await?;

    raw.map(|value| {
        NaiveDate::parse_from_str(&value, "%Y-%m-%d")
            .map_err(|err| AppError::internal(format!("invalid last_run_date '{value}': {err}")))
    })
    .transpose()
}

pub async fn record_run(pool: &SqlitePool, job: &str, date: NaiveDate, completed_at: DateTime<Utc>) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO sweep_runs (job, last_run_date, completed_at) VALUES (?, ?, ?) \
         ON CONFLICT (job) DO UPDATE SET last_run_date = excluded.last_run_date, completed_at = excluded.completed_at",
    )
    .bind(job)
    .bind(date.format("%Y-%m-%d").to_string())
    .bind(completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Runs the due-date sweep once per day at the configured time.
///
/// A run that was missed while the process was down happens right after
/// startup. A failed run is logged and not retried until the next day.
#[derive(Clone)]
pub struct DueDateScheduler {
    pool: SqlitePool,
    engine: AutomationEngine,
    schedule: DailySchedule,
}

impl DueDateScheduler {
    pub fn new(pool: SqlitePool, engine: AutomationEngine, schedule: DailySchedule) -> Self {
        Self { pool, engine, schedule }
    }

    /// Sweeps if today's run is due, recording it on success.
    pub async fn run_if_due(&self, now: DateTime<Utc>) -> AppResult<Option<SweepReport>> {
        let last_run = last_run_date(&self.pool, DUE_DATE_JOB).await?;
        if !self.schedule.is_due(now, last_run) {
            return Ok(None);
        }

        let report = self.engine.sweep_due_passed(now).await?;
        record_run(&self.pool, DUE_DATE_JOB, now.date_naive(), utc_now()).await?;

        Ok(Some(report))
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(at = %self.schedule.at(), "due-date scheduler started");
        let mut failed_on: Option<NaiveDate> = None;

        loop {
            let now = utc_now();
            if failed_on != Some(now.date_naive()) {
                match self.run_if_due(now).await {
                    Ok(Some(report)) => tracing::info!(
                        tasks = report.tasks_scanned,
                        fired = report.outcomes.len(),
                        "scheduled due-date sweep completed"
                    ),
                    Ok(None) => {}
                    Err(err) => {
                        tracing::error!(error = %err, "scheduled due-date sweep failed");
                        failed_on = Some(now.date_naive());
                    }
                }
            }

            let now = utc_now();
            let wait = (self.schedule.next_after(now) - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(MAX_SLEEP);

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("due-date scheduler stopped");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn parses_hour_and_minute() {
        let schedule = DailySchedule::parse("02:30").unwrap();
        assert_eq!(schedule.at(), NaiveTime::from_hms_opt(2, 30, 0).unwrap());
        assert!(DailySchedule::parse("25:00").is_err());
        assert!(DailySchedule::parse("noon").is_err());
    }

    #[test]
    fn next_after_rolls_to_tomorrow_once_passed() {
        let schedule = DailySchedule::parse("06:00").unwrap();
        assert_eq!(schedule.next_after(at(5, 0)), at(6, 0));
        assert_eq!(
            schedule.next_after(at(6, 0)),
            Utc.with_ymd_and_hms(2025, 3, 11, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn due_once_per_day_after_the_scheduled_time() {
        let schedule = DailySchedule::parse("06:00").unwrap();
        let today = at(0, 0).date_naive();
        let yesterday = today.pred_opt().unwrap();

        assert!(!schedule.is_due(at(5, 59), None));
        assert!(schedule.is_due(at(6, 0), None));
        assert!(schedule.is_due(at(23, 0), Some(yesterday)));
        assert!(!schedule.is_due(at(23, 0), Some(today)));
    }

    #[test]
    fn midnight_schedule_catches_up_on_first_start() {
        assert!(DailySchedule::midnight().is_due(at(0, 0), None));
    }
}
