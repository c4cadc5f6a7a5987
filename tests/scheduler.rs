mod common;

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

use taskboard::automation::scheduler::{last_run_date, DUE_DATE_JOB};
use taskboard::automation::{AutomationEngine, DailySchedule, DueDateScheduler};

use common::{recording, seed_project, seed_rule, seed_task, seed_user, setup_db, TaskSeed};

#[tokio::test]
async fn catch_up_sweep_runs_once_per_day() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    seed_rule(
        &db.pool,
        &project,
        "Overdue label",
        json!({ "type": "due_date_passed" }),
        json!([{ "type": "apply_label", "params": { "label": "overdue" } }]),
    )
    .await?;

    let now = Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).single().expect("valid date");
    seed_task(
        &db.pool,
        &project,
        TaskSeed { due_date: Some(now - Duration::days(2)), ..Default::default() },
    )
    .await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    let schedule = DailySchedule::parse("06:00")?;
    let scheduler = DueDateScheduler::new(db.pool.clone(), engine, schedule);

    // Before today's slot with no previous run: nothing to catch up.
    assert!(scheduler.run_if_due(now - Duration::hours(10)).await?.is_none());
    assert_eq!(last_run_date(&db.pool, DUE_DATE_JOB).await?, None);

    let report = scheduler.run_if_due(now).await?.expect("sweep should run");
    assert_eq!(report.tasks_scanned, 1);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(last_run_date(&db.pool, DUE_DATE_JOB).await?, Some(now.date_naive()));

    assert!(scheduler.run_if_due(now + Duration::hours(1)).await?.is_none());

    let tomorrow = now + Duration::days(1);
    let report = scheduler.run_if_due(tomorrow).await?.expect("next day's sweep");
    assert_eq!(report.tasks_scanned, 1);
    // The label is already present, so the rule reports a skip.
    assert!(!report.outcomes[0].is_applied());
    assert_eq!(last_run_date(&db.pool, DUE_DATE_JOB).await?, Some(tomorrow.date_naive()));

    Ok(())
}
