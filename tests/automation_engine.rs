mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;

use taskboard::automation::{AutomationEngine, OutcomeStatus};
use taskboard::db::{comments, projects, tasks, users};
use taskboard::models::task::Priority;
use taskboard::utils::utc_now;

use common::{
    insert_raw_rule, recording, seed_project, seed_rule, seed_task, seed_user, setup_db, FailingSink, TaskSeed,
};

fn badge_on_done() -> (serde_json::Value, serde_json::Value) {
    (
        json!({ "type": "task_status_change", "condition": { "to_status": "Done" } }),
        json!([{ "type": "assign_badge", "params": { "badge_name": "Finisher" } }]),
    )
}

#[tokio::test]
async fn moving_to_done_awards_badge_once() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let worker = seed_user(&db.pool, "Worker").await?;
    let project = seed_project(&db.pool, owner).await?;
    let (trigger, actions) = badge_on_done();
    seed_rule(&db.pool, &project, "Finisher badge", trigger, actions).await?;

    let sink = recording();
    let engine = AutomationEngine::new(db.pool.clone(), sink.clone());

    let mut task = seed_task(&db.pool, &project, TaskSeed { assignee: Some(worker), ..Default::default() }).await?;
    tasks::set_status(&db.pool, task.id, "Done", utc_now()).await?;
    task.status = "Done".to_string();

    let outcomes = engine.on_status_change(&task, "To Do").await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, OutcomeStatus::Applied);

    let badges = users::list_badges(&db.pool, worker).await?;
    assert_eq!(badges.len(), 1);
    assert_eq!(badges[0].name, "Finisher");
    assert_eq!(sink.messages(), vec!["You earned the \"Finisher\" badge!".to_string()]);

    // A second task reaching Done finds the badge already held.
    let mut second = seed_task(&db.pool, &project, TaskSeed { assignee: Some(worker), ..Default::default() }).await?;
    tasks::set_status(&db.pool, second.id, "Done", utc_now()).await?;
    second.status = "Done".to_string();

    let outcomes = engine.on_status_change(&second, "In Progress").await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0].status, OutcomeStatus::Skipped { ref reason } if reason.contains("already held")));
    assert_eq!(users::list_badges(&db.pool, worker).await?.len(), 1);
    assert_eq!(sink.messages().len(), 1);

    Ok(())
}

#[tokio::test]
async fn unchanged_status_fires_nothing() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    let (trigger, actions) = badge_on_done();
    seed_rule(&db.pool, &project, "Finisher badge", trigger, actions).await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    let task = seed_task(&db.pool, &project, TaskSeed { status: "Done", assignee: Some(owner), ..Default::default() }).await?;

    assert!(engine.on_status_change(&task, "Done").await.is_empty());
    assert!(users::list_badges(&db.pool, owner).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn badge_without_assignee_is_skipped() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    let (trigger, actions) = badge_on_done();
    seed_rule(&db.pool, &project, "Finisher badge", trigger, actions).await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    let task = seed_task(&db.pool, &project, TaskSeed { status: "Done", ..Default::default() }).await?;

    let outcomes = engine.on_status_change(&task, "To Do").await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0].status, OutcomeStatus::Skipped { .. }));

    Ok(())
}

#[tokio::test]
async fn from_status_filter_must_match_previous_status() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    seed_rule(
        &db.pool,
        &project,
        "Review finished",
        json!({ "type": "task_status_change", "condition": { "from_status": "In Progress", "to_status": "Done" } }),
        json!([{ "type": "add_comment", "params": { "text": "Closed after review" } }]),
    )
    .await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    let task = seed_task(&db.pool, &project, TaskSeed { status: "Done", ..Default::default() }).await?;

    assert!(engine.on_status_change(&task, "To Do").await.is_empty());

    let outcomes = engine.on_status_change(&task, "In Progress").await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_applied());

    let posted = comments::list_for_task(&db.pool, task.id).await?;
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].author_id, None);
    assert_eq!(posted[0].body, "Closed after review");

    Ok(())
}

#[tokio::test]
async fn sweep_fires_for_overdue_tasks_on_every_run() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    seed_rule(
        &db.pool,
        &project,
        "Overdue ping",
        json!({ "type": "due_date_passed" }),
        json!([{ "type": "send_notification", "params": { "message": "Your task is overdue" } }]),
    )
    .await?;

    let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).single().expect("valid date");
    let yesterday = now - ChronoDuration::days(1);

    let overdue = seed_task(
        &db.pool,
        &project,
        TaskSeed { assignee: Some(owner), due_date: Some(yesterday), ..Default::default() },
    )
    .await?;
    // Due earlier today: not overdue until tomorrow's sweep.
    seed_task(
        &db.pool,
        &project,
        TaskSeed { assignee: Some(owner), due_date: Some(now - ChronoDuration::hours(2)), ..Default::default() },
    )
    .await?;
    // Finished tasks are never swept.
    seed_task(
        &db.pool,
        &project,
        TaskSeed { status: "Done", assignee: Some(owner), due_date: Some(yesterday), ..Default::default() },
    )
    .await?;

    let sink = recording();
    let engine = AutomationEngine::new(db.pool.clone(), sink.clone());

    let first = engine.sweep_due_passed(now).await?;
    assert_eq!(first.tasks_scanned, 1);
    assert_eq!(first.outcomes.len(), 1);
    assert_eq!(first.outcomes[0].task_id, overdue.id);
    assert!(first.outcomes[0].is_applied());
    assert_eq!(first.failures(), 0);

    let second = engine.sweep_due_passed(now + ChronoDuration::days(1)).await?;
    assert_eq!(second.tasks_scanned, 2);
    assert_eq!(second.outcomes.len(), 2);

    assert_eq!(sink.messages().len(), 3);
    assert!(sink.messages().iter().all(|m| m == "Your task is overdue"));

    Ok(())
}

#[tokio::test]
async fn sweep_ignores_deleted_projects() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    seed_rule(
        &db.pool,
        &project,
        "Overdue ping",
        json!({ "type": "due_date_passed" }),
        json!([{ "type": "send_notification" }]),
    )
    .await?;

    let now = utc_now();
    seed_task(
        &db.pool,
        &project,
        TaskSeed { assignee: Some(owner), due_date: Some(now - ChronoDuration::days(3)), ..Default::default() },
    )
    .await?;
    projects::soft_delete_project(&db.pool, project.id, now).await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    let report = engine.sweep_due_passed(now).await?;
    assert_eq!(report.tasks_scanned, 0);
    assert!(report.outcomes.is_empty());

    Ok(())
}

#[tokio::test]
async fn status_outside_project_list_is_still_written() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    insert_raw_rule(
        &db.pool,
        project.id,
        "task_creation",
        json!({ "type": "task_creation" }),
        json!([{ "type": "change_status", "params": { "status": "Archived" } }]),
    )
    .await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    let task = seed_task(&db.pool, &project, TaskSeed::default()).await?;

    let outcomes = engine.on_creation(&task).await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_applied());

    let stored = tasks::fetch_task(&db.pool, project.id, task.id).await?;
    assert_eq!(stored.status, "Archived");

    Ok(())
}

#[tokio::test]
async fn inactive_rules_never_fire() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    let (trigger, actions) = badge_on_done();
    let rule = seed_rule(&db.pool, &project, "Finisher badge", trigger, actions).await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    engine.store().set_active(project.id, rule.id, false, utc_now()).await?;

    let task = seed_task(&db.pool, &project, TaskSeed { status: "Done", assignee: Some(owner), ..Default::default() }).await?;
    assert!(engine.on_status_change(&task, "To Do").await.is_empty());
    assert!(users::list_badges(&db.pool, owner).await?.is_empty());

    engine.store().set_active(project.id, rule.id, true, utc_now()).await?;
    assert_eq!(engine.on_status_change(&task, "To Do").await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn failing_rule_does_not_stop_sibling_rules() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let worker = seed_user(&db.pool, "Worker").await?;
    let project = seed_project(&db.pool, owner).await?;
    seed_rule(
        &db.pool,
        &project,
        "Notify then label",
        json!({ "type": "task_assignment" }),
        json!([
            { "type": "send_notification" },
            { "type": "apply_label", "params": { "label": "never-applied" } }
        ]),
    )
    .await?;
    tokio::time::sleep(Duration::from_millis(2)).await;
    seed_rule(
        &db.pool,
        &project,
        "Label assigned",
        json!({ "type": "task_assignment" }),
        json!([{ "type": "apply_label", "params": { "label": "assigned" } }]),
    )
    .await?;

    let engine = AutomationEngine::new(db.pool.clone(), Arc::new(FailingSink));
    let task = seed_task(&db.pool, &project, TaskSeed { assignee: Some(worker), ..Default::default() }).await?;

    let outcomes = engine.on_assignment(&task).await;
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(
        outcomes[0].status,
        OutcomeStatus::Failed { ref error } if error.starts_with("send_notification")
    ));
    assert!(outcomes[1].is_applied());

    let stored = tasks::fetch_task(&db.pool, project.id, task.id).await?;
    assert_eq!(stored.tags, vec!["assigned".to_string()]);

    Ok(())
}

#[tokio::test]
async fn unknown_action_type_is_skipped_with_warning() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    insert_raw_rule(
        &db.pool,
        project.id,
        "task_creation",
        json!({ "type": "task_creation" }),
        json!([{ "type": "send_webhook", "params": { "url": "https://example.com/hook" } }]),
    )
    .await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    let task = seed_task(&db.pool, &project, TaskSeed::default()).await?;

    let outcomes = engine.on_creation(&task).await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0].status,
        OutcomeStatus::Skipped { ref reason } if reason.contains("send_webhook")
    ));

    Ok(())
}

#[tokio::test]
async fn undecodable_rule_does_not_block_others() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    insert_raw_rule(
        &db.pool,
        project.id,
        "task_creation",
        json!({ "type": "task_creation" }),
        json!([{ "type": "change_priority", "params": { "priority": "critical" } }]),
    )
    .await?;
    seed_rule(
        &db.pool,
        &project,
        "Tag new work",
        json!({ "type": "task_creation" }),
        json!([{ "type": "apply_label", "params": { "label": "triage" } }]),
    )
    .await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    let task = seed_task(&db.pool, &project, TaskSeed::default()).await?;

    let outcomes = engine.on_creation(&task).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].rule_name, "Tag new work");

    Ok(())
}

#[tokio::test]
async fn creation_rule_requires_every_tag() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    seed_rule(
        &db.pool,
        &project,
        "Urgent bugs",
        json!({ "type": "task_creation", "condition": { "tags": ["bug", "urgent"] } }),
        json!([{ "type": "change_priority", "params": { "priority": "high" } }]),
    )
    .await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());

    let partial = seed_task(&db.pool, &project, TaskSeed { tags: vec!["bug".into()], ..Default::default() }).await?;
    assert!(engine.on_creation(&partial).await.is_empty());

    let full = seed_task(
        &db.pool,
        &project,
        TaskSeed { tags: vec!["urgent".into(), "bug".into(), "ui".into()], ..Default::default() },
    )
    .await?;
    let outcomes = engine.on_creation(&full).await;
    assert_eq!(outcomes.len(), 1);

    let stored = tasks::fetch_task(&db.pool, project.id, full.id).await?;
    assert_eq!(stored.priority, Priority::High);

    Ok(())
}

#[tokio::test]
async fn comment_rule_matches_text_case_insensitively() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    seed_rule(
        &db.pool,
        &project,
        "Blocked label",
        json!({ "type": "comment_added", "condition": { "contains": "blocked" } }),
        json!([{ "type": "apply_label", "params": { "label": "blocked" } }]),
    )
    .await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    let task = seed_task(&db.pool, &project, TaskSeed::default()).await?;

    let chatter = comments::insert_comment(&db.pool, task.id, Some(owner), "Looks good", utc_now()).await?;
    assert!(engine.on_comment(&task, &chatter).await.is_empty());

    let blocker = comments::insert_comment(&db.pool, task.id, Some(owner), "BLOCKED on API keys", utc_now()).await?;
    let outcomes = engine.on_comment(&task, &blocker).await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_applied());

    Ok(())
}

#[tokio::test]
async fn later_rules_see_earlier_rule_effects() -> Result<()> {
    let db = setup_db().await?;
    let owner = seed_user(&db.pool, "Owner").await?;
    let project = seed_project(&db.pool, owner).await?;
    seed_rule(
        &db.pool,
        &project,
        "Escalate",
        json!({ "type": "priority_change", "condition": { "to_priority": "medium" } }),
        json!([{ "type": "apply_label", "params": { "label": "escalated" } }]),
    )
    .await?;
    tokio::time::sleep(Duration::from_millis(2)).await;
    seed_rule(
        &db.pool,
        &project,
        "Page on escalation",
        json!({
            "type": "priority_change",
            "conditional": { "has_tag": "escalated" }
        }),
        json!([{ "type": "add_comment", "params": { "text": "Escalated" } }]),
    )
    .await?;

    let engine = AutomationEngine::new(db.pool.clone(), recording());
    let task = seed_task(&db.pool, &project, TaskSeed::default()).await?;

    let outcomes = engine.on_priority_change(&task, Priority::Low).await;
    let names: Vec<&str> = outcomes.iter().map(|o| o.rule_name.as_str()).collect();
    assert_eq!(names, vec!["Escalate", "Page on escalation"]);
    assert!(outcomes.iter().all(|o| o.is_applied()));

    assert!(engine.on_priority_change(&task, Priority::Medium).await.is_empty());

    Ok(())
}
