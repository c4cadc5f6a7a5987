use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::automation::executor::{ActionEffect, ActionExecutor};
use crate::automation::matcher::{self, TaskEvent};
use crate::automation::rule::{AutomationRule, TriggerType};
use crate::automation::store::AutomationStore;
use crate::db::tasks;
use crate::errors::AppResult;
use crate::models::comment::Comment;
use crate::models::project::DONE_STATUS;
use crate::models::task::{Priority, Task};
use crate::notifications::NotificationSink;
use crate::utils::start_of_day;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Applied,
    Skipped { reason: String },
    Failed { error: String },
}

/// Result of one matching rule against one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub task_id: Uuid,
    pub trigger: TriggerType,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl RuleOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self.status, OutcomeStatus::Applied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    fn log(&self) {
        match &self.status {
            OutcomeStatus::Applied => tracing::info!(
                target: "automation",
                rule_id = %self.rule_id,
                rule = %self.rule_name,
                task_id = %self.task_id,
                trigger = %self.trigger,
                "rule applied"
            ),
            OutcomeStatus::Skipped { reason } => tracing::debug!(
                target: "automation",
                rule_id = %self.rule_id,
                task_id = %self.task_id,
                reason = %reason,
                "rule skipped"
            ),
            OutcomeStatus::Failed { error } => tracing::error!(
                target: "automation",
                rule_id = %self.rule_id,
                rule = %self.rule_name,
                task_id = %self.task_id,
                trigger = %self.trigger,
                error = %error,
                "rule failed"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Tasks due strictly before this instant were considered
    pub cutoff: DateTime<Utc>,
    pub tasks_scanned: usize,
    pub outcomes: Vec<RuleOutcome>,
}

impl SweepReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }
}

/// Matches task events against a project's active rules and runs their
/// actions.
///
/// Rules run one at a time in creation order. A rule whose action fails is
/// reported as failed and the remaining rules still run; the entry points
/// never return an error to the code that mutated the task.
#[derive(Clone)]
pub struct AutomationEngine {
    pool: SqlitePool,
    store: AutomationStore,
    executor: ActionExecutor,
}

impl AutomationEngine {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            store: AutomationStore::new(pool.clone()),
            executor: ActionExecutor::new(pool.clone(), notifier),
            pool,
        }
    }

    pub fn store(&self) -> &AutomationStore {
        &self.store
    }

    /// `task` carries the new status.
    pub async fn on_status_change(&self, task: &Task, previous_status: &str) -> Vec<RuleOutcome> {
        if task.status == previous_status {
            return Vec::new();
        }
        let event = TaskEvent::StatusChanged {
            previous: previous_status.to_string(),
            current: task.status.clone(),
        };
        self.dispatch(task, event).await
    }

    pub async fn on_assignment(&self, task: &Task) -> Vec<RuleOutcome> {
        if task.assignee.is_none() {
            return Vec::new();
        }
        self.dispatch(task, TaskEvent::Assigned { assignee: task.assignee }).await
    }

    pub async fn on_creation(&self, task: &Task) -> Vec<RuleOutcome> {
        self.dispatch(task, TaskEvent::Created).await
    }

    pub async fn on_comment(&self, task: &Task, comment: &Comment) -> Vec<RuleOutcome> {
        let event = TaskEvent::CommentAdded {
            author_id: comment.author_id,
            body: comment.body.clone(),
        };
        self.dispatch(task, event).await
    }

    pub async fn on_priority_change(&self, task: &Task, previous: Priority) -> Vec<RuleOutcome> {
        if task.priority == previous {
            return Vec::new();
        }
        let event = TaskEvent::PriorityChanged {
            previous,
            current: task.priority,
        };
        self.dispatch(task, event).await
    }

    /// Fires `due_date_passed` rules for every live task due before the start
    /// of `now`'s day (UTC) that is not in the done status.
    ///
    /// Firing is not deduplicated: a task that stays overdue fires again on
    /// every sweep.
    pub async fn sweep_due_passed(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let cutoff = start_of_day(now);
        let overdue = tasks::find_overdue(&self.pool, cutoff, DONE_STATUS).await?;

        let mut rules_by_project: HashMap<Uuid, Vec<AutomationRule>> = HashMap::new();
        let mut outcomes = Vec::new();

        for task in &overdue {
            let rules = match rules_by_project.entry(task.project_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let loaded = match self.store.list_active(task.project_id, TriggerType::DueDatePassed).await {
                        Ok(rules) => rules,
                        Err(err) => {
                            tracing::error!(
                                target: "automation",
                                project_id = %task.project_id,
                                error = %err,
                                "failed to load due-date rules"
                            );
                            Vec::new()
                        }
                    };
                    entry.insert(loaded)
                }
            };

            outcomes.extend(self.run_rules(rules, task, &TaskEvent::DueDatePassed).await);
        }

        let report = SweepReport {
            cutoff,
            tasks_scanned: overdue.len(),
            outcomes,
        };

        tracing::info!(
            target: "automation",
            cutoff = %report.cutoff,
            tasks = report.tasks_scanned,
            fired = report.outcomes.len(),
            failed = report.failures(),
            "due-date sweep finished"
        );

        Ok(report)
    }

    async fn dispatch(&self, task: &Task, event: TaskEvent) -> Vec<RuleOutcome> {
        let rules = match self.store.list_active(task.project_id, event.trigger_type()).await {
            Ok(rules) => rules,
            Err(err) => {
                tracing::error!(
                    target: "automation",
                    project_id = %task.project_id,
                    trigger = %event.trigger_type(),
                    error = %err,
                    "failed to load automation rules"
                );
                return Vec::new();
            }
        };

        self.run_rules(&rules, task, &event).await
    }

    async fn run_rules(&self, rules: &[AutomationRule], task: &Task, event: &TaskEvent) -> Vec<RuleOutcome> {
        // Later rules match against the task as earlier rules left it.
        let mut current = task.clone();
        let mut outcomes = Vec::new();

        for rule in rules {
            if !rule.active || !matcher::matches(&rule.trigger, event, &current) {
                continue;
            }

            let outcome = RuleOutcome {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                task_id: current.id,
                trigger: rule.trigger.trigger_type(),
                status: self.apply(rule, &mut current).await,
            };
            outcome.log();
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Runs a rule's actions in order; the first failing action ends the rule.
    async fn apply(&self, rule: &AutomationRule, task: &mut Task) -> OutcomeStatus {
        let mut applied = false;
        let mut skipped = Vec::new();

        for action in &rule.actions {
            match self.executor.execute(action, task).await {
                Ok(ActionEffect::Applied) => applied = true,
                Ok(ActionEffect::Skipped(reason)) => skipped.push(reason),
                Err(err) => {
                    return OutcomeStatus::Failed {
                        error: format!("{}: {err}", action.kind()),
                    }
                }
            }
        }

        if applied {
            OutcomeStatus::Applied
        } else {
            OutcomeStatus::Skipped {
                reason: skipped.join("; "),
            }
        }
    }
}
