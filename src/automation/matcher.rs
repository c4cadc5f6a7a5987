use uuid::Uuid;

use crate::automation::rule::{Trigger, TriggerCondition, TriggerType};
use crate::models::task::{Priority, Task};

/// Something that happened to a task and may fire rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    StatusChanged { previous: String, current: String },
    Assigned { assignee: Option<Uuid> },
    Created,
    CommentAdded { author_id: Option<Uuid>, body: String },
    PriorityChanged { previous: Priority, current: Priority },
    DueDatePassed,
}

impl TaskEvent {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            TaskEvent::StatusChanged { .. } => TriggerType::TaskStatusChange,
            TaskEvent::Assigned { .. } => TriggerType::TaskAssignment,
            TaskEvent::Created => TriggerType::TaskCreation,
            TaskEvent::CommentAdded { .. } => TriggerType::CommentAdded,
            TaskEvent::PriorityChanged { .. } => TriggerType::PriorityChange,
            TaskEvent::DueDatePassed => TriggerType::DueDatePassed,
        }
    }
}

/// Whether `trigger` fires for `event` on `task`.
///
/// Absent and empty condition fields match anything. The optional
/// conditional is checked against the task's current state afterwards.
pub fn matches(trigger: &Trigger, event: &TaskEvent, task: &Task) -> bool {
    condition_matches(&trigger.condition, event, task)
        && trigger.conditional.as_ref().map_or(true, |conditional| conditional.evaluate(task))
}

fn condition_matches(condition: &TriggerCondition, event: &TaskEvent, task: &Task) -> bool {
    match condition {
        TriggerCondition::TaskStatusChange { from_status, to_status } => {
            let TaskEvent::StatusChanged { previous, current } = event else {
                return false;
            };
            text_matches(from_status.as_deref(), previous) && text_matches(to_status.as_deref(), current)
        }
        TriggerCondition::TaskAssignment { assignee_id } => {
            // Unassigning never counts as an assignment.
            let TaskEvent::Assigned { assignee: Some(assignee) } = event else {
                return false;
            };
            assignee_id.map_or(true, |wanted| wanted == *assignee)
        }
        TriggerCondition::DueDatePassed => matches!(event, TaskEvent::DueDatePassed),
        TriggerCondition::TaskCreation { assignee_id, tags } => {
            if !matches!(event, TaskEvent::Created) {
                return false;
            }
            assignee_id.map_or(true, |wanted| task.assignee == Some(wanted))
                && tags.iter().filter(|tag| !tag.is_empty()).all(|tag| task.has_tag(tag))
        }
        TriggerCondition::CommentAdded { author_id, contains } => {
            let TaskEvent::CommentAdded { author_id: author, body } = event else {
                return false;
            };
            let author_ok = author_id.map_or(true, |wanted| *author == Some(wanted));
            let body_ok = match contains.as_deref() {
                Some(needle) if !needle.is_empty() => body.to_lowercase().contains(&needle.to_lowercase()),
                _ => true,
            };
            author_ok && body_ok
        }
        TriggerCondition::PriorityChange { from_priority, to_priority } => {
            let TaskEvent::PriorityChanged { previous, current } = event else {
                return false;
            };
            from_priority.map_or(true, |p| p == *previous) && to_priority.map_or(true, |p| p == *current)
        }
    }
}

fn text_matches(expected: Option<&str>, actual: &str) -> bool {
    match expected {
        Some(expected) if !expected.is_empty() => expected == actual,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::rule::Conditional;
    use crate::utils::utc_now;

    fn task() -> Task {
        let now = utc_now();
        Task {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            title: "Write docs".to_string(),
            description: None,
            status: "Done".to_string(),
            priority: Priority::Medium,
            due_date: None,
            assignee: None,
            tags: vec!["docs".to_string()],
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    fn status_change(from: &str, to: &str) -> TaskEvent {
        TaskEvent::StatusChanged {
            previous: from.to_string(),
            current: to.to_string(),
        }
    }

    fn status_trigger(from: Option<&str>, to: Option<&str>) -> Trigger {
        Trigger::new(TriggerCondition::TaskStatusChange {
            from_status: from.map(str::to_string),
            to_status: to.map(str::to_string),
        })
    }

    #[test]
    fn to_status_only_matches_any_origin() {
        let trigger = status_trigger(None, Some("Done"));
        let task = task();

        assert!(matches(&trigger, &status_change("To Do", "Done"), &task));
        assert!(matches(&trigger, &status_change("In Progress", "Done"), &task));
        assert!(!matches(&trigger, &status_change("Done", "In Progress"), &task));
    }

    #[test]
    fn empty_strings_are_wildcards() {
        let trigger = status_trigger(Some(""), Some(""));
        assert!(matches(&trigger, &status_change("To Do", "In Progress"), &task()));
    }

    #[test]
    fn both_ends_must_match_when_given() {
        let trigger = status_trigger(Some("In Progress"), Some("Done"));
        let task = task();

        assert!(matches(&trigger, &status_change("In Progress", "Done"), &task));
        assert!(!matches(&trigger, &status_change("To Do", "Done"), &task));
    }

    #[test]
    fn event_of_another_type_never_matches() {
        let trigger = status_trigger(None, None);
        assert!(!matches(&trigger, &TaskEvent::Created, &task()));
        assert!(!matches(&trigger, &TaskEvent::DueDatePassed, &task()));
    }

    #[test]
    fn assignment_filters_on_assignee() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let trigger = Trigger::new(TriggerCondition::TaskAssignment { assignee_id: Some(alice) });
        let task = task();

        assert!(matches(&trigger, &TaskEvent::Assigned { assignee: Some(alice) }, &task));
        assert!(!matches(&trigger, &TaskEvent::Assigned { assignee: Some(bob) }, &task));

        let any = Trigger::new(TriggerCondition::TaskAssignment { assignee_id: None });
        assert!(!matches(&any, &TaskEvent::Assigned { assignee: None }, &task));
    }

    #[test]
    fn creation_requires_every_tag() {
        let trigger = Trigger::new(TriggerCondition::TaskCreation {
            assignee_id: None,
            tags: vec!["docs".to_string(), "urgent".to_string()],
        });
        let mut task = task();
        assert!(!matches(&trigger, &TaskEvent::Created, &task));

        task.tags.push("urgent".to_string());
        assert!(matches(&trigger, &TaskEvent::Created, &task));
    }

    #[test]
    fn comment_contains_is_case_insensitive() {
        let trigger = Trigger::new(TriggerCondition::CommentAdded {
            author_id: None,
            contains: Some("blocked".to_string()),
        });
        let event = TaskEvent::CommentAdded {
            author_id: Some(Uuid::new_v4()),
            body: "We are BLOCKED on review".to_string(),
        };
        assert!(matches(&trigger, &event, &task()));
    }

    #[test]
    fn priority_change_matches_direction() {
        let trigger = Trigger::new(TriggerCondition::PriorityChange {
            from_priority: None,
            to_priority: Some(Priority::Urgent),
        });
        let up = TaskEvent::PriorityChanged {
            previous: Priority::Low,
            current: Priority::Urgent,
        };
        let down = TaskEvent::PriorityChanged {
            previous: Priority::Urgent,
            current: Priority::Low,
        };

        assert!(matches(&trigger, &up, &task()));
        assert!(!matches(&trigger, &down, &task()));
    }

    #[test]
    fn conditional_gates_a_matching_condition() {
        let trigger = status_trigger(None, Some("Done"))
            .with_conditional(Conditional::All(vec![
                Conditional::HasTag("docs".to_string()),
                Conditional::Not(Box::new(Conditional::PriorityIs(Priority::Low))),
            ]));
        let mut task = task();

        assert!(matches(&trigger, &status_change("To Do", "Done"), &task));

        task.priority = Priority::Low;
        assert!(!matches(&trigger, &status_change("To Do", "Done"), &task));
    }
}
