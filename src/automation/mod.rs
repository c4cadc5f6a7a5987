//! Project automation rules.
//!
//! A rule pairs one trigger with an ordered list of actions. Task workflows
//! call into [`AutomationEngine`] after a mutation has been persisted; the
//! [`DueDateScheduler`] drives the daily overdue sweep.

pub mod engine;
pub mod executor;
pub mod matcher;
pub mod rule;
pub mod scheduler;
pub mod store;

pub use engine::{AutomationEngine, OutcomeStatus, RuleOutcome, SweepReport};
pub use matcher::TaskEvent;
pub use rule::{
    Action, AutomationCreateRequest, AutomationRule, AutomationUpdateRequest, Conditional, RuleDraft, Trigger,
    TriggerCondition, TriggerType, DEFAULT_NOTIFICATION_MESSAGE,
};
pub use scheduler::{DailySchedule, DueDateScheduler};
pub use store::AutomationStore;
