//! Core types for the taskwheel engines.

use serde::{Deserialize, Serialize};

/// Task workflow status. A small closed set, not freely extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// Recurrence pattern for a template task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// Monday through Friday, skipping weekends.
    Weekdays,
    /// No richer grammar is defined; treated as an interval-in-days rule.
    Custom,
}

impl RecurrencePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::Monthly => "monthly",
            RecurrencePattern::Yearly => "yearly",
            RecurrencePattern::Weekdays => "weekdays",
            RecurrencePattern::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(RecurrencePattern::Daily),
            "weekly" => Some(RecurrencePattern::Weekly),
            "monthly" => Some(RecurrencePattern::Monthly),
            "yearly" => Some(RecurrencePattern::Yearly),
            "weekdays" => Some(RecurrencePattern::Weekdays),
            "custom" => Some(RecurrencePattern::Custom),
            _ => None,
        }
    }
}

/// A task record.
///
/// A task with `is_recurring` and no `recurrence_parent_id` is a recurring
/// template; one with a `recurrence_parent_id` is a generated instance.
/// Instances never generate further instances themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Owning user (creator). All engine operations are scoped to the owner.
    pub user_id: String,
    pub assigned_to: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub estimated_hours: Option<f64>,
    pub project_id: Option<String>,
    pub category_id: Option<String>,
    pub due_date: Option<i64>,
    pub start_date: Option<i64>,
    /// Non-null exactly when status is Done.
    pub completed_at: Option<i64>,
    pub parent_task_id: Option<String>,
    /// Manual ordering among siblings.
    pub position: i64,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_interval: Option<u32>,
    /// Days of week for Weekly patterns, 0 = Monday .. 6 = Sunday.
    pub recurrence_days_of_week: Vec<u8>,
    pub recurrence_day_of_month: Option<u32>,
    pub recurrence_month_of_year: Option<u32>,
    /// Generation cutoff. Setting it to "now" pauses the template.
    pub recurrence_end_date: Option<i64>,
    /// Cap on the number of generated instances.
    pub recurrence_count: Option<u32>,
    /// Lifetime count of generated instances. Retention cleanup deletes rows
    /// but never decrements this, so the cap is a lifetime cap.
    pub recurrence_generated_count: u32,
    /// Due date of the most recently generated instance. Anchors the next
    /// occurrence even after cleanup removes the row itself.
    pub recurrence_last_due: Option<i64>,
    /// Back-reference from a generated instance to its template.
    pub recurrence_parent_id: Option<String>,
    /// Set by instance cleanup instead of deleting tasks with user history.
    pub archived: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// True for a recurring template (as opposed to a generated instance).
    pub fn is_recurring_template(&self) -> bool {
        self.is_recurring && self.recurrence_parent_id.is_none()
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
    pub estimated_hours: Option<f64>,
    pub project_id: Option<String>,
    pub category_id: Option<String>,
    pub due_date: Option<i64>,
    pub start_date: Option<i64>,
    pub parent_task_id: Option<String>,
    pub position: Option<i64>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_interval: Option<u32>,
    pub recurrence_days_of_week: Vec<u8>,
    pub recurrence_day_of_month: Option<u32>,
    pub recurrence_month_of_year: Option<u32>,
    pub recurrence_end_date: Option<i64>,
    pub recurrence_count: Option<u32>,
}

/// Whitelisted field update for a task. Absent fields are left untouched;
/// double-Option fields distinguish "leave alone" from "set to null".
/// Parent changes go through `update_task_parent`, not this patch.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Option<String>>,
    pub estimated_hours: Option<Option<f64>>,
    pub due_date: Option<Option<i64>>,
    pub start_date: Option<Option<i64>>,
    pub position: Option<i64>,
}

/// A directed dependency edge: `task_id` depends on `depends_on_id`.
/// The task is blocked from completing while the depends-on task is not Done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    pub task_id: String,
    pub depends_on_id: String,
    pub created_at: i64,
}

/// Outcome of a completed-instance cleanup pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub archived: usize,
    pub deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_form() {
        for status in [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("cancelled"), None);
    }

    #[test]
    fn pattern_round_trips_through_wire_form() {
        for pattern in [
            RecurrencePattern::Daily,
            RecurrencePattern::Weekly,
            RecurrencePattern::Monthly,
            RecurrencePattern::Yearly,
            RecurrencePattern::Weekdays,
            RecurrencePattern::Custom,
        ] {
            assert_eq!(RecurrencePattern::parse(pattern.as_str()), Some(pattern));
        }
    }
}
