//! Recurring-task templates: instance generation, pause/resume, retention.
//!
//! All decision logic takes an explicit `now` so the scheduler's clock can be
//! simulated in tests; the public wrappers use the wall clock.

use super::history::has_user_history;
use super::tasks::{get_task_internal, insert_task, next_position};
use super::{now_ms, Database};
use crate::error::{EngineError, EngineResult};
use crate::recurrence::{next_occurrence, RecurrenceRule};
use crate::types::{CleanupSummary, Task, TaskStatus};
use chrono::DateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

impl Database {
    /// Whether the template is due to spawn its next occurrence.
    pub fn should_create_next_instance(&self, task_id: &str) -> EngineResult<bool> {
        self.should_create_next_instance_at(task_id, now_ms())
    }

    /// Clock-injected variant of [`Database::should_create_next_instance`].
    pub fn should_create_next_instance_at(&self, task_id: &str, now: i64) -> EngineResult<bool> {
        self.with_conn(|conn| {
            let template = get_task_internal(conn, task_id)?
                .ok_or_else(|| EngineError::task_not_found(task_id))?;
            should_generate(conn, &template, now).map(|due| due.is_some())
        })
    }

    /// Generate the next instance for a template if one is due.
    ///
    /// Returns `None` when nothing is due; that is the steady-state outcome of
    /// most scheduler ticks, not an error. The guard is re-checked inside the
    /// transaction and the unique (template, due-date) index absorbs races
    /// between concurrent generators, so at-least-once scheduling never yields
    /// duplicate instances.
    pub fn create_next_instance(&self, task_id: &str) -> EngineResult<Option<Task>> {
        self.create_next_instance_at(task_id, now_ms())
    }

    /// Clock-injected variant of [`Database::create_next_instance`].
    pub fn create_next_instance_at(&self, task_id: &str, now: i64) -> EngineResult<Option<Task>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let template = get_task_internal(&tx, task_id)?
                .ok_or_else(|| EngineError::task_not_found(task_id))?;

            let due = match should_generate(&tx, &template, now)? {
                Some(due) => due,
                None => return Ok(None),
            };

            let position = next_position(&tx, &template.user_id, None)?;
            let instance = Task {
                id: Uuid::now_v7().to_string(),
                user_id: template.user_id.clone(),
                assigned_to: template.assigned_to.clone(),
                title: template.title.clone(),
                description: template.description.clone(),
                status: TaskStatus::Todo,
                priority: template.priority,
                estimated_hours: template.estimated_hours,
                project_id: template.project_id.clone(),
                category_id: template.category_id.clone(),
                due_date: Some(due),
                start_date: None,
                completed_at: None,
                // Instances are not auto-nested under the template.
                parent_task_id: None,
                position,
                // Only the template generates; instances never recur themselves.
                is_recurring: false,
                recurrence_pattern: None,
                recurrence_interval: None,
                recurrence_days_of_week: vec![],
                recurrence_day_of_month: None,
                recurrence_month_of_year: None,
                recurrence_end_date: None,
                recurrence_count: None,
                recurrence_generated_count: 0,
                recurrence_last_due: None,
                recurrence_parent_id: Some(template.id.clone()),
                archived: false,
                created_at: now,
                updated_at: now,
            };

            match insert_task(&tx, &instance) {
                Ok(()) => {}
                // A concurrent tick won the (template, due-date) slot.
                Err(EngineError::Storage(rusqlite::Error::SqliteFailure(e, _)))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }

            // Lifetime bookkeeping lives on the template so retention
            // cleanup can delete the instance row without reopening the
            // cap or rewinding the anchor.
            tx.execute(
                "UPDATE tasks SET
                    recurrence_generated_count = recurrence_generated_count + 1,
                    recurrence_last_due = ?1, updated_at = ?2
                 WHERE id = ?3",
                params![due, now, template.id],
            )?;

            tx.commit()?;
            Ok(Some(instance))
        })
    }

    /// Stop future generation without touching history: the end-date becomes
    /// "now", so the template reads as paused on every subsequent tick.
    pub fn pause_recurring_task(&self, task_id: &str) -> EngineResult<Task> {
        self.pause_recurring_task_at(task_id, now_ms())
    }

    /// Clock-injected variant of [`Database::pause_recurring_task`].
    pub fn pause_recurring_task_at(&self, task_id: &str, now: i64) -> EngineResult<Task> {
        self.with_conn(|conn| {
            let template = require_template(conn, task_id)?;
            conn.execute(
                "UPDATE tasks SET recurrence_end_date = ?1, updated_at = ?2 WHERE id = ?3",
                params![now, now, task_id],
            )?;
            Ok(Task {
                recurrence_end_date: Some(now),
                updated_at: now,
                ..template
            })
        })
    }

    /// Clear the end-date and immediately generate any single instance that
    /// became due while paused. No backfill of multiple missed periods.
    pub fn resume_recurring_task(&self, task_id: &str) -> EngineResult<Option<Task>> {
        self.resume_recurring_task_at(task_id, now_ms())
    }

    /// Clock-injected variant of [`Database::resume_recurring_task`].
    pub fn resume_recurring_task_at(&self, task_id: &str, now: i64) -> EngineResult<Option<Task>> {
        self.with_conn(|conn| -> EngineResult<()> {
            require_template(conn, task_id)?;
            conn.execute(
                "UPDATE tasks SET recurrence_end_date = NULL, updated_at = ?1 WHERE id = ?2",
                params![now, task_id],
            )?;
            Ok(())
        })?;

        self.create_next_instance_at(task_id, now)
    }

    /// Retention pass over completed instances: keep the newest `keep_last_n`,
    /// archive the older ones that carry user history, hard-delete the rest.
    pub fn cleanup_completed_instances(
        &self,
        task_id: &str,
        keep_last_n: usize,
    ) -> EngineResult<CleanupSummary> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            require_template(&tx, task_id)?;

            let mut stmt = tx.prepare(
                "SELECT id FROM tasks
                 WHERE recurrence_parent_id = ?1
                 AND status = 'done'
                 AND completed_at IS NOT NULL
                 ORDER BY completed_at DESC",
            )?;
            let instance_ids: Vec<String> = stmt
                .query_map(params![task_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);

            let mut summary = CleanupSummary::default();
            for instance_id in instance_ids.iter().skip(keep_last_n) {
                if has_user_history(&tx, instance_id)? {
                    tx.execute(
                        "UPDATE tasks SET archived = 1, updated_at = ?1 WHERE id = ?2",
                        params![now, instance_id],
                    )?;
                    summary.archived += 1;
                } else {
                    tx.execute("DELETE FROM tasks WHERE id = ?1", params![instance_id])?;
                    summary.deleted += 1;
                }
            }

            tx.commit()?;
            Ok(summary)
        })
    }

    /// Lifetime number of instances a template has generated. Not affected
    /// by retention cleanup deleting old instance rows.
    pub fn generated_instance_count(&self, task_id: &str) -> EngineResult<u32> {
        self.with_conn(|conn| {
            let task = get_task_internal(conn, task_id)?
                .ok_or_else(|| EngineError::task_not_found(task_id))?;
            Ok(task.recurrence_generated_count)
        })
    }
}

fn require_template(conn: &Connection, task_id: &str) -> EngineResult<Task> {
    let task = get_task_internal(conn, task_id)?
        .ok_or_else(|| EngineError::task_not_found(task_id))?;
    if !task.is_recurring_template() {
        return Err(EngineError::not_a_template(task_id));
    }
    Ok(task)
}

fn instance_exists(conn: &Connection, template_id: &str, due: i64) -> EngineResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks
         WHERE recurrence_parent_id = ?1 AND due_date = ?2)",
        params![template_id, due],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// The generation guard. Returns the due occurrence date when the template
/// must spawn an instance now, `None` otherwise.
///
/// The anchor for the next occurrence is the due-date of the most recently
/// generated instance, tracked on the template itself, falling back to the
/// template's own due-date, then to its creation time for templates that
/// never carried one.
fn should_generate(conn: &Connection, template: &Task, now: i64) -> EngineResult<Option<i64>> {
    if !template.is_recurring_template() {
        return Ok(None);
    }
    let rule = match RecurrenceRule::from_task(template) {
        Some(rule) => rule,
        None => return Ok(None),
    };

    // End-date already passed means the template is paused.
    if let Some(end) = template.recurrence_end_date {
        if end <= now {
            return Ok(None);
        }
    }

    if let Some(cap) = template.recurrence_count {
        if template.recurrence_generated_count >= cap {
            return Ok(None);
        }
    }

    let anchor = template
        .recurrence_last_due
        .or(template.due_date)
        .unwrap_or(template.created_at);
    let anchor_dt = DateTime::from_timestamp_millis(anchor)
        .ok_or_else(|| EngineError::BadRequest(format!("invalid anchor timestamp {anchor}")))?;

    let due = next_occurrence(&rule, anchor_dt).timestamp_millis();

    if due > now {
        return Ok(None);
    }
    if let Some(end) = template.recurrence_end_date {
        if due > end {
            return Ok(None);
        }
    }
    if instance_exists(conn, &template.id, due)? {
        return Ok(None);
    }

    Ok(Some(due))
}
