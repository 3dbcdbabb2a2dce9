//! Task CRUD, parent/subtask hierarchy integrity, and status propagation.

use super::{now_ms, Database};
use crate::error::{EngineError, EngineResult};
use crate::types::{NewTask, Priority, Task, TaskPatch, TaskStatus};
use rusqlite::{params, Connection, Row};
use std::collections::HashSet;
use uuid::Uuid;

pub(crate) fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let pattern: Option<String> = row.get("recurrence_pattern")?;
    let days_json: Option<String> = row.get("recurrence_days_of_week")?;

    Ok(Task {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        assigned_to: row.get("assigned_to")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Todo),
        priority: Priority::parse(&priority).unwrap_or(Priority::Medium),
        estimated_hours: row.get("estimated_hours")?,
        project_id: row.get("project_id")?,
        category_id: row.get("category_id")?,
        due_date: row.get("due_date")?,
        start_date: row.get("start_date")?,
        completed_at: row.get("completed_at")?,
        parent_task_id: row.get("parent_task_id")?,
        position: row.get("position")?,
        is_recurring: row.get::<_, i64>("is_recurring")? != 0,
        recurrence_pattern: pattern.as_deref().and_then(crate::types::RecurrencePattern::parse),
        recurrence_interval: row.get("recurrence_interval")?,
        recurrence_days_of_week: days_json
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .unwrap_or_default(),
        recurrence_day_of_month: row.get("recurrence_day_of_month")?,
        recurrence_month_of_year: row.get("recurrence_month_of_year")?,
        recurrence_end_date: row.get("recurrence_end_date")?,
        recurrence_count: row.get("recurrence_count")?,
        recurrence_generated_count: row.get("recurrence_generated_count")?,
        recurrence_last_due: row.get("recurrence_last_due")?,
        recurrence_parent_id: row.get("recurrence_parent_id")?,
        archived: row.get::<_, i64>("archived")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Fetch a task by id using an existing connection.
pub(crate) fn get_task_internal(conn: &Connection, task_id: &str) -> EngineResult<Option<Task>> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;
    match stmt.query_row(params![task_id], parse_task_row) {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fetch a task owned by the requester, folding the ownership check into
/// existence so cross-user probes read as NotFound.
pub(crate) fn get_owned_task(
    conn: &Connection,
    task_id: &str,
    requester_id: &str,
) -> EngineResult<Task> {
    match get_task_internal(conn, task_id)? {
        Some(task) if task.user_id == requester_id => Ok(task),
        _ => Err(EngineError::task_not_found(task_id)),
    }
}

pub(crate) fn insert_task(conn: &Connection, task: &Task) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO tasks (
            id, user_id, assigned_to, title, description, status, priority,
            estimated_hours, project_id, category_id, due_date, start_date,
            completed_at, parent_task_id, position, is_recurring,
            recurrence_pattern, recurrence_interval, recurrence_days_of_week,
            recurrence_day_of_month, recurrence_month_of_year,
            recurrence_end_date, recurrence_count, recurrence_generated_count,
            recurrence_last_due, recurrence_parent_id,
            archived, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                  ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
                  ?27, ?28, ?29)",
        params![
            task.id,
            task.user_id,
            task.assigned_to,
            task.title,
            task.description,
            task.status.as_str(),
            task.priority.as_str(),
            task.estimated_hours,
            task.project_id,
            task.category_id,
            task.due_date,
            task.start_date,
            task.completed_at,
            task.parent_task_id,
            task.position,
            task.is_recurring as i64,
            task.recurrence_pattern.map(|p| p.as_str()),
            task.recurrence_interval,
            serde_json::to_string(&task.recurrence_days_of_week)
                .unwrap_or_else(|_| "[]".to_string()),
            task.recurrence_day_of_month,
            task.recurrence_month_of_year,
            task.recurrence_end_date,
            task.recurrence_count,
            task.recurrence_generated_count,
            task.recurrence_last_due,
            task.recurrence_parent_id,
            task.archived as i64,
            task.created_at,
            task.updated_at,
        ],
    )?;
    Ok(())
}

/// Next manual-ordering slot among siblings (same owner and parent).
pub(crate) fn next_position(conn: &Connection, user_id: &str, parent_id: Option<&str>) -> EngineResult<i64> {
    let position: i64 = match parent_id {
        Some(pid) => conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM tasks
             WHERE user_id = ?1 AND parent_task_id = ?2",
            params![user_id, pid],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM tasks
             WHERE user_id = ?1 AND parent_task_id IS NULL",
            params![user_id],
            |row| row.get(0),
        )?,
    };
    Ok(position)
}

impl Database {
    /// Create a task. Recurrence-generated instances go through this same
    /// path so hierarchy invariants apply uniformly.
    pub fn create_task(&self, input: NewTask) -> EngineResult<Task> {
        let now = now_ms();
        let task_id = Uuid::now_v7().to_string();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            // Parent must exist and be owned by the creator. A fresh task
            // cannot close a hierarchy cycle, so no upward walk is needed.
            if let Some(ref pid) = input.parent_task_id {
                get_owned_task(&tx, pid, &input.user_id)?;
            }

            let position = match input.position {
                Some(p) => p,
                None => next_position(&tx, &input.user_id, input.parent_task_id.as_deref())?,
            };

            let task = Task {
                id: task_id,
                user_id: input.user_id,
                assigned_to: input.assigned_to,
                title: input.title,
                description: input.description,
                status: TaskStatus::Todo,
                priority: input.priority.unwrap_or(Priority::Medium),
                estimated_hours: input.estimated_hours,
                project_id: input.project_id,
                category_id: input.category_id,
                due_date: input.due_date,
                start_date: input.start_date,
                completed_at: None,
                parent_task_id: input.parent_task_id,
                position,
                is_recurring: input.is_recurring,
                recurrence_pattern: input.recurrence_pattern,
                recurrence_interval: input.recurrence_interval,
                recurrence_days_of_week: input.recurrence_days_of_week,
                recurrence_day_of_month: input.recurrence_day_of_month,
                recurrence_month_of_year: input.recurrence_month_of_year,
                recurrence_end_date: input.recurrence_end_date,
                recurrence_count: input.recurrence_count,
                recurrence_generated_count: 0,
                recurrence_last_due: None,
                recurrence_parent_id: None,
                archived: false,
                created_at: now,
                updated_at: now,
            };

            insert_task(&tx, &task)?;
            tx.commit()?;

            Ok(task)
        })
    }

    /// Get a task owned by the requester.
    pub fn get_task(&self, task_id: &str, requester_id: &str) -> EngineResult<Task> {
        self.with_conn(|conn| get_owned_task(conn, task_id, requester_id))
    }

    /// Apply a whitelisted field update.
    ///
    /// Keeps the completed-at invariant: set exactly when status transitions
    /// to Done, cleared when it transitions away. A transition to Done is
    /// rejected while incomplete dependencies remain, and any status change
    /// propagates one level up to the parent.
    pub fn update_task(
        &self,
        task_id: &str,
        requester_id: &str,
        patch: TaskPatch,
    ) -> EngineResult<Task> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let task = get_owned_task(&tx, task_id, requester_id)?;

            let new_status = patch.status.unwrap_or(task.status);
            let status_changed = new_status != task.status;

            if status_changed && new_status == TaskStatus::Done {
                let blockers = super::deps::incomplete_dependencies(&tx, task_id)?;
                if !blockers.is_empty() {
                    return Err(EngineError::BadRequest(format!(
                        "task {task_id} is blocked by incomplete dependencies: {}",
                        blockers.join(", ")
                    )));
                }
            }

            let completed_at = if status_changed {
                if new_status == TaskStatus::Done {
                    Some(now)
                } else {
                    None
                }
            } else {
                task.completed_at
            };

            let updated = Task {
                title: patch.title.unwrap_or(task.title.clone()),
                description: patch.description.unwrap_or(task.description.clone()),
                status: new_status,
                priority: patch.priority.unwrap_or(task.priority),
                assigned_to: patch.assigned_to.unwrap_or(task.assigned_to.clone()),
                estimated_hours: patch.estimated_hours.unwrap_or(task.estimated_hours),
                due_date: patch.due_date.unwrap_or(task.due_date),
                start_date: patch.start_date.unwrap_or(task.start_date),
                position: patch.position.unwrap_or(task.position),
                completed_at,
                updated_at: now,
                ..task.clone()
            };

            tx.execute(
                "UPDATE tasks SET
                    title = ?1, description = ?2, status = ?3, priority = ?4,
                    assigned_to = ?5, estimated_hours = ?6, due_date = ?7,
                    start_date = ?8, position = ?9, completed_at = ?10,
                    updated_at = ?11
                WHERE id = ?12",
                params![
                    updated.title,
                    updated.description,
                    updated.status.as_str(),
                    updated.priority.as_str(),
                    updated.assigned_to,
                    updated.estimated_hours,
                    updated.due_date,
                    updated.start_date,
                    updated.position,
                    updated.completed_at,
                    updated.updated_at,
                    task_id,
                ],
            )?;

            if status_changed {
                if let Some(ref parent_id) = updated.parent_task_id {
                    recompute_parent_status(&tx, parent_id, now)?;
                }
            }

            tx.commit()?;
            Ok(updated)
        })
    }

    /// Re-parent a task. Clearing the parent is always allowed; setting one
    /// requires the new parent to exist, be owned by the requester, and not
    /// sit below the task in the hierarchy.
    pub fn update_task_parent(
        &self,
        task_id: &str,
        new_parent_id: Option<&str>,
        requester_id: &str,
    ) -> EngineResult<Task> {
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let task = get_owned_task(&tx, task_id, requester_id)?;

            if let Some(parent_id) = new_parent_id {
                if parent_id == task_id {
                    return Err(EngineError::self_parent(task_id));
                }
                get_owned_task(&tx, parent_id, requester_id)?;

                // Walk the candidate parent's chain upward; reaching task_id
                // means the task is an ancestor of its would-be parent.
                let mut visited: HashSet<String> = HashSet::new();
                let mut current = Some(parent_id.to_string());
                while let Some(id) = current {
                    if id == task_id {
                        return Err(EngineError::hierarchy_cycle(task_id, parent_id));
                    }
                    if !visited.insert(id.clone()) {
                        break;
                    }
                    current = tx.query_row(
                        "SELECT parent_task_id FROM tasks WHERE id = ?1",
                        params![id],
                        |row| row.get::<_, Option<String>>(0),
                    )?;
                }
            }

            tx.execute(
                "UPDATE tasks SET parent_task_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![new_parent_id, now, task_id],
            )?;

            tx.commit()?;
            Ok(Task {
                parent_task_id: new_parent_id.map(str::to_string),
                updated_at: now,
                ..task
            })
        })
    }

    /// Direct subtasks ordered by manual position.
    pub fn get_subtasks(&self, task_id: &str, requester_id: &str) -> EngineResult<Vec<Task>> {
        self.with_conn(|conn| {
            get_owned_task(conn, task_id, requester_id)?;

            let mut stmt = conn.prepare(
                "SELECT * FROM tasks WHERE parent_task_id = ?1
                 ORDER BY position ASC, created_at ASC",
            )?;
            let tasks = stmt
                .query_map(params![task_id], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }

    /// Recompute a parent's status from its direct subtasks. One level only;
    /// callers drive propagation to grandparents. Returns the parent when a
    /// transition was applied.
    pub fn update_parent_task_status(&self, parent_task_id: &str) -> EngineResult<Option<Task>> {
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let updated = recompute_parent_status(&tx, parent_task_id, now)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Delete a task. Refused while subtasks exist: re-parenting policy is
    /// the caller's decision. Dependency edges cascade with the row.
    pub fn delete_task(&self, task_id: &str, requester_id: &str) -> EngineResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            get_owned_task(&tx, task_id, requester_id)?;

            let child_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM tasks WHERE parent_task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )?;
            if child_count > 0 {
                return Err(EngineError::has_subtasks(task_id));
            }

            tx.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Active recurring templates for the periodic driver.
    pub fn list_recurring_templates(&self) -> EngineResult<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM tasks
                 WHERE is_recurring = 1
                 AND recurrence_pattern IS NOT NULL
                 AND recurrence_parent_id IS NULL
                 AND archived = 0
                 ORDER BY created_at",
            )?;
            let tasks = stmt
                .query_map([], parse_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
    }
}

/// Status recomputation rules, from direct subtasks only:
/// all Done -> Done; any InProgress -> InProgress (only from Todo, never
/// downgrading Done); all Todo -> Todo. A mix of Done and Todo with nothing
/// InProgress leaves the parent unchanged.
pub(crate) fn recompute_parent_status(
    conn: &Connection,
    parent_task_id: &str,
    now: i64,
) -> EngineResult<Option<Task>> {
    let parent = match get_task_internal(conn, parent_task_id)? {
        Some(task) => task,
        None => return Ok(None),
    };

    let mut stmt = conn.prepare("SELECT status FROM tasks WHERE parent_task_id = ?1")?;
    let statuses: Vec<TaskStatus> = stmt
        .query_map(params![parent_task_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?
        .iter()
        .filter_map(|s| TaskStatus::parse(s))
        .collect();

    if statuses.is_empty() {
        return Ok(None);
    }

    let all_done = statuses.iter().all(|s| *s == TaskStatus::Done);
    let any_in_progress = statuses.iter().any(|s| *s == TaskStatus::InProgress);
    let all_todo = statuses.iter().all(|s| *s == TaskStatus::Todo);

    let (new_status, new_completed_at) = if all_done {
        if parent.status == TaskStatus::Done {
            return Ok(None);
        }
        (TaskStatus::Done, Some(now))
    } else if any_in_progress {
        if parent.status != TaskStatus::Todo {
            return Ok(None);
        }
        (TaskStatus::InProgress, None)
    } else if all_todo {
        if parent.status == TaskStatus::Todo {
            return Ok(None);
        }
        (TaskStatus::Todo, None)
    } else {
        return Ok(None);
    };

    conn.execute(
        "UPDATE tasks SET status = ?1, completed_at = ?2, updated_at = ?3 WHERE id = ?4",
        params![new_status.as_str(), new_completed_at, now, parent_task_id],
    )?;

    Ok(Some(Task {
        status: new_status,
        completed_at: new_completed_at,
        updated_at: now,
        ..parent
    }))
}
