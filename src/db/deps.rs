//! Dependency edges and cycle detection.

use super::tasks::get_owned_task;
use super::{now_ms, Database};
use crate::error::{EngineError, EngineResult};
use crate::types::Dependency;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use uuid::Uuid;

impl Database {
    /// Add a dependency edge: `task_id` depends on `depends_on_id`.
    ///
    /// Both endpoints must exist and belong to the requester. Rejects
    /// self-edges, duplicate edges, and any edge that would close a cycle.
    pub fn create_dependency(
        &self,
        task_id: &str,
        depends_on_id: &str,
        requester_id: &str,
    ) -> EngineResult<Dependency> {
        let now = now_ms();
        let dep_id = Uuid::now_v7().to_string();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            get_owned_task(&tx, task_id, requester_id)?;
            get_owned_task(&tx, depends_on_id, requester_id)?;

            if task_id == depends_on_id {
                return Err(EngineError::self_dependency(task_id));
            }

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM task_dependencies
                 WHERE task_id = ?1 AND depends_on_id = ?2)",
                params![task_id, depends_on_id],
                |row| row.get(0),
            )?;
            if exists {
                return Err(EngineError::duplicate_dependency(task_id, depends_on_id));
            }

            if would_create_cycle(&tx, task_id, depends_on_id)? {
                return Err(EngineError::dependency_cycle(task_id, depends_on_id));
            }

            tx.execute(
                "INSERT INTO task_dependencies (id, task_id, depends_on_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![dep_id, task_id, depends_on_id, now],
            )?;

            tx.commit()?;

            Ok(Dependency {
                id: dep_id,
                task_id: task_id.to_string(),
                depends_on_id: depends_on_id.to_string(),
                created_at: now,
            })
        })
    }

    /// Remove a dependency edge. Ownership is checked through the dependent
    /// task; an edge the requester cannot see reads as NotFound.
    pub fn delete_dependency(&self, dependency_id: &str, requester_id: &str) -> EngineResult<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM task_dependencies
                 WHERE id = ?1
                 AND task_id IN (SELECT id FROM tasks WHERE user_id = ?2)",
                params![dependency_id, requester_id],
            )?;

            if deleted == 0 {
                return Err(EngineError::dependency_not_found(dependency_id));
            }
            Ok(())
        })
    }

    /// Whether the task may transition to Done, plus the ids still blocking
    /// it. A pure query: the task-update path consults it before permitting
    /// the transition.
    pub fn can_complete_task(
        &self,
        task_id: &str,
        requester_id: &str,
    ) -> EngineResult<(bool, Vec<String>)> {
        self.with_conn(|conn| {
            get_owned_task(conn, task_id, requester_id)?;
            let blockers = incomplete_dependencies(conn, task_id)?;
            Ok((blockers.is_empty(), blockers))
        })
    }

    /// All dependency edges where the requester's task is the dependent side.
    pub fn get_dependencies(
        &self,
        task_id: &str,
        requester_id: &str,
    ) -> EngineResult<Vec<Dependency>> {
        self.with_conn(|conn| {
            get_owned_task(conn, task_id, requester_id)?;

            let mut stmt = conn.prepare(
                "SELECT id, task_id, depends_on_id, created_at
                 FROM task_dependencies WHERE task_id = ?1
                 ORDER BY created_at",
            )?;
            let deps = stmt
                .query_map(params![task_id], |row| {
                    Ok(Dependency {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        depends_on_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(deps)
        })
    }
}

/// Ids of depends-on tasks that are not yet Done.
pub(crate) fn incomplete_dependencies(
    conn: &Connection,
    task_id: &str,
) -> EngineResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT d.depends_on_id
         FROM task_dependencies d
         INNER JOIN tasks blocker ON d.depends_on_id = blocker.id
         WHERE d.task_id = ?1 AND blocker.status != 'done'
         ORDER BY d.created_at",
    )?;
    let blockers = stmt
        .query_map(params![task_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(blockers)
}

/// Would adding the edge `task_id -> depends_on_id` close a loop?
///
/// If `depends_on_id` can already reach `task_id` through existing depends-on
/// edges, the new edge completes a cycle. Iterative depth-first search with an
/// explicit stack and visited set: O(V+E) on diamond-shaped graphs, no
/// recursion-depth concerns on deep chains.
fn would_create_cycle(
    conn: &Connection,
    task_id: &str,
    depends_on_id: &str,
) -> EngineResult<bool> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = vec![depends_on_id.to_string()];

    while let Some(current) = stack.pop() {
        if current == task_id {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }

        let mut stmt =
            conn.prepare("SELECT depends_on_id FROM task_dependencies WHERE task_id = ?1")?;
        let next: Vec<String> = stmt
            .query_map(params![current], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        for id in next {
            if !visited.contains(&id) {
                stack.push(id);
            }
        }
    }

    Ok(false)
}
