//! User-entered history attached to tasks: comments, time logs, attachments.
//!
//! Instance cleanup archives rather than deletes any task with rows here,
//! so user-entered history is never silently lost.

use super::tasks::get_owned_task;
use super::{now_ms, Database};
use crate::error::EngineResult;
use rusqlite::{params, Connection};
use uuid::Uuid;

impl Database {
    /// Add a comment to a task.
    pub fn add_comment(&self, task_id: &str, user_id: &str, body: &str) -> EngineResult<String> {
        let id = Uuid::now_v7().to_string();
        let now = now_ms();

        self.with_conn(|conn| {
            get_owned_task(conn, task_id, user_id)?;
            conn.execute(
                "INSERT INTO task_comments (id, task_id, user_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, task_id, user_id, body, now],
            )?;
            Ok(id.clone())
        })
    }

    /// Log time against a task.
    pub fn log_time(&self, task_id: &str, user_id: &str, duration_ms: i64) -> EngineResult<String> {
        let id = Uuid::now_v7().to_string();
        let now = now_ms();

        self.with_conn(|conn| {
            get_owned_task(conn, task_id, user_id)?;
            conn.execute(
                "INSERT INTO time_logs (id, task_id, user_id, duration_ms, logged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, task_id, user_id, duration_ms, now],
            )?;
            Ok(id.clone())
        })
    }

    /// Attach a file reference to a task. Order index is appended.
    pub fn add_attachment(
        &self,
        task_id: &str,
        user_id: &str,
        name: &str,
        mime_type: Option<&str>,
        file_path: Option<&str>,
    ) -> EngineResult<i64> {
        let now = now_ms();

        self.with_conn(|conn| {
            get_owned_task(conn, task_id, user_id)?;
            let order_index: i64 = conn.query_row(
                "SELECT COALESCE(MAX(order_index) + 1, 0) FROM attachments WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO attachments (task_id, order_index, name, mime_type, file_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![task_id, order_index, name, mime_type, file_path, now],
            )?;
            Ok(order_index)
        })
    }
}

/// Whether a task carries any user-entered history.
pub(crate) fn has_user_history(conn: &Connection, task_id: &str) -> EngineResult<bool> {
    let has: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM task_comments WHERE task_id = ?1)
             OR EXISTS(SELECT 1 FROM time_logs WHERE task_id = ?1)
             OR EXISTS(SELECT 1 FROM attachments WHERE task_id = ?1)",
        params![task_id],
        |row| row.get(0),
    )?;
    Ok(has)
}
