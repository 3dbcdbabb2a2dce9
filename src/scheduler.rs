//! Periodic driver for the recurrence engine.
//!
//! On each tick, every active template is asked whether it is due and, if so,
//! an instance is generated. Templates are processed independently: one
//! template's failure is logged and retried with bounded backoff, never
//! aborting the batch.

use crate::config::SchedulerConfig;
use crate::db::Database;
use crate::error::EngineResult;
use crate::types::Task;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives instance generation on a fixed cadence.
pub struct Scheduler {
    db: Database,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(db: Database, config: SchedulerConfig) -> Self {
        Self { db, config }
    }

    /// Run forever, ticking at the configured interval.
    pub async fn run(&self) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.scan_interval_secs.max(1)));
        // A slow tick should not cause a burst of catch-up ticks.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.scan_interval_secs,
            "recurrence scheduler started"
        );

        loop {
            interval.tick().await;
            let created = self.tick().await;
            for task in &created {
                info!(
                    task_id = %task.id,
                    template_id = task.recurrence_parent_id.as_deref().unwrap_or(""),
                    due_date = task.due_date.unwrap_or(0),
                    "generated recurring task instance"
                );
                if let Some(ref assignee) = task.assigned_to {
                    // Notification dispatch is the caller's concern; surface
                    // the event for it.
                    info!(task_id = %task.id, assignee = %assignee, "instance awaiting notification");
                }
            }
        }
    }

    /// One scan over all active templates. Returns the instances created so
    /// callers can route new-task events onward.
    pub async fn tick(&self) -> Vec<Task> {
        let templates = match self.db.list_recurring_templates() {
            Ok(templates) => templates,
            Err(e) => {
                warn!(error = %e, "failed to enumerate recurring templates");
                return vec![];
            }
        };

        debug!(count = templates.len(), "scanning recurring templates");

        let mut created = Vec::new();
        for template in templates {
            match self.process_template(&template.id).await {
                Ok(Some(task)) => created.push(task),
                Ok(None) => {}
                Err(e) => {
                    warn!(template_id = %template.id, error = %e, "template generation failed; skipping");
                }
            }
        }
        created
    }

    /// Generate for one template, retrying transient failures with bounded
    /// backoff. The idempotent guard inside `create_next_instance` makes
    /// retries safe.
    async fn process_template(&self, template_id: &str) -> EngineResult<Option<Task>> {
        let attempts = self.config.generation_attempts.max(1);
        let mut backoff = Duration::from_millis(self.config.retry_backoff_ms);

        let mut last_err = None;
        for attempt in 1..=attempts {
            if !self.db.should_create_next_instance(template_id)? {
                return Ok(None);
            }
            match self.db.create_next_instance(template_id) {
                Ok(instance) => return Ok(instance),
                Err(e) => {
                    debug!(template_id, attempt, error = %e, "generation attempt failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
