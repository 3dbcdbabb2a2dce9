//! Taskwheel: recurring-task instance generation coupled with dependency and
//! hierarchy integrity enforcement over a shared task-record store.

pub mod config;
pub mod db;
pub mod error;
pub mod recurrence;
pub mod scheduler;
pub mod types;
