pub mod config;
pub mod cycle_check;
pub mod executor;
pub mod graph;
#[cfg(feature = "logging")]
pub mod logging;
pub mod result_cell;
pub mod shared;
pub mod task;

pub use config::ExecutorConfig;
pub use executor::{RunResult, TaskExecutor};
pub use graph::DependencyGraph;
pub use result_cell::{ResultCell, ResultPublisher, ResultSubscriber};
pub use shared::SharedState;
pub use task::{Task, TaskError, TaskStatus, Work};

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Value a task produces and hands to its dependents.
pub type TaskOutput = serde_json::Value;
/// Outputs of a task's direct parents, keyed by parent id.
pub type TaskInput = HashMap<String, TaskOutput>;

#[derive(Error, Debug)]
pub enum DagError {
    #[error(
        "Detected a cycle in the DAG. {total} tasks but only {sorted} sorted tasks. In Degrees: {}. {message}",
        render_in_degrees(.in_degrees)
    )]
    CycleDetected {
        /// Closed path, first and last id are the same task.
        path: Vec<String>,
        message: String,
        sorted: usize,
        total: usize,
        in_degrees: BTreeMap<String, usize>,
    },
    #[error("Task {id} is part of the dependency {child} -> {parent} but was never added")]
    MissingTask {
        id: String,
        child: String,
        parent: String,
    },
    #[error("Task {0} is not pending and cannot be scheduled")]
    TaskNotPending(String),
    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("Join error: {0}")]
    Join(String),
}

fn render_in_degrees(in_degrees: &BTreeMap<String, usize>) -> String {
    serde_json::to_string(in_degrees).unwrap_or_else(|_| format!("{in_degrees:?}"))
}
