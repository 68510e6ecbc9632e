use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use crate::{DagError, TaskInput, TaskOutput};

/// The opaque body of a task.
///
/// `input` holds the published outputs of the task's direct parents, keyed by
/// parent id. A parent that failed is present with [`TaskOutput::Null`].
#[async_trait]
pub trait Work: Send + Sync {
    async fn run(&self, input: TaskInput) -> Result<TaskOutput, TaskError>;
}

/// Runs a synchronous closure on tokio's blocking pool, so a body that blocks
/// does not hold up the other tasks of the run.
struct FnWork<F>(Arc<F>);

#[async_trait]
impl<F> Work for FnWork<F>
where
    F: Fn(TaskInput) -> Result<TaskOutput, TaskError> + Send + Sync + 'static,
{
    async fn run(&self, input: TaskInput) -> Result<TaskOutput, TaskError> {
        let body = Arc::clone(&self.0);
        match tokio::task::spawn_blocking(move || body(input)).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(TaskError::from_panic(e.into_panic())),
            Err(e) => Err(TaskError::new(format!("Task body did not finish: {e}"))),
        }
    }
}

struct AsyncFnWork<F>(F);

#[async_trait]
impl<F, Fut> Work for AsyncFnWork<F>
where
    F: Fn(TaskInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutput, TaskError>> + Send + 'static,
{
    async fn run(&self, input: TaskInput) -> Result<TaskOutput, TaskError> {
        (self.0)(input).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Failure recorded on a task whose body returned an error or panicked.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct TaskError {
    message: String,
    trace: Option<String>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Keeps the error's display text as the message and its `source()` chain
    /// as the trace.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        let error = Self::new(err.to_string());
        if chain.is_empty() {
            error
        } else {
            error.with_trace(format!("caused by: {}", chain.join("\ncaused by: ")))
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(format!("Task panicked: {detail}"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// One schedulable unit of work.
///
/// A task starts out [`TaskStatus::Pending`]. Its status, outcome and
/// timestamps are only changed by the executor while the task runs, and the
/// task is handed back read-only in the [`RunResult`](crate::RunResult).
pub struct Task {
    id: String,
    work: Arc<dyn Work>,
    status: TaskStatus,
    result: Option<TaskOutput>,
    error: Option<TaskError>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl Task {
    pub fn new(id: impl Into<String>, work: impl Work + 'static) -> Self {
        Self::with_work(id, Arc::new(work))
    }

    pub fn with_work(id: impl Into<String>, work: Arc<dyn Work>) -> Self {
        Self {
            id: id.into(),
            work,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Task whose body is a synchronous closure.
    ///
    /// The body runs on tokio's blocking pool, so at most that many sync
    /// bodies run at once (512 unless the runtime sets
    /// `max_blocking_threads`); the rest queue for a thread.
    pub fn from_fn<F>(id: impl Into<String>, body: F) -> Self
    where
        F: Fn(TaskInput) -> Result<TaskOutput, TaskError> + Send + Sync + 'static,
    {
        Self::new(id, FnWork(Arc::new(body)))
    }

    /// Task whose body is a closure returning a future.
    pub fn from_async<F, Fut>(id: impl Into<String>, body: F) -> Self
    where
        F: Fn(TaskInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskOutput, TaskError>> + Send + 'static,
    {
        Self::new(id, AsyncFnWork(body))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn result(&self) -> Option<&TaskOutput> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Time between entering `Running` and reaching a terminal state.
    pub fn execution_time(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    pub(crate) fn work(&self) -> Arc<dyn Work> {
        Arc::clone(&self.work)
    }

    pub(crate) fn set_status(&mut self, next: TaskStatus) -> Result<(), DagError> {
        if !self.status.can_transition_to(next) {
            return Err(DagError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        match next {
            TaskStatus::Running => self.started_at = Some(Instant::now()),
            TaskStatus::Completed | TaskStatus::Failed => self.finished_at = Some(Instant::now()),
            TaskStatus::Pending => {}
        }
        Ok(())
    }

    pub(crate) fn complete(&mut self, output: TaskOutput) -> Result<(), DagError> {
        self.set_status(TaskStatus::Completed)?;
        self.result = Some(output);
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: TaskError) -> Result<(), DagError> {
        self.set_status(TaskStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("result", &self.result)
            .field("error", &self.error)
            .field("execution_time", &self.execution_time())
            .finish_non_exhaustive()
    }
}
