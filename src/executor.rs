use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use crate::{
    DagError, DependencyGraph, ExecutorConfig, ResultCell, ResultPublisher,
    ResultSubscriber, Task, TaskError, TaskInput, TaskOutput, TaskStatus,
};

/// Runs every task of a [`DependencyGraph`] as its own tokio task.
///
/// A task starts once all of its direct parents have published an outcome.
/// A failed parent publishes [`TaskOutput::Null`], so its children still run.
#[derive(Debug, Default)]
pub struct TaskExecutor {
    config: ExecutorConfig,
}

impl TaskExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs the whole graph and waits for every task to finish.
    ///
    /// Structural problems (cycles, dangling edges, tasks that already ran)
    /// are reported before anything starts. Failures of individual tasks are
    /// only recorded on the tasks themselves.
    pub async fn execute(&self, graph: DependencyGraph) -> Result<RunResult, DagError> {
        let span = info_span!("dag_execution", task_count = graph.len());
        self.run(graph).instrument(span).await
    }

    async fn run(&self, mut graph: DependencyGraph) -> Result<RunResult, DagError> {
        let start = Instant::now();
        let order = graph.topological_sort()?;

        for id in &order {
            if let Some(task) = graph.get_task(id) {
                if task.status() != TaskStatus::Pending {
                    return Err(DagError::TaskNotPending(id.clone()));
                }
            }
        }

        let mut parents_of: HashMap<String, Vec<String>> = HashMap::new();
        for parent in graph.task_ids() {
            for child in graph.children(parent) {
                parents_of
                    .entry(child.clone())
                    .or_default()
                    .push(parent.clone());
            }
        }

        let mut publishers = HashMap::with_capacity(order.len());
        let mut subscribers = HashMap::with_capacity(order.len());
        for id in &order {
            let (publisher, subscriber) = ResultCell::new(id.as_str());
            publishers.insert(id.clone(), publisher);
            subscribers.insert(id.clone(), subscriber);
        }

        debug!(order = ?order, "launching tasks");

        let finished = Arc::new(Mutex::new(Vec::with_capacity(order.len())));
        let permits = self
            .config
            .max_concurrency
            .unwrap_or(Semaphore::MAX_PERMITS)
            .min(Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut handles = Vec::with_capacity(order.len());

        for id in &order {
            let (Some(task), Some(publisher)) = (graph.take_task(id), publishers.remove(id))
            else {
                continue;
            };

            let parents: Vec<ResultSubscriber> = parents_of
                .get(id)
                .map(|parents| {
                    parents
                        .iter()
                        .filter_map(|parent| subscribers.get(parent).cloned())
                        .collect()
                })
                .unwrap_or_default();

            handles.push(Self::spawn_task(
                task,
                parents,
                publisher,
                Arc::clone(&finished),
                Arc::clone(&semaphore),
            ));
        }

        let mut join_error = None;
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                join_error.get_or_insert_with(|| e.to_string());
            }
        }
        if let Some(e) = join_error {
            return Err(DagError::Join(e));
        }

        let tasks = std::mem::take(&mut *finished.lock().await);
        let result = RunResult::new(tasks, start.elapsed());

        info!(
            elapsed_ms = result.elapsed().as_millis() as u64,
            failed = result.failed().count(),
            "DAG execution finished"
        );

        Ok(result)
    }

    fn spawn_task(
        task: Task,
        parents: Vec<ResultSubscriber>,
        publisher: ResultPublisher,
        finished: Arc<Mutex<Vec<Task>>>,
        semaphore: Arc<Semaphore>,
    ) -> JoinHandle<()> {
        let span = info_span!("task", task = %task.id());

        tokio::spawn(
            async move {
                let mut task = task;
                let inputs = Self::prepare_inputs(parents).await;

                // The semaphore is never closed, so this only waits for a slot.
                let _permit = semaphore.acquire_owned().await.ok();
                let output = Self::execute_task(&mut task, inputs).await;

                publisher.publish(output);
                finished.lock().await.push(task);
            }
            .instrument(span),
        )
    }

    async fn prepare_inputs(parents: Vec<ResultSubscriber>) -> TaskInput {
        let mut inputs = HashMap::with_capacity(parents.len());

        for mut parent in parents {
            debug!(parent = %parent.id(), "waiting for parent");
            let output = parent.wait().await;
            inputs.insert(parent.id().to_string(), output);
        }

        inputs
    }

    /// Runs the body and records the outcome on `task`. Returns what the task
    /// publishes to its children.
    async fn execute_task(task: &mut Task, inputs: TaskInput) -> TaskOutput {
        if let Err(e) = task.set_status(TaskStatus::Running) {
            warn!(error = %e, "task could not be started");
            return TaskOutput::Null;
        }
        debug!("task started");

        let work = task.work();
        let outcome = AssertUnwindSafe(work.run(inputs))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)));

        match outcome {
            Ok(output) => {
                if let Err(e) = task.complete(output.clone()) {
                    warn!(error = %e, "task outcome not recorded");
                }
                debug!(elapsed = ?task.execution_time(), "task completed");
                output
            }
            Err(error) => {
                warn!(error = %error, "task failed");
                if let Err(e) = task.fail(error) {
                    warn!(error = %e, "task outcome not recorded");
                }
                TaskOutput::Null
            }
        }
    }
}

/// Everything a run hands back: finished tasks in completion order, the
/// output each task published, and the total wall-clock time.
#[derive(Debug)]
pub struct RunResult {
    tasks: Vec<Task>,
    results: HashMap<String, TaskOutput>,
    elapsed: Duration,
}

impl RunResult {
    fn new(tasks: Vec<Task>, elapsed: Duration) -> Self {
        let results = tasks
            .iter()
            .map(|task| {
                let output = task.result().cloned().unwrap_or(TaskOutput::Null);
                (task.id().to_string(), output)
            })
            .collect();

        Self {
            tasks,
            results,
            elapsed,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id() == id)
    }

    /// Published output per task id; failed tasks map to `Null`.
    pub fn results(&self) -> &HashMap<String, TaskOutput> {
        &self.results
    }

    pub fn result(&self, id: &str) -> Option<&TaskOutput> {
        self.results.get(id)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn final_task(&self) -> Option<&Task> {
        self.tasks.last()
    }

    pub fn failed(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|task| task.status() == TaskStatus::Failed)
    }

    pub fn execution_order(&self) -> Vec<&str> {
        self.tasks.iter().map(Task::id).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for task in &self.tasks {
            let seconds = task.execution_time().unwrap_or_default().as_secs_f64();
            write!(
                f,
                "Task {} status is {}. Executed in {:.3} seconds.",
                task.id(),
                task.status(),
                seconds
            )?;
            match (task.error(), task.result()) {
                (Some(error), _) => write!(f, " Error says {error}.")?,
                (None, Some(output)) => write!(f, " Response is {output}")?,
                (None, None) => {}
            }
            writeln!(f)?;
        }
        write!(
            f,
            "All tasks completed in {:.3} seconds",
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn constant(id: &str, value: TaskOutput) -> Task {
        Task::from_fn(id, move |_| Ok(value.clone()))
    }

    #[tokio::test]
    async fn test_empty_graph() {
        let result = TaskExecutor::default()
            .execute(DependencyGraph::new())
            .await
            .unwrap();

        assert!(result.is_empty());
        assert!(result.final_task().is_none());
        assert!(result.results().is_empty());
    }

    #[tokio::test]
    async fn test_single_task() {
        let mut graph = DependencyGraph::new();
        graph.add_task(constant("only", json!(42)));

        let result = TaskExecutor::default().execute(graph).await.unwrap();

        let task = result.task("only").unwrap();
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.result(), Some(&json!(42)));
        assert!(task.execution_time().is_some());
        assert_eq!(result.result("only"), Some(&json!(42)));
        assert_eq!(result.final_task().map(Task::id), Some("only"));
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_running() {
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut graph = DependencyGraph::new();
        for id in ["a", "b"] {
            let ran = Arc::clone(&ran);
            graph.add_task(Task::from_fn(id, move |_| {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(TaskOutput::Null)
            }));
        }
        graph.add_task(constant("free", json!(1)));
        graph.add_dependency("b", "a");
        graph.add_dependency("a", "b");

        let err = TaskExecutor::default().execute(graph).await.unwrap_err();

        assert!(matches!(err, DagError::CycleDetected { sorted: 1, total: 3, .. }));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dangling_edge_is_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_task(constant("a", json!(1)));
        graph.add_dependency("a", "missing");

        let err = TaskExecutor::default().execute(graph).await.unwrap_err();
        assert!(matches!(err, DagError::MissingTask { .. }));
    }

    #[tokio::test]
    async fn test_finished_task_cannot_run_again() {
        let mut graph = DependencyGraph::new();
        graph.add_task(constant("a", json!(1)));
        let first = TaskExecutor::default().execute(graph).await.unwrap();

        let mut graph = DependencyGraph::new();
        for task in first.into_tasks() {
            graph.add_task(task);
        }

        let err = TaskExecutor::default().execute(graph).await.unwrap_err();
        assert!(matches!(err, DagError::TaskNotPending(ref id) if id == "a"));
    }

    #[tokio::test]
    async fn test_panicking_async_task_is_recorded() {
        let mut graph = DependencyGraph::new();
        graph.add_task(Task::from_async("boom", |_| async {
            if true {
                panic!("async kaboom");
            }
            Ok(TaskOutput::Null)
        }));
        graph.add_task(Task::from_fn("after", |input| Ok(json!(input.len()))));
        graph.add_dependency("after", "boom");

        let result = TaskExecutor::default().execute(graph).await.unwrap();

        let boom = result.task("boom").unwrap();
        assert_eq!(boom.status(), TaskStatus::Failed);
        assert_eq!(boom.error().unwrap().message(), "Task panicked: async kaboom");
        assert_eq!(result.result("boom"), Some(&TaskOutput::Null));
        assert_eq!(result.result("after"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_report_lists_every_task() {
        let mut graph = DependencyGraph::new();
        graph.add_task(constant("ok", json!("fine")));
        graph.add_task(Task::from_fn("bad", |_| Err(TaskError::new("broken"))));

        let result = TaskExecutor::new(ExecutorConfig::default().with_max_concurrency(1))
            .execute(graph)
            .await
            .unwrap();
        let report = result.to_string();

        assert!(report.contains("Task ok status is completed."));
        assert!(report.contains("Response is \"fine\""));
        assert!(report.contains("Task bad status is failed."));
        assert!(report.contains("Error says broken."));
        assert!(report.contains("All tasks completed in"));
        assert_eq!(result.failed().map(Task::id).collect::<Vec<_>>(), vec!["bad"]);
    }
}
