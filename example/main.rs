use dagexec::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

// Sleeps, records its message in the shared map, and returns it.
fn report_task(id: &str, secs: u64, shared: &SharedState<BTreeMap<String, String>>) -> Task {
    let name = id.to_string();
    let shared = shared.clone();

    Task::from_fn(id, move |parents: TaskInput| {
        std::thread::sleep(Duration::from_secs(secs));

        let mut message = String::new();
        for (parent, output) in &parents {
            if let Some(text) = output.as_str() {
                message.push_str(&format!("({parent}: {text}) "));
            }
        }
        message.push_str(&format!("Task {name} completed in {secs} second(s)"));

        shared.modify(|data| {
            let mut data = data.clone();
            data.insert(name.clone(), message.clone());
            data
        });

        Ok(json!(message))
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(None);

    let shared = SharedState::default();
    let mut graph = DependencyGraph::new();

    graph.add_task(report_task("A", 1, &shared));
    graph.add_task(report_task("B", 2, &shared));
    graph.add_task(report_task("C", 1, &shared));
    graph.add_task(report_task("D", 3, &shared));
    graph.add_task(Task::from_fn("E", |_| Err(TaskError::new("E has nothing to do"))));

    graph.add_dependency("C", "A");
    graph.add_dependency("D", "C");
    graph.add_dependency("D", "E");

    println!("=== Dependency graph ===");
    println!("{}", graph.visualize());

    let executor = TaskExecutor::new(ExecutorConfig::from_env());
    let result = executor.execute(graph).await?;

    println!("=== Run report ===");
    println!("{result}");
    println!("Completion order: {}", result.execution_order().join(" -> "));

    println!("=== Shared data ===");
    for (task, message) in shared.read() {
        println!("{task}: {message}");
    }

    Ok(())
}
