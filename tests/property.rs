use std::collections::{HashMap, HashSet};

use dagexec::{DagError, DependencyGraph, Task, TaskOutput};
use proptest::prelude::*;

// Acyclic by construction: task i may only depend on tasks 0..i.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        let edges = proptest::collection::vec((any::<usize>(), any::<usize>()), 0..num_tasks * 2);
        edges.prop_map(move |raw| {
            let edges = raw
                .into_iter()
                .filter_map(|(child, parent)| {
                    let child = child % num_tasks;
                    if child == 0 {
                        return None;
                    }
                    Some((child, parent % child))
                })
                .collect();
            (num_tasks, edges)
        })
    })
}

fn build(num_tasks: usize, edges: &[(usize, usize)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    // Insert in reverse so insertion order and dependency order disagree.
    for i in (0..num_tasks).rev() {
        graph.add_task(Task::from_fn(format!("task_{i}"), |_| Ok(TaskOutput::Null)));
    }
    for (child, parent) in edges {
        graph.add_dependency(format!("task_{child}"), format!("task_{parent}"));
    }
    graph
}

proptest! {
    #[test]
    fn sort_respects_every_edge((num_tasks, edges) in dag_strategy(12)) {
        let graph = build(num_tasks, &edges);
        let order = graph.topological_sort().unwrap();

        prop_assert_eq!(order.len(), num_tasks);
        let unique: HashSet<_> = order.iter().collect();
        prop_assert_eq!(unique.len(), num_tasks);

        let position: HashMap<_, _> = order.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
        for (child, parent) in &edges {
            let parent_id = format!("task_{parent}");
            let child_id = format!("task_{child}");
            prop_assert!(position[&parent_id] < position[&child_id]);
        }
        prop_assert!(graph.find_cycle_path().is_none());
    }

    #[test]
    fn back_edge_is_always_found(
        (num_tasks, edges) in dag_strategy(12),
        pick in any::<usize>(),
    ) {
        prop_assume!(!edges.is_empty());
        let mut graph = build(num_tasks, &edges);

        // Reversing any existing edge closes a loop.
        let (child, parent) = edges[pick % edges.len()];
        graph.add_dependency(format!("task_{parent}"), format!("task_{child}"));

        let is_cycle = matches!(graph.topological_sort(), Err(DagError::CycleDetected { .. }));
        prop_assert!(is_cycle);

        let path = graph.find_cycle_path().unwrap();
        prop_assert!(path.len() >= 2);
        prop_assert_eq!(path.first(), path.last());
        // every id in the path depends on the next one
        for pair in path.windows(2) {
            prop_assert!(graph.children(&pair[1]).contains(&pair[0]));
        }
    }
}
