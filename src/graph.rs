use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;
use crate::cycle_check::{describe_cycle, find_cycle_path, NO_CYCLE};
use crate::{DagError, Task};

/// Tasks plus the parent -> children edges between them.
///
/// The graph owns every task added to it. Edges may name ids that have no
/// task yet; they are checked the first time the graph is ordered.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    tasks: HashMap<String, Task>,
    order: Vec<String>,
    parent_to_children: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `task` under its id, replacing any task already stored there.
    pub fn add_task(&mut self, task: Task) {
        let id = task.id().to_string();
        if self.tasks.insert(id.clone(), task).is_none() {
            self.order.push(id);
        }
    }

    /// Declares that `child` waits for the outcome of `parent`.
    ///
    /// Repeating an edge that already exists has no effect.
    pub fn add_dependency(&mut self, child: impl Into<String>, parent: impl Into<String>) {
        let child = child.into();
        let parent = parent.into();
        let children = self.parent_to_children.entry(parent).or_default();

        if children.contains(&child) {
            debug!(child = %child, "ignoring duplicate dependency edge");
            return;
        }
        children.push(child);
    }

    /// Direct dependents of `parent`, in the order they were declared.
    pub fn children(&self, parent: &str) -> &[String] {
        self.parent_to_children
            .get(parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Direct parents of `child`, in task insertion order.
    pub fn parents(&self, child: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|parent| self.children(parent).iter().any(|c| c == child))
            .cloned()
            .collect()
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn task_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn take_task(&mut self, id: &str) -> Option<Task> {
        self.tasks.remove(id)
    }

    pub fn validate(&self) -> Result<(), DagError> {
        for parent in &self.order {
            for child in self.children(parent) {
                if !self.contains(child) {
                    return Err(DagError::MissingTask {
                        id: child.clone(),
                        child: child.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        // Edges whose parent was never added are not reachable through `order`.
        let mut dangling: Vec<(&String, &Vec<String>)> = self
            .parent_to_children
            .iter()
            .filter(|(parent, children)| !self.contains(parent) && !children.is_empty())
            .collect();
        dangling.sort_by(|a, b| a.0.cmp(b.0));

        if let Some((parent, children)) = dangling.first() {
            return Err(DagError::MissingTask {
                id: (*parent).clone(),
                child: children[0].clone(),
                parent: (*parent).clone(),
            });
        }

        Ok(())
    }

    /// Kahn's algorithm.
    ///
    /// Ready tasks are emitted in the order they became ready; tasks that are
    /// ready from the start keep their insertion order.
    pub fn topological_sort(&self) -> Result<Vec<String>, DagError> {
        self.validate()?;

        let mut in_degrees: HashMap<&str, usize> =
            self.order.iter().map(|id| (id.as_str(), 0)).collect();
        for children in self.parent_to_children.values() {
            for child in children {
                if let Some(degree) = in_degrees.get_mut(child.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degrees.get(id) == Some(&0))
            .collect();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(current) = queue.pop_front() {
            sorted.push(current.to_string());

            for child in self.children(current) {
                if let Some(degree) = in_degrees.get_mut(child.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child.as_str());
                    }
                }
            }
        }

        if sorted.len() != self.tasks.len() {
            let path = self.find_cycle_path().unwrap_or_default();
            return Err(DagError::CycleDetected {
                message: describe_cycle(&path),
                path,
                sorted: sorted.len(),
                total: self.tasks.len(),
                in_degrees: in_degrees
                    .into_iter()
                    .map(|(id, degree)| (id.to_string(), degree))
                    .collect::<BTreeMap<_, _>>(),
            });
        }

        Ok(sorted)
    }

    pub fn find_cycle_path(&self) -> Option<Vec<String>> {
        find_cycle_path(&self.order, &self.parent_to_children)
    }

    pub fn find_cycle(&self) -> String {
        match self.find_cycle_path() {
            Some(path) => describe_cycle(&path),
            None => NO_CYCLE.to_string(),
        }
    }

    /// Adjacency listing in execution order followed by the order itself.
    /// A graph that cannot be ordered is reported, not returned as an error.
    pub fn visualize(&self) -> String {
        let rule = "----------------------------------------\n";
        let mut out = String::from("Graphical Representation of DAG Tasks and Dependencies\n");
        out.push_str(rule);

        let sorted = match self.topological_sort() {
            Ok(sorted) => {
                for id in &sorted {
                    let children = self.children(id);
                    if children.is_empty() {
                        out.push_str(&format!("{id} [No children]\n"));
                    } else {
                        out.push_str(&format!("{id} -> ({})\n", children.join(", ")));
                    }
                }
                Some(sorted)
            }
            Err(DagError::CycleDetected { .. }) => {
                out.push_str("Cycle Detected\n");
                None
            }
            Err(e) => {
                out.push_str(&format!("{e}\n"));
                None
            }
        };

        out.push_str(rule);
        if let Some(sorted) = sorted {
            out.push_str("Topological Order of Execution: \n");
            out.push_str(&sorted.join(" -> "));
            out.push('\n');
        }

        out
    }
}
