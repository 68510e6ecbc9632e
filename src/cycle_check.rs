use std::collections::{HashMap, HashSet};

pub const NO_CYCLE: &str = "No cycle detected in the DAG.";

/// Depth-first search for the first cycle reachable from `roots`, visited in
/// the given order.
///
/// The returned path is closed: it starts and ends with the task whose
/// recursion-stack hit revealed the cycle, and every id in it depends on the
/// next one.
pub fn find_cycle_path(
    roots: &[String],
    parent_to_children: &HashMap<String, Vec<String>>,
) -> Option<Vec<String>> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut rec_stack: HashSet<&str> = HashSet::new();
    let mut parent_of: HashMap<&str, &str> = HashMap::new();
    // (task, index of the next child to visit); explicit so long chains
    // cannot exhaust the thread stack
    let mut stack: Vec<(&str, usize)> = Vec::new();

    for root in roots {
        let root = root.as_str();
        if visited.contains(root) {
            continue;
        }
        visited.insert(root);
        rec_stack.insert(root);
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (task_id, next) = *frame;
            let children = parent_to_children
                .get(task_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let Some(child) = children.get(next) else {
                rec_stack.remove(task_id);
                stack.pop();
                continue;
            };
            frame.1 += 1;

            let child = child.as_str();
            if !visited.contains(child) {
                parent_of.insert(child, task_id);
                visited.insert(child);
                rec_stack.insert(child);
                stack.push((child, 0));
            } else if rec_stack.contains(child) {
                // back edge closes the loop
                parent_of.insert(child, task_id);
                return Some(backtrack(child, &parent_of));
            }
        }
    }

    None
}

fn backtrack(trigger: &str, parent_of: &HashMap<&str, &str>) -> Vec<String> {
    let mut path = vec![trigger.to_string()];
    let mut current = trigger;

    while let Some(&parent) = parent_of.get(current) {
        path.push(parent.to_string());
        if parent == trigger {
            break;
        }
        current = parent;
    }

    path
}

/// Renders a closed path as `Task X depends on Task Y, but also Task Y depends
/// on Task Z.`
pub fn describe_cycle(path: &[String]) -> String {
    if path.len() < 2 {
        return NO_CYCLE.to_string();
    }

    let parts: Vec<String> = path
        .windows(2)
        .map(|edge| format!("Task {} depends on Task {}", edge[0], edge[1]))
        .collect();

    format!("{}.", parts.join(", but also "))
}
