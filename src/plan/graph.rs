//! Dependency graph queries over a stack plan

use std::collections::HashSet;

use anyhow::{bail, Result};

use crate::plan::config::{PlanConfig, StackConfig};
use crate::plan::status::{StackStatus, StatusBoard};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Order stacks so that every stack comes after everything it requires.
///
/// Ties keep plan order. Fails with the offending path if the requirements
/// form a cycle. Unknown requirement names are ignored here; validation
/// reports them separately.
pub fn topological_order(plan: &PlanConfig) -> Result<Vec<&str>> {
    let mut marks = vec![Mark::Unvisited; plan.stacks.len()];
    let mut order = Vec::with_capacity(plan.stacks.len());
    let mut path = Vec::new();

    for start in 0..plan.stacks.len() {
        visit(plan, start, &mut marks, &mut path, &mut order)?;
    }

    Ok(order)
}

fn visit<'a>(
    plan: &'a PlanConfig,
    at: usize,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<&'a str>,
) -> Result<()> {
    match marks[at] {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            let from = path.iter().position(|&i| i == at).unwrap_or(0);
            let cycle: Vec<&str> = path[from..]
                .iter()
                .chain(std::iter::once(&at))
                .map(|&i| plan.stacks[i].name.as_str())
                .collect();
            bail!("Dependency cycle: {}", cycle.join(" -> "));
        }
        Mark::Unvisited => {}
    }

    marks[at] = Mark::InProgress;
    path.push(at);
    for dep in &plan.stacks[at].requires {
        if let Some(next) = plan.stacks.iter().position(|s| &s.name == dep) {
            visit(plan, next, marks, path, order)?;
        }
    }
    path.pop();
    marks[at] = Mark::Done;
    order.push(plan.stacks[at].name.as_str());
    Ok(())
}

/// Pending stacks whose requirements have all completed, in plan order.
#[must_use]
pub fn ready_stacks<'a>(plan: &'a PlanConfig, board: &StatusBoard) -> Vec<&'a StackConfig> {
    plan.stacks
        .iter()
        .filter(|stack| matches!(board.get(&stack.name), Some(StackStatus::Pending)))
        .filter(|stack| {
            stack
                .requires
                .iter()
                .all(|dep| matches!(board.get(dep), Some(StackStatus::Complete)))
        })
        .collect()
}

/// Every stack that directly or transitively requires `name`, in plan order.
#[must_use]
pub fn dependents_of<'a>(plan: &'a PlanConfig, name: &str) -> Vec<&'a str> {
    let mut affected: HashSet<&str> = HashSet::from([name]);
    loop {
        let before = affected.len();
        for stack in &plan.stacks {
            if stack.requires.iter().any(|dep| affected.contains(dep.as_str())) {
                affected.insert(stack.name.as_str());
            }
        }
        if affected.len() == before {
            break;
        }
    }

    plan.stacks
        .iter()
        .map(|s| s.name.as_str())
        .filter(|n| *n != name && affected.contains(n))
        .collect()
}
