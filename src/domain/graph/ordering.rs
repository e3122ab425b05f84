use std::collections::{BTreeSet, HashMap};

use crate::domain::cluster::action::{ActionKey, Needs, OrderKind, Task};
use crate::domain::cluster::working_set::WorkingSet;
use crate::error::{Error, Result};

/// Turns ordering constraints into edges between every matching action of the two resources.
/// Symmetrical constraints also order the inverse tasks the other way round.
pub fn apply_ordering_constraints(ws: &mut WorkingSet) {
    let orderings = ws.orderings.clone();
    for constraint in orderings {
        let firsts = ws.resource_actions(constraint.first, constraint.first_task);
        let thens = ws.resource_actions(constraint.then, constraint.then_task);
        for first in &firsts {
            for then in &thens {
                ws.order(*first, *then, constraint.kind);
            }
        }

        if !constraint.symmetrical {
            continue;
        }
        let (Some(first_inverse), Some(then_inverse)) = (constraint.first_task.inverse(), constraint.then_task.inverse()) else {
            continue;
        };
        let firsts = ws.resource_actions(constraint.first, first_inverse);
        let thens = ws.resource_actions(constraint.then, then_inverse);
        for then in &thens {
            for first in &firsts {
                ws.order(*then, *first, constraint.kind.inverse());
            }
        }
    }
}

fn make_required(ws: &mut WorkingSet, key: ActionKey) -> bool {
    let action = &mut ws.actions[key];
    if action.flags.optional && !action.is_placeholder() {
        action.flags.optional = false;
        log::debug!("Action {} is now required", action.uuid);
        return true;
    }
    false
}

/// Start and stop of the same instance on the same node: a restart needs both.
fn restart_counterpart(ws: &WorkingSet, key: ActionKey) -> Option<ActionKey> {
    let action = &ws.actions[key];
    let counterpart = match action.task {
        Task::Start => Task::Stop,
        Task::Stop => Task::Start,
        _ => return None,
    };
    let node = action.node?;
    ws.find_action(counterpart, action.resource, Some(node), action.instance)
}

/// Spreads "required" over implying edges and restart pairs until nothing changes.
pub fn propagate_required(ws: &mut WorkingSet) {
    loop {
        let mut changed = false;
        let keys: Vec<ActionKey> = ws.actions.keys().collect();
        for key in keys {
            if ws.actions[key].flags.optional {
                continue;
            }
            let implied: Vec<ActionKey> = ws.actions[key]
                .before
                .iter()
                .filter(|e| e.kind == OrderKind::ImpliesThen)
                .chain(ws.actions[key].after.iter().filter(|e| e.kind == OrderKind::ImpliesFirst))
                .map(|e| e.action)
                .chain(restart_counterpart(ws, key))
                .collect();
            for other in implied {
                changed |= make_required(ws, other);
            }
        }
        if !changed {
            break;
        }
    }
}

/// Without quorum, actions that need it cannot run unless the policy ignores quorum.
pub fn apply_quorum_gating(ws: &mut WorkingSet) {
    if ws.can_change_resources() {
        return;
    }
    for action in ws.actions.values_mut().filter(|a| a.needs == Needs::Quorum) {
        action.mark_unrunnable("no quorum");
    }
}

/// Topological order of all actions, ties broken by creation order. A cycle is a configuration error.
pub fn topological_order(ws: &WorkingSet) -> Result<Vec<ActionKey>> {
    let keys: Vec<ActionKey> = ws.actions.keys().collect();
    let ordinal: HashMap<ActionKey, usize> = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    let mut in_degree: Vec<usize> = keys.iter().map(|k| ws.actions[*k].after.len()).collect();
    let mut ready: BTreeSet<usize> = (0..keys.len()).filter(|i| in_degree[*i] == 0).collect();
    let mut order = Vec::with_capacity(keys.len());

    while let Some(index) = ready.pop_first() {
        let key = keys[index];
        order.push(key);
        for edge in &ws.actions[key].before {
            let next = ordinal[&edge.action];
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() == keys.len() {
        return Ok(order);
    }

    // every leftover action has a leftover predecessor, walking them must revisit one
    let start = (0..keys.len()).find(|i| in_degree[*i] > 0).unwrap_or(0);
    let mut path = vec![start];
    let cycle_start = loop {
        let current = keys[*path.last().unwrap_or(&start)];
        let Some(previous) = ws.actions[current].after.iter().map(|e| ordinal[&e.action]).find(|i| in_degree[*i] > 0) else {
            break 0;
        };
        if let Some(position) = path.iter().position(|p| *p == previous) {
            break position;
        }
        path.push(previous);
    };
    let mut cycle: Vec<String> = path[cycle_start..].iter().rev().map(|i| ws.actions[keys[*i]].uuid.to_string()).collect();
    if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
    }
    log::error!("Ordering constraints form a cycle: {}", cycle.join(" -> "));
    Err(Error::OrderingCycle(cycle))
}

/// Marks every action that mandatorily depends on an unrunnable action as unrunnable. `order` must be topological.
pub fn propagate_runnable(ws: &mut WorkingSet, order: &[ActionKey]) {
    for key in order {
        if !ws.actions[*key].flags.runnable {
            continue;
        }
        let blocker = ws.actions[*key]
            .after
            .iter()
            .find(|e| e.kind.is_mandatory() && !ws.actions[e.action].flags.runnable)
            .map(|e| ws.actions[e.action].uuid.to_string());
        if let Some(blocker) = blocker {
            ws.actions[*key].mark_unrunnable(format!("depends on unrunnable {}", blocker));
        }
    }
}
