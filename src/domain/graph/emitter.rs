use std::collections::{BTreeSet, HashMap, HashSet};

use crate::api::graph_dto::{GraphActionDto, SynapseDto, TransitionGraphDto};
use crate::domain::cluster::action::ActionKey;
use crate::domain::cluster::working_set::WorkingSet;

/// Emits every required action in topological order with sequential ids.
///
/// Actions that wait for the same inputs and share a priority form one synapse. Edges through
/// optional actions that are not emitted are collapsed onto the nearest emitted actions.
pub fn emit_graph(ws: &mut WorkingSet, order: &[ActionKey]) -> TransitionGraphDto {
    // 1. Assign ids
    let mut next_id = 0;
    for key in order {
        let action = &mut ws.actions[*key];
        action.processed = true;
        if action.is_required() && !action.is_placeholder() {
            action.id = Some(next_id);
            action.dumped = true;
            next_id += 1;
        }
    }

    // 2. Group into synapses
    let mut synapses: Vec<SynapseDto> = Vec::new();
    let mut synapse_of: HashMap<(Vec<usize>, i64), usize> = HashMap::new();
    for key in order {
        let action = &ws.actions[*key];
        let Some(id) = action.id else {
            continue;
        };

        let inputs = emitted_neighbours(ws, *key, false);
        let dto = GraphActionDto {
            id,
            uuid: action.uuid.to_string(),
            task: action.task.name(),
            resource: action.resource.map(|r| ws.resource_name(r).to_string()),
            node: action.node.map(|n| ws.node_name(n).to_string()),
            before: emitted_neighbours(ws, *key, true),
            after: inputs.clone(),
            runnable: action.flags.runnable,
            pseudo: action.flags.pseudo,
            on_fail: action.on_fail.as_str().to_string(),
            reason: action.reason.clone(),
        };

        let priority = action.priority;
        let index = *synapse_of.entry((inputs.clone(), priority)).or_insert_with(|| {
            synapses.push(SynapseDto { id: synapses.len(), priority, inputs, actions: Vec::new() });
            synapses.len() - 1
        });
        synapses[index].actions.push(dto);
    }

    let graph = TransitionGraphDto { have_quorum: ws.have_quorum, action_count: next_id, synapses };
    log::info!("Transition graph: {} actions in {} synapses", graph.action_count, graph.synapses.len());
    graph
}

/// Ids of the nearest emitted successors (`forward`) or predecessors, looking through optional actions.
fn emitted_neighbours(ws: &WorkingSet, key: ActionKey, forward: bool) -> Vec<usize> {
    let edges = |k: ActionKey| {
        let action = &ws.actions[k];
        let edges = if forward { &action.before } else { &action.after };
        edges.iter().map(|e| e.action).collect::<Vec<_>>()
    };

    let mut found = BTreeSet::new();
    let mut seen = HashSet::new();
    let mut stack = edges(key);
    while let Some(next) = stack.pop() {
        if !seen.insert(next) {
            continue;
        }
        match ws.actions[next].id {
            Some(id) => {
                found.insert(id);
            }
            None => stack.extend(edges(next)),
        }
    }
    found.into_iter().collect()
}
