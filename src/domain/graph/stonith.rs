use tracing::warn;

use crate::domain::cluster::action::{Needs, OrderKind, Task};
use crate::domain::cluster::node::{NodeKey, NodeType};
use crate::domain::cluster::resource::{OnFail, ResourceKey};
use crate::domain::cluster::working_set::WorkingSet;
use crate::domain::fencing::FencingCoordinator;
use crate::domain::utils::score::Score;

/// Schedules a fence action for every unclean member node.
///
/// Stops and demotes on a fenced node become pseudo actions that complete with the fence, and
/// every start of a resource that was on the node waits for the fence directly.
pub fn schedule_fencing(ws: &mut WorkingSet, fencing: &FencingCoordinator) {
    let unclean: Vec<NodeKey> = ws.nodes.iter().filter(|(_, n)| n.unclean && n.node_type == NodeType::Member).map(|(k, _)| k).collect();

    for node in unclean {
        let uname = ws.nodes[node].uname.clone();
        let fence = ws.find_or_create_action(Task::Fence, None, Some(node), 0, false);
        {
            let action = &mut ws.actions[fence];
            action.priority = Score::INFINITY;
            action.on_fail = OnFail::Block;
        }

        if !ws.options.stonith_enabled {
            warn!(node = %uname, "node is unclean but fencing is disabled");
            ws.actions[fence].mark_unrunnable("fencing is disabled");
        } else if !fencing.can_fence(&uname) {
            warn!(node = %uname, "node is unclean but no fencing device can fence it");
            ws.actions[fence].mark_unrunnable(format!("no fencing device can fence {}", uname));
        } else {
            log::info!("Scheduling {} of unclean node {}", ws.options.stonith_action, uname);
        }

        let mut recovered: Vec<ResourceKey> = Vec::new();
        for key in ws.node_actions(node) {
            if key == fence || !ws.actions[key].task.is_stop_like() {
                continue;
            }
            let action = &mut ws.actions[key];
            action.flags.pseudo = true;
            action.needs = Needs::Fencing;
            if let Some(rsc) = action.resource {
                if !recovered.contains(&rsc) {
                    recovered.push(rsc);
                }
            }
            ws.order(fence, key, OrderKind::Mandatory);
        }

        for rsc in recovered {
            for start in ws.resource_actions(rsc, Task::Start) {
                if ws.actions[start].node != Some(node) {
                    ws.order(fence, start, OrderKind::Mandatory);
                }
            }
        }
    }
}

/// Nodes shutting down get an `all_stopped` barrier after their stops, followed by the shutdown itself.
pub fn schedule_shutdowns(ws: &mut WorkingSet) {
    let leaving: Vec<NodeKey> = ws.nodes.iter().filter(|(_, n)| n.shutdown && n.online && !n.unclean).map(|(k, _)| k).collect();

    for node in leaving {
        let stops: Vec<_> = ws.node_actions(node).into_iter().filter(|k| ws.actions[*k].task == Task::Stop).collect();

        let barrier = ws.find_or_create_action(Task::AllStopped, None, Some(node), 0, false);
        ws.actions[barrier].flags.pseudo = true;
        for stop in stops {
            ws.order(stop, barrier, OrderKind::Mandatory);
        }

        let shutdown = ws.find_or_create_action(Task::Shutdown, None, Some(node), 0, false);
        ws.order(barrier, shutdown, OrderKind::Mandatory);
        log::info!("Scheduling shutdown of {}", ws.node_name(node));
    }
}
