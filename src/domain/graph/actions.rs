use crate::domain::cluster::action::{ActionKey, OrderKind, Task};
use crate::domain::cluster::node::NodeKey;
use crate::domain::cluster::resource::{RecoveryType, ResourceKey, RestartType, Role};
use crate::domain::cluster::working_set::WorkingSet;

/// Creates the start/stop/promote/demote/monitor actions that move every resource from where it
/// runs to where it was allocated, with the orderings inside one resource.
pub fn create_resource_actions(ws: &mut WorkingSet) {
    if ws.is_frozen() {
        log::info!("No quorum and no-quorum policy is freeze, leaving every resource as it is");
        return;
    }
    for rsc in ws.allocatable_resources() {
        let resource = &ws.resources[rsc];
        if !resource.is_managed() {
            log::debug!("Resource {} is unmanaged, leaving it alone", resource.id);
            continue;
        }
        if resource.is_multi_active() && resource.recovery_type == RecoveryType::Block {
            log::warn!("Resource {} is active on {} nodes, blocking recovery", resource.id, resource.running_on.len());
            continue;
        }

        if resource.is_clone() {
            clone_actions(ws, rsc);
        } else {
            primitive_actions(ws, rsc);
        }
    }
}

/// Whether a failed resource should be restarted where it is.
fn restarts_on_failure(ws: &WorkingSet, rsc: ResourceKey, node: NodeKey) -> bool {
    let resource = &ws.resources[rsc];
    resource.status.failed
        && resource.restart_type == RestartType::Restart
        && ws.can_change_resources()
        && (resource.fail_counts.is_empty() || resource.fail_count(node) > 0)
}

fn add_monitor(ws: &mut WorkingSet, rsc: ResourceKey, start: ActionKey, node: NodeKey, instance: usize) {
    let Some(interval_ms) = ws.resources[rsc].monitor_interval_ms else {
        return;
    };
    let optional = ws.actions[start].flags.optional;
    let monitor = ws.find_or_create_action(Task::Monitor { interval_ms }, Some(rsc), Some(node), instance, optional);
    ws.order(start, monitor, OrderKind::ImpliesThen);
}

fn primitive_actions(ws: &mut WorkingSet, rsc: ResourceKey) {
    let resource = &ws.resources[rsc];
    let mut running_on = resource.running_on.clone();
    running_on.dedup();
    let target = resource.allocated_to.first().copied();
    let multi_active = resource.is_multi_active();
    let (role, next_role) = (resource.role, resource.next_role);

    if multi_active {
        log::warn!("Resource {} is active on {} nodes, recovering with {:?}", resource.id, running_on.len(), resource.recovery_type);
    }

    let mut stops = Vec::new();
    for node in running_on.iter().copied() {
        let stays = target == Some(node) && !multi_active;
        if stays {
            let restart = restarts_on_failure(ws, rsc, node);
            if restart {
                log::info!("Recovering failed resource {} on {}", ws.resources[rsc].id, ws.node_name(node));
            }
            let stop = ws.find_or_create_action(Task::Stop, Some(rsc), Some(node), 0, !restart);
            let start = ws.find_or_create_action(Task::Start, Some(rsc), Some(node), 0, !restart);
            ws.order(stop, start, OrderKind::Mandatory);

            if role == Role::Master {
                let demote = ws.find_or_create_action(Task::Demote, Some(rsc), Some(node), 0, !restart && next_role == Role::Master);
                ws.order(demote, stop, OrderKind::ImpliesFirst);
            }
            if next_role == Role::Master {
                let promote = ws.find_or_create_action(Task::Promote, Some(rsc), Some(node), 0, !restart && role == Role::Master);
                ws.order(start, promote, OrderKind::ImpliesThen);
                if let Some(demote) = ws.find_action(Task::Demote, Some(rsc), Some(node), 0) {
                    ws.order(demote, promote, OrderKind::Mandatory);
                }
            }
            add_monitor(ws, rsc, start, node, 0);
            continue;
        }

        let stop = ws.find_or_create_action(Task::Stop, Some(rsc), Some(node), 0, false);
        if role == Role::Master {
            let demote = ws.find_or_create_action(Task::Demote, Some(rsc), Some(node), 0, false);
            ws.order(demote, stop, OrderKind::Mandatory);
        }
        log::info!("Stop {} on {}", ws.resources[rsc].id, ws.node_name(node));
        stops.push(stop);
    }

    match target {
        Some(node) if multi_active || !running_on.contains(&node) => {
            let start = ws.find_or_create_action(Task::Start, Some(rsc), Some(node), 0, false);
            for stop in &stops {
                ws.order(*stop, start, OrderKind::Mandatory);
            }
            if next_role == Role::Master {
                let promote = ws.find_or_create_action(Task::Promote, Some(rsc), Some(node), 0, false);
                ws.order(start, promote, OrderKind::Mandatory);
            }
            add_monitor(ws, rsc, start, node, 0);
            log::info!("Start {} on {}", ws.resources[rsc].id, ws.node_name(node));
        }
        Some(_) => {}
        None => {
            let resource = &ws.resources[rsc];
            if !resource.status.runnable {
                // carries "cannot run" to everything ordered after this resource's start
                let reason = format!("no node can run {}", resource.id);
                let placeholder = ws.find_or_create_action(Task::Start, Some(rsc), None, 0, true);
                ws.actions[placeholder].mark_unrunnable(reason);
            }
        }
    }
}

fn clone_actions(ws: &mut WorkingSet, rsc: ResourceKey) {
    let resource = &ws.resources[rsc];
    let mut nodes: Vec<NodeKey> = resource.running_on.iter().chain(resource.allocated_to.iter()).copied().collect();
    nodes.sort();
    nodes.dedup();

    for node in nodes {
        let resource = &ws.resources[rsc];
        let running = resource.running_count(node);
        let wanted = resource.allocated_count(node);
        let kept = running.min(wanted);
        let restart = restarts_on_failure(ws, rsc, node);

        for instance in 0..kept {
            let stop = ws.find_or_create_action(Task::Stop, Some(rsc), Some(node), instance, !restart);
            let start = ws.find_or_create_action(Task::Start, Some(rsc), Some(node), instance, !restart);
            ws.order(stop, start, OrderKind::Mandatory);
            add_monitor(ws, rsc, start, node, instance);
        }
        for instance in kept..running {
            ws.find_or_create_action(Task::Stop, Some(rsc), Some(node), instance, false);
        }
        for instance in kept..wanted {
            let start = ws.find_or_create_action(Task::Start, Some(rsc), Some(node), instance, false);
            add_monitor(ws, rsc, start, node, instance);
        }
        if running != wanted {
            log::info!("Clone {} goes from {} to {} instance(s) on {}", ws.resources[rsc].id, running, wanted, ws.node_name(node));
        }
    }
}
