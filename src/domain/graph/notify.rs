use crate::domain::cluster::action::{ActionKey, NotifyOp, NotifyPhase, OrderKind, Task};
use crate::domain::cluster::node::NodeKey;
use crate::domain::cluster::resource::ResourceKey;
use crate::domain::cluster::working_set::WorkingSet;

/// Wraps the required starts and stops of every `notify` resource in notification brackets:
/// pre barrier, pre notifications, confirmed pre, the operations, post barrier, post notifications,
/// confirmed post. Stop brackets complete before start brackets begin.
pub fn schedule_notifications(ws: &mut WorkingSet) {
    let resources: Vec<ResourceKey> =
        ws.resources.iter().filter(|(_, r)| r.notify && r.is_allocatable() && r.is_managed()).map(|(k, _)| k).collect();

    for rsc in resources {
        let stop_bracket = bracket(ws, rsc, NotifyOp::Stop, Task::Stop);
        let start_bracket = bracket(ws, rsc, NotifyOp::Start, Task::Start);
        if let (Some((_, stops_confirmed)), Some((starts_pre, _))) = (stop_bracket, start_bracket) {
            ws.order(stops_confirmed, starts_pre, OrderKind::Mandatory);
        }
    }
}

fn reachable(ws: &WorkingSet, nodes: &[NodeKey]) -> Vec<NodeKey> {
    let mut nodes: Vec<NodeKey> = nodes.iter().copied().filter(|n| ws.nodes[*n].is_reachable()).collect();
    nodes.sort();
    nodes.dedup();
    nodes
}

/// Returns the bracket's opening and closing barriers, or `None` when there is nothing to notify about.
fn bracket(ws: &mut WorkingSet, rsc: ResourceKey, op: NotifyOp, task: Task) -> Option<(ActionKey, ActionKey)> {
    let operations: Vec<ActionKey> =
        ws.resource_actions(rsc, task).into_iter().filter(|k| ws.actions[*k].is_required() && ws.actions[*k].node.is_some()).collect();
    if operations.is_empty() {
        return None;
    }

    let before = reachable(ws, &ws.resources[rsc].running_on);
    let after = reachable(ws, &ws.resources[rsc].allocated_to);

    let (pre, confirmed_pre) = phase(ws, rsc, NotifyPhase::Pre, op, &before);
    let (post, confirmed_post) = phase(ws, rsc, NotifyPhase::Post, op, &after);
    for operation in operations {
        ws.order(confirmed_pre, operation, OrderKind::Mandatory);
        ws.order(operation, post, OrderKind::Mandatory);
    }
    log::debug!("Notification bracket for {} of {}", task, ws.resources[rsc].id);
    Some((pre, confirmed_post))
}

fn phase(ws: &mut WorkingSet, rsc: ResourceKey, phase: NotifyPhase, op: NotifyOp, nodes: &[NodeKey]) -> (ActionKey, ActionKey) {
    let open = ws.find_or_create_action(Task::NotifyBarrier { phase, op, confirmed: false }, Some(rsc), None, 0, false);
    let confirmed = ws.find_or_create_action(Task::NotifyBarrier { phase, op, confirmed: true }, Some(rsc), None, 0, false);
    ws.actions[open].flags.pseudo = true;
    ws.actions[confirmed].flags.pseudo = true;

    if nodes.is_empty() {
        ws.order(open, confirmed, OrderKind::Mandatory);
    }
    for node in nodes {
        let notify = ws.find_or_create_action(Task::Notify { phase, op }, Some(rsc), Some(*node), 0, false);
        ws.order(open, notify, OrderKind::Mandatory);
        ws.order(notify, confirmed, OrderKind::Mandatory);
    }
    (open, confirmed)
}
