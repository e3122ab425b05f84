pub mod actions;
pub mod emitter;
pub mod notify;
pub mod ordering;
pub mod stonith;

use crate::api::graph_dto::TransitionGraphDto;
use crate::domain::cluster::working_set::WorkingSet;
use crate::domain::fencing::FencingCoordinator;
use crate::error::Result;

/// Turns an allocated working set into the transition graph for the executor.
pub fn build_transition_graph(ws: &mut WorkingSet, fencing: &FencingCoordinator) -> Result<TransitionGraphDto> {
    actions::create_resource_actions(ws);
    stonith::schedule_fencing(ws, fencing);
    ordering::apply_ordering_constraints(ws);
    ordering::propagate_required(ws);
    notify::schedule_notifications(ws);
    stonith::schedule_shutdowns(ws);
    ordering::apply_quorum_gating(ws);

    let order = ordering::topological_order(ws)?;
    ordering::propagate_runnable(ws, &order);
    Ok(emitter::emit_graph(ws, &order))
}
