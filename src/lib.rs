use crate::api::graph_dto::TransitionGraphDto;
use crate::api::status_dto::cluster_dto::ClusterStatusDto;
use crate::domain::engine::PolicyEngine;
use crate::domain::fencing::FencingCoordinator;
use crate::domain::membership::MembershipVerdict;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Loads a cluster status snapshot from `file_path` and computes its transition graph.
pub fn compute_transition_graph(file_path: &str, verdict: Option<&MembershipVerdict>, fencing: FencingCoordinator) -> Result<TransitionGraphDto> {
    logger::init();
    log::info!("Logger initialized. Starting scheduling pass for '{}'.", file_path);

    let status: ClusterStatusDto = parse_json_file::<ClusterStatusDto>(file_path)?;
    log::info!("Status snapshot parsed successfully.");

    let graph = PolicyEngine::new(fencing).compute(&status, verdict)?;
    log::info!("Transition graph computed with {} actions.", graph.action_count);

    Ok(graph)
}
