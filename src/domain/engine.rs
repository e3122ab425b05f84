use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::graph_dto::TransitionGraphDto;
use crate::api::status_dto::cluster_dto::ClusterStatusDto;
use crate::api::status_dto::resource_dto::ResourceDto;
use crate::domain::allocator::allocate;
use crate::domain::cluster::builder::build_working_set;
use crate::domain::cluster::working_set::WorkingSet;
use crate::domain::fencing::FencingCoordinator;
use crate::domain::graph::build_transition_graph;
use crate::domain::membership::MembershipVerdict;
use crate::error::Result;

/// Result of one scheduling pass.
#[derive(Debug)]
pub struct PassOutcome {
    pub pass_id: Uuid,
    pub working_set: WorkingSet,
    pub graph: TransitionGraphDto,
}

/// Stateless scheduler: every pass starts from a fresh snapshot.
#[derive(Debug)]
pub struct PolicyEngine {
    fencing: FencingCoordinator,
}

impl PolicyEngine {
    pub fn new(fencing: FencingCoordinator) -> Self {
        PolicyEngine { fencing }
    }

    pub fn fencing(&self) -> &FencingCoordinator {
        &self.fencing
    }

    /// Snapshot in, transition graph out.
    pub fn run_pass(&self, status: &ClusterStatusDto, verdict: Option<&MembershipVerdict>) -> Result<PassOutcome> {
        let pass_id = Uuid::new_v4();
        info!(%pass_id, nodes = status.nodes.len(), resources = status.resources.len(), "scheduling pass started");

        // 1. Unpack
        let mut working_set = build_working_set(status, verdict)?;

        // 2. Allocate
        allocate(&mut working_set)?;

        // 3. Plan
        let graph = build_transition_graph(&mut working_set, &self.fencing)?;

        info!(%pass_id, actions = graph.action_count, have_quorum = graph.have_quorum, "scheduling pass finished");
        Ok(PassOutcome { pass_id, working_set, graph })
    }

    pub fn compute(&self, status: &ClusterStatusDto, verdict: Option<&MembershipVerdict>) -> Result<TransitionGraphDto> {
        self.run_pass(status, verdict).map(|outcome| outcome.graph)
    }
}

/// Events that start a new scheduling pass.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// A fresh snapshot from the status source replaces the previous one.
    StatusUpdate(ClusterStatusDto),
    /// The membership verdict changed; rerun on the latest snapshot.
    MembershipChanged,
    /// A resource failed on a node after the latest snapshot was taken.
    ResourceFailed { resource: String, node: String },
}

/// Runs scheduling passes on a tokio task, one per trigger, against the latest snapshot.
pub struct EngineService {
    engine: PolicyEngine,
    latest: Option<ClusterStatusDto>,
}

impl EngineService {
    pub fn new(engine: PolicyEngine) -> Self {
        EngineService { engine, latest: None }
    }

    /// Spawns the service. Each pass reads the membership verdict once, when it starts.
    pub fn spawn(
        mut self,
        mut triggers: mpsc::Receiver<Trigger>,
        verdicts: Option<watch::Receiver<MembershipVerdict>>,
        graphs: mpsc::Sender<Result<TransitionGraphDto>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Policy engine shutting down");
                        break;
                    }
                    trigger = triggers.recv() => {
                        let Some(trigger) = trigger else {
                            info!("Trigger channel closed");
                            break;
                        };
                        if !self.apply(trigger) {
                            continue;
                        }
                        let verdict = verdicts.as_ref().map(|rx| rx.borrow().clone());
                        let Some(result) = self.pass(verdict.as_ref()) else {
                            continue;
                        };
                        if graphs.send(result).await.is_err() {
                            warn!("graph channel closed");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Folds a trigger into the latest snapshot. Returns false if no pass should run.
    fn apply(&mut self, trigger: Trigger) -> bool {
        match trigger {
            Trigger::StatusUpdate(status) => {
                self.latest = Some(status);
                true
            }
            Trigger::MembershipChanged => self.latest.is_some(),
            Trigger::ResourceFailed { resource, node } => {
                let Some(status) = self.latest.as_mut() else {
                    debug!(%resource, "failure reported before the first snapshot");
                    return false;
                };
                if !status.nodes.iter().any(|n| n.id == node) {
                    warn!(%resource, %node, "failure reported on unknown node");
                    return false;
                }
                match find_resource(&mut status.resources, &resource) {
                    Some(dto) => {
                        dto.status.failed = true;
                        *dto.status.fail_counts.entry(node).or_insert(0) += 1;
                        true
                    }
                    None => {
                        warn!(%resource, "failure reported for unknown resource");
                        false
                    }
                }
            }
        }
    }

    fn pass(&self, verdict: Option<&MembershipVerdict>) -> Option<Result<TransitionGraphDto>> {
        let status = self.latest.as_ref()?;
        let result = self.engine.compute(status, verdict);
        if let Err(e) = &result {
            warn!("scheduling pass failed: {e}");
        }
        Some(result)
    }
}

fn find_resource<'a>(resources: &'a mut [ResourceDto], id: &str) -> Option<&'a mut ResourceDto> {
    for resource in resources.iter_mut() {
        if resource.id == id {
            return Some(resource);
        }
        if let Some(child) = find_resource(&mut resource.children, id) {
            return Some(child);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::membership::MemberBitmap;
    use crate::error::Error;
    use crate::loader::parser::parse_json_str;

    fn status() -> ClusterStatusDto {
        parse_json_str(
            r#"{
                "nodes": [{"id": "n1", "online": true, "slot": 0}, {"id": "n2", "online": true, "slot": 1}],
                "resources": [{"id": "web", "status": {"runningOn": ["n1"]}}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_steady_state_is_empty() {
        let engine = PolicyEngine::new(FencingCoordinator::unavailable());
        let outcome = engine.run_pass(&status(), None).unwrap();
        assert_eq!(outcome.graph.action_count, 0);
        assert!(outcome.graph.have_quorum);
        assert!(outcome.working_set.find_resource("web").is_some());
    }

    #[test]
    fn test_failure_restarts_in_place() {
        let mut service = EngineService::new(PolicyEngine::new(FencingCoordinator::unavailable()));
        assert!(!service.apply(Trigger::ResourceFailed { resource: "web".into(), node: "n1".into() }));
        assert!(service.apply(Trigger::StatusUpdate(status())));
        assert!(service.apply(Trigger::ResourceFailed { resource: "web".into(), node: "n1".into() }));
        assert!(!service.apply(Trigger::ResourceFailed { resource: "db".into(), node: "n1".into() }));

        let graph = service.pass(None).unwrap().unwrap();
        assert!(graph.find("web_stop_n1").is_some());
        assert!(graph.find("web_start_n1").is_some());
    }

    #[test]
    fn test_failure_on_unknown_node_keeps_snapshot_usable() {
        let mut service = EngineService::new(PolicyEngine::new(FencingCoordinator::unavailable()));
        assert!(service.apply(Trigger::StatusUpdate(status())));
        assert!(!service.apply(Trigger::ResourceFailed { resource: "web".into(), node: "ghost".into() }));

        let web = &service.latest.as_ref().unwrap().resources[0];
        assert!(!web.status.failed);
        assert!(web.status.fail_counts.is_empty());

        assert!(service.apply(Trigger::MembershipChanged));
        let graph = service.pass(None).unwrap().unwrap();
        assert_eq!(graph.action_count, 0);
    }

    #[tokio::test]
    async fn test_service_reruns_on_membership_change() {
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let (verdict_tx, verdict_rx) = watch::channel(MembershipVerdict::new(1, MemberBitmap::from_slots(256, [0, 1]).unwrap()));
        let (graph_tx, mut graph_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let service = EngineService::new(PolicyEngine::new(FencingCoordinator::unavailable()));
        let handle = service.spawn(trigger_rx, Some(verdict_rx), graph_tx, shutdown_rx);

        trigger_tx.send(Trigger::StatusUpdate(status())).await.unwrap();
        let graph = graph_rx.recv().await.unwrap().unwrap();
        assert_eq!(graph.action_count, 0);

        // n1 drops out of membership: it is offline but was expected up with web on it
        verdict_tx.send(MembershipVerdict::new(2, MemberBitmap::from_slots(256, [1]).unwrap())).unwrap();
        trigger_tx.send(Trigger::MembershipChanged).await.unwrap();
        let graph = graph_rx.recv().await.unwrap().unwrap();
        assert!(graph.find("stonith_n1").is_some());
        assert!(!graph.have_quorum);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_service_reports_failed_passes() {
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let (graph_tx, mut graph_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let service = EngineService::new(PolicyEngine::new(FencingCoordinator::unavailable()));
        let handle = service.spawn(trigger_rx, None, graph_tx, shutdown_rx);

        let broken: ClusterStatusDto = parse_json_str(r#"{"nodes": [{"id": "n1"}, {"id": "n1"}]}"#).unwrap();
        trigger_tx.send(Trigger::StatusUpdate(broken)).await.unwrap();
        assert!(matches!(graph_rx.recv().await.unwrap(), Err(Error::InvalidSnapshot(_))));

        drop(trigger_tx);
        handle.await.unwrap();
    }
}
