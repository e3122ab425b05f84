use std::collections::{BTreeMap, HashMap};

use crate::domain::allocator::candidate::{CandidateTable, candidate_table, ranked_nodes};
use crate::domain::allocator::colocation::{apply_colocation, resolution_order, share_bans};
use crate::domain::cluster::node::NodeKey;
use crate::domain::cluster::resource::{RecoveryType, Resource, ResourceKey, ResourceVariant, Role};
use crate::domain::cluster::working_set::WorkingSet;
use crate::error::{Error, Result};

/// Resource -> nodes it is placed on, one entry per instance.
pub type Placement = BTreeMap<ResourceKey, Vec<NodeKey>>;

/// Places every resource of the working set and assigns its next role.
///
/// Placement is repeated until two consecutive passes agree, since finite colocations let a
/// dependent's position pull its primary. The number of passes is bounded by the resource count.
pub fn allocate(ws: &mut WorkingSet) -> Result<()> {
    let order = resolution_order(ws)?;

    let mut base_tables: HashMap<ResourceKey, CandidateTable> = order.iter().map(|rsc| (*rsc, candidate_table(ws, *rsc))).collect();
    share_bans(ws, &mut base_tables);

    let max_passes = ws.resources.len() + 1;
    let mut previous: Option<Placement> = None;
    for pass in 0..=max_passes {
        let (placement, tables) = placement_pass(ws, &order, &base_tables, previous.as_ref());
        if previous.as_ref() == Some(&placement) {
            log::debug!("Allocation stable after {} passes", pass + 1);
            commit(ws, placement, tables);
            return Ok(());
        }
        previous = Some(placement);
    }

    log::error!("Allocation keeps changing after {} passes", max_passes);
    Err(Error::AllocationDiverged(max_passes))
}

/// Placement that no score can change, if any.
fn fixed_placement(ws: &WorkingSet, resource: &Resource) -> Option<Vec<NodeKey>> {
    if !resource.is_managed() || ws.is_frozen() {
        return Some(resource.running_on.clone());
    }
    if resource.status.orphan {
        return Some(if ws.options.stop_orphan_resources { Vec::new() } else { resource.running_on.clone() });
    }
    if !resource.wants_to_run() {
        return Some(Vec::new());
    }
    if resource.is_multi_active() {
        match resource.recovery_type {
            RecoveryType::Block => return Some(resource.running_on.clone()),
            RecoveryType::StopOnly => return Some(Vec::new()),
            RecoveryType::StopStart => {}
        }
    }
    if !ws.can_change_resources() {
        return Some(Vec::new());
    }
    None
}

fn placement_pass(
    ws: &WorkingSet,
    order: &[ResourceKey],
    base_tables: &HashMap<ResourceKey, CandidateTable>,
    previous: Option<&Placement>,
) -> (Placement, HashMap<ResourceKey, CandidateTable>) {
    let mut placement = Placement::new();
    let mut tables = HashMap::new();

    for rsc in order {
        let resource = &ws.resources[*rsc];
        let mut table = base_tables.get(rsc).cloned().unwrap_or_default();

        let nodes = match fixed_placement(ws, resource) {
            Some(nodes) => nodes,
            None => {
                for index in &resource.colocations {
                    let colocation = &ws.colocations[*index];
                    let primary_nodes = placement.get(&colocation.primary).cloned().unwrap_or_default();
                    apply_colocation(&mut table, &primary_nodes, colocation.score);
                }

                // dependents with a finite preference pull their primary towards where they are expected
                for colocation in ws.colocations.iter().filter(|c| c.primary == *rsc && !c.score.is_infinite() && c.score.value() > 0) {
                    let expected = previous
                        .and_then(|p| p.get(&colocation.dependent))
                        .and_then(|nodes| nodes.first())
                        .or_else(|| ws.resources[colocation.dependent].running_on.first())
                        .copied();
                    if let Some(entry) = expected.and_then(|node| table.get_mut(&node)) {
                        *entry = entry.merge(colocation.score);
                    }
                }

                choose_nodes(ws, resource, &table)
            }
        };

        placement.insert(*rsc, nodes);
        tables.insert(*rsc, table);
    }
    (placement, tables)
}

fn choose_nodes(ws: &WorkingSet, resource: &Resource, table: &CandidateTable) -> Vec<NodeKey> {
    let ranked = ranked_nodes(ws, table);
    match resource.variant {
        ResourceVariant::Clone { clone_max, clone_node_max, globally_unique } => {
            // anonymous instances are interchangeable, a second one on the same node adds nothing
            let per_node = if globally_unique { clone_node_max } else { 1 };
            place_instances(&ranked, clone_max as usize, per_node as usize)
        }
        _ => ranked.first().map(|node| vec![*node]).unwrap_or_default(),
    }
}

/// Spreads instances over the ranked nodes one round at a time, best node first.
pub fn place_instances(ranked: &[NodeKey], clone_max: usize, clone_node_max: usize) -> Vec<NodeKey> {
    let mut placed = Vec::with_capacity(clone_max);
    'rounds: for _ in 0..clone_node_max.max(1) {
        for node in ranked {
            if placed.len() >= clone_max {
                break 'rounds;
            }
            placed.push(*node);
        }
    }
    placed.sort();
    placed
}

fn next_role(ws: &WorkingSet, resource: &Resource, nodes: &[NodeKey]) -> Role {
    if nodes.is_empty() {
        return Role::Stopped;
    }
    let frozen = !ws.can_change_resources() || !resource.is_managed() || (resource.is_multi_active() && resource.recovery_type == RecoveryType::Block);
    if frozen && resource.role != Role::Stopped {
        return resource.role;
    }
    if resource.promotable && resource.target_role == Some(Role::Master) {
        return Role::Master;
    }
    resource.running_role()
}

fn commit(ws: &mut WorkingSet, placement: Placement, mut tables: HashMap<ResourceKey, CandidateTable>) {
    for node in ws.nodes.values_mut() {
        node.allocated.clear();
    }

    for (rsc, nodes) in placement {
        for node in &nodes {
            if !ws.nodes[*node].allocated.contains(&rsc) {
                ws.nodes[*node].allocated.push(rsc);
            }
        }

        let role = next_role(ws, &ws.resources[rsc], &nodes);
        let resource = &mut ws.resources[rsc];
        resource.allowed_nodes = tables.remove(&rsc).unwrap_or_default();
        resource.status.provisional = false;
        resource.status.runnable = !nodes.is_empty() || !resource.wants_to_run();
        resource.next_role = role;

        if !resource.status.runnable {
            log::info!("Resource {} cannot run anywhere", resource.id);
        } else if !nodes.is_empty() {
            log::debug!("Resource {} allocated to {} node(s), next role {}", resource.id, nodes.len(), role);
        }
        resource.allocated_to = nodes;
    }

    // a group is wherever its members are
    let groups: Vec<ResourceKey> = ws.resources.iter().filter(|(_, r)| r.is_group()).map(|(k, _)| k).collect();
    for group in groups {
        let children = ws.resources[group].children.clone();
        let first = children.first().map(|c| ws.resources[*c].allocated_to.clone()).unwrap_or_default();
        let all_placed = children.iter().all(|c| !ws.resources[*c].allocated_to.is_empty());
        let runnable = children.iter().all(|c| ws.resources[*c].status.runnable);

        let resource = &mut ws.resources[group];
        resource.allocated_to = first;
        resource.status.provisional = false;
        resource.status.runnable = runnable;
        resource.next_role = if all_placed { Role::Started } else { Role::Stopped };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::status_dto::cluster_dto::ClusterStatusDto;
    use crate::domain::cluster::builder::build_working_set;
    use crate::loader::parser::parse_json_str;

    fn allocated(json: &str) -> WorkingSet {
        let status: ClusterStatusDto = parse_json_str(json).unwrap();
        let mut ws = build_working_set(&status, None).unwrap();
        allocate(&mut ws).unwrap();
        ws
    }

    fn placed_on<'a>(ws: &'a WorkingSet, rsc: &str) -> Vec<&'a str> {
        ws.resources[ws.find_resource(rsc).unwrap()].allocated_to.iter().map(|n| ws.node_name(*n)).collect()
    }

    #[test]
    fn test_stickiness_keeps_resource_in_place() {
        let ws = allocated(
            r#"{
                "config": {"defaultResourceStickiness": 100},
                "nodes": [{"id": "n1", "online": true}, {"id": "n2", "online": true}],
                "resources": [{"id": "web", "status": {"runningOn": ["n2"]}}],
                "constraints": {"location": [{"id": "l1", "resource": "web", "node": "n1", "score": 50}]}
            }"#,
        );
        assert_eq!(placed_on(&ws, "web"), vec!["n2"]);
        let web = &ws.resources[ws.find_resource("web").unwrap()];
        assert!(!web.status.provisional);
        assert_eq!(web.next_role, Role::Started);
    }

    #[test]
    fn test_mandatory_colocation_follows_primary() {
        let ws = allocated(
            r#"{
                "nodes": [{"id": "n1", "online": true}, {"id": "n2", "online": true}],
                "resources": [{"id": "app"}, {"id": "ip"}],
                "constraints": {
                    "colocation": [{"id": "c1", "resource": "app", "with": "ip", "score": "INFINITY"}],
                    "location": [{"id": "l1", "resource": "ip", "node": "n2", "score": 10}]
                }
            }"#,
        );
        assert_eq!(placed_on(&ws, "ip"), vec!["n2"]);
        assert_eq!(placed_on(&ws, "app"), vec!["n2"]);
    }

    #[test]
    fn test_dependent_ban_moves_primary() {
        let ws = allocated(
            r#"{
                "nodes": [{"id": "n1", "online": true}, {"id": "n2", "online": true}],
                "resources": [{"id": "app"}, {"id": "ip"}],
                "constraints": {
                    "colocation": [{"id": "c1", "resource": "app", "with": "ip", "score": "INFINITY"}],
                    "location": [{"id": "l1", "resource": "app", "node": "n1", "score": "-INFINITY"}]
                }
            }"#,
        );
        assert_eq!(placed_on(&ws, "ip"), vec!["n2"]);
        assert_eq!(placed_on(&ws, "app"), vec!["n2"]);
    }

    #[test]
    fn test_no_eligible_node_leaves_resource_stopped() {
        let ws = allocated(
            r#"{
                "nodes": [{"id": "n1", "online": true}, {"id": "n2", "online": true, "standby": true}],
                "resources": [{"id": "db"}],
                "constraints": {"location": [{"id": "l1", "resource": "db", "node": "n1", "score": "-INFINITY"}]}
            }"#,
        );
        let db = &ws.resources[ws.find_resource("db").unwrap()];
        assert!(db.allocated_to.is_empty());
        assert!(!db.status.runnable);
        assert!(!db.status.provisional);
        assert_eq!(db.next_role, Role::Stopped);
    }

    #[test]
    fn test_clone_instances_spread_first() {
        let ws = allocated(
            r#"{
                "nodes": [{"id": "n1", "online": true}, {"id": "n2", "online": true}, {"id": "n3", "online": true, "standby": true}],
                "resources": [
                    {"id": "ping", "kind": "clone", "cloneMax": 3},
                    {"id": "worker", "kind": "clone", "cloneMax": 3, "cloneNodeMax": 2, "globallyUnique": true}
                ]
            }"#,
        );
        assert_eq!(placed_on(&ws, "ping"), vec!["n1", "n2"]);
        assert_eq!(placed_on(&ws, "worker"), vec!["n1", "n1", "n2"]);
    }

    #[test]
    fn test_only_unique_clones_stack_on_a_node() {
        let ws = allocated(
            r#"{
                "nodes": [{"id": "n1", "online": true}, {"id": "n2", "online": true}],
                "resources": [
                    {"id": "anonymous", "kind": "clone", "cloneMax": 4, "cloneNodeMax": 2, "globallyUnique": false},
                    {"id": "unique", "kind": "clone", "cloneMax": 4, "cloneNodeMax": 2, "globallyUnique": true}
                ]
            }"#,
        );
        assert_eq!(placed_on(&ws, "anonymous"), vec!["n1", "n2"]);
        assert_eq!(placed_on(&ws, "unique"), vec!["n1", "n1", "n2", "n2"]);
    }

    #[test]
    fn test_finite_colocation_pulls_primary_to_dependent() {
        let ws = allocated(
            r#"{
                "nodes": [{"id": "n1", "online": true}, {"id": "n2", "online": true}],
                "resources": [{"id": "cache", "stickiness": 100, "status": {"runningOn": ["n2"]}}, {"id": "store"}],
                "constraints": {"colocation": [{"id": "c1", "resource": "cache", "with": "store", "score": 50}]}
            }"#,
        );
        assert_eq!(placed_on(&ws, "store"), vec!["n2"]);
        assert_eq!(placed_on(&ws, "cache"), vec!["n2"]);
    }

    #[test]
    fn test_promotion_follows_target_role() {
        let ws = allocated(
            r#"{
                "nodes": [{"id": "n1", "online": true}],
                "resources": [
                    {"id": "drbd", "promotable": true, "targetRole": "master", "status": {"runningOn": ["n1"]}},
                    {"id": "other", "promotable": true}
                ]
            }"#,
        );
        assert_eq!(ws.resources[ws.find_resource("drbd").unwrap()].next_role, Role::Master);
        assert_eq!(ws.resources[ws.find_resource("other").unwrap()].next_role, Role::Slave);
    }

    #[test]
    fn test_no_quorum_policies() {
        let json = r#"{
            "config": {"noQuorumPolicy": "POLICY"},
            "nodes": [{"id": "n1", "online": true}, {"id": "n2"}, {"id": "n3"}],
            "resources": [{"id": "web", "status": {"runningOn": ["n1"]}}, {"id": "db"}]
        }"#;

        let frozen = allocated(&json.replace("POLICY", "freeze"));
        assert_eq!(placed_on(&frozen, "web"), vec!["n1"]);
        assert!(placed_on(&frozen, "db").is_empty());

        let stopped = allocated(&json.replace("POLICY", "stop"));
        assert!(placed_on(&stopped, "web").is_empty());

        let ignored = allocated(&json.replace("POLICY", "ignore"));
        assert_eq!(placed_on(&ignored, "db"), vec!["n1"]);
    }

    #[test]
    fn test_freeze_keeps_standby_and_multi_active_placement() {
        let ws = allocated(
            r#"{
                "config": {"noQuorumPolicy": "freeze"},
                "nodes": [
                    {"id": "n1", "online": true, "standby": true}, {"id": "n2", "online": true},
                    {"id": "n3"}, {"id": "n4"}, {"id": "n5"}
                ],
                "resources": [
                    {"id": "web", "status": {"runningOn": ["n1"]}},
                    {"id": "db", "recoveryType": "stopOnly", "status": {"runningOn": ["n1", "n2"]}}
                ]
            }"#,
        );
        assert!(!ws.have_quorum);
        assert_eq!(placed_on(&ws, "web"), vec!["n1"]);
        assert_eq!(placed_on(&ws, "db"), vec!["n1", "n2"]);
    }

    #[test]
    fn test_multi_active_recovery() {
        let json = r#"{
            "nodes": [{"id": "n1", "online": true}, {"id": "n2", "online": true}],
            "resources": [{"id": "db", "recoveryType": "RECOVERY", "status": {"runningOn": ["n1", "n2"]}}]
        }"#;
        assert_eq!(placed_on(&allocated(&json.replace("RECOVERY", "stopStart")), "db"), vec!["n1"]);
        assert!(placed_on(&allocated(&json.replace("RECOVERY", "stopOnly")), "db").is_empty());
        assert_eq!(placed_on(&allocated(&json.replace("RECOVERY", "block")), "db"), vec!["n1", "n2"]);
    }

    #[test]
    fn test_place_instances_caps() {
        let mut keys = slotmap::SlotMap::<NodeKey, ()>::with_key();
        let (a, b) = (keys.insert(()), keys.insert(()));
        assert_eq!(place_instances(&[b, a], 5, 2), vec![a, a, b, b]);
        assert_eq!(place_instances(&[b, a], 1, 1), vec![b]);
        assert!(place_instances(&[], 3, 1).is_empty());
    }
}
