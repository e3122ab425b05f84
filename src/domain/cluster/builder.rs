use std::collections::BTreeMap;

use crate::api::status_dto::cluster_dto::{ClusterOptionsDto, ClusterStatusDto};
use crate::api::status_dto::constraint_dto::{ColocationDto, LocationDto, NodeRuleDto, OrderingDto, RuleOperationDto};
use crate::api::status_dto::node_dto::{NodeDto, NodeTypeDto};
use crate::api::status_dto::resource_dto::{ResourceDto, ResourceKindDto};
use crate::domain::cluster::action::{OrderKind, Task};
use crate::domain::cluster::constraint::{ColocationConstraint, LocationConstraint, NodeRule, OrderingConstraint, RuleOperation};
use crate::domain::cluster::node::{Node, NodeKey, NodeType};
use crate::domain::cluster::resource::{RecoveryType, Resource, ResourceKey, ResourceStatus, ResourceVariant, RestartType, Role};
use crate::domain::cluster::working_set::{ClusterOptions, WorkingSet};
use crate::domain::membership::MembershipVerdict;
use crate::domain::utils::id::{ConstraintId, NodeId, ResourceId};
use crate::domain::utils::score::Score;
use crate::error::{Error, Result};

/// Builds the working set of one pass from a status snapshot.
///
/// With a membership verdict, member nodes whose slot is missing from it are treated as offline
/// no matter what the snapshot says.
pub fn build_working_set(status: &ClusterStatusDto, verdict: Option<&MembershipVerdict>) -> Result<WorkingSet> {
    let mut ws = WorkingSet::new(map_options(&status.config)?);
    ws.membership_version = verdict.map(|v| v.version);

    for (position, dto) in status.nodes.iter().enumerate() {
        let node = map_node(dto, position, verdict);
        ws.add_node(node)?;
    }
    pick_dc(&mut ws, &status.config);

    for dto in &status.resources {
        add_resource_tree(&mut ws, dto, None)?;
    }

    for dto in &status.constraints.location {
        add_location(&mut ws, dto)?;
    }
    for dto in &status.constraints.colocation {
        add_colocation(&mut ws, dto)?;
    }
    for dto in &status.constraints.ordering {
        add_ordering(&mut ws, dto)?;
    }
    expand_groups(&mut ws);

    detect_lost_nodes(&mut ws);
    ws.have_quorum = ws.options.quorum_rule.is_satisfied(ws.online_member_count(), ws.member_count());

    log::info!(
        "Working set: {} nodes ({} online members of {}), {} resources, quorum: {}",
        ws.nodes.len(),
        ws.online_member_count(),
        ws.member_count(),
        ws.resources.len(),
        ws.have_quorum
    );
    Ok(ws)
}

pub fn map_options(dto: &ClusterOptionsDto) -> Result<ClusterOptions> {
    if dto.max_nodes == 0 {
        return Err(Error::InvalidSnapshot("maxNodes must be at least 1".to_string()));
    }
    Ok(ClusterOptions {
        no_quorum_policy: dto.no_quorum_policy.parse()?,
        stonith_enabled: dto.stonith_enabled,
        stonith_action: dto.stonith_action.parse()?,
        symmetric_cluster: dto.symmetric_cluster,
        default_stickiness: Score::new(dto.default_resource_stickiness),
        default_fail_stickiness: Score::new(dto.default_resource_fail_stickiness),
        stop_orphan_resources: dto.stop_orphan_resources,
        quorum_rule: dto.quorum.parse()?,
        max_nodes: dto.max_nodes,
    })
}

fn map_node(dto: &NodeDto, position: usize, verdict: Option<&MembershipVerdict>) -> Node {
    let node_type = match dto.typ {
        NodeTypeDto::Member => NodeType::Member,
        NodeTypeDto::Ping => NodeType::Ping,
    };
    let slot = dto.slot.unwrap_or(position);

    let mut online = dto.online;
    if let Some(verdict) = verdict {
        if node_type == NodeType::Member && online && !verdict.contains(slot) {
            log::info!("Node {} is not part of membership version {}, treating it as offline", dto.id, verdict.version);
            online = false;
        }
    }

    Node {
        id: NodeId::new(dto.id.as_str()),
        uname: dto.uname.clone().unwrap_or_else(|| dto.id.clone()),
        node_type,
        online,
        standby: dto.standby,
        unclean: dto.unclean,
        shutdown: dto.shutdown,
        expected_up: dto.expected_up.unwrap_or(dto.online),
        is_dc: dto.is_dc,
        weight: dto.weight,
        fixed: dto.fixed,
        slot,
        attrs: dto.attributes.clone(),
        running: Vec::new(),
        allocated: Vec::new(),
    }
}

fn pick_dc(ws: &mut WorkingSet, options: &ClusterOptionsDto) {
    let dc = ws
        .nodes
        .iter()
        .find(|(_, n)| n.is_dc || options.dc_uuid.as_deref().is_some_and(|dc| n.id == dc))
        .map(|(key, _)| key);
    if let Some(key) = dc {
        ws.nodes[key].is_dc = true;
        log::debug!("Designated coordinator is {}", ws.nodes[key].id);
    }
    ws.dc_node = dc;
}

fn lookup_node(ws: &WorkingSet, name: &str, context: &str) -> Result<NodeKey> {
    ws.find_node(name).ok_or_else(|| Error::InvalidSnapshot(format!("{} refers to unknown node '{}'", context, name)))
}

fn lookup_resource(ws: &WorkingSet, name: &str, context: &str) -> Result<ResourceKey> {
    ws.find_resource(name).ok_or_else(|| Error::InvalidSnapshot(format!("{} refers to unknown resource '{}'", context, name)))
}

/// Adds a resource together with its children. Only groups of primitives may nest.
fn add_resource_tree(ws: &mut WorkingSet, dto: &ResourceDto, parent: Option<(ResourceKey, &ResourceDto)>) -> Result<ResourceKey> {
    match dto.kind {
        ResourceKindDto::Group => {
            if parent.is_some() {
                return Err(Error::InvalidSnapshot(format!("group '{}' cannot be nested", dto.id)));
            }
            if dto.children.is_empty() {
                return Err(Error::InvalidSnapshot(format!("group '{}' has no members", dto.id)));
            }
            let resource = map_resource(ws, dto, None, ResourceVariant::Group)?;
            let key = ws.add_resource(resource)?;
            for child in &dto.children {
                if child.kind != ResourceKindDto::Primitive || !child.children.is_empty() {
                    return Err(Error::InvalidSnapshot(format!("group '{}' may only contain primitives, '{}' is not one", dto.id, child.id)));
                }
                let child_key = add_resource_tree(ws, child, Some((key, dto)))?;
                ws.resources[key].children.push(child_key);
            }
            Ok(key)
        }
        ResourceKindDto::Clone => {
            if parent.is_some() || !dto.children.is_empty() {
                return Err(Error::InvalidSnapshot(format!("clone '{}' cannot be nested or contain other resources", dto.id)));
            }
            let clone_node_max = dto.clone_node_max.unwrap_or(1);
            if clone_node_max == 0 {
                return Err(Error::InvalidSnapshot(format!("clone '{}' needs cloneNodeMax of at least 1", dto.id)));
            }
            let clone_max = dto.clone_max.unwrap_or(ws.member_count() as u32);
            let variant = ResourceVariant::Clone { clone_max, clone_node_max, globally_unique: dto.globally_unique };
            let resource = map_resource(ws, dto, None, variant)?;
            register_running(ws, resource)
        }
        ResourceKindDto::Primitive => {
            if !dto.children.is_empty() {
                return Err(Error::InvalidSnapshot(format!("primitive '{}' cannot have children", dto.id)));
            }
            let resource = map_resource(ws, dto, parent, ResourceVariant::Primitive)?;
            register_running(ws, resource)
        }
    }
}

fn register_running(ws: &mut WorkingSet, resource: Resource) -> Result<ResourceKey> {
    let running_on = resource.running_on.clone();
    let key = ws.add_resource(resource)?;
    for node in running_on {
        if !ws.nodes[node].running.contains(&key) {
            ws.nodes[node].running.push(key);
        }
    }
    Ok(key)
}

fn map_resource(
    ws: &WorkingSet,
    dto: &ResourceDto,
    parent: Option<(ResourceKey, &ResourceDto)>,
    variant: ResourceVariant,
) -> Result<Resource> {
    let context = format!("resource '{}'", dto.id);
    let inherited = parent.map(|(_, p)| p);

    let mut running_on = Vec::new();
    if variant != ResourceVariant::Group {
        for name in &dto.status.running_on {
            running_on.push(lookup_node(ws, name, &context)?);
        }
    }
    let mut fail_counts = BTreeMap::new();
    for (name, count) in &dto.status.fail_counts {
        fail_counts.insert(lookup_node(ws, name, &context)?, *count);
    }

    let promotable = dto.promotable;
    let role = match &dto.status.role {
        Some(role) => role.parse()?,
        None if running_on.is_empty() => Role::Stopped,
        None if promotable => Role::Slave,
        None => Role::Started,
    };

    let stickiness = dto.stickiness.or_else(|| inherited.and_then(|p| p.stickiness));
    let fail_stickiness = dto.fail_stickiness.or_else(|| inherited.and_then(|p| p.fail_stickiness));
    let recovery_type = match dto.recovery_type.as_deref().or_else(|| inherited.and_then(|p| p.recovery_type.as_deref())) {
        Some(name) => name.parse()?,
        None => RecoveryType::StopStart,
    };
    let restart_type = match dto.restart_type.as_deref().or_else(|| inherited.and_then(|p| p.restart_type.as_deref())) {
        Some(name) => name.parse()?,
        None => RestartType::Restart,
    };
    let target_role = match dto.target_role.as_deref().or_else(|| inherited.and_then(|p| p.target_role.as_deref())) {
        Some(name) => Some(name.parse()?),
        None => None,
    };
    let on_fail = match &dto.on_fail {
        Some(name) => Some(name.parse()?),
        None => None,
    };

    Ok(Resource {
        id: ResourceId::new(dto.id.as_str()),
        parent: parent.map(|(key, _)| key),
        children: Vec::new(),
        variant,
        role,
        next_role: role,
        promotable,
        target_role,
        priority: if dto.priority == 0 { inherited.map_or(0, |p| p.priority) } else { dto.priority },
        stickiness: stickiness.map(Score::new).unwrap_or(ws.options.default_stickiness),
        fail_stickiness: fail_stickiness.map(Score::new).unwrap_or(ws.options.default_fail_stickiness),
        fail_counts,
        recovery_type,
        restart_type,
        status: ResourceStatus {
            provisional: true,
            orphan: dto.status.orphan,
            failed: dto.status.failed,
            managed: dto.managed && inherited.is_none_or(|p| p.managed),
            runnable: true,
        },
        notify: dto.notify || inherited.is_some_and(|p| p.notify),
        monitor_interval_ms: dto.monitor_interval_ms,
        on_fail,
        allowed_nodes: BTreeMap::new(),
        running_on,
        allocated_to: Vec::new(),
        locations: Vec::new(),
        colocations: Vec::new(),
        meta: dto.meta.clone(),
        parameters: dto.parameters.clone(),
    })
}

/// Group member standing in for the group on one side of a constraint.
#[derive(Clone, Copy)]
enum GroupEnd {
    First,
    Last,
}

fn resolve_member(ws: &WorkingSet, key: ResourceKey, end: GroupEnd) -> ResourceKey {
    let children = &ws.resources[key].children;
    let member = match end {
        GroupEnd::First => children.first(),
        GroupEnd::Last => children.last(),
    };
    member.copied().unwrap_or(key)
}

fn map_rule(dto: &NodeRuleDto) -> NodeRule {
    let operation = match dto.operation {
        RuleOperationDto::Eq => RuleOperation::Eq,
        RuleOperationDto::Ne => RuleOperation::Ne,
        RuleOperationDto::Defined => RuleOperation::Defined,
        RuleOperationDto::NotDefined => RuleOperation::NotDefined,
    };
    NodeRule { attribute: dto.attribute.clone(), operation, value: dto.value.clone() }
}

fn add_location(ws: &mut WorkingSet, dto: &LocationDto) -> Result<()> {
    let context = format!("location constraint '{}'", dto.id);
    let resource = lookup_resource(ws, &dto.resource, &context)?;
    let node = match &dto.node {
        Some(name) => Some(lookup_node(ws, name, &context)?),
        None => None,
    };

    let targets = if ws.resources[resource].is_group() { ws.resources[resource].children.clone() } else { vec![resource] };
    for target in targets {
        let index = ws.locations.len();
        ws.locations.push(LocationConstraint {
            id: ConstraintId::new(dto.id.as_str()),
            resource: target,
            node,
            rule: dto.rule.as_ref().map(map_rule),
            score: dto.score,
        });
        ws.resources[target].locations.push(index);
    }
    Ok(())
}

fn push_colocation(ws: &mut WorkingSet, colocation: ColocationConstraint) {
    let dependent = colocation.dependent;
    let index = ws.colocations.len();
    ws.colocations.push(colocation);
    ws.resources[dependent].colocations.push(index);
}

fn add_colocation(ws: &mut WorkingSet, dto: &ColocationDto) -> Result<()> {
    let context = format!("colocation constraint '{}'", dto.id);
    let dependent = lookup_resource(ws, &dto.resource, &context)?;
    let primary = lookup_resource(ws, &dto.with, &context)?;
    if dependent == primary {
        return Err(Error::InvalidSnapshot(format!("{} colocates '{}' with itself", context, dto.resource)));
    }

    let dependent = resolve_member(ws, dependent, GroupEnd::First);
    let primary = resolve_member(ws, primary, GroupEnd::Last);
    push_colocation(ws, ColocationConstraint { id: ConstraintId::new(dto.id.as_str()), dependent, primary, score: dto.score });
    Ok(())
}

fn add_ordering(ws: &mut WorkingSet, dto: &OrderingDto) -> Result<()> {
    let context = format!("ordering constraint '{}'", dto.id);
    let first = lookup_resource(ws, &dto.first, &context)?;
    let then = lookup_resource(ws, &dto.then, &context)?;
    let first_task: Task = dto.first_action.parse()?;
    let then_task: Task = dto.then_action.parse()?;
    let kind = OrderKind::from_constraint_kind(&dto.kind)?;

    // a group is up once its last member started and down once its first member stopped
    let first_end = if first_task.is_stop_like() { GroupEnd::First } else { GroupEnd::Last };
    let then_end = if then_task.is_stop_like() { GroupEnd::Last } else { GroupEnd::First };

    ws.orderings.push(OrderingConstraint {
        id: ConstraintId::new(dto.id.as_str()),
        first: resolve_member(ws, first, first_end),
        first_task,
        then: resolve_member(ws, then, then_end),
        then_task,
        kind,
        symmetrical: dto.symmetrical,
    });
    Ok(())
}

/// Members of a group run together on one node and start in order.
fn expand_groups(ws: &mut WorkingSet) {
    let groups: Vec<ResourceKey> = ws.resources.iter().filter(|(_, r)| r.is_group()).map(|(k, _)| k).collect();
    for group in groups {
        let name = ws.resources[group].id.to_string();
        let children = ws.resources[group].children.clone();
        for (i, pair) in children.windows(2).enumerate() {
            let (previous, next) = (pair[0], pair[1]);
            push_colocation(
                ws,
                ColocationConstraint {
                    id: ConstraintId::new(format!("{}-colocation-{}", name, i + 1)),
                    dependent: next,
                    primary: previous,
                    score: Score::POSITIVE_INFINITY,
                },
            );
            ws.orderings.push(OrderingConstraint {
                id: ConstraintId::new(format!("{}-order-{}", name, i + 1)),
                first: previous,
                first_task: Task::Start,
                then: next,
                then_task: Task::Start,
                kind: OrderKind::ImpliesThen,
                symmetrical: true,
            });
        }
    }
}

/// Offline nodes that should be up and still host resources are unclean. Resources on nodes that
/// left cleanly are no longer running.
fn detect_lost_nodes(ws: &mut WorkingSet) {
    let offline: Vec<NodeKey> = ws.nodes.iter().filter(|(_, n)| !n.online).map(|(k, _)| k).collect();
    for key in offline {
        let node = &mut ws.nodes[key];
        if node.running.is_empty() || node.unclean {
            continue;
        }
        if node.expected_up {
            log::warn!("Node {} is expected up but offline with {} active resources, marking it unclean", node.id, node.running.len());
            node.unclean = true;
            continue;
        }

        log::debug!("Node {} left cleanly, its resources are stopped", node.id);
        let stopped = std::mem::take(&mut node.running);
        for resource in stopped {
            let rsc = &mut ws.resources[resource];
            rsc.running_on.retain(|n| *n != key);
            if rsc.running_on.is_empty() {
                rsc.role = Role::Stopped;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::membership::bitmap::MemberBitmap;
    use crate::loader::parser::parse_json_str;

    fn status(json: &str) -> ClusterStatusDto {
        parse_json_str(json).unwrap()
    }

    #[test]
    fn test_defaults_and_quorum() {
        let ws = build_working_set(
            &status(r#"{"nodes": [{"id": "n1", "online": true}, {"id": "n2", "online": true}, {"id": "n3"}]}"#),
            None,
        )
        .unwrap();
        assert!(ws.have_quorum);
        assert!(ws.options.stonith_enabled);
        assert_eq!(ws.slot_of(ws.find_node("n3").unwrap()), Some(2));
    }

    #[test]
    fn test_verdict_overrides_online_flag() {
        let json = r#"{"nodes": [{"id": "n1", "online": true}, {"id": "n2", "online": true}, {"id": "n3", "online": true}]}"#;
        let verdict = MembershipVerdict::new(4, MemberBitmap::from_slots(256, [0]).unwrap());
        let ws = build_working_set(&status(json), Some(&verdict)).unwrap();

        assert!(!ws.have_quorum);
        assert!(!ws.nodes[ws.find_node("n2").unwrap()].online);
        assert_eq!(ws.membership_version, Some(4));
    }

    #[test]
    fn test_lost_node_with_resources_is_unclean() {
        let json = r#"{
            "nodes": [{"id": "n1", "online": true}, {"id": "n2", "expectedUp": true}, {"id": "n3", "expectedUp": false}],
            "resources": [
                {"id": "a", "status": {"runningOn": ["n2"]}},
                {"id": "b", "status": {"runningOn": ["n3"]}}
            ]
        }"#;
        let ws = build_working_set(&status(json), None).unwrap();
        assert!(ws.nodes[ws.find_node("n2").unwrap()].unclean);
        assert!(!ws.nodes[ws.find_node("n3").unwrap()].unclean);
        assert!(ws.resources[ws.find_resource("b").unwrap()].running_on.is_empty());
    }

    #[test]
    fn test_group_expansion() {
        let json = r#"{
            "nodes": [{"id": "n1", "online": true}],
            "resources": [{"id": "g", "kind": "group", "stickiness": 5, "children": [{"id": "ip"}, {"id": "fs"}, {"id": "db"}]}],
            "constraints": {"ordering": [{"id": "o1", "first": "g", "then": "g2"}]}
        }"#;
        assert!(matches!(build_working_set(&status(json), None), Err(Error::InvalidSnapshot(_))));

        let json = json.replace(r#""then": "g2""#, r#""then": "ip", "thenAction": "stop", "firstAction": "stop""#);
        let ws = build_working_set(&status(&json), None).unwrap();
        let ip = ws.find_resource("ip").unwrap();
        let fs = ws.find_resource("fs").unwrap();
        let db = ws.find_resource("db").unwrap();

        assert_eq!(ws.colocations.len(), 2);
        assert_eq!((ws.colocations[0].dependent, ws.colocations[0].primary), (fs, ip));
        assert_eq!((ws.colocations[1].dependent, ws.colocations[1].primary), (db, fs));
        assert_eq!(ws.resources[db].stickiness, Score::new(5));
        assert_eq!(ws.orderings.len(), 3);
        // stopping a group completes with its first member
        assert_eq!(ws.orderings[0].first, ip);
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            r#"{"nodes": [{"id": "n1"}, {"id": "n1"}]}"#,
            r#"{"nodes": [{"id": "n1"}], "resources": [{"id": "a", "status": {"runningOn": ["n9"]}}]}"#,
            r#"{"nodes": [{"id": "n1"}], "resources": [{"id": "a"}, {"id": "a"}]}"#,
            r#"{"nodes": [{"id": "n1"}], "resources": [{"id": "c", "kind": "clone", "cloneNodeMax": 0}]}"#,
            r#"{"nodes": [{"id": "n1", "slot": 300}]}"#,
            r#"{"nodes": [{"id": "n1"}], "resources": [{"id": "a"}], "constraints": {"location": [{"id": "l", "resource": "a", "node": "n2", "score": 1}]}}"#,
            r#"{"nodes": [{"id": "n1"}], "resources": [{"id": "a"}], "constraints": {"colocation": [{"id": "c", "resource": "a", "with": "a", "score": 1}]}}"#,
        ];
        for json in cases {
            let err = build_working_set(&status(json), None).unwrap_err();
            assert!(err.is_configuration_error(), "{json}: {err}");
        }
    }

    #[test]
    fn test_unknown_policy_is_a_conversion_error() {
        let json = r#"{"config": {"noQuorumPolicy": "panic"}, "nodes": []}"#;
        assert!(matches!(build_working_set(&status(json), None), Err(Error::Conversion(_))));
    }
}
