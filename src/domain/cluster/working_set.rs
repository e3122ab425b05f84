use bimap::BiMap;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::cluster::action::{Action, ActionEdge, ActionKey, OrderKind, Task};
use crate::domain::cluster::constraint::{ColocationConstraint, LocationConstraint, OrderingConstraint};
use crate::domain::cluster::node::{Node, NodeKey, NodeType};
use crate::domain::cluster::resource::{Resource, ResourceKey};
use crate::domain::utils::id::{ActionUuid, NodeId, ResourceId};
use crate::domain::utils::score::Score;
use crate::error::{ConversionError, Error, Result};

/// Behaviour of the partition while it does not have quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoQuorumPolicy {
    /// Keep what is running, start nothing new.
    Freeze,
    /// Stop everything.
    Stop,
    /// Act as if quorum were present.
    Ignore,
}

impl FromStr for NoQuorumPolicy {
    type Err = ConversionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "freeze" => Ok(NoQuorumPolicy::Freeze),
            "stop" => Ok(NoQuorumPolicy::Stop),
            "ignore" => Ok(NoQuorumPolicy::Ignore),
            _ => Err(ConversionError::UnknownNoQuorumPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumRule {
    /// More than half of the member nodes are online.
    Majority,
    AtLeast(usize),
}

impl QuorumRule {
    pub fn is_satisfied(self, online: usize, total: usize) -> bool {
        match self {
            QuorumRule::Majority => online > total / 2,
            QuorumRule::AtLeast(n) => online >= n,
        }
    }
}

impl FromStr for QuorumRule {
    type Err = ConversionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower == "majority" {
            return Ok(QuorumRule::Majority);
        }
        lower
            .strip_prefix("atleast:")
            .and_then(|n| n.trim().parse::<usize>().ok())
            .map(QuorumRule::AtLeast)
            .ok_or_else(|| ConversionError::UnknownQuorumRule(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StonithAction {
    Reboot,
    Off,
}

impl FromStr for StonithAction {
    type Err = ConversionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reboot" => Ok(StonithAction::Reboot),
            "off" | "poweroff" => Ok(StonithAction::Off),
            _ => Err(ConversionError::UnknownStonithAction(s.to_string())),
        }
    }
}

impl fmt::Display for StonithAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StonithAction::Reboot => write!(f, "reboot"),
            StonithAction::Off => write!(f, "off"),
        }
    }
}

/// Cluster-wide options of one pass.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub no_quorum_policy: NoQuorumPolicy,
    pub stonith_enabled: bool,
    pub stonith_action: StonithAction,
    pub symmetric_cluster: bool,
    pub default_stickiness: Score,
    pub default_fail_stickiness: Score,
    pub stop_orphan_resources: bool,
    pub quorum_rule: QuorumRule,
    pub max_nodes: usize,
}

/// Everything one scheduling pass reads and writes. Built fresh from a status snapshot for every pass.
#[derive(Debug)]
pub struct WorkingSet {
    pub options: ClusterOptions,
    pub have_quorum: bool,
    pub dc_node: Option<NodeKey>,
    pub membership_version: Option<u64>,

    pub nodes: SlotMap<NodeKey, Node>,
    pub resources: SlotMap<ResourceKey, Resource>,
    pub actions: SlotMap<ActionKey, Action>,

    pub locations: Vec<LocationConstraint>,
    pub colocations: Vec<ColocationConstraint>,
    pub orderings: Vec<OrderingConstraint>,

    node_index: HashMap<NodeId, NodeKey>,
    resource_index: HashMap<ResourceId, ResourceKey>,
    action_index: HashMap<ActionUuid, ActionKey>,
    /// Membership bitmap slot <-> node.
    slots: BiMap<usize, NodeKey>,
}

impl WorkingSet {
    pub fn new(options: ClusterOptions) -> Self {
        WorkingSet {
            options,
            have_quorum: false,
            dc_node: None,
            membership_version: None,
            nodes: SlotMap::with_key(),
            resources: SlotMap::with_key(),
            actions: SlotMap::with_key(),
            locations: Vec::new(),
            colocations: Vec::new(),
            orderings: Vec::new(),
            node_index: HashMap::new(),
            resource_index: HashMap::new(),
            action_index: HashMap::new(),
            slots: BiMap::new(),
        }
    }

    /// Adds a node, rejecting duplicate ids and slots.
    pub fn add_node(&mut self, node: Node) -> Result<NodeKey> {
        if self.node_index.contains_key(&node.id) {
            return Err(Error::InvalidSnapshot(format!("duplicate node id '{}'", node.id)));
        }
        if node.slot >= self.options.max_nodes {
            return Err(Error::InvalidSnapshot(format!(
                "node '{}' uses slot {} but only {} slots exist",
                node.id, node.slot, self.options.max_nodes
            )));
        }
        if let Some(other) = self.slots.get_by_left(&node.slot) {
            return Err(Error::InvalidSnapshot(format!("node '{}' reuses slot {} of node '{}'", node.id, node.slot, self.nodes[*other].id)));
        }

        let id = node.id.clone();
        let slot = node.slot;
        let key = self.nodes.insert(node);
        self.node_index.insert(id, key);
        self.slots.insert(slot, key);
        Ok(key)
    }

    /// Adds a resource, rejecting duplicate ids.
    pub fn add_resource(&mut self, resource: Resource) -> Result<ResourceKey> {
        if self.resource_index.contains_key(&resource.id) {
            return Err(Error::InvalidSnapshot(format!("duplicate resource id '{}'", resource.id)));
        }
        let id = resource.id.clone();
        let key = self.resources.insert(resource);
        self.resource_index.insert(id, key);
        Ok(key)
    }

    pub fn find_node(&self, id: &str) -> Option<NodeKey> {
        self.node_index.get(&NodeId::new(id)).copied()
    }

    pub fn find_resource(&self, id: &str) -> Option<ResourceKey> {
        self.resource_index.get(&ResourceId::new(id)).copied()
    }

    pub fn node_for_slot(&self, slot: usize) -> Option<NodeKey> {
        self.slots.get_by_left(&slot).copied()
    }

    pub fn slot_of(&self, node: NodeKey) -> Option<usize> {
        self.slots.get_by_right(&node).copied()
    }

    pub fn node_name(&self, node: NodeKey) -> &str {
        self.nodes.get(node).map(|n| n.id.as_str()).unwrap_or("<unknown>")
    }

    pub fn resource_name(&self, resource: ResourceKey) -> &str {
        self.resources.get(resource).map(|r| r.id.as_str()).unwrap_or("<unknown>")
    }

    pub fn member_count(&self) -> usize {
        self.nodes.values().filter(|n| n.node_type == NodeType::Member).count()
    }

    pub fn online_member_count(&self) -> usize {
        self.nodes.values().filter(|n| n.node_type == NodeType::Member && n.online && !n.unclean).count()
    }

    /// False while the partition lacks quorum and the policy does not ignore that.
    pub fn can_change_resources(&self) -> bool {
        self.have_quorum || self.options.no_quorum_policy == NoQuorumPolicy::Ignore
    }

    /// No quorum under the `freeze` policy: every resource stays exactly where it runs.
    pub fn is_frozen(&self) -> bool {
        !self.have_quorum && self.options.no_quorum_policy == NoQuorumPolicy::Freeze
    }

    /// Primitives and clones in definition order.
    pub fn allocatable_resources(&self) -> Vec<ResourceKey> {
        self.resources.iter().filter(|(_, r)| r.is_allocatable()).map(|(k, _)| k).collect()
    }

    /// Builds the stable action key `{resource}[:{instance}]_{task}[_{node}]`.
    pub fn action_uuid(&self, task: Task, resource: Option<ResourceKey>, node: Option<NodeKey>, instance: usize) -> ActionUuid {
        let mut parts = Vec::with_capacity(3);
        if let Some(resource) = resource {
            let name = self.resource_name(resource);
            parts.push(if instance > 0 { format!("{}:{}", name, instance) } else { name.to_string() });
        }
        parts.push(task.key());
        if let Some(node) = node {
            parts.push(self.node_name(node).to_string());
        }
        ActionUuid::new(parts.join("_"))
    }

    pub fn find_action(&self, task: Task, resource: Option<ResourceKey>, node: Option<NodeKey>, instance: usize) -> Option<ActionKey> {
        self.action_index.get(&self.action_uuid(task, resource, node, instance)).copied()
    }

    /// Returns the existing action or creates it. Asking for a required action makes an optional one required.
    pub fn find_or_create_action(
        &mut self,
        task: Task,
        resource: Option<ResourceKey>,
        node: Option<NodeKey>,
        instance: usize,
        optional: bool,
    ) -> ActionKey {
        let uuid = self.action_uuid(task, resource, node, instance);
        if let Some(key) = self.action_index.get(&uuid).copied() {
            if !optional {
                self.actions[key].flags.optional = false;
            }
            return key;
        }

        let mut action = Action::new(uuid.clone(), task, resource, node, optional);
        action.instance = instance;
        if let Some(rsc) = resource.and_then(|r| self.resources.get(r)) {
            action.priority = rsc.priority;
            if let Some(on_fail) = rsc.on_fail {
                action.on_fail = on_fail;
            }
        }
        let key = self.actions.insert(action);
        self.action_index.insert(uuid, key);
        key
    }

    /// Orders `first` before `then`. Duplicate edges of the same kind are ignored.
    pub fn order(&mut self, first: ActionKey, then: ActionKey, kind: OrderKind) {
        if first == then {
            return;
        }
        let exists = self.actions[first].before.iter().any(|e| e.action == then && e.kind == kind);
        if exists {
            return;
        }
        self.actions[first].before.push(ActionEdge { action: then, kind });
        self.actions[then].after.push(ActionEdge { action: first, kind });
    }

    /// Actions of `resource` with the given task, in creation order.
    pub fn resource_actions(&self, resource: ResourceKey, task: Task) -> Vec<ActionKey> {
        self.actions.iter().filter(|(_, a)| a.resource == Some(resource) && a.task == task).map(|(k, _)| k).collect()
    }

    /// Every action scheduled on `node`, in creation order.
    pub fn node_actions(&self, node: NodeKey) -> Vec<ActionKey> {
        self.actions.iter().filter(|(_, a)| a.node == Some(node)).map(|(k, _)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_rules() {
        assert!(QuorumRule::Majority.is_satisfied(2, 3));
        assert!(!QuorumRule::Majority.is_satisfied(2, 4));
        assert!(QuorumRule::AtLeast(2).is_satisfied(2, 5));
        assert_eq!("atLeast:3".parse::<QuorumRule>().unwrap(), QuorumRule::AtLeast(3));
        assert!("atLeast:x".parse::<QuorumRule>().is_err());
    }

    #[test]
    fn test_no_quorum_policy_names() {
        assert_eq!("Freeze".parse::<NoQuorumPolicy>().unwrap(), NoQuorumPolicy::Freeze);
        assert!(matches!("panic".parse::<NoQuorumPolicy>(), Err(ConversionError::UnknownNoQuorumPolicy(_))));
    }
}
