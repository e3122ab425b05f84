use slotmap::new_key_type;
use std::collections::BTreeMap;

use crate::domain::cluster::constraint::NodeRule;
use crate::domain::cluster::resource::ResourceKey;
use crate::domain::utils::id::NodeId;
use crate::domain::utils::score::Score;

new_key_type! {
    pub struct NodeKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Full cluster member, counts towards quorum and can host resources.
    Member,
    /// Connectivity target only.
    Ping,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub uname: String,
    pub node_type: NodeType,
    pub online: bool,
    pub standby: bool,
    pub unclean: bool,
    pub shutdown: bool,
    pub expected_up: bool,
    pub is_dc: bool,
    pub weight: i64,
    pub fixed: bool,
    /// Position of the node in the membership bitmap.
    pub slot: usize,
    pub attrs: BTreeMap<String, String>,

    /// Resources the status snapshot reports on this node.
    pub running: Vec<ResourceKey>,
    /// Resources the allocator placed on this node.
    pub allocated: Vec<ResourceKey>,
}

impl Node {
    pub fn can_run_resources(&self) -> bool {
        self.online && self.node_type == NodeType::Member && !self.standby && !self.unclean && !self.shutdown
    }

    /// Starting score of the node in every candidate table.
    pub fn base_score(&self) -> Score {
        if self.fixed { Score::new(self.weight) } else { Score::ZERO }
    }

    pub fn matches(&self, rule: &NodeRule) -> bool {
        rule.matches(&self.attrs)
    }

    /// Online member still able to take part in cluster operations such as notifications.
    pub fn is_reachable(&self) -> bool {
        self.online && !self.unclean && self.node_type == NodeType::Member
    }
}
