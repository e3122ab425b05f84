use slotmap::new_key_type;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::cluster::node::NodeKey;
use crate::domain::utils::id::ResourceId;
use crate::domain::utils::score::Score;
use crate::error::ConversionError;

new_key_type! {
    pub struct ResourceKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Stopped,
    Started,
    Slave,
    Master,
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stopped" => Ok(Role::Stopped),
            "started" => Ok(Role::Started),
            "slave" => Ok(Role::Slave),
            "master" => Ok(Role::Master),
            _ => Err(ConversionError::UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Stopped => "Stopped",
            Role::Started => "Started",
            Role::Slave => "Slave",
            Role::Master => "Master",
        };
        write!(f, "{}", name)
    }
}

/// What to do when a primitive is found active on more than one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryType {
    StopStart,
    StopOnly,
    Block,
}

impl FromStr for RecoveryType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stopstart" | "stop_start" => Ok(RecoveryType::StopStart),
            "stoponly" | "stop_only" => Ok(RecoveryType::StopOnly),
            "block" => Ok(RecoveryType::Block),
            _ => Err(ConversionError::UnknownRecoveryType(s.to_string())),
        }
    }
}

/// Whether a failed resource is restarted in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartType {
    Restart,
    Ignore,
}

impl FromStr for RestartType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "restart" => Ok(RestartType::Restart),
            "ignore" => Ok(RestartType::Ignore),
            _ => Err(ConversionError::UnknownRestartType(s.to_string())),
        }
    }
}

/// Executor reaction when an action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFail {
    Ignore,
    Restart,
    Stop,
    Block,
    Fence,
}

impl OnFail {
    pub fn as_str(self) -> &'static str {
        match self {
            OnFail::Ignore => "ignore",
            OnFail::Restart => "restart",
            OnFail::Stop => "stop",
            OnFail::Block => "block",
            OnFail::Fence => "fence",
        }
    }
}

impl FromStr for OnFail {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" | "nothing" => Ok(OnFail::Ignore),
            "restart" => Ok(OnFail::Restart),
            "stop" => Ok(OnFail::Stop),
            "block" => Ok(OnFail::Block),
            "fence" | "stonith" => Ok(OnFail::Fence),
            _ => Err(ConversionError::UnknownOnFail(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceVariant {
    Primitive,
    /// Ordered, colocated set of primitives. Has no actions of its own.
    Group,
    /// `clone_max` interchangeable instances of one primitive.
    Clone { clone_max: u32, clone_node_max: u32, globally_unique: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceStatus {
    /// Set until the allocator has made its final decision.
    pub provisional: bool,
    pub orphan: bool,
    pub failed: bool,
    pub managed: bool,
    /// False when the allocator found no eligible node.
    pub runnable: bool,
}

impl Default for ResourceStatus {
    fn default() -> Self {
        ResourceStatus { provisional: true, orphan: false, failed: false, managed: true, runnable: true }
    }
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub parent: Option<ResourceKey>,
    pub children: Vec<ResourceKey>,
    pub variant: ResourceVariant,

    pub role: Role,
    pub next_role: Role,
    pub promotable: bool,
    pub target_role: Option<Role>,

    pub priority: i64,
    pub stickiness: Score,
    pub fail_stickiness: Score,
    pub fail_counts: BTreeMap<NodeKey, u32>,
    pub recovery_type: RecoveryType,
    pub restart_type: RestartType,
    pub status: ResourceStatus,
    pub notify: bool,
    pub monitor_interval_ms: Option<u64>,
    pub on_fail: Option<OnFail>,

    /// Final candidate table of the last allocation pass.
    pub allowed_nodes: BTreeMap<NodeKey, Score>,
    /// One entry per running instance; primitives normally have at most one.
    pub running_on: Vec<NodeKey>,
    pub allocated_to: Vec<NodeKey>,

    /// Indices into the working set's constraint lists.
    pub locations: Vec<usize>,
    pub colocations: Vec<usize>,

    pub meta: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, String>,
}

impl Resource {
    pub fn is_group(&self) -> bool {
        self.variant == ResourceVariant::Group
    }

    pub fn is_clone(&self) -> bool {
        matches!(self.variant, ResourceVariant::Clone { .. })
    }

    /// Primitives and clones are placed by the allocator; groups follow their children.
    pub fn is_allocatable(&self) -> bool {
        !self.is_group()
    }

    pub fn is_multi_active(&self) -> bool {
        !self.is_clone() && self.running_on.len() > 1
    }

    pub fn is_running(&self) -> bool {
        !self.running_on.is_empty()
    }

    pub fn is_managed(&self) -> bool {
        self.status.managed
    }

    /// True unless the configuration explicitly asks for the resource to be stopped.
    pub fn wants_to_run(&self) -> bool {
        self.target_role != Some(Role::Stopped) && !self.status.orphan
    }

    /// Role of a running, non-promoted instance.
    pub fn running_role(&self) -> Role {
        if self.promotable { Role::Slave } else { Role::Started }
    }

    pub fn fail_count(&self, node: NodeKey) -> u32 {
        self.fail_counts.get(&node).copied().unwrap_or(0)
    }

    /// Number of instances the snapshot reports on `node`.
    pub fn running_count(&self, node: NodeKey) -> usize {
        self.running_on.iter().filter(|n| **n == node).count()
    }

    pub fn allocated_count(&self, node: NodeKey) -> usize {
        self.allocated_to.iter().filter(|n| **n == node).count()
    }
}
