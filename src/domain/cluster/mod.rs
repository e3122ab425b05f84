pub mod action;
pub mod builder;
pub mod constraint;
pub mod node;
pub mod resource;
pub mod working_set;

pub use action::{Action, ActionEdge, ActionFlags, ActionKey, Needs, NotifyOp, NotifyPhase, OrderKind, Task};
pub use builder::build_working_set;
pub use constraint::{ColocationConstraint, LocationConstraint, NodeRule, OrderingConstraint, RuleOperation};
pub use node::{Node, NodeKey, NodeType};
pub use resource::{OnFail, RecoveryType, Resource, ResourceKey, ResourceStatus, ResourceVariant, RestartType, Role};
pub use working_set::{ClusterOptions, NoQuorumPolicy, QuorumRule, StonithAction, WorkingSet};
