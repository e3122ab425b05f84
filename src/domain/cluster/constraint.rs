use std::collections::BTreeMap;

use crate::domain::cluster::action::{OrderKind, Task};
use crate::domain::cluster::node::NodeKey;
use crate::domain::cluster::resource::ResourceKey;
use crate::domain::utils::id::ConstraintId;
use crate::domain::utils::score::Score;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOperation {
    Eq,
    Ne,
    Defined,
    NotDefined,
}

/// Condition on a node attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRule {
    pub attribute: String,
    pub operation: RuleOperation,
    pub value: Option<String>,
}

impl NodeRule {
    pub fn matches(&self, attrs: &BTreeMap<String, String>) -> bool {
        let actual = attrs.get(&self.attribute);
        match self.operation {
            RuleOperation::Defined => actual.is_some(),
            RuleOperation::NotDefined => actual.is_none(),
            RuleOperation::Eq => actual.is_some_and(|v| Some(v) == self.value.as_ref()),
            RuleOperation::Ne => actual != self.value.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationConstraint {
    pub id: ConstraintId,
    pub resource: ResourceKey,
    pub node: Option<NodeKey>,
    pub rule: Option<NodeRule>,
    pub score: Score,
}

/// `dependent` is placed relative to wherever `primary` ends up.
#[derive(Debug, Clone)]
pub struct ColocationConstraint {
    pub id: ConstraintId,
    pub dependent: ResourceKey,
    pub primary: ResourceKey,
    pub score: Score,
}

#[derive(Debug, Clone)]
pub struct OrderingConstraint {
    pub id: ConstraintId,
    pub first: ResourceKey,
    pub first_task: Task,
    pub then: ResourceKey,
    pub then_task: Task,
    pub kind: OrderKind,
    /// Also order the inverse tasks in reverse, e.g. stop `then` before stopping `first`.
    pub symmetrical: bool,
}
