use slotmap::new_key_type;
use std::fmt;
use std::str::FromStr;

use crate::domain::cluster::node::NodeKey;
use crate::domain::cluster::resource::{OnFail, ResourceKey};
use crate::domain::utils::id::ActionUuid;
use crate::error::ConversionError;

new_key_type! {
    pub struct ActionKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyPhase {
    Pre,
    Post,
}

/// Operation a notification bracket surrounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyOp {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Start,
    Stop,
    Promote,
    Demote,
    Monitor { interval_ms: u64 },
    /// Per-node notification sent to a resource instance.
    Notify { phase: NotifyPhase, op: NotifyOp },
    /// Resource-wide pseudo action opening (`confirmed == false`) or closing a notification phase.
    NotifyBarrier { phase: NotifyPhase, op: NotifyOp, confirmed: bool },
    Fence,
    Shutdown,
    /// Pseudo action completing once every stop on a node is done.
    AllStopped,
}

impl Task {
    /// Name handed to the executor.
    pub fn name(self) -> String {
        match self {
            Task::Start => "start".to_string(),
            Task::Stop => "stop".to_string(),
            Task::Promote => "promote".to_string(),
            Task::Demote => "demote".to_string(),
            Task::Monitor { .. } => "monitor".to_string(),
            Task::Notify { .. } => "notify".to_string(),
            Task::NotifyBarrier { phase, op, confirmed } => {
                let prefix = if confirmed { "confirmed-" } else { "" };
                format!("{}{}", prefix, notify_key(phase, op))
            }
            Task::Fence => "stonith".to_string(),
            Task::Shutdown => "do_shutdown".to_string(),
            Task::AllStopped => "all_stopped".to_string(),
        }
    }

    /// Task segment of an action uuid; unique per task variant.
    pub fn key(self) -> String {
        match self {
            Task::Monitor { interval_ms } => format!("monitor_{}", interval_ms),
            Task::Notify { phase, op } => notify_key(phase, op),
            other => other.name(),
        }
    }

    /// Task undoing this one, used for symmetrical orderings.
    pub fn inverse(self) -> Option<Task> {
        match self {
            Task::Start => Some(Task::Stop),
            Task::Stop => Some(Task::Start),
            Task::Promote => Some(Task::Demote),
            Task::Demote => Some(Task::Promote),
            _ => None,
        }
    }

    pub fn default_needs(self) -> Needs {
        match self {
            Task::Start | Task::Promote | Task::Monitor { .. } | Task::Fence => Needs::Quorum,
            _ => Needs::Nothing,
        }
    }

    pub fn is_stop_like(self) -> bool {
        matches!(self, Task::Stop | Task::Demote)
    }
}

fn notify_key(phase: NotifyPhase, op: NotifyOp) -> String {
    let phase = match phase {
        NotifyPhase::Pre => "pre",
        NotifyPhase::Post => "post",
    };
    let op = match op {
        NotifyOp::Start => "start",
        NotifyOp::Stop => "stop",
    };
    format!("{}_notify_{}", phase, op)
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Tasks an ordering constraint may name.
impl FromStr for Task {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(Task::Start),
            "stop" => Ok(Task::Stop),
            "promote" => Ok(Task::Promote),
            "demote" => Ok(Task::Demote),
            _ => Err(ConversionError::UnknownTask(s.to_string())),
        }
    }
}

/// Precondition the cluster must satisfy before the action may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Needs {
    Nothing,
    Quorum,
    /// Only valid once the hosting node has been fenced.
    Fencing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OrderKind {
    /// Orders the actions only when both are scheduled anyway.
    Advisory,
    /// `then` cannot run before `first`, nor at all if `first` cannot run.
    Mandatory,
    /// Mandatory, and a required `first` makes `then` required.
    ImpliesThen,
    /// Mandatory, and a required `then` makes `first` required.
    ImpliesFirst,
}

impl OrderKind {
    pub fn is_mandatory(self) -> bool {
        self != OrderKind::Advisory
    }

    /// Kind of the reversed edge added for symmetrical constraints.
    pub fn inverse(self) -> OrderKind {
        match self {
            OrderKind::ImpliesThen => OrderKind::ImpliesFirst,
            OrderKind::ImpliesFirst => OrderKind::ImpliesThen,
            other => other,
        }
    }

    /// Parses the kind named by an ordering constraint.
    pub fn from_constraint_kind(s: &str) -> Result<OrderKind, ConversionError> {
        match s.to_ascii_lowercase().as_str() {
            "mandatory" => Ok(OrderKind::ImpliesThen),
            "advisory" | "optional" => Ok(OrderKind::Advisory),
            _ => Err(ConversionError::UnknownOrderKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionFlags {
    pub runnable: bool,
    /// Only executed if something makes it required.
    pub optional: bool,
    /// Bookkeeping action the executor confirms without running anything.
    pub pseudo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionEdge {
    pub action: ActionKey,
    pub kind: OrderKind,
}

#[derive(Debug, Clone)]
pub struct Action {
    /// Assigned when the graph is emitted.
    pub id: Option<usize>,
    pub uuid: ActionUuid,
    pub task: Task,
    pub resource: Option<ResourceKey>,
    pub node: Option<NodeKey>,
    /// Clone instance on `node`; 0 for everything else.
    pub instance: usize,
    pub flags: ActionFlags,
    pub on_fail: OnFail,
    pub needs: Needs,
    /// Actions that run after this one.
    pub before: Vec<ActionEdge>,
    /// Actions this one runs after.
    pub after: Vec<ActionEdge>,
    pub dumped: bool,
    pub processed: bool,
    pub priority: i64,
    /// Why the action cannot run.
    pub reason: Option<String>,
}

impl Action {
    pub fn new(uuid: ActionUuid, task: Task, resource: Option<ResourceKey>, node: Option<NodeKey>, optional: bool) -> Self {
        Action {
            id: None,
            uuid,
            task,
            resource,
            node,
            instance: 0,
            flags: ActionFlags { runnable: true, optional, pseudo: false },
            on_fail: OnFail::Restart,
            needs: task.default_needs(),
            before: Vec::new(),
            after: Vec::new(),
            dumped: false,
            processed: false,
            priority: 0,
            reason: None,
        }
    }

    pub fn is_required(&self) -> bool {
        !self.flags.optional
    }

    /// Stand-in start of a resource that has nowhere to run. Carries unrunnable state to its
    /// dependents but is never executed.
    pub fn is_placeholder(&self) -> bool {
        self.resource.is_some() && self.node.is_none() && !self.flags.pseudo
    }

    pub fn mark_unrunnable(&mut self, reason: impl Into<String>) {
        if self.flags.runnable {
            self.flags.runnable = false;
            self.reason = Some(reason.into());
        }
    }
}
