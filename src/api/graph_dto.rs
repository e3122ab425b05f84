use serde::Serialize;

/// Ordered action plan handed to the external executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionGraphDto {
    pub have_quorum: bool,
    pub action_count: usize,
    pub synapses: Vec<SynapseDto>,
}

/// Actions sharing the same triggering inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynapseDto {
    pub id: usize,
    pub priority: i64,
    /// Ids of the actions that must complete before this synapse fires.
    pub inputs: Vec<usize>,
    pub actions: Vec<GraphActionDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphActionDto {
    pub id: usize,
    pub uuid: String,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub before: Vec<usize>,
    pub after: Vec<usize>,
    pub runnable: bool,
    pub pseudo: bool,
    pub on_fail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TransitionGraphDto {
    pub fn actions(&self) -> impl Iterator<Item = &GraphActionDto> {
        self.synapses.iter().flat_map(|s| s.actions.iter())
    }

    pub fn find(&self, uuid: &str) -> Option<&GraphActionDto> {
        self.actions().find(|a| a.uuid == uuid)
    }

    pub fn by_id(&self, id: usize) -> Option<&GraphActionDto> {
        self.actions().find(|a| a.id == id)
    }

    /// True if `ancestor` precedes `id` on every path back to a root, i.e. `id` cannot fire before `ancestor` completes.
    pub fn is_ancestor_on_every_path(&self, ancestor: usize, id: usize) -> bool {
        if ancestor == id {
            return true;
        }
        match self.by_id(id) {
            Some(action) if !action.after.is_empty() => action.after.iter().all(|pred| self.is_ancestor_on_every_path(ancestor, *pred)),
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
