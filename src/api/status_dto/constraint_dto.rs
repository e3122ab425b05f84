use serde::Deserialize;

use crate::domain::utils::score::Score;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ConstraintsDto {
    pub location: Vec<LocationDto>,
    pub colocation: Vec<ColocationDto>,
    pub ordering: Vec<OrderingDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDto {
    pub id: String,
    pub resource: String,
    /// Without `node` and `rule` the score applies to every node.
    pub node: Option<String>,
    pub rule: Option<NodeRuleDto>,
    pub score: Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleOperationDto {
    Eq,
    Ne,
    Defined,
    NotDefined,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRuleDto {
    pub attribute: String,
    pub operation: RuleOperationDto,
    pub value: Option<String>,
}

/// `resource` is placed relative to `with`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColocationDto {
    pub id: String,
    pub resource: String,
    pub with: String,
    pub score: Score,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderingDto {
    pub id: String,
    pub first: String,
    #[serde(default = "default_action")]
    pub first_action: String,
    pub then: String,
    #[serde(default = "default_action")]
    pub then_action: String,
    /// `mandatory` (default) or `advisory`.
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub symmetrical: bool,
}

fn default_action() -> String {
    "start".to_string()
}

fn default_kind() -> String {
    "mandatory".to_string()
}

fn default_true() -> bool {
    true
}
