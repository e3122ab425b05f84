use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKindDto {
    #[default]
    Primitive,
    Group,
    Clone,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDto {
    pub id: String,
    #[serde(default)]
    pub kind: ResourceKindDto,
    /// Members of a group, in start order.
    #[serde(default)]
    pub children: Vec<ResourceDto>,
    #[serde(default)]
    pub priority: i64,
    pub stickiness: Option<i64>,
    pub fail_stickiness: Option<i64>,
    /// `stopStart`, `stopOnly` or `block`.
    pub recovery_type: Option<String>,
    /// `restart` or `ignore`.
    pub restart_type: Option<String>,
    #[serde(default)]
    pub notify: bool,
    #[serde(default = "default_true")]
    pub managed: bool,
    #[serde(default)]
    pub promotable: bool,
    /// `stopped`, `started`, `slave` or `master`.
    pub target_role: Option<String>,
    pub on_fail: Option<String>,
    pub monitor_interval_ms: Option<u64>,
    pub clone_max: Option<u32>,
    pub clone_node_max: Option<u32>,
    #[serde(default)]
    pub globally_unique: bool,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub status: ResourceStatusDto,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceStatusDto {
    pub running_on: Vec<String>,
    pub role: Option<String>,
    pub failed: bool,
    pub fail_counts: BTreeMap<String, u32>,
    /// Still reported by the status source but no longer configured.
    pub orphan: bool,
}

fn default_true() -> bool {
    true
}
