use serde::Deserialize;

use crate::api::status_dto::constraint_dto::ConstraintsDto;
use crate::api::status_dto::node_dto::NodeDto;
use crate::api::status_dto::resource_dto::ResourceDto;

/// Snapshot of the cluster handed to one scheduling pass.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatusDto {
    #[serde(default)]
    pub config: ClusterOptionsDto,
    pub nodes: Vec<NodeDto>,
    #[serde(default)]
    pub resources: Vec<ResourceDto>,
    #[serde(default)]
    pub constraints: ConstraintsDto,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterOptionsDto {
    /// `freeze`, `stop` or `ignore`.
    pub no_quorum_policy: String,
    pub stonith_enabled: bool,
    /// `reboot` or `off`.
    pub stonith_action: String,
    pub symmetric_cluster: bool,
    pub default_resource_stickiness: i64,
    pub default_resource_fail_stickiness: i64,
    pub stop_orphan_resources: bool,
    /// `majority` or `atLeast:<n>`.
    pub quorum: String,
    pub dc_uuid: Option<String>,
    pub max_nodes: usize,
}

impl Default for ClusterOptionsDto {
    fn default() -> Self {
        ClusterOptionsDto {
            no_quorum_policy: "stop".to_string(),
            stonith_enabled: true,
            stonith_action: "reboot".to_string(),
            symmetric_cluster: true,
            default_resource_stickiness: 0,
            default_resource_fail_stickiness: 0,
            stop_orphan_resources: true,
            quorum: "majority".to_string(),
            dc_uuid: None,
            max_nodes: 256,
        }
    }
}
