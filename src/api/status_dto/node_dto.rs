use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum NodeTypeDto {
    #[default]
    Member,
    Ping,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDto {
    pub id: String,
    pub uname: Option<String>,
    #[serde(default, rename = "type")]
    pub typ: NodeTypeDto,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub standby: bool,
    #[serde(default)]
    pub unclean: bool,
    #[serde(default)]
    pub shutdown: bool,
    pub expected_up: Option<bool>,
    #[serde(default)]
    pub is_dc: bool,
    #[serde(default)]
    pub weight: i64,
    #[serde(default)]
    pub fixed: bool,
    /// Membership bitmap slot; defaults to the node's position in the snapshot.
    pub slot: Option<usize>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}
