use serde::Deserialize;

use crate::domain::membership::version_retry::RetryPolicy;

/// Static configuration of the engine process, loaded once at startup.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfigDto {
    pub membership: MembershipConfigDto,
    pub fencing: Option<FencingDeviceDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MembershipConfigDto {
    pub local_slot: usize,
    pub max_nodes: usize,
    pub tick_interval_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for MembershipConfigDto {
    fn default() -> Self {
        MembershipConfigDto { local_slot: 0, max_nodes: 256, tick_interval_ms: 1000, retry: RetryPolicy::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FencingDeviceDto {
    /// Registry name, matched case-insensitively.
    #[serde(rename = "type")]
    pub typ: String,
    /// Device specific configuration string, e.g. a host list.
    #[serde(default)]
    pub config: String,
}
