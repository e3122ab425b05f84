use std::fmt;

use crate::error::FenceError;

pub type FenceResult<T> = std::result::Result<T, FenceError>;

/// A device able to power off or reset cluster nodes.
pub trait FencingDevice: fmt::Debug + Send + Sync {
    /// Registry name of the device type.
    fn device_type(&self) -> &str;

    /// Human readable identity of the configured device.
    fn device_id(&self) -> String;

    /// Describes what `set_config` expects.
    fn config_syntax(&self) -> &'static str;

    /// Configures the device. A device can only be configured once.
    fn set_config(&mut self, info: &str) -> FenceResult<()>;

    fn is_configured(&self) -> bool;

    /// Checks that the device is reachable and working.
    fn status(&self) -> FenceResult<()>;

    /// Resets `host`. Host names are matched case-insensitively.
    fn reset(&self, host: &str) -> FenceResult<()>;

    /// Hosts this device controls.
    fn list_hosts(&self) -> FenceResult<Vec<String>>;
}

/// Parses a whitespace separated host list.
pub fn parse_host_list(info: &str) -> FenceResult<Vec<String>> {
    let hosts: Vec<String> = info.split_whitespace().map(str::to_string).collect();
    if hosts.is_empty() {
        return Err(FenceError::BadConfig("empty host list".to_string()));
    }
    Ok(hosts)
}
