use crate::domain::fencing::device::{FenceResult, FencingDevice, parse_host_list};
use crate::error::FenceError;

/// Device that pretends to reset the hosts it was configured with. Used for testing setups.
#[derive(Debug, Default)]
pub struct NullDevice {
    hosts: Option<Vec<String>>,
}

impl NullDevice {
    pub const TYPE: &'static str = "null";

    pub fn new() -> Self {
        NullDevice { hosts: None }
    }

    fn hosts(&self) -> FenceResult<&[String]> {
        self.hosts.as_deref().ok_or_else(|| FenceError::Oops("null device is not configured".to_string()))
    }
}

impl FencingDevice for NullDevice {
    fn device_type(&self) -> &str {
        Self::TYPE
    }

    fn device_id(&self) -> String {
        "null fencing device".to_string()
    }

    fn config_syntax(&self) -> &'static str {
        "hostname ..."
    }

    fn set_config(&mut self, info: &str) -> FenceResult<()> {
        if self.hosts.is_some() {
            return Err(FenceError::Oops("null device is already configured".to_string()));
        }
        self.hosts = Some(parse_host_list(info)?);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.hosts.is_some()
    }

    fn status(&self) -> FenceResult<()> {
        self.hosts().map(|_| ())
    }

    fn reset(&self, host: &str) -> FenceResult<()> {
        if !self.hosts()?.iter().any(|h| h.eq_ignore_ascii_case(host)) {
            return Err(FenceError::BadHost(host.to_string()));
        }
        log::info!("Host {} null-reset", host);
        Ok(())
    }

    fn list_hosts(&self) -> FenceResult<Vec<String>> {
        self.hosts().map(<[String]>::to_vec)
    }
}
