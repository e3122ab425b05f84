use tracing::{info, warn};

use crate::api::engine_config_dto::FencingDeviceDto;
use crate::domain::fencing::device::FencingDevice;
use crate::domain::fencing::registry::FencingRegistry;
use crate::error::{Error, FenceError, Result};

/// Owns the configured fencing device, if any, and runs fencing requests against it.
#[derive(Debug, Default)]
pub struct FencingCoordinator {
    device: Option<Box<dyn FencingDevice>>,
    hosts: Vec<String>,
}

impl FencingCoordinator {
    /// Coordinator without a device. Every fencing request fails.
    pub fn unavailable() -> Self {
        FencingCoordinator { device: None, hosts: Vec::new() }
    }

    /// Wraps a configured device and caches the hosts it controls.
    pub fn with_device(device: Box<dyn FencingDevice>) -> Result<Self> {
        let hosts = device.list_hosts().map_err(Error::FencingSetup)?;
        info!(device = %device.device_id(), hosts = hosts.len(), "fencing device ready");
        Ok(FencingCoordinator { device: Some(device), hosts })
    }

    /// Builds the coordinator from the engine configuration.
    ///
    /// An unknown or missing device type leaves fencing unavailable. A device that rejects its
    /// configuration is an error.
    pub fn from_config(registry: &FencingRegistry, config: Option<&FencingDeviceDto>) -> Result<Self> {
        let Some(config) = config else {
            warn!("no fencing device configured, fencing unavailable");
            return Ok(Self::unavailable());
        };
        let Some(mut device) = registry.create(&config.typ) else {
            warn!(device_type = %config.typ, "unknown fencing device type, fencing unavailable");
            return Ok(Self::unavailable());
        };
        device.set_config(&config.config).map_err(Error::FencingSetup)?;
        Self::with_device(device)
    }

    pub fn is_available(&self) -> bool {
        self.device.is_some()
    }

    pub fn device_id(&self) -> Option<String> {
        self.device.as_ref().map(|d| d.device_id())
    }

    /// True if the configured device controls `host`.
    pub fn can_fence(&self, host: &str) -> bool {
        self.device.is_some() && self.hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
    }

    /// Fences `host` once. Failures are reported to the caller, never retried here.
    pub fn fence(&self, host: &str) -> Result<()> {
        let Some(device) = &self.device else {
            warn!(host, "cannot fence: no fencing device");
            return Err(Error::Fencing { node: host.to_string(), source: FenceError::NoDevice });
        };
        match device.reset(host) {
            Ok(()) => {
                info!(host, device = %device.device_id(), "host fenced");
                Ok(())
            }
            Err(source) => {
                warn!(host, error = %source, "fencing failed");
                Err(Error::Fencing { node: host.to_string(), source })
            }
        }
    }
}
