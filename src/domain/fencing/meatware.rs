use std::fmt;
use std::sync::Arc;

use crate::domain::fencing::device::{FenceResult, FencingDevice, parse_host_list};
use crate::error::FenceError;

/// Channel to a human operator who power-cycles hosts by hand.
pub trait OperatorConfirmation: fmt::Debug + Send + Sync {
    /// Asks the operator to reset `host`. Blocks until they answer; `Ok(false)` means they refused.
    fn confirm_reset(&self, host: &str) -> FenceResult<bool>;
}

/// Manual fencing: every reset waits for an operator to confirm the host was power-cycled.
pub struct MeatwareDevice {
    operator: Arc<dyn OperatorConfirmation>,
    hosts: Option<Vec<String>>,
}

impl MeatwareDevice {
    pub const TYPE: &'static str = "meatware";

    pub fn new(operator: Arc<dyn OperatorConfirmation>) -> Self {
        MeatwareDevice { operator, hosts: None }
    }

    fn hosts(&self) -> FenceResult<&[String]> {
        self.hosts.as_deref().ok_or_else(|| FenceError::Oops("meatware device is not configured".to_string()))
    }
}

impl fmt::Debug for MeatwareDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeatwareDevice").field("hosts", &self.hosts).finish()
    }
}

impl FencingDevice for MeatwareDevice {
    fn device_type(&self) -> &str {
        Self::TYPE
    }

    fn device_id(&self) -> String {
        "meatware fencing device".to_string()
    }

    fn config_syntax(&self) -> &'static str {
        "hostname ..."
    }

    fn set_config(&mut self, info: &str) -> FenceResult<()> {
        if self.hosts.is_some() {
            return Err(FenceError::Oops("meatware device is already configured".to_string()));
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
        log::error!("Operator intervention required to reset {}", host);
        if self.operator.confirm_reset(host)? {
            log::info!("Host {} meatware-reset", host);
            Ok(())
        } else {
            log::error!("Operator did not confirm reset of {}", host);
            Err(FenceError::ResetFailed)
        }
    }

    fn list_hosts(&self) -> FenceResult<Vec<String>> {
        self.hosts().map(<[String]>::to_vec)
    }
}
