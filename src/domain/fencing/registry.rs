use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::fencing::device::FencingDevice;
use crate::domain::fencing::meatware::{MeatwareDevice, OperatorConfirmation};
use crate::domain::fencing::null_device::NullDevice;
use crate::domain::fencing::power_switch::{PowerSwitchConsole, PowerSwitchDevice};

pub type DeviceConstructor = Box<dyn Fn() -> Box<dyn FencingDevice> + Send + Sync>;

/// Power switch models sharing the `host:outlet` configuration.
pub const POWER_SWITCH_MODELS: [&str; 3] = ["apcmaster", "rps10", "wti_nps"];

/// Maps device type names to constructors. Names are case-insensitive.
#[derive(Default)]
pub struct FencingRegistry {
    constructors: BTreeMap<String, DeviceConstructor>,
}

impl FencingRegistry {
    pub fn new() -> Self {
        FencingRegistry { constructors: BTreeMap::new() }
    }

    /// Registry containing the devices that need no external connection.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(NullDevice::TYPE, || Box::new(NullDevice::new()));
        registry
    }

    /// Registers `name`, replacing an earlier registration of the same name.
    pub fn register(&mut self, name: &str, constructor: impl Fn() -> Box<dyn FencingDevice> + Send + Sync + 'static) {
        if self.constructors.insert(name.to_ascii_lowercase(), Box::new(constructor)).is_some() {
            log::debug!("Fencing device type {} registered again", name);
        }
    }

    /// Registers every power switch model, all talking through `console`.
    pub fn register_power_switch(&mut self, console: Arc<dyn PowerSwitchConsole>) {
        for model in POWER_SWITCH_MODELS {
            let console = console.clone();
            self.register(model, move || Box::new(PowerSwitchDevice::new(model, console.clone())));
        }
    }

    /// Registers the manual `meatware` device, asking `operator` to confirm every reset.
    pub fn register_meatware(&mut self, operator: Arc<dyn OperatorConfirmation>) {
        self.register(MeatwareDevice::TYPE, move || Box::new(MeatwareDevice::new(operator.clone())));
    }

    /// Creates an unconfigured device of the given type, or `None` for unknown types.
    pub fn create(&self, device_type: &str) -> Option<Box<dyn FencingDevice>> {
        self.constructors.get(&device_type.to_ascii_lowercase()).map(|constructor| constructor())
    }

    pub fn types(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for FencingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FencingRegistry").field("types", &self.types()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fencing::device::FenceResult;

    #[derive(Debug)]
    struct DeadConsole;

    impl PowerSwitchConsole for DeadConsole {
        fn ping(&self) -> FenceResult<()> {
            Err(crate::error::FenceError::Access)
        }

        fn power_cycle(&self, _outlet: u32) -> FenceResult<()> {
            Err(crate::error::FenceError::Timeout)
        }
    }

    #[derive(Debug)]
    struct AbsentOperator;

    impl OperatorConfirmation for AbsentOperator {
        fn confirm_reset(&self, _host: &str) -> FenceResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = FencingRegistry::with_defaults();
        assert_eq!(registry.create("NULL").map(|d| d.device_type().to_string()), Some("null".to_string()));
        assert!(registry.create("apcmaster").is_none());
    }

    #[test]
    fn test_power_switch_aliases() {
        let mut registry = FencingRegistry::with_defaults();
        registry.register_power_switch(Arc::new(DeadConsole));
        assert_eq!(registry.types(), vec!["apcmaster", "null", "rps10", "wti_nps"]);

        let device = registry.create("WTI_NPS").unwrap();
        assert_eq!(device.device_type(), "wti_nps");
        assert!(!device.is_configured());
    }

    #[test]
    fn test_meatware_registration() {
        let mut registry = FencingRegistry::with_defaults();
        registry.register_meatware(Arc::new(AbsentOperator));
        assert_eq!(registry.types(), vec!["meatware", "null"]);

        let mut device = registry.create("MeatWare").unwrap();
        device.set_config("alpha").unwrap();
        assert_eq!(device.reset("alpha"), Err(crate::error::FenceError::ResetFailed));
    }
}
