use std::fmt;
use std::sync::Arc;

use crate::domain::fencing::device::{FenceResult, FencingDevice};
use crate::error::FenceError;

/// Connection to a network power switch. The wire protocol lives outside this crate.
pub trait PowerSwitchConsole: fmt::Debug + Send + Sync {
    fn ping(&self) -> FenceResult<()>;

    /// Turns `outlet` off and on again.
    fn power_cycle(&self, outlet: u32) -> FenceResult<()>;
}

/// Power switch with one or more outlets per host, configured as `host:outlet[,outlet] ...`.
pub struct PowerSwitchDevice {
    model: String,
    console: Arc<dyn PowerSwitchConsole>,
    outlets: Option<Vec<(String, Vec<u32>)>>,
}

impl PowerSwitchDevice {
    pub fn new(model: impl Into<String>, console: Arc<dyn PowerSwitchConsole>) -> Self {
        PowerSwitchDevice { model: model.into(), console, outlets: None }
    }

    fn parse_config(info: &str) -> FenceResult<Vec<(String, Vec<u32>)>> {
        let mut mapping: Vec<(String, Vec<u32>)> = Vec::new();
        for entry in info.split_whitespace() {
            let (host, outlets) =
                entry.split_once(':').ok_or_else(|| FenceError::BadConfig(format!("'{}' is not of the form host:outlet", entry)))?;
            if host.is_empty() {
                return Err(FenceError::BadConfig(format!("'{}' has no host name", entry)));
            }
            let outlets = outlets
                .split(',')
                .map(|o| o.trim().parse::<u32>().map_err(|_| FenceError::BadConfig(format!("'{}' is not an outlet number", o))))
                .collect::<FenceResult<Vec<u32>>>()?;

            match mapping.iter_mut().find(|(h, _)| h.eq_ignore_ascii_case(host)) {
                Some((_, existing)) => existing.extend(outlets),
                None => mapping.push((host.to_string(), outlets)),
            }
        }
        if mapping.is_empty() {
            return Err(FenceError::BadConfig("no outlets configured".to_string()));
        }
        Ok(mapping)
    }

    fn mapping(&self) -> FenceResult<&[(String, Vec<u32>)]> {
        self.outlets.as_deref().ok_or_else(|| FenceError::Oops(format!("{} is not configured", self.model)))
    }
}

impl fmt::Debug for PowerSwitchDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerSwitchDevice").field("model", &self.model).field("outlets", &self.outlets).finish()
    }
}

impl FencingDevice for PowerSwitchDevice {
    fn device_type(&self) -> &str {
        &self.model
    }

    fn device_id(&self) -> String {
        format!("{} power switch", self.model)
    }

    fn config_syntax(&self) -> &'static str {
        "host:outlet[,outlet] ..."
    }

    fn set_config(&mut self, info: &str) -> FenceResult<()> {
        if self.outlets.is_some() {
            return Err(FenceError::Oops(format!("{} is already configured", self.model)));
        }
        self.outlets = Some(Self::parse_config(info)?);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.outlets.is_some()
    }

    fn status(&self) -> FenceResult<()> {
        self.mapping()?;
        self.console.ping()
    }

    fn reset(&self, host: &str) -> FenceResult<()> {
        let (_, outlets) =
            self.mapping()?.iter().find(|(h, _)| h.eq_ignore_ascii_case(host)).ok_or_else(|| FenceError::BadHost(host.to_string()))?;
        for outlet in outlets {
            log::debug!("Power cycling outlet {} of host {}", outlet, host);
            self.console.power_cycle(*outlet)?;
        }
        log::info!("Host {} reset through {} outlet(s)", host, outlets.len());
        Ok(())
    }

    fn list_hosts(&self) -> FenceResult<Vec<String>> {
        Ok(self.mapping()?.iter().map(|(h, _)| h.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingConsole {
        cycled: Mutex<Vec<u32>>,
        broken_outlet: Option<u32>,
    }

    impl PowerSwitchConsole for RecordingConsole {
        fn ping(&self) -> FenceResult<()> {
            Ok(())
        }

        fn power_cycle(&self, outlet: u32) -> FenceResult<()> {
            if self.broken_outlet == Some(outlet) {
                return Err(FenceError::ResetFailed);
            }
            self.cycled.lock().unwrap().push(outlet);
            Ok(())
        }
    }

    #[test]
    fn test_reset_cycles_every_outlet_of_the_host() {
        let console = Arc::new(RecordingConsole::default());
        let mut device = PowerSwitchDevice::new("apcmaster", console.clone());
        device.set_config("alpha:1,2 beta:3 ALPHA:4").unwrap();

        assert_eq!(device.list_hosts().unwrap(), vec!["alpha", "beta"]);
        device.reset("Alpha").unwrap();
        assert_eq!(*console.cycled.lock().unwrap(), vec![1, 2, 4]);
        assert_eq!(device.reset("gamma"), Err(FenceError::BadHost("gamma".to_string())));
    }

    #[test]
    fn test_bad_configs_and_failures() {
        let console = Arc::new(RecordingConsole { cycled: Mutex::new(Vec::new()), broken_outlet: Some(3) });
        let mut device = PowerSwitchDevice::new("rps10", console);
        assert!(device.status().is_err());
        assert!(matches!(device.set_config("alpha"), Err(FenceError::BadConfig(_))));
        assert!(matches!(device.set_config("alpha:x"), Err(FenceError::BadConfig(_))));

        device.set_config("beta:3").unwrap();
        assert_eq!(device.reset("beta"), Err(FenceError::ResetFailed));
    }
}
