use std::sync::{Arc, Mutex};

use ha_policy_engine::{
    api::engine_config_dto::EngineConfigDto,
    domain::fencing::{FenceResult, FencingCoordinator, FencingRegistry, OperatorConfirmation, PowerSwitchConsole},
    error::{Error, FenceError},
    loader::parser::parse_json_str,
};

#[derive(Debug, Default)]
struct OutletLog {
    cycled: Mutex<Vec<u32>>,
}

impl PowerSwitchConsole for OutletLog {
    fn ping(&self) -> FenceResult<()> {
        Ok(())
    }

    fn power_cycle(&self, outlet: u32) -> FenceResult<()> {
        self.cycled.lock().unwrap().push(outlet);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Operator {
    confirmed: Mutex<Vec<String>>,
}

impl OperatorConfirmation for Operator {
    fn confirm_reset(&self, host: &str) -> FenceResult<bool> {
        if host == "n2" {
            return Ok(false);
        }
        self.confirmed.lock().unwrap().push(host.to_string());
        Ok(true)
    }
}

fn registry(console: Arc<OutletLog>) -> FencingRegistry {
    let mut registry = FencingRegistry::with_defaults();
    registry.register_power_switch(console);
    registry
}

#[test]
fn test_registry_names_are_case_insensitive() {
    let registry = registry(Arc::new(OutletLog::default()));
    for name in ["null", "NULL", "Null", "WTI_NPS", "ApcMaster"] {
        assert!(registry.create(name).is_some(), "{} is not registered", name);
    }
    assert!(registry.create("ssh").is_none());
    assert_eq!(registry.types(), vec!["apcmaster", "null", "rps10", "wti_nps"]);
}

#[test]
fn test_power_switch_from_engine_config() -> anyhow::Result<()> {
    let config: EngineConfigDto = parse_json_str(
        r#"{
            "membership": {"localSlot": 2, "tickIntervalMs": 250},
            "fencing": {"type": "WTI_NPS", "config": "n1:1,2 N1:3 n2:4"}
        }"#,
    )?;
    assert_eq!(config.membership.local_slot, 2);
    assert_eq!(config.membership.max_nodes, 256);

    let console = Arc::new(OutletLog::default());
    let coordinator = FencingCoordinator::from_config(&registry(console.clone()), config.fencing.as_ref())?;

    assert!(coordinator.can_fence("N2"));
    assert!(!coordinator.can_fence("n3"));
    coordinator.fence("n1")?;
    assert_eq!(*console.cycled.lock().unwrap(), vec![1, 2, 3]);

    match coordinator.fence("n3") {
        Err(Error::Fencing { node, source }) => {
            assert_eq!(node, "n3");
            assert_eq!(source, FenceError::BadHost("n3".to_string()));
        }
        other => panic!("expected a fencing failure, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_bad_device_config_fails_setup() {
    let config: EngineConfigDto = parse_json_str(r#"{"fencing": {"type": "rps10", "config": "n1"}}"#).unwrap();
    let result = FencingCoordinator::from_config(&registry(Arc::new(OutletLog::default())), config.fencing.as_ref());
    assert!(matches!(result, Err(Error::FencingSetup(FenceError::BadConfig(_)))));
}

#[test]
fn test_missing_device_leaves_fencing_unavailable() -> anyhow::Result<()> {
    let config: EngineConfigDto = parse_json_str("{}")?;
    let coordinator = FencingCoordinator::from_config(&FencingRegistry::with_defaults(), config.fencing.as_ref())?;
    assert!(!coordinator.is_available());
    assert!(matches!(coordinator.fence("n1"), Err(Error::Fencing { source: FenceError::NoDevice, .. })));
    Ok(())
}

#[test]
fn test_meatware_from_engine_config() -> anyhow::Result<()> {
    let config: EngineConfigDto = parse_json_str(r#"{"fencing": {"type": "meatware", "config": "n1 n2"}}"#)?;
    let operator = Arc::new(Operator::default());
    let mut registry = FencingRegistry::with_defaults();
    registry.register_meatware(operator.clone());
    let coordinator = FencingCoordinator::from_config(&registry, config.fencing.as_ref())?;

    coordinator.fence("n1")?;
    assert!(matches!(coordinator.fence("n2"), Err(Error::Fencing { source: FenceError::ResetFailed, .. })));
    assert_eq!(*operator.confirmed.lock().unwrap(), vec!["n1"]);
    Ok(())
}
