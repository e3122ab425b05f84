pub mod coordinator;
pub mod device;
pub mod meatware;
pub mod null_device;
pub mod power_switch;
pub mod registry;

pub use coordinator::FencingCoordinator;
pub use device::{FenceResult, FencingDevice};
pub use meatware::{MeatwareDevice, OperatorConfirmation};
pub use null_device::NullDevice;
pub use power_switch::{PowerSwitchConsole, PowerSwitchDevice};
pub use registry::FencingRegistry;
