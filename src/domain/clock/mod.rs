pub mod clock;
pub mod mock_clock;

pub use clock::{MonotonicClock, SharedTickSource, Tick, TickSource, timeout_expired};
pub use mock_clock::MockClock;
