use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::domain::clock::clock::{Tick, TickSource};

/// Manually advanced tick source. Clones share the same counter.
#[derive(Debug, Clone)]
pub struct MockClock {
    ticks: Arc<AtomicU32>,
    ticks_per_second: u32,
}

impl MockClock {
    pub fn new(start: u32) -> MockClock {
        MockClock { ticks: Arc::new(AtomicU32::new(start)), ticks_per_second: 1 }
    }

    pub fn with_resolution(start: u32, ticks_per_second: u32) -> MockClock {
        MockClock { ticks: Arc::new(AtomicU32::new(start)), ticks_per_second: ticks_per_second.max(1) }
    }

    pub fn advance(&self, ticks: u32) -> Tick {
        let previous = self.ticks.fetch_add(ticks, Ordering::SeqCst);
        Tick(previous.wrapping_add(ticks))
    }

    pub fn set(&self, ticks: u32) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }
}

impl TickSource for MockClock {
    fn now(&self) -> Tick {
        Tick(self.ticks.load(Ordering::SeqCst))
    }

    fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second
    }
}
