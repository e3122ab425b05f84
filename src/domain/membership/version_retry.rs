use serde::Deserialize;

use crate::domain::clock::{SharedTickSource, Tick, timeout_expired};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Seconds to wait for an answer before a proposal is resent.
    pub timeout_secs: u32,
    /// Resends allowed before the peer is given up on.
    pub max_tries: u32,
}

impl RetryPolicy {
    pub const TIMEOUT: u32 = 3;
    pub const MAXTRIES: u32 = 3;
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { timeout_secs: Self::TIMEOUT, max_tries: Self::MAXTRIES }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Timer running, below the retry limit.
    Waiting,
    /// A resend was just requested and the timer restarted.
    RetrySent,
    /// Retry limit exhausted; the peer is treated as absent.
    GaveUp,
    /// Membership was confirmed externally; no further retries.
    Confirmed,
}

/// Per-peer retry tracker for version proposals.
#[derive(Debug, Clone)]
pub struct VersionRetry {
    clock: SharedTickSource,
    policy: RetryPolicy,
    timer: Tick,
    tries: u32,
    state: RetryState,
}

impl VersionRetry {
    pub fn new(clock: SharedTickSource, policy: RetryPolicy) -> Self {
        let timer = clock.now();
        VersionRetry { clock, policy, timer, tries: 0, state: RetryState::Waiting }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn is_active(&self) -> bool {
        self.state != RetryState::GaveUp
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, RetryState::Waiting | RetryState::RetrySent)
    }

    fn timeout_ticks(&self) -> u32 {
        self.clock.seconds_to_ticks(self.policy.timeout_secs)
    }

    pub fn reset(&mut self) {
        self.timer = self.clock.now();
        self.tries = 0;
        self.state = RetryState::Waiting;
    }

    /// Returns true when the caller must resend its version proposal now.
    ///
    /// Before the timeout this returns false and the tracker keeps waiting.
    pub fn retry(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }

        let now = self.clock.now();
        if !timeout_expired(self.timer, now, self.timeout_ticks()) {
            self.state = RetryState::Waiting;
            return false;
        }

        if self.tries >= self.policy.max_tries {
            log::debug!("Giving up after {} tries", self.tries);
            self.state = RetryState::GaveUp;
            return false;
        }

        self.tries += 1;
        self.timer = now;
        self.state = RetryState::RetrySent;
        log::trace!("{} tries left", self.policy.max_tries - self.tries);
        true
    }

    /// Cluster chatter was observed: the peer is slow, not silent. Clears the try counter but keeps the timer.
    pub fn note_activity(&mut self) {
        if self.is_pending() {
            self.tries = 0;
        }
    }

    pub fn confirm(&mut self) {
        self.state = RetryState::Confirmed;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::clock::MockClock;

    fn tracker(clock: &MockClock) -> VersionRetry {
        VersionRetry::new(Arc::new(clock.clone()), RetryPolicy::default())
    }

    /// Advances the clock one tick before each `retry` call.
    fn drive(retry: &mut VersionRetry, clock: &MockClock, calls: usize) -> Vec<bool> {
        (0..calls)
            .map(|_| {
                clock.advance(1);
                retry.retry()
            })
            .collect()
    }

    #[test]
    fn test_waits_until_timeout() {
        let clock = MockClock::new(0);
        let mut retry = tracker(&clock);

        assert_eq!(drive(&mut retry, &clock, 2), vec![false, false]);
        assert_eq!(retry.state(), RetryState::Waiting);
        assert_eq!(drive(&mut retry, &clock, 1), vec![true]);
        assert_eq!(retry.state(), RetryState::RetrySent);
        assert_eq!(retry.tries(), 1);
    }

    #[test]
    fn test_gives_up_on_fourth_crossing() {
        let clock = MockClock::new(0);
        let mut retry = tracker(&clock);

        let results = drive(&mut retry, &clock, 12);
        let crossings: Vec<(usize, bool)> = results.iter().enumerate().filter(|(i, _)| (i + 1) % 3 == 0).map(|(i, r)| (i, *r)).collect();

        assert_eq!(crossings.iter().map(|(_, r)| *r).collect::<Vec<_>>(), vec![true, true, true, false]);
        assert_eq!(retry.state(), RetryState::GaveUp);
        assert!(!retry.is_active());

        // terminal until reset
        assert_eq!(drive(&mut retry, &clock, 6), vec![false; 6]);
        retry.reset();
        assert_eq!(retry.state(), RetryState::Waiting);
    }

    #[test]
    fn test_activity_postpones_giving_up() {
        let clock = MockClock::new(0);
        let mut retry = tracker(&clock);

        assert_eq!(drive(&mut retry, &clock, 9), vec![false, false, true, false, false, true, false, false, true]);
        retry.note_activity();
        assert_eq!(retry.tries(), 0);

        // three more resends are granted after the activity
        assert_eq!(drive(&mut retry, &clock, 9), vec![false, false, true, false, false, true, false, false, true]);
        assert_eq!(drive(&mut retry, &clock, 3), vec![false, false, false]);
        assert_eq!(retry.state(), RetryState::GaveUp);
    }

    #[test]
    fn test_activity_does_not_restart_timer() {
        let clock = MockClock::new(0);
        let mut retry = tracker(&clock);

        clock.advance(2);
        retry.note_activity();
        clock.advance(1);
        assert!(retry.retry());
    }

    #[test]
    fn test_confirm_short_circuits() {
        let clock = MockClock::new(0);
        let mut retry = tracker(&clock);
        retry.confirm();
        assert_eq!(drive(&mut retry, &clock, 20), vec![false; 20]);
        assert!(retry.is_active());
        assert_eq!(retry.state(), RetryState::Confirmed);
    }

    #[test]
    fn test_timeout_uses_clock_resolution() {
        let clock = MockClock::with_resolution(0, 100);
        let mut retry = tracker(&clock);
        clock.advance(299);
        assert!(!retry.retry());
        clock.advance(1);
        assert!(retry.retry());
    }
}
