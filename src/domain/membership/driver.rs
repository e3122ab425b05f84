use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::membership::negotiation::{MembershipProposal, MembershipVerdict, Negotiator};

/// Input the transport layer feeds into the driver.
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    /// A peer's proposal arrived.
    Proposal(MembershipProposal),
    /// Membership was confirmed out of band; stop retrying.
    Confirmed,
    /// Start a fresh round with the given peer slots.
    NewRound(Vec<usize>),
}

/// Proposal the transport layer must deliver. `to == None` means broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundProposal {
    pub to: Option<usize>,
    pub proposal: MembershipProposal,
}

/// Long-lived task that advances the negotiator on timer ticks and publishes the verdict.
pub struct MembershipDriver {
    negotiator: Negotiator,
    tick_interval: Duration,
}

impl MembershipDriver {
    pub fn new(negotiator: Negotiator, tick_interval: Duration) -> Self {
        Self { negotiator, tick_interval }
    }

    /// Spawns the driver. Returns the verdict receiver the scheduler reads once per pass.
    pub fn spawn(
        mut self,
        mut events: mpsc::Receiver<MembershipEvent>,
        outbound: mpsc::Sender<OutboundProposal>,
        mut shutdown: watch::Receiver<bool>,
    ) -> (watch::Receiver<MembershipVerdict>, JoinHandle<()>) {
        let (verdict_tx, verdict_rx) = watch::channel(self.negotiator.verdict());

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick_interval);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Membership driver shutting down");
                        break;
                    }
                    event = events.recv() => {
                        let Some(event) = event else {
                            info!("Membership event channel closed");
                            break;
                        };
                        if self.handle_event(event, &outbound).await.is_err() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if self.tick(&outbound).await.is_err() {
                            break;
                        }
                    }
                }
                verdict_tx.send_if_modified(|current| {
                    let next = self.negotiator.verdict();
                    if *current != next {
                        *current = next;
                        true
                    } else {
                        false
                    }
                });
            }
        });

        (verdict_rx, handle)
    }

    async fn handle_event(&mut self, event: MembershipEvent, outbound: &mpsc::Sender<OutboundProposal>) -> Result<(), ()> {
        match event {
            MembershipEvent::Proposal(proposal) => {
                if let Err(e) = self.negotiator.on_proposal(&proposal) {
                    warn!(from = proposal.from, "ignoring malformed membership proposal: {e}");
                }
            }
            MembershipEvent::Confirmed => self.negotiator.confirm_all(),
            MembershipEvent::NewRound(peers) => match self.negotiator.start_round(peers) {
                Ok(proposal) => {
                    outbound.send(OutboundProposal { to: None, proposal }).await.map_err(|_| warn!("outbound proposal channel closed"))?;
                }
                Err(e) => warn!("cannot start membership round: {e}"),
            },
        }
        Ok(())
    }

    async fn tick(&mut self, outbound: &mpsc::Sender<OutboundProposal>) -> Result<(), ()> {
        let resend = self.negotiator.on_tick();
        if resend.is_empty() {
            return Ok(());
        }
        let proposal = self.negotiator.proposal();
        for slot in resend {
            outbound
                .send(OutboundProposal { to: Some(slot), proposal: proposal.clone() })
                .await
                .map_err(|_| warn!("outbound proposal channel closed"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::clock::MockClock;
    use crate::domain::membership::bitmap::MemberBitmap;
    use crate::domain::membership::version_retry::RetryPolicy;

    #[tokio::test]
    async fn test_driver_publishes_verdict_and_resends() {
        let clock = MockClock::new(0);
        let negotiator = Negotiator::new(0, 8, Arc::new(clock.clone()), RetryPolicy::default()).unwrap();
        let driver = MembershipDriver::new(negotiator, Duration::from_millis(5));

        let (events_tx, events_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (mut verdict_rx, handle) = driver.spawn(events_rx, out_tx, shutdown_rx);

        events_tx.send(MembershipEvent::NewRound(vec![1, 2])).await.unwrap();
        let broadcast = out_rx.recv().await.unwrap();
        assert_eq!(broadcast.to, None);
        assert_eq!(broadcast.proposal.version, 1);

        let answer = MembershipProposal { from: 1, version: 1, members: MemberBitmap::from_slots(8, [0, 1, 2]).unwrap().encode() };
        events_tx.send(MembershipEvent::Proposal(answer)).await.unwrap();

        clock.advance(3);
        loop {
            let resend = out_rx.recv().await.unwrap();
            assert!(resend.to.is_some());
            if resend.to == Some(2) {
                break;
            }
        }

        verdict_rx.changed().await.unwrap();
        assert!(verdict_rx.borrow().contains(1));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
