// Event signaling.
//
// Three edge-triggered, single-slot wakeups feed the main loop:
// append-received, vote-granted, became-leader. A fourth delivers the
// terminal shutdown signal. `tokio::sync::Notify` already has exactly the
// semantics the design calls for ("drop-then-set": a signal sent before
// anyone is waiting is not lost, but repeated signals before the waiter
// wakes coalesce into one wakeup rather than queueing).

use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
pub struct Events {
    pub append_received: Notify,
    pub vote_granted: Notify,
    pub became_leader: Notify,
    pub shutdown: Notify,
}

impl Events {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn signal_append_received(&self) {
        self.append_received.notify_one();
    }

    pub fn signal_vote_granted(&self) {
        self.vote_granted.notify_one();
    }

    pub fn signal_became_leader(&self) {
        self.became_leader.notify_one();
    }

    pub fn signal_shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_before_wait_is_not_lost() {
        let events = Events::new();
        events.signal_append_received();

        tokio::time::timeout(Duration::from_millis(50), events.append_received.notified())
            .await
            .expect("a signal sent before waiting must still wake the waiter");
    }

    #[tokio::test]
    async fn repeated_signals_coalesce_into_one_wakeup() {
        let events = Events::new();
        events.signal_vote_granted();
        events.signal_vote_granted();

        events.vote_granted.notified().await;
        // The second notification must not still be pending as a second,
        // separate wakeup once the first has been consumed.
        let result =
            tokio::time::timeout(Duration::from_millis(20), events.vote_granted.notified()).await;
        assert!(result.is_err(), "events are advisory wakeups, not a queue");
    }
}
