use std::time::Duration;

/// Timing and channel-sizing knobs for a peer.
///
/// Defaults match the reference design: election timeout uniform in
/// `[300ms, 400ms)`, heartbeat every 50ms, satisfying
/// `broadcastTime ≪ electionTimeout ≪ MTBF`. Tests override the timeouts to
/// keep the suite fast without changing the algorithm's behavior.
#[derive(Debug, Clone)]
pub struct RaftConfig {
    /// Lower bound (inclusive) of the randomized election timeout.
    pub election_timeout_min: Duration,

    /// Upper bound (exclusive) of the randomized election timeout.
    pub election_timeout_max: Duration,

    /// Fixed interval at which a leader re-triggers its replication driver.
    pub heartbeat_interval: Duration,

    /// Capacity of the apply queue handed to the application.
    pub apply_queue_capacity: usize,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: Duration::from_millis(300),
            election_timeout_max: Duration::from_millis(400),
            heartbeat_interval: Duration::from_millis(50),
            apply_queue_capacity: 256,
        }
    }
}

impl RaftConfig {
    /// A config with much shorter timeouts, for integration tests that need
    /// elections and commits to settle in well under a second of wall time.
    pub fn fast_for_tests() -> Self {
        Self {
            election_timeout_min: Duration::from_millis(40),
            election_timeout_max: Duration::from_millis(60),
            heartbeat_interval: Duration::from_millis(10),
            apply_queue_capacity: 256,
        }
    }

    pub fn random_election_timeout(&self) -> Duration {
        use rand::Rng;
        let min = self.election_timeout_min.as_millis() as u64;
        let max = self.election_timeout_max.as_millis() as u64;
        let millis = if max > min {
            rand::rng().random_range(min..max)
        } else {
            min
        };
        Duration::from_millis(millis)
    }
}
