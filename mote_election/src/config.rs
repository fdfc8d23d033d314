//! Static per-protocol configuration.
//!
//! Every knob is fixed at node start; there is no runtime reconfiguration,
//! no CLI and no environment lookup. The defaults are the values tuned for
//! lossy single-hop radio in the original deployments. With the `serde`
//! feature the structs (de)serialize, for hosts that load a fleet layout
//! from a file.

use std::time::Duration;

use crate::prasle::Topology;

/// Timing and sizing for the bully protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BullyConfig {
    /// How long an initiator waits for `ANSWER` responses.
    pub election_timeout: Duration,
    /// Failure detector horizon: how long without coordinator liveness
    /// before a new election. Must be at least `2 * alive_interval` plus
    /// network slack, or healthy leaders get deposed.
    pub coordinator_timeout: Duration,
    /// Heartbeat cadence of the coordinator.
    pub alive_interval: Duration,
    /// Upper bound of the random startup delay.
    pub random_delay_max: Duration,
    /// Width of the per-sender duplicate filter (node ids `1..=max_nodes`).
    pub max_nodes: u16,
}

impl Default for BullyConfig {
    fn default() -> Self {
        Self {
            election_timeout: Duration::from_secs(5),
            coordinator_timeout: Duration::from_secs(20),
            alive_interval: Duration::from_secs(8),
            random_delay_max: Duration::from_secs(5),
            max_nodes: 10,
        }
    }
}

impl BullyConfig {
    /// Whether the failure detector can tolerate one lost heartbeat.
    pub fn detector_is_sound(&self) -> bool {
        self.coordinator_timeout >= 2 * self.alive_interval
    }
}

/// Timing and topology for the ring protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RingConfig {
    /// Number of nodes on the logical ring `1 -> 2 -> ... -> ring_size -> 1`.
    pub ring_size: u16,
    /// How long to wait for a circulating token before re-initiating.
    pub election_timeout: Duration,
    /// How long a leaderless node waits before starting an election.
    pub coordinator_timeout: Duration,
    /// Heartbeat token cadence of the leader.
    pub alive_interval: Duration,
    /// Upper bound of the random startup delay.
    pub random_delay_max: Duration,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            ring_size: 6,
            election_timeout: Duration::from_secs(8),
            coordinator_timeout: Duration::from_secs(15),
            alive_interval: Duration::from_secs(10),
            random_delay_max: Duration::from_secs(3),
        }
    }
}

/// Parameters of the self-stabilizing round protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrasleConfig {
    /// Convergence horizon; must be at least the network diameter.
    pub k_rounds: u16,
    /// Length of one receive window. Must exceed the worst one-hop latency.
    pub round_length: Duration,
    /// Upper bound on node count; `n_max + 1` is the sentinel ranking value
    /// every node starts from.
    pub n_max: u16,
    /// Static topology the neighbor table is derived from.
    pub topology: Topology,
    /// Number of nodes in the network (ids `1..=network_size`).
    pub network_size: u16,
}

impl Default for PrasleConfig {
    fn default() -> Self {
        Self {
            k_rounds: 10,
            round_length: Duration::from_secs(1),
            n_max: 20,
            topology: Topology::Ring,
            network_size: 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bully_detector_tolerates_a_lost_heartbeat() {
        let config = BullyConfig::default();
        assert!(config.detector_is_sound());

        let broken = BullyConfig {
            coordinator_timeout: Duration::from_secs(10),
            ..config
        };
        assert!(!broken.detector_is_sound());
    }

    #[test]
    fn defaults_match_the_tuned_deployment_values() {
        assert_eq!(Duration::from_secs(8), BullyConfig::default().alive_interval);
        assert_eq!(6, RingConfig::default().ring_size);
        assert_eq!(10, PrasleConfig::default().k_rounds);
    }
}
