//! The configuration surface (§6: "Tunables"). Loading configuration from a
//! file or environment is explicitly out of scope (§1) — this is just the
//! plain-data struct a host process populates and hands to the
//! orchestrator.

/// All tunables for an [`crate::Orchestrator`] instance, with defaults
/// matching the parenthesized values in §6.
#[derive(Debug, Clone)]
pub struct OxenConfig {
    pub transport: oxen_transport::reliability::Config,
    pub classify: oxen_reach::classify::Config,
    pub gossip: oxen_reach::gossip::Config,
    /// How long a neighbor can go without any outbound traffic before a
    /// standalone keepalive parcel is sent (§4.3).
    pub keepalive_idle_ms: i64,
    /// How long an unanswered `ka` may wait before its `kk` is piggybacked
    /// on a standalone parcel rather than real traffic (§4.3).
    pub keepalive_echo_delay_ms: i64,
    /// Cadence of the retransmit sweep (§4.3: "coarse cadence (default ~1
    /// s)").
    pub retransmit_sweep_period_ms: i64,
    /// §4.2: accept unknown top-level envelope keys instead of rejecting
    /// the parcel. Off by default — strict decoding.
    pub lenient_envelope: bool,
}

impl Default for OxenConfig {
    fn default() -> Self {
        OxenConfig {
            transport: oxen_transport::reliability::Config::default(),
            classify: oxen_reach::classify::Config::default(),
            gossip: oxen_reach::gossip::Config::default(),
            keepalive_idle_ms: 10_000,
            keepalive_echo_delay_ms: 1_000,
            retransmit_sweep_period_ms: 1_000,
            lenient_envelope: false,
        }
    }
}
