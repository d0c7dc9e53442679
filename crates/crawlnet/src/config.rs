//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// WaitBudget
// ---------------------------------------------------------------------------

/// A bounded busy-poll: `iterations` rounds with `interval` sleeps between
/// them.
///
/// `create` and `join` block on up to three of these (connectivity,
/// discovery, join accept). The default of 500 × 10 ms gives each about five
/// seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitBudget {
    pub iterations: u32,
    pub interval: Duration,
}

impl Default for WaitBudget {
    fn default() -> Self {
        Self {
            iterations: 500,
            interval: Duration::from_millis(10),
        }
    }
}

impl WaitBudget {
    /// Total wall-clock time the budget allows, ignoring poll work.
    pub fn total(&self) -> Duration {
        self.interval * self.iterations
    }
}

// ---------------------------------------------------------------------------
// NetConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`ProtocolEngine`](crate::ProtocolEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Budget for each bounded wait in `create`/`join`.
    pub wait: WaitBudget,

    /// Soft cap on packets held for one peer while its handshake is
    /// pending. Exceeding it logs a warning; packets are still queued so
    /// per-peer ordering is never broken.
    pub max_pending_per_peer: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            wait: WaitBudget::default(),
            max_pending_per_peer: 256,
        }
    }
}

impl NetConfig {
    /// Parses a config from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::validated)
    }

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by the engine constructors. Rules:
    /// - `wait.iterations` is at least 1, so every wait polls once.
    /// - `max_pending_per_peer` is at least 1.
    pub fn validated(mut self) -> Self {
        if self.wait.iterations == 0 {
            warn!("wait.iterations is 0, using 1");
            self.wait.iterations = 1;
        }
        if self.max_pending_per_peer == 0 {
            warn!("max_pending_per_peer is 0, using 1");
            self.max_pending_per_peer = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget_is_about_five_seconds() {
        assert_eq!(WaitBudget::default().total(), Duration::from_secs(5));
    }

    #[test]
    fn test_validated_clamps_zero_iterations() {
        let config = NetConfig {
            wait: WaitBudget {
                iterations: 0,
                interval: Duration::ZERO,
            },
            max_pending_per_peer: 0,
        }
        .validated();
        assert_eq!(config.wait.iterations, 1);
        assert_eq!(config.max_pending_per_peer, 1);
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = NetConfig::from_json(r#"{"max_pending_per_peer": 8}"#).unwrap();
        assert_eq!(config.max_pending_per_peer, 8);
        assert_eq!(config.wait, WaitBudget::default());
    }

    #[test]
    fn test_from_json_reads_wait_budget() {
        let json = r#"{"wait": {"iterations": 3, "interval": {"secs": 0, "nanos": 1000000}}}"#;
        let config = NetConfig::from_json(json).unwrap();
        assert_eq!(config.wait.iterations, 3);
        assert_eq!(config.wait.interval, Duration::from_millis(1));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(NetConfig::from_json("not json").is_err());
    }
}
