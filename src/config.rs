//! Engine configuration
//!
//! Every tunable of the tracker, scorer and orchestrator lives here. The
//! defaults are the production values; hosts override them with a JSON file.

use crate::error::EngineError;
use crate::types::Millis;
use serde::{Deserialize, Serialize};

/// Relative weight of each scoring factor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub fitts: f64,
    pub intention: f64,
    pub proximity: f64,
    pub context: f64,
    pub history: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            fitts: 0.30,
            intention: 0.30,
            proximity: 0.15,
            context: 0.10,
            history: 0.15,
        }
    }
}

impl FactorWeights {
    pub fn total(&self) -> f64 {
        self.fitts + self.intention + self.proximity + self.context + self.history
    }
}

/// Scoring cadence and ranking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Base interval between scoring batches
    pub base_interval_ms: Millis,
    pub data_saver_multiplier: f64,
    pub slow_network_multiplier: f64,
    pub unplugged_multiplier: f64,
    /// Batches are skipped while scrolling faster than this (px/s)
    pub max_scroll_speed: f64,
    /// Scroll speed decays to zero when no scroll sample arrives within this window
    pub scroll_decay_ms: Millis,
    /// Only candidates within this distance of the cursor are scored (px)
    pub prefilter_radius: f64,
    pub weights: FactorWeights,
    /// Placeholder history score used until the learning store answers
    pub default_history_score: f64,
    /// Candidates at or below this score leave the score table
    pub drop_threshold: f64,
    /// Number of ranked candidates emitted per batch
    pub top_n: usize,
    /// Hysteresis only applies below this cursor speed (px/s)
    pub grace_max_speed: f64,
    /// Hysteresis only applies above this composite score
    pub grace_min_score: f64,
    pub grace_duration_ms: Millis,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 80.0,
            data_saver_multiplier: 2.0,
            slow_network_multiplier: 1.5,
            unplugged_multiplier: 1.25,
            max_scroll_speed: 100.0,
            scroll_decay_ms: 150.0,
            prefilter_radius: 500.0,
            weights: FactorWeights::default(),
            default_history_score: 40.0,
            drop_threshold: 30.0,
            top_n: 5,
            grace_max_speed: 50.0,
            grace_min_score: 50.0,
            grace_duration_ms: 200.0,
        }
    }
}

/// Directive pool parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub capacity: usize,
    pub ttl_ms: Millis,
    /// Lowest score that still earns a dns-prefetch hint
    pub min_hint_score: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            ttl_ms: 60_000.0,
            min_hint_score: 30.0,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum spacing between accepted pointer samples
    pub sample_interval_ms: Millis,
    /// Interval between periodic memory samples
    pub memory_sample_interval_ms: Millis,
    pub scoring: ScoringConfig,
    pub pool: PoolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: crate::tracker::DEFAULT_SAMPLE_INTERVAL_MS,
            memory_sample_interval_ms: crate::governor::MEMORY_SAMPLE_INTERVAL_MS,
            scoring: ScoringConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject configurations that would break scoring invariants
    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = [
            ("sample_interval_ms", self.sample_interval_ms),
            ("memory_sample_interval_ms", self.memory_sample_interval_ms),
            ("scoring.base_interval_ms", self.scoring.base_interval_ms),
            ("scoring.prefilter_radius", self.scoring.prefilter_radius),
            ("pool.ttl_ms", self.pool.ttl_ms),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(EngineError::InvalidConfig(format!("{name} must be positive")));
            }
        }

        if (self.scoring.weights.total() - 1.0).abs() > 1e-6 {
            return Err(EngineError::InvalidConfig(format!(
                "factor weights must sum to 1.0, got {:.4}",
                self.scoring.weights.total()
            )));
        }
        if self.pool.capacity == 0 {
            return Err(EngineError::InvalidConfig("pool.capacity must be at least 1".into()));
        }
        if self.scoring.top_n == 0 {
            return Err(EngineError::InvalidConfig("scoring.top_n must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.scoring.weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = EngineConfig::from_json(r#"{"pool": {"capacity": 4}}"#).unwrap();
        assert_eq!(config.pool.capacity, 4);
        assert_eq!(config.pool.ttl_ms, 60_000.0);
        assert_eq!(config.scoring.base_interval_ms, 80.0);
    }

    #[test]
    fn test_rejects_unbalanced_weights() {
        let json = r#"{"scoring": {"weights": {"fitts": 0.9}}}"#;
        assert!(matches!(
            EngineConfig::from_json(json),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(EngineConfig::from_json(r#"{"pool": {"capacity": 0}}"#).is_err());
    }

    #[test]
    fn test_roundtrip_json() {
        let config = EngineConfig::default();
        let loaded = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, loaded);
    }
}
