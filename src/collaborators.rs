//! External collaborator interfaces
//!
//! The engine never talks to a browser, a policy database or a network stack
//! directly. Each of those sits behind a trait here, with small in-memory
//! implementations used by the CLI and by tests.

use crate::catalog::LinkId;
use crate::error::EngineError;
use crate::normalize::domain_of;
use crate::types::{HostInstruction, Rect, TrustLevel};
use std::collections::{HashMap, VecDeque};

/// Per-domain trust policy
pub trait TrustPolicy {
    /// Classify the domain of a normalized URL
    fn trust_level(&self, url: &str) -> Result<TrustLevel, EngineError>;
}

/// Outcome of a trust lookup, including whether it resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustDecision {
    pub level: TrustLevel,
    /// False when the policy lookup failed and `level` is the neutral fallback
    pub resolved: bool,
}

impl TrustDecision {
    pub fn resolve(policy: &dyn TrustPolicy, url: &str) -> Self {
        match policy.trust_level(url) {
            Ok(level) => Self {
                level,
                resolved: true,
            },
            Err(e) => {
                tracing::warn!(%url, error = %e, "trust lookup failed, treating domain as neutral");
                Self {
                    level: TrustLevel::Neutral,
                    resolved: false,
                }
            }
        }
    }

    /// Document fetch: trusted or neutral domains, never on a failed lookup
    pub fn can_prefetch(&self) -> bool {
        self.resolved && matches!(self.level, TrustLevel::Trusted | TrustLevel::Neutral)
    }

    /// Full render requires explicit trust
    pub fn can_prerender(&self) -> bool {
        self.resolved && self.level == TrustLevel::Trusted
    }
}

/// Persistent per-URL learning store
pub trait LearningStore {
    /// Start an asynchronous lookup; the answer arrives via `drain_resolved`
    fn request_historical_score(&mut self, url: &str);

    /// Lookups that completed since the last call, as (url, score 0-100)
    fn drain_resolved(&mut self) -> Vec<(String, f64)>;

    /// Report a completed navigation
    fn record_outcome(&mut self, url: &str, load_time_ms: f64);
}

/// Host environment that carries out speculative primitives
pub trait SpeculationHost {
    fn apply(&mut self, instruction: &HostInstruction) -> Result<(), EngineError>;
}

/// Optional fresh layout reads for candidates near the cursor
pub trait LayoutProbe {
    fn measure(&self, id: LinkId) -> Option<Rect>;
}

/// Optional device telemetry polled by the engine
pub trait TelemetrySource {
    /// Fraction of the memory budget in use, if the host can tell
    fn sample_memory(&mut self) -> Option<f64>;
}

/// Static domain allow/deny lists; unlisted domains are neutral
#[derive(Debug, Clone, Default)]
pub struct StaticTrustPolicy {
    levels: HashMap<String, TrustLevel>,
}

impl StaticTrustPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(mut self, domain: impl Into<String>, level: TrustLevel) -> Self {
        self.levels.insert(domain.into().to_ascii_lowercase(), level);
        self
    }
}

impl TrustPolicy for StaticTrustPolicy {
    fn trust_level(&self, url: &str) -> Result<TrustLevel, EngineError> {
        let domain = domain_of(url).ok_or_else(|| EngineError::TrustError(url.to_string()))?;
        Ok(self.levels.get(domain).copied().unwrap_or_default())
    }
}

/// Learning store that answers from a local table on the next drain
#[derive(Debug, Clone, Default)]
pub struct InMemoryLearningStore {
    scores: HashMap<String, f64>,
    pending: VecDeque<String>,
    outcomes: Vec<(String, f64)>,
}

impl InMemoryLearningStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(mut self, url: impl Into<String>, score: f64) -> Self {
        self.scores.insert(url.into(), score.clamp(0.0, 100.0));
        self
    }

    /// Navigations reported so far
    pub fn outcomes(&self) -> &[(String, f64)] {
        &self.outcomes
    }
}

impl LearningStore for InMemoryLearningStore {
    fn request_historical_score(&mut self, url: &str) {
        self.pending.push_back(url.to_string());
    }

    fn drain_resolved(&mut self) -> Vec<(String, f64)> {
        let scores = &self.scores;
        self.pending
            .drain(..)
            .filter_map(|url| scores.get(&url).map(|score| (url, *score)))
            .collect()
    }

    fn record_outcome(&mut self, url: &str, load_time_ms: f64) {
        self.outcomes.push((url.to_string(), load_time_ms));
    }
}

/// Host that accepts and discards every instruction
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

impl SpeculationHost for NoopHost {
    fn apply(&mut self, _instruction: &HostInstruction) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Host that buffers instructions for a transport to pick up
#[derive(Debug, Default)]
pub struct BufferedHost {
    instructions: Vec<HostInstruction>,
}

impl BufferedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every instruction buffered since the last drain
    pub fn drain(&mut self) -> Vec<HostInstruction> {
        std::mem::take(&mut self.instructions)
    }
}

impl SpeculationHost for BufferedHost {
    fn apply(&mut self, instruction: &HostInstruction) -> Result<(), EngineError> {
        self.instructions.push(instruction.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingPolicy;

    impl TrustPolicy for FailingPolicy {
        fn trust_level(&self, url: &str) -> Result<TrustLevel, EngineError> {
            Err(EngineError::TrustError(url.to_string()))
        }
    }

    #[test]
    fn test_trust_gating() {
        let policy = StaticTrustPolicy::new()
            .with_domain("good.com", TrustLevel::Trusted)
            .with_domain("bad.com", TrustLevel::Untrusted);

        let trusted = TrustDecision::resolve(&policy, "https://good.com/a");
        assert!(trusted.can_prefetch() && trusted.can_prerender());

        let neutral = TrustDecision::resolve(&policy, "https://other.com/a");
        assert!(neutral.can_prefetch());
        assert!(!neutral.can_prerender());

        let untrusted = TrustDecision::resolve(&policy, "https://bad.com/a");
        assert!(!untrusted.can_prefetch() && !untrusted.can_prerender());
    }

    #[test]
    fn test_failed_lookup_fails_closed() {
        let decision = TrustDecision::resolve(&FailingPolicy, "https://a.com/");
        assert_eq!(decision.level, TrustLevel::Neutral);
        assert!(!decision.can_prefetch());
        assert!(!decision.can_prerender());
    }

    #[test]
    fn test_learning_store_resolves_on_drain() {
        let mut store = InMemoryLearningStore::new().with_score("https://a.com/x", 90.0);
        store.request_historical_score("https://a.com/x");
        store.request_historical_score("https://a.com/unknown");
        assert_eq!(store.drain_resolved(), vec![("https://a.com/x".to_string(), 90.0)]);
        assert!(store.drain_resolved().is_empty());
    }
}
