//! Prefetch orchestrator
//!
//! Translates ranked candidates into speculative directives under the active
//! operating profile, trust policy and data-saver state. Every URL carries at
//! most one active directive. A dns-prefetch or preconnect hint can be
//! promoted to a stronger tier; an active prefetch or prerender is never
//! replaced until it leaves the pool.

pub mod pool;

use crate::collaborators::{SpeculationHost, TrustDecision, TrustPolicy};
use crate::config::PoolConfig;
use crate::governor::OperatingProfile;
use crate::normalize::normalize_url;
use crate::types::{DirectiveType, HostInstruction, Millis, RankedCandidate, SpeculativeDirective};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub use pool::{DirectivePool, PoolMutation};

/// What one dispatch pass changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    pub issued: Vec<SpeculativeDirective>,
    pub revoked: Vec<SpeculativeDirective>,
    /// True when the host rejected an issuance and the batch was abandoned
    pub host_failed: bool,
}

impl DispatchOutcome {
    /// Whether pool or dedup state changed and should be persisted
    pub fn mutated(&self) -> bool {
        !self.issued.is_empty() || !self.revoked.is_empty()
    }
}

/// Persistable orchestrator bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorSnapshot {
    /// Pool contents in insertion order
    pub directives: Vec<SpeculativeDirective>,
    /// Active directive per normalized URL, every tier
    pub dedup_index: BTreeMap<String, SpeculativeDirective>,
}

#[derive(Debug, Clone)]
pub struct PrefetchOrchestrator {
    pool: DirectivePool,
    index: BTreeMap<String, SpeculativeDirective>,
    min_hint_score: f64,
}

impl Default for PrefetchOrchestrator {
    fn default() -> Self {
        Self::new(&PoolConfig::default())
    }
}

impl PrefetchOrchestrator {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            pool: DirectivePool::new(config.capacity, config.ttl_ms),
            index: BTreeMap::new(),
            min_hint_score: config.min_hint_score,
        }
    }

    pub fn pool(&self) -> &DirectivePool {
        &self.pool
    }

    fn ttl_ms(&self) -> Millis {
        self.pool.ttl_ms()
    }

    /// Unexpired directive currently in force for a normalized URL
    fn active(&self, url: &str, now: Millis) -> Option<&SpeculativeDirective> {
        self.index.get(url).filter(|d| d.age(now) <= self.ttl_ms())
    }

    /// Number of unexpired directives tracked across all tiers
    pub fn active_count(&self, now: Millis) -> usize {
        self.index
            .values()
            .filter(|d| d.age(now) <= self.ttl_ms())
            .count()
    }

    /// Profile quota minus active directives of that type
    pub fn remaining_quota(
        &self,
        profile: &OperatingProfile,
        directive_type: DirectiveType,
        now: Millis,
    ) -> usize {
        let quota = match directive_type {
            DirectiveType::Prerender => profile.prerender_quota,
            DirectiveType::Prefetch => profile.prefetch_quota,
            _ => return usize::MAX,
        };
        quota.saturating_sub(self.pool.active_count(directive_type, now))
    }

    /// Whether `url` has an unexpired directive of any tier
    pub fn was_prefetched(&self, url: &str, now: Millis) -> bool {
        self.prefetch_type(url, now).is_some()
    }

    /// Tier of the unexpired directive for `url`, if any
    pub fn prefetch_type(&self, url: &str, now: Millis) -> Option<DirectiveType> {
        let url = normalize_url(url).ok()?;
        self.active(&url, now).map(|d| d.directive_type)
    }

    /// Pick the tier for one candidate, or None when nothing applies
    fn select_tier(
        &self,
        candidate: &RankedCandidate,
        profile: &OperatingProfile,
        trust: &mut dyn FnMut() -> TrustDecision,
        now: Millis,
    ) -> Option<DirectiveType> {
        let score = candidate.score;
        if score >= profile.prefetch_threshold || score >= profile.prerender_threshold {
            let decision = trust();
            if score >= profile.prerender_threshold
                && self.remaining_quota(profile, DirectiveType::Prerender, now) > 0
                && decision.can_prerender()
            {
                return Some(DirectiveType::Prerender);
            }
            if score >= profile.prefetch_threshold
                && self.remaining_quota(profile, DirectiveType::Prefetch, now) > 0
                && decision.can_prefetch()
            {
                return Some(DirectiveType::Prefetch);
            }
        }
        if score >= profile.preconnect_threshold {
            Some(DirectiveType::Preconnect)
        } else if score >= self.min_hint_score {
            Some(DirectiveType::DnsPrefetch)
        } else {
            None
        }
    }

    /// Issue directives for a ranked batch, highest score first.
    ///
    /// Host rejections of an issuance are logged and end the batch without
    /// recording the directive; failed revocations are logged and ignored.
    pub fn dispatch(
        &mut self,
        ranked: &[RankedCandidate],
        profile: &OperatingProfile,
        data_saver: bool,
        trust: &dyn TrustPolicy,
        host: &mut dyn SpeculationHost,
        now: Millis,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let mut ordered: Vec<&RankedCandidate> = ranked.iter().collect();
        ordered.sort_by(|a, b| b.score.total_cmp(&a.score));

        for candidate in ordered {
            let url = candidate.url.as_str();
            let mut resolve_trust = || TrustDecision::resolve(trust, url);
            let Some(tier) = self.select_tier(candidate, profile, &mut resolve_trust, now) else {
                continue;
            };

            if let Some(existing) = self.active(url, now) {
                // Pooled directives are final for their lifetime; hints may be promoted
                if existing.directive_type.is_heavy() || existing.directive_type >= tier {
                    continue;
                }
            }
            if data_saver && tier.is_heavy() {
                debug!(%url, tier = %tier, "data saver vetoed speculative load");
                continue;
            }

            // Mutation: sweep stale entries first
            self.sweep(now, host, &mut outcome);

            let directive = SpeculativeDirective::new(tier, url, now);
            let instruction = HostInstruction::Issue {
                directive: directive.clone(),
                eagerness: tier.eagerness(),
            };
            if let Err(e) = host.apply(&instruction) {
                warn!(%url, tier = %tier, error = %e, "host rejected directive, skipping batch");
                outcome.host_failed = true;
                break;
            }
            debug!(%url, tier = %tier, score = candidate.score, "issued directive");

            if tier.is_heavy() {
                let mutation = self.pool.insert(directive.clone(), now);
                for removed in mutation.into_removed() {
                    self.forget(&removed);
                    revoke(host, &removed);
                    outcome.revoked.push(removed);
                }
            }
            if let Some(weaker) = self.index.insert(url.to_string(), directive.clone()) {
                revoke(host, &weaker);
                outcome.revoked.push(weaker);
            }
            outcome.issued.push(directive);
        }

        outcome
    }

    /// Purge expired directives from the pool and the dedup index, revoking
    /// each at the host
    fn sweep(&mut self, now: Millis, host: &mut dyn SpeculationHost, outcome: &mut DispatchOutcome) {
        let ttl = self.ttl_ms();
        let mut expired = self.pool.purge_expired(now);
        let stale_hints: Vec<String> = self
            .index
            .iter()
            .filter(|(_, d)| !d.directive_type.is_heavy() && d.age(now) > ttl)
            .map(|(url, _)| url.clone())
            .collect();
        for url in stale_hints {
            if let Some(hint) = self.index.remove(&url) {
                expired.push(hint);
            }
        }
        for directive in expired {
            self.forget(&directive);
            revoke(host, &directive);
            outcome.revoked.push(directive);
        }
    }

    /// Drop the index entry for a directive that left the pool
    fn forget(&mut self, directive: &SpeculativeDirective) {
        if self.index.get(&directive.url) == Some(directive) {
            self.index.remove(&directive.url);
        }
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            directives: self.pool.iter().cloned().collect(),
            dedup_index: self.index.clone(),
        }
    }

    /// Restore dedup and TTL bookkeeping from persisted state.
    ///
    /// Nothing is reissued at the host; expired entries are dropped.
    pub fn rehydrate(&mut self, snapshot: OrchestratorSnapshot, now: Millis) {
        let ttl = self.ttl_ms();
        self.pool.restore(snapshot.directives, now);
        self.index = snapshot
            .dedup_index
            .into_iter()
            .filter(|(url, d)| &d.url == url && d.age(now) <= ttl)
            .collect();
        // Heavy entries the pool dropped must not linger in the index
        let pooled: Vec<&SpeculativeDirective> = self.pool.iter().collect();
        let orphans: Vec<String> = self
            .index
            .iter()
            .filter(|(_, d)| d.directive_type.is_heavy() && !pooled.contains(d))
            .map(|(url, _)| url.clone())
            .collect();
        for url in orphans {
            self.index.remove(&url);
        }
        debug!(
            pooled = self.pool.len(),
            indexed = self.index.len(),
            "rehydrated orchestrator state"
        );
    }
}

fn revoke(host: &mut dyn SpeculationHost, directive: &SpeculativeDirective) {
    let instruction = HostInstruction::Revoke {
        directive: directive.clone(),
    };
    if let Err(e) = host.apply(&instruction) {
        warn!(url = %directive.url, tier = %directive.directive_type, error = %e, "host failed to revoke directive");
    }
}
