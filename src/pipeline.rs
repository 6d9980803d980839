//! Prediction engine
//!
//! This module provides the public API for Hoverfetch. [`PredictionEngine`]
//! owns the tracker, catalog, scorer, governor and orchestrator together with
//! the host collaborators, and processes inbound events one at a time.
//!
//! Per accepted pointer sample:
//! 1. Telemetry and learning-store resolutions are polled
//! 2. KinematicsTracker derives the kinematic state and notifies subscribers
//! 3. ScoringEngine runs a throttled batch over the catalog
//! 4. The ranked batch goes to the host, then to the PrefetchOrchestrator
//! 5. State is persisted if the directive pool changed

use crate::catalog::LinkCatalog;
use crate::collaborators::{
    InMemoryLearningStore, LayoutProbe, LearningStore, NoopHost, SpeculationHost,
    StaticTrustPolicy, TelemetrySource, TrustPolicy,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::governor::{GovernorStatus, Mode, ResourceGovernor};
use crate::normalize::normalize_url;
use crate::orchestrator::PrefetchOrchestrator;
use crate::persistence::{
    load_or_default, save_or_warn, Counters, MemoryStore, PersistedState, StateStore,
};
use crate::schema::{EventAdapter, InboundEvent};
use crate::scoring::ScoringEngine;
use crate::tracker::{KinematicsTracker, SubscriptionId};
use crate::types::{HostInstruction, KinematicState, Millis};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

/// Replay an NDJSON event stream through a fresh engine with default
/// configuration.
///
/// # Returns
/// NDJSON of every host instruction the engine produced, in order
///
/// # Example
/// ```
/// let events = r#"{"type":"link_upsert","id":1,"href":"https://example.com/a","rect":{"x":90,"y":90,"width":40,"height":20},"region":"main"}
/// {"type":"pointer_move","x":0,"y":100,"timestamp":0}
/// {"type":"pointer_move","x":50,"y":100,"timestamp":100}"#;
/// let output = hoverfetch::replay_events(events).unwrap();
/// assert!(output.contains("\"kind\":\"issue\""));
/// ```
pub fn replay_events(ndjson: &str) -> Result<String, EngineError> {
    replay_events_with_config(ndjson, EngineConfig::default())
}

/// Replay an NDJSON event stream with an explicit configuration
pub fn replay_events_with_config(ndjson: &str, config: EngineConfig) -> Result<String, EngineError> {
    let events = EventAdapter::parse_ndjson(ndjson)?;
    let mut engine = PredictionEngine::new(config)?;

    let mut lines = Vec::new();
    for event in &events {
        for instruction in engine.handle_event(event)? {
            lines.push(serde_json::to_string(&instruction)?);
        }
    }
    Ok(lines.join("\n"))
}

/// Host adapter that records every instruction the host accepted
struct RecordingHost<'a> {
    inner: &'a mut dyn SpeculationHost,
    applied: &'a mut Vec<HostInstruction>,
}

impl SpeculationHost for RecordingHost<'_> {
    fn apply(&mut self, instruction: &HostInstruction) -> Result<(), EngineError> {
        self.inner.apply(instruction)?;
        self.applied.push(instruction.clone());
        Ok(())
    }
}

/// Diagnostic snapshot of the whole engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub version: String,
    pub clock_ms: Millis,
    pub governor: GovernorStatus,
    pub links: usize,
    pub scored_urls: usize,
    pub active_directives: usize,
    pub pooled_directives: usize,
    pub grace_timers: usize,
    pub kinematics: Option<KinematicState>,
    pub counters: Counters,
}

/// Stateful prediction engine.
///
/// Collaborators default to in-memory implementations: a neutral trust
/// policy, a learning store with no history, a host that accepts everything
/// and a memory-only state store.
pub struct PredictionEngine {
    config: EngineConfig,
    tracker: KinematicsTracker,
    catalog: LinkCatalog,
    scorer: ScoringEngine,
    governor: ResourceGovernor,
    orchestrator: PrefetchOrchestrator,
    trust: Box<dyn TrustPolicy>,
    learning: Box<dyn LearningStore>,
    host: Box<dyn SpeculationHost>,
    store: Box<dyn StateStore>,
    probe: Option<Box<dyn LayoutProbe>>,
    telemetry: Option<Box<dyn TelemetrySource>>,
    counters: Counters,
    /// Loaded state waiting for the first host timestamp
    pending_restore: Option<PersistedState>,
    clock: Millis,
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}

impl PredictionEngine {
    /// Create an engine after validating the configuration
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        Self {
            tracker: KinematicsTracker::new(config.sample_interval_ms),
            catalog: LinkCatalog::new(),
            scorer: ScoringEngine::new(config.scoring.clone()),
            governor: ResourceGovernor::new(Mode::Auto)
                .with_memory_interval(config.memory_sample_interval_ms),
            orchestrator: PrefetchOrchestrator::new(&config.pool),
            trust: Box::new(StaticTrustPolicy::new()),
            learning: Box::new(InMemoryLearningStore::new()),
            host: Box::new(NoopHost),
            store: Box::new(MemoryStore::new()),
            probe: None,
            telemetry: None,
            counters: Counters::default(),
            pending_restore: None,
            clock: 0.0,
            config,
        }
    }

    pub fn with_trust_policy(mut self, trust: impl TrustPolicy + 'static) -> Self {
        self.trust = Box::new(trust);
        self
    }

    pub fn with_learning_store(mut self, learning: impl LearningStore + 'static) -> Self {
        self.learning = Box::new(learning);
        self
    }

    pub fn with_host(mut self, host: impl SpeculationHost + 'static) -> Self {
        self.host = Box::new(host);
        self
    }

    pub fn with_layout_probe(mut self, probe: impl LayoutProbe + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn with_telemetry(mut self, telemetry: impl TelemetrySource + 'static) -> Self {
        self.telemetry = Some(Box::new(telemetry));
        self
    }

    /// Attach a state store and load what it holds.
    ///
    /// The saved mode and counters apply immediately. Directive bookkeeping is
    /// rehydrated at the first timestamped event so that expiry is judged
    /// against the host clock; nothing is reissued.
    pub fn with_state_store(mut self, store: impl StateStore + 'static) -> Self {
        let state = load_or_default(&store);
        self.governor.apply_mode(state.mode);
        self.counters = state.counters.clone();
        self.pending_restore = Some(state);
        self.store = Box::new(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &LinkCatalog {
        &self.catalog
    }

    pub fn scorer(&self) -> &ScoringEngine {
        &self.scorer
    }

    pub fn governor(&self) -> &ResourceGovernor {
        &self.governor
    }

    pub fn orchestrator(&self) -> &PrefetchOrchestrator {
        &self.orchestrator
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Register a callback for every accepted kinematic sample
    pub fn subscribe(&mut self, callback: impl FnMut(&KinematicState) + 'static) -> SubscriptionId {
        self.tracker.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.tracker.unsubscribe(id)
    }

    fn advance(&mut self, now: Millis) {
        if now > self.clock {
            self.clock = now;
        }
        if let Some(state) = self.pending_restore.take() {
            self.orchestrator.rehydrate(state.orchestrator_snapshot(), now);
        }
    }

    /// Parse, validate and handle one JSON event
    pub fn handle_json(&mut self, json: &str) -> Result<Vec<HostInstruction>, EngineError> {
        let event = EventAdapter::parse_event(json)?;
        self.handle_event(&event)
    }

    /// Handle one inbound event.
    ///
    /// # Returns
    /// The host instructions the host accepted while handling the event
    pub fn handle_event(&mut self, event: &InboundEvent) -> Result<Vec<HostInstruction>, EngineError> {
        event
            .validate()
            .map_err(|e| EngineError::InvalidEvent(format!("{}: {}", event.event_type(), e)))?;
        if let Some(timestamp) = event.timestamp() {
            self.advance(timestamp);
        }

        let mut applied = Vec::new();
        match event {
            InboundEvent::PointerMove { x, y, timestamp } => {
                self.pointer_batch(*x, *y, *timestamp, &mut applied)
            }
            InboundEvent::Scroll {
                offset_y,
                timestamp,
            } => self.scorer.on_scroll(*offset_y, *timestamp),
            InboundEvent::Viewport { width, height } => {
                self.scorer.resize_viewport(*width, *height)
            }
            InboundEvent::LinkUpsert(_)
            | InboundEvent::LinkRemove { .. }
            | InboundEvent::LinkSnapshot { .. }
            | InboundEvent::Intersection { .. } => {
                if let Some(catalog_event) = event.as_catalog_event() {
                    self.catalog.apply(catalog_event);
                }
            }
            InboundEvent::Battery { charging, level } => {
                self.governor.on_battery(*charging, *level);
            }
            InboundEvent::Network {
                effective_type,
                downlink_mbps,
                save_data,
            } => {
                self.governor
                    .on_network(*effective_type, *downlink_mbps, *save_data);
            }
            InboundEvent::Memory {
                used_fraction,
                timestamp,
            } => {
                self.governor.on_memory_sample(*used_fraction, *timestamp);
            }
            InboundEvent::HistoryResolved { url, score } => self.resolve_history(url, *score),
            InboundEvent::SetMode { mode } => {
                self.set_mode(mode);
            }
            InboundEvent::Navigation {
                url,
                load_time_ms,
                timestamp,
            } => self.on_navigation(url, *load_time_ms, *timestamp),
            InboundEvent::Tick { timestamp } => self.tick(*timestamp),
        }
        Ok(applied)
    }

    /// Feed one pointer sample and run a scoring batch if one is due
    pub fn on_pointer_move(&mut self, x: f64, y: f64, timestamp: Millis) -> Vec<HostInstruction> {
        self.advance(timestamp);
        let mut applied = Vec::new();
        self.pointer_batch(x, y, timestamp, &mut applied);
        applied
    }

    fn pointer_batch(&mut self, x: f64, y: f64, now: Millis, applied: &mut Vec<HostInstruction>) {
        self.poll_collaborators(now);

        let Some(state) = self.tracker.on_pointer_move(x, y, now) else {
            return;
        };

        let batch = match self.scorer.calculate_scores(
            &state,
            &mut self.catalog,
            self.governor.context(),
            self.probe.as_deref(),
            now,
        ) {
            Ok(batch) => batch,
            Err(reason) => {
                trace!(?reason, "scoring batch skipped");
                return;
            }
        };

        for url in &batch.history_requests {
            self.learning.request_historical_score(url);
        }
        if batch.ranked.is_empty() {
            return;
        }

        let mut host = RecordingHost {
            inner: self.host.as_mut(),
            applied,
        };
        let ranked = HostInstruction::Ranked {
            candidates: batch.ranked.clone(),
        };
        if let Err(e) = host.apply(&ranked) {
            warn!(error = %e, "host rejected ranked candidates");
        }

        let outcome = self.orchestrator.dispatch(
            &batch.ranked,
            self.governor.profile(),
            self.governor.data_saver(),
            self.trust.as_ref(),
            &mut host,
            now,
        );
        self.counters.directives_issued += outcome.issued.len() as u64;
        if outcome.mutated() {
            self.persist();
        }
    }

    /// Advance the clock without pointer input
    pub fn tick(&mut self, now: Millis) {
        self.advance(now);
        self.poll_collaborators(now);
    }

    /// Periodic memory sampling and learning-store resolutions
    fn poll_collaborators(&mut self, now: Millis) {
        if self.governor.memory_sample_due(now) {
            match self.telemetry.as_mut().and_then(|t| t.sample_memory()) {
                Some(fraction) => {
                    self.governor.on_memory_sample(fraction, now);
                }
                None => self.governor.mark_memory_sampled(now),
            }
        }
        for (url, score) in self.learning.drain_resolved() {
            self.scorer.resolve_history(&url, score);
        }
    }

    /// Deliver a learning-store answer pushed by the host
    pub fn resolve_history(&mut self, url: &str, score: f64) {
        match normalize_url(url) {
            Ok(url) => self.scorer.resolve_history(&url, score),
            Err(e) => debug!(%url, error = %e, "ignoring history score for unparseable url"),
        }
    }

    /// Select a mode by name; accepted modes are persisted
    pub fn set_mode(&mut self, mode: &str) -> bool {
        if !self.governor.set_mode(mode) {
            return false;
        }
        self.persist();
        true
    }

    /// Attribute a completed navigation to any live directive for its URL
    /// and report the outcome to the learning store
    pub fn on_navigation(&mut self, url: &str, load_time_ms: f64, now: Millis) {
        self.advance(now);
        let url = match normalize_url(url) {
            Ok(url) => url,
            Err(e) => {
                debug!(%url, error = %e, "ignoring navigation to unparseable url");
                return;
            }
        };

        if let Some(tier) = self.orchestrator.prefetch_type(&url, now) {
            self.counters.record_hit(tier, load_time_ms);
            info!(%url, tier = %tier, load_time_ms, "navigation followed a speculative directive");
            self.persist();
        }
        self.learning.record_outcome(&url, load_time_ms);
        self.catalog.set_base_url(url);
        self.tracker.reset();
    }

    fn persist(&mut self) {
        let snapshot = match &self.pending_restore {
            Some(pending) => pending.orchestrator_snapshot(),
            None => self.orchestrator.snapshot(),
        };
        let state = PersistedState {
            directives: snapshot.directives,
            dedup_index: snapshot.dedup_index,
            mode: self.governor.mode(),
            counters: self.counters.clone(),
            saved_at: Utc::now(),
        };
        save_or_warn(self.store.as_mut(), &state);
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            version: crate::HOVERFETCH_VERSION.to_string(),
            clock_ms: self.clock,
            governor: self.governor.status(),
            links: self.catalog.len(),
            scored_urls: self.scorer.score_count(),
            active_directives: self.orchestrator.active_count(self.clock),
            pooled_directives: self.orchestrator.pool().len(),
            grace_timers: self.scorer.grace_timers().active_count(self.clock),
            kinematics: self.tracker.state(),
            counters: self.counters.clone(),
        }
    }
}
