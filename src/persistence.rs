//! Persisted engine state
//!
//! Directive bookkeeping, the selected mode and cumulative counters survive a
//! restart through a [`StateStore`]. Read or write failures are logged and the
//! engine carries on with in-memory state.

use crate::error::EngineError;
use crate::governor::Mode;
use crate::orchestrator::OrchestratorSnapshot;
use crate::types::{DirectiveType, SpeculativeDirective};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// Cumulative prediction counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub directives_issued: u64,
    pub successful_predictions: u64,
    pub estimated_time_saved_ms: f64,
}

impl Counters {
    /// Fraction of a navigation's load time assumed saved by each tier
    pub fn savings_fraction(directive_type: DirectiveType) -> f64 {
        match directive_type {
            DirectiveType::DnsPrefetch => 0.05,
            DirectiveType::Preconnect => 0.15,
            DirectiveType::Prefetch => 0.5,
            DirectiveType::Prerender => 0.9,
        }
    }

    /// Credit a navigation that followed a live directive
    pub fn record_hit(&mut self, directive_type: DirectiveType, load_time_ms: f64) {
        self.successful_predictions += 1;
        self.estimated_time_saved_ms += load_time_ms.max(0.0) * Self::savings_fraction(directive_type);
    }
}

/// On-disk layout of engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Pool contents in insertion order
    #[serde(default)]
    pub directives: Vec<SpeculativeDirective>,
    #[serde(default)]
    pub dedup_index: BTreeMap<String, SpeculativeDirective>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub counters: Counters,
    pub saved_at: DateTime<Utc>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            directives: Vec::new(),
            dedup_index: BTreeMap::new(),
            mode: Mode::default(),
            counters: Counters::default(),
            saved_at: Utc::now(),
        }
    }
}

impl PersistedState {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn orchestrator_snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            directives: self.directives.clone(),
            dedup_index: self.dedup_index.clone(),
        }
    }
}

/// Backing storage for [`PersistedState`]
pub trait StateStore {
    /// Load the last saved state; `Ok(None)` when nothing was saved yet
    fn load(&self) -> Result<Option<PersistedState>, EngineError>;

    fn save(&mut self, state: &PersistedState) -> Result<(), EngineError>;
}

/// Store backed by a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<PersistedState>, EngineError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)?;
        PersistedState::from_json(&json).map(Some)
    }

    fn save(&mut self, state: &PersistedState) -> Result<(), EngineError> {
        fs::write(&self.path, state.to_json()?)?;
        Ok(())
    }
}

/// Store that keeps the serialized state in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    json: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved JSON, if any
    pub fn contents(&self) -> Option<&str> {
        self.json.as_deref()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<PersistedState>, EngineError> {
        self.json
            .as_deref()
            .map(PersistedState::from_json)
            .transpose()
    }

    fn save(&mut self, state: &PersistedState) -> Result<(), EngineError> {
        self.json = Some(state.to_json()?);
        Ok(())
    }
}

/// Load state, falling back to an empty state on any failure
pub fn load_or_default(store: &dyn StateStore) -> PersistedState {
    match store.load() {
        Ok(Some(state)) => state,
        Ok(None) => PersistedState::default(),
        Err(e) => {
            warn!(error = %e, "could not read persisted state, starting empty");
            PersistedState::default()
        }
    }
}

/// Save state; failures are logged and reported as false
pub fn save_or_warn(store: &mut dyn StateStore, state: &PersistedState) -> bool {
    match store.save(state) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "could not persist engine state");
            false
        }
    }
}
