//! Context/resource governor
//!
//! Tracks device telemetry (battery, network, memory) and maps it to an
//! operating profile: the score thresholds and concurrency quotas the
//! orchestrator works under. Manual modes pin a profile; `auto` re-derives it
//! on every telemetry change.

use crate::error::EngineError;
use crate::types::Millis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

/// Interval between periodic memory-usage samples
pub const MEMORY_SAMPLE_INTERVAL_MS: Millis = 30_000.0;

/// Battery level below which a discharging device drops to eco
pub const LOW_BATTERY_LEVEL: f64 = 0.2;

/// Memory pressure above which auto mode drops to eco
pub const HIGH_MEMORY_FRACTION: f64 = 0.8;

/// Memory usage below which auto mode may pick turbo
pub const LOW_MEMORY_FRACTION: f64 = 0.5;

/// Downlink (Mbps) above which the network counts as fast
pub const FAST_DOWNLINK_MBPS: f64 = 5.0;

/// Effective connection class reported by the network information API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EffectiveType {
    Slow2g,
    TwoG,
    ThreeG,
    FourG,
    Wifi,
    Unknown,
}

impl From<String> for EffectiveType {
    fn from(label: String) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "slow-2g" => EffectiveType::Slow2g,
            "2g" => EffectiveType::TwoG,
            "3g" => EffectiveType::ThreeG,
            "4g" => EffectiveType::FourG,
            "wifi" | "ethernet" => EffectiveType::Wifi,
            _ => EffectiveType::Unknown,
        }
    }
}

impl From<EffectiveType> for String {
    fn from(effective_type: EffectiveType) -> Self {
        effective_type.as_str().to_string()
    }
}

impl EffectiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveType::Slow2g => "slow-2g",
            EffectiveType::TwoG => "2g",
            EffectiveType::ThreeG => "3g",
            EffectiveType::FourG => "4g",
            EffectiveType::Wifi => "wifi",
            EffectiveType::Unknown => "unknown",
        }
    }

    /// 2g-class links, which force eco in auto mode
    pub fn is_very_slow(&self) -> bool {
        matches!(self, EffectiveType::Slow2g | EffectiveType::TwoG)
    }

    /// Links slow enough to stretch the scoring cadence
    pub fn is_slow(&self) -> bool {
        self.is_very_slow() || *self == EffectiveType::ThreeG
    }
}

/// Live device telemetry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceContext {
    pub charging: bool,
    /// Battery level (0-1)
    pub battery_level: f64,
    pub effective_type: EffectiveType,
    /// Downlink estimate (Mbps)
    pub downlink_mbps: f64,
    pub save_data: bool,
    /// Fraction of the memory budget in use (0-1)
    pub memory_used_fraction: f64,
}

impl Default for DeviceContext {
    /// Optimistic defaults used while telemetry APIs are absent
    fn default() -> Self {
        Self {
            charging: true,
            battery_level: 1.0,
            effective_type: EffectiveType::FourG,
            downlink_mbps: 10.0,
            save_data: false,
            memory_used_fraction: 0.0,
        }
    }
}

/// Named operating profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileName {
    Turbo,
    Balanced,
    Eco,
}

impl ProfileName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileName::Turbo => "turbo",
            ProfileName::Balanced => "balanced",
            ProfileName::Eco => "eco",
        }
    }

    pub fn profile(&self) -> &'static OperatingProfile {
        match self {
            ProfileName::Turbo => &TURBO,
            ProfileName::Balanced => &BALANCED,
            ProfileName::Eco => &ECO,
        }
    }
}

/// Score thresholds and concurrency quotas for speculative work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingProfile {
    pub name: ProfileName,
    pub prerender_threshold: f64,
    pub prefetch_threshold: f64,
    pub preconnect_threshold: f64,
    pub prerender_quota: usize,
    pub prefetch_quota: usize,
}

pub const TURBO: OperatingProfile = OperatingProfile {
    name: ProfileName::Turbo,
    prerender_threshold: 70.0,
    prefetch_threshold: 50.0,
    preconnect_threshold: 30.0,
    prerender_quota: 2,
    prefetch_quota: 5,
};

pub const BALANCED: OperatingProfile = OperatingProfile {
    name: ProfileName::Balanced,
    prerender_threshold: 80.0,
    prefetch_threshold: 60.0,
    preconnect_threshold: 40.0,
    prerender_quota: 1,
    prefetch_quota: 3,
};

/// Prerender threshold sits above the score ceiling, so eco never prerenders
pub const ECO: OperatingProfile = OperatingProfile {
    name: ProfileName::Eco,
    prerender_threshold: 101.0,
    prefetch_threshold: 75.0,
    preconnect_threshold: 50.0,
    prerender_quota: 0,
    prefetch_quota: 1,
};

/// All profiles from most to least aggressive
pub const PROFILES: [&OperatingProfile; 3] = [&TURBO, &BALANCED, &ECO];

/// User-selected operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Turbo,
    Balanced,
    Eco,
    #[default]
    Auto,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Turbo => "turbo",
            Mode::Balanced => "balanced",
            Mode::Eco => "eco",
            Mode::Auto => "auto",
        }
    }
}

impl FromStr for Mode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turbo" => Ok(Mode::Turbo),
            "balanced" => Ok(Mode::Balanced),
            "eco" => Ok(Mode::Eco),
            "auto" => Ok(Mode::Auto),
            other => Err(EngineError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule selected the effective profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileReason {
    Manual,
    LowBattery,
    DataSaver,
    SlowNetwork,
    MemoryPressure,
    ChargingFastNetwork,
    Default,
}

/// Auto-mode rule table, evaluated in priority order
pub fn select_auto_profile(ctx: &DeviceContext) -> (ProfileName, ProfileReason) {
    if !ctx.charging && ctx.battery_level < LOW_BATTERY_LEVEL {
        return (ProfileName::Eco, ProfileReason::LowBattery);
    }
    if ctx.save_data {
        return (ProfileName::Eco, ProfileReason::DataSaver);
    }
    if ctx.effective_type.is_very_slow() {
        return (ProfileName::Eco, ProfileReason::SlowNetwork);
    }
    if ctx.memory_used_fraction > HIGH_MEMORY_FRACTION {
        return (ProfileName::Eco, ProfileReason::MemoryPressure);
    }

    let fast_network =
        ctx.effective_type == EffectiveType::FourG || ctx.downlink_mbps > FAST_DOWNLINK_MBPS;
    if ctx.charging && fast_network && ctx.memory_used_fraction < LOW_MEMORY_FRACTION {
        return (ProfileName::Turbo, ProfileReason::ChargingFastNetwork);
    }

    (ProfileName::Balanced, ProfileReason::Default)
}

/// Diagnostic snapshot of the governor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorStatus {
    pub instance_id: String,
    pub mode: Mode,
    pub profile: OperatingProfile,
    pub reason: ProfileReason,
    pub context: DeviceContext,
    pub last_memory_sample_ms: Option<Millis>,
}

/// Resource governor state
#[derive(Debug, Clone)]
pub struct ResourceGovernor {
    instance_id: Uuid,
    mode: Mode,
    context: DeviceContext,
    profile: ProfileName,
    reason: ProfileReason,
    memory_interval_ms: Millis,
    last_memory_sample: Option<Millis>,
}

impl Default for ResourceGovernor {
    fn default() -> Self {
        Self::new(Mode::Auto)
    }
}

impl ResourceGovernor {
    pub fn new(mode: Mode) -> Self {
        let mut governor = Self {
            instance_id: Uuid::new_v4(),
            mode,
            context: DeviceContext::default(),
            profile: ProfileName::Balanced,
            reason: ProfileReason::Default,
            memory_interval_ms: MEMORY_SAMPLE_INTERVAL_MS,
            last_memory_sample: None,
        };
        governor.recompute();
        governor
    }

    pub fn with_memory_interval(mut self, interval_ms: Millis) -> Self {
        self.memory_interval_ms = interval_ms;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// Currently effective profile
    pub fn profile(&self) -> &'static OperatingProfile {
        self.profile.profile()
    }

    pub fn reason(&self) -> ProfileReason {
        self.reason
    }

    /// Data-saver veto on prefetch/prerender
    pub fn data_saver(&self) -> bool {
        self.context.save_data
    }

    /// Select a mode by name. Unknown names are rejected as a no-op.
    ///
    /// Returns true when the mode was accepted (the caller persists it).
    pub fn set_mode(&mut self, mode: &str) -> bool {
        match mode.parse::<Mode>() {
            Ok(mode) => {
                self.apply_mode(mode);
                true
            }
            Err(e) => {
                warn!(error = %e, "ignoring mode change");
                false
            }
        }
    }

    pub fn apply_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.recompute();
    }

    /// Battery telemetry; absent fields keep their previous value
    pub fn on_battery(&mut self, charging: Option<bool>, level: Option<f64>) -> bool {
        if let Some(charging) = charging {
            self.context.charging = charging;
        }
        if let Some(level) = level {
            self.context.battery_level = level.clamp(0.0, 1.0);
        }
        self.recompute()
    }

    /// Network telemetry; absent fields keep their previous value
    pub fn on_network(
        &mut self,
        effective_type: Option<EffectiveType>,
        downlink_mbps: Option<f64>,
        save_data: Option<bool>,
    ) -> bool {
        if let Some(effective_type) = effective_type {
            self.context.effective_type = effective_type;
        }
        if let Some(downlink) = downlink_mbps {
            self.context.downlink_mbps = downlink.max(0.0);
        }
        if let Some(save_data) = save_data {
            self.context.save_data = save_data;
        }
        self.recompute()
    }

    /// Periodic memory sample
    pub fn on_memory_sample(&mut self, used_fraction: f64, now: Millis) -> bool {
        self.context.memory_used_fraction = used_fraction.clamp(0.0, 1.0);
        self.last_memory_sample = Some(now);
        self.recompute()
    }

    /// Whether the periodic memory sample is due
    pub fn memory_sample_due(&self, now: Millis) -> bool {
        match self.last_memory_sample {
            None => true,
            Some(last) => now - last >= self.memory_interval_ms,
        }
    }

    /// Mark a memory sampling attempt that produced no reading
    pub fn mark_memory_sampled(&mut self, now: Millis) {
        self.last_memory_sample = Some(now);
    }

    /// Re-derive the effective profile; returns true if it changed
    pub fn recompute(&mut self) -> bool {
        let (profile, reason) = match self.mode {
            Mode::Turbo => (ProfileName::Turbo, ProfileReason::Manual),
            Mode::Balanced => (ProfileName::Balanced, ProfileReason::Manual),
            Mode::Eco => (ProfileName::Eco, ProfileReason::Manual),
            Mode::Auto => select_auto_profile(&self.context),
        };

        let changed = profile != self.profile;
        if changed {
            info!(
                from = self.profile.as_str(),
                to = profile.as_str(),
                mode = %self.mode,
                ?reason,
                "operating profile changed"
            );
        }
        self.profile = profile;
        self.reason = reason;
        changed
    }

    pub fn status(&self) -> GovernorStatus {
        GovernorStatus {
            instance_id: self.instance_id.to_string(),
            mode: self.mode,
            profile: self.profile().clone(),
            reason: self.reason,
            context: self.context.clone(),
            last_memory_sample_ms: self.last_memory_sample,
        }
    }
}
