//! Hoverfetch - Predictive link prefetch engine
//!
//! Hoverfetch watches the pointer, scores every visible link by how likely the
//! user is to click it, and turns the best candidates into speculative
//! network work (dns-prefetch, preconnect, prefetch, prerender) under the
//! device's battery, network and memory budget:
//! pointer kinematics → link scoring → resource governance → directive dispatch.
//!
//! ## Modules
//!
//! - **Tracker**: pointer velocity, acceleration and direction
//! - **Catalog / Scoring**: candidate links and the five-factor composite score
//! - **Governor**: operating profile from mode and device telemetry
//! - **Orchestrator**: tiered directives with a bounded, TTL-swept pool
//! - **Pipeline**: the [`PredictionEngine`] composition root

pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod governor;
pub mod normalize;
pub mod orchestrator;
pub mod persistence;
pub mod pipeline;
pub mod schema;
pub mod scoring;
pub mod tracker;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::EngineConfig;
pub use error::EngineError;
pub use governor::{Mode, OperatingProfile, ResourceGovernor};
pub use orchestrator::PrefetchOrchestrator;
pub use pipeline::{replay_events, replay_events_with_config, EngineStatus, PredictionEngine};
pub use scoring::ScoringEngine;
pub use tracker::KinematicsTracker;

// Schema exports
pub use schema::{EventAdapter, InboundEvent, SCHEMA_VERSION};

/// Library version reported in engine status
pub const HOVERFETCH_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "hoverfetch";
