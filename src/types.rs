//! Core types shared across the Hoverfetch engine
//!
//! This module defines the data structures that flow between stages:
//! pointer kinematics, link geometry, score breakdowns, speculative directives,
//! and the instructions handed to the host.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp in milliseconds on the host's monotonic clock
pub type Millis = f64;

/// A point in page viewport coordinates (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// A 2D vector (velocity or acceleration)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

impl Vector {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Bounding box of a link element in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rect of the given size centered on `center`
    pub fn centered(center: Point, width: f64, height: f64) -> Self {
        Self::new(
            center.x - width / 2.0,
            center.y - height / 2.0,
            width,
            height,
        )
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Smaller of the two dimensions (Fitts' target width)
    pub fn min_dimension(&self) -> f64 {
        self.width.min(self.height)
    }
}

/// Kinematic state derived from one accepted pointer sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KinematicState {
    pub position: Point,
    /// Pixels per second
    pub velocity: Vector,
    /// Pixels per second squared
    pub acceleration: Vector,
    /// Direction of travel in radians
    pub direction: f64,
    /// Magnitude of velocity (px/s)
    pub speed: f64,
    pub decelerating: bool,
    pub timestamp: Millis,
}

/// Page region a link lives in, as reported by the DOM adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Article body, main element and similar primary content
    Main,
    /// Nav bars, headers, footers, sidebars
    Navigation,
    #[default]
    Other,
}

/// Kind of speculative work, ordered from lightest to heaviest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DirectiveType {
    #[serde(rename = "dns-prefetch")]
    DnsPrefetch,
    #[serde(rename = "preconnect")]
    Preconnect,
    #[serde(rename = "prefetch")]
    Prefetch,
    #[serde(rename = "prerender")]
    Prerender,
}

impl DirectiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveType::DnsPrefetch => "dns-prefetch",
            DirectiveType::Preconnect => "preconnect",
            DirectiveType::Prefetch => "prefetch",
            DirectiveType::Prerender => "prerender",
        }
    }

    /// Prefetch and prerender occupy a slot in the bounded pool
    pub fn is_heavy(&self) -> bool {
        matches!(self, DirectiveType::Prefetch | DirectiveType::Prerender)
    }

    /// Eagerness hint passed to the host's speculation rules
    pub fn eagerness(&self) -> Option<Eagerness> {
        match self {
            DirectiveType::Prefetch => Some(Eagerness::Eager),
            DirectiveType::Prerender => Some(Eagerness::Moderate),
            _ => None,
        }
    }
}

impl fmt::Display for DirectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Eagerness hint for document-level speculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eagerness {
    Eager,
    Moderate,
}

/// One speculative action against a normalized URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeculativeDirective {
    #[serde(rename = "type")]
    pub directive_type: DirectiveType,
    pub url: String,
    pub timestamp: Millis,
}

impl SpeculativeDirective {
    pub fn new(directive_type: DirectiveType, url: impl Into<String>, timestamp: Millis) -> Self {
        Self {
            directive_type,
            url: url.into(),
            timestamp,
        }
    }

    pub fn age(&self, now: Millis) -> Millis {
        now - self.timestamp
    }
}

/// Per-domain trust classification supplied by the policy store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Trusted,
    #[default]
    Neutral,
    Untrusted,
}

/// Per-factor contribution to a composite score (each 0-100, pre-weight)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub fitts: f64,
    pub intention: f64,
    pub proximity: f64,
    pub context: f64,
    pub history: f64,
    /// Points added by the hysteresis grace hold
    pub boost: f64,
}

/// A scored URL as emitted to the orchestrator and dispatch collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub url: String,
    pub score: f64,
}

/// Instruction for the host environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostInstruction {
    /// Top candidates of one scoring batch
    Ranked { candidates: Vec<RankedCandidate> },
    /// Establish a speculative primitive
    Issue {
        directive: SpeculativeDirective,
        #[serde(skip_serializing_if = "Option::is_none")]
        eagerness: Option<Eagerness>,
    },
    /// Reverse a previously issued primitive
    Revoke { directive: SpeculativeDirective },
}
