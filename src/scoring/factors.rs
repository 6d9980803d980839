//! Scoring factors
//!
//! Pure functions turning geometry, kinematics and page context into 0-100
//! factor scores, plus the weighted composite.

use crate::config::FactorWeights;
use crate::tracker::intention_toward;
use crate::types::{FactorBreakdown, KinematicState, Rect, Region};

/// Score for a link inside primary content
pub const MAIN_CONTENT_SCORE: f64 = 80.0;

/// Score for a link inside navigation or peripheral chrome
pub const NAVIGATION_SCORE: f64 = 30.0;

/// Viewport dimensions used for proximity and context scoring, plus the
/// page's vertical scroll offset
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub scroll_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
            scroll_y: 0.0,
        }
    }
}

impl Viewport {
    pub fn diagonal(&self) -> f64 {
        self.width.hypot(self.height)
    }
}

/// Inverted Fitts' law: ease of acquiring a target of the given size
///
/// Formula: `clamp(100 - 15 * log2(distance / min(width, height) + 1), 0, 100)`
pub fn fitts_score(distance: f64, width: f64, height: f64) -> f64 {
    let target = width.min(height);
    if target <= 0.0 {
        return 0.0;
    }
    let index_of_difficulty = (distance.max(0.0) / target + 1.0).log2();
    (100.0 - 15.0 * index_of_difficulty).clamp(0.0, 100.0)
}

/// Direction-of-travel alignment scaled to 0-100; moving away scores 0
pub fn intention_score(intention_dot: f64) -> f64 {
    (100.0 * intention_dot).max(0.0)
}

/// Linear falloff with distance relative to the viewport diagonal
pub fn proximity_score(distance: f64, viewport_diagonal: f64) -> f64 {
    if viewport_diagonal <= 0.0 {
        return 0.0;
    }
    (100.0 - 100.0 * distance / viewport_diagonal).max(0.0)
}

/// Page-context heuristic
///
/// Links in primary content score 80, navigation chrome 30; anything else
/// scores by vertical position, higher up being more likely:
/// `50 + 30 * (1 - y / viewport_height)`.
pub fn context_score(region: Region, center_y: f64, viewport_height: f64) -> f64 {
    match region {
        Region::Main => MAIN_CONTENT_SCORE,
        Region::Navigation => NAVIGATION_SCORE,
        Region::Other => {
            let fraction = if viewport_height > 0.0 {
                (center_y / viewport_height).clamp(0.0, 1.0)
            } else {
                0.0
            };
            50.0 + 30.0 * (1.0 - fraction)
        }
    }
}

/// Weighted sum of the five factors, clamped to [0, 100]
pub fn composite_score(factors: &FactorBreakdown, weights: &FactorWeights) -> f64 {
    let sum = weights.fitts * factors.fitts
        + weights.intention * factors.intention
        + weights.proximity * factors.proximity
        + weights.context * factors.context
        + weights.history * factors.history;
    sum.clamp(0.0, 100.0)
}

/// Compute every factor for one candidate from a kinematic snapshot
pub fn score_factors(
    kinematics: &KinematicState,
    rect: &Rect,
    region: Region,
    viewport: &Viewport,
    history: f64,
) -> FactorBreakdown {
    let center = rect.center();
    let distance = kinematics.position.distance_to(center);

    FactorBreakdown {
        fitts: fitts_score(distance, rect.width, rect.height),
        intention: intention_score(intention_toward(kinematics, center)),
        proximity: proximity_score(distance, viewport.diagonal()),
        context: context_score(region, center.y, viewport.height),
        history: history.clamp(0.0, 100.0),
        boost: 0.0,
    }
}
