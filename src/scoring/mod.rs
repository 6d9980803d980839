//! Link scoring engine
//!
//! Runs a throttled batch over the catalog: every visible candidate near the
//! cursor gets a composite 0-100 score from five weighted factors, smoothed by
//! a hysteresis grace hold. Survivors are ranked and the top candidates are
//! handed to the orchestrator.
//!
//! Pipeline per batch: throttle/scroll gate → pre-filter → geometry refresh →
//! factors → composite → hysteresis → drop low scores → rank.

pub mod factors;
pub mod grace;

use crate::catalog::{LinkCatalog, LinkId};
use crate::collaborators::LayoutProbe;
use crate::config::ScoringConfig;
use crate::governor::DeviceContext;
use crate::types::{FactorBreakdown, KinematicState, Millis, RankedCandidate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

pub use factors::Viewport;
pub use grace::GraceTimers;

/// Latest score for one normalized URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub url: String,
    pub score: f64,
    pub computed_at: Millis,
    pub factors: FactorBreakdown,
    /// Link that produced the score
    pub link_id: LinkId,
    /// Catalog insertion order of that link
    pub sequence: u64,
}

/// Why a batch did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Throttled,
    Scrolling,
}

/// Result of one scoring batch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResult {
    /// Top candidates, best first
    pub ranked: Vec<RankedCandidate>,
    /// URLs seen for the first time; their history lookup should start now
    pub history_requests: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum HistoryEntry {
    Pending,
    Resolved(f64),
}

/// Scroll speed estimate from consecutive scroll samples
#[derive(Debug, Clone, Default)]
struct ScrollMonitor {
    last: Option<(f64, Millis)>,
    speed: f64,
}

impl ScrollMonitor {
    fn on_scroll(&mut self, offset: f64, timestamp: Millis) {
        if let Some((prev_offset, prev_ts)) = self.last {
            let dt = timestamp - prev_ts;
            if dt > 0.0 {
                self.speed = (offset - prev_offset).abs() / dt * 1000.0;
            }
        }
        self.last = Some((offset, timestamp));
    }

    fn speed_at(&self, now: Millis, decay_ms: Millis) -> f64 {
        match self.last {
            Some((_, ts)) if now - ts <= decay_ms => self.speed,
            _ => 0.0,
        }
    }
}

/// Scoring engine state
#[derive(Debug)]
pub struct ScoringEngine {
    config: ScoringConfig,
    scores: HashMap<String, ScoreRecord>,
    grace: GraceTimers,
    history: HashMap<String, HistoryEntry>,
    viewport: Viewport,
    scroll: ScrollMonitor,
    last_run: Option<Millis>,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            scores: HashMap::new(),
            grace: GraceTimers::new(),
            history: HashMap::new(),
            viewport: Viewport::default(),
            scroll: ScrollMonitor::default(),
            last_run: None,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// New viewport size; the scroll offset is kept
    pub fn resize_viewport(&mut self, width: f64, height: f64) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn on_scroll(&mut self, offset_y: f64, timestamp: Millis) {
        self.viewport.scroll_y = offset_y;
        self.scroll.on_scroll(offset_y, timestamp);
    }

    /// Current scroll speed (px/s), zero once scrolling has settled
    pub fn scroll_speed(&self, now: Millis) -> f64 {
        self.scroll.speed_at(now, self.config.scroll_decay_ms)
    }

    /// Deliver an asynchronously resolved history score
    pub fn resolve_history(&mut self, url: &str, score: f64) {
        self.history
            .insert(url.to_string(), HistoryEntry::Resolved(score.clamp(0.0, 100.0)));
    }

    /// History score for `url`, or the placeholder while the lookup is pending
    pub fn history_score(&self, url: &str) -> f64 {
        match self.history.get(url) {
            Some(HistoryEntry::Resolved(score)) => *score,
            _ => self.config.default_history_score,
        }
    }

    /// Throttle interval under the given device conditions.
    ///
    /// Multipliers compound: data saver ×2.0, slow network ×1.5, unplugged ×1.25.
    pub fn throttle_interval(&self, ctx: &DeviceContext) -> Millis {
        let mut interval = self.config.base_interval_ms;
        if ctx.save_data {
            interval *= self.config.data_saver_multiplier;
        }
        if ctx.effective_type.is_slow() {
            interval *= self.config.slow_network_multiplier;
        }
        if !ctx.charging {
            interval *= self.config.unplugged_multiplier;
        }
        interval
    }

    /// Live score for a URL
    pub fn score_of(&self, url: &str) -> Option<&ScoreRecord> {
        self.scores.get(url)
    }

    /// Number of URLs in the live score table
    pub fn score_count(&self) -> usize {
        self.scores.len()
    }

    pub fn grace_timers(&self) -> &GraceTimers {
        &self.grace
    }

    /// Run one scoring batch if the throttle and scroll gates allow it.
    ///
    /// A skipped batch leaves every score untouched.
    pub fn calculate_scores(
        &mut self,
        kinematics: &KinematicState,
        catalog: &mut LinkCatalog,
        ctx: &DeviceContext,
        probe: Option<&dyn LayoutProbe>,
        now: Millis,
    ) -> Result<BatchResult, SkipReason> {
        if let Some(last) = self.last_run {
            if now - last < self.throttle_interval(ctx) {
                return Err(SkipReason::Throttled);
            }
        }
        let scroll_speed = self.scroll_speed(now);
        if scroll_speed > self.config.max_scroll_speed {
            trace!(scroll_speed, "skipping scoring batch while scrolling");
            return Err(SkipReason::Scrolling);
        }
        self.last_run = Some(now);
        self.grace.sweep(now);

        let nearby: Vec<(LinkId, u64)> = catalog
            .nearby(kinematics.position, self.config.prefilter_radius)
            .iter()
            .map(|link| (link.id, link.sequence))
            .collect();

        let mut history_requests = Vec::new();
        let mut next_scores: HashMap<String, ScoreRecord> = HashMap::new();

        for (id, sequence) in nearby {
            if let Some(rect) = probe.and_then(|p| p.measure(id)) {
                catalog.refresh_geometry(id, rect);
            }
            let Some(link) = catalog.get(id) else {
                continue;
            };
            let url = link.url.clone();

            if !self.history.contains_key(&url) {
                self.history.insert(url.clone(), HistoryEntry::Pending);
                history_requests.push(url.clone());
            }

            let mut factors = factors::score_factors(
                kinematics,
                &link.rect,
                link.region,
                &self.viewport,
                self.history_score(&url),
            );
            let composite = factors::composite_score(&factors, &self.config.weights);
            let score = self.apply_hysteresis(&url, composite, kinematics.speed, now, &mut factors);

            catalog.record_score(id, score, factors);

            if score <= self.config.drop_threshold {
                continue;
            }
            let replace = next_scores
                .get(&url)
                .map_or(true, |existing| score > existing.score);
            if replace {
                next_scores.insert(
                    url.clone(),
                    ScoreRecord {
                        url,
                        score,
                        computed_at: now,
                        factors,
                        link_id: id,
                        sequence,
                    },
                );
            }
        }

        self.scores = next_scores;

        // History is only kept for URLs still on the page
        let on_page: HashSet<&str> = catalog.urls().collect();
        self.history.retain(|url, _| on_page.contains(url.as_str()));

        let mut ranked: Vec<&ScoreRecord> = self.scores.values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        let ranked: Vec<RankedCandidate> = ranked
            .into_iter()
            .take(self.config.top_n)
            .map(|record| RankedCandidate {
                url: record.url.clone(),
                score: record.score,
            })
            .collect();

        debug!(
            candidates = self.scores.len(),
            emitted = ranked.len(),
            "scoring batch complete"
        );

        Ok(BatchResult {
            ranked,
            history_requests,
        })
    }

    /// Grace hold: while the cursor is nearly still over a promising link, a
    /// dip below the previously stored score is bridged once per timer.
    fn apply_hysteresis(
        &mut self,
        url: &str,
        composite: f64,
        speed: f64,
        now: Millis,
        factors: &mut FactorBreakdown,
    ) -> f64 {
        let previous = self.scores.get(url).map(|record| record.score);
        let qualifies = speed < self.config.grace_max_speed
            && composite > self.config.grace_min_score
            && !self.grace.is_active(url, now);

        match previous {
            Some(previous) if qualifies && previous > composite => {
                self.grace.start(url, now, self.config.grace_duration_ms);
                let boosted = (composite + (previous - composite)).min(100.0);
                factors.boost = boosted - composite;
                boosted
            }
            _ => composite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEvent, LinkObservation};
    use crate::governor::EffectiveType;
    use crate::types::{Point, Rect, Region, Vector};

    fn moving_right(x: f64, y: f64, speed: f64) -> KinematicState {
        KinematicState {
            position: Point::new(x, y),
            velocity: Vector::new(speed, 0.0),
            speed,
            ..KinematicState::default()
        }
    }

    fn add_link(catalog: &mut LinkCatalog, id: LinkId, href: &str, center: Point) {
        catalog.apply(CatalogEvent::Upsert(LinkObservation {
            id,
            href: href.to_string(),
            rect: Rect::centered(center, 80.0, 20.0),
            region: Region::Main,
        }));
    }

    #[test]
    fn test_throttle_multipliers_compound() {
        let engine = ScoringEngine::default();
        let mut ctx = DeviceContext::default();
        assert_eq!(engine.throttle_interval(&ctx), 80.0);

        ctx.save_data = true;
        ctx.effective_type = EffectiveType::ThreeG;
        ctx.charging = false;
        assert!((engine.throttle_interval(&ctx) - 80.0 * 2.0 * 1.5 * 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_viewport_tracks_scroll_offset() {
        let mut engine = ScoringEngine::default();
        engine.on_scroll(320.0, 0.0);
        engine.resize_viewport(800.0, 600.0);
        assert_eq!(
            engine.viewport(),
            Viewport {
                width: 800.0,
                height: 600.0,
                scroll_y: 320.0,
            }
        );
    }

    #[test]
    fn test_history_cache_forgets_links_that_left_the_page() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        let ctx = DeviceContext::default();
        let kin = moving_right(0.0, 0.0, 400.0);
        add_link(&mut catalog, 1, "https://a.com/x", Point::new(60.0, 0.0));
        add_link(&mut catalog, 2, "https://a.com/y", Point::new(0.0, 60.0));

        engine.calculate_scores(&kin, &mut catalog, &ctx, None, 0.0).unwrap();
        engine.resolve_history("https://a.com/x", 90.0);
        engine.resolve_history("https://a.com/y", 70.0);

        catalog.apply(CatalogEvent::Remove { id: 2 });
        engine.calculate_scores(&kin, &mut catalog, &ctx, None, 100.0).unwrap();
        assert_eq!(engine.history_score("https://a.com/x"), 90.0);
        assert_eq!(engine.history_score("https://a.com/y"), 40.0);

        // A returning link starts a fresh lookup
        add_link(&mut catalog, 2, "https://a.com/y", Point::new(0.0, 60.0));
        let batch = engine.calculate_scores(&kin, &mut catalog, &ctx, None, 200.0).unwrap();
        assert_eq!(batch.history_requests, vec!["https://a.com/y".to_string()]);
    }

    #[test]
    fn test_batch_is_throttled() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        add_link(&mut catalog, 1, "https://a.com/x", Point::new(60.0, 0.0));
        let ctx = DeviceContext::default();
        let kin = moving_right(0.0, 0.0, 400.0);

        assert!(engine.calculate_scores(&kin, &mut catalog, &ctx, None, 0.0).is_ok());
        assert_eq!(
            engine.calculate_scores(&kin, &mut catalog, &ctx, None, 50.0),
            Err(SkipReason::Throttled)
        );
        assert!(engine.calculate_scores(&kin, &mut catalog, &ctx, None, 80.0).is_ok());
    }

    #[test]
    fn test_fast_scroll_skips_batch_without_aging_scores() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        add_link(&mut catalog, 1, "https://a.com/x", Point::new(60.0, 0.0));
        let ctx = DeviceContext::default();

        let kin = moving_right(0.0, 0.0, 400.0);
        engine.calculate_scores(&kin, &mut catalog, &ctx, None, 0.0).unwrap();
        let before = engine.score_of("https://a.com/x").cloned();
        assert!(before.is_some());

        engine.on_scroll(0.0, 100.0);
        engine.on_scroll(50.0, 150.0); // 1000 px/s
        let far_away = moving_right(2000.0, 2000.0, 400.0);
        assert_eq!(
            engine.calculate_scores(&far_away, &mut catalog, &ctx, None, 160.0),
            Err(SkipReason::Scrolling)
        );
        assert_eq!(engine.score_of("https://a.com/x").cloned(), before);

        // Once scrolling settles the batch runs and the distant link ages out
        engine.calculate_scores(&far_away, &mut catalog, &ctx, None, 400.0).unwrap();
        assert!(engine.score_of("https://a.com/x").is_none());
    }

    #[test]
    fn test_history_placeholder_until_resolved() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        add_link(&mut catalog, 1, "https://a.com/x", Point::new(60.0, 0.0));
        let ctx = DeviceContext::default();
        let kin = moving_right(0.0, 0.0, 400.0);

        let first = engine.calculate_scores(&kin, &mut catalog, &ctx, None, 0.0).unwrap();
        assert_eq!(first.history_requests, vec!["https://a.com/x".to_string()]);
        assert_eq!(engine.score_of("https://a.com/x").unwrap().factors.history, 40.0);

        engine.resolve_history("https://a.com/x", 95.0);
        let second = engine.calculate_scores(&kin, &mut catalog, &ctx, None, 100.0).unwrap();
        assert!(second.history_requests.is_empty());
        assert_eq!(engine.score_of("https://a.com/x").unwrap().factors.history, 95.0);
    }

    #[test]
    fn test_low_scores_are_dropped() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        catalog.apply(CatalogEvent::Upsert(LinkObservation {
            id: 1,
            href: "https://a.com/tiny".to_string(),
            rect: Rect::centered(Point::new(-490.0, 0.0), 2.0, 2.0),
            region: Region::Navigation,
        }));
        let ctx = DeviceContext::default();
        let kin = moving_right(0.0, 0.0, 400.0);

        let result = engine.calculate_scores(&kin, &mut catalog, &ctx, None, 0.0).unwrap();
        assert!(result.ranked.is_empty());
        assert_eq!(engine.score_count(), 0);
        // The candidate still carries its breakdown
        assert!(catalog.get(1).unwrap().last_score.unwrap() <= 30.0);
    }

    #[test]
    fn test_ranking_ties_follow_insertion_order() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        // Mirror images above and below the cursor score identically
        add_link(&mut catalog, 10, "https://a.com/below", Point::new(0.0, 100.0));
        add_link(&mut catalog, 5, "https://a.com/above", Point::new(0.0, -100.0));
        let ctx = DeviceContext::default();
        let kin = moving_right(0.0, 0.0, 400.0);

        let result = engine.calculate_scores(&kin, &mut catalog, &ctx, None, 0.0).unwrap();
        let urls: Vec<&str> = result.ranked.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/below", "https://a.com/above"]);
        assert_eq!(result.ranked[0].score, result.ranked[1].score);
    }

    #[test]
    fn test_top_five_only() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        for i in 0..8u64 {
            add_link(
                &mut catalog,
                i,
                &format!("https://a.com/{i}"),
                Point::new(40.0 + 10.0 * i as f64, 0.0),
            );
        }
        let ctx = DeviceContext::default();
        let kin = moving_right(0.0, 0.0, 400.0);

        let result = engine.calculate_scores(&kin, &mut catalog, &ctx, None, 0.0).unwrap();
        assert_eq!(result.ranked.len(), 5);
        assert_eq!(engine.score_count(), 8);
        assert_eq!(result.ranked[0].url, "https://a.com/0");
        for pair in result.ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_shared_url_yields_one_record() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        add_link(&mut catalog, 1, "https://a.com/x", Point::new(300.0, 0.0));
        add_link(&mut catalog, 2, "https://a.com/x/", Point::new(60.0, 0.0));
        let ctx = DeviceContext::default();
        let kin = moving_right(0.0, 0.0, 400.0);

        let result = engine.calculate_scores(&kin, &mut catalog, &ctx, None, 0.0).unwrap();
        assert_eq!(result.ranked.len(), 1);
        assert_eq!(engine.score_of("https://a.com/x").unwrap().link_id, 2);
    }

    #[test]
    fn test_hysteresis_boost_once_per_timer() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        add_link(&mut catalog, 1, "https://a.com/x", Point::new(60.0, 0.0));
        let ctx = DeviceContext::default();

        // Fast approach aligned with the link
        engine
            .calculate_scores(&moving_right(0.0, 0.0, 400.0), &mut catalog, &ctx, None, 0.0)
            .unwrap();
        let high = engine.score_of("https://a.com/x").unwrap().score;

        // Cursor nearly stops and drifts off-axis: composite dips but stays above 50
        let drifting = KinematicState {
            position: Point::new(0.0, 0.0),
            velocity: Vector::new(6.0, 8.0),
            speed: 10.0,
            ..KinematicState::default()
        };
        engine.calculate_scores(&drifting, &mut catalog, &ctx, None, 100.0).unwrap();
        let held = engine.score_of("https://a.com/x").unwrap();
        assert!((held.score - high).abs() < 1e-9);
        assert!(held.factors.boost > 0.0);
        assert!(engine.grace_timers().is_active("https://a.com/x", 100.0));

        // Still inside the grace window: no second boost, no renewal
        engine.calculate_scores(&drifting, &mut catalog, &ctx, None, 200.0).unwrap();
        let after = engine.score_of("https://a.com/x").unwrap();
        assert!(after.score < high);
        assert_eq!(after.factors.boost, 0.0);
        assert_eq!(engine.grace_timers().expiry("https://a.com/x", 200.0), Some(300.0));
    }

    #[test]
    fn test_invisible_and_distant_links_are_ignored() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        add_link(&mut catalog, 1, "https://a.com/far", Point::new(900.0, 0.0));
        add_link(&mut catalog, 2, "https://a.com/hidden", Point::new(50.0, 0.0));
        catalog.apply(CatalogEvent::Visibility {
            id: 2,
            visible: false,
            rect: None,
        });
        let ctx = DeviceContext::default();
        let result = engine
            .calculate_scores(&moving_right(0.0, 0.0, 400.0), &mut catalog, &ctx, None, 0.0)
            .unwrap();
        assert!(result.ranked.is_empty());
    }

    struct ShiftingProbe;

    impl LayoutProbe for ShiftingProbe {
        fn measure(&self, _id: LinkId) -> Option<Rect> {
            Some(Rect::centered(Point::new(20.0, 0.0), 80.0, 20.0))
        }
    }

    #[test]
    fn test_probe_refreshes_nearby_geometry() {
        let mut engine = ScoringEngine::default();
        let mut catalog = LinkCatalog::new();
        add_link(&mut catalog, 1, "https://a.com/x", Point::new(400.0, 0.0));
        let ctx = DeviceContext::default();
        engine
            .calculate_scores(
                &moving_right(0.0, 0.0, 400.0),
                &mut catalog,
                &ctx,
                Some(&ShiftingProbe),
                0.0,
            )
            .unwrap();
        assert_eq!(catalog.get(1).unwrap().rect.center(), Point::new(20.0, 0.0));
    }
}
