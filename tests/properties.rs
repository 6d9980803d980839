use hoverfetch::collaborators::{NoopHost, StaticTrustPolicy};
use hoverfetch::config::FactorWeights;
use hoverfetch::governor::{BALANCED, TURBO};
use hoverfetch::normalize::normalize_url;
use hoverfetch::orchestrator::{DirectivePool, PrefetchOrchestrator};
use hoverfetch::scoring::factors::{composite_score, fitts_score, proximity_score};
use hoverfetch::tracker::{intention_toward, KinematicsTracker};
use hoverfetch::types::{
    DirectiveType, FactorBreakdown, KinematicState, Point, RankedCandidate, SpeculativeDirective,
    Vector,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn fitts_stays_in_bounds(d in 0.0f64..1e6, w in 0.1f64..1e3, h in 0.1f64..1e3) {
        let score = fitts_score(d, w, h);
        prop_assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn fitts_never_increases_with_distance(d in 0.0f64..5e3, extra in 0.0f64..5e3, w in 1.0f64..500.0) {
        prop_assert!(fitts_score(d + extra, w, w) <= fitts_score(d, w, w));
    }

    #[test]
    fn fitts_never_decreases_with_size(d in 0.0f64..5e3, w in 1.0f64..500.0, grow in 0.0f64..500.0) {
        prop_assert!(fitts_score(d, w + grow, w + grow) >= fitts_score(d, w, w));
    }

    #[test]
    fn proximity_stays_in_bounds(d in 0.0f64..1e5, diag in 1.0f64..1e4) {
        let score = proximity_score(d, diag);
        prop_assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn composite_is_clamped(
        fitts in -500.0f64..500.0,
        intention in -500.0f64..500.0,
        proximity in -500.0f64..500.0,
        context in -500.0f64..500.0,
        history in -500.0f64..500.0,
    ) {
        let factors = FactorBreakdown { fitts, intention, proximity, context, history, boost: 0.0 };
        let score = composite_score(&factors, &FactorWeights::default());
        prop_assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn intention_is_a_unit_dot_product(
        px in -1e3f64..1e3, py in -1e3f64..1e3,
        vx in -1e4f64..1e4, vy in -1e4f64..1e4,
        tx in -1e3f64..1e3, ty in -1e3f64..1e3,
    ) {
        let velocity = Vector::new(vx, vy);
        let state = KinematicState {
            position: Point::new(px, py),
            velocity,
            speed: velocity.magnitude(),
            ..KinematicState::default()
        };
        let dot = intention_toward(&state, Point::new(tx, ty));
        prop_assert!((-1.0..=1.0).contains(&dot));
    }

    #[test]
    fn accepted_samples_are_spaced(gaps in prop::collection::vec(0.0f64..40.0, 1..60)) {
        let mut tracker = KinematicsTracker::new(16.0);
        let mut t = 0.0;
        let mut last_accepted: Option<f64> = None;
        for gap in gaps {
            t += gap;
            if let Some(state) = tracker.on_pointer_move(t, 0.0, t) {
                if let Some(prev) = last_accepted {
                    prop_assert!(state.timestamp - prev >= 16.0);
                }
                last_accepted = Some(state.timestamp);
            }
        }
    }

    #[test]
    fn pool_never_exceeds_capacity(
        capacity in 1usize..16,
        inserts in prop::collection::vec((0u32..40, 0.0f64..200_000.0), 0..80),
    ) {
        let mut pool = DirectivePool::new(capacity, 60_000.0);
        let mut now = 0.0;
        for (id, step) in inserts {
            now += step / 10.0;
            let directive = SpeculativeDirective::new(
                DirectiveType::Prefetch,
                format!("https://a.com/{id}"),
                now,
            );
            pool.insert(directive, now);
            prop_assert!(pool.len() <= capacity);
        }
    }

    #[test]
    fn dispatch_keeps_one_directive_per_url(
        batches in prop::collection::vec(
            prop::collection::vec((0u32..8, 0.0f64..100.0), 1..6),
            1..20,
        ),
    ) {
        let mut orchestrator = PrefetchOrchestrator::default();
        let trust = StaticTrustPolicy::new();
        let mut host = NoopHost;
        for (i, batch) in batches.into_iter().enumerate() {
            let now = i as f64 * 100.0;
            let ranked: Vec<RankedCandidate> = batch
                .into_iter()
                .map(|(id, score)| RankedCandidate { url: format!("https://a.com/{id}"), score })
                .collect();
            let profile = if i % 2 == 0 { &TURBO } else { &BALANCED };
            orchestrator.dispatch(&ranked, profile, false, &trust, &mut host, now);

            let pooled = orchestrator.pool().iter().count();
            prop_assert!(pooled <= 10);
            prop_assert!(orchestrator.active_count(now) <= 8);
            prop_assert!(
                orchestrator.remaining_quota(&TURBO, DirectiveType::Prefetch, now) <= TURBO.prefetch_quota
            );
        }
    }

    #[test]
    fn normalization_is_idempotent(
        host in "[a-zA-Z]{1,12}\\.(com|org|dev)",
        segments in prop::collection::vec("[a-z0-9]{1,8}", 0..4),
        trailing in any::<bool>(),
    ) {
        let mut raw = format!("HTTPS://{host}/{}", segments.join("/"));
        if trailing && !segments.is_empty() {
            raw.push('/');
        }
        raw.push_str("#frag");
        let once = normalize_url(&raw).unwrap();
        let twice = normalize_url(&once).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert!(!once.contains('#'));
    }
}
