//! Cursor kinematics tracking
//!
//! Samples pointer positions at a capped rate and derives velocity,
//! acceleration, direction and speed from exactly the previous accepted
//! sample. Subscribers are invoked synchronously on every accepted sample.

use crate::types::{KinematicState, Millis, Point, Vector};

/// Minimum spacing between accepted samples (~60Hz)
pub const DEFAULT_SAMPLE_INTERVAL_MS: Millis = 16.0;

/// A sample is decelerating when its speed falls below this share of the previous speed
pub const DECELERATION_RATIO: f64 = 0.8;

/// Handle returned by [`KinematicsTracker::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&KinematicState)>;

/// Pointer kinematics tracker
pub struct KinematicsTracker {
    sample_interval_ms: Millis,
    state: Option<KinematicState>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl Default for KinematicsTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL_MS)
    }
}

impl KinematicsTracker {
    pub fn new(sample_interval_ms: Millis) -> Self {
        Self {
            sample_interval_ms,
            state: None,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Feed one raw pointer-move event.
    ///
    /// Returns the new state if the sample was accepted, `None` if it arrived
    /// inside the sampling interval and was dropped.
    pub fn on_pointer_move(&mut self, x: f64, y: f64, timestamp: Millis) -> Option<KinematicState> {
        let position = Point::new(x, y);

        let next = match self.state {
            None => KinematicState {
                position,
                timestamp,
                ..KinematicState::default()
            },
            Some(prev) => {
                let dt_ms = timestamp - prev.timestamp;
                if dt_ms < self.sample_interval_ms {
                    return None;
                }
                derive(&prev, position, timestamp, dt_ms / 1000.0)
            }
        };

        self.state = Some(next);
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&next);
        }
        Some(next)
    }

    /// Register a callback invoked with every accepted sample
    pub fn subscribe(&mut self, callback: impl FnMut(&KinematicState) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscriber; returns false if the id was unknown
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Latest accepted state, if any sample has been accepted
    pub fn state(&self) -> Option<KinematicState> {
        self.state
    }

    /// Forget the prior sample (pointer left the page)
    pub fn reset(&mut self) {
        self.state = None;
    }

    /// Alignment between the current direction of travel and a target.
    ///
    /// Dot product of the unit vector toward the target and the unit velocity
    /// vector, in [-1, 1]. Returns 1 when the pointer sits on the target and 0
    /// when the pointer is at rest or no sample has been accepted yet.
    pub fn intention_score(&self, target_x: f64, target_y: f64) -> f64 {
        match &self.state {
            Some(state) => intention_toward(state, Point::new(target_x, target_y)),
            None => 0.0,
        }
    }
}

/// Intention dot product for an explicit state (used by batch scoring snapshots)
pub fn intention_toward(state: &KinematicState, target: Point) -> f64 {
    let dx = target.x - state.position.x;
    let dy = target.y - state.position.y;
    let distance = dx.hypot(dy);
    if distance == 0.0 {
        return 1.0;
    }
    if state.speed == 0.0 {
        return 0.0;
    }
    let dot = (dx / distance) * (state.velocity.x / state.speed)
        + (dy / distance) * (state.velocity.y / state.speed);
    dot.clamp(-1.0, 1.0)
}

fn derive(prev: &KinematicState, position: Point, timestamp: Millis, dt_sec: f64) -> KinematicState {
    let velocity = Vector::new(
        (position.x - prev.position.x) / dt_sec,
        (position.y - prev.position.y) / dt_sec,
    );
    let acceleration = Vector::new(
        (velocity.x - prev.velocity.x) / dt_sec,
        (velocity.y - prev.velocity.y) / dt_sec,
    );
    let speed = velocity.magnitude();

    KinematicState {
        position,
        velocity,
        acceleration,
        direction: velocity.y.atan2(velocity.x),
        speed,
        decelerating: speed < DECELERATION_RATIO * prev.speed,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::f64::consts::PI;
    use std::rc::Rc;

    #[test]
    fn test_first_sample_is_accepted_at_rest() {
        let mut tracker = KinematicsTracker::default();
        let state = tracker.on_pointer_move(10.0, 20.0, 0.0).unwrap();
        assert_eq!(state.position, Point::new(10.0, 20.0));
        assert_eq!(state.speed, 0.0);
        assert!(!state.decelerating);
    }

    #[test]
    fn test_samples_inside_interval_are_dropped() {
        let mut tracker = KinematicsTracker::default();
        tracker.on_pointer_move(0.0, 0.0, 0.0);
        assert!(tracker.on_pointer_move(5.0, 0.0, 10.0).is_none());
        // Dropped sample must not move the reference point
        assert_eq!(tracker.state().unwrap().position, Point::new(0.0, 0.0));
        assert!(tracker.on_pointer_move(5.0, 0.0, 16.0).is_some());
    }

    #[test]
    fn test_velocity_and_direction() {
        let mut tracker = KinematicsTracker::default();
        tracker.on_pointer_move(0.0, 0.0, 0.0);
        let state = tracker.on_pointer_move(0.0, 20.0, 20.0).unwrap();
        assert!((state.velocity.y - 1000.0).abs() < 1e-9);
        assert!((state.speed - 1000.0).abs() < 1e-9);
        assert!((state.direction - PI / 2.0).abs() < 1e-9);
        // From rest to 1000 px/s in 20ms
        assert!((state.acceleration.y - 50_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_deceleration_flag() {
        let mut tracker = KinematicsTracker::default();
        tracker.on_pointer_move(0.0, 0.0, 0.0);
        tracker.on_pointer_move(100.0, 0.0, 100.0);
        let slower = tracker.on_pointer_move(150.0, 0.0, 200.0).unwrap();
        assert!(slower.decelerating);
        let steady = tracker.on_pointer_move(200.0, 0.0, 300.0).unwrap();
        assert!(!steady.decelerating);
    }

    #[test]
    fn test_intention_score_alignment() {
        let mut tracker = KinematicsTracker::default();
        tracker.on_pointer_move(0.0, 0.0, 0.0);
        tracker.on_pointer_move(10.0, 0.0, 100.0);

        assert!((tracker.intention_score(200.0, 0.0) - 1.0).abs() < 1e-9);
        assert!((tracker.intention_score(-200.0, 0.0) + 1.0).abs() < 1e-9);
        assert!(tracker.intention_score(10.0, 200.0).abs() < 1e-9);
        assert_eq!(tracker.intention_score(10.0, 0.0), 1.0);
    }

    #[test]
    fn test_intention_score_at_rest() {
        let mut tracker = KinematicsTracker::default();
        assert_eq!(tracker.intention_score(5.0, 5.0), 0.0);
        tracker.on_pointer_move(0.0, 0.0, 0.0);
        assert_eq!(tracker.intention_score(5.0, 5.0), 0.0);
        assert_eq!(tracker.intention_score(0.0, 0.0), 1.0);
    }

    #[test]
    fn test_subscribers_receive_accepted_samples_only() {
        let mut tracker = KinematicsTracker::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = tracker.subscribe(move |state| sink.borrow_mut().push(state.timestamp));

        tracker.on_pointer_move(0.0, 0.0, 0.0);
        tracker.on_pointer_move(1.0, 0.0, 5.0);
        tracker.on_pointer_move(2.0, 0.0, 20.0);
        assert_eq!(*seen.borrow(), vec![0.0, 20.0]);

        assert!(tracker.unsubscribe(id));
        assert!(!tracker.unsubscribe(id));
        tracker.on_pointer_move(3.0, 0.0, 40.0);
        assert_eq!(seen.borrow().len(), 2);
    }
}
