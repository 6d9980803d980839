//! Bounded, insertion-ordered pool of heavy directives
//!
//! Holds the prefetch/prerender directives currently in force. Inserting at
//! capacity evicts the earliest entry. Entries older than the TTL are purged
//! on the next mutation; there is no background timer.

use crate::types::{DirectiveType, Millis, SpeculativeDirective};
use std::collections::VecDeque;

/// Directives pushed out of the pool by one mutation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolMutation {
    /// Removed because they outlived the TTL
    pub expired: Vec<SpeculativeDirective>,
    /// Removed to make room at capacity
    pub evicted: Vec<SpeculativeDirective>,
}

impl PoolMutation {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.evicted.is_empty()
    }

    /// Every removed directive, expired first
    pub fn into_removed(self) -> impl Iterator<Item = SpeculativeDirective> {
        self.expired.into_iter().chain(self.evicted)
    }
}

#[derive(Debug, Clone)]
pub struct DirectivePool {
    capacity: usize,
    ttl_ms: Millis,
    entries: VecDeque<SpeculativeDirective>,
}

impl DirectivePool {
    pub fn new(capacity: usize, ttl_ms: Millis) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl_ms,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl_ms(&self) -> Millis {
        self.ttl_ms
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_live(&self, directive: &SpeculativeDirective, now: Millis) -> bool {
        directive.age(now) <= self.ttl_ms
    }

    /// Remove every entry older than the TTL
    pub fn purge_expired(&mut self, now: Millis) -> Vec<SpeculativeDirective> {
        let ttl = self.ttl_ms;
        let mut expired = Vec::new();
        self.entries.retain(|d| {
            let live = d.age(now) <= ttl;
            if !live {
                expired.push(d.clone());
            }
            live
        });
        expired
    }

    /// Insert a directive, purging expired entries and evicting the earliest
    /// ones until there is room
    pub fn insert(&mut self, directive: SpeculativeDirective, now: Millis) -> PoolMutation {
        let expired = self.purge_expired(now);
        let mut evicted = Vec::new();
        while self.entries.len() >= self.capacity {
            match self.entries.pop_front() {
                Some(oldest) => evicted.push(oldest),
                None => break,
            }
        }
        self.entries.push_back(directive);
        PoolMutation { expired, evicted }
    }

    /// Remove the entry for `url`, if present
    pub fn remove_url(&mut self, url: &str) -> Option<SpeculativeDirective> {
        let index = self.entries.iter().position(|d| d.url == url)?;
        self.entries.remove(index)
    }

    /// Unexpired entries of one type
    pub fn active_count(&self, directive_type: DirectiveType, now: Millis) -> usize {
        self.entries
            .iter()
            .filter(|d| d.directive_type == directive_type && self.is_live(d, now))
            .count()
    }

    /// Entries in insertion order, including any not yet purged
    pub fn iter(&self) -> impl Iterator<Item = &SpeculativeDirective> {
        self.entries.iter()
    }

    /// Replace contents from persisted state, keeping insertion order and
    /// dropping anything already expired or beyond capacity
    pub fn restore(&mut self, directives: Vec<SpeculativeDirective>, now: Millis) {
        self.entries = directives
            .into_iter()
            .filter(|d| d.directive_type.is_heavy() && d.age(now) <= self.ttl_ms)
            .collect();
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prefetch(url: &str, ts: Millis) -> SpeculativeDirective {
        SpeculativeDirective::new(DirectiveType::Prefetch, url, ts)
    }

    #[test]
    fn test_eleventh_insert_evicts_earliest() {
        let mut pool = DirectivePool::new(10, 60_000.0);
        for i in 0..10 {
            let mutation = pool.insert(prefetch(&format!("https://a.com/{i}"), i as f64), 10.0);
            assert!(mutation.is_empty());
        }
        let mutation = pool.insert(prefetch("https://a.com/10", 10.0), 10.0);
        assert_eq!(mutation.evicted, vec![prefetch("https://a.com/0", 0.0)]);
        assert_eq!(pool.len(), 10);
        assert_eq!(pool.iter().next().unwrap().url, "https://a.com/1");
    }

    #[test]
    fn test_expired_entries_purged_on_mutation_only() {
        let mut pool = DirectivePool::new(10, 60_000.0);
        pool.insert(prefetch("https://a.com/old", 0.0), 0.0);
        pool.insert(prefetch("https://a.com/new", 30_000.0), 30_000.0);

        // Reads ignore the stale entry but do not remove it
        assert_eq!(pool.active_count(DirectiveType::Prefetch, 61_000.0), 1);
        assert_eq!(pool.len(), 2);

        let mutation = pool.insert(prefetch("https://a.com/next", 61_000.0), 61_000.0);
        assert_eq!(mutation.expired, vec![prefetch("https://a.com/old", 0.0)]);
        assert!(mutation.evicted.is_empty());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_purge_returns_expired_and_keeps_live_order() {
        let mut pool = DirectivePool::new(10, 1_000.0);
        pool.insert(prefetch("https://a.com/1", 0.0), 0.0);
        pool.insert(prefetch("https://a.com/2", 500.0), 500.0);
        pool.insert(prefetch("https://a.com/3", 100.0), 500.0);
        pool.insert(prefetch("https://a.com/4", 900.0), 900.0);

        let expired = pool.purge_expired(1_200.0);
        assert_eq!(
            expired,
            vec![prefetch("https://a.com/1", 0.0), prefetch("https://a.com/3", 100.0)]
        );
        let urls: Vec<&str> = pool.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/2", "https://a.com/4"]);

        // Exactly at the TTL is still live
        assert!(pool.purge_expired(1_500.0).is_empty());
    }

    #[test]
    fn test_remove_url_keeps_order() {
        let mut pool = DirectivePool::new(10, 60_000.0);
        pool.insert(prefetch("https://a.com/1", 0.0), 0.0);
        pool.insert(prefetch("https://a.com/2", 1.0), 1.0);
        pool.insert(prefetch("https://a.com/3", 2.0), 2.0);

        assert!(pool.remove_url("https://a.com/2").is_some());
        assert!(pool.remove_url("https://a.com/2").is_none());
        let urls: Vec<&str> = pool.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/1", "https://a.com/3"]);
    }

    #[test]
    fn test_restore_drops_expired_and_light_hints() {
        let mut pool = DirectivePool::new(2, 60_000.0);
        pool.restore(
            vec![
                prefetch("https://a.com/stale", 0.0),
                SpeculativeDirective::new(DirectiveType::Preconnect, "https://a.com/p", 70_000.0),
                prefetch("https://a.com/1", 70_000.0),
                prefetch("https://a.com/2", 71_000.0),
                prefetch("https://a.com/3", 72_000.0),
            ],
            80_000.0,
        );
        let urls: Vec<&str> = pool.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/2", "https://a.com/3"]);
    }
}
