//! Link candidate catalog
//!
//! Holds the live set of eligible links with their geometry, visibility and
//! page region. The host's DOM adapter turns mutation and intersection
//! callbacks into [`CatalogEvent`]s; the catalog only ever sees those events.

use crate::normalize::{normalize_url, resolve_href};
use crate::types::{FactorBreakdown, Point, Rect, Region};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Stable identity of a link element, assigned by the DOM adapter
pub type LinkId = u64;

/// Description of a link as reported by the DOM adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkObservation {
    pub id: LinkId,
    pub href: String,
    pub rect: Rect,
    #[serde(default)]
    pub region: Region,
}

/// Reconciliation event produced by the DOM adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CatalogEvent {
    Upsert(LinkObservation),
    Remove { id: LinkId },
    /// Full structural reconciliation: anything not listed is removed
    Snapshot { links: Vec<LinkObservation> },
    /// Viewport intersection change
    Visibility {
        id: LinkId,
        visible: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rect: Option<Rect>,
    },
}

/// A link eligible for speculative preparation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateLink {
    pub id: LinkId,
    /// Normalized URL (dedup key)
    pub url: String,
    pub rect: Rect,
    pub visible: bool,
    pub region: Region,
    /// Catalog insertion order, used as the ranking tie-breaker
    pub sequence: u64,
    pub last_score: Option<f64>,
    pub last_factors: Option<FactorBreakdown>,
}

/// Live catalog of link candidates
#[derive(Debug, Default)]
pub struct LinkCatalog {
    links: HashMap<LinkId, CandidateLink>,
    next_sequence: u64,
    /// Page URL that relative hrefs resolve against
    base_url: Option<String>,
}

impl LinkCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page URL used to resolve relative hrefs
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = Some(base_url.into());
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Apply one reconciliation event
    pub fn apply(&mut self, event: CatalogEvent) {
        match event {
            CatalogEvent::Upsert(observation) => self.upsert(observation),
            CatalogEvent::Remove { id } => {
                self.links.remove(&id);
            }
            CatalogEvent::Snapshot { links } => {
                let keep: Vec<LinkId> = links.iter().map(|l| l.id).collect();
                self.links.retain(|id, _| keep.contains(id));
                for observation in links {
                    self.upsert(observation);
                }
            }
            CatalogEvent::Visibility { id, visible, rect } => {
                if let Some(link) = self.links.get_mut(&id) {
                    link.visible = visible;
                    if let Some(rect) = rect {
                        link.rect = rect;
                    }
                }
            }
        }
    }

    fn upsert(&mut self, observation: LinkObservation) {
        let resolved = match &self.base_url {
            Some(base) => resolve_href(base, &observation.href),
            None => normalize_url(&observation.href),
        };
        let url = match resolved {
            Ok(url) => url,
            Err(_) => {
                debug!(link_id = observation.id, href = %observation.href, "excluding unparseable link");
                self.links.remove(&observation.id);
                return;
            }
        };

        match self.links.get_mut(&observation.id) {
            Some(existing) => {
                if existing.url != url {
                    existing.last_score = None;
                    existing.last_factors = None;
                }
                existing.url = url;
                existing.rect = observation.rect;
                existing.region = observation.region;
            }
            None => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                self.links.insert(
                    observation.id,
                    CandidateLink {
                        id: observation.id,
                        url,
                        rect: observation.rect,
                        // Newly observed links count as visible until the
                        // intersection observer says otherwise
                        visible: true,
                        region: observation.region,
                        sequence,
                        last_score: None,
                        last_factors: None,
                    },
                );
            }
        }
    }

    pub fn get(&self, id: LinkId) -> Option<&CandidateLink> {
        self.links.get(&id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Normalized URLs of every candidate, visible or not
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.links.values().map(|link| link.url.as_str())
    }

    /// Visible candidates whose center lies within `radius` of `cursor`,
    /// in insertion order
    pub fn nearby(&self, cursor: Point, radius: f64) -> Vec<&CandidateLink> {
        let mut nearby: Vec<&CandidateLink> = self
            .links
            .values()
            .filter(|link| link.visible && link.rect.center().distance_to(cursor) <= radius)
            .collect();
        nearby.sort_by_key(|link| link.sequence);
        nearby
    }

    /// Replace geometry for one candidate (fresh layout read near the cursor)
    pub fn refresh_geometry(&mut self, id: LinkId, rect: Rect) {
        if let Some(link) = self.links.get_mut(&id) {
            link.rect = rect;
        }
    }

    /// Record the latest score and breakdown on the candidate
    pub fn record_score(&mut self, id: LinkId, score: f64, factors: FactorBreakdown) {
        if let Some(link) = self.links.get_mut(&id) {
            link.last_score = Some(score);
            link.last_factors = Some(factors);
        }
    }

    /// All candidates in insertion order
    pub fn iter_ordered(&self) -> Vec<&CandidateLink> {
        let mut all: Vec<&CandidateLink> = self.links.values().collect();
        all.sort_by_key(|link| link.sequence);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(id: LinkId, href: &str, x: f64, y: f64) -> LinkObservation {
        LinkObservation {
            id,
            href: href.to_string(),
            rect: Rect::centered(Point::new(x, y), 40.0, 20.0),
            region: Region::Main,
        }
    }

    #[test]
    fn test_upsert_normalizes_and_keeps_sequence() {
        let mut catalog = LinkCatalog::new();
        catalog.apply(CatalogEvent::Upsert(observation(1, "https://a.com/x/#frag", 0.0, 0.0)));
        catalog.apply(CatalogEvent::Upsert(observation(2, "https://a.com/y", 0.0, 0.0)));
        catalog.apply(CatalogEvent::Upsert(observation(1, "https://a.com/x", 50.0, 0.0)));

        let first = catalog.get(1).unwrap();
        assert_eq!(first.url, "https://a.com/x");
        assert_eq!(first.sequence, 0);
        assert_eq!(first.rect.center(), Point::new(50.0, 0.0));
        assert_eq!(catalog.get(2).unwrap().sequence, 1);
    }

    #[test]
    fn test_unparseable_links_are_excluded() {
        let mut catalog = LinkCatalog::new();
        catalog.apply(CatalogEvent::Upsert(observation(1, "javascript:void(0)", 0.0, 0.0)));
        assert!(catalog.is_empty());

        catalog.apply(CatalogEvent::Upsert(observation(2, "https://a.com/", 0.0, 0.0)));
        catalog.apply(CatalogEvent::Upsert(observation(2, "not a url", 0.0, 0.0)));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_snapshot_removes_missing_links() {
        let mut catalog = LinkCatalog::new();
        catalog.apply(CatalogEvent::Upsert(observation(1, "https://a.com/1", 0.0, 0.0)));
        catalog.apply(CatalogEvent::Upsert(observation(2, "https://a.com/2", 0.0, 0.0)));
        catalog.apply(CatalogEvent::Snapshot {
            links: vec![
                observation(2, "https://a.com/2", 0.0, 0.0),
                observation(3, "https://a.com/3", 0.0, 0.0),
            ],
        });

        assert!(catalog.get(1).is_none());
        assert_eq!(catalog.get(2).unwrap().sequence, 1);
        assert_eq!(catalog.get(3).unwrap().sequence, 2);
    }

    #[test]
    fn test_nearby_filters_visibility_and_radius() {
        let mut catalog = LinkCatalog::new();
        catalog.apply(CatalogEvent::Upsert(observation(1, "https://a.com/near", 100.0, 0.0)));
        catalog.apply(CatalogEvent::Upsert(observation(2, "https://a.com/far", 900.0, 0.0)));
        catalog.apply(CatalogEvent::Upsert(observation(3, "https://a.com/hidden", 50.0, 0.0)));
        catalog.apply(CatalogEvent::Visibility {
            id: 3,
            visible: false,
            rect: None,
        });

        let nearby: Vec<LinkId> = catalog
            .nearby(Point::new(0.0, 0.0), 500.0)
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(nearby, vec![1]);
    }

    #[test]
    fn test_visibility_refreshes_geometry() {
        let mut catalog = LinkCatalog::new();
        catalog.apply(CatalogEvent::Upsert(observation(1, "https://a.com/", 0.0, 0.0)));
        let rect = Rect::new(10.0, 10.0, 5.0, 5.0);
        catalog.apply(CatalogEvent::Visibility {
            id: 1,
            visible: true,
            rect: Some(rect),
        });
        assert_eq!(catalog.get(1).unwrap().rect, rect);
    }

    #[test]
    fn test_relative_hrefs_resolve_against_base() {
        let mut catalog = LinkCatalog::new();
        catalog.apply(CatalogEvent::Upsert(observation(1, "/pricing", 0.0, 0.0)));
        assert!(catalog.is_empty());

        catalog.set_base_url("https://shop.example.com/products/list");
        catalog.apply(CatalogEvent::Upsert(observation(1, "/pricing", 0.0, 0.0)));
        catalog.apply(CatalogEvent::Upsert(observation(2, "item?id=4", 0.0, 0.0)));
        assert_eq!(catalog.get(1).unwrap().url, "https://shop.example.com/pricing");
        assert_eq!(catalog.get(2).unwrap().url, "https://shop.example.com/products/item?id=4");
    }
}
