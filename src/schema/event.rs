//! hoverfetch.event.v1 inbound event schema
//!
//! Everything the host tells the engine arrives as one of these events:
//! pointer and scroll samples, DOM reconciliation, device telemetry, learning
//! store resolutions, mode changes and navigations. Events are JSON objects
//! tagged by `type`.

use crate::catalog::{CatalogEvent, LinkId, LinkObservation};
use crate::governor::EffectiveType;
use crate::types::{Millis, Rect};
use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: &str = "hoverfetch.event.v1";

/// One inbound event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Raw pointer sample in viewport coordinates
    PointerMove { x: f64, y: f64, timestamp: Millis },
    /// Vertical scroll offset sample
    Scroll { offset_y: f64, timestamp: Millis },
    Viewport { width: f64, height: f64 },
    LinkUpsert(LinkObservation),
    LinkRemove { id: LinkId },
    /// Full reconciliation of the link set
    LinkSnapshot { links: Vec<LinkObservation> },
    /// Viewport intersection change for one link
    Intersection {
        id: LinkId,
        visible: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rect: Option<Rect>,
    },
    Battery {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        charging: Option<bool>,
        /// 0.0-1.0
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<f64>,
    },
    Network {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        effective_type: Option<EffectiveType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        downlink_mbps: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        save_data: Option<bool>,
    },
    /// Memory budget usage pushed by the host (0.0-1.0)
    Memory { used_fraction: f64, timestamp: Millis },
    /// Learning store answer for a pending lookup (0-100)
    HistoryResolved { url: String, score: f64 },
    SetMode { mode: String },
    /// The user navigated; `load_time_ms` is the observed page load time
    Navigation {
        url: String,
        load_time_ms: f64,
        timestamp: Millis,
    },
    /// Clock advance with no other input
    Tick { timestamp: Millis },
}

impl InboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            InboundEvent::PointerMove { .. } => "pointer_move",
            InboundEvent::Scroll { .. } => "scroll",
            InboundEvent::Viewport { .. } => "viewport",
            InboundEvent::LinkUpsert(_) => "link_upsert",
            InboundEvent::LinkRemove { .. } => "link_remove",
            InboundEvent::LinkSnapshot { .. } => "link_snapshot",
            InboundEvent::Intersection { .. } => "intersection",
            InboundEvent::Battery { .. } => "battery",
            InboundEvent::Network { .. } => "network",
            InboundEvent::Memory { .. } => "memory",
            InboundEvent::HistoryResolved { .. } => "history_resolved",
            InboundEvent::SetMode { .. } => "set_mode",
            InboundEvent::Navigation { .. } => "navigation",
            InboundEvent::Tick { .. } => "tick",
        }
    }

    /// Host clock reading carried by the event, if any
    pub fn timestamp(&self) -> Option<Millis> {
        match self {
            InboundEvent::PointerMove { timestamp, .. }
            | InboundEvent::Scroll { timestamp, .. }
            | InboundEvent::Memory { timestamp, .. }
            | InboundEvent::Navigation { timestamp, .. }
            | InboundEvent::Tick { timestamp } => Some(*timestamp),
            _ => None,
        }
    }

    /// DOM reconciliation events map onto catalog events
    pub fn as_catalog_event(&self) -> Option<CatalogEvent> {
        match self {
            InboundEvent::LinkUpsert(link) => Some(CatalogEvent::Upsert(link.clone())),
            InboundEvent::LinkRemove { id } => Some(CatalogEvent::Remove { id: *id }),
            InboundEvent::LinkSnapshot { links } => Some(CatalogEvent::Snapshot {
                links: links.clone(),
            }),
            InboundEvent::Intersection { id, visible, rect } => Some(CatalogEvent::Visibility {
                id: *id,
                visible: *visible,
                rect: *rect,
            }),
            _ => None,
        }
    }

    /// Check field ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(timestamp) = self.timestamp() {
            check_finite("timestamp", timestamp)?;
            check_range("timestamp", timestamp, 0.0, f64::MAX)?;
        }
        match self {
            InboundEvent::PointerMove { x, y, .. } => {
                check_finite("x", *x)?;
                check_finite("y", *y)
            }
            InboundEvent::Scroll { offset_y, .. } => check_finite("offset_y", *offset_y),
            InboundEvent::Viewport { width, height } => {
                check_positive("width", *width)?;
                check_positive("height", *height)
            }
            InboundEvent::LinkUpsert(link) => check_link(link),
            InboundEvent::LinkSnapshot { links } => links.iter().try_for_each(check_link),
            InboundEvent::Intersection { rect, .. } => match rect {
                Some(rect) => check_rect(rect),
                None => Ok(()),
            },
            InboundEvent::Battery { level, .. } => match level {
                Some(level) => check_range("level", *level, 0.0, 1.0),
                None => Ok(()),
            },
            InboundEvent::Network { downlink_mbps, .. } => match downlink_mbps {
                Some(downlink) => check_range("downlink_mbps", *downlink, 0.0, f64::MAX),
                None => Ok(()),
            },
            InboundEvent::Memory { used_fraction, .. } => {
                check_range("used_fraction", *used_fraction, 0.0, 1.0)
            }
            InboundEvent::HistoryResolved { url, score } => {
                check_non_empty("url", url)?;
                check_range("score", *score, 0.0, 100.0)
            }
            InboundEvent::Navigation {
                url, load_time_ms, ..
            } => {
                check_non_empty("url", url)?;
                check_range("load_time_ms", *load_time_ms, 0.0, f64::MAX)
            }
            // Unknown mode names are ignored by the governor, not rejected here
            InboundEvent::SetMode { .. }
            | InboundEvent::LinkRemove { .. }
            | InboundEvent::Tick { .. } => Ok(()),
        }
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite { field })
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    check_finite(field, value)?;
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    check_finite(field, value)?;
    if value <= 0.0 {
        return Err(ValidationError::NotPositive { field, value });
    }
    Ok(())
}

fn check_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(())
}

fn check_rect(rect: &Rect) -> Result<(), ValidationError> {
    check_finite("rect.x", rect.x)?;
    check_finite("rect.y", rect.y)?;
    check_range("rect.width", rect.width, 0.0, f64::MAX)?;
    check_range("rect.height", rect.height, 0.0, f64::MAX)
}

fn check_link(link: &LinkObservation) -> Result<(), ValidationError> {
    check_non_empty("href", &link.href)?;
    check_rect(&link.rect)
}

/// Validation errors for inbound events
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field {field} must be a finite number")]
    NonFinite { field: &'static str },

    #[error("Field {field} is {value}, expected {min} to {max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Field {field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("Field {field} must not be empty")]
    Empty { field: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Point, Region};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_pointer_move() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"type":"pointer_move","x":10,"y":20.5,"timestamp":16}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::PointerMove {
                x: 10.0,
                y: 20.5,
                timestamp: 16.0
            }
        );
        assert_eq!(event.event_type(), "pointer_move");
        assert_eq!(event.timestamp(), Some(16.0));
    }

    #[test]
    fn test_parse_link_upsert_flattened() {
        let json = r#"{"type":"link_upsert","id":7,"href":"/docs","rect":{"x":0,"y":0,"width":40,"height":20},"region":"main"}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        let expected = LinkObservation {
            id: 7,
            href: "/docs".to_string(),
            rect: Rect::centered(Point::new(20.0, 10.0), 40.0, 20.0),
            region: Region::Main,
        };
        assert_eq!(event, InboundEvent::LinkUpsert(expected.clone()));
        assert_eq!(event.as_catalog_event(), Some(CatalogEvent::Upsert(expected)));
    }

    #[test]
    fn test_network_fields_are_optional() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"type":"network","effective_type":"3g"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Network {
                effective_type: Some(EffectiveType::ThreeG),
                downlink_mbps: None,
                save_data: None,
            }
        );
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_validate_ranges() {
        let battery = InboundEvent::Battery {
            charging: None,
            level: Some(1.5),
        };
        assert!(matches!(
            battery.validate(),
            Err(ValidationError::OutOfRange { field: "level", .. })
        ));

        let pointer = InboundEvent::PointerMove {
            x: f64::NAN,
            y: 0.0,
            timestamp: 0.0,
        };
        assert_eq!(pointer.validate(), Err(ValidationError::NonFinite { field: "x" }));

        let viewport = InboundEvent::Viewport {
            width: 0.0,
            height: 10.0,
        };
        assert!(matches!(
            viewport.validate(),
            Err(ValidationError::NotPositive { field: "width", .. })
        ));
    }

    #[test]
    fn test_unknown_mode_passes_validation() {
        for mode in ["warp", "eco"] {
            let event = InboundEvent::SetMode {
                mode: mode.to_string(),
            };
            assert!(event.validate().is_ok());
        }
    }
}
