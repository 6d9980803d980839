//! Parsing helpers for inbound event streams
//!
//! Hosts deliver events either as a JSON array or as NDJSON, one event per
//! line. Parse errors carry the offending line number.

use crate::error::EngineError;
use crate::schema::event::{InboundEvent, ValidationError};

/// Adapter for turning serialized event streams into [`InboundEvent`]s
pub struct EventAdapter;

impl EventAdapter {
    /// Parse a JSON string containing an array of events
    pub fn parse_array(json: &str) -> Result<Vec<InboundEvent>, EngineError> {
        let events: Vec<InboundEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse a single event
    pub fn parse_event(json: &str) -> Result<InboundEvent, EngineError> {
        let event: InboundEvent = serde_json::from_str(json.trim())?;
        Ok(event)
    }

    /// Parse NDJSON (newline-delimited JSON) containing events
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<InboundEvent>, EngineError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<InboundEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(EngineError::InvalidEvent(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }

    /// Validate a batch of events, returning only the failures
    pub fn validate_events(events: &[InboundEvent]) -> Vec<ValidationResult> {
        events
            .iter()
            .enumerate()
            .filter_map(|(index, event)| {
                event.validate().err().map(|error| ValidationResult {
                    index,
                    event_type: event.event_type(),
                    error,
                })
            })
            .collect()
    }
}

/// A failed validation within a batch
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub event_type: &'static str,
    pub error: ValidationError,
}
