//! Inbound hoverfetch.event.v1 schema
//!
//! This module defines the host-facing event format and the helpers that
//! parse and validate event streams.

mod adapter;
mod event;

pub use adapter::*;
pub use event::*;
