//! Utility modules
//!
//! Background task spawning, timeouts, and JSON extraction.

pub mod background;
pub mod json;
pub mod timeout;

pub use background::spawn_observed;
pub use json::{extract_json, parse_json};
pub use timeout::{with_timeout, TimeoutError};
