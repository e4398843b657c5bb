//! Configuration management module
//!
//! Loads and validates settings from environment variables and .env files.

pub mod settings;

pub use settings::{Environment, Settings};
