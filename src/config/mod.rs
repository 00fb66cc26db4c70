//! Configuration module for mloader.
//!
//! This module handles:
//! - Loading configuration from TOML files and the environment
//! - Output format and quality modes
//! - Configuration and flag validation

pub mod loader;
pub mod modes;
pub mod validation;

pub use loader::{AuthSettings, Config, DiscoveryConfig, OptionsConfig};
pub use modes::{OutputFormat, Quality};
pub use validation::{validate_config, validate_mode_flags, ModeFlags};
