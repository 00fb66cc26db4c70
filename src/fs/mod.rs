//! Filesystem module.
//!
//! Provides:
//! - Path and directory management
//! - Filename escaping and sanitization

pub mod naming;
pub mod paths;

pub use naming::{escape_path, fix_mojibake, sanitize_path_component, title_case, title_dir_name};
pub use paths::{ensure_dir, title_directory, write_atomic};
