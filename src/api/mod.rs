//! MangaPlus API module.
//!
//! This module provides:
//! - HTTP client for the MangaPlus binary API
//! - Protobuf response types
//! - Payload capture and capture verification

pub mod capture;
pub mod client;
pub mod types;
pub mod verify;

pub use capture::{CaptureMetadata, PayloadCapture};
pub use client::{decode_success, MangaApi, MangaPlusApi, TitleListing};
pub use verify::{
    verify_capture_schema, verify_capture_schema_against_baseline, CaptureVerificationSummary,
};
