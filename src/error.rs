//! Error types for the mloader application.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Invalid input(s): {}", .0.join("; "))]
    InvalidInputs(Vec<String>),

    // Upstream errors
    #[error("Upstream error ({code}): {message}")]
    Upstream { code: u16, message: String },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Decode error: {0}")]
    Decode(String),

    // Output errors
    #[error("Export error: {0}")]
    Export(String),

    #[error("Invalid filename (path traversal attempt): {0}")]
    InvalidFilename(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    // Bulk mode / tooling
    #[error("Title discovery failed: {0}")]
    Discovery(String),

    #[error("Capture verification failed: {0}")]
    CaptureVerification(String),

    // Run outcome
    #[error("{0} chapter(s) failed")]
    ChaptersFailed(u64),

    #[error("Interrupted by user")]
    Interrupted,

    #[error("Internal error: {0}")]
    Internal(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),

    // URL parsing errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    // Archive writers
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure classification used for retry decisions, reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Usage,
    Validation,
    Upstream,
    Transient,
    Decode,
    Export,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Usage => write!(f, "usage"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Upstream => write!(f, "upstream"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Decode => write!(f, "decode"),
            ErrorKind::Export => write!(f, "export"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl ErrorKind {
    /// Process exit code for failures of this kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Usage => exit_codes::USAGE_ERROR,
            ErrorKind::Validation => exit_codes::VALIDATION_ERROR,
            ErrorKind::Upstream | ErrorKind::Transient | ErrorKind::Decode => {
                exit_codes::EXTERNAL_FAILURE
            }
            ErrorKind::Export | ErrorKind::Internal => exit_codes::INTERNAL_ERROR,
        }
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInputs(_) => ErrorKind::Usage,
            Error::Config(_)
            | Error::Validation { .. }
            | Error::TomlParse(_)
            | Error::UrlParse(_)
            | Error::CaptureVerification(_) => ErrorKind::Validation,
            Error::Upstream { .. } | Error::ChaptersFailed(_) | Error::Interrupted => {
                ErrorKind::Upstream
            }
            Error::Transient(_) | Error::Discovery(_) => ErrorKind::Transient,
            Error::Decode(_) | Error::Protobuf(_) => ErrorKind::Decode,
            Error::Export(_)
            | Error::InvalidFilename(_)
            | Error::Io(_)
            | Error::Zip(_)
            | Error::Pdf(_)
            | Error::Image(_) => ErrorKind::Export,
            Error::Manifest(_) | Error::Json(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the operation that produced this error may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Re-label filesystem and writer failures raised while exporting a chapter.
    pub fn into_export(self) -> Error {
        match self {
            Error::Io(_) | Error::Zip(_) | Error::Pdf(_) | Error::Image(_) => {
                Error::Export(self.to_string())
            }
            other => other,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 429 || status.is_server_error() => {
                Error::Transient(format!("HTTP {}: {}", status, err))
            }
            Some(status) => Error::Upstream {
                code: status.as_u16(),
                message: err.to_string(),
            },
            None => Error::Transient(err.to_string()),
        }
    }
}

/// Process exit codes.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USAGE_ERROR: i32 = 2;
    pub const VALIDATION_ERROR: i32 = 3;
    pub const EXTERNAL_FAILURE: i32 = 4;
    pub const INTERNAL_ERROR: i32 = 5;
}
