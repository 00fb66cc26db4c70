//! Configuration and flag-combination validation.

use crate::config::loader::Config;
use crate::error::{Error, Result};

/// Upper bound of upstream numeric identifiers.
pub const MAX_ID: u32 = 2_147_483_647;

/// Upper bound of retries for one transient failure.
pub const MAX_RETRIES: u32 = 10;

/// Flags that only make sense together, checked before any work starts.
#[derive(Debug, Clone, Default)]
pub struct ModeFlags {
    pub all: bool,
    pub list_only: bool,
    pub has_languages: bool,
    pub verify_capture_schema: bool,
    pub verify_capture_baseline: bool,
}

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_range(config.options.begin, config.options.end)?;
    validate_limits(config)?;
    validate_discovery(config)?;
    Ok(())
}

/// Validate `--begin`/`--end`.
pub fn validate_range(begin: u32, end: Option<u32>) -> Result<()> {
    if let Some(end) = end {
        if begin > end {
            return Err(Error::Validation {
                field: "begin".to_string(),
                message: format!("--begin ({}) must not exceed --end ({})", begin, end),
            });
        }
    }
    Ok(())
}

fn validate_limits(config: &Config) -> Result<()> {
    if config.options.request_timeout_secs == 0 {
        return Err(Error::Validation {
            field: "request_timeout_secs".to_string(),
            message: "Request timeout must be at least 1 second".to_string(),
        });
    }

    if config.options.max_retries > MAX_RETRIES {
        return Err(Error::Validation {
            field: "max_retries".to_string(),
            message: format!("At most {} retries are allowed", MAX_RETRIES),
        });
    }

    Ok(())
}

fn validate_discovery(config: &Config) -> Result<()> {
    if config.discovery.id_length == Some(0) {
        return Err(Error::Validation {
            field: "id_length".to_string(),
            message: "--id-length must be a positive digit count".to_string(),
        });
    }

    for page in &config.discovery.pages {
        url::Url::parse(page).map_err(|e| Error::Validation {
            field: "page".to_string(),
            message: format!("'{}' is not a valid URL: {}", page, e),
        })?;
    }

    url::Url::parse(&config.discovery.title_index_endpoint).map_err(|e| Error::Validation {
        field: "title_index_endpoint".to_string(),
        message: format!("{}", e),
    })?;

    Ok(())
}

/// Reject flag combinations that need a companion flag.
pub fn validate_mode_flags(flags: &ModeFlags) -> Result<()> {
    if flags.list_only && !flags.all {
        return Err(Error::Validation {
            field: "list_only".to_string(),
            message: "--list-only requires --all.".to_string(),
        });
    }

    if flags.has_languages && !flags.all {
        return Err(Error::Validation {
            field: "language".to_string(),
            message: "--language requires --all.".to_string(),
        });
    }

    if flags.verify_capture_baseline && !flags.verify_capture_schema {
        return Err(Error::Validation {
            field: "verify_capture_baseline".to_string(),
            message: "--verify-capture-baseline requires --verify-capture-schema.".to_string(),
        });
    }

    Ok(())
}

/// Check that an identifier fits the upstream id space.
pub fn validate_id(field: &str, id: u32) -> Result<u32> {
    if id == 0 || id > MAX_ID {
        return Err(Error::Validation {
            field: field.to_string(),
            message: format!("{} is outside the valid id range 1..={}", id, MAX_ID),
        });
    }
    Ok(id)
}
