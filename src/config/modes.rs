//! Output format and image quality definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Available chapter output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Loose image files in the title directory.
    Raw,
    /// One zip archive per chapter (default).
    #[default]
    Cbz,
    /// One PDF document per chapter.
    Pdf,
}

impl OutputFormat {
    /// File extension of a chapter-level output, if the format produces one.
    pub fn chapter_extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Raw => None,
            OutputFormat::Cbz => Some("cbz"),
            OutputFormat::Pdf => Some("pdf"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Raw => write!(f, "raw"),
            OutputFormat::Cbz => write!(f, "cbz"),
            OutputFormat::Pdf => write!(f, "pdf"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "cbz" => Ok(OutputFormat::Cbz),
            "pdf" => Ok(OutputFormat::Pdf),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Image quality tier requested from the viewer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    #[default]
    SuperHigh,
    High,
    Low,
}

impl Quality {
    /// Value of the `img_quality` query parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            Quality::SuperHigh => "super_high",
            Quality::High => "high",
            Quality::Low => "low",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "super_high" => Ok(Quality::SuperHigh),
            "high" => Ok(Quality::High),
            "low" => Ok(Quality::Low),
            _ => Err(format!("Unknown image quality: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_round_trips_through_str() {
        for format in [OutputFormat::Raw, OutputFormat::Cbz, OutputFormat::Pdf] {
            assert_eq!(format.to_string().parse::<OutputFormat>().unwrap(), format);
        }
        assert!("epub".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_quality_accepts_dashes() {
        assert_eq!("super-high".parse::<Quality>().unwrap(), Quality::SuperHigh);
        assert_eq!(Quality::Low.as_param(), "low");
    }
}
