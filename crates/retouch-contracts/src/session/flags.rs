use std::fmt;

use serde::{Deserialize, Serialize};

/// Display filter applied on top of the edited image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    None,
    Grayscale,
    Sepia,
    Invert,
}

impl FilterType {
    pub const ALL: [FilterType; 4] = [
        FilterType::None,
        FilterType::Grayscale,
        FilterType::Sepia,
        FilterType::Invert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterType::None => "none",
            FilterType::Grayscale => "grayscale",
            FilterType::Sepia => "sepia",
            FilterType::Invert => "invert",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "none" | "off" | "" => Some(FilterType::None),
            "grayscale" | "greyscale" | "gray" | "grey" => Some(FilterType::Grayscale),
            "sepia" => Some(FilterType::Sepia),
            "invert" => Some(FilterType::Invert),
            _ => None,
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlurIntensity {
    Low,
    #[default]
    Medium,
    High,
}

impl BlurIntensity {
    pub fn as_str(self) -> &'static str {
        match self {
            BlurIntensity::Low => "low",
            BlurIntensity::Medium => "medium",
            BlurIntensity::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(BlurIntensity::Low),
            "medium" | "med" => Some(BlurIntensity::Medium),
            "high" => Some(BlurIntensity::High),
            _ => None,
        }
    }
}

impl fmt::Display for BlurIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
