//! Request priority.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Scheduling priority of a request.
///
/// Totally ordered: `VeryLow < Low < Normal < High < VeryHigh`. A unit of work
/// shared by several requests always runs at the highest priority among them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    VeryLow,
    Low,
    #[default]
    Normal,
    High,
    VeryHigh,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Priority; 5] = [
        Priority::VeryLow,
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::VeryHigh,
    ];

    /// Returns the kebab-case name used in config files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "very-low",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::VeryHigh => "very-high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a priority name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid priority '{0}' - expected one of: very-low, low, normal, high, very-high")]
pub struct PriorityParseError(String);

impl FromStr for Priority {
    type Err = PriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "very-low" | "verylow" => Ok(Self::VeryLow),
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "very-high" | "veryhigh" => Ok(Self::VeryHigh),
            _ => Err(PriorityParseError(s.to_string())),
        }
    }
}
