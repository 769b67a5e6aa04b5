use std::fmt::Display;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use mzspot::{RetentionType, SmoothingMethod, Technology};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgTechnology {
    /// Gas chromatography with electron ionization
    GcMs,
    #[default]
    /// Liquid chromatography with electrospray ionization
    LcMs,
    /// Liquid chromatography with ion mobility separation
    ImMs,
}

impl From<ArgTechnology> for Technology {
    fn from(value: ArgTechnology) -> Self {
        match value {
            ArgTechnology::GcMs => Technology::GcMs,
            ArgTechnology::LcMs => Technology::LcMs,
            ArgTechnology::ImMs => Technology::ImMs,
        }
    }
}

impl Display for ArgTechnology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Technology::from(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgRetentionType {
    /// Align on retention time
    Rt,
    /// Align on retention index, GC-MS only
    Ri,
}

impl From<ArgRetentionType> for RetentionType {
    fn from(value: ArgRetentionType) -> Self {
        match value {
            ArgRetentionType::Rt => RetentionType::RT,
            ArgRetentionType::Ri => RetentionType::RI,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgSmoothingMethod {
    None,
    /// Simple moving average
    Sma,
    /// Linear weighted moving average
    Lwma,
    SavitzkyGolay,
}

impl From<ArgSmoothingMethod> for SmoothingMethod {
    fn from(value: ArgSmoothingMethod) -> Self {
        match value {
            ArgSmoothingMethod::None => SmoothingMethod::None,
            ArgSmoothingMethod::Sma => SmoothingMethod::SimpleMovingAverage,
            ArgSmoothingMethod::Lwma => SmoothingMethod::LinearWeightedMovingAverage,
            ArgSmoothingMethod::SavitzkyGolay => SmoothingMethod::SavitzkyGolay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// One row per spot, tab separated, with one height column per file
    Tsv,
    /// The complete spot records
    Json,
}

impl OutputFormat {
    /// Infer the format from a path's extension, looking through a trailing `.gz`.
    /// Returns the format and whether the output should be compressed.
    pub fn infer_from_path(path: &Path) -> Option<(Self, bool)> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        let (name, compressed) = match name.strip_suffix(".gz") {
            Some(stem) => (stem.to_string(), true),
            None => (name, false),
        };
        if name.ends_with(".tsv") || name.ends_with(".txt") {
            Some((Self::Tsv, compressed))
        } else if name.ends_with(".json") {
            Some((Self::Json, compressed))
        } else {
            None
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_infer_output_format() {
        assert_eq!(
            OutputFormat::infer_from_path(Path::new("out/spots.tsv")),
            Some((OutputFormat::Tsv, false))
        );
        assert_eq!(
            OutputFormat::infer_from_path(Path::new("spots.JSON.gz")),
            Some((OutputFormat::Json, true))
        );
        assert_eq!(OutputFormat::infer_from_path(Path::new("spots.mzML")), None);
    }
}
