//! Alignment parameters and their validation
use std::fmt::Display;

use crate::chrom::ChromXType;
use crate::error::AlignmentError;
use crate::interval::SimpleInterval;
use crate::retention_index::RiCompoundType;
use crate::similarity::SpectrumSimilarityParams;
use crate::smoothing::SmoothingMethod;

/// The instrument technology an alignment runs for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Technology {
    #[default]
    GcMs,
    LcMs,
    ImMs,
}

impl Display for Technology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Technology::GcMs => "GC-MS",
            Technology::LcMs => "LC-MS",
            Technology::ImMs => "IM-MS",
        };
        f.write_str(s)
    }
}

/// The retention axis used to align peaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RetentionType {
    #[default]
    RT,
    RI,
}

impl RetentionType {
    pub fn axis(&self) -> ChromXType {
        match self {
            RetentionType::RT => ChromXType::RT,
            RetentionType::RI => ChromXType::RI,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IonMode {
    #[default]
    Positive,
    Negative,
}

/// Everything that controls one alignment run.
///
/// Tolerances are absolute: m/z in Da, retention time in minutes, retention
/// index in index units and drift in the drift axis' unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AlignmentParameters {
    pub retention_type: RetentionType,
    pub ri_compound_type: RiCompoundType,
    pub ion_mode: IonMode,

    pub mz_tolerance: f64,
    pub rt_tolerance: f64,
    pub ri_tolerance: f64,
    pub drift_tolerance: f64,

    /// Fragment matching tolerance used when comparing spectra, in Da
    pub spectrum_tolerance: f64,
    /// The minimum weighted dot product for two GC-MS peaks to be the same species
    pub min_spectrum_similarity: f64,
    /// Whether LC-MS peaks with MS/MS spectra must also agree spectrally
    pub use_ms2_similarity: bool,

    /// The file whose peaks seed the alignment, if not the one with the most peaks
    pub reference_file_id: Option<usize>,
    /// Multiplies the peak width to get the half width of the joiner's search window
    pub window_multiplier: f64,
    /// Spots detected in fewer than this fraction of files are reported but kept
    pub min_fill_percentage: f64,

    pub clean_mass_tolerance: f64,
    pub clean_alkane_ri_tolerance: f64,
    pub clean_fiehn_ri_tolerance: f64,
    pub clean_rt_tolerance: f64,

    pub smoothing_method: SmoothingMethod,
    pub smoothing_level: usize,
    /// The full width of the m/z slice extracted during gap filling, in Da
    pub mass_slice_width: f64,
    /// The scan mass range, used to filter quant mass candidates and spectra
    pub mass_range: SimpleInterval<f64>,
    /// Take the quant mass from the library reference of the identified compound
    pub replace_quant_mass_by_library: bool,
    /// Take the quant mass from the base peak of the representative spectrum
    pub use_representative_base_peak: bool,

    /// The size of the worker pool, `None` uses the ambient pool
    pub max_threads: Option<usize>,
}

impl Default for AlignmentParameters {
    fn default() -> Self {
        Self::for_technology(Technology::GcMs)
    }
}

impl AlignmentParameters {
    /// The conventional defaults for `technology`
    pub fn for_technology(technology: Technology) -> Self {
        let common = Self {
            retention_type: RetentionType::RT,
            ri_compound_type: RiCompoundType::Alkanes,
            ion_mode: IonMode::Positive,
            mz_tolerance: 0.5,
            rt_tolerance: 0.075,
            ri_tolerance: 20.0,
            drift_tolerance: 0.002,
            spectrum_tolerance: 0.5,
            min_spectrum_similarity: 0.7,
            use_ms2_similarity: false,
            reference_file_id: None,
            window_multiplier: 1.0,
            min_fill_percentage: 0.0,
            clean_mass_tolerance: 0.5,
            clean_alkane_ri_tolerance: 2.5,
            clean_fiehn_ri_tolerance: 1000.0,
            clean_rt_tolerance: 0.025,
            smoothing_method: SmoothingMethod::LinearWeightedMovingAverage,
            smoothing_level: 1,
            mass_slice_width: 0.5,
            mass_range: SimpleInterval::new(50.0, 1000.0),
            replace_quant_mass_by_library: false,
            use_representative_base_peak: false,
            max_threads: None,
        };
        match technology {
            Technology::GcMs => common,
            Technology::LcMs | Technology::ImMs => Self {
                mz_tolerance: 0.015,
                rt_tolerance: 0.1,
                spectrum_tolerance: 0.05,
                min_spectrum_similarity: 0.5,
                clean_mass_tolerance: 0.015,
                mass_slice_width: 0.02,
                mass_range: SimpleInterval::new(50.0, 2000.0),
                ..common
            },
        }
    }

    /// The tolerance along the retention axis used for matching
    pub fn retention_tolerance(&self) -> f64 {
        match self.retention_type {
            RetentionType::RT => self.rt_tolerance,
            RetentionType::RI => self.ri_tolerance,
        }
    }

    /// The tolerance along the retention axis used when removing duplicate spots
    pub fn clean_retention_tolerance(&self) -> f64 {
        match (self.retention_type, self.ri_compound_type) {
            (RetentionType::RT, _) => self.clean_rt_tolerance,
            (RetentionType::RI, RiCompoundType::Alkanes) => self.clean_alkane_ri_tolerance,
            (RetentionType::RI, RiCompoundType::Fames) => self.clean_fiehn_ri_tolerance,
        }
    }

    pub fn spectrum_similarity_params(&self) -> SpectrumSimilarityParams {
        SpectrumSimilarityParams::new(self.spectrum_tolerance, self.mass_range, 0.0)
    }

    /// Check every constraint on the parameters, reporting the first violated one
    pub fn validate(&self, technology: Technology) -> Result<(), AlignmentError> {
        let positive = [
            ("mz_tolerance", self.mz_tolerance),
            ("rt_tolerance", self.rt_tolerance),
            ("spectrum_tolerance", self.spectrum_tolerance),
            ("window_multiplier", self.window_multiplier),
            ("clean_mass_tolerance", self.clean_mass_tolerance),
            ("mass_slice_width", self.mass_slice_width),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(AlignmentError::invalid_config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if self.retention_type == RetentionType::RI {
            if technology != Technology::GcMs {
                return Err(AlignmentError::invalid_config(format!(
                    "retention index alignment is only supported for GC-MS, not {technology}"
                )));
            }
            if !(self.ri_tolerance > 0.0 && self.ri_tolerance.is_finite()) {
                return Err(AlignmentError::invalid_config(format!(
                    "ri_tolerance must be a positive number, got {}",
                    self.ri_tolerance
                )));
            }
            if self.clean_retention_tolerance() <= 0.0 {
                return Err(AlignmentError::invalid_config(
                    "the retention index cleaning tolerance must be positive",
                ));
            }
        } else if self.clean_rt_tolerance <= 0.0 {
            return Err(AlignmentError::invalid_config(
                "clean_rt_tolerance must be positive",
            ));
        }
        if technology == Technology::ImMs && !(self.drift_tolerance > 0.0) {
            return Err(AlignmentError::invalid_config(format!(
                "drift_tolerance must be positive for IM-MS, got {}",
                self.drift_tolerance
            )));
        }
        if !(0.0..=1.0).contains(&self.min_spectrum_similarity) {
            return Err(AlignmentError::invalid_config(format!(
                "min_spectrum_similarity must be in [0, 1], got {}",
                self.min_spectrum_similarity
            )));
        }
        if !(0.0..=1.0).contains(&self.min_fill_percentage) {
            return Err(AlignmentError::invalid_config(format!(
                "min_fill_percentage must be in [0, 1], got {}",
                self.min_fill_percentage
            )));
        }
        if self.mass_range.start >= self.mass_range.end {
            return Err(AlignmentError::invalid_config(format!(
                "mass_range is empty: {}-{}",
                self.mass_range.start, self.mass_range.end
            )));
        }
        if self.smoothing_method != SmoothingMethod::None && self.smoothing_level == 0 {
            return Err(AlignmentError::invalid_config(
                "smoothing_level must be at least 1 when smoothing is enabled",
            ));
        }
        if let Some(0) = self.max_threads {
            return Err(AlignmentError::invalid_config(
                "max_threads must be at least 1",
            ));
        }
        Ok(())
    }
}
