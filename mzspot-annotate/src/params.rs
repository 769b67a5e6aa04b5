use mzpeaks::Tolerance;

use mzspot::interval::{SimpleInterval, Span1D};
use mzspot::similarity::SpectrumSimilarityParams;

use crate::error::AnnotationError;

/// Tolerances and cutoffs of a library search.
///
/// Below `mass_breakpoint` the precursor tolerance is `ms1_tolerance` Da.
/// Above it the tolerance is the ppm equivalent of `ms1_tolerance` at the
/// breakpoint, so it widens proportionally with the mass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MsRefSearchParameter {
    pub ms1_tolerance: f64,
    pub ms2_tolerance: f64,
    pub mass_breakpoint: f64,

    pub rt_tolerance: f64,
    pub ri_tolerance: f64,
    pub ccs_tolerance: f64,

    pub weighted_dot_product_cutoff: f64,
    pub simple_dot_product_cutoff: f64,
    pub reverse_dot_product_cutoff: f64,
    pub matched_peaks_percentage_cutoff: f64,
    pub minimum_matched_peaks: usize,
    pub total_score_cutoff: f64,

    /// Fragments below this fraction of the base peak are ignored
    pub relative_abundance_cutoff: f64,
    /// Fragments outside this range are ignored
    pub mass_range: SimpleInterval<f64>,

    pub use_time_for_filtering: bool,
    pub use_time_for_scoring: bool,
    pub use_ccs_for_filtering: bool,
    pub use_ccs_for_scoring: bool,
}

impl Default for MsRefSearchParameter {
    fn default() -> Self {
        Self {
            ms1_tolerance: 0.01,
            ms2_tolerance: 0.025,
            mass_breakpoint: 500.0,
            rt_tolerance: 0.5,
            ri_tolerance: 100.0,
            ccs_tolerance: 10.0,
            weighted_dot_product_cutoff: 0.5,
            simple_dot_product_cutoff: 0.5,
            reverse_dot_product_cutoff: 0.5,
            matched_peaks_percentage_cutoff: 0.2,
            minimum_matched_peaks: 1,
            total_score_cutoff: 0.5,
            relative_abundance_cutoff: 0.0,
            mass_range: SimpleInterval::new(0.0, 2000.0),
            use_time_for_filtering: false,
            use_time_for_scoring: false,
            use_ccs_for_filtering: false,
            use_ccs_for_scoring: false,
        }
    }
}

impl MsRefSearchParameter {
    /// The precursor tolerance to use for a query at `mz`
    pub fn effective_tolerance(&self, mz: f64) -> Tolerance {
        if mz <= self.mass_breakpoint {
            Tolerance::Da(self.ms1_tolerance)
        } else {
            Tolerance::PPM(self.ms1_tolerance / self.mass_breakpoint * 1e6)
        }
    }

    /// The precursor tolerance at `mz`, in Da
    pub fn effective_tolerance_da(&self, mz: f64) -> f64 {
        let (lo, hi) = self.effective_tolerance(mz).bounds(mz);
        (hi - lo) / 2.0
    }

    pub fn spectrum_similarity_params(&self) -> SpectrumSimilarityParams {
        SpectrumSimilarityParams::new(self.ms2_tolerance, self.mass_range, self.relative_abundance_cutoff)
    }

    pub fn validate(&self) -> Result<(), AnnotationError> {
        let positive = [
            ("ms1_tolerance", self.ms1_tolerance),
            ("ms2_tolerance", self.ms2_tolerance),
            ("mass_breakpoint", self.mass_breakpoint),
            ("rt_tolerance", self.rt_tolerance),
            ("ri_tolerance", self.ri_tolerance),
            ("ccs_tolerance", self.ccs_tolerance),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(AnnotationError::invalid_config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        let fractions = [
            ("weighted_dot_product_cutoff", self.weighted_dot_product_cutoff),
            ("simple_dot_product_cutoff", self.simple_dot_product_cutoff),
            ("reverse_dot_product_cutoff", self.reverse_dot_product_cutoff),
            ("matched_peaks_percentage_cutoff", self.matched_peaks_percentage_cutoff),
            ("total_score_cutoff", self.total_score_cutoff),
            ("relative_abundance_cutoff", self.relative_abundance_cutoff),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(AnnotationError::invalid_config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.mass_range.start() >= self.mass_range.end() {
            return Err(AnnotationError::invalid_config(format!(
                "The fragment mass range {}-{} is empty",
                self.mass_range.start, self.mass_range.end
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_effective_tolerance_breakpoint() {
        let params = MsRefSearchParameter::default();
        assert!((params.effective_tolerance_da(300.0) - 0.01).abs() < 1e-12);
        assert!((params.effective_tolerance_da(500.0) - 0.01).abs() < 1e-12);
        assert!((params.effective_tolerance_da(1000.0) - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_validate() {
        assert!(MsRefSearchParameter::default().validate().is_ok());
        let params = MsRefSearchParameter {
            ms1_tolerance: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
        let params = MsRefSearchParameter {
            total_score_cutoff: 1.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
