//! Per-file peak records.
//!
//! A [`ChromatogramPeakFeature`] is produced by upstream peak picking and is
//! read-only here except for its annotation fields. Alignment wraps each one
//! in an [`AlignmentChromPeakFeature`] which remembers the file it came from
//! and whether it was reconstructed by gap filling.
use mzpeaks::{prelude::*, CentroidPeak};

use crate::chrom::{ChromXType, ChromXs};
use crate::matching::{MsScanMatchResult, NOT_APPLICABLE};
use crate::retention_index::RetentionIndexCalibration;

/// The `peak_id` of a slot with no detected peak
pub const GAP_PEAK_ID: i64 = -1;

/// One sample point of a reconstructed ion chromatogram
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChromatogramPeak {
    /// The index of the scan this point was read from
    pub id: usize,
    pub chrom_value: f64,
    pub mz: f64,
    pub intensity: f64,
}

impl ChromatogramPeak {
    pub fn new(id: usize, chrom_value: f64, mz: f64, intensity: f64) -> Self {
        Self {
            id,
            chrom_value,
            mz,
            intensity,
        }
    }
}

/// One detected peak within one file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChromatogramPeakFeature {
    pub peak_id: i64,

    pub chrom_left: ChromXs,
    pub chrom_top: ChromXs,
    pub chrom_right: ChromXs,

    pub height_left: f64,
    pub height_top: f64,
    pub height_right: f64,

    pub area_above_zero: f64,
    pub area_above_baseline: f64,

    pub signal_to_noise: f64,
    pub estimated_noise: f64,
    pub symmetry: f64,
    pub gaussian_similarity: f64,
    pub sharpness: f64,

    /// The precursor or apex m/z
    pub mass: f64,
    /// The m/z used to quantify a GC-MS peak
    pub quant_mass: f64,

    pub ms1_raw_scan_id: Option<usize>,
    pub ms2_raw_scan_id: Option<usize>,

    /// The deconvoluted EI spectrum (GC) or the MS/MS spectrum (LC)
    pub spectrum: Vec<CentroidPeak>,

    pub ccs: Option<f64>,
    /// Isotope abundances relative to the monoisotopic peak, M+0 first
    pub isotope_abundances: Vec<f64>,
    /// The isotope position of this peak in its envelope, 0 is monoisotopic
    pub isotope_weight_number: usize,

    pub msp_match: Option<MsScanMatchResult>,
    pub textdb_match: Option<MsScanMatchResult>,

    pub name: String,
    pub formula: String,
    pub ontology: String,
    pub inchikey: String,
}

impl Default for ChromatogramPeakFeature {
    fn default() -> Self {
        Self {
            peak_id: GAP_PEAK_ID,
            chrom_left: ChromXs::default(),
            chrom_top: ChromXs::default(),
            chrom_right: ChromXs::default(),
            height_left: 0.0,
            height_top: 0.0,
            height_right: 0.0,
            area_above_zero: 0.0,
            area_above_baseline: 0.0,
            signal_to_noise: 0.0,
            estimated_noise: 0.0,
            symmetry: 0.0,
            gaussian_similarity: 0.0,
            sharpness: 0.0,
            mass: 0.0,
            quant_mass: 0.0,
            ms1_raw_scan_id: None,
            ms2_raw_scan_id: None,
            spectrum: Vec::new(),
            ccs: None,
            isotope_abundances: Vec::new(),
            isotope_weight_number: 0,
            msp_match: None,
            textdb_match: None,
            name: String::new(),
            formula: String::new(),
            ontology: String::new(),
            inchikey: String::new(),
        }
    }
}

impl ChromatogramPeakFeature {
    /// Create a detected peak with a triangular shape spanning `left..right`
    /// along the retention time axis.
    pub fn new(peak_id: i64, rt_left: f64, rt_top: f64, rt_right: f64, mass: f64, height: f64) -> Self {
        Self {
            peak_id,
            chrom_left: ChromXs::from_rt(rt_left),
            chrom_top: ChromXs::from_rt(rt_top),
            chrom_right: ChromXs::from_rt(rt_right),
            height_top: height,
            area_above_zero: height * (rt_right - rt_left) / 2.0,
            area_above_baseline: height * (rt_right - rt_left) / 2.0,
            mass,
            quant_mass: mass,
            ..Default::default()
        }
    }

    pub fn with_spectrum(mut self, spectrum: Vec<CentroidPeak>) -> Self {
        self.spectrum = spectrum;
        self
    }

    pub fn with_quant_mass(mut self, quant_mass: f64) -> Self {
        self.quant_mass = quant_mass;
        self
    }

    pub fn is_gap(&self) -> bool {
        self.peak_id < 0
    }

    /// The apex value along `axis`, if present
    pub fn apex(&self, axis: ChromXType) -> Option<f64> {
        self.chrom_top.value(axis)
    }

    /// The width of the peak along `axis`, `0` if either edge is missing
    pub fn width(&self, axis: ChromXType) -> f64 {
        match (self.chrom_left.value(axis), self.chrom_right.value(axis)) {
            (Some(left), Some(right)) => (right - left).abs(),
            _ => 0.0,
        }
    }

    /// Set the main axis of every position at once. Positions lacking the axis
    /// are left unchanged and `false` is returned.
    pub fn set_main_type(&mut self, axis: ChromXType) -> bool {
        let a = self.chrom_left.set_main_type(axis);
        let b = self.chrom_top.set_main_type(axis);
        let c = self.chrom_right.set_main_type(axis);
        a && b && c
    }

    /// The m/z of the most intense peak in the spectrum
    pub fn base_peak_mz(&self) -> Option<f64> {
        self.spectrum
            .iter()
            .filter(|p| p.intensity() > 0.0)
            .max_by(|a, b| a.intensity().total_cmp(&b.intensity()))
            .map(|p| p.mz())
    }

    /// The annotation result that identifies this peak, preferring the
    /// spectral library over the text database.
    pub fn best_match(&self) -> Option<&MsScanMatchResult> {
        self.msp_match
            .as_ref()
            .filter(|m| m.is_identified())
            .or_else(|| self.textdb_match.as_ref().filter(|m| m.is_identified()))
    }

    pub fn is_identified(&self) -> bool {
        self.best_match().is_some()
    }

    pub fn is_msms_identified(&self) -> bool {
        self.msp_match
            .as_ref()
            .map(|m| m.is_msms_identified())
            .unwrap_or_default()
    }

    pub fn msp_total_score(&self) -> f64 {
        self.msp_match
            .as_ref()
            .map(|m| m.total_score)
            .unwrap_or(NOT_APPLICABLE)
    }

    pub fn textdb_total_score(&self) -> f64 {
        self.textdb_match
            .as_ref()
            .map(|m| m.total_score)
            .unwrap_or(NOT_APPLICABLE)
    }
}

/// One file's slot in an alignment spot
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlignmentChromPeakFeature {
    pub file_id: usize,
    pub file_name: String,
    pub is_gap_filled: bool,
    pub feature: ChromatogramPeakFeature,
}

impl AlignmentChromPeakFeature {
    pub fn from_feature(file: &AnalysisFile, feature: ChromatogramPeakFeature) -> Self {
        Self {
            file_id: file.id,
            file_name: file.name.clone(),
            is_gap_filled: false,
            feature,
        }
    }

    /// An empty slot for `file` carrying the gap sentinel
    pub fn gap(file: &AnalysisFile) -> Self {
        Self::from_feature(file, ChromatogramPeakFeature::default())
    }

    pub fn peak_id(&self) -> i64 {
        self.feature.peak_id
    }

    /// Whether this slot had no detected peak, even if it has since been gap filled
    pub fn is_gap(&self) -> bool {
        self.feature.is_gap()
    }

    pub fn height(&self) -> f64 {
        self.feature.height_top
    }
}

/// One input sample
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisFile {
    /// The position of this file in the input list
    pub id: usize,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub calibration: Option<RetentionIndexCalibration>,
}

impl AnalysisFile {
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            calibration: None,
        }
    }

    pub fn with_calibration(mut self, calibration: RetentionIndexCalibration) -> Self {
        self.calibration = Some(calibration);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gap_slot() {
        let file = AnalysisFile::new(2, "sample_c");
        let slot = AlignmentChromPeakFeature::gap(&file);
        assert!(slot.is_gap());
        assert_eq!(slot.peak_id(), GAP_PEAK_ID);
        assert_eq!(slot.file_id, 2);
        assert!(!slot.is_gap_filled);
        assert_eq!(slot.height(), 0.0);
    }

    #[test]
    fn test_feature_geometry() {
        let feature = ChromatogramPeakFeature::new(0, 4.95, 5.0, 5.06, 300.1, 1000.0)
            .with_spectrum(vec![
                CentroidPeak::new(300.1, 100.0, 0),
                CentroidPeak::new(150.0, 500.0, 1),
            ]);
        assert!((feature.width(ChromXType::RT) - 0.11).abs() < 1e-9);
        assert_eq!(feature.width(ChromXType::RI), 0.0);
        assert_eq!(feature.apex(ChromXType::RT), Some(5.0));
        assert_eq!(feature.base_peak_mz(), Some(150.0));
        assert!(!feature.is_identified());
    }
}
