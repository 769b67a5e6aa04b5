//! Technology specific peak comparison.
//!
//! A [`PeakComparer`] orders peaks, decides whether two peaks from different
//! files are the same species, scores how similar they are, and summarizes a
//! group of matched peaks into a consensus position and width. The alignment
//! algorithms only talk to this type, so they do not depend on the technology.
use std::cmp::Ordering;

use mzpeaks::CentroidPeak;

use crate::chrom::{ChromX, ChromXType, ChromXs};
use crate::matching::{mean_of_applicable, NOT_APPLICABLE};
use crate::params::{AlignmentParameters, Technology};
use crate::peak::ChromatogramPeakFeature;
use crate::similarity::{compare_spectra, gaussian_similarity, SpectrumSimilarityParams};

/// The joint outcome of comparing two peaks on every axis at once.
///
/// `equals` and `similarity` both read one of these, so the pass flags and the
/// score can never disagree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakMatch {
    pub retention_similarity: f64,
    pub mass_similarity: f64,
    pub drift_similarity: f64,
    pub spectrum_similarity: f64,

    pub is_retention_match: bool,
    pub is_mass_match: bool,
    pub is_drift_match: bool,
    pub is_spectrum_match: bool,

    pub total_score: f64,
}

impl Default for PeakMatch {
    fn default() -> Self {
        Self {
            retention_similarity: NOT_APPLICABLE,
            mass_similarity: NOT_APPLICABLE,
            drift_similarity: NOT_APPLICABLE,
            spectrum_similarity: NOT_APPLICABLE,
            is_retention_match: true,
            is_mass_match: true,
            is_drift_match: true,
            is_spectrum_match: true,
            total_score: 0.0,
        }
    }
}

impl PeakMatch {
    pub fn is_match(&self) -> bool {
        self.is_retention_match && self.is_mass_match && self.is_drift_match && self.is_spectrum_match
    }

    fn finish(mut self) -> Self {
        self.total_score = mean_of_applicable(&[
            self.retention_similarity,
            self.mass_similarity,
            self.drift_similarity,
            self.spectrum_similarity,
        ]);
        self
    }
}

/// Score agreement along one axis. A missing value on either side fails the match.
fn axis_match(a: Option<f64>, b: Option<f64>, tolerance: f64) -> (f64, bool) {
    match (a, b) {
        (Some(a), Some(b)) => (
            gaussian_similarity(a, b, tolerance),
            (a - b).abs() <= tolerance,
        ),
        _ => (NOT_APPLICABLE, false),
    }
}

/// GC-MS: retention (time or index) and EI spectrum similarity
#[derive(Debug, Clone, PartialEq)]
pub struct GcmsPeakComparer {
    pub axis: ChromXType,
    pub retention_tolerance: f64,
    pub spectrum: SpectrumSimilarityParams,
    pub min_spectrum_similarity: f64,
}

impl GcmsPeakComparer {
    fn match_peaks(&self, a: &ChromatogramPeakFeature, b: &ChromatogramPeakFeature) -> PeakMatch {
        let (retention_similarity, is_retention_match) =
            axis_match(a.apex(self.axis), b.apex(self.axis), self.retention_tolerance);
        let (spectrum_similarity, is_spectrum_match) =
            spectrum_match(&a.spectrum, &b.spectrum, &self.spectrum, self.min_spectrum_similarity, true);
        PeakMatch {
            retention_similarity,
            spectrum_similarity,
            is_retention_match,
            is_spectrum_match,
            ..Default::default()
        }
        .finish()
    }
}

/// LC-MS: precursor m/z and retention time, optionally MS/MS similarity
#[derive(Debug, Clone, PartialEq)]
pub struct LcmsPeakComparer {
    pub mz_tolerance: f64,
    pub rt_tolerance: f64,
    pub spectrum: SpectrumSimilarityParams,
    pub min_spectrum_similarity: f64,
    pub use_ms2_similarity: bool,
}

impl LcmsPeakComparer {
    fn match_peaks(&self, a: &ChromatogramPeakFeature, b: &ChromatogramPeakFeature) -> PeakMatch {
        let (mass_similarity, is_mass_match) = axis_match(Some(a.mass), Some(b.mass), self.mz_tolerance);
        let (retention_similarity, is_retention_match) =
            axis_match(a.apex(ChromXType::RT), b.apex(ChromXType::RT), self.rt_tolerance);
        let (spectrum_similarity, is_spectrum_match) = if self.use_ms2_similarity {
            spectrum_match(&a.spectrum, &b.spectrum, &self.spectrum, self.min_spectrum_similarity, false)
        } else {
            (NOT_APPLICABLE, true)
        };
        PeakMatch {
            retention_similarity,
            mass_similarity,
            spectrum_similarity,
            is_retention_match,
            is_mass_match,
            is_spectrum_match,
            ..Default::default()
        }
        .finish()
    }
}

/// IM-MS: everything LC-MS checks plus drift time
#[derive(Debug, Clone, PartialEq)]
pub struct ImsPeakComparer {
    pub lcms: LcmsPeakComparer,
    pub drift_tolerance: f64,
}

impl ImsPeakComparer {
    fn match_peaks(&self, a: &ChromatogramPeakFeature, b: &ChromatogramPeakFeature) -> PeakMatch {
        let (drift_similarity, is_drift_match) = axis_match(
            a.apex(ChromXType::Drift),
            b.apex(ChromXType::Drift),
            self.drift_tolerance,
        );
        PeakMatch {
            drift_similarity,
            is_drift_match,
            ..self.lcms.match_peaks(a, b)
        }
        .finish()
    }
}

/// Compare two spectra. When either spectrum is empty the spectral test does
/// not apply and passes. `weighted` selects the mass weighted dot product
/// used for EI spectra over the plain cosine used for MS/MS.
fn spectrum_match(
    a: &[CentroidPeak],
    b: &[CentroidPeak],
    params: &SpectrumSimilarityParams,
    min_similarity: f64,
    weighted: bool,
) -> (f64, bool) {
    if a.is_empty() || b.is_empty() {
        return (NOT_APPLICABLE, true);
    }
    let cmp = compare_spectra(a, b, params);
    let score = if weighted {
        cmp.weighted_dot_product
    } else {
        cmp.simple_dot_product
    };
    (score, score >= min_similarity)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeakComparer {
    Gcms(GcmsPeakComparer),
    Lcms(LcmsPeakComparer),
    Ims(ImsPeakComparer),
}

impl PeakComparer {
    pub fn new(technology: Technology, params: &AlignmentParameters) -> Self {
        let lcms = LcmsPeakComparer {
            mz_tolerance: params.mz_tolerance,
            rt_tolerance: params.rt_tolerance,
            spectrum: params.spectrum_similarity_params(),
            min_spectrum_similarity: params.min_spectrum_similarity,
            use_ms2_similarity: params.use_ms2_similarity,
        };
        match technology {
            Technology::GcMs => Self::Gcms(GcmsPeakComparer {
                axis: params.retention_type.axis(),
                retention_tolerance: params.retention_tolerance(),
                spectrum: params.spectrum_similarity_params(),
                min_spectrum_similarity: params.min_spectrum_similarity,
            }),
            Technology::LcMs => Self::Lcms(lcms),
            Technology::ImMs => Self::Ims(ImsPeakComparer {
                lcms,
                drift_tolerance: params.drift_tolerance,
            }),
        }
    }

    pub fn technology(&self) -> Technology {
        match self {
            PeakComparer::Gcms(_) => Technology::GcMs,
            PeakComparer::Lcms(_) => Technology::LcMs,
            PeakComparer::Ims(_) => Technology::ImMs,
        }
    }

    /// The retention axis peaks are ordered and windowed on
    pub fn primary_axis(&self) -> ChromXType {
        match self {
            PeakComparer::Gcms(c) => c.axis,
            PeakComparer::Lcms(_) | PeakComparer::Ims(_) => ChromXType::RT,
        }
    }

    /// The tolerance along [`PeakComparer::primary_axis`]
    pub fn retention_tolerance(&self) -> f64 {
        match self {
            PeakComparer::Gcms(c) => c.retention_tolerance,
            PeakComparer::Lcms(c) => c.rt_tolerance,
            PeakComparer::Ims(c) => c.lcms.rt_tolerance,
        }
    }

    /// The m/z a peak is identified by: the quant mass for GC-MS and the
    /// precursor m/z otherwise.
    pub fn key_mass(&self, peak: &ChromatogramPeakFeature) -> f64 {
        match self {
            PeakComparer::Gcms(_) => peak.quant_mass,
            PeakComparer::Lcms(_) | PeakComparer::Ims(_) => peak.mass,
        }
    }

    /// The position of `peak` along the primary axis
    pub fn key(&self, peak: &ChromatogramPeakFeature) -> f64 {
        peak.apex(self.primary_axis()).unwrap_or_default()
    }

    /// Order two peaks by the primary retention axis, then by mass
    pub fn compare(&self, a: &ChromatogramPeakFeature, b: &ChromatogramPeakFeature) -> Ordering {
        self.key(a)
            .total_cmp(&self.key(b))
            .then_with(|| self.key_mass(a).total_cmp(&self.key_mass(b)))
    }

    pub fn match_peaks(&self, a: &ChromatogramPeakFeature, b: &ChromatogramPeakFeature) -> PeakMatch {
        match self {
            PeakComparer::Gcms(c) => c.match_peaks(a, b),
            PeakComparer::Lcms(c) => c.match_peaks(a, b),
            PeakComparer::Ims(c) => c.match_peaks(a, b),
        }
    }

    /// Whether `a` and `b` are the same species
    pub fn equals(&self, a: &ChromatogramPeakFeature, b: &ChromatogramPeakFeature) -> bool {
        self.match_peaks(a, b).is_match()
    }

    /// The total score of [`PeakComparer::match_peaks`], in `[0, 1]`
    pub fn similarity(&self, a: &ChromatogramPeakFeature, b: &ChromatogramPeakFeature) -> f64 {
        self.match_peaks(a, b).total_score
    }

    /// The mean apex position of `peaks` along every axis any of them carries.
    ///
    /// Each axis is averaged over the peaks that have it, independently of the
    /// others. The primary axis is the main type of the result.
    pub fn center<'a, I>(&self, peaks: I) -> Option<ChromXs>
    where
        I: IntoIterator<Item = &'a ChromatogramPeakFeature>,
    {
        let mut totals = [(0.0, 0usize); 4];
        let axes = [ChromXType::RT, ChromXType::RI, ChromXType::Drift, ChromXType::Mz];
        for peak in peaks {
            for (axis, (total, count)) in axes.iter().zip(totals.iter_mut()) {
                if let Some(v) = peak.apex(*axis) {
                    *total += v;
                    *count += 1;
                }
            }
        }
        let primary = self.primary_axis();
        let main = axes
            .iter()
            .zip(totals.iter())
            .find(|(axis, _)| **axis == primary)
            .filter(|(_, (_, count))| *count > 0)
            .or_else(|| axes.iter().zip(totals.iter()).find(|(_, (_, count))| *count > 0))
            .map(|(axis, _)| *axis)?;
        let mut center = ChromXs::new(ChromX::new(main, 0.0, main.default_unit()));
        for (axis, (total, count)) in axes.iter().zip(totals) {
            if count > 0 {
                center.set(*axis, total / count as f64);
            }
        }
        Some(center)
    }

    /// The widest peak in `peaks` along the primary axis, so a search window
    /// built from it can contain the broadest member.
    pub fn average_peak_width<'a, I>(&self, peaks: I) -> f64
    where
        I: IntoIterator<Item = &'a ChromatogramPeakFeature>,
    {
        let axis = self.primary_axis();
        peaks
            .into_iter()
            .map(|p| p.width(axis))
            .fold(0.0, f64::max)
    }

    /// Summarize `peaks` as one synthetic peak: the consensus position and
    /// width, the mean masses and the spectrum of the most intense member.
    pub fn consensus(&self, peaks: &[&ChromatogramPeakFeature]) -> Option<ChromatogramPeakFeature> {
        let center = self.center(peaks.iter().copied())?;
        let width = self.average_peak_width(peaks.iter().copied());
        let axis = self.primary_axis();
        let apex = center.value(axis).unwrap_or_default();
        let mut left = center;
        left.set(axis, apex - width / 2.0);
        let mut right = center;
        right.set(axis, apex + width / 2.0);

        let n = peaks.len() as f64;
        let tallest = peaks
            .iter()
            .max_by(|a, b| a.height_top.total_cmp(&b.height_top))?;
        Some(ChromatogramPeakFeature {
            peak_id: tallest.peak_id,
            chrom_left: left,
            chrom_top: center,
            chrom_right: right,
            height_top: tallest.height_top,
            mass: peaks.iter().map(|p| p.mass).sum::<f64>() / n,
            quant_mass: peaks.iter().map(|p| p.quant_mass).sum::<f64>() / n,
            spectrum: tallest.spectrum.clone(),
            ccs: tallest.ccs,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::RetentionType;

    fn lc_peak(rt: f64, mz: f64, height: f64) -> ChromatogramPeakFeature {
        ChromatogramPeakFeature::new(0, rt - 0.05, rt, rt + 0.05, mz, height)
    }

    fn ei_spectrum(peaks: &[(f64, f32)]) -> Vec<CentroidPeak> {
        peaks
            .iter()
            .enumerate()
            .map(|(i, (mz, int))| CentroidPeak::new(*mz, *int, i as u32))
            .collect()
    }

    #[test]
    fn test_lcms_match() {
        let params = AlignmentParameters::for_technology(Technology::LcMs);
        let comparer = PeakComparer::new(Technology::LcMs, &params);
        let a = lc_peak(5.0, 300.1, 100.0);
        let b = lc_peak(5.01, 300.101, 100.0);
        let c = lc_peak(5.5, 300.1, 100.0);
        let m = comparer.match_peaks(&a, &b);
        assert!(m.is_match());
        assert!(comparer.equals(&a, &b));
        assert!((comparer.similarity(&a, &b) - m.total_score).abs() < 1e-12);
        assert!(m.total_score > 0.9);
        assert!(!comparer.equals(&a, &c));
        assert_eq!(comparer.compare(&a, &c), Ordering::Less);
    }

    #[test]
    fn test_gcms_requires_spectrum() {
        let mut params = AlignmentParameters::for_technology(Technology::GcMs);
        params.retention_type = RetentionType::RT;
        let comparer = PeakComparer::new(Technology::GcMs, &params);
        let a = lc_peak(5.0, 73.0, 100.0).with_spectrum(ei_spectrum(&[(73.0, 100.0), (147.0, 50.0)]));
        let b = lc_peak(5.02, 73.0, 100.0).with_spectrum(ei_spectrum(&[(73.0, 90.0), (147.0, 55.0)]));
        let c = lc_peak(5.02, 91.0, 100.0).with_spectrum(ei_spectrum(&[(91.0, 100.0), (65.0, 20.0)]));
        assert!(comparer.equals(&a, &b));
        let m = comparer.match_peaks(&a, &c);
        assert!(m.is_retention_match);
        assert!(!m.is_spectrum_match);
        assert!(!m.is_match());
    }

    #[test]
    fn test_center_and_width() {
        let params = AlignmentParameters::for_technology(Technology::LcMs);
        let comparer = PeakComparer::new(Technology::LcMs, &params);
        let mut a = lc_peak(5.0, 300.1, 100.0);
        a.chrom_right.set(ChromXType::RT, 5.2);
        let b = lc_peak(5.2, 300.1, 200.0);
        let mut c = lc_peak(5.1, 300.1, 50.0);
        c.chrom_top.set(ChromXType::Drift, 20.0);
        let center = comparer.center([&a, &b, &c]).unwrap();
        assert_eq!(center.main_type(), ChromXType::RT);
        assert!((center.rt().unwrap() - 5.1).abs() < 1e-12);
        assert_eq!(center.drift(), Some(20.0));
        assert!((comparer.average_peak_width([&a, &b, &c]) - 0.25).abs() < 1e-12);

        let consensus = comparer.consensus(&[&a, &b, &c]).unwrap();
        assert_eq!(consensus.height_top, 200.0);
        assert!((consensus.width(ChromXType::RT) - 0.25).abs() < 1e-9);
        assert!(comparer.center(std::iter::empty()).is_none());
    }
}
