//! Spectrum and coordinate similarity measures shared by peak alignment and
//! library annotation.
use mzpeaks::{prelude::*, CentroidPeak, Tolerance};

use crate::interval::{SimpleInterval, Span1D};
use crate::matching::NOT_APPLICABLE;

/// Intensity exponent of the mass-weighted dot product
const WEIGHTED_INTENSITY_POWER: f64 = 0.6;
/// m/z exponent of the mass-weighted dot product
const WEIGHTED_MZ_POWER: f64 = 3.0;

/// The similarity of `actual` to `reference` on a Gaussian kernel whose
/// standard deviation is `tolerance`.
///
/// ```math
/// s = \exp\left(-\frac{1}{2}\left(\frac{a - r}{t}\right)^2\right)
/// ```
///
/// Returns [`NOT_APPLICABLE`] if `tolerance` is not positive.
pub fn gaussian_similarity(actual: f64, reference: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 || !tolerance.is_finite() {
        return NOT_APPLICABLE;
    }
    let z = (actual - reference) / tolerance;
    (-0.5 * z * z).exp()
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpectrumSimilarityParams {
    /// Fragment matching tolerance in Da
    pub tolerance: f64,
    /// Peaks outside this m/z range are ignored on both sides
    pub mass_range: SimpleInterval<f64>,
    /// Peaks below this fraction of their spectrum's base peak are ignored
    pub relative_abundance_cutoff: f64,
}

impl Default for SpectrumSimilarityParams {
    fn default() -> Self {
        Self {
            tolerance: 0.05,
            mass_range: SimpleInterval::new(0.0, 2000.0),
            relative_abundance_cutoff: 0.0,
        }
    }
}

impl SpectrumSimilarityParams {
    pub fn new(tolerance: f64, mass_range: SimpleInterval<f64>, relative_abundance_cutoff: f64) -> Self {
        Self {
            tolerance,
            mass_range,
            relative_abundance_cutoff,
        }
    }
}

/// Every spectrum-derived score from one comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumComparison {
    pub weighted_dot_product: f64,
    pub simple_dot_product: f64,
    pub reverse_dot_product: f64,
    pub matched_peaks_count: f64,
    pub matched_peaks_percentage: f64,
}

impl Default for SpectrumComparison {
    fn default() -> Self {
        Self {
            weighted_dot_product: NOT_APPLICABLE,
            simple_dot_product: NOT_APPLICABLE,
            reverse_dot_product: NOT_APPLICABLE,
            matched_peaks_count: NOT_APPLICABLE,
            matched_peaks_percentage: NOT_APPLICABLE,
        }
    }
}

impl SpectrumComparison {
    pub fn is_applicable(&self) -> bool {
        self.simple_dot_product >= 0.0
    }
}

/// One aligned pair of relative intensities at an m/z position. A zero on
/// either side means that side had no peak there.
#[derive(Debug, Clone, Copy)]
struct AlignedPair {
    mz: f64,
    experimental: f64,
    reference: f64,
}

fn normalized_peaks(peaks: &[CentroidPeak], params: &SpectrumSimilarityParams) -> Vec<(f64, f64)> {
    let mut kept: Vec<(f64, f64)> = peaks
        .iter()
        .filter(|p| p.intensity() > 0.0 && params.mass_range.contains(&p.mz()))
        .map(|p| (p.mz(), p.intensity() as f64))
        .collect();
    let base = kept.iter().map(|(_, i)| *i).fold(0.0, f64::max);
    if base <= 0.0 {
        return Vec::new();
    }
    kept.iter_mut().for_each(|(_, i)| *i /= base);
    kept.retain(|(_, i)| *i >= params.relative_abundance_cutoff);
    kept.sort_by(|a, b| a.0.total_cmp(&b.0));
    kept
}

fn align_peaks(
    experimental: &[(f64, f64)],
    reference: &[(f64, f64)],
    tolerance: Tolerance,
) -> (Vec<AlignedPair>, usize) {
    let mut used = vec![false; experimental.len()];
    let mut pairs = Vec::with_capacity(experimental.len() + reference.len());
    let mut matched = 0usize;
    let mut start = 0usize;
    for (ref_mz, ref_int) in reference.iter().copied() {
        let (lower, upper) = tolerance.bounds(ref_mz);
        while start < experimental.len() && experimental[start].0 < lower {
            start += 1;
        }
        let mut acc = 0.0;
        for (j, (mz, int)) in experimental.iter().enumerate().skip(start) {
            if *mz > upper {
                break;
            }
            if !used[j] {
                used[j] = true;
                acc += int;
            }
        }
        if acc > 0.0 {
            matched += 1;
        }
        pairs.push(AlignedPair {
            mz: ref_mz,
            experimental: acc,
            reference: ref_int,
        });
    }
    for ((mz, int), was_used) in experimental.iter().zip(used) {
        if !was_used {
            pairs.push(AlignedPair {
                mz: *mz,
                experimental: *int,
                reference: 0.0,
            });
        }
    }
    (pairs, matched)
}

fn cosine<I: Iterator<Item = (f64, f64)>>(it: I) -> f64 {
    let (dot, norm_a, norm_b) = it.fold((0.0, 0.0, 0.0), |(dot, na, nb), (a, b)| {
        (a.mul_add(b, dot), a.mul_add(a, na), b.mul_add(b, nb))
    });
    if norm_a <= 0.0 || norm_b <= 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b).sqrt()).clamp(0.0, 1.0)
    }
}

fn mass_weight(mz: f64, intensity: f64) -> f64 {
    if intensity <= 0.0 {
        0.0
    } else {
        intensity.powf(WEIGHTED_INTENSITY_POWER) * mz.powf(WEIGHTED_MZ_POWER)
    }
}

/// Compare an experimental centroid spectrum against a reference spectrum.
///
/// If either spectrum has no usable peaks, every score is [`NOT_APPLICABLE`].
/// Two non-empty spectra with no overlapping peaks score `0`.
pub fn compare_spectra(
    experimental: &[CentroidPeak],
    reference: &[CentroidPeak],
    params: &SpectrumSimilarityParams,
) -> SpectrumComparison {
    let experimental = normalized_peaks(experimental, params);
    let reference = normalized_peaks(reference, params);
    if experimental.is_empty() || reference.is_empty() {
        return SpectrumComparison::default();
    }
    let (pairs, matched) = align_peaks(&experimental, &reference, Tolerance::Da(params.tolerance));

    let simple_dot_product = cosine(pairs.iter().map(|p| (p.experimental, p.reference)));
    let weighted_dot_product = cosine(
        pairs
            .iter()
            .map(|p| (mass_weight(p.mz, p.experimental), mass_weight(p.mz, p.reference))),
    );
    let reverse_dot_product = cosine(
        pairs
            .iter()
            .filter(|p| p.reference > 0.0)
            .map(|p| (p.experimental, p.reference)),
    );
    SpectrumComparison {
        weighted_dot_product,
        simple_dot_product,
        reverse_dot_product,
        matched_peaks_count: matched as f64,
        matched_peaks_percentage: matched as f64 / reference.len() as f64,
    }
}

/// The m/z of the most intense peak, if any
pub fn base_peak(peaks: &[CentroidPeak]) -> Option<&CentroidPeak> {
    peaks
        .iter()
        .filter(|p| p.intensity() > 0.0)
        .max_by(|a, b| a.intensity().total_cmp(&b.intensity()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn peaks(data: &[(f64, f32)]) -> Vec<CentroidPeak> {
        data.iter()
            .enumerate()
            .map(|(i, (mz, int))| CentroidPeak::new(*mz, *int, i as u32))
            .collect()
    }

    #[test]
    fn test_gaussian_similarity() {
        assert_eq!(gaussian_similarity(5.0, 5.0, 0.1), 1.0);
        let s = gaussian_similarity(5.1, 5.0, 0.1);
        assert!((s - (-0.5f64).exp()).abs() < 1e-12);
        assert_eq!(gaussian_similarity(5.0, 5.0, 0.0), NOT_APPLICABLE);
    }

    #[test]
    fn test_identical_spectra() {
        let a = peaks(&[(73.0, 100.0), (147.1, 40.0), (221.1, 10.0)]);
        let cmp = compare_spectra(&a, &a, &SpectrumSimilarityParams::default());
        assert!((cmp.simple_dot_product - 1.0).abs() < 1e-9);
        assert!((cmp.weighted_dot_product - 1.0).abs() < 1e-9);
        assert!((cmp.reverse_dot_product - 1.0).abs() < 1e-9);
        assert_eq!(cmp.matched_peaks_count, 3.0);
        assert_eq!(cmp.matched_peaks_percentage, 1.0);
    }

    #[test]
    fn test_disjoint_spectra() {
        let a = peaks(&[(73.0, 100.0), (147.1, 40.0)]);
        let b = peaks(&[(91.0, 100.0), (105.0, 40.0)]);
        let cmp = compare_spectra(&a, &b, &SpectrumSimilarityParams::default());
        assert!(cmp.is_applicable());
        assert_eq!(cmp.simple_dot_product, 0.0);
        assert_eq!(cmp.reverse_dot_product, 0.0);
        assert_eq!(cmp.matched_peaks_count, 0.0);
    }

    #[test]
    fn test_reverse_ignores_extra_experimental_peaks() {
        let experimental = peaks(&[(73.0, 100.0), (147.1, 40.0), (300.0, 100.0)]);
        let reference = peaks(&[(73.0, 100.0), (147.1, 40.0)]);
        let cmp = compare_spectra(&experimental, &reference, &SpectrumSimilarityParams::default());
        assert!((cmp.reverse_dot_product - 1.0).abs() < 1e-9);
        assert!(cmp.simple_dot_product < 1.0);
    }

    #[test]
    fn test_empty_is_not_applicable() {
        let a = peaks(&[(73.0, 100.0)]);
        let cmp = compare_spectra(&a, &[], &SpectrumSimilarityParams::default());
        assert!(!cmp.is_applicable());
        assert_eq!(cmp.matched_peaks_percentage, NOT_APPLICABLE);
    }
}
