//! Library search and scoring.
//!
//! An [`Annotator`] owns a [`ReferenceLibrary`] and one authoritative
//! [`MsRefSearchParameter`]. Every search operation accepts an optional
//! parameter override which applies to that call only and is validated
//! before it is used.
use std::io;

use itertools::Itertools;
use mzpeaks::CentroidPeak;
use rayon::prelude::*;
use tracing::{debug, info, trace};

use mzspot::similarity::{compare_spectra, gaussian_similarity};
use mzspot::{
    AlignmentSpotProperty, AnalysisFile, ChromXType, ChromXs, ChromatogramPeakFeature, MatchSource,
    MsScanMatchResult, PeakFeatureSource, Technology, NOT_APPLICABLE,
};

use crate::error::AnnotationError;
use crate::library::{ReferenceLibrary, SecondaryKey};
use crate::params::MsRefSearchParameter;
use crate::reference::MoleculeMsReference;

/// The experimental side of a library search
#[derive(Debug, Clone, Copy, Default)]
pub struct MsQuery<'a> {
    /// Absent for EI spectra, in which case candidates are retrieved by retention
    pub precursor_mz: Option<f64>,
    pub chrom: ChromXs,
    pub ccs: Option<f64>,
    pub spectrum: &'a [CentroidPeak],
    /// Isotope abundances, M+0 first
    pub isotopes: &'a [f64],
}

impl<'a> MsQuery<'a> {
    pub fn new(precursor_mz: Option<f64>, chrom: ChromXs, spectrum: &'a [CentroidPeak]) -> Self {
        Self {
            precursor_mz,
            chrom,
            spectrum,
            ..Default::default()
        }
    }

    pub fn from_feature(feature: &'a ChromatogramPeakFeature) -> Self {
        Self {
            precursor_mz: Some(feature.mass),
            chrom: feature.chrom_top,
            ccs: feature.ccs,
            spectrum: &feature.spectrum,
            isotopes: &feature.isotope_abundances,
        }
    }

    /// Query with the spot's center coordinates and its representative peak's spectrum
    pub fn from_spot(spot: &'a AlignmentSpotProperty, technology: Technology) -> Self {
        let rep = spot.representative().map(|p| &p.feature);
        Self {
            precursor_mz: if technology == Technology::GcMs {
                None
            } else {
                Some(spot.mass_center)
            },
            chrom: spot.time_center,
            ccs: rep.and_then(|r| r.ccs),
            spectrum: rep.map(|r| r.spectrum.as_slice()).unwrap_or_default(),
            isotopes: rep.map(|r| r.isotope_abundances.as_slice()).unwrap_or_default(),
        }
    }
}

/// Compare the measured isotope ratios against the reference's M+1, M+2 ratios.
///
/// The similarity is one minus the mean absolute ratio difference, clamped to `[0, 1]`.
pub fn isotope_similarity(observed: &[f64], reference: &[f64]) -> f64 {
    let m0 = match observed.first() {
        Some(m0) if *m0 > 0.0 => *m0,
        _ => return NOT_APPLICABLE,
    };
    let diffs: Vec<f64> = observed[1..]
        .iter()
        .zip(reference)
        .map(|(o, r)| (o / m0 - r).abs())
        .collect();
    if diffs.is_empty() {
        return NOT_APPLICABLE;
    }
    let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
    (1.0 - mean).clamp(0.0, 1.0)
}

/// `Some(true)` if both sides carry the coordinate and agree within `tolerance`
fn within(query: Option<f64>, reference: Option<f64>, tolerance: f64) -> Option<bool> {
    match (query, reference) {
        (Some(q), Some(r)) => Some((q - r).abs() <= tolerance),
        _ => None,
    }
}

fn retention_agrees(query: &MsQuery, reference: &MoleculeMsReference, params: &MsRefSearchParameter) -> Option<bool> {
    within(query.chrom.ri(), reference.ri, params.ri_tolerance)
        .or_else(|| within(query.chrom.rt(), reference.rt, params.rt_tolerance))
}

/// Library positions near the query on the library's secondary axis, plus the
/// entries that carry no secondary value. Falls back to the whole library when
/// the query lacks that axis.
fn retention_candidates(library: &ReferenceLibrary, query: &MsQuery, params: &MsRefSearchParameter) -> Vec<usize> {
    let window = match library.secondary_key() {
        SecondaryKey::RI => query.chrom.ri().map(|ri| (ri, params.ri_tolerance)),
        SecondaryKey::RT => query.chrom.rt().map(|rt| (rt, params.rt_tolerance)),
        SecondaryKey::None => None,
    };
    let Some((value, tolerance)) = window else {
        trace!("No retention index applies to the query, scanning the whole library");
        return (0..library.len()).collect();
    };
    library
        .retention_range(value, tolerance)
        .iter()
        .chain(library.without_retention())
        .copied()
        .sorted_unstable()
        .collect()
}

/// Score everything but the spectrum
fn score_coordinates(
    result: &mut MsScanMatchResult,
    query: &MsQuery,
    reference: &MoleculeMsReference,
    params: &MsRefSearchParameter,
) {
    if let Some(mz) = query.precursor_mz {
        result.accurate_mass_similarity =
            gaussian_similarity(mz, reference.precursor_mz, params.effective_tolerance_da(reference.precursor_mz));
    }
    if params.use_time_for_scoring {
        if let (Some(q), Some(r)) = (query.chrom.rt(), reference.rt) {
            result.rt_similarity = gaussian_similarity(q, r, params.rt_tolerance);
        }
        if let (Some(q), Some(r)) = (query.chrom.ri(), reference.ri) {
            result.ri_similarity = gaussian_similarity(q, r, params.ri_tolerance);
        }
    }
    if params.use_ccs_for_scoring {
        if let (Some(q), Some(r)) = (query.ccs, reference.ccs) {
            result.ccs_similarity = gaussian_similarity(q, r, params.ccs_tolerance);
        }
    }
    if !reference.isotope_abundances.is_empty() {
        result.isotope_similarity = isotope_similarity(query.isotopes, &reference.isotope_abundances);
    }
}

/// Set the pass/fail flags of `result` from its raw scores and the query coordinates.
///
/// A spectrum match requires every spectral cutoff to pass at once.
pub fn validate_match(
    result: &mut MsScanMatchResult,
    query: &MsQuery,
    reference: &MoleculeMsReference,
    params: &MsRefSearchParameter,
) {
    result.is_precursor_mz_match = within(
        query.precursor_mz,
        Some(reference.precursor_mz),
        params.effective_tolerance_da(reference.precursor_mz),
    )
    .unwrap_or(false);
    result.is_rt_match = within(query.chrom.rt(), reference.rt, params.rt_tolerance).unwrap_or(false);
    result.is_ri_match = within(query.chrom.ri(), reference.ri, params.ri_tolerance).unwrap_or(false);
    result.is_ccs_match = within(query.ccs, reference.ccs, params.ccs_tolerance).unwrap_or(false);
    result.is_spectrum_match = result.weighted_dot_product >= params.weighted_dot_product_cutoff
        && result.simple_dot_product >= params.simple_dot_product_cutoff
        && result.reverse_dot_product >= params.reverse_dot_product_cutoff
        && result.matched_peaks_percentage >= params.matched_peaks_percentage_cutoff
        && result.matched_peaks_count >= params.minimum_matched_peaks as f64;
    // Lipid fragment rules are not evaluated
    result.is_lipid_class_match = false;
    result.is_lipid_chains_match = false;
    result.is_lipid_position_match = false;
    result.is_other_lipid_match = false;
}

/// Library search over one [`ReferenceLibrary`]
pub trait Annotator: Sync {
    fn id(&self) -> &str;

    fn source(&self) -> MatchSource;

    fn library(&self) -> &ReferenceLibrary;

    /// The parameters used when a call does not override them
    fn parameters(&self) -> &MsRefSearchParameter;

    /// The parameters for one call, checking an override with
    /// [`MsRefSearchParameter::validate`]
    fn resolve_parameters<'p>(
        &'p self,
        params: Option<&'p MsRefSearchParameter>,
    ) -> Result<&'p MsRefSearchParameter, AnnotationError> {
        match params {
            Some(params) => {
                params.validate()?;
                Ok(params)
            }
            None => Ok(self.parameters()),
        }
    }

    /// Score `query` against a single `reference` without searching
    fn calculate_score(
        &self,
        query: &MsQuery,
        reference: &MoleculeMsReference,
        params: Option<&MsRefSearchParameter>,
    ) -> Result<MsScanMatchResult, AnnotationError>;

    /// Whether a scored result counts as an identification
    fn is_reference_match(&self, result: &MsScanMatchResult, params: Option<&MsRefSearchParameter>) -> bool;

    fn validate(
        &self,
        result: &mut MsScanMatchResult,
        query: &MsQuery,
        reference: &MoleculeMsReference,
        params: Option<&MsRefSearchParameter>,
    ) {
        validate_match(result, query, reference, params.unwrap_or(self.parameters()))
    }

    /// Retrieve the library entries compatible with `query`, along with their
    /// library positions, without scoring them.
    fn search<'s>(
        &'s self,
        query: &MsQuery,
        params: Option<&MsRefSearchParameter>,
    ) -> Result<Vec<(usize, &'s MoleculeMsReference)>, AnnotationError> {
        let params = self.resolve_parameters(params)?;
        let library = self.library();
        let candidates: Vec<usize> = match query.precursor_mz {
            Some(mz) => library.candidate_range(mz, params).collect(),
            None => retention_candidates(library, query, params),
        };
        let by_retention = params.use_time_for_filtering || query.precursor_mz.is_none();
        let hits: Vec<_> = candidates
            .into_iter()
            .filter_map(|i| library.get(i).map(|r| (i, r)))
            .filter(|(_, r)| !by_retention || retention_agrees(query, r, params).unwrap_or(false))
            .filter(|(_, r)| {
                !params.use_ccs_for_filtering
                    || within(query.ccs, r.ccs, params.ccs_tolerance).unwrap_or(true)
            })
            .collect();
        Ok(hits)
    }

    /// Score every retrieved candidate, best first, keeping those at or above
    /// the total score cutoff
    fn find_candidates(
        &self,
        query: &MsQuery,
        params: Option<&MsRefSearchParameter>,
    ) -> Result<Vec<MsScanMatchResult>, AnnotationError> {
        let params = self.resolve_parameters(params)?;
        let mut candidates = Vec::new();
        for (ordinal, reference) in self.search(query, Some(params))? {
            let mut result = self.calculate_score(query, reference, Some(params))?;
            result.library_id_when_ordered = ordinal;
            trace!(
                "{} scored {} at {:.3}",
                self.id(),
                reference.name,
                result.total_score
            );
            if result.total_score >= params.total_score_cutoff {
                candidates.push(result);
            }
        }
        candidates.sort_by(MsScanMatchResult::best_first);
        Ok(candidates)
    }

    /// The best candidate, if any
    fn annotate(
        &self,
        query: &MsQuery,
        params: Option<&MsRefSearchParameter>,
    ) -> Result<Option<MsScanMatchResult>, AnnotationError> {
        Ok(self.find_candidates(query, params)?.into_iter().next())
    }

    fn refer(&self, result: &MsScanMatchResult) -> Option<&MoleculeMsReference> {
        self.library().refer(result).map(|(_, r)| r)
    }
}

fn base_result(annotator: &dyn Annotator, reference: &MoleculeMsReference) -> MsScanMatchResult {
    MsScanMatchResult {
        name: reference.name.clone(),
        inchikey: reference.inchikey.clone(),
        library_id: reference.scan_id,
        annotator_id: annotator.id().to_string(),
        source: annotator.source(),
        ..Default::default()
    }
}

fn retention_requirement(result: &MsScanMatchResult, params: &MsRefSearchParameter) -> bool {
    !params.use_time_for_filtering || result.is_rt_match || result.is_ri_match
}

/// Scores fragment spectra as well as precursor, retention, CCS and isotopes
#[derive(Debug, Clone)]
pub struct MspAnnotator {
    id: String,
    library: ReferenceLibrary,
    params: MsRefSearchParameter,
}

impl MspAnnotator {
    pub fn new(
        id: impl Into<String>,
        references: Vec<MoleculeMsReference>,
        secondary: SecondaryKey,
        params: MsRefSearchParameter,
    ) -> Result<Self, AnnotationError> {
        params.validate()?;
        Ok(Self {
            id: id.into(),
            library: ReferenceLibrary::new(references, secondary),
            params,
        })
    }
}

impl Annotator for MspAnnotator {
    fn id(&self) -> &str {
        &self.id
    }

    fn source(&self) -> MatchSource {
        MatchSource::Msp
    }

    fn library(&self) -> &ReferenceLibrary {
        &self.library
    }

    fn parameters(&self) -> &MsRefSearchParameter {
        &self.params
    }

    fn calculate_score(
        &self,
        query: &MsQuery,
        reference: &MoleculeMsReference,
        params: Option<&MsRefSearchParameter>,
    ) -> Result<MsScanMatchResult, AnnotationError> {
        let params = self.resolve_parameters(params)?;
        let mut result = base_result(self, reference);
        let spectral = compare_spectra(query.spectrum, &reference.spectrum, &params.spectrum_similarity_params());
        result.weighted_dot_product = spectral.weighted_dot_product;
        result.simple_dot_product = spectral.simple_dot_product;
        result.reverse_dot_product = spectral.reverse_dot_product;
        result.matched_peaks_count = spectral.matched_peaks_count;
        result.matched_peaks_percentage = spectral.matched_peaks_percentage;
        score_coordinates(&mut result, query, reference, params);
        result.aggregate_total_score();
        self.validate(&mut result, query, reference, Some(params));
        Ok(result)
    }

    fn is_reference_match(&self, result: &MsScanMatchResult, params: Option<&MsRefSearchParameter>) -> bool {
        let params = params.unwrap_or(&self.params);
        let precursor_ok = result.is_precursor_mz_match || result.accurate_mass_similarity == NOT_APPLICABLE;
        result.is_spectrum_match && precursor_ok && retention_requirement(result, params)
    }
}

/// Scores precursor, retention, CCS and isotopes of a compound list without spectra
#[derive(Debug, Clone)]
pub struct TextDbAnnotator {
    id: String,
    library: ReferenceLibrary,
    params: MsRefSearchParameter,
}

impl TextDbAnnotator {
    pub fn new(
        id: impl Into<String>,
        references: Vec<MoleculeMsReference>,
        secondary: SecondaryKey,
        params: MsRefSearchParameter,
    ) -> Result<Self, AnnotationError> {
        params.validate()?;
        Ok(Self {
            id: id.into(),
            library: ReferenceLibrary::new(references, secondary),
            params,
        })
    }
}

impl Annotator for TextDbAnnotator {
    fn id(&self) -> &str {
        &self.id
    }

    fn source(&self) -> MatchSource {
        MatchSource::TextDb
    }

    fn library(&self) -> &ReferenceLibrary {
        &self.library
    }

    fn parameters(&self) -> &MsRefSearchParameter {
        &self.params
    }

    fn calculate_score(
        &self,
        query: &MsQuery,
        reference: &MoleculeMsReference,
        params: Option<&MsRefSearchParameter>,
    ) -> Result<MsScanMatchResult, AnnotationError> {
        let params = self.resolve_parameters(params)?;
        let mut result = base_result(self, reference);
        score_coordinates(&mut result, query, reference, params);
        result.aggregate_total_score();
        self.validate(&mut result, query, reference, Some(params));
        Ok(result)
    }

    fn is_reference_match(&self, result: &MsScanMatchResult, params: Option<&MsRefSearchParameter>) -> bool {
        let params = params.unwrap_or(&self.params);
        result.is_precursor_mz_match && retention_requirement(result, params)
    }
}

/// Annotate every spot with its best library candidate, in parallel.
///
/// Spots carrying a manual identification are left untouched. A candidate
/// that fails [`Annotator::is_reference_match`] is recorded with its flags
/// cleared so it cannot count as an identification. Returns the number of
/// spots identified by this annotator.
pub fn annotate_spots(
    spots: &mut [AlignmentSpotProperty],
    annotator: &dyn Annotator,
    technology: Technology,
    params: Option<&MsRefSearchParameter>,
) -> Result<usize, AnnotationError> {
    let params = annotator.resolve_parameters(params)?;
    info!("Annotating {} spots with {}", spots.len(), annotator.id());
    let identified = spots
        .par_iter_mut()
        .map(|spot| {
            if spot.is_manually_identified() {
                return Ok(0);
            }
            let best = {
                let query = MsQuery::from_spot(spot, technology);
                annotator.annotate(&query, Some(params))?
            };
            let Some(mut best) = best else {
                return Ok(0);
            };
            let is_hit = annotator.is_reference_match(&best, Some(params));
            if !is_hit {
                best.is_spectrum_match = false;
                best.is_precursor_mz_match = false;
            }
            debug!(
                "Spot {} best {} candidate {} ({:.3}, match: {is_hit})",
                spot.alignment_id,
                annotator.id(),
                best.name,
                best.total_score
            );
            spot.set_match(best);
            Ok(usize::from(is_hit))
        })
        .sum::<Result<usize, AnnotationError>>()?;
    info!("{} identified {identified} spots", annotator.id());
    Ok(identified)
}

/// Annotate the peaks of a single file with every annotator, before alignment.
///
/// The winning result of each annotator is stored on the peak, and its
/// identity is copied onto the peak when it counts as a reference match.
pub fn annotate_features(
    features: &mut [ChromatogramPeakFeature],
    annotators: &[&dyn Annotator],
    technology: Technology,
) -> Result<usize, AnnotationError> {
    let mut identified = 0;
    for feature in features.iter_mut() {
        for annotator in annotators {
            let best = {
                let mut query = MsQuery::from_feature(feature);
                if technology == Technology::GcMs {
                    query.precursor_mz = None;
                }
                annotator.annotate(&query, None)?
            };
            let Some(mut best) = best else {
                continue;
            };
            if annotator.is_reference_match(&best, None) {
                identified += 1;
                feature.name = best.name.clone();
                feature.inchikey = best.inchikey.clone();
            } else {
                best.is_spectrum_match = false;
                best.is_precursor_mz_match = false;
            }
            match best.source {
                MatchSource::TextDb => feature.textdb_match = Some(best),
                _ => feature.msp_match = Some(best),
            }
        }
    }
    Ok(identified)
}

/// A [`PeakFeatureSource`] that annotates every file's peaks as they are loaded
pub struct AnnotatingPeakSource<'a> {
    inner: &'a dyn PeakFeatureSource,
    annotators: Vec<&'a dyn Annotator>,
    technology: Technology,
}

impl<'a> AnnotatingPeakSource<'a> {
    pub fn new(inner: &'a dyn PeakFeatureSource, annotators: Vec<&'a dyn Annotator>, technology: Technology) -> Self {
        Self {
            inner,
            annotators,
            technology,
        }
    }
}

impl PeakFeatureSource for AnnotatingPeakSource<'_> {
    fn load_peaks(&self, file: &AnalysisFile) -> io::Result<Vec<ChromatogramPeakFeature>> {
        let mut peaks = self.inner.load_peaks(file)?;
        let identified = annotate_features(&mut peaks, &self.annotators, self.technology)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        debug!("Identified {identified} of {} peaks in {}", peaks.len(), file.name);
        Ok(peaks)
    }
}

/// The axis a library should use as its secondary sort key for `technology`
pub fn secondary_key_for(technology: Technology, axis: ChromXType) -> SecondaryKey {
    match (technology, axis) {
        (Technology::GcMs, ChromXType::RI) => SecondaryKey::RI,
        _ => SecondaryKey::RT,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_isotope_similarity() {
        assert!((isotope_similarity(&[1.0, 0.2, 0.05], &[0.2, 0.05]) - 1.0).abs() < 1e-12);
        let s = isotope_similarity(&[2.0, 0.6, 0.1], &[0.2, 0.05]);
        assert!((s - 0.95).abs() < 1e-12);
        assert_eq!(isotope_similarity(&[], &[0.2]), NOT_APPLICABLE);
        assert_eq!(isotope_similarity(&[1.0], &[0.2]), NOT_APPLICABLE);
    }

    #[test]
    fn test_retrieval_by_retention_without_precursor() {
        let annotator = TextDbAnnotator::new(
            "ei",
            vec![
                MoleculeMsReference::new(0, "early", 0.0).with_ri(1100.0),
                MoleculeMsReference::new(1, "late", 0.0).with_ri(1500.0),
            ],
            SecondaryKey::RI,
            MsRefSearchParameter::default(),
        )
        .unwrap();
        let chrom = ChromXs::from_rt(6.0).with(ChromXType::RI, 1480.0);
        let query = MsQuery::new(None, chrom, &[]);
        let hits = annotator.search(&query, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.name, "late");
    }

    #[test]
    fn test_retention_window_keeps_unindexed_entries() {
        let annotator = TextDbAnnotator::new(
            "ei",
            vec![
                MoleculeMsReference::new(0, "early", 0.0).with_ri(1100.0),
                MoleculeMsReference::new(1, "rt only", 0.0).with_rt(6.1),
                MoleculeMsReference::new(2, "late", 0.0).with_ri(1500.0),
                MoleculeMsReference::new(3, "later", 0.0).with_ri(1590.0),
            ],
            SecondaryKey::RI,
            MsRefSearchParameter::default(),
        )
        .unwrap();
        let query = MsQuery::new(None, ChromXs::from_rt(6.0).with(ChromXType::RI, 1480.0), &[]);
        let names: Vec<&str> = annotator
            .search(&query, None)
            .unwrap()
            .into_iter()
            .map(|(_, r)| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["rt only", "late"]);

        let rt_only = MsQuery::new(None, ChromXs::from_rt(6.0), &[]);
        let hits = annotator.search(&rt_only, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1.name, "rt only");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let reference = MoleculeMsReference::new(0, "x", 300.1).with_rt(5.0);
        let annotator = TextDbAnnotator::new(
            "textdb",
            vec![reference.clone()],
            SecondaryKey::RT,
            MsRefSearchParameter::default(),
        )
        .unwrap();
        let query = MsQuery::new(Some(300.1), ChromXs::from_rt(5.0), &[]);
        let bad = MsRefSearchParameter {
            ms1_tolerance: -0.01,
            ..Default::default()
        };
        let above_one = MsRefSearchParameter {
            total_score_cutoff: 1.5,
            ..Default::default()
        };
        for params in [&bad, &above_one] {
            assert!(matches!(
                annotator.search(&query, Some(params)),
                Err(AnnotationError::InvalidConfiguration(_))
            ));
            assert!(annotator.find_candidates(&query, Some(params)).is_err());
            assert!(annotator.annotate(&query, Some(params)).is_err());
            assert!(annotator.calculate_score(&query, &reference, Some(params)).is_err());
        }
        assert_eq!(annotator.search(&query, None).unwrap().len(), 1);

        let mut spots = vec![AlignmentSpotProperty::new(vec![])];
        assert!(annotate_spots(&mut spots, &annotator, Technology::LcMs, Some(&bad)).is_err());
    }
}
