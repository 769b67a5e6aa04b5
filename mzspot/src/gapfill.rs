//! Gap filling.
//!
//! For every spot slot where a file had no detected peak, re-extract a local
//! ion chromatogram from that file's raw spectra around the spot's consensus
//! position and reconstruct a peak from it. When there is no signal the slot
//! becomes a zero intensity point at the expected position. Gap filling never
//! invents signal, and a filled slot keeps the gap sentinel as its peak ID.
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use mzpeaks::{prelude::*, CentroidPeak};
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::chrom::{ChromXType, ChromXs};
use crate::comparer::PeakComparer;
use crate::error::AlignmentError;
use crate::interval::{SimpleInterval, Span1D};
use crate::matching::MsScanMatchResult;
use crate::params::{AlignmentParameters, IonMode};
use crate::peak::{AlignmentChromPeakFeature, AnalysisFile, ChromatogramPeak, ChromatogramPeakFeature, GAP_PEAK_ID};
use crate::retention_index::RetentionIndexCalibration;
use crate::spot::AlignmentSpotProperty;

/// Peaks below this fraction of the tallest peak do not vote for the quant mass
const MAJORITY_HEIGHT_FRACTION: f64 = 0.1;
/// A voted quant mass must reach this fraction of the representative base peak
const MAJORITY_BASE_PEAK_FRACTION: f64 = 0.1;
/// The gap filling window spans this many peak widths around the center
const SEARCH_WIDTH_FACTOR: f64 = 3.0;

/// One scan of a raw data file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawSpectrum {
    pub index: usize,
    pub scan_number: usize,
    /// Retention time in minutes
    pub rt: f64,
    pub ms_level: u8,
    pub polarity: IonMode,
    pub precursor_mz: Option<f64>,
    pub drift: Option<f64>,
    /// Centroids sorted by m/z
    pub peaks: Vec<CentroidPeak>,
}

impl RawSpectrum {
    pub fn new(index: usize, rt: f64, ms_level: u8, mut peaks: Vec<CentroidPeak>) -> Self {
        peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        Self {
            index,
            scan_number: index,
            rt,
            ms_level,
            polarity: IonMode::Positive,
            precursor_mz: None,
            drift: None,
            peaks,
        }
    }

    pub fn with_drift(mut self, drift: f64) -> Self {
        self.drift = Some(drift);
        self
    }

    /// The summed intensity of the peaks inside `[lo, hi]`
    pub fn intensity_between(&self, lo: f64, hi: f64) -> f64 {
        let start = self.peaks.partition_point(|p| p.mz() < lo);
        self.peaks[start..]
            .iter()
            .take_while(|p| p.mz() <= hi)
            .map(|p| p.intensity() as f64)
            .sum()
    }
}

/// Something that can produce the raw spectra of one input file
pub trait RawSpectrumSource: Sync {
    fn load_spectra(&self, file: &AnalysisFile) -> io::Result<Vec<RawSpectrum>>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryRawSource {
    spectra: HashMap<usize, Vec<RawSpectrum>>,
}

impl InMemoryRawSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_id: usize, spectra: Vec<RawSpectrum>) {
        self.spectra.insert(file_id, spectra);
    }

    pub fn with(mut self, file_id: usize, spectra: Vec<RawSpectrum>) -> Self {
        self.insert(file_id, spectra);
        self
    }
}

impl RawSpectrumSource for InMemoryRawSource {
    fn load_spectra(&self, file: &AnalysisFile) -> io::Result<Vec<RawSpectrum>> {
        self.spectra.get(&file.id).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No raw spectra registered for file {}", file.id),
            )
        })
    }
}

/// Resolves the quant mass of the library reference an identification points to
pub trait QuantMassLookup: Sync {
    fn reference_quant_mass(&self, result: &MsScanMatchResult) -> Option<f64>;
}

/// Where to look for a missing peak in one file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapTarget {
    /// The expected apex retention time in this file
    pub center_rt: f64,
    /// The expected peak width in retention time
    pub width_rt: f64,
    pub mz: f64,
    pub drift: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct ReconstructedPeak {
    left: usize,
    apex: usize,
    right: usize,
}

/// The first of the most intense points
fn tallest<'a>(points: impl Iterator<Item = (usize, &'a ChromatogramPeak)>) -> Option<(usize, f64)> {
    points.fold(None, |best, (i, p)| match best {
        Some((_, h)) if h >= p.intensity => best,
        _ => Some((i, p.intensity)),
    })
}

#[derive(Debug, Clone)]
pub struct GapFiller {
    comparer: PeakComparer,
    params: AlignmentParameters,
}

impl GapFiller {
    pub fn new(comparer: PeakComparer, params: AlignmentParameters) -> Self {
        Self { comparer, params }
    }

    fn is_gcms(&self) -> bool {
        matches!(self.comparer, PeakComparer::Gcms(_))
    }

    fn uses_retention_index(&self) -> bool {
        self.comparer.primary_axis() == ChromXType::RI
    }

    /// Choose the quant mass of a GC-MS spot.
    ///
    /// In order of preference: the library reference's quant mass if library
    /// replacement is on and it lies in the scan mass range, the base peak of
    /// the representative spectrum if configured, the majority quant mass
    /// among the tall peaks if the representative spectrum confirms it, the
    /// representative peak's quant mass, and finally its base peak.
    pub fn select_quant_mass(
        &self,
        spot: &AlignmentSpotProperty,
        lookup: Option<&dyn QuantMassLookup>,
    ) -> f64 {
        let rep = spot.representative().map(|p| &p.feature);
        if self.params.replace_quant_mass_by_library {
            let hit = spot
                .msp_match
                .as_ref()
                .or_else(|| rep.and_then(|r| r.msp_match.as_ref()))
                .filter(|m| m.is_identified());
            if let (Some(lookup), Some(hit)) = (lookup, hit) {
                if let Some(q) = lookup
                    .reference_quant_mass(hit)
                    .filter(|q| self.params.mass_range.contains(q))
                {
                    return q;
                }
            }
        }
        if self.params.use_representative_base_peak {
            if let Some(q) = rep.and_then(|r| r.base_peak_mz()) {
                return q;
            }
        }
        if let Some(q) = rep.and_then(|r| self.majority_quant_mass(spot, &r.spectrum)) {
            return q;
        }
        if let Some(q) = rep.map(|r| r.quant_mass).filter(|q| *q > 0.0) {
            return q;
        }
        rep.and_then(|r| r.base_peak_mz()).unwrap_or(spot.quant_mass)
    }

    /// The quant mass shared by the most peaks at least a tenth as tall as the
    /// tallest, confirmed by a representative spectrum peak of at least a tenth
    /// of the base peak.
    fn majority_quant_mass(&self, spot: &AlignmentSpotProperty, spectrum: &[CentroidPeak]) -> Option<f64> {
        let detected: Vec<&ChromatogramPeakFeature> = spot
            .aligned_peaks
            .iter()
            .filter(|p| !p.is_gap())
            .map(|p| &p.feature)
            .collect();
        let max_height = detected.iter().map(|p| p.height_top).fold(0.0, f64::max);
        if max_height <= 0.0 {
            return None;
        }
        // rounded mass -> (votes, tallest voter height, tallest voter quant mass)
        let mut votes: BTreeMap<i64, (usize, f64, f64)> = BTreeMap::new();
        for p in detected
            .iter()
            .filter(|p| p.height_top >= max_height * MAJORITY_HEIGHT_FRACTION && p.quant_mass > 0.0)
        {
            let entry = votes
                .entry(p.quant_mass.round() as i64)
                .or_insert((0, f64::NEG_INFINITY, p.quant_mass));
            entry.0 += 1;
            if p.height_top > entry.1 {
                entry.1 = p.height_top;
                entry.2 = p.quant_mass;
            }
        }
        let (_, height, quant_mass) = votes.into_values().fold(None, |best: Option<(usize, f64, f64)>, v| match best {
            Some(b) if (b.0, b.1) >= (v.0, v.1) => Some(b),
            _ => Some(v),
        })?;
        trace!("Majority quant mass {quant_mass} from a peak of height {height}");

        let base = spectrum.iter().map(|p| p.intensity() as f64).fold(0.0, f64::max);
        let confirmed = spectrum.iter().any(|p| {
            (p.mz() - quant_mass).abs() <= self.params.mz_tolerance
                && p.intensity() as f64 >= base * MAJORITY_BASE_PEAK_FRACTION
        });
        if base > 0.0 && confirmed {
            Some(quant_mass)
        } else {
            None
        }
    }

    /// Where a spot's missing peak should be in `file`, judged from the peaks
    /// the other files contributed.
    pub fn target_for(
        &self,
        spot: &AlignmentSpotProperty,
        file: &AnalysisFile,
    ) -> Result<GapTarget, AlignmentError> {
        let others: Vec<&ChromatogramPeakFeature> = spot
            .aligned_peaks
            .iter()
            .filter(|p| p.file_id != file.id && !p.is_gap())
            .map(|p| &p.feature)
            .collect();
        let axis = self.comparer.primary_axis();
        let center = self
            .comparer
            .center(others.iter().copied())
            .unwrap_or(spot.time_center);
        let center_value = center
            .value(axis)
            .or_else(|| spot.center(axis))
            .unwrap_or_default();
        let width = self.comparer.average_peak_width(others.iter().copied());

        let (center_rt, width_rt) = if self.uses_retention_index() {
            let calibration = self.calibration_of(file)?;
            (
                calibration.ri_to_rt(center_value),
                calibration.ri_width_to_rt(center_value, width),
            )
        } else {
            (center_value, width)
        };

        let mz = if self.is_gcms() {
            spot.quant_mass
        } else if others.is_empty() {
            spot.mass_center
        } else {
            others.iter().map(|p| p.mass).sum::<f64>() / others.len() as f64
        };
        Ok(GapTarget {
            center_rt,
            width_rt,
            mz,
            drift: center.drift(),
        })
    }

    fn calibration_of<'a>(&self, file: &'a AnalysisFile) -> Result<&'a RetentionIndexCalibration, AlignmentError> {
        file.calibration
            .as_ref()
            .ok_or_else(|| AlignmentError::MissingCalibration {
                file_id: file.id,
                file_name: file.name.clone(),
            })
    }

    /// Extract a baseline corrected, smoothed ion chromatogram for `target`
    /// from MS1 spectra sorted by retention time.
    pub fn extract_chromatogram(&self, spectra: &[RawSpectrum], target: &GapTarget) -> Vec<ChromatogramPeak> {
        let half_window = (target.width_rt * SEARCH_WIDTH_FACTOR / 2.0).max(self.params.rt_tolerance);
        let window = SimpleInterval::around(target.center_rt, half_window);
        let half_slice = self.params.mass_slice_width / 2.0;
        let drift_window = match (&self.comparer, target.drift) {
            (PeakComparer::Ims(c), Some(d)) => Some(SimpleInterval::around(d, c.drift_tolerance)),
            _ => None,
        };

        let start = spectra.partition_point(|s| s.rt < window.start);
        let mut raw: Vec<ChromatogramPeak> = Vec::new();
        for s in spectra[start..].iter().take_while(|s| s.rt <= window.end) {
            if s.ms_level != 1 {
                continue;
            }
            if let (Some(dw), Some(d)) = (drift_window.as_ref(), s.drift) {
                if !dw.contains(&d) {
                    continue;
                }
            }
            let intensity = s.intensity_between(target.mz - half_slice, target.mz + half_slice);
            match raw.last_mut() {
                Some(last) if last.chrom_value == s.rt => last.intensity += intensity,
                _ => raw.push(ChromatogramPeak::new(s.index, s.rt, target.mz, intensity)),
            }
        }
        let baseline = raw.iter().map(|p| p.intensity).fold(f64::INFINITY, f64::min);
        if baseline.is_finite() {
            raw.iter_mut()
                .for_each(|p| p.intensity = (p.intensity - baseline).max(0.0));
        }
        self.params
            .smoothing_method
            .smooth(&raw, self.params.smoothing_level)
    }

    /// Locate the apex near the expected center and walk down to both edges
    fn reconstruct(&self, chromatogram: &[ChromatogramPeak], target: &GapTarget) -> Option<ReconstructedPeak> {
        let apex_window = SimpleInterval::around(
            target.center_rt,
            (target.width_rt / 2.0).max(self.params.rt_tolerance),
        );
        let apex = tallest(
            chromatogram
                .iter()
                .enumerate()
                .filter(|(_, p)| apex_window.contains(&p.chrom_value)),
        )
        .or_else(|| tallest(chromatogram.iter().enumerate()))
        .filter(|(_, h)| *h > 0.0)
        .map(|(i, _)| i)?;

        let mut left = apex;
        while left > 0
            && chromatogram[left].intensity > 0.0
            && chromatogram[left - 1].intensity <= chromatogram[left].intensity
        {
            left -= 1;
        }
        let mut right = apex;
        while right + 1 < chromatogram.len()
            && chromatogram[right].intensity > 0.0
            && chromatogram[right + 1].intensity <= chromatogram[right].intensity
        {
            right += 1;
        }
        Some(ReconstructedPeak { left, apex, right })
    }

    fn position(&self, rt: f64, calibration: Option<&RetentionIndexCalibration>, drift: Option<f64>) -> ChromXs {
        let mut x = ChromXs::from_rt(rt);
        if let Some(cal) = calibration {
            x.set(ChromXType::RI, cal.rt_to_ri(rt));
            x.set_main_type(ChromXType::RI);
        }
        if let Some(d) = drift {
            x.set(ChromXType::Drift, d);
        }
        x
    }

    /// Fill one gap of `spot` in `file` from that file's sorted spectra
    pub fn fill_gap(
        &self,
        file: &AnalysisFile,
        spectra: &[RawSpectrum],
        spot: &AlignmentSpotProperty,
    ) -> Result<AlignmentChromPeakFeature, AlignmentError> {
        let target = self.target_for(spot, file)?;
        let calibration = if self.uses_retention_index() {
            Some(self.calibration_of(file)?)
        } else {
            None
        };
        let chromatogram = self.extract_chromatogram(spectra, &target);
        let quant_mass = if self.is_gcms() { target.mz } else { 0.0 };

        let feature = match self.reconstruct(&chromatogram, &target) {
            Some(peak) => {
                let left = &chromatogram[peak.left];
                let apex = &chromatogram[peak.apex];
                let right = &chromatogram[peak.right];
                let area = chromatogram[peak.left..=peak.right]
                    .windows(2)
                    .map(|w| (w[1].chrom_value - w[0].chrom_value) * (w[0].intensity + w[1].intensity) / 2.0)
                    .sum::<f64>();
                ChromatogramPeakFeature {
                    peak_id: GAP_PEAK_ID,
                    chrom_left: self.position(left.chrom_value, calibration, target.drift),
                    chrom_top: self.position(apex.chrom_value, calibration, target.drift),
                    chrom_right: self.position(right.chrom_value, calibration, target.drift),
                    height_left: left.intensity,
                    height_top: apex.intensity,
                    height_right: right.intensity,
                    area_above_zero: area,
                    area_above_baseline: area,
                    mass: target.mz,
                    quant_mass,
                    ms1_raw_scan_id: Some(apex.id),
                    ..Default::default()
                }
            }
            None => {
                let x = self.position(target.center_rt, calibration, target.drift);
                ChromatogramPeakFeature {
                    peak_id: GAP_PEAK_ID,
                    chrom_left: x,
                    chrom_top: x,
                    chrom_right: x,
                    mass: target.mz,
                    quant_mass,
                    ..Default::default()
                }
            }
        };
        let mut slot = AlignmentChromPeakFeature::from_feature(file, feature);
        slot.is_gap_filled = true;
        Ok(slot)
    }

    fn fill_file(
        &self,
        file: &AnalysisFile,
        spots: &[AlignmentSpotProperty],
        source: &dyn RawSpectrumSource,
    ) -> Result<Vec<(usize, AlignmentChromPeakFeature)>, AlignmentError> {
        let gaps: Vec<usize> = spots
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                s.aligned_peaks
                    .get(file.id)
                    .map(|p| p.is_gap() && !p.is_gap_filled)
                    .unwrap_or_default()
            })
            .map(|(i, _)| i)
            .collect();
        if gaps.is_empty() {
            return Ok(Vec::new());
        }
        let mut spectra = source
            .load_spectra(file)
            .map_err(|source| AlignmentError::DataSource {
                file_id: file.id,
                file_name: file.name.clone(),
                source,
            })?;
        spectra.sort_by(|a, b| a.rt.total_cmp(&b.rt));
        let filled = gaps
            .into_iter()
            .map(|i| self.fill_gap(file, &spectra, &spots[i]).map(|slot| (i, slot)))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "Filled {} gaps in {} ({}), {} with signal",
            filled.len(),
            file.name,
            file.id,
            filled.iter().filter(|(_, s)| s.height() > 0.0).count()
        );
        Ok(filled)
    }

    /// Fill every gap of `spots` on the worker pool, one task per file.
    ///
    /// For GC-MS every spot's quant mass is chosen first. Each file task only
    /// reads the spots; the filled slots are written back afterwards.
    /// Returns the number of filled slots.
    pub fn fill(
        &self,
        files: &[AnalysisFile],
        spots: &mut [AlignmentSpotProperty],
        source: &dyn RawSpectrumSource,
        lookup: Option<&dyn QuantMassLookup>,
        progress: Option<&(dyn Fn(usize, usize) + Sync)>,
    ) -> Result<usize, AlignmentError> {
        if let Some(spot) = spots.iter().find(|s| s.aligned_peaks.len() != files.len()) {
            return Err(AlignmentError::InvariantViolation(format!(
                "spot {} has {} slots for {} files",
                spot.alignment_id,
                spot.aligned_peaks.len(),
                files.len()
            )));
        }
        if self.is_gcms() {
            for spot in spots.iter_mut() {
                spot.quant_mass = self.select_quant_mass(spot, lookup);
            }
        }

        let done = AtomicUsize::new(0);
        let shared: &[AlignmentSpotProperty] = spots;
        let results = files
            .par_iter()
            .map(|file| {
                let filled = self.fill_file(file, shared, source);
                let n = done.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                if let Some(cb) = progress {
                    cb(n, files.len());
                }
                filled
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut total = 0;
        for (file, filled) in files.iter().zip(results) {
            for (i, slot) in filled {
                spots[i].aligned_peaks[file.id] = slot;
                total += 1;
            }
        }
        for spot in spots.iter_mut() {
            spot.update_statistics();
        }
        info!("Gap filling completed {total} slots across {} files", files.len());
        Ok(total)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::Technology;

    fn spectrum(index: usize, rt: f64, peaks: &[(f64, f32)]) -> RawSpectrum {
        RawSpectrum::new(
            index,
            rt,
            1,
            peaks
                .iter()
                .enumerate()
                .map(|(i, (mz, int))| CentroidPeak::new(*mz, *int, i as u32))
                .collect(),
        )
    }

    fn lc_filler() -> GapFiller {
        let params = AlignmentParameters::for_technology(Technology::LcMs);
        GapFiller::new(PeakComparer::new(Technology::LcMs, &params), params)
    }

    fn two_file_spot() -> (Vec<AnalysisFile>, AlignmentSpotProperty) {
        let files = vec![AnalysisFile::new(0, "a"), AnalysisFile::new(1, "b")];
        let spot = AlignmentSpotProperty::new(vec![
            AlignmentChromPeakFeature::from_feature(
                &files[0],
                ChromatogramPeakFeature::new(0, 4.95, 5.0, 5.05, 300.1, 1000.0),
            ),
            AlignmentChromPeakFeature::gap(&files[1]),
        ]);
        (files, spot)
    }

    #[test]
    fn test_intensity_between() {
        let s = spectrum(0, 1.0, &[(300.11, 5.0), (100.0, 1.0), (300.09, 10.0), (300.2, 7.0)]);
        assert_eq!(s.intensity_between(300.09, 300.11), 15.0);
        assert_eq!(s.intensity_between(400.0, 500.0), 0.0);
    }

    #[test]
    fn test_fill_with_signal() {
        let filler = lc_filler();
        let (files, spot) = two_file_spot();
        let profile = [0.0, 10.0, 60.0, 100.0, 55.0, 12.0, 0.0];
        let spectra: Vec<RawSpectrum> = profile
            .iter()
            .enumerate()
            .map(|(i, v)| spectrum(i, 4.97 + i as f64 * 0.01, &[(300.1, *v as f32), (200.0, 40.0)]))
            .collect();
        let slot = filler.fill_gap(&files[1], &spectra, &spot).unwrap();
        assert!(slot.is_gap_filled);
        assert_eq!(slot.peak_id(), GAP_PEAK_ID);
        assert!(slot.height() > 0.0);
        assert!((slot.feature.chrom_top.rt().unwrap() - 5.0).abs() < 1e-9);
        assert!(slot.feature.area_above_baseline > 0.0);
    }

    #[test]
    fn test_fill_without_signal_is_zero() {
        let filler = lc_filler();
        let (files, spot) = two_file_spot();
        // flat background at the target mass, a real peak at another mass
        let spectra: Vec<RawSpectrum> = (0..7)
            .map(|i| spectrum(i, 4.97 + i as f64 * 0.01, &[(300.1, 25.0), (200.0, 100.0 * i as f32)]))
            .collect();
        let slot = filler.fill_gap(&files[1], &spectra, &spot).unwrap();
        assert_eq!(slot.height(), 0.0);
        assert_eq!(slot.feature.area_above_baseline, 0.0);
        assert_eq!(slot.feature.chrom_top.rt(), Some(5.0));

        let empty = filler.fill_gap(&files[1], &[], &spot).unwrap();
        assert_eq!(empty.height(), 0.0);
        assert!(empty.is_gap_filled);
    }

    #[test]
    fn test_unreadable_source_propagates() {
        let filler = lc_filler();
        let (files, spot) = two_file_spot();
        let mut spots = vec![spot];
        let source = InMemoryRawSource::new().with(0, Vec::new());
        let err = filler.fill(&files, &mut spots, &source, None, None).unwrap_err();
        assert!(matches!(err, AlignmentError::DataSource { file_id: 1, .. }));
    }

    #[test]
    fn test_majority_quant_mass() {
        let params = AlignmentParameters::for_technology(Technology::GcMs);
        let filler = GapFiller::new(PeakComparer::new(Technology::GcMs, &params), params);
        let files: Vec<AnalysisFile> = (0..4).map(|i| AnalysisFile::new(i, format!("f{i}"))).collect();
        let spectrum = vec![
            CentroidPeak::new(73.0, 1000.0, 0),
            CentroidPeak::new(147.0, 300.0, 1),
            CentroidPeak::new(221.0, 20.0, 2),
        ];
        let slots = [(147.0, 500.0), (147.1, 400.0), (73.0, 900.0), (221.0, 1.0)]
            .iter()
            .zip(files.iter())
            .map(|((q, h), f)| {
                AlignmentChromPeakFeature::from_feature(
                    f,
                    ChromatogramPeakFeature::new(f.id as i64, 4.9, 5.0, 5.1, *q, *h)
                        .with_quant_mass(*q)
                        .with_spectrum(spectrum.clone()),
                )
            })
            .collect();
        let mut spot = AlignmentSpotProperty::new(slots);
        spot.assign_representative();
        assert_eq!(spot.representative_file_id, 2);
        assert_eq!(filler.select_quant_mass(&spot, None), 147.0);
    }
}
