//! Aligned spots: one chemical species across every input file
use std::cmp::Ordering;

use crate::chrom::{ChromX, ChromXType, ChromXs};
use crate::matching::{MatchSource, MsScanMatchResult, NOT_APPLICABLE};
use crate::peak::AlignmentChromPeakFeature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpotLinkKind {
    Isotope,
    Adduct,
}

/// A relation from one spot to another spot eluting at the same time
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpotLink {
    /// The `alignment_id` of the other spot
    pub linked_id: usize,
    pub kind: SpotLinkKind,
    /// A human readable description, e.g. `M+1` or `[M+Na]+`
    pub annotation: String,
}

/// One species across all samples.
///
/// `aligned_peaks` always holds exactly one slot per input file, in input
/// file order, gaps included.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlignmentSpotProperty {
    pub alignment_id: usize,
    pub master_alignment_id: usize,
    pub representative_file_id: usize,

    pub aligned_peaks: Vec<AlignmentChromPeakFeature>,

    pub average_height: f64,
    pub min_height: f64,
    pub max_height: f64,
    pub average_signal_to_noise: f64,

    pub time_center: ChromXs,
    pub time_min: ChromXs,
    pub time_max: ChromXs,

    pub mass_center: f64,
    pub mass_min: f64,
    pub mass_max: f64,

    pub fill_percentage: f64,
    pub monoisotopic_percentage: f64,

    pub quant_mass: f64,

    pub name: String,
    pub library_id: i64,
    pub inchikey: String,
    pub formula: String,
    pub ontology: String,
    pub msp_match: Option<MsScanMatchResult>,
    pub textdb_match: Option<MsScanMatchResult>,

    pub isotope_weight_number: usize,
    /// The `alignment_id` of the monoisotopic spot this spot is an isotope of
    pub isotope_parent_id: Option<usize>,
    pub adduct_type: String,
    pub links: Vec<SpotLink>,
}

fn min_max_mean<I: Iterator<Item = f64>>(values: I) -> Option<(f64, f64, f64)> {
    let mut n = 0usize;
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    let mut total = 0.0;
    for v in values {
        n += 1;
        lo = lo.min(v);
        hi = hi.max(v);
        total += v;
    }
    if n == 0 {
        None
    } else {
        Some((lo, hi, total / n as f64))
    }
}

impl AlignmentSpotProperty {
    /// Build a spot from its per-file slots and compute its aggregates
    pub fn new(aligned_peaks: Vec<AlignmentChromPeakFeature>) -> Self {
        let mut this = Self {
            library_id: -1,
            aligned_peaks,
            ..Default::default()
        };
        this.update_statistics();
        this
    }

    /// The number of slots with a detected peak
    pub fn detected_count(&self) -> usize {
        self.aligned_peaks.iter().filter(|p| !p.is_gap()).count()
    }

    pub fn has_gaps(&self) -> bool {
        self.aligned_peaks.iter().any(|p| p.is_gap())
    }

    pub fn is_identified(&self) -> bool {
        self.library_id >= 0
    }

    pub fn representative(&self) -> Option<&AlignmentChromPeakFeature> {
        self.aligned_peaks
            .iter()
            .find(|p| p.file_id == self.representative_file_id)
    }

    /// The apex of the spot along `axis`
    pub fn center(&self, axis: ChromXType) -> Option<f64> {
        self.time_center.value(axis)
    }

    /// Recompute every aggregate from `aligned_peaks`.
    ///
    /// Heights cover every slot, so unfilled gaps count as zero. Coordinates
    /// and signal to noise cover the detected peaks, falling back to every
    /// slot when nothing was detected.
    pub fn update_statistics(&mut self) {
        let n = self.aligned_peaks.len();
        if n == 0 {
            self.fill_percentage = 0.0;
            return;
        }
        let detected: Vec<&AlignmentChromPeakFeature> =
            self.aligned_peaks.iter().filter(|p| !p.is_gap()).collect();
        self.fill_percentage = detected.len() as f64 / n as f64;
        self.monoisotopic_percentage = if detected.is_empty() {
            0.0
        } else {
            detected
                .iter()
                .filter(|p| p.feature.isotope_weight_number == 0)
                .count() as f64
                / detected.len() as f64
        };

        if let Some((lo, hi, mean)) = min_max_mean(self.aligned_peaks.iter().map(|p| p.height())) {
            self.min_height = lo;
            self.max_height = hi;
            self.average_height = mean;
        }

        let basis: Vec<&AlignmentChromPeakFeature> = if detected.is_empty() {
            self.aligned_peaks.iter().collect()
        } else {
            detected
        };

        self.average_signal_to_noise = basis
            .iter()
            .map(|p| p.feature.signal_to_noise)
            .sum::<f64>()
            / basis.len() as f64;

        if let Some((lo, hi, mean)) = min_max_mean(basis.iter().map(|p| p.feature.mass)) {
            self.mass_min = lo;
            self.mass_max = hi;
            self.mass_center = mean;
        }

        let main_type = basis[0].feature.chrom_top.main_type();
        let stats: Vec<(ChromXType, (f64, f64, f64))> =
            [ChromXType::RT, ChromXType::RI, ChromXType::Drift, ChromXType::Mz]
                .into_iter()
                .filter_map(|axis| {
                    min_max_mean(basis.iter().filter_map(|p| p.feature.apex(axis))).map(|s| (axis, s))
                })
                .collect();
        let main = if stats.iter().any(|(axis, _)| *axis == main_type) {
            main_type
        } else if let Some((axis, _)) = stats.first() {
            *axis
        } else {
            return;
        };
        let build = |pick: fn(&(f64, f64, f64)) -> f64| {
            let mut x = ChromXs::new(ChromX::new(main, 0.0, main.default_unit()));
            for (axis, s) in stats.iter() {
                x.set(*axis, pick(s));
            }
            x
        };
        self.time_min = build(|s| s.0);
        self.time_max = build(|s| s.1);
        self.time_center = build(|s| s.2);
    }

    /// Choose the file whose peak best represents this spot.
    ///
    /// When any peak carries an MS/MS identification, the peak with the highest
    /// spectral library total score wins, then the highest peak. Otherwise the
    /// text database total score decides, with ties going to the lowest file
    /// ID. Without any text database score the highest peak wins.
    pub fn select_representative_file(&self) -> usize {
        let detected: Vec<&AlignmentChromPeakFeature> =
            self.aligned_peaks.iter().filter(|p| !p.is_gap()).collect();
        let pool: Vec<&AlignmentChromPeakFeature> = if detected.is_empty() {
            self.aligned_peaks.iter().collect()
        } else {
            detected
        };
        let by_height = |a: &&AlignmentChromPeakFeature, b: &&AlignmentChromPeakFeature| {
            a.height()
                .total_cmp(&b.height())
                .then_with(|| b.file_id.cmp(&a.file_id))
        };
        let best = if pool.iter().any(|p| p.feature.is_msms_identified()) {
            pool.iter().copied().max_by(|a, b| {
                a.feature
                    .msp_total_score()
                    .total_cmp(&b.feature.msp_total_score())
                    .then_with(|| by_height(a, b))
            })
        } else if pool.iter().any(|p| p.feature.textdb_total_score() > NOT_APPLICABLE) {
            pool.iter().copied().max_by(|a, b| {
                a.feature
                    .textdb_total_score()
                    .total_cmp(&b.feature.textdb_total_score())
                    .then_with(|| b.file_id.cmp(&a.file_id))
            })
        } else {
            pool.iter().copied().max_by(by_height)
        };
        best.map(|p| p.file_id).unwrap_or_default()
    }

    /// Pick the representative file and copy its identity onto the spot.
    /// A manual identification already on the spot is never replaced.
    pub fn assign_representative(&mut self) {
        self.representative_file_id = self.select_representative_file();
        let Some(rep) = self.representative().map(|p| p.feature.clone()) else {
            return;
        };
        if rep.quant_mass > 0.0 {
            self.quant_mass = rep.quant_mass;
        } else if self.quant_mass <= 0.0 {
            self.quant_mass = self.mass_center;
        }
        if self.is_manually_identified() {
            return;
        }
        self.msp_match = rep.msp_match.clone();
        self.textdb_match = rep.textdb_match.clone();
        match rep.best_match() {
            Some(m) => {
                self.library_id = m.library_id;
                self.name = if rep.name.is_empty() {
                    m.name.clone()
                } else {
                    rep.name.clone()
                };
                self.inchikey = if rep.inchikey.is_empty() {
                    m.inchikey.clone()
                } else {
                    rep.inchikey.clone()
                };
            }
            None => {
                self.library_id = -1;
                self.name = rep.name.clone();
                self.inchikey = rep.inchikey.clone();
            }
        }
        self.formula = rep.formula.clone();
        self.ontology = rep.ontology.clone();
    }

    /// Copy an annotation result onto the spot's identity fields
    pub fn set_match(&mut self, result: MsScanMatchResult) {
        if self.is_manually_identified() {
            return;
        }
        if result.is_identified() {
            self.library_id = result.library_id;
            self.name = result.name.clone();
            self.inchikey = result.inchikey.clone();
        }
        match result.source {
            MatchSource::TextDb => self.textdb_match = Some(result),
            _ => self.msp_match = Some(result),
        }
    }

    pub fn is_manually_identified(&self) -> bool {
        [&self.msp_match, &self.textdb_match]
            .into_iter()
            .flatten()
            .any(|m| m.source == MatchSource::Manual)
    }

    /// The key spots are finally ordered by
    pub fn order_key(&self, axis: ChromXType) -> (f64, f64) {
        (self.center(axis).unwrap_or_default(), self.quant_mass)
    }

    pub fn cmp_by_order_key(&self, other: &Self, axis: ChromXType) -> Ordering {
        let (a0, a1) = self.order_key(axis);
        let (b0, b1) = other.order_key(axis);
        a0.total_cmp(&b0).then_with(|| a1.total_cmp(&b1))
    }
}
