//! Post-processing of joined spots.
//!
//! An [`AlignmentRefiner`] moves through `Joined -> Cleaned -> Ordered -> Linked`.
//! Each transition consumes the previous state, so a step can not be skipped
//! or repeated.
use std::marker::PhantomData;

use tracing::{debug, info};

use crate::chrom::ChromXType;
use crate::comparer::PeakComparer;
use crate::params::{AlignmentParameters, IonMode};
use crate::spot::{AlignmentSpotProperty, SpotLink, SpotLinkKind};

/// The m/z spacing between 13C isotopologues
pub const C13_C12_DIFFERENCE: f64 = 1.003355;
/// The highest isotope peak linked to a monoisotopic spot
pub const MAX_ISOTOPE_WEIGHT: usize = 3;

/// A singly charged adduct: the mass added to the neutral molecule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdductIon {
    pub name: &'static str,
    pub mass_shift: f64,
}

pub const POSITIVE_ADDUCTS: [AdductIon; 4] = [
    AdductIon { name: "[M+H]+", mass_shift: 1.007276 },
    AdductIon { name: "[M+NH4]+", mass_shift: 18.033823 },
    AdductIon { name: "[M+Na]+", mass_shift: 22.989218 },
    AdductIon { name: "[M+K]+", mass_shift: 38.963158 },
];

pub const NEGATIVE_ADDUCTS: [AdductIon; 3] = [
    AdductIon { name: "[M-H]-", mass_shift: -1.007276 },
    AdductIon { name: "[M+Cl]-", mass_shift: 34.969402 },
    AdductIon { name: "[M+HCOO]-", mass_shift: 44.998201 },
];

impl IonMode {
    pub fn adducts(&self) -> &'static [AdductIon] {
        match self {
            IonMode::Positive => &POSITIVE_ADDUCTS,
            IonMode::Negative => &NEGATIVE_ADDUCTS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Joined;
#[derive(Debug, Clone, Copy)]
pub struct Cleaned;
#[derive(Debug, Clone, Copy)]
pub struct Ordered;
#[derive(Debug, Clone, Copy)]
pub struct Linked;

#[derive(Debug, Clone)]
pub struct AlignmentRefiner<S> {
    comparer: PeakComparer,
    params: AlignmentParameters,
    spots: Vec<AlignmentSpotProperty>,
    _state: PhantomData<S>,
}

impl<S> AlignmentRefiner<S> {
    pub fn spots(&self) -> &[AlignmentSpotProperty] {
        &self.spots
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    fn into_state<T>(self) -> AlignmentRefiner<T> {
        AlignmentRefiner {
            comparer: self.comparer,
            params: self.params,
            spots: self.spots,
            _state: PhantomData,
        }
    }

    fn retention_axis(&self) -> ChromXType {
        self.comparer.primary_axis()
    }

    /// The mass two spots are compared by when removing duplicates
    fn spot_mass(&self, spot: &AlignmentSpotProperty) -> f64 {
        match self.comparer {
            PeakComparer::Gcms(_) => spot.quant_mass,
            PeakComparer::Lcms(_) | PeakComparer::Ims(_) => spot.mass_center,
        }
    }
}

impl AlignmentRefiner<Joined> {
    pub fn new(comparer: PeakComparer, params: AlignmentParameters, spots: Vec<AlignmentSpotProperty>) -> Self {
        Self {
            comparer,
            params,
            spots,
            _state: PhantomData,
        }
    }

    /// Run every refinement step
    pub fn refine(self) -> AlignmentRefiner<Linked> {
        self.clean().order().link()
    }

    /// Drop unidentified spots that duplicate a kept spot.
    ///
    /// Identified spots are always kept. Every unidentified spot, in joined
    /// order, is compared against everything kept so far and dropped if one of
    /// them is within the cleaning mass tolerance and the cleaning retention
    /// tolerance.
    pub fn clean(self) -> AlignmentRefiner<Cleaned> {
        let axis = self.retention_axis();
        let mass_tolerance = self.params.clean_mass_tolerance;
        let retention_tolerance = self.params.clean_retention_tolerance();
        let mut this = self;
        let spots = std::mem::take(&mut this.spots);
        let before = spots.len();

        let (mut kept, unidentified): (Vec<_>, Vec<_>) =
            spots.into_iter().partition(|s| s.is_identified());
        for spot in unidentified {
            let mass = this.spot_mass(&spot);
            let retention = spot.center(axis).unwrap_or_default();
            let duplicate = kept.iter().any(|k| {
                (this.spot_mass(k) - mass).abs() <= mass_tolerance
                    && (k.center(axis).unwrap_or_default() - retention).abs() <= retention_tolerance
            });
            if !duplicate {
                kept.push(spot);
            }
        }
        debug!("Cleaning removed {} of {} spots", before - kept.len(), before);
        this.spots = kept;
        this.into_state()
    }
}

impl AlignmentRefiner<Cleaned> {
    /// Sort spots by retention then mass and assign dense alignment IDs
    pub fn order(self) -> AlignmentRefiner<Ordered> {
        let axis = self.retention_axis();
        let mut this = self;
        this.spots.sort_by(|a, b| a.cmp_by_order_key(b, axis));
        for (i, spot) in this.spots.iter_mut().enumerate() {
            spot.alignment_id = i;
            spot.master_alignment_id = i;
        }
        this.into_state()
    }
}

impl AlignmentRefiner<Ordered> {
    /// Attach isotope and adduct relations. GC-MS spots are left unlinked.
    pub fn link(self) -> AlignmentRefiner<Linked> {
        let mut this = self;
        match this.comparer {
            PeakComparer::Gcms(_) => {}
            PeakComparer::Lcms(_) | PeakComparer::Ims(_) => {
                let drift_tolerance = match &this.comparer {
                    PeakComparer::Ims(ims) => Some(ims.drift_tolerance),
                    _ => None,
                };
                let (isotopes, adducts) = link_spots(&mut this.spots, &this.params, drift_tolerance);
                info!("Linked {isotopes} isotope and {adducts} adduct pairs");
            }
        }
        this.into_state()
    }
}

impl AlignmentRefiner<Linked> {
    pub fn into_spots(self) -> Vec<AlignmentSpotProperty> {
        self.spots
    }
}

fn push_link(spot: &mut AlignmentSpotProperty, linked_id: usize, kind: SpotLinkKind, annotation: String) {
    if !spot
        .links
        .iter()
        .any(|l| l.linked_id == linked_id && l.kind == kind)
    {
        spot.links.push(SpotLink {
            linked_id,
            kind,
            annotation,
        });
    }
}

/// Link spots that co-elute within the retention time tolerance. `spots` must
/// be sorted by retention time with `alignment_id` equal to position.
///
/// With a `drift_tolerance`, spots whose drift times are both known must also
/// co-drift within it.
fn link_spots(
    spots: &mut [AlignmentSpotProperty],
    params: &AlignmentParameters,
    drift_tolerance: Option<f64>,
) -> (usize, usize) {
    let rt = |s: &AlignmentSpotProperty| s.center(ChromXType::RT).unwrap_or_default();
    let co_drifting = |a: &AlignmentSpotProperty, b: &AlignmentSpotProperty| {
        match (drift_tolerance, a.center(ChromXType::Drift), b.center(ChromXType::Drift)) {
            (Some(tolerance), Some(da), Some(db)) => (da - db).abs() <= tolerance,
            _ => true,
        }
    };
    let mz_tolerance = params.mz_tolerance;
    let adducts = params.ion_mode.adducts();
    let mut isotope_links = 0;
    let mut adduct_links = 0;

    for i in 0..spots.len() {
        let rt_i = rt(&spots[i]);
        let mut j = i + 1;
        while j < spots.len() && rt(&spots[j]) - rt_i <= params.rt_tolerance {
            let (head, tail) = spots.split_at_mut(j);
            let a = &mut head[i];
            let b = &mut tail[0];
            j += 1;
            if !co_drifting(a, b) {
                continue;
            }

            let (light, heavy) = if a.mass_center <= b.mass_center {
                (a, b)
            } else {
                (b, a)
            };
            let delta = heavy.mass_center - light.mass_center;

            let weight = (1..=MAX_ISOTOPE_WEIGHT)
                .find(|k| (delta - *k as f64 * C13_C12_DIFFERENCE).abs() <= mz_tolerance);
            if let Some(k) = weight {
                if heavy.isotope_parent_id.is_none()
                    && light.isotope_weight_number == 0
                    && heavy.average_height < light.average_height
                {
                    heavy.isotope_parent_id = Some(light.alignment_id);
                    heavy.isotope_weight_number = k;
                    push_link(light, heavy.alignment_id, SpotLinkKind::Isotope, format!("M+{k}"));
                    push_link(heavy, light.alignment_id, SpotLinkKind::Isotope, "M+0".to_string());
                    isotope_links += 1;
                }
                continue;
            }

            'adducts: for x in adducts {
                for y in adducts {
                    if x.name == y.name {
                        continue;
                    }
                    let neutral_light = light.mass_center - x.mass_shift;
                    let neutral_heavy = heavy.mass_center - y.mass_shift;
                    if (neutral_light - neutral_heavy).abs() <= mz_tolerance {
                        if light.adduct_type.is_empty() {
                            light.adduct_type = x.name.to_string();
                        }
                        if heavy.adduct_type.is_empty() {
                            heavy.adduct_type = y.name.to_string();
                        }
                        push_link(light, heavy.alignment_id, SpotLinkKind::Adduct, y.name.to_string());
                        push_link(heavy, light.alignment_id, SpotLinkKind::Adduct, x.name.to_string());
                        adduct_links += 1;
                        break 'adducts;
                    }
                }
            }
        }
    }
    (isotope_links, adduct_links)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::matching::{MatchSource, MsScanMatchResult};
    use crate::params::Technology;
    use crate::peak::{AlignmentChromPeakFeature, AnalysisFile, ChromatogramPeakFeature};

    fn spot(rt: f64, mz: f64, height: f64) -> AlignmentSpotProperty {
        let file = AnalysisFile::new(0, "a");
        let mut s = AlignmentSpotProperty::new(vec![AlignmentChromPeakFeature::from_feature(
            &file,
            ChromatogramPeakFeature::new(0, rt - 0.02, rt, rt + 0.02, mz, height),
        )]);
        s.assign_representative();
        s
    }

    fn refiner(technology: Technology, spots: Vec<AlignmentSpotProperty>) -> AlignmentRefiner<Joined> {
        let params = AlignmentParameters::for_technology(technology);
        AlignmentRefiner::new(PeakComparer::new(technology, &params), params, spots)
    }

    #[test]
    fn test_clean_keeps_identified() {
        let mut identified = spot(5.01, 73.0, 10.0);
        identified.library_id = 4;
        identified.msp_match = Some(MsScanMatchResult {
            library_id: 4,
            source: MatchSource::Msp,
            ..Default::default()
        });
        let spots = vec![
            spot(5.0, 73.0, 100.0),
            identified,
            spot(5.02, 73.2, 50.0),
            spot(6.0, 73.0, 50.0),
        ];
        let cleaned = refiner(Technology::GcMs, spots).clean();
        assert_eq!(cleaned.len(), 2);
        assert!(cleaned.spots()[0].is_identified());
        assert_eq!(cleaned.spots()[1].center(ChromXType::RT), Some(6.0));
    }

    #[test]
    fn test_order_assigns_dense_ids() {
        let spots = vec![spot(7.0, 200.0, 1.0), spot(5.0, 300.0, 1.0), spot(5.0, 100.0, 1.0)];
        let ordered = refiner(Technology::LcMs, spots).clean().order();
        let keys: Vec<(usize, f64)> = ordered.spots().iter().map(|s| (s.alignment_id, s.mass_center)).collect();
        assert_eq!(keys, vec![(0, 100.0), (1, 300.0), (2, 200.0)]);
    }

    #[test]
    fn test_link_isotopes_and_adducts() {
        let m = 300.1;
        let spots = vec![
            spot(5.0, m + 1.007276, 1000.0),
            spot(5.01, m + 1.007276 + C13_C12_DIFFERENCE, 200.0),
            spot(5.02, m + 22.989218, 400.0),
            spot(9.0, m + 22.989218, 400.0),
        ];
        let linked = refiner(Technology::LcMs, spots).refine().into_spots();
        assert_eq!(linked.len(), 4);
        assert_eq!(linked[1].isotope_parent_id, Some(0));
        assert_eq!(linked[1].isotope_weight_number, 1);
        assert_eq!(linked[0].adduct_type, "[M+H]+");
        assert_eq!(linked[2].adduct_type, "[M+Na]+");
        assert!(linked[3].links.is_empty());

        let gc = vec![spot(5.0, 73.0, 10.0), spot(5.0, 74.003355, 5.0)];
        let linked = refiner(Technology::GcMs, gc).refine().into_spots();
        assert!(linked.iter().all(|s| s.links.is_empty()));
    }

    #[test]
    fn test_ims_links_require_drift_agreement() {
        let with_drift = |rt: f64, mz: f64, height: f64, drift: f64| {
            let file = AnalysisFile::new(0, "a");
            let mut feature = ChromatogramPeakFeature::new(0, rt - 0.02, rt, rt + 0.02, mz, height);
            feature.chrom_top.set(ChromXType::Drift, drift);
            let mut s = AlignmentSpotProperty::new(vec![AlignmentChromPeakFeature::from_feature(&file, feature)]);
            s.assign_representative();
            s
        };
        let m = 300.1 + 1.007276;
        let params = AlignmentParameters::for_technology(Technology::ImMs);
        let tolerance = params.drift_tolerance;
        let spots = vec![
            with_drift(5.0, m, 1000.0, 20.0),
            with_drift(5.01, m + C13_C12_DIFFERENCE, 200.0, 20.0 + tolerance / 2.0),
            with_drift(5.02, m + 2.0 * C13_C12_DIFFERENCE, 100.0, 20.0 + tolerance * 50.0),
            with_drift(5.03, 300.1 + 22.989218, 400.0, 20.0 + tolerance * 50.0),
        ];
        let linked = refiner(Technology::ImMs, spots).refine().into_spots();
        assert_eq!(linked.len(), 4);
        assert_eq!(linked[1].isotope_parent_id, Some(0));
        assert_eq!(linked[2].isotope_parent_id, None);
        assert_eq!(linked[2].isotope_weight_number, 0);
        assert!(linked[3].adduct_type.is_empty());
        assert!(linked[0].links.iter().all(|l| l.linked_id == 1));

        let lcms = vec![
            spot(5.0, m, 1000.0),
            spot(5.02, m + 2.0 * C13_C12_DIFFERENCE, 100.0),
        ];
        let linked = refiner(Technology::LcMs, lcms).refine().into_spots();
        assert_eq!(linked[1].isotope_parent_id, Some(0));
    }
}
